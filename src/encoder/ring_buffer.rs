/// Bytes past the written region that are always readable (zeroed), so
/// 8-byte hash loads never run off the buffer
const SLACK_BYTES: usize = 7;

/// Input window of the encoder
///
/// Holds `1 << window_bits` bytes addressed through `mask`, followed by a
/// tail of `1 << tail_bits` bytes that mirrors the start of the buffer. A
/// block of at most tail size that starts anywhere in the buffer can
/// therefore be read as one contiguous slice. Storage grows lazily: a
/// short first write only allocates what it needs.
pub struct RingBuffer {
    size: usize,
    mask: usize,
    tail_size: usize,
    total_size: usize,
    /// Bytes ever written
    pos: u64,
    buffer: Vec<u8>,
}

impl RingBuffer {
    pub fn new(window_bits: u32, tail_bits: u32) -> Self {
        let size = 1usize << window_bits;
        let tail_size = 1usize << tail_bits;
        Self { size, mask: size - 1, tail_size, total_size: size + tail_size, pos: 0, buffer: Vec::new() }
    }

    #[inline]
    pub fn mask(&self) -> usize {
        self.mask
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Total bytes written so far
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Largest single write that keeps the tail mirror consistent
    #[inline]
    pub fn tail_size(&self) -> usize {
        self.tail_size
    }

    fn grow(&mut self, len: usize) {
        if self.buffer.len() < len + SLACK_BYTES {
            self.buffer.resize(len + SLACK_BYTES, 0);
        }
    }

    /// Append `bytes`, wrapping at the end of the window
    pub fn write(&mut self, bytes: &[u8]) {
        let n = bytes.len();
        debug_assert!(n <= self.tail_size, "write of {} exceeds tail {}", n, self.tail_size);
        if self.pos == 0 && n < self.tail_size {
            self.grow(n);
            self.buffer[..n].copy_from_slice(bytes);
            self.pos = n as u64;
            return;
        }
        self.grow(self.total_size);

        let masked_pos = (self.pos as usize) & self.mask;
        if masked_pos < self.tail_size {
            let p = n.min(self.tail_size - masked_pos);
            let start = self.size + masked_pos;
            self.buffer[start..start + p].copy_from_slice(&bytes[..p]);
        }
        if masked_pos + n <= self.size {
            self.buffer[masked_pos..masked_pos + n].copy_from_slice(bytes);
        } else {
            let first = n.min(self.total_size - masked_pos);
            self.buffer[masked_pos..masked_pos + first].copy_from_slice(&bytes[..first]);
            let wrapped = self.size - masked_pos;
            self.buffer[..n - wrapped].copy_from_slice(&bytes[wrapped..]);
        }
        self.pos += n as u64;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("size", &self.size)
            .field("tail_size", &self.tail_size)
            .field("pos", &self.pos)
            .field("allocated", &self.buffer.len())
            .finish()
    }
}
