/// Bit-level writer for Brotli output
///
/// Writes bits LSB-first, the order used by every field of the Brotli format.
/// A writer can be seeded with the partial byte left over from a previous
/// meta-block so consecutive meta-blocks pack without padding.
#[derive(Clone, Debug)]
pub struct BitWriter {
    /// Completed output bytes
    output: Vec<u8>,
    /// Pending bits not yet flushed to `output`
    acc: u64,
    /// Number of valid bits in `acc` (0-7 between calls)
    acc_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(65536)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { output: Vec::with_capacity(capacity), acc: 0, acc_bits: 0 }
    }

    /// Start a writer whose first `bits` bits are the low bits of `value`
    pub fn with_pending(value: u16, bits: u8, capacity: usize) -> Self {
        let mut writer = Self::with_capacity(capacity);
        writer.write_bits(bits as u32, value as u64);
        writer
    }

    /// Write the low `n_bits` (0-56) bits of `bits` in LSB-first order
    #[inline]
    pub fn write_bits(&mut self, n_bits: u32, bits: u64) {
        debug_assert!(n_bits <= 56);
        debug_assert!(n_bits == 56 || bits >> n_bits == 0, "{} does not fit {} bits", bits, n_bits);
        if n_bits == 0 {
            return;
        }
        self.acc |= bits << self.acc_bits;
        self.acc_bits += n_bits;
        while self.acc_bits >= 8 {
            self.output.push(self.acc as u8);
            self.acc >>= 8;
            self.acc_bits -= 8;
        }
    }

    /// Write a single bit
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(1, bit as u64);
    }

    /// Pad to byte boundary with zero bits
    pub fn align_to_byte(&mut self) {
        if self.acc_bits > 0 {
            self.output.push(self.acc as u8);
            self.acc = 0;
            self.acc_bits = 0;
        }
    }

    /// Write raw bytes; the writer must be byte-aligned
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.acc_bits, 0, "raw bytes require byte alignment");
        self.output.extend_from_slice(bytes);
    }

    /// Total number of bits written so far
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.output.len() * 8 + self.acc_bits as usize
    }

    /// Completed bytes, excluding any partial byte
    pub fn as_bytes(&self) -> &[u8] {
        &self.output
    }

    /// Finish and return the output bytes, zero-padding the last byte
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.output
    }

    /// Drop everything written after bit position `bit_len`, a value
    /// previously returned by [`bit_len`](Self::bit_len)
    pub fn rewind(&mut self, bit_len: usize) {
        debug_assert!(bit_len <= self.bit_len());
        let bytes = bit_len / 8;
        let bits = (bit_len % 8) as u32;
        if bytes < self.output.len() {
            self.acc = self.output[bytes] as u64;
            self.output.truncate(bytes);
        }
        self.acc &= (1u64 << bits) - 1;
        self.acc_bits = bits;
    }

    /// Take the completed bytes, keeping the partial byte pending
    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(3, 0b011); // bits 0-2
        writer.write_bits(5, 0b11010); // bits 3-7
        let output = writer.finish();
        assert_eq!(output, vec![0xD3]); // 11010_011 = 0xD3
    }

    #[test]
    fn test_write_cross_byte() {
        let mut writer = BitWriter::new();
        writer.write_bits(12, 0xFFF);
        let output = writer.finish();
        assert_eq!(output, vec![0xFF, 0x0F]);
    }

    #[test]
    fn test_write_wide_value() {
        let mut writer = BitWriter::new();
        writer.write_bits(4, 0xA);
        writer.write_bits(48, 0x1234_5678_9ABC);
        let output = writer.finish();
        assert_eq!(output, vec![0xCA, 0xAB, 0x89, 0x67, 0x45, 0x23, 0x01]);
    }

    #[test]
    fn test_pending_bits_carry_over() {
        let mut first = BitWriter::new();
        first.write_bits(3, 0b101);
        first.write_bits(8, 0xFF);
        assert_eq!(first.take_bytes(), vec![0xFD]);
        assert_eq!(first.bit_len(), 3);

        let mut second = BitWriter::with_pending(0b111, 3, 16);
        assert_eq!(second.bit_len(), 3);
        second.write_bits(5, 0);
        assert_eq!(second.finish(), vec![0b111]);
    }

    #[test]
    fn test_rewind() {
        let mut writer = BitWriter::new();
        writer.write_bits(5, 0b10110);
        let mark = writer.bit_len();
        writer.write_bits(20, 0xFFFFF);
        writer.rewind(mark);
        assert_eq!(writer.bit_len(), 5);
        writer.write_bits(3, 0b001);
        assert_eq!(writer.finish(), vec![0b0011_0110]);

        let mut writer = BitWriter::new();
        writer.write_bits(16, 0xABCD);
        writer.write_bits(2, 0b11);
        writer.rewind(16);
        assert_eq!(writer.finish(), vec![0xCD, 0xAB]);
    }

    #[test]
    fn test_take_bytes_keeps_pending_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(12, 0x5A5);
        assert_eq!(writer.take_bytes(), vec![0xA5]);
        assert_eq!(writer.bit_len(), 4);
        writer.write_bits(4, 0xF);
        assert_eq!(writer.finish(), vec![0xF5]);
    }

    #[test]
    fn test_align_and_raw_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.align_to_byte();
        writer.write_bytes(b"ab");
        assert_eq!(writer.bit_len(), 24);
        assert_eq!(writer.finish(), vec![0x01, b'a', b'b']);
    }
}
