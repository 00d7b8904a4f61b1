use super::{Encoder, EncoderStats};
use crate::error::Result;
use crate::params::EncoderParams;
use std::io::{self, Write};

/// Compresses everything written to it into `W`
///
/// The stream is only complete after [`BrotliWriter::finish`]; dropping
/// the writer earlier leaves a truncated stream behind.
pub struct BrotliWriter<W: Write> {
    encoder: Encoder,
    writer: W,
}

impl<W: Write> BrotliWriter<W> {
    pub fn new(writer: W, params: EncoderParams) -> Result<Self> {
        Ok(Self { encoder: Encoder::new(params)?, writer })
    }

    fn write_output(&mut self) -> io::Result<()> {
        if self.encoder.has_output() {
            let out = self.encoder.take_output();
            self.writer.write_all(&out)?;
        }
        Ok(())
    }

    /// Write a metadata block that decoders skip
    pub fn write_metadata(&mut self, data: &[u8]) -> Result<()> {
        self.encoder.emit_metadata(data)?;
        self.write_output()?;
        Ok(())
    }

    /// Emit the last meta-block, keeping the writer usable for
    /// [`BrotliWriter::stats`]; further writes fail
    pub fn try_finish(&mut self) -> Result<()> {
        self.encoder.finish()?;
        self.write_output()?;
        self.writer.flush()?;
        Ok(())
    }

    /// Emit the last meta-block and return the inner writer
    pub fn finish(mut self) -> Result<W> {
        self.try_finish()?;
        Ok(self.writer)
    }

    /// Return the inner writer as is; unless the stream was finished
    /// it is truncated
    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn stats(&self) -> &EncoderStats {
        self.encoder.stats()
    }

    /// Get a reference to the inner writer
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Get a mutable reference to the inner writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: Write> Write for BrotliWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.process(buf)?;
        self.write_output()?;
        Ok(buf.len())
    }

    /// Emits all buffered input as complete, byte-aligned meta-blocks
    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()?;
        self.write_output()?;
        self.writer.flush()
    }
}
