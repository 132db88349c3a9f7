//! C1: a sink that forwards bytes, counts total bytes written, and
//! accumulates a rolling checksum used by the footer (§4.7).
//!
//! Threaded explicitly through every component as `&mut CountingHashingWriter<W>`
//! rather than kept as ambient state (§9).

use std::io::{
    self,
    Write,
};

pub struct CountingHashingWriter<W> {
    inner: W,
    bytes_written: u64,
    checksum: u32,
}

impl<W: Write> CountingHashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
            checksum: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The running sum of every byte written so far, widened to `u32` on
    /// overflow (§4.7: "the running sum kept by C1").
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for CountingHashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes_written += n as u64;
        for &b in &buf[..n] {
            self.checksum = self.checksum.wrapping_add(b as u32);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bytes_and_accumulates_checksum() {
        let mut w = CountingHashingWriter::new(Vec::new());
        w.write_all(b"abc").unwrap();
        assert_eq!(w.bytes_written(), 3);
        assert_eq!(w.checksum(), b'a' as u32 + b'b' as u32 + b'c' as u32);
        w.write_all(b"d").unwrap();
        assert_eq!(w.bytes_written(), 4);
        assert_eq!(
            w.checksum(),
            b'a' as u32 + b'b' as u32 + b'c' as u32 + b'd' as u32
        );
    }
}
