pub mod zstandard;
pub use zstandard::Zstd;

use std::io::{self, Read, Write};

/// Stream transform applied to the payload.
///
/// `decode` must invert `encode`; nothing else about the compressed form is
/// assumed by the packer or the stub.
pub trait Codec: std::fmt::Debug + Send + Sync {
    /// Returns a short name for logs, e.g. "zstd".
    fn name(&self) -> &'static str;

    /// Compresses everything `source` yields into `sink`.
    fn encode(&self, source: &mut dyn Read, sink: &mut dyn Write) -> io::Result<()>;

    /// Decompresses everything `source` yields into `sink`.
    fn decode(&self, source: &mut dyn Read, sink: &mut dyn Write) -> io::Result<()>;
}

/// Writer adapter that tallies how many bytes reached the inner writer.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
