use crate::Codec;
use std::io::{self, Read, Write};

/// zstd streaming compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zstd {
    pub level: i32,
}

impl Zstd {
    pub const DEFAULT_LEVEL: i32 = 3;

    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Zstd {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEVEL)
    }
}

impl Codec for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn encode(&self, source: &mut dyn Read, sink: &mut dyn Write) -> io::Result<()> {
        zstd::stream::copy_encode(source, sink, self.level)
    }

    fn decode(&self, source: &mut dyn Read, sink: &mut dyn Write) -> io::Result<()> {
        zstd::stream::copy_decode(source, sink)
    }
}
