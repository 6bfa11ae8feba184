//! Footer appended to every packed file.
//!
//! Walking backward from end-of-file a packed file reads:
//!
//! ```text
//! [stub image][payload: payload_length bytes][payload_length: u64 LE][MAGIC]
//! ```
//!
//! Nothing in the layout depends on the stub length, so the footer is always
//! located relative to the end of the file.

use crate::PackError;
use anyhow::{Context, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

/// Constant closing every packed file.
pub const MAGIC: [u8; 8] = *b"LALALALA";

/// Width of the payload length field that precedes [`MAGIC`].
pub const LENGTH_SIZE: u64 = 8;

/// Bytes taken by the length field and the magic together.
pub const TRAILER_SIZE: u64 = LENGTH_SIZE + MAGIC.len() as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Number of compressed bytes sitting right before the length field.
    pub payload_length: u64,
}

impl Trailer {
    pub fn new(payload_length: u64) -> Self {
        Self { payload_length }
    }

    /// Appends the length field, then the magic. The magic goes last: a file
    /// cut short anywhere before it is never taken for a stub.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LE>(self.payload_length)
            .context("failed appending len")?;
        w.write_all(&MAGIC).context("failed appending magic")?;
        Ok(())
    }

    /// Reads the length field of a file already known to end with [`MAGIC`].
    pub fn read_from<R: Read + Seek>(r: &mut R, total_len: u64) -> Result<Self> {
        let at = total_len
            .checked_sub(TRAILER_SIZE)
            .ok_or(PackError::Truncated {
                len: total_len,
                need: TRAILER_SIZE,
            })?;

        r.seek(SeekFrom::Start(at)).context("failed seeking length")?;
        let payload_length = r.read_u64::<LE>().context("failed reading length")?;

        Ok(Self { payload_length })
    }

    /// Byte range of the payload inside a file of `total_len` bytes.
    pub fn payload_range(&self, total_len: u64) -> Result<Range<u64>, PackError> {
        let end = total_len
            .checked_sub(TRAILER_SIZE)
            .ok_or(PackError::Truncated {
                len: total_len,
                need: TRAILER_SIZE,
            })?;
        let start = end
            .checked_sub(self.payload_length)
            .ok_or(PackError::PayloadOutOfBounds {
                payload_length: self.payload_length,
                available: end,
            })?;

        Ok(start..end)
    }
}

/// Returns true when the last `MAGIC.len()` bytes equal [`MAGIC`].
///
/// A file shorter than the magic cannot carry a footer and is reported as
/// `false` rather than as an error. The reader is left positioned after the
/// bytes that were read.
pub fn ends_with_magic<R: Read + Seek>(r: &mut R, total_len: u64) -> Result<bool> {
    let Some(at) = total_len.checked_sub(MAGIC.len() as u64) else {
        log::debug!("{total_len} bytes is shorter than the magic");
        return Ok(false);
    };

    let mut tail = [0u8; MAGIC.len()];
    r.seek(SeekFrom::Start(at)).context("failed seeking magic")?;
    r.read_exact(&mut tail).context("failed reading magic")?;

    Ok(tail == MAGIC)
}

/// Reads the footer of the file at `path`, or `None` if it carries none.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<Option<Trailer>> {
    let path = path.as_ref();
    let mut file =
        File::open(path).with_context(|| format!("failed opening {}", path.display()))?;
    let total_len = file.metadata().context("failed stat file")?.len();

    if !ends_with_magic(&mut file, total_len)? {
        return Ok(None);
    }

    let trailer = Trailer::read_from(&mut file, total_len)?;
    trailer.payload_range(total_len)?;
    Ok(Some(trailer))
}
