use std::path::PathBuf;

use thiserror::Error;

/// Failures a caller may want to tell apart from plain I/O errors.
///
/// These travel inside `anyhow::Error` and can be recovered with
/// `err.downcast_ref::<PackError>()`.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("target exec does not exist: {}", .path.display())]
    TargetMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a regular file", .path.display())]
    NotRegularFile { path: PathBuf },

    #[error("file is {len} bytes, too short to hold a {need}-byte trailer")]
    Truncated { len: u64, need: u64 },

    #[error("payload of {payload_length} bytes does not fit in the {available} bytes before the trailer")]
    PayloadOutOfBounds { payload_length: u64, available: u64 },
}
