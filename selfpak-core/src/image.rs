use crate::trailer::ends_with_magic;
use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Which half of the program a process start should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No footer: act as the packing tool.
    Packer,
    /// Footer present: unpack and run the embedded payload.
    Stub,
}

/// The on-disk file backing a running (or to-be-run) program.
#[derive(Debug)]
pub struct SelfImage {
    path: PathBuf,
    len: u64,
    file: File,
}

impl SelfImage {
    /// Opens the executable of the current process, symlinks resolved.
    pub fn current() -> Result<Self> {
        let exe = std::env::current_exe().context("failed expanding self path")?;
        let path = exe
            .canonicalize()
            .with_context(|| format!("failed getting absolute path of {}", exe.display()))?;
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)
            .with_context(|| format!("failed stat self file {}", path.display()))?
            .len();
        let file = File::open(&path)
            .with_context(|| format!("failed opening self file {}", path.display()))?;

        Ok(Self { path, len, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    /// Inspects the tail of the image. Moves the shared read cursor.
    pub fn resolve_mode(&self) -> Result<Mode> {
        let mut file = &self.file;
        let mode = if ends_with_magic(&mut file, self.len)? {
            Mode::Stub
        } else {
            Mode::Packer
        };

        log::debug!("{} ({} bytes) resolved as {mode:?}", self.path.display(), self.len);
        Ok(mode)
    }
}
