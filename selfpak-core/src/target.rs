use crate::PackError;
use anyhow::{Context, Result};
use goblin::Hint;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Container format guessed from the first bytes of a target.
///
/// Packing never depends on it; it is only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Elf { is_64: Option<bool> },
    MachO { is_64: Option<bool> },
    MachOFat,
    Pe,
    Archive,
    Unknown,
}

impl TargetFormat {
    pub fn sniff<R: Read>(r: &mut R) -> Result<Self> {
        let mut head = [0u8; 16];
        match r.read_exact(&mut head) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Self::Unknown),
            Err(e) => return Err(e).context("failed reading target header"),
        }

        let format = match goblin::peek_bytes(&head) {
            Ok(Hint::Elf(h)) => Self::Elf { is_64: h.is_64 },
            Ok(Hint::Mach(h)) => Self::MachO { is_64: h.is_64 },
            Ok(Hint::MachFat(_)) => Self::MachOFat,
            Ok(Hint::PE) => Self::Pe,
            Ok(Hint::Archive) => Self::Archive,
            Ok(_) => Self::Unknown,
            Err(e) => {
                log::debug!("goblin could not classify target: {e}");
                Self::Unknown
            }
        };
        Ok(format)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = |is_64: &Option<bool>| match is_64 {
            Some(true) => " 64-bit",
            Some(false) => " 32-bit",
            None => "",
        };
        match self {
            TargetFormat::Elf { is_64 } => write!(f, "ELF{}", bits(is_64)),
            TargetFormat::MachO { is_64 } => write!(f, "Mach-O{}", bits(is_64)),
            TargetFormat::MachOFat => write!(f, "Mach-O universal"),
            TargetFormat::Pe => write!(f, "PE"),
            TargetFormat::Archive => write!(f, "ar archive"),
            TargetFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// A file that passed the packing preconditions.
#[derive(Debug, Clone)]
pub struct Target {
    pub path: PathBuf,
    pub len: u64,
    pub format: TargetFormat,
}

impl Target {
    /// Checks that `path` names an existing regular file and peeks at it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = std::fs::metadata(&path).map_err(|source| PackError::TargetMissing {
            path: path.clone(),
            source,
        })?;
        if !meta.is_file() {
            return Err(PackError::NotRegularFile { path }.into());
        }

        let mut file = File::open(&path)
            .with_context(|| format!("failed opening target {}", path.display()))?;
        let format = TargetFormat::sniff(&mut file)?;
        log::info!("target {} is {} ({} bytes)", path.display(), format, meta.len());

        Ok(Self {
            path,
            len: meta.len(),
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sniff_elf64() {
        let mut head = vec![0x7f, b'E', b'L', b'F', 2, 1, 1, 0];
        head.resize(64, 0);

        let format = TargetFormat::sniff(&mut Cursor::new(head)).unwrap();
        assert_eq!(format, TargetFormat::Elf { is_64: Some(true) });
        assert_eq!(format.to_string(), "ELF 64-bit");
    }

    #[test]
    fn test_sniff_script_and_tiny_files() {
        let script = b"#!/bin/sh\necho hello from a script\n";
        assert_eq!(
            TargetFormat::sniff(&mut Cursor::new(script)).unwrap(),
            TargetFormat::Unknown
        );
        assert_eq!(
            TargetFormat::sniff(&mut Cursor::new(b"MZ")).unwrap(),
            TargetFormat::Unknown
        );
    }

    #[test]
    fn test_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let err = Target::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::TargetMissing { .. })
        ));
    }

    #[test]
    fn test_directory_target() {
        let dir = tempfile::tempdir().unwrap();
        let err = Target::open(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::NotRegularFile { .. })
        ));
    }

    #[test]
    fn test_regular_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();

        let target = Target::open(&path).unwrap();
        assert_eq!(target.len, 17);
        assert_eq!(target.format, TargetFormat::Unknown);
    }
}
