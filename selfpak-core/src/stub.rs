//! Runtime half of a packed file: recover the payload and run it.

use crate::packer::create_executable;
use crate::{Codec, SelfImage, Trailer};
use anyhow::{anyhow, Context, Result};
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

/// Appended to the stub's own path to name the extracted executable.
pub const UNPACKED_SUFFIX: &str = "_unpacked.exe";

/// `<stub>_unpacked.exe`; never the stub's own path.
pub fn unpacked_path(stub: &Path) -> PathBuf {
    let mut name = OsString::from(stub.as_os_str());
    name.push(UNPACKED_SUFFIX);
    PathBuf::from(name)
}

#[derive(Debug)]
pub struct StubRuntime {
    image: SelfImage,
    codec: Box<dyn Codec>,
}

impl StubRuntime {
    /// `image` must already have resolved as [`crate::Mode::Stub`].
    pub fn new(image: SelfImage, codec: Box<dyn Codec>) -> Self {
        Self { image, codec }
    }

    pub fn unpacked_path(&self) -> PathBuf {
        unpacked_path(self.image.path())
    }

    /// Byte range of the compressed payload inside the image.
    pub fn locate(&self) -> Result<Range<u64>> {
        let mut file = self.image.file();
        let trailer = Trailer::read_from(&mut file, self.image.len())?;
        let range = trailer.payload_range(self.image.len())?;

        log::debug!(
            "payload of {} bytes at offset {}",
            trailer.payload_length,
            range.start
        );
        Ok(range)
    }

    /// Decompresses the payload into memory.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        let range = self.locate()?;

        let mut file = self.image.file();
        file.seek(SeekFrom::Start(range.start))
            .context("failed seeking payload")?;
        let mut section = file.take(range.end - range.start);

        let mut buf = Vec::new();
        self.codec
            .decode(&mut section, &mut buf)
            .context("failed decompressing file")?;
        Ok(buf)
    }

    /// Writes the decompressed payload next to the stub and returns its path.
    pub fn extract(&self) -> Result<PathBuf> {
        let payload = self.decompress()?;
        let path = self.unpacked_path();

        let mut out = create_executable(&path)
            .with_context(|| format!("failed writing unpacked file {}", path.display()))?;
        out.write_all(&payload)
            .and_then(|()| out.sync_all())
            .with_context(|| format!("failed writing unpacked file {}", path.display()))?;

        log::info!("extracted {} bytes to {}", payload.len(), path.display());
        Ok(path)
    }

    /// Extracts and starts the payload without waiting for it.
    ///
    /// `args` are handed to the child unchanged. The child shares this
    /// process's stdout and stderr. A detached thread waits for it and then
    /// removes the extracted file.
    pub fn launch<I, S>(self, args: I) -> Result<Launched>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = self.extract()?;
        drop(self);

        let mut child = Command::new(&path)
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed running unpacked executable {}", path.display()))?;
        let pid = child.id();
        log::debug!("spawned {} as pid {pid}", path.display());

        let cleanup_path = path.clone();
        let cleanup = thread::Builder::new()
            .name("unpacked-cleanup".into())
            .spawn(move || {
                let status = child.wait();
                remove_unpacked(&cleanup_path);
                status
            })
            .context("failed scheduling cleanup")?;

        Ok(Launched { pid, path, cleanup })
    }
}

/// A running payload and its pending cleanup.
#[derive(Debug)]
pub struct Launched {
    pid: u32,
    path: PathBuf,
    cleanup: JoinHandle<io::Result<ExitStatus>>,
}

impl Launched {
    pub fn id(&self) -> u32 {
        self.pid
    }

    pub fn unpacked_path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the child exited and the extracted file was removed.
    pub fn wait(self) -> Result<ExitStatus> {
        let status = self
            .cleanup
            .join()
            .map_err(|_| anyhow!("cleanup thread panicked"))?
            .context("failed waiting for unpacked executable")?;

        log::debug!("pid {} exited with {status}", self.pid);
        Ok(status)
    }
}

/// Best effort: a leftover file is logged, never reported.
fn remove_unpacked(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("removed {}", path.display()),
        Err(e) => log::warn!("failed removing {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mode, PackError, Packer, Zstd, MAGIC};

    const STUB: &[u8] = b"\x7fELF pretend stub program image";

    fn pack(dir: &Path, original: &[u8]) -> PathBuf {
        let stub = dir.join("selfpak");
        std::fs::write(&stub, STUB).unwrap();
        let target = dir.join("tool");
        std::fs::write(&target, original).unwrap();

        Packer::new(stub, Box::new(Zstd::default()))
            .pack(&target)
            .unwrap()
            .output
    }

    fn runtime(path: &Path) -> StubRuntime {
        let image = SelfImage::open(path).unwrap();
        assert_eq!(image.resolve_mode().unwrap(), Mode::Stub);
        StubRuntime::new(image, Box::new(Zstd::default()))
    }

    #[test]
    fn test_unpacked_path_differs_from_stub() {
        let stub = Path::new("/tmp/tool.packed");
        assert_eq!(
            unpacked_path(stub),
            PathBuf::from("/tmp/tool.packed_unpacked.exe")
        );
    }

    #[test]
    fn test_locate_matches_pack_offset() {
        let dir = tempfile::tempdir().unwrap();
        let packed = pack(dir.path(), b"some executable bytes");

        let range = runtime(&packed).locate().unwrap();
        assert_eq!(range.start, STUB.len() as u64);
    }

    #[test]
    fn test_extract_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let original: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let packed = pack(dir.path(), &original);

        let path = runtime(&packed).extract().unwrap();
        assert_eq!(path, unpacked_path(&packed));
        assert_eq!(std::fs::read(&path).unwrap(), original);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_extract_overwrites_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let packed = pack(dir.path(), b"fresh");
        std::fs::write(unpacked_path(&packed), vec![0u8; 4096]).unwrap();

        let path = runtime(&packed).extract().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"fresh");
    }

    #[test]
    fn test_oversized_length_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt");
        let mut bytes = b"stub".to_vec();
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&MAGIC);
        std::fs::write(&path, &bytes).unwrap();

        let err = runtime(&path).extract().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::PayloadOutOfBounds { .. })
        ));
        assert!(!unpacked_path(&path).exists());
    }

    #[test]
    fn test_magic_only_file_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("magic-only");
        std::fs::write(&path, MAGIC).unwrap();

        let err = runtime(&path).locate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::Truncated { .. })
        ));
    }

    #[test]
    fn test_garbage_payload_fails_to_decompress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage");
        let mut bytes = b"stub".to_vec();
        bytes.extend_from_slice(b"not compressed");
        Trailer::new(14).write_to(&mut bytes).unwrap();
        std::fs::write(&path, &bytes).unwrap();

        let err = runtime(&path).decompress().unwrap_err();
        assert!(format!("{err:#}").contains("failed decompressing file"));
    }

    #[test]
    fn test_remove_unpacked_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        remove_unpacked(&dir.path().join("never-written"));
    }
}
