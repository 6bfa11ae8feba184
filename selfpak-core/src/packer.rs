//! Turns a target executable into a self-extracting stub.

use crate::{Codec, CountingWriter, PackError, Target, TargetFormat, Trailer};
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appended to the target path to name the packed output.
pub const PACKED_SUFFIX: &str = ".packed";

/// `<target>.packed`
pub fn packed_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(PACKED_SUFFIX);
    PathBuf::from(name)
}

/// What a successful pack produced.
#[derive(Debug, Clone)]
pub struct PackReport {
    pub output: PathBuf,
    /// Bytes of the stub image copied to the front of the output.
    pub stub_len: u64,
    /// Offset of the first compressed byte.
    pub payload_offset: u64,
    pub payload_length: u64,
    pub original_len: u64,
    pub format: TargetFormat,
}

impl PackReport {
    pub fn packed_len(&self) -> u64 {
        self.payload_offset + self.payload_length + crate::TRAILER_SIZE
    }

    /// Compressed payload size as a percentage of the original.
    pub fn ratio(&self) -> f64 {
        if self.original_len == 0 {
            return 0.0;
        }
        self.payload_length as f64 / self.original_len as f64 * 100.0
    }
}

#[derive(Debug)]
pub struct Packer {
    stub_template: PathBuf,
    codec: Box<dyn Codec>,
}

impl Packer {
    /// `stub_template` is the un-appended program image that every packed
    /// file starts with, normally the running executable.
    pub fn new<P: Into<PathBuf>>(stub_template: P, codec: Box<dyn Codec>) -> Self {
        Self {
            stub_template: stub_template.into(),
            codec,
        }
    }

    /// Packs `target` into `<target>.packed`, replacing any previous output.
    ///
    /// The magic is the last thing written, so an output left behind by a
    /// failure part-way through never resolves as a stub.
    pub fn pack<P: AsRef<Path>>(&self, target: P) -> Result<PackReport> {
        let target = Target::open(target)?;
        let output = packed_path(&target.path);

        let stub_len = copy_stub(&self.stub_template, &output).context("failed copying stub")?;
        log::debug!(
            "copied {stub_len} stub bytes from {} to {}",
            self.stub_template.display(),
            output.display()
        );

        let payload_length = self
            .append_payload(&target.path, &output)
            .context("failed appending stub")?;
        log::debug!(
            "appended {payload_length} {} bytes at offset {stub_len}",
            self.codec.name()
        );

        let mut out = OpenOptions::new()
            .append(true)
            .open(&output)
            .context("failed opening packed file for trailer")?;
        Trailer::new(payload_length).write_to(&mut out)?;
        out.sync_all().context("failed syncing packed file")?;

        log::info!("packed {} into {}", target.path.display(), output.display());

        Ok(PackReport {
            output,
            stub_len,
            payload_offset: stub_len,
            payload_length,
            original_len: target.len,
            format: target.format,
        })
    }

    /// Streams the compressed target onto the end of `output` and returns the
    /// number of compressed bytes written.
    fn append_payload(&self, target: &Path, output: &Path) -> Result<u64> {
        let mut source = File::open(target)
            .with_context(|| format!("failed opening target {}", target.display()))?;
        let destination = OpenOptions::new()
            .append(true)
            .open(output)
            .context("failed opening destination file")?;

        let mut sink = CountingWriter::new(BufWriter::new(destination));
        self.codec
            .encode(&mut source, &mut sink)
            .context("failed appending compressed to destination")?;
        sink.flush().context("failed flushing payload")?;

        Ok(sink.written())
    }
}

/// Copies the stub image to `dst`, truncating whatever was there.
fn copy_stub(src: &Path, dst: &Path) -> Result<u64> {
    let meta = std::fs::metadata(src).context("src file does not exist")?;
    if !meta.is_file() {
        return Err(PackError::NotRegularFile {
            path: src.to_path_buf(),
        }
        .into());
    }

    let mut source = File::open(src).context("failed opening source file")?;
    let mut destination = create_executable(dst).context("failed opening destination file")?;
    let copied = io::copy(&mut source, &mut destination)?;

    Ok(copied)
}

/// Creates or truncates `path` with mode 0755.
pub(crate) fn create_executable(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o755);

    let file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // mode() only applies when the file is created
        file.set_permissions(std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(file)
}
