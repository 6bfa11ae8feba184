use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use selfpak_core::{Mode, PackReport, Packer, SelfImage, StubRuntime, Zstd};
use std::path::{Path, PathBuf};

const USAGE: &str = "USAGE: selfpak <executable_path>";

/// Self-extracting executable packer
#[derive(Parser)]
#[command(
    name = "selfpak",
    about = "Pack an executable into a self-extracting copy of this tool",
    version,
    author
)]
struct Cli {
    /// Path to the executable to pack; output goes to <path>.packed
    path: Option<PathBuf>,

    /// zstd compression level
    #[arg(
        short,
        long,
        default_value_t = Zstd::DEFAULT_LEVEL,
        value_parser = clap::value_parser!(i32).range(1..=22)
    )]
    level: i32,
}

fn main() -> Result<()> {
    env_logger::init();

    let image = SelfImage::current()?;
    let mode = image.resolve_mode()?;
    match mode {
        Mode::Stub => run_stub(image),
        Mode::Packer => run_packer(image.path()),
    }
}

/// Arguments are never parsed here: they belong to the payload.
fn run_stub(image: SelfImage) -> Result<()> {
    let launched = StubRuntime::new(image, Box::new(Zstd::default()))
        .launch(std::env::args_os().skip(1))?;
    let status = launched.wait()?;

    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}

fn run_packer(self_path: &Path) -> Result<()> {
    let cli = Cli::parse();

    let Some(path) = cli.path else {
        println!("{USAGE}");
        return Ok(());
    };

    let packer = Packer::new(self_path, Box::new(Zstd::new(cli.level)));
    let report = packer
        .pack(&path)
        .with_context(|| format!("failed packing {}", path.display()))?;
    print_report(&path, &report);

    Ok(())
}

fn print_report(target: &Path, report: &PackReport) {
    println!(
        "{} {} -> {}",
        "Packed".green().bold(),
        target.display(),
        report.output.display()
    );
    println!(
        "{:<10} {}\n{:<10} {} bytes\n{:<10} {} bytes at 0x{:x} ({:.1}% of original)\n{:<10} {} bytes",
        "Format",
        report.format,
        "Stub",
        report.stub_len,
        "Payload",
        report.payload_length,
        report.payload_offset,
        report.ratio(),
        "Total",
        report.packed_len(),
    );
}
