//! `pack` — build a CP/M disk image from a native directory tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use fif_remote_disk::dirbacking::DirectoryBacking;
use fif_remote_disk::dpb::Dpb;
use fif_remote_disk::image::ImageBacking;

#[derive(Parser)]
#[command(name = "pack")]
#[command(about = "Pack a native directory tree into a CP/M disk image", long_about = None)]
struct Cli {
    /// Source directory, laid out as user-area subdirectories 0-15 plus an
    /// optional `$BOOT` file.
    source: PathBuf,

    /// Destination image file; created fresh (overwritten if it exists).
    image: PathBuf,

    /// Use the hard-disk shape instead of the 8" floppy shape.
    #[arg(long)]
    hdd: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .context("failed to initialize logger")?;

    let dpb = if cli.hdd { Dpb::hdd() } else { Dpb::floppy_8in() };

    let backing = DirectoryBacking::mount(&cli.source, dpb.clone())
        .context("synthesizing directory view")?;
    let image = ImageBacking::create(&cli.image, dpb.clone())
        .context("creating destination image")?;

    for track in 0..dpb.tracks {
        for sector in 1..=dpb.sectors_per_track as u8 {
            let data = backing
                .read_sector(track, sector)
                .with_context(|| format!("reading track {track} sector {sector}"))?;
            image
                .write_sector(track, sector, &data)
                .with_context(|| format!("writing track {track} sector {sector}"))?;
        }
    }

    info!(
        "packed {} into {} ({} tracks x {} sectors)",
        cli.source.display(),
        cli.image.display(),
        dpb.tracks,
        dpb.sectors_per_track
    );
    Ok(())
}
