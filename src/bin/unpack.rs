//! `unpack` — reconstruct a native directory tree from a CP/M disk image.
//!
//! Reads the directory sectors, folds extents into a per-user file map,
//! then for each file walks its block pointers in order, appending each
//! block's sectors to the destination file verbatim — including any
//! trailing `0x1A` EOF padding on the last sector, so the result round-trips
//! byte-for-byte back through `pack`.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use fif_remote_disk::directory::Directory;
use fif_remote_disk::dpb::{self, Dpb, Interleave, SECTOR_SIZE};
use fif_remote_disk::extent::{Extent, EXTENT_SIZE};
use fif_remote_disk::image::ImageBacking;

const DEL_BYTE: u8 = 0xE5;

#[derive(Parser)]
#[command(name = "unpack")]
#[command(about = "Unpack a CP/M disk image into a native directory tree", long_about = None)]
struct Cli {
    /// Source image file.
    image: PathBuf,

    /// Destination directory; created if missing, must be empty.
    dest: PathBuf,

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
    let interleave = Interleave::for_dpb(&dpb);
    let image = ImageBacking::open(&cli.image, dpb.clone()).context("opening source image")?;

    fs::create_dir_all(&cli.dest).context("creating destination directory")?;

    if dpb.boot_tracks > 0 {
        let first = image.read_sector(0, 1)?;
        if first[0] != DEL_BYTE {
            write_boot(&image, &dpb, &cli.dest)?;
            info!("wrote boot record to {}", cli.dest.join("$BOOT").display());
        }
    }

    let dirdata = read_directory_sectors(&image, &dpb, &interleave)?;
    let wide = dpb.wide_pointers();
    let extents: Vec<Extent> = dirdata
        .chunks_exact(EXTENT_SIZE)
        .map(|chunk| {
            let mut raw = [0u8; EXTENT_SIZE];
            raw.copy_from_slice(chunk);
            Extent::decode(&raw, wide)
        })
        .collect();

    let mut directory = Directory::new();
    directory.rebuild(&extents);

    let records_per_block = dpb.records_per_block() as u64;

    for user in 0u8..=15 {
        let files: Vec<_> = directory.files(user).collect();
        if files.is_empty() {
            continue;
        }
        let user_dir = cli.dest.join(user.to_string());
        fs::create_dir_all(&user_dir)?;

        for (name, rec) in files {
            let path = user_dir.join(name.display_trimmed());
            let mut file = File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;

            let mut remaining_records = rec.total_records;
            for &block in &rec.block_pointers {
                let r = remaining_records.min(records_per_block);
                remaining_records = remaining_records.saturating_sub(r);

                for s in 0..r {
                    let linear = block as i64 * records_per_block as i64 + s as i64;
                    let (track, sector) = dpb::track_sector_of_linear(&dpb, &interleave, linear);
                    let data = image.read_sector(track, sector)?;
                    file.write_all(&data)?;
                }
            }
            info!("wrote {}", path.display());
        }
    }

    Ok(())
}

fn write_boot(image: &ImageBacking, dpb: &Dpb, dest: &std::path::Path) -> Result<()> {
    let mut out = File::create(dest.join("$BOOT"))?;
    for track in 0..dpb.boot_tracks {
        for sector in 1..=dpb.sectors_per_track as u8 {
            let data = image.read_sector(track, sector)?;
            out.write_all(&data)?;
        }
    }
    Ok(())
}

fn read_directory_sectors(image: &ImageBacking, dpb: &Dpb, interleave: &Interleave) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(dpb.directory_sectors() as usize * SECTOR_SIZE);
    for linear in 0..dpb.directory_sectors() as i64 {
        let (track, sector) = dpb::track_sector_of_linear(dpb, interleave, linear);
        out.extend_from_slice(&image.read_sector(track, sector)?);
    }
    Ok(out)
}
