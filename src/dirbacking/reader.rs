//! Directory backing reader: mount-time synthesis and sector reads.

use std::fs;
use std::io::{Read, Seek, SeekFrom};

use log::{debug, info, warn};

use crate::dpb::{self, SECTOR_SIZE};
use crate::error::Result;
use crate::extent::{self, FixedName};

use super::DirectoryBacking;

const EOF_FILL: u8 = 0x1A;
const DELETED_FILL: u8 = 0xE5;

pub(super) fn build_directory(backing: &mut DirectoryBacking) -> Result<()> {
    backing.has_boot = backing.root.join("$BOOT").is_file();

    let dir_bytes = backing.dpb.directory_entries as usize * extent::EXTENT_SIZE;
    backing.dirdata = vec![DELETED_FILL; dir_bytes];

    let wide = backing.dpb.wide_pointers();
    let mut next_block = backing.dpb.first_data_block();
    let mut slot = 0usize;

    for user in 0u8..=15 {
        let user_dir = backing.root.join(user.to_string());
        if !user_dir.is_dir() {
            continue;
        }

        let mut entries: Vec<fs::DirEntry> = fs::read_dir(&user_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        entries.sort_by_key(|e| e.file_name());

        let mut assigned: Vec<FixedName> = Vec::new();

        for entry in entries {
            let native_name = entry.file_name().to_string_lossy().into_owned();
            let short = match super::shorten(&native_name, &assigned) {
                Ok(n) => n,
                Err(e) => {
                    warn!("skipping {native_name} in user {user}: {e}");
                    continue;
                }
            };

            let target_name = short.display_trimmed();
            let target_path = user_dir.join(&target_name);
            if target_path != entry.path() {
                fs::rename(entry.path(), &target_path)?;
                debug!("renamed {native_name} -> {target_name} (user {user})");
            }
            assigned.push(short);
            backing.path_index.insert((user, short), target_path.clone());

            let size = fs::metadata(&target_path)?.len() as usize;
            let extents = extent::encode_file(
                user,
                short,
                size,
                backing.dpb.block_size_bytes,
                wide,
                &mut next_block,
            );

            for ext in extents {
                if slot >= backing.dpb.directory_entries as usize {
                    warn!("directory full, dropping extent for {target_name}");
                    break;
                }
                let raw = ext.encode(wide);
                backing.dirdata[slot * extent::EXTENT_SIZE..(slot + 1) * extent::EXTENT_SIZE]
                    .copy_from_slice(&raw);
                slot += 1;
            }
        }
    }

    backing.reparse_directory();
    info!("mounted directory backing at {} ({} extents)", backing.root.display(), slot);
    Ok(())
}

pub(super) fn read_sector(backing: &DirectoryBacking, track: u16, sector: u8) -> Result<[u8; SECTOR_SIZE]> {
    if track < backing.dpb.boot_tracks {
        return Ok(read_boot(backing, track, sector));
    }

    let linear = dpb::linear(&backing.dpb, &backing.interleave, track, sector)?;
    if linear < backing.directory_sectors() {
        return Ok(read_directory_sector(backing, linear));
    }

    Ok(read_data_sector(backing, linear))
}

fn read_boot(backing: &DirectoryBacking, track: u16, sector: u8) -> [u8; SECTOR_SIZE] {
    let mut out = [DELETED_FILL; SECTOR_SIZE];
    if !backing.has_boot {
        return out;
    }
    let offset = (track as u64 * backing.dpb.sectors_per_track as u64 + sector as u64 - 1)
        * SECTOR_SIZE as u64;
    if let Ok(mut file) = fs::File::open(backing.root.join("$BOOT")) {
        if file.seek(SeekFrom::Start(offset)).is_ok() {
            let _ = file.read(&mut out);
        }
    }
    out
}

fn read_directory_sector(backing: &DirectoryBacking, linear: i64) -> [u8; SECTOR_SIZE] {
    let mut out = [DELETED_FILL; SECTOR_SIZE];
    let start = linear as usize * SECTOR_SIZE;
    if start + SECTOR_SIZE <= backing.dirdata.len() {
        out.copy_from_slice(&backing.dirdata[start..start + SECTOR_SIZE]);
    }
    out
}

fn read_data_sector(backing: &DirectoryBacking, linear: i64) -> [u8; SECTOR_SIZE] {
    let block = dpb::block_of(&backing.dpb, linear) as u16;
    let records_per_block = backing.dpb.records_per_block() as i64;

    let Some((user, file)) = backing.directory.owner_of_block(block) else {
        return [DELETED_FILL; SECTOR_SIZE];
    };
    let Some(rec) = backing.directory.get(user, &file) else {
        return [DELETED_FILL; SECTOR_SIZE];
    };
    let Some(first_block) = rec.first_block() else {
        return [DELETED_FILL; SECTOR_SIZE];
    };
    let Some(path) = backing.path_index.get(&(user, file)) else {
        return [DELETED_FILL; SECTOR_SIZE];
    };

    let pos = (linear - first_block as i64 * records_per_block) * SECTOR_SIZE as i64;
    let mut out = [EOF_FILL; SECTOR_SIZE];
    if let Ok(mut f) = fs::File::open(path) {
        if f.seek(SeekFrom::Start(pos as u64)).is_ok() {
            let mut buf = vec![0u8; SECTOR_SIZE];
            if let Ok(n) = f.read(&mut buf) {
                out[..n].copy_from_slice(&buf[..n]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn build_directory_normalizes_and_encodes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let user0 = dir.path().join("0");
        fs::create_dir(&user0).unwrap();
        fs::write(user0.join("hello.txt"), b"hi").unwrap();

        let backing = DirectoryBacking::mount(dir.path(), crate::dpb::Dpb::floppy_8in()).unwrap();
        let rec = backing
            .directory
            .get(0, &FixedName::from_parts("HELLO", "TXT"))
            .unwrap();
        assert_eq!(rec.total_records, 1);
        assert!(user0.join("HELLO.TXT").exists());
    }

    #[test]
    fn data_sector_of_short_file_is_eof_padded() {
        let dir = tempfile::tempdir().unwrap();
        let user0 = dir.path().join("0");
        fs::create_dir(&user0).unwrap();
        fs::write(user0.join("HELLO.TXT"), b"hi").unwrap();

        let backing = DirectoryBacking::mount(dir.path(), crate::dpb::Dpb::floppy_8in()).unwrap();
        let rec = backing
            .directory
            .get(0, &FixedName::from_parts("HELLO", "TXT"))
            .unwrap();
        let first_block = rec.first_block().unwrap();
        let records_per_block = backing.dpb.records_per_block();
        let linear = first_block as i64 * records_per_block as i64;
        let dir_sectors = backing.directory_sectors();
        let track = (dir_sectors + linear) as u16 / backing.dpb.sectors_per_track + backing.dpb.boot_tracks;
        let _ = track; // geometry not exercised directly; read via read_data_sector helper
        let sector = read_data_sector(&backing, linear);
        assert_eq!(&sector[0..2], b"hi");
        assert!(sector[2..].iter().all(|&b| b == EOF_FILL));
    }

    #[test]
    fn no_boot_file_returns_0xe5_fill() {
        let dir = tempfile::tempdir().unwrap();
        let backing = DirectoryBacking::mount(dir.path(), crate::dpb::Dpb::floppy_8in()).unwrap();
        let sector = backing.read_sector(0, 1).unwrap();
        assert!(sector.iter().all(|&b| b == DELETED_FILL));
    }
}
