//! Directory backing writer: translate incoming sector writes into native
//! filesystem operations.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use log::{debug, info, warn};

use crate::dpb::{self, SECTOR_SIZE};
use crate::error::Result;
use crate::extent::{self, Extent};

use super::{DirectoryBacking, PendingBlock};

pub(super) fn write_sector(
    backing: &mut DirectoryBacking,
    track: u16,
    sector: u8,
    data: &[u8; SECTOR_SIZE],
) -> Result<()> {
    if track < backing.dpb.boot_tracks {
        return write_boot(backing, track, sector, data);
    }

    let linear = dpb::linear(&backing.dpb, &backing.interleave, track, sector)?;
    if linear < backing.directory_sectors() {
        return check_dir_sec(backing, linear, data);
    }

    write_data_sector(backing, linear, data)
}

fn write_boot(
    backing: &DirectoryBacking,
    track: u16,
    sector: u8,
    data: &[u8; SECTOR_SIZE],
) -> Result<()> {
    let path = backing.root.join("$BOOT");
    let mut file = OpenOptions::new().write(true).create(true).open(&path)?;
    let offset = (track as u64 * backing.dpb.sectors_per_track as u64 + sector as u64 - 1)
        * SECTOR_SIZE as u64;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    Ok(())
}

fn decode_slot(backing: &DirectoryBacking, slot: usize) -> Extent {
    let wide = backing.dpb.wide_pointers();
    let mut raw = [0u8; extent::EXTENT_SIZE];
    raw.copy_from_slice(
        &backing.dirdata[slot * extent::EXTENT_SIZE..(slot + 1) * extent::EXTENT_SIZE],
    );
    Extent::decode(&raw, wide)
}

fn check_dir_sec(backing: &mut DirectoryBacking, linear: i64, incoming: &[u8; SECTOR_SIZE]) -> Result<()> {
    let sector_start = linear as usize * SECTOR_SIZE;
    let old_sector = &backing.dirdata[sector_start..sector_start + SECTOR_SIZE];
    let extents_per_sector = SECTOR_SIZE / extent::EXTENT_SIZE;

    let mut changed_slot = None;
    for i in 0..extents_per_sector {
        let chunk_start = i * extent::EXTENT_SIZE;
        let chunk_end = chunk_start + extent::EXTENT_SIZE;
        if old_sector[chunk_start..chunk_end] != incoming[chunk_start..chunk_end] {
            changed_slot = Some(sector_start / extent::EXTENT_SIZE + i);
            break;
        }
    }

    let Some(slot) = changed_slot else {
        debug!("directory sector {linear}: no change");
        return Ok(());
    };

    let old = decode_slot(backing, slot);
    let wide = backing.dpb.wide_pointers();
    let mut raw = [0u8; extent::EXTENT_SIZE];
    let chunk_off = (slot * extent::EXTENT_SIZE) - sector_start;
    raw.copy_from_slice(&incoming[chunk_off..chunk_off + extent::EXTENT_SIZE]);
    let new = Extent::decode(&raw, wide);

    let old_deleted = old.is_deleted();
    let new_deleted = new.is_deleted();

    if !old_deleted && new_deleted && new.x_num() == 0 {
        remove_native_file(backing, old.user, &old.file);
    } else if !old_deleted && new_deleted && new.x_num() > 0 {
        debug!("logical-extent-delete, no fs action");
    } else if old_deleted && !new_deleted && new.x_num() == 0 {
        create_exclusive(backing, new.user, &new.file)?;
    } else if old_deleted && !new_deleted && new.x_num() > 0 {
        debug!("logical-extent-add, no fs action");
    } else if new.file != old.file && new.x_num() == 0 {
        rename_native_file(backing, old.user, &old.file, new.user, &new.file)?;
    } else if new.file != old.file && new.x_num() > 0 {
        debug!("logical-extent-rename, no fs action");
    } else {
        commit_blocks(backing, &old, &new)?;
    }

    backing.dirdata[sector_start..sector_start + SECTOR_SIZE].copy_from_slice(incoming);
    backing.reparse_directory();
    Ok(())
}

fn remove_native_file(backing: &mut DirectoryBacking, user: u8, file: &extent::FixedName) {
    if let Some(path) = backing.path_index.remove(&(user, *file)) {
        if let Err(e) = fs::remove_file(&path) {
            warn!("failed to delete {}: {e}", path.display());
        } else {
            info!("deleted {}", path.display());
        }
    }
}

fn create_exclusive(backing: &mut DirectoryBacking, user: u8, file: &extent::FixedName) -> Result<()> {
    let user_dir = backing.root.join(user.to_string());
    fs::create_dir_all(&user_dir)?;
    let path = user_dir.join(file.display_trimmed());
    OpenOptions::new().write(true).create_new(true).open(&path).or_else(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Ok(fs::File::create(&path)?)
        } else {
            Err(e)
        }
    })?;
    backing.path_index.insert((user, *file), path.clone());
    info!("created {}", path.display());
    Ok(())
}

fn rename_native_file(
    backing: &mut DirectoryBacking,
    old_user: u8,
    old_file: &extent::FixedName,
    new_user: u8,
    new_file: &extent::FixedName,
) -> Result<()> {
    let Some(old_path) = backing.path_index.remove(&(old_user, *old_file)) else {
        warn!("rename source {} not tracked", old_file.display_trimmed());
        return Ok(());
    };
    let new_dir = backing.root.join(new_user.to_string());
    fs::create_dir_all(&new_dir)?;
    let new_path = new_dir.join(new_file.display_trimmed());
    fs::rename(&old_path, &new_path)?;
    backing.path_index.insert((new_user, *new_file), new_path.clone());
    info!("renamed {} -> {}", old_path.display(), new_path.display());
    Ok(())
}

fn commit_blocks(backing: &mut DirectoryBacking, old: &Extent, new: &Extent) -> Result<()> {
    backing.pending.sort_by_key(|p| p.linear_sector);

    let records_per_block = backing.dpb.records_per_block() as i64;
    let path = backing
        .path_index
        .get(&(new.user, new.file))
        .cloned()
        .ok_or_else(|| crate::error::EngineError::UnrecognizedBacking { path: backing.root.clone() })?;

    let first_block_in_model = backing
        .directory
        .get(new.user, &new.file)
        .and_then(|r| r.first_block());

    let mut file = OpenOptions::new().write(true).read(true).open(&path)?;
    let mut consumed = vec![false; backing.pending.len()];

    for (slot_idx, &pointer) in new.pointers.iter().enumerate() {
        let old_pointer = old.pointers.get(slot_idx).copied().unwrap_or(0);
        if pointer == 0 || pointer == old_pointer {
            continue;
        }

        let match_idx = backing.pending.iter().position(|p| p.block == pointer);
        let Some(idx) = match_idx else {
            warn!("block-commit: no buffered data for block {pointer}");
            continue;
        };

        let buf = backing.pending[idx].clone();
        let pos = if new.x_num() == 0 {
            (buf.linear_sector - new.pointers[0] as i64 * records_per_block) * SECTOR_SIZE as i64
        } else {
            let base = first_block_in_model.unwrap_or(pointer) as i64;
            (buf.linear_sector - base * records_per_block) * SECTOR_SIZE as i64
        };

        file.seek(SeekFrom::Start(pos.max(0) as u64))?;
        file.write_all(&buf.data)?;
        consumed[idx] = true;
    }

    let leftover: Vec<&PendingBlock> = backing
        .pending
        .iter()
        .zip(consumed.iter())
        .filter(|(_, &c)| !c)
        .map(|(p, _)| p)
        .collect();
    for p in &leftover {
        warn!("unused pending data for block {} discarded", p.block);
    }

    backing.pending.clear();
    Ok(())
}

fn write_data_sector(backing: &mut DirectoryBacking, linear: i64, data: &[u8; SECTOR_SIZE]) -> Result<()> {
    let block = dpb::block_of(&backing.dpb, linear) as u16;
    let records_per_block = backing.dpb.records_per_block() as i64;

    if let Some((user, file)) = backing.directory.owner_of_block(block) {
        if let (Some(rec), Some(path)) = (
            backing.directory.get(user, &file).cloned(),
            backing.path_index.get(&(user, file)).cloned(),
        ) {
            if let Some(first_block) = rec.first_block() {
                let pos = (linear - first_block as i64 * records_per_block) * SECTOR_SIZE as i64;
                let mut file_handle = OpenOptions::new().write(true).open(&path)?;
                file_handle.seek(SeekFrom::Start(pos.max(0) as u64))?;
                file_handle.write_all(data)?;
                return Ok(());
            }
        }
    }

    backing.pending.push(PendingBlock { linear_sector: linear, block, data: *data });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpb::Dpb;
    use crate::extent::FixedName;
    use std::fs;

    fn dir_sector_for(backing: &DirectoryBacking) -> (u16, u8) {
        // First directory sector is linear 0; translate back to (track, sector).
        let phys = backing.interleave.physical(0);
        (backing.dpb.boot_tracks, phys)
    }

    #[test]
    fn create_file_from_empty_directory_slot() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("0")).unwrap();
        let mut backing = DirectoryBacking::mount(dir.path(), Dpb::floppy_8in()).unwrap();

        let mut sector = [0xE5u8; SECTOR_SIZE];
        let ext = Extent {
            user: 0,
            file: FixedName::from_parts("NEW", "TXT"),
            xl: 0,
            bc: 0,
            xh: 0,
            rc: 0,
            pointers: vec![0; 16],
        };
        sector[0..32].copy_from_slice(&ext.encode(false));

        let (track, sec) = dir_sector_for(&backing);
        backing.write_sector(track, sec, &sector).unwrap();

        assert!(dir.path().join("0").join("NEW.TXT").exists());
    }

    #[test]
    fn delete_file_when_user_byte_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let user0 = dir.path().join("0");
        fs::create_dir(&user0).unwrap();
        fs::write(user0.join("OLD.TXT"), b"x").unwrap();
        let mut backing = DirectoryBacking::mount(dir.path(), Dpb::floppy_8in()).unwrap();

        let (track, sec) = dir_sector_for(&backing);
        let old_sector = backing.read_sector(track, sec).unwrap();
        let mut new_sector = old_sector;
        new_sector[0] = 0xE5;

        backing.write_sector(track, sec, &new_sector).unwrap();
        assert!(!user0.join("OLD.TXT").exists());
    }

    #[test]
    fn rename_file_when_name_field_changes() {
        let dir = tempfile::tempdir().unwrap();
        let user0 = dir.path().join("0");
        fs::create_dir(&user0).unwrap();
        fs::write(user0.join("OLD.TXT"), b"x").unwrap();
        let mut backing = DirectoryBacking::mount(dir.path(), Dpb::floppy_8in()).unwrap();

        let (track, sec) = dir_sector_for(&backing);
        let old_sector = backing.read_sector(track, sec).unwrap();
        let old_ext = decode_slot(&backing, 0);
        let mut new_ext = old_ext.clone();
        new_ext.file = FixedName::from_parts("NEW", "TXT");
        let mut new_sector = old_sector;
        new_sector[0..32].copy_from_slice(&new_ext.encode(false));

        backing.write_sector(track, sec, &new_sector).unwrap();
        assert!(!user0.join("OLD.TXT").exists());
        assert!(user0.join("NEW.TXT").exists());
    }

    #[test]
    fn no_change_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("0")).unwrap();
        let mut backing = DirectoryBacking::mount(dir.path(), Dpb::floppy_8in()).unwrap();
        let (track, sec) = dir_sector_for(&backing);
        let sector = backing.read_sector(track, sec).unwrap();
        backing.write_sector(track, sec, &sector).unwrap();
    }
}
