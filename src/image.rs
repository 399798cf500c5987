//! Image backing: raw random-access sector I/O against a flat file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::dpb::{self, Dpb, Interleave, SECTOR_SIZE};
use crate::error::{EngineError, Result};

pub struct ImageBacking {
    path: PathBuf,
    dpb: Dpb,
    interleave: Interleave,
}

impl ImageBacking {
    pub fn open(path: &Path, dpb: Dpb) -> Result<Self> {
        if !path.is_file() {
            return Err(EngineError::InvalidBackingPath { path: path.to_path_buf() });
        }
        let interleave = Interleave::for_dpb(&dpb);
        Ok(ImageBacking { path: path.to_path_buf(), dpb, interleave })
    }

    /// Create a fresh zero-filled image of the right size for `dpb`, every
    /// sector set to `0xE5` (CP/M's "never written" fill byte).
    pub fn create(path: &Path, dpb: Dpb) -> Result<Self> {
        let mut file = File::create(path)?;
        let blank = vec![0xE5u8; dpb.image_size_bytes()];
        file.write_all(&blank)?;
        let interleave = Interleave::for_dpb(&dpb);
        Ok(ImageBacking { path: path.to_path_buf(), dpb, interleave })
    }

    pub fn dpb(&self) -> &Dpb {
        &self.dpb
    }

    fn byte_offset(&self, track: u16, sector: u8) -> Result<u64> {
        if track < self.dpb.boot_tracks {
            Ok((track as u64 * self.dpb.sectors_per_track as u64 + sector as u64 - 1)
                * SECTOR_SIZE as u64)
        } else {
            let linear = dpb::linear(&self.dpb, &self.interleave, track, sector)?;
            Ok(linear as u64 * SECTOR_SIZE as u64)
        }
    }

    pub fn read_sector(&self, track: u16, sector: u8) -> Result<[u8; SECTOR_SIZE]> {
        let offset = self.byte_offset(track, sector)?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; SECTOR_SIZE];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_sector(&self, track: u16, sector: u8, data: &[u8; SECTOR_SIZE]) -> Result<()> {
        let offset = self.byte_offset(track, sector)?;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_data_sector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dsk");
        let backing = ImageBacking::create(&path, Dpb::floppy_8in()).unwrap();

        let mut payload = [0u8; SECTOR_SIZE];
        payload[0] = 0xAB;
        backing.write_sector(5, 3, &payload).unwrap();
        let got = backing.read_sector(5, 3).unwrap();
        assert_eq!(got, payload);
    }

    #[test]
    fn boot_track_bypasses_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dsk");
        let backing = ImageBacking::create(&path, Dpb::floppy_8in()).unwrap();

        let mut payload = [0u8; SECTOR_SIZE];
        payload[0] = 0x42;
        backing.write_sector(0, 1, &payload).unwrap();
        assert_eq!(backing.byte_offset(0, 1).unwrap(), 0);
        assert_eq!(backing.read_sector(0, 1).unwrap(), payload);
    }

    #[test]
    fn fresh_image_is_filled_with_0xe5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dsk");
        let backing = ImageBacking::create(&path, Dpb::floppy_8in()).unwrap();
        let sector = backing.read_sector(10, 1).unwrap();
        assert!(sector.iter().all(|&b| b == 0xE5));
    }

    #[test]
    fn open_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.dsk");
        assert!(ImageBacking::open(&path, Dpb::floppy_8in()).is_err());
    }
}
