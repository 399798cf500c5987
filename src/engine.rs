//! Engine: owns all per-process state — mounted units, the descriptor,
//! and the host bridge — behind a single handle the worker thread drives.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{info, warn};

use crate::bridge::HostBridge;
use crate::config::{self, DiskMap};
use crate::dirbacking::DirectoryBacking;
use crate::dpb::{Dpb, SECTOR_SIZE};
use crate::error::{EngineError, Result};
use crate::fif::{self, Descriptor};
use crate::image::ImageBacking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Image,
    Directory,
    Local,
}

enum Backing {
    Image(ImageBacking),
    Directory(DirectoryBacking),
}

struct Unit {
    kind: UnitKind,
    root_path: PathBuf,
    backing: Backing,
}

pub struct Engine {
    units: HashMap<u8, Unit>,
    descriptor: Descriptor,
    bridge: HostBridge,
    diskmap_path: Option<PathBuf>,
}

impl Engine {
    pub fn new(bridge: HostBridge) -> Self {
        Engine { units: HashMap::new(), descriptor: Descriptor::new(), bridge, diskmap_path: None }
    }

    /// Mount every drive named in `map`, choosing image vs. directory
    /// backing by whether the path is a regular file or a directory.
    pub fn load_diskmap(&mut self, map: &DiskMap, diskmap_path: &std::path::Path) -> Result<()> {
        self.diskmap_path = Some(diskmap_path.to_path_buf());
        for (drive, path) in map.entries() {
            let unit = config::unit_for_drive(drive)
                .ok_or(EngineError::UnknownDrive { drive })?;
            self.mount_unit(unit, std::path::Path::new(path))?;
        }
        Ok(())
    }

    fn dpb_for(path: &std::path::Path) -> Dpb {
        match path.extension().and_then(|e| e.to_str()) {
            Some("hdd") => Dpb::hdd(),
            _ => Dpb::floppy_8in(),
        }
    }

    fn mount_unit(&mut self, unit: u8, path: &std::path::Path) -> Result<()> {
        if path.is_file() {
            let backing = ImageBacking::open(path, Self::dpb_for(path))?;
            self.units.insert(unit, Unit { kind: UnitKind::Image, root_path: path.to_path_buf(), backing: Backing::Image(backing) });
            info!("mounted unit {unit} as image {}", path.display());
        } else if path.is_dir() {
            let backing = DirectoryBacking::mount(path, Self::dpb_for(path))?;
            self.units.insert(unit, Unit { kind: UnitKind::Directory, root_path: path.to_path_buf(), backing: Backing::Directory(backing) });
            info!("mounted unit {unit} as directory {}", path.display());
        } else {
            return Err(EngineError::InvalidBackingPath { path: path.to_path_buf() });
        }
        Ok(())
    }

    pub fn unit_kind(&self, unit: u8) -> Option<UnitKind> {
        self.units.get(&unit).map(|u| u.kind)
    }

    pub fn read_sector(&self, unit: u8, track: u16, sector: u8) -> Result<[u8; SECTOR_SIZE]> {
        let u = self.units.get(&unit).ok_or(EngineError::UnknownDrive { drive: '?' })?;
        match &u.backing {
            Backing::Image(img) => img.read_sector(track, sector),
            Backing::Directory(dir) => dir.read_sector(track, sector),
        }
    }

    pub fn write_sector(&mut self, unit: u8, track: u16, sector: u8, data: &[u8; SECTOR_SIZE]) -> Result<()> {
        let u = self.units.get_mut(&unit).ok_or(EngineError::UnknownDrive { drive: '?' })?;
        match &mut u.backing {
            Backing::Image(img) => img.write_sector(track, sector, data),
            Backing::Directory(dir) => dir.write_sector(track, sector, data),
        }
    }

    pub fn bridge_dma_get(&self, addr: u16, len: usize) -> Result<Vec<u8>> {
        self.bridge.dma_get(addr, len)
    }

    pub fn bridge_dma_put(&self, addr: u16, data: &[u8]) -> Result<()> {
        self.bridge.dma_put(addr, data)
    }

    pub fn register(&self) -> Result<()> {
        self.bridge.register()
    }

    pub fn deregister(&self) {
        self.bridge.deregister();
    }

    /// Feed one byte through the descriptor state machine. Returns `true`
    /// if a command was executed.
    pub fn process_byte(&mut self, byte: u8) -> Result<bool> {
        let Some(addr) = self.descriptor.feed(byte) else {
            return Ok(false);
        };
        fif::execute(self, addr)?;
        Ok(true)
    }

    pub fn process_bulk(&mut self, buf: &[u8; 10]) -> Result<()> {
        let addr = self.descriptor.feed_bulk(buf);
        fif::execute(self, addr)
    }

    pub fn save_diskmap(&self, map: &DiskMap) -> Result<()> {
        let path = self.diskmap_path.clone().ok_or_else(|| EngineError::CorruptDiskmap {
            path: PathBuf::new(),
            reason: "no diskmap path recorded".to_string(),
        })?;
        map.save(&path)
    }

    pub fn reload_diskmap(&mut self) -> Result<()> {
        let path = self.diskmap_path.clone().ok_or_else(|| EngineError::CorruptDiskmap {
            path: PathBuf::new(),
            reason: "no diskmap path recorded".to_string(),
        })?;
        let map = DiskMap::load(&path)?;
        self.units.clear();
        self.load_diskmap(&map, &path)
    }

    pub fn unload_drive(&mut self, drive: char) -> Result<()> {
        let unit = config::unit_for_drive(drive).ok_or(EngineError::UnknownDrive { drive })?;
        if self.units.remove(&unit).is_none() {
            warn!("unload: drive {drive} (unit {unit}) was not mounted");
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.deregister();
    }
}
