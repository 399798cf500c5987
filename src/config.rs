//! Diskmap configuration: drive letter to backing-path mapping, persisted
//! as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Drive letter → CP/M unit number.
pub fn unit_for_drive(drive: char) -> Option<u8> {
    match drive.to_ascii_uppercase() {
        'A' => Some(1),
        'B' => Some(2),
        'C' => Some(4),
        'D' => Some(8),
        'I' => Some(15),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskMap {
    #[serde(flatten)]
    drives: BTreeMap<char, String>,
}

impl DiskMap {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Io { path: Some(path.to_path_buf()), source: e })?;
        let map: DiskMap = serde_json::from_str(&text)
            .map_err(|e| EngineError::CorruptDiskmap { path: path.to_path_buf(), reason: e.to_string() })?;
        map.validate(path)?;
        Ok(map)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::CorruptDiskmap { path: path.to_path_buf(), reason: e.to_string() })?;
        std::fs::write(path, text)
            .map_err(|e| EngineError::Io { path: Some(path.to_path_buf()), source: e })?;
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        for &drive in self.drives.keys() {
            if unit_for_drive(drive).is_none() {
                return Err(EngineError::CorruptDiskmap {
                    path: path.to_path_buf(),
                    reason: format!("unknown drive letter {drive}"),
                });
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (char, &str)> {
        self.drives.iter().map(|(&d, p)| (d, p.as_str()))
    }

    pub fn insert(&mut self, drive: char, path: String) {
        self.drives.insert(drive, path);
    }

    pub fn remove(&mut self, drive: char) {
        self.drives.remove(&drive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_letters_map_to_spec_units() {
        assert_eq!(unit_for_drive('A'), Some(1));
        assert_eq!(unit_for_drive('B'), Some(2));
        assert_eq!(unit_for_drive('C'), Some(4));
        assert_eq!(unit_for_drive('D'), Some(8));
        assert_eq!(unit_for_drive('I'), Some(15));
        assert_eq!(unit_for_drive('Z'), None);
    }

    #[test]
    fn loads_and_validates_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskmap.json");
        std::fs::write(&path, r#"{"A":"cpm22.dsk","B":"comms.dsk"}"#).unwrap();

        let map = DiskMap::load(&path).unwrap();
        let entries: Vec<_> = map.entries().collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn rejects_unknown_drive_letter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskmap.json");
        std::fs::write(&path, r#"{"Z":"bogus.dsk"}"#).unwrap();
        assert!(DiskMap::load(&path).is_err());
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diskmap.json");
        let mut map = DiskMap { drives: BTreeMap::new() };
        map.insert('A', "cpm22.dsk".to_string());
        map.save(&path).unwrap();

        let reloaded = DiskMap::load(&path).unwrap();
        assert_eq!(reloaded.entries().count(), 1);
    }
}
