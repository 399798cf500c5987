//! Directory backing: synthesize a CP/M disk from a native directory tree
//! and translate host writes back into filesystem operations.
//!
//! This module owns the shared state and the `shorten()` normalizer;
//! [`reader`] builds the synthetic directory and answers reads, [`writer`]
//! diffs incoming directory sectors and answers writes.

mod reader;
mod writer;

use std::collections::HashMap;
use std::path::PathBuf;

use log::warn;

use crate::directory::Directory;
use crate::dpb::{Dpb, Interleave};
use crate::extent::FixedName;

const ILLEGAL_CHARS: &str = "<>.,;:=?*[]%|()/\\_";

/// One buffered data-sector write whose owning extent hasn't committed yet.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub linear_sector: i64,
    pub block: u16,
    pub data: [u8; crate::dpb::SECTOR_SIZE],
}

pub struct DirectoryBacking {
    pub(crate) root: PathBuf,
    pub(crate) dpb: Dpb,
    pub(crate) interleave: Interleave,
    pub(crate) has_boot: bool,
    pub(crate) dirdata: Vec<u8>,
    pub(crate) directory: Directory,
    pub(crate) pending: Vec<PendingBlock>,
    pub(crate) path_index: HashMap<(u8, FixedName), PathBuf>,
}

impl DirectoryBacking {
    pub fn mount(root: &std::path::Path, dpb: Dpb) -> crate::error::Result<Self> {
        if !root.is_dir() {
            return Err(crate::error::EngineError::InvalidBackingPath { path: root.to_path_buf() });
        }
        let interleave = Interleave::for_dpb(&dpb);
        let mut backing = DirectoryBacking {
            root: root.to_path_buf(),
            dpb,
            interleave,
            has_boot: false,
            dirdata: Vec::new(),
            directory: Directory::new(),
            pending: Vec::new(),
            path_index: HashMap::new(),
        };
        reader::build_directory(&mut backing)?;
        Ok(backing)
    }

    pub fn read_sector(&self, track: u16, sector: u8) -> crate::error::Result<[u8; crate::dpb::SECTOR_SIZE]> {
        reader::read_sector(self, track, sector)
    }

    pub fn write_sector(
        &mut self,
        track: u16,
        sector: u8,
        data: &[u8; crate::dpb::SECTOR_SIZE],
    ) -> crate::error::Result<()> {
        writer::write_sector(self, track, sector, data)
    }

    fn directory_sectors(&self) -> i64 {
        self.dpb.directory_sectors() as i64
    }

    fn decode_all_extents(&self) -> Vec<crate::extent::Extent> {
        let wide = self.dpb.wide_pointers();
        self.dirdata
            .chunks_exact(crate::extent::EXTENT_SIZE)
            .map(|chunk| {
                let mut raw = [0u8; crate::extent::EXTENT_SIZE];
                raw.copy_from_slice(chunk);
                crate::extent::Extent::decode(&raw, wide)
            })
            .collect()
    }

    fn reparse_directory(&mut self) {
        let extents = self.decode_all_extents();
        self.directory.rebuild(&extents);
    }
}

/// Deterministic 8.3 normalization (Glossary: `shorten`).
///
/// `already_short` holds the short names already assigned within the same
/// user area, in processing order; collision suffixing only engages when
/// the raw stem itself needed truncating, matching the behavior this was
/// distilled from.
pub fn shorten(native_name: &str, already_short: &[FixedName]) -> crate::error::Result<FixedName> {
    let (raw_stem, raw_ext) = match native_name.rfind('.') {
        Some(idx) if idx > 0 => (&native_name[..idx], &native_name[idx + 1..]),
        _ => (native_name, ""),
    };

    let mut stem = strip_illegal(raw_stem);
    let ext = strip_illegal(raw_ext).chars().take(3).collect::<String>();

    let mut tail: u8 = 0;
    if stem.len() > 8 {
        tail = 1;
        let head: String = stem.chars().take(6).collect();
        stem = format!("{head}~{tail:X}");
    } else if stem.len() < 8 {
        // leave short stems as-is; FixedName pads with spaces on encode.
    } else {
        stem.truncate(8);
    }

    let mut candidate = FixedName::from_parts(&stem, &ext);

    while tail != 0 && already_short.contains(&candidate) && tail < 15 {
        tail += 1;
        let head: String = stem.chars().take(7).collect();
        let mut bumped = head;
        bumped.push(std::char::from_digit(tail as u32, 16).unwrap().to_ascii_uppercase());
        candidate = FixedName::from_parts(&bumped, &ext);
    }

    if tail != 0 && already_short.contains(&candidate) {
        warn!("too many short-name collisions for stem {raw_stem}");
        return Err(crate::error::EngineError::ShortenCollision { stem: raw_stem.to_string() });
    }

    Ok(candidate)
}

fn strip_illegal(s: &str) -> String {
    s.chars()
        .filter(|c| !ILLEGAL_CHARS.contains(*c) && *c != ' ')
        .flat_map(|c| c.to_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_pass_through_unchanged() {
        let n = shorten("hello.txt", &[]).unwrap();
        assert_eq!(n.display_trimmed(), "HELLO.TXT");
    }

    #[test]
    fn strips_illegal_characters_and_spaces() {
        let n = shorten("my file[1].txt", &[]).unwrap();
        assert_eq!(n.display_trimmed(), "MYFILE1.TXT");
    }

    #[test]
    fn long_stem_gets_truncated_with_suffix() {
        let n = shorten("verylongfilename.dat", &[]).unwrap();
        assert_eq!(n.display_trimmed(), "VERYLO~1.DAT");
    }

    #[test]
    fn long_stem_collision_bumps_suffix() {
        let first = shorten("verylongfilename.dat", &[]).unwrap();
        let second = shorten("verylongotherfile.dat", &[first]).unwrap();
        assert_eq!(second.display_trimmed(), "VERYLO~2.DAT");
    }
}
