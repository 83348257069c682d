//! ISO 9660 directory walk.
//!
//! Only the primary volume descriptor's hierarchy is read; Joliet and Rock
//! Ridge names are not interpreted. File extents are contiguous, so every
//! file is a window onto the image.

use crate::entry::{Entry, EntryEnumerator, EntryVisitor};
use crate::error::{ArchiveError, Result};
use formatid_core::{ContainerKind, Resource, WindowResource};
use std::collections::HashSet;

/// Size of a volume descriptor sector.
pub const SECTOR_SIZE: u64 = 2048;
/// First volume descriptor sector.
const DESCRIPTOR_START: u64 = 16;
/// Descriptors scanned before giving up on finding the primary one.
const MAX_DESCRIPTORS: u64 = 32;
const STANDARD_ID: &[u8; 5] = b"CD001";

const DESCRIPTOR_PRIMARY: u8 = 1;
const DESCRIPTOR_TERMINATOR: u8 = 255;

const FLAG_DIRECTORY: u8 = 0x02;
/// Minimum directory record length.
const RECORD_HEADER: usize = 33;
/// Nesting limit for directory walks.
const MAX_DEPTH: usize = 64;
/// Largest directory extent read in one piece.
const MAX_DIRECTORY_SIZE: u64 = 16 * 1024 * 1024;

fn corrupt(reason: impl Into<String>) -> ArchiveError {
    ArchiveError::corrupt(ContainerKind::Iso, reason)
}

/// One directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirectoryRecord {
    extent: u32,
    size: u32,
    flags: u8,
    name: Vec<u8>,
}

impl DirectoryRecord {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_HEADER {
            return Err(corrupt("short directory record"));
        }
        let name_len = data[32] as usize;
        let name = data
            .get(RECORD_HEADER..RECORD_HEADER + name_len)
            .ok_or_else(|| corrupt("directory record name past end of record"))?;
        Ok(Self {
            extent: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            size: u32::from_le_bytes([data[10], data[11], data[12], data[13]]),
            flags: data[25],
            name: name.to_vec(),
        })
    }

    fn is_dir(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// The self (`\0`) and parent (`\1`) entries.
    fn is_special(&self) -> bool {
        matches!(self.name.as_slice(), [0] | [1])
    }

    /// Display name with the `;1` version suffix and a bare trailing dot
    /// removed.
    fn display_name(&self) -> String {
        let name = String::from_utf8_lossy(&self.name).into_owned();
        let base = match name.rsplit_once(';') {
            Some((base, version)) if version.chars().all(|c| c.is_ascii_digit()) => base,
            _ => name.as_str(),
        };
        base.strip_suffix('.').unwrap_or(base).to_string()
    }
}

/// Location of the root directory from the primary volume descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VolumeInfo {
    block_size: u64,
    root: DirectoryRecord,
}

impl VolumeInfo {
    /// Find the primary volume descriptor.
    fn read(image: &dyn Resource) -> Result<Self> {
        for index in 0..MAX_DESCRIPTORS {
            let offset = (DESCRIPTOR_START + index) * SECTOR_SIZE;
            let sector = image.read_range(offset, SECTOR_SIZE as usize)?;
            if (sector.len() as u64) < SECTOR_SIZE {
                return Err(corrupt("truncated volume descriptor"));
            }
            if &sector[1..6] != STANDARD_ID {
                return Err(corrupt(format!("missing standard identifier at sector {}", DESCRIPTOR_START + index)));
            }
            match sector[0] {
                DESCRIPTOR_PRIMARY => {
                    let block_size = u16::from_le_bytes([sector[128], sector[129]]) as u64;
                    if !block_size.is_power_of_two() || !(512..=SECTOR_SIZE).contains(&block_size) {
                        return Err(corrupt(format!("logical block size {}", block_size)));
                    }
                    let root = DirectoryRecord::parse(&sector[156..190])?;
                    return Ok(Self { block_size, root });
                }
                DESCRIPTOR_TERMINATOR => break,
                _ => {}
            }
        }
        Err(corrupt("no primary volume descriptor"))
    }

    fn extent_offset(&self, record: &DirectoryRecord) -> u64 {
        record.extent as u64 * self.block_size
    }
}

/// Parse every record of a directory extent, skipping sector padding.
fn read_directory(image: &dyn Resource, volume: &VolumeInfo, dir: &DirectoryRecord) -> Result<Vec<DirectoryRecord>> {
    let size = dir.size as u64;
    if size > MAX_DIRECTORY_SIZE {
        return Err(corrupt(format!("directory of {} bytes", size)));
    }
    let offset = volume.extent_offset(dir);
    let data = image.read_range(offset, size as usize)?;
    if (data.len() as u64) < size {
        return Err(corrupt(format!("truncated directory at {:#x}", offset)));
    }

    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let len = data[pos] as usize;
        if len == 0 {
            // Records do not cross sectors; the rest of this one is padding
            let sector = SECTOR_SIZE as usize;
            pos = (pos / sector + 1) * sector;
            continue;
        }
        let record = data
            .get(pos..pos + len)
            .ok_or_else(|| corrupt("directory record past end of extent"))?;
        records.push(DirectoryRecord::parse(record)?);
        pos += len;
    }
    Ok(records)
}

/// Enumerates ISO 9660 images.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsoEnumerator;

impl EntryEnumerator for IsoEnumerator {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Iso
    }

    fn enumerate(&self, archive: &dyn Resource, _name: &str, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        let volume = VolumeInfo::read(archive)?;
        let mut visited = HashSet::new();
        let mut pending = vec![(volume.root.clone(), String::new(), 0usize)];

        while let Some((dir, prefix, depth)) = pending.pop() {
            if !visited.insert(dir.extent) {
                return Err(corrupt(format!("directory loop at extent {}", dir.extent)));
            }
            let mut subdirs = Vec::new();
            for record in read_directory(archive, &volume, &dir)? {
                if record.is_special() {
                    continue;
                }
                let path = format!("{}{}", prefix, record.display_name());
                let flow = if record.is_dir() {
                    if depth + 1 < MAX_DEPTH {
                        subdirs.push((record.clone(), format!("{}/", path), depth + 1));
                    }
                    visitor(Entry::unavailable(path, 0, true, "directory"))?
                } else {
                    let offset = volume.extent_offset(&record);
                    let size = record.size as u64;
                    if offset.saturating_add(size) > archive.len() {
                        return Err(corrupt(format!("extent of {} past end of image", path)));
                    }
                    visitor(Entry::window(path, WindowResource::new(archive, offset, size)))?
                };
                if flow.is_break() {
                    return Ok(());
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }
        Ok(())
    }
}
