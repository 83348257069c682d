//! RAR 4 and RAR 5 header walks.
//!
//! Only the block headers are parsed. Entries stored without compression
//! are exposed as windows onto the archive; compressed, encrypted and
//! multi-volume entries are listed without content.

use crate::entry::{Entry, EntryEnumerator, EntryVisitor};
use crate::error::{ArchiveError, Result};
use formatid_core::{ContainerKind, Resource, WindowResource};
use log::debug;

/// RAR 1.5 to 4.x marker block.
pub const RAR4_SIGNATURE: &[u8; 7] = b"Rar!\x1a\x07\x00";
/// RAR 5 marker block.
pub const RAR5_SIGNATURE: &[u8; 8] = b"Rar!\x1a\x07\x01\x00";

/// Largest header accepted before the archive is treated as corrupt.
const MAX_HEADER_SIZE: u64 = 2 * 1024 * 1024;

// RAR 4 block types
const RAR4_FILE_HEAD: u8 = 0x74;
const RAR4_ENDARC_HEAD: u8 = 0x7b;

// RAR 4 block flags
const RAR4_LONG_BLOCK: u16 = 0x8000;
const RAR4_SPLIT_BEFORE: u16 = 0x0001;
const RAR4_SPLIT_AFTER: u16 = 0x0002;
const RAR4_PASSWORD: u16 = 0x0004;
const RAR4_DIRECTORY: u16 = 0x00e0;
const RAR4_LARGE: u16 = 0x0100;
const RAR4_METHOD_STORE: u8 = 0x30;

// RAR 5 header types
const RAR5_FILE: u64 = 2;
const RAR5_ENCRYPTION: u64 = 4;
const RAR5_END: u64 = 5;

// RAR 5 header flags
const RAR5_HAS_EXTRA: u64 = 0x0001;
const RAR5_HAS_DATA: u64 = 0x0002;
const RAR5_SPLIT_BEFORE: u64 = 0x0008;
const RAR5_SPLIT_AFTER: u64 = 0x0010;

// RAR 5 file flags
const RAR5_FILE_DIRECTORY: u64 = 0x0001;
const RAR5_FILE_MTIME: u64 = 0x0002;
const RAR5_FILE_CRC: u64 = 0x0004;
const RAR5_EXTRA_CRYPT: u64 = 0x01;

/// RAR format generation, from the marker block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RarVersion {
    Rar4,
    Rar5,
}

impl RarVersion {
    /// Detect the version from the start of an archive.
    pub fn detect(archive: &dyn Resource) -> Result<Option<Self>> {
        let head = archive.read_range(0, RAR5_SIGNATURE.len())?;
        if head.as_slice() == RAR5_SIGNATURE {
            Ok(Some(Self::Rar5))
        } else if head.starts_with(RAR4_SIGNATURE) {
            Ok(Some(Self::Rar4))
        } else {
            Ok(None)
        }
    }
}

/// A file record from either header format.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileRecord {
    name: String,
    unpacked_size: u64,
    data_offset: u64,
    packed_size: u64,
    is_dir: bool,
    stored: bool,
    encrypted: bool,
    split: bool,
}

impl FileRecord {
    fn into_entry<'a>(self, archive: &'a dyn Resource) -> Entry<'a> {
        if self.is_dir {
            Entry::unavailable(self.name, 0, true, "directory")
        } else if self.encrypted {
            Entry::unavailable(self.name, self.unpacked_size, false, "encrypted")
        } else if self.split {
            Entry::unavailable(self.name, self.unpacked_size, false, "split across volumes")
        } else if !self.stored {
            Entry::unavailable(self.name, self.unpacked_size, false, "compressed")
        } else {
            Entry::window(self.name, WindowResource::new(archive, self.data_offset, self.packed_size))
        }
    }
}

/// Little-endian reader over one header.
struct HeaderBytes<'h> {
    data: &'h [u8],
    pos: usize,
}

impl<'h> HeaderBytes<'h> {
    fn new(data: &'h [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'h [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(corrupt("header field past end of header")),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// RAR 5 variable-length integer: 7 bits per byte, low group first.
    fn vint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = self.u8()?;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(corrupt("variable-length integer too long"))
    }
}

fn corrupt(reason: impl Into<String>) -> ArchiveError {
    ArchiveError::corrupt(ContainerKind::Rar, reason)
}

/// Read exactly `len` bytes of header, or fail as truncated.
fn read_header(archive: &dyn Resource, offset: u64, len: u64) -> Result<Vec<u8>> {
    if len > MAX_HEADER_SIZE {
        return Err(corrupt(format!("header of {} bytes at {:#x}", len, offset)));
    }
    let data = archive.read_range(offset, len as usize)?;
    if (data.len() as u64) < len {
        return Err(corrupt(format!("truncated header at {:#x}", offset)));
    }
    Ok(data)
}

fn decode_name(raw: &[u8]) -> String {
    // Unicode names follow the OEM name after a NUL
    let oem = raw.split(|&b| b == 0).next().unwrap_or(raw);
    String::from_utf8_lossy(oem).into_owned()
}

/// Parse one RAR 4 block. Returns the file record, if any, and the offset
/// of the next block; `None` for the end-of-archive block.
fn rar4_block(archive: &dyn Resource, offset: u64) -> Result<Option<(Option<FileRecord>, u64)>> {
    let fixed = read_header(archive, offset, 7)?;
    let mut head = HeaderBytes::new(&fixed);
    let _crc = head.u16()?;
    let block_type = head.u8()?;
    let flags = head.u16()?;
    let head_size = head.u16()? as u64;
    if head_size < 7 {
        return Err(corrupt(format!("block header size {} at {:#x}", head_size, offset)));
    }
    if block_type == RAR4_ENDARC_HEAD {
        return Ok(None);
    }

    let header = read_header(archive, offset, head_size)?;
    let mut head = HeaderBytes::new(&header);
    head.take(7)?;

    if block_type != RAR4_FILE_HEAD {
        let add_size = if flags & RAR4_LONG_BLOCK != 0 { head.u32()? as u64 } else { 0 };
        return Ok(Some((None, offset + head_size + add_size)));
    }

    let mut packed_size = head.u32()? as u64;
    let mut unpacked_size = head.u32()? as u64;
    let _host_os = head.u8()?;
    let _file_crc = head.u32()?;
    let _ftime = head.u32()?;
    let _unp_ver = head.u8()?;
    let method = head.u8()?;
    let name_size = head.u16()? as usize;
    let _attr = head.u32()?;
    if flags & RAR4_LARGE != 0 {
        packed_size |= (head.u32()? as u64) << 32;
        unpacked_size |= (head.u32()? as u64) << 32;
    }
    let name = decode_name(head.take(name_size)?);

    let data_offset = offset + head_size;
    let next = data_offset
        .checked_add(packed_size)
        .ok_or_else(|| corrupt("packed size overflows"))?;
    let record = FileRecord {
        name,
        unpacked_size,
        data_offset,
        packed_size,
        is_dir: flags & RAR4_DIRECTORY == RAR4_DIRECTORY,
        stored: method == RAR4_METHOD_STORE,
        encrypted: flags & RAR4_PASSWORD != 0,
        split: flags & (RAR4_SPLIT_BEFORE | RAR4_SPLIT_AFTER) != 0,
    };
    Ok(Some((Some(record), next)))
}

/// Parse one RAR 5 header, with the same contract as [`rar4_block`].
fn rar5_block(archive: &dyn Resource, offset: u64) -> Result<Option<(Option<FileRecord>, u64)>> {
    // CRC32 plus a size vint of at most 3 bytes for any accepted header
    let prefix = archive.read_range(offset, 7)?;
    let mut head = HeaderBytes::new(&prefix);
    let _crc = head.u32()?;
    let header_size = head.vint()?;
    let body_offset = offset + head.pos as u64;
    if header_size == 0 {
        return Err(corrupt(format!("empty header at {:#x}", offset)));
    }

    let body = read_header(archive, body_offset, header_size)?;
    let mut head = HeaderBytes::new(&body);
    let header_type = head.vint()?;
    let header_flags = head.vint()?;
    let extra_size = if header_flags & RAR5_HAS_EXTRA != 0 { head.vint()? } else { 0 };
    let data_size = if header_flags & RAR5_HAS_DATA != 0 { head.vint()? } else { 0 };

    let data_offset = body_offset + header_size;
    let next = data_offset
        .checked_add(data_size)
        .ok_or_else(|| corrupt("data size overflows"))?;

    match header_type {
        RAR5_END => return Ok(None),
        RAR5_ENCRYPTION => return Err(corrupt("archive headers are encrypted")),
        RAR5_FILE => {}
        _ => return Ok(Some((None, next))),
    }

    let file_flags = head.vint()?;
    let unpacked_size = head.vint()?;
    let _attributes = head.vint()?;
    if file_flags & RAR5_FILE_MTIME != 0 {
        head.u32()?;
    }
    if file_flags & RAR5_FILE_CRC != 0 {
        head.u32()?;
    }
    let compression = head.vint()?;
    let _host_os = head.vint()?;
    let name_len = head.vint()?;
    let name_len = usize::try_from(name_len).map_err(|_| corrupt("name length"))?;
    let name = String::from_utf8_lossy(head.take(name_len)?).into_owned();

    let extra_start = usize::try_from(header_size.saturating_sub(extra_size)).unwrap_or(usize::MAX);
    let encrypted = match body.get(extra_start..) {
        Some(extra) if extra_size > 0 => rar5_extra_encrypted(extra)?,
        _ => false,
    };

    let record = FileRecord {
        name,
        unpacked_size,
        data_offset,
        packed_size: data_size,
        is_dir: file_flags & RAR5_FILE_DIRECTORY != 0,
        stored: (compression >> 7) & 0x7 == 0,
        encrypted,
        split: header_flags & (RAR5_SPLIT_BEFORE | RAR5_SPLIT_AFTER) != 0,
    };
    Ok(Some((Some(record), next)))
}

/// Returns true if the extra area carries a file encryption record.
fn rar5_extra_encrypted(extra: &[u8]) -> Result<bool> {
    let mut area = HeaderBytes::new(extra);
    while area.pos < extra.len() {
        let size = area.vint()?;
        let record_start = area.pos;
        let record_type = area.vint()?;
        if record_type == RAR5_EXTRA_CRYPT {
            return Ok(true);
        }
        let consumed = (area.pos - record_start) as u64;
        let rest = usize::try_from(size.saturating_sub(consumed)).map_err(|_| corrupt("extra record size"))?;
        area.take(rest)?;
    }
    Ok(false)
}

/// Enumerates RAR 4 and RAR 5 archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct RarEnumerator;

impl EntryEnumerator for RarEnumerator {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Rar
    }

    fn enumerate(&self, archive: &dyn Resource, _name: &str, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        let (version, start) = match RarVersion::detect(archive)? {
            Some(RarVersion::Rar4) => (RarVersion::Rar4, RAR4_SIGNATURE.len() as u64),
            Some(RarVersion::Rar5) => (RarVersion::Rar5, RAR5_SIGNATURE.len() as u64),
            None => return Err(corrupt("missing marker block")),
        };

        let mut offset = start;
        while offset < archive.len() {
            let block = match version {
                RarVersion::Rar4 => rar4_block(archive, offset)?,
                RarVersion::Rar5 => rar5_block(archive, offset)?,
            };
            let Some((record, next)) = block else {
                return Ok(());
            };
            if next <= offset {
                return Err(corrupt(format!("header at {:#x} does not advance", offset)));
            }
            if let Some(record) = record {
                if record.data_offset.saturating_add(record.packed_size) > archive.len() {
                    return Err(corrupt(format!("data of {} extends past end of archive", record.name)));
                }
                if !record.stored && !record.is_dir {
                    debug!("rar entry {} is compressed, content not available", record.name);
                }
                if visitor(record.into_entry(archive))?.is_break() {
                    return Ok(());
                }
            }
            offset = next;
        }
        // Archives written without an end block simply stop
        Ok(())
    }
}
