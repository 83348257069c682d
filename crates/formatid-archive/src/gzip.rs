//! GZIP members as single-entry archives.

use crate::entry::{Entry, EntryEnumerator, EntryVisitor};
use crate::error::{ArchiveError, Result};
use crate::reader::{FaultTracker, ResourceReader};
use flate2::read::GzDecoder;
use formatid_core::{ContainerKind, Resource};

const GZIP_MAGIC: [u8; 3] = [0x1F, 0x8B, 0x08];

/// Enumerates the single decompressed entry of a GZIP stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipEnumerator;

impl EntryEnumerator for GzipEnumerator {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Gzip
    }

    fn enumerate(&self, archive: &dyn Resource, name: &str, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        let mut magic = [0u8; 3];
        if archive.read_at(0, &mut magic)? < magic.len() || magic != GZIP_MAGIC {
            return Err(ArchiveError::corrupt(ContainerKind::Gzip, "bad magic"));
        }
        // ISIZE trailer: uncompressed length mod 2^32 of the last member
        let size = if archive.len() >= 18 {
            let mut isize = [0u8; 4];
            archive.read_exact_at(archive.len() - 4, &mut isize)?;
            u32::from_le_bytes(isize) as u64
        } else {
            0
        };

        let faults = FaultTracker::default();
        let mut decoder = GzDecoder::new(ResourceReader::new(archive, faults.clone()));
        let entry_name = match decoder.header() {
            Some(header) => match header.filename() {
                Some(raw) if !raw.is_empty() => String::from_utf8_lossy(raw).into_owned(),
                _ => entry_name_for(name),
            },
            None => return Err(faults.classify(ContainerKind::Gzip, "truncated header")),
        };

        visitor(Entry::stream(entry_name, size, ContainerKind::Gzip, &mut decoder, &faults))?;
        Ok(())
    }
}

/// Name of the decompressed entry when the header does not record one.
pub fn entry_name_for(archive_name: &str) -> String {
    let base = archive_name.rsplit(['/', '\\']).next().unwrap_or(archive_name);
    let lower = base.to_lowercase();
    if lower.ends_with(".tgz") {
        format!("{}.tar", &base[..base.len() - 4])
    } else if lower.ends_with(".gz") {
        base[..base.len() - 3].to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::{Compression, GzBuilder};
    use formatid_core::MemoryResource;
    use std::io::Write;
    use std::ops::ControlFlow;

    fn gzip(data: &[u8], filename: Option<&str>) -> Vec<u8> {
        let builder = match filename {
            Some(name) => GzBuilder::new().filename(name),
            None => GzBuilder::new(),
        };
        let mut encoder: GzEncoder<Vec<u8>> = builder.write(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn single(data: Vec<u8>, name: &str) -> Result<(String, u64, Option<Vec<u8>>)> {
        let archive = MemoryResource::new(data);
        let mut seen = None;
        GzipEnumerator.enumerate(&archive, name, &mut |entry| {
            let name = entry.name.clone();
            let size = entry.size;
            let content = entry.load(1 << 20)?.map(|r| r.read_range(0, 1 << 20)).transpose()?;
            seen = Some((name, size, content));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(seen.unwrap())
    }

    #[test]
    fn test_entry_name_for() {
        assert_eq!(entry_name_for("dir/logs.TGZ"), "logs.tar");
        assert_eq!(entry_name_for("report.pdf.gz"), "report.pdf");
        assert_eq!(entry_name_for("blob"), "blob");
    }

    #[test]
    fn test_gzip_named_entry() {
        let (name, size, content) = single(gzip(b"%PDF-1.4 body", Some("inner.pdf")), "x.gz").unwrap();
        assert_eq!(name, "inner.pdf");
        assert_eq!(size, 13);
        assert_eq!(content.unwrap(), b"%PDF-1.4 body");
    }

    #[test]
    fn test_gzip_unnamed_entry() {
        let (name, _, content) = single(gzip(b"hello", None), "notes.txt.gz").unwrap();
        assert_eq!(name, "notes.txt");
        assert_eq!(content.unwrap(), b"hello");
    }

    #[test]
    fn test_gzip_bad_magic() {
        let err = single(b"PK\x03\x04".to_vec(), "a.gz").unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn test_gzip_truncated_is_corrupt() {
        let data = gzip(&[0x55u8; 4096], None);
        let archive = MemoryResource::new(data[..data.len() / 2].to_vec());
        let result = GzipEnumerator.enumerate(&archive, "a.gz", &mut |entry| {
            entry.load(u64::MAX)?;
            Ok(ControlFlow::Continue(()))
        });
        let err = result.unwrap_err();
        assert!(!err.is_fatal());
    }
}
