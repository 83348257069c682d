//! ZIP entries through the `zip` crate.
//!
//! Stored entries are handed out as windows onto the archive; compressed
//! entries are decoded through the crate's reader.

use crate::entry::{Entry, EntryEnumerator, EntryVisitor};
use crate::error::{ArchiveError, Result};
use crate::reader::{FaultTracker, ResourceReader};
use formatid_core::{ContainerKind, Resource, WindowResource};
use log::debug;
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive};

/// Enumerates ZIP archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipEnumerator;

impl EntryEnumerator for ZipEnumerator {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Zip
    }

    fn enumerate(&self, archive: &dyn Resource, _name: &str, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        let faults = FaultTracker::default();
        let mut zip = ZipArchive::new(ResourceReader::new(archive, faults.clone()))
            .map_err(|e| faults.classify(ContainerKind::Zip, e))?;

        for index in 0..zip.len() {
            let reason = match zip.by_index(index) {
                Ok(mut file) => {
                    let name = file.name().to_string();
                    let size = file.size();
                    let flow = if file.is_dir() {
                        visitor(Entry::unavailable(name, 0, true, "directory"))?
                    } else if file.compression() == CompressionMethod::Stored {
                        let offset = file.data_start();
                        if offset.saturating_add(size) > archive.len() {
                            return Err(ArchiveError::corrupt(
                                ContainerKind::Zip,
                                format!("entry {} extends past end of archive", name),
                            ));
                        }
                        visitor(Entry::window(name, WindowResource::new(archive, offset, size)))?
                    } else {
                        visitor(Entry::stream(name, size, ContainerKind::Zip, &mut file, &faults))?
                    };
                    if flow.is_break() {
                        break;
                    }
                    continue;
                }
                Err(ZipError::UnsupportedArchive(reason)) => reason,
                Err(e) => return Err(faults.classify(ContainerKind::Zip, e)),
            };

            // Encrypted entries and unknown methods are listed by name only.
            let raw = zip
                .by_index_raw(index)
                .map_err(|e| faults.classify(ContainerKind::Zip, e))?;
            debug!("zip entry {} not decodable: {}", raw.name(), reason);
            let entry = Entry::unavailable(raw.name().to_string(), raw.size(), raw.is_dir(), "unsupported zip entry");
            drop(raw);
            if visitor(entry)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formatid_core::MemoryResource;
    use std::io::{Cursor, Write};
    use std::ops::ControlFlow;
    use zip::write::SimpleFileOptions;

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn list(data: Vec<u8>) -> Result<Vec<(String, Vec<u8>)>> {
        let archive = MemoryResource::new(data);
        let mut seen = Vec::new();
        ZipEnumerator.enumerate(&archive, "test.zip", &mut |entry| {
            let name = entry.name.clone();
            let content = entry
                .load(1024)?
                .map(|r| r.read_range(0, 1024))
                .transpose()?
                .unwrap_or_default();
            seen.push((name, content));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(seen)
    }

    #[test]
    fn test_zip_entries() {
        let data = build_zip(&[("a.txt", b"hello"), ("dir/b.bin", &[1, 2, 3])]);
        let entries = list(data).unwrap();
        assert_eq!(
            entries,
            vec![
                ("a.txt".to_string(), b"hello".to_vec()),
                ("dir/b.bin".to_string(), vec![1, 2, 3]),
            ]
        );
    }

    #[test]
    fn test_stored_entries_are_windows() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("raw.bin", stored).unwrap();
        writer.write_all(b"stored payload").unwrap();
        writer.start_file("packed.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(&[b'a'; 256]).unwrap();
        let data = writer.finish().unwrap().into_inner();

        let archive = MemoryResource::new(data);
        let mut kinds = Vec::new();
        ZipEnumerator
            .enumerate(&archive, "t.zip", &mut |entry| {
                let window = matches!(entry.content(), crate::EntryContent::Window(_));
                let content = entry.load(1024)?.map(|r| r.read_range(0, 1024)).transpose()?;
                kinds.push((window, content.unwrap_or_default()));
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        assert_eq!(kinds, vec![(true, b"stored payload".to_vec()), (false, vec![b'a'; 256])]);
    }

    #[test]
    fn test_zip_early_stop() {
        let data = build_zip(&[("1", b"x"), ("2", b"y"), ("3", b"z")]);
        let archive = MemoryResource::new(data);
        let mut count = 0;
        ZipEnumerator
            .enumerate(&archive, "t.zip", &mut |_entry| {
                count += 1;
                Ok(if count == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_truncated_zip_is_corrupt() {
        let data = build_zip(&[("a.txt", b"hello world")]);
        let truncated = data[..data.len() / 2].to_vec();
        let err = list(truncated).unwrap_err();
        assert!(!err.is_fatal(), "{}", err);
    }
}
