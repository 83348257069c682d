//! TAR entries through the `tar` crate.
//!
//! Regular files are contiguous in the archive and are handed out as
//! windows; other entry types are read through the crate's stream.

use crate::entry::{Entry, EntryEnumerator, EntryVisitor};
use crate::error::Result;
use crate::reader::{FaultTracker, ResourceReader};
use formatid_core::{ContainerKind, Resource, WindowResource};
use tar::{Archive, EntryType};

/// Enumerates TAR archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarEnumerator;

impl EntryEnumerator for TarEnumerator {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Tar
    }

    fn enumerate(&self, archive: &dyn Resource, _name: &str, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        let faults = FaultTracker::default();
        let classify = |e: std::io::Error| faults.classify(ContainerKind::Tar, e);
        let mut tar = Archive::new(ResourceReader::new(archive, faults.clone()));

        for entry in tar.entries().map_err(classify)? {
            let mut entry = entry.map_err(classify)?;
            let name = entry.path().map_err(classify)?.to_string_lossy().into_owned();
            let size = entry.size();
            let entry_type = entry.header().entry_type();

            let flow = match entry_type {
                EntryType::Directory => visitor(Entry::unavailable(name, 0, true, "directory"))?,
                EntryType::Regular | EntryType::Continuous => {
                    let offset = entry.raw_file_position();
                    if offset.saturating_add(size) > archive.len() {
                        return Err(classify(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!("entry {} extends past end of archive", name),
                        )));
                    }
                    visitor(Entry::window(name, WindowResource::new(archive, offset, size)))?
                }
                EntryType::GNUSparse => {
                    visitor(Entry::stream(name, size, ContainerKind::Tar, &mut entry, &faults))?
                }
                _ => visitor(Entry::unavailable(name, size, false, "not a regular file"))?,
            };
            if flow.is_break() {
                break;
            }
        }
        Ok(())
    }
}
