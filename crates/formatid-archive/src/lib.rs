//! # formatid-archive
//!
//! Lazy entry enumeration for the archive kinds the engine recurses into:
//! - ZIP and TAR through the `zip` and `tar` crates
//! - GZIP through `flate2`, as a single-entry archive
//! - RAR 4 and RAR 5 block headers (stored entries only)
//! - ISO 9660 directory hierarchies
//!
//! Entries are handed to a visitor one at a time. Stored entries are
//! windows onto the archive resource and are never copied.

mod entry;
mod error;
mod gzip;
mod iso;
mod rar;
mod reader;
mod tarball;
mod zipfile;

pub use entry::{Entry, EntryContent, EntryEnumerator, EntryResource, EntryStream, EntryVisitor};
pub use error::{ArchiveError, Result};
pub use formatid_core::ContainerKind;
pub use gzip::{entry_name_for, GzipEnumerator};
pub use iso::IsoEnumerator;
pub use rar::{RarEnumerator, RarVersion};
pub use tarball::TarEnumerator;
pub use zipfile::ZipEnumerator;

use formatid_core::Resource;

/// The enumerator for an archive kind, or `None` for kinds that are only
/// named by container signatures.
pub fn enumerator_for(kind: ContainerKind) -> Option<&'static dyn EntryEnumerator> {
    match kind {
        ContainerKind::Zip => Some(&ZipEnumerator),
        ContainerKind::Tar => Some(&TarEnumerator),
        ContainerKind::Gzip => Some(&GzipEnumerator),
        ContainerKind::Rar => Some(&RarEnumerator),
        ContainerKind::Iso => Some(&IsoEnumerator),
        ContainerKind::Ole2 => None,
    }
}

/// Enumerate `archive` as `kind`.
pub fn enumerate(
    kind: ContainerKind,
    archive: &dyn Resource,
    name: &str,
    visitor: &mut EntryVisitor<'_>,
) -> Result<()> {
    match enumerator_for(kind) {
        Some(enumerator) => enumerator.enumerate(archive, name, visitor),
        None => Err(ArchiveError::Unsupported(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formatid_core::MemoryResource;
    use std::ops::ControlFlow;

    #[test]
    fn test_enumerator_for() {
        for kind in ContainerKind::all() {
            match enumerator_for(*kind) {
                Some(enumerator) => assert_eq!(enumerator.kind(), *kind),
                None => assert_eq!(*kind, ContainerKind::Ole2),
            }
        }
    }

    #[test]
    fn test_enumerate_unsupported() {
        let archive = MemoryResource::new(vec![0xD0, 0xCF, 0x11, 0xE0]);
        let err = enumerate(ContainerKind::Ole2, &archive, "a.doc", &mut |_| {
            Ok(ControlFlow::Continue(()))
        })
        .unwrap_err();
        assert!(matches!(err, ArchiveError::Unsupported(ContainerKind::Ole2)));
        assert!(!err.is_fatal());
    }
}
