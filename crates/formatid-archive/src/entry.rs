//! Archive entries and the enumerator interface.

use crate::error::Result;
use crate::reader::FaultTracker;
use formatid_core::{ContainerKind, MemoryResource, Resource, WindowResource};
use std::io::{self, Read};
use std::ops::ControlFlow;

/// Callback receiving each entry in archive order. Returning
/// `ControlFlow::Break` stops the enumeration early.
pub type EntryVisitor<'v> = dyn FnMut(Entry<'_>) -> Result<ControlFlow<()>> + 'v;

/// Lazily walks the entries of one archive kind.
pub trait EntryEnumerator: Send + Sync {
    /// The archive kind handled.
    fn kind(&self) -> ContainerKind;

    /// Visit every entry of `archive`. `name` is the archive's own name,
    /// used where the format does not name its single entry.
    ///
    /// Corrupt archives return [`ArchiveError::Corrupt`](crate::ArchiveError::Corrupt)
    /// after visiting the entries read so far.
    fn enumerate(&self, archive: &dyn Resource, name: &str, visitor: &mut EntryVisitor<'_>) -> Result<()>;
}

/// How the content of an entry can be reached.
pub enum EntryContent<'a> {
    /// Stored uncompressed at a known position in the archive.
    Window(WindowResource<'a>),
    /// Decoded on the fly.
    Stream(EntryStream<'a>),
    /// Cannot be decoded (encrypted, unsupported method, split across
    /// volumes, or no content at all).
    Unavailable(&'static str),
}

/// A decoded entry stream.
pub struct EntryStream<'a> {
    reader: &'a mut dyn Read,
    kind: ContainerKind,
    faults: &'a FaultTracker,
}

/// One archive entry.
pub struct Entry<'a> {
    /// Path inside the archive.
    pub name: String,
    /// Uncompressed size as declared by the archive.
    pub size: u64,
    /// Returns true for directory entries.
    pub is_dir: bool,
    content: EntryContent<'a>,
}

impl<'a> Entry<'a> {
    pub(crate) fn window(name: String, content: WindowResource<'a>) -> Self {
        Self {
            name,
            size: content.len(),
            is_dir: false,
            content: EntryContent::Window(content),
        }
    }

    pub(crate) fn stream(
        name: String,
        size: u64,
        kind: ContainerKind,
        reader: &'a mut dyn Read,
        faults: &'a FaultTracker,
    ) -> Self {
        Self {
            name,
            size,
            is_dir: false,
            content: EntryContent::Stream(EntryStream {
                reader,
                kind,
                faults,
            }),
        }
    }

    pub(crate) fn unavailable(name: String, size: u64, is_dir: bool, reason: &'static str) -> Self {
        Self {
            name,
            size,
            is_dir,
            content: EntryContent::Unavailable(reason),
        }
    }

    /// How the content can be reached.
    pub fn content(&self) -> &EntryContent<'a> {
        &self.content
    }

    /// Returns true if the content can be loaded.
    pub fn has_content(&self) -> bool {
        !matches!(self.content, EntryContent::Unavailable(_))
    }

    /// Load the entry content as a resource.
    ///
    /// Returns `None` if the content is unavailable or larger than `limit`
    /// bytes. Stored entries are windows onto the archive; decoded entries
    /// are read into memory.
    pub fn load(self, limit: u64) -> Result<Option<EntryResource<'a>>> {
        if self.size > limit {
            return Ok(None);
        }
        match self.content {
            EntryContent::Window(window) => Ok(Some(EntryResource::Window(window))),
            EntryContent::Stream(stream) => {
                let mut data = Vec::new();
                stream
                    .reader
                    .take(limit.saturating_add(1))
                    .read_to_end(&mut data)
                    .map_err(|e| stream.faults.classify(stream.kind, e))?;
                if data.len() as u64 > limit {
                    return Ok(None);
                }
                Ok(Some(EntryResource::Memory(MemoryResource::new(data))))
            }
            EntryContent::Unavailable(_) => Ok(None),
        }
    }
}

impl std::fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let content = match &self.content {
            EntryContent::Window(_) => "window",
            EntryContent::Stream(_) => "stream",
            EntryContent::Unavailable(reason) => *reason,
        };
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("is_dir", &self.is_dir)
            .field("content", &content)
            .finish()
    }
}

/// Loaded entry content.
#[derive(Debug)]
pub enum EntryResource<'a> {
    Window(WindowResource<'a>),
    Memory(MemoryResource),
}

impl Resource for EntryResource<'_> {
    fn len(&self) -> u64 {
        match self {
            Self::Window(w) => w.len(),
            Self::Memory(m) => m.len(),
        }
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Window(w) => w.read_at(offset, buf),
            Self::Memory(m) => m.read_at(offset, buf),
        }
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Window(w) => w.as_bytes(),
            Self::Memory(m) => m.as_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_entry_load() {
        let archive = MemoryResource::new(b"headerCONTENTtrailer".to_vec());
        let entry = Entry::window("a.txt".into(), WindowResource::new(&archive, 6, 7));
        assert_eq!(entry.size, 7);
        assert!(entry.has_content());
        let res = entry.load(100).unwrap().unwrap();
        assert_eq!(res.read_range(0, 100).unwrap(), b"CONTENT");
        assert_eq!(res.as_bytes(), Some(&b"CONTENT"[..]));
    }

    #[test]
    fn test_stream_entry_limit() {
        let faults = FaultTracker::default();
        let mut data: &[u8] = b"0123456789";
        let entry = Entry::stream("s".into(), 10, ContainerKind::Gzip, &mut data, &faults);
        assert!(entry.load(4).unwrap().is_none());

        // Declared size can understate the real content.
        let mut data: &[u8] = b"0123456789";
        let entry = Entry::stream("s".into(), 0, ContainerKind::Gzip, &mut data, &faults);
        assert!(entry.load(4).unwrap().is_none());

        let mut data: &[u8] = b"0123456789";
        let entry = Entry::stream("s".into(), 10, ContainerKind::Gzip, &mut data, &faults);
        assert_eq!(entry.load(10).unwrap().unwrap().len(), 10);
    }

    #[test]
    fn test_unavailable_entry() {
        let entry = Entry::unavailable("enc.bin".into(), 5, false, "encrypted");
        assert!(!entry.has_content());
        assert!(entry.load(100).unwrap().is_none());
        assert!(format!("{:?}", Entry::unavailable("d".into(), 0, true, "directory")).contains("directory"));
    }
}
