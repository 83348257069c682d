//! Byte-addressable resources.
//!
//! A [`Resource`] is random-access, read-only byte content: a file on disk,
//! an in-memory buffer, or a window onto another resource (an archive entry
//! stored uncompressed inside its parent).

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Size of the read window cached by [`FileResource`].
const FILE_WINDOW_SIZE: usize = 64 * 1024;

/// Random-access byte content under identification.
pub trait Resource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Returns true if the resource holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is 0 at or past the end.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// The whole content, when it is already resident in memory.
    fn as_bytes(&self) -> Option<&[u8]> {
        None
    }

    /// Read the byte at `offset`.
    fn byte_at(&self, offset: u64) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        if self.read_at(offset, &mut buf)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("offset {} is past end of resource", offset),
            ));
        }
        Ok(buf[0])
    }

    /// Fill `buf` completely from `offset`, failing on a short read.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "short read from resource",
                ));
            }
            filled += n;
        }
        Ok(())
    }

    /// Read `len` bytes from `offset`, clamped to the end of the resource.
    fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let available = self.len().saturating_sub(offset);
        let len = len.min(usize::try_from(available).unwrap_or(usize::MAX));
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

/// Resource held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryResource {
    data: Arc<[u8]>,
}

impl MemoryResource {
    /// Create a resource over the given bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            data: Arc::from(data),
        }
    }
}

impl From<Vec<u8>> for MemoryResource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for MemoryResource {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl Resource for MemoryResource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

struct FileWindow {
    file: File,
    start: u64,
    bytes: Vec<u8>,
}

/// Resource backed by a file on disk.
///
/// Reads go through a single cached window so that the many short reads the
/// matcher issues near one position do not each hit the file system.
pub struct FileResource {
    path: PathBuf,
    len: u64,
    window: Mutex<FileWindow>,
}

impl FileResource {
    /// Open a file for identification.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            len,
            window: Mutex::new(FileWindow {
                file,
                start: 0,
                bytes: Vec::new(),
            }),
        })
    }

    /// Path this resource was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileResource")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}

impl Resource for FileResource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let mut window = self
            .window
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "file window lock poisoned"))?;

        let window_end = window.start + window.bytes.len() as u64;
        if offset < window.start || offset >= window_end {
            // Large reads bypass the window entirely.
            if buf.len() >= FILE_WINDOW_SIZE {
                window.file.seek(SeekFrom::Start(offset))?;
                return read_fully(&mut window.file, buf);
            }
            let start = offset - offset % FILE_WINDOW_SIZE as u64;
            let size = (self.len - start).min(FILE_WINDOW_SIZE as u64) as usize;
            let mut bytes = vec![0u8; size];
            window.file.seek(SeekFrom::Start(start))?;
            let n = read_fully(&mut window.file, &mut bytes)?;
            bytes.truncate(n);
            window.start = start;
            window.bytes = bytes;
        }

        let rel = (offset - window.start) as usize;
        if rel >= window.bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(window.bytes.len() - rel);
        buf[..n].copy_from_slice(&window.bytes[rel..rel + n]);
        Ok(n)
    }
}

fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// A contiguous sub-range of another resource.
#[derive(Clone, Copy)]
pub struct WindowResource<'a> {
    inner: &'a dyn Resource,
    offset: u64,
    len: u64,
}

impl<'a> WindowResource<'a> {
    /// Create a window of `len` bytes at `offset`, clamped to the parent.
    pub fn new(inner: &'a dyn Resource, offset: u64, len: u64) -> Self {
        let available = inner.len().saturating_sub(offset);
        Self {
            inner,
            offset,
            len: len.min(available),
        }
    }

    /// Offset of the window within its parent.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl std::fmt::Debug for WindowResource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowResource")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

impl Resource for WindowResource<'_> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let n = buf.len().min((self.len - offset) as usize);
        self.inner.read_at(self.offset + offset, &mut buf[..n])
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        let bytes = self.inner.as_bytes()?;
        let start = usize::try_from(self.offset).ok()?;
        let end = start.checked_add(usize::try_from(self.len).ok()?)?;
        bytes.get(start..end)
    }
}
