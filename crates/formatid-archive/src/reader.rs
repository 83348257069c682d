//! `Read + Seek` adapter over a resource for the codec crates.

use crate::error::ArchiveError;
use formatid_core::{ContainerKind, Resource};
use std::cell::RefCell;
use std::fmt::Display;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

/// Remembers the last failure of the underlying resource, so that a codec
/// error can be told apart from an I/O error it merely passed along.
#[derive(Debug, Clone, Default)]
pub(crate) struct FaultTracker {
    fault: Rc<RefCell<Option<io::Error>>>,
}

impl FaultTracker {
    fn record(&self, err: &io::Error) {
        *self.fault.borrow_mut() = Some(io::Error::new(err.kind(), err.to_string()));
    }

    /// Turn a codec error into an [`ArchiveError`].
    pub(crate) fn classify(&self, kind: ContainerKind, err: impl Display) -> ArchiveError {
        match self.fault.borrow_mut().take() {
            Some(io) => ArchiveError::Io(io),
            None => ArchiveError::corrupt(kind, err.to_string()),
        }
    }
}

/// Sequential reader over a resource.
pub(crate) struct ResourceReader<'a> {
    resource: &'a dyn Resource,
    pos: u64,
    faults: FaultTracker,
}

impl<'a> ResourceReader<'a> {
    pub(crate) fn new(resource: &'a dyn Resource, faults: FaultTracker) -> Self {
        Self {
            resource,
            pos: 0,
            faults,
        }
    }
}

impl Read for ResourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.resource.read_at(self.pos, buf) {
            Ok(n) => {
                self.pos += n as u64;
                Ok(n)
            }
            Err(err) => {
                self.faults.record(&err);
                Err(err)
            }
        }
    }
}

impl Seek for ResourceReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.resource.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of resource",
            )),
        }
    }
}
