//! Error types for archive enumeration.

use formatid_core::{ContainerKind, ResourceAccessError};
use thiserror::Error;

/// Failure while enumerating an archive.
///
/// [`ArchiveError::Io`] means the archive's own resource could not be read
/// and the request should fail. Every other variant means the archive could
/// not be understood and simply yields no container match.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O failure reading the archive resource.
    #[error("I/O error reading archive: {0}")]
    Io(#[from] std::io::Error),

    /// The archive structure is invalid or truncated.
    #[error("corrupt {kind} archive: {reason}")]
    Corrupt { kind: ContainerKind, reason: String },

    /// No enumerator exists for this kind.
    #[error("{0} archives cannot be enumerated")]
    Unsupported(ContainerKind),

    /// Failure raised by the entry visitor.
    #[error(transparent)]
    Resource(#[from] ResourceAccessError),
}

impl ArchiveError {
    /// Creates a new Corrupt error.
    pub fn corrupt(kind: ContainerKind, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            kind,
            reason: reason.into(),
        }
    }

    /// Returns true if this error should abort the request rather than
    /// degrade to "no container match".
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Resource(_))
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
