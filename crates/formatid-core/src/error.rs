//! Error types for formatid-core.

use thiserror::Error;

/// Failure to read the resource under identification.
///
/// This error is scoped to one request: it aborts the request (or
/// sub-request) in progress and nothing else.
#[derive(Error, Debug)]
pub enum ResourceAccessError {
    /// I/O failure reading the resource.
    #[error("I/O error reading {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ResourceAccessError {
    /// Creates a new Io error with the resource name as context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<std::io::Error> for ResourceAccessError {
    fn from(source: std::io::Error) -> Self {
        Self::io("resource", source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MemoryResource, Resource};
    use std::error::Error;

    #[test]
    fn test_short_read_keeps_io_source() {
        let res = MemoryResource::new(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        let err: ResourceAccessError = res.read_exact_at(0, &mut buf).unwrap_err().into();

        let ResourceAccessError::Io { context, source } = &err;
        assert_eq!(context, "resource");
        assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("I/O error reading resource"));
    }

    #[test]
    fn test_io_context() {
        let err = ResourceAccessError::io("a.zip", std::io::Error::other("disk gone"));
        assert_eq!(err.to_string(), "I/O error reading a.zip: disk gone");
    }
}
