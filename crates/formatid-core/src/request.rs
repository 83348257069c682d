//! Identification requests.

use crate::cancel::CancellationToken;
use crate::resource::{FileResource, Resource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One file (or archive entry) to identify.
///
/// The lifetime ties child requests to the archive resource their content
/// is read from.
pub struct IdentificationRequest<'a> {
    /// Request id.
    pub id: RequestId,
    /// Id of the request for the enclosing archive, if any.
    pub parent_id: Option<RequestId>,
    /// File or entry name (may contain a path).
    pub name: String,
    /// Lower-cased file extension, without the dot.
    pub extension: Option<String>,
    /// Cancellation signal checked during identification.
    pub cancellation: CancellationToken,
    resource: Box<dyn Resource + 'a>,
}

impl<'a> IdentificationRequest<'a> {
    /// Create a request for a named resource.
    pub fn new(name: impl Into<String>, resource: impl Resource + 'a) -> Self {
        let name = name.into();
        Self {
            id: RequestId::next(),
            parent_id: None,
            extension: extension_of(&name),
            name,
            cancellation: CancellationToken::new(),
            resource: Box::new(resource),
        }
    }

    /// Link this request to the request of its enclosing archive.
    pub fn with_parent(mut self, parent: RequestId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// Override the extension derived from the name.
    pub fn with_extension(mut self, extension: Option<&str>) -> Self {
        self.extension = extension.map(|e| e.trim_start_matches('.').to_lowercase());
        self
    }

    /// Share a cancellation token with the caller.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Size of the resource in bytes.
    pub fn size(&self) -> u64 {
        self.resource.len()
    }

    /// The resource being identified.
    pub fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl IdentificationRequest<'static> {
    /// Open a file on disk as a request.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let resource = FileResource::open(path)?;
        Ok(Self::new(path.to_string_lossy(), resource))
    }
}

impl std::fmt::Debug for IdentificationRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentificationRequest")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("name", &self.name)
            .field("extension", &self.extension)
            .field("size", &self.size())
            .finish()
    }
}

/// Extract the lower-cased extension from a file or entry name.
pub fn extension_of(name: &str) -> Option<String> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
