//! Identification results.

use crate::request::{IdentificationRequest, RequestId};
use serde::{Deserialize, Serialize};

/// How a format was established.
///
/// Declaration order is the ranking order: container evidence outranks a
/// binary signature, which outranks a bare extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentificationMethod {
    /// Matched a container signature over an archive's entries.
    Container,
    /// Matched a binary signature.
    BinarySignature,
    /// Inferred from the file extension only.
    Extension,
}

impl std::fmt::Display for IdentificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IdentificationMethod::Container => "Container",
            IdentificationMethod::BinarySignature => "Signature",
            IdentificationMethod::Extension => "Extension",
        };
        f.write_str(name)
    }
}

/// Outcome of one identification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationStatus {
    /// Identification ran to completion.
    Done,
    /// Cancelled before completion; no results are reported.
    Cancelled,
}

/// A single format identified for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationResult {
    /// Format identifier (PUID).
    pub puid: String,
    /// Format name.
    pub name: String,
    /// MIME type, if registered.
    pub mime_type: Option<String>,
    /// Format version, if registered.
    pub version: Option<String>,
    /// How the format was established.
    pub method: IdentificationMethod,
    /// Ids of the signatures that matched.
    pub signature_ids: Vec<u32>,
}

/// All results for one request, plus request metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResultCollection {
    /// Id of the request these results belong to.
    pub request_id: RequestId,
    /// Id of the enclosing archive's request.
    pub parent_id: Option<RequestId>,
    /// File or entry name.
    pub name: String,
    /// Resource size in bytes.
    pub size: u64,
    /// Lower-cased extension.
    pub extension: Option<String>,
    /// Set when the extension is not among the matched formats' extensions.
    pub extension_mismatch: bool,
    /// Completion status.
    pub status: IdentificationStatus,
    /// Set when archive enumeration stopped at its budget.
    pub partial: bool,
    /// Ranked results.
    pub results: Vec<IdentificationResult>,
    /// Results for archive entries.
    pub children: Vec<IdentificationResultCollection>,
}

impl IdentificationResultCollection {
    /// Create an empty collection for a request.
    pub fn new(request: &IdentificationRequest<'_>) -> Self {
        Self {
            request_id: request.id,
            parent_id: request.parent_id,
            name: request.name.clone(),
            size: request.size(),
            extension: request.extension.clone(),
            extension_mismatch: false,
            status: IdentificationStatus::Done,
            partial: false,
            results: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create a collection marking the request as cancelled.
    pub fn cancelled(request: &IdentificationRequest<'_>) -> Self {
        let mut collection = Self::new(request);
        collection.status = IdentificationStatus::Cancelled;
        collection
    }

    /// Returns true if the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status == IdentificationStatus::Cancelled
    }

    /// Returns true if no format was identified.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// PUIDs of all results, in rank order.
    pub fn puids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.puid.as_str()).collect()
    }

    /// Returns true if any result has the given PUID.
    pub fn contains(&self, puid: &str) -> bool {
        self.results.iter().any(|r| r.puid == puid)
    }

    /// Total number of collections in this tree, including this one.
    pub fn total_requests(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|c| c.total_requests())
            .sum::<usize>()
    }
}
