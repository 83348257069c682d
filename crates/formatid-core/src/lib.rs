//! # formatid-core
//!
//! Core abstractions shared by the formatid crates. This crate defines the
//! byte-addressable resource abstraction, identification requests and
//! results, and the cooperative cancellation signal.

pub mod cancel;
pub mod container;
pub mod error;
pub mod request;
pub mod resource;
pub mod result;

pub use cancel::CancellationToken;
pub use container::ContainerKind;
pub use error::ResourceAccessError;
pub use request::{extension_of, IdentificationRequest, RequestId};
pub use resource::{FileResource, MemoryResource, Resource, WindowResource};
pub use result::{
    IdentificationMethod, IdentificationResult, IdentificationResultCollection,
    IdentificationStatus,
};

/// Result alias for resource access.
pub type Result<T> = std::result::Result<T, ResourceAccessError>;
