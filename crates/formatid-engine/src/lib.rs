//! # formatid-engine
//!
//! Identifies file formats by running the binary signatures of a
//! [`Registry`](formatid_signatures::Registry) over a resource, opening
//! archives to evaluate container signatures and identify their entries,
//! and resolving the raw matches into ranked results.
//!
//! # Example
//!
//! ```ignore
//! use formatid_core::{IdentificationRequest, MemoryResource};
//! use formatid_engine::Engine;
//!
//! let engine = Engine::builtin();
//! let request = IdentificationRequest::new("a.gif", MemoryResource::new(b"GIF89a".to_vec()));
//! let results = engine.identify(&request)?;
//! println!("{:?}", results.puids());
//! ```

pub mod budget;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod resolver;

pub use budget::Budget;
pub use config::{default_archive_puids, EngineConfig};
pub use container::{normalize_path, ContainerMatcher};
pub use engine::{ContainerOutcome, Engine};
pub use error::{EngineError, Result};
pub use resolver::{resolve, RawMatch, ResolverContext};
