//! # formatid-signatures
//!
//! PRONOM-style binary signatures: expression parsing, compilation into
//! anchored byte sequences, matching against resources, and the registry
//! that holds compiled signatures per format.
//!
//! # Example
//!
//! ```ignore
//! use formatid_signatures::{compile, Anchor, ByteSource, ScanLimits};
//! use formatid_core::MemoryResource;
//!
//! let sequence = compile("'%PDF-1.' [30:37]", Anchor::Bof)?;
//! let resource = MemoryResource::new(b"%PDF-1.4\n".to_vec());
//! assert!(sequence.matches(&ByteSource::new(&resource), &ScanLimits::unlimited())?);
//! ```

mod ast;
mod compiler;
mod error;
mod matcher;
mod parser;
mod pattern;
mod registry;
mod sequence;
mod serializer;
mod signature;
pub mod builtin;

pub use ast::{ParseTree, SetMember};
pub use compiler::{
    compile, compile_tree, compile_with, CompileOptions, CompileStrategy, DEFAULT_MAX_ALTERNATIVES,
};
pub use error::{CompileError, ParseError};
pub use matcher::{ByteSource, MatchSpan, ScanLimits};
pub use parser::parse;
pub use pattern::{Alternation, ByteClass, ByteMatcher, SequenceMatcher};
pub use registry::{LoadDiagnostic, LoadOutcome, Registry, RegistryHandle, RegistryStats};
pub use sequence::{Anchor, CompiledByteSequence, Fragment, SubSequence};
pub use serializer::{render_alternation, render_run, serialize};
pub use signature::{
    ByteSequenceSource, ContainerFile, ContainerFileSource, ContainerSignature,
    ContainerSignatureSource, ContainerTrigger, Format, Signature, SignatureFile, SignatureSource,
};

/// Error type for signature file and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("signature {id}: {reason}")]
    InvalidSignature { id: u32, reason: String },

    #[error("signature {id}: cannot compile {expression:?}: {source}")]
    Compile {
        id: u32,
        expression: String,
        #[source]
        source: CompileError,
    },

    #[error("duplicate signature id {0}")]
    DuplicateSignature(u32),

    #[error("duplicate format {0}")]
    DuplicateFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
