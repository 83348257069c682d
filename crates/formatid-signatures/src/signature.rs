//! Signature file records and compiled signatures.
//!
//! A [`SignatureFile`] is the serialized source of a registry: formats,
//! binary signatures written as expressions, container signatures and the
//! container triggers that decide when container signatures are tried.

use crate::compiler::{compile_with, CompileOptions};
use crate::matcher::{ByteSource, ScanLimits};
use crate::sequence::{Anchor, CompiledByteSequence};
use crate::{RegistryError, Result};
use formatid_core::ContainerKind;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// One expression of a binary signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSequenceSource {
    /// Where the expression is tested.
    pub anchor: Anchor,
    /// Expression text.
    pub expression: String,
}

impl ByteSequenceSource {
    /// Create a new byte sequence source.
    pub fn new(anchor: Anchor, expression: impl Into<String>) -> Self {
        Self {
            anchor,
            expression: expression.into(),
        }
    }
}

/// A binary signature as written in a signature file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSource {
    /// Signature id, unique within its file or container file.
    pub id: u32,
    /// Optional descriptive name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Expressions that must all match.
    #[serde(default)]
    pub byte_sequences: Vec<ByteSequenceSource>,
}

impl SignatureSource {
    /// Create a new signature with no byte sequences.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: None,
            byte_sequences: Vec::new(),
        }
    }

    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a BOF expression.
    pub fn bof(self, expression: impl Into<String>) -> Self {
        self.with_sequence(Anchor::Bof, expression)
    }

    /// Add an EOF expression.
    pub fn eof(self, expression: impl Into<String>) -> Self {
        self.with_sequence(Anchor::Eof, expression)
    }

    /// Add a variable-position expression.
    pub fn variable(self, expression: impl Into<String>) -> Self {
        self.with_sequence(Anchor::Variable, expression)
    }

    /// Add an expression.
    pub fn with_sequence(mut self, anchor: Anchor, expression: impl Into<String>) -> Self {
        self.byte_sequences
            .push(ByteSequenceSource::new(anchor, expression));
        self
    }
}

/// A file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Persistent unique identifier, e.g. `fmt/13`.
    pub puid: String,
    /// Format name.
    pub name: String,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// File extensions, without the dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Ids of the binary signatures identifying this format.
    #[serde(default)]
    pub signature_ids: Vec<u32>,
    /// PUIDs of formats this one supersedes when both match.
    #[serde(default)]
    pub priority_over: Vec<String>,
}

impl Format {
    /// Create a new format.
    pub fn new(puid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            puid: puid.into(),
            name: name.into(),
            mime_type: None,
            version: None,
            extensions: Vec::new(),
            signature_ids: Vec::new(),
            priority_over: Vec::new(),
        }
    }

    /// Set the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add an extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    /// Add a binary signature id.
    pub fn with_signature(mut self, id: u32) -> Self {
        self.signature_ids.push(id);
        self
    }

    /// Declare priority over another format.
    pub fn with_priority_over(mut self, puid: impl Into<String>) -> Self {
        self.priority_over.push(puid.into());
        self
    }

    /// Returns true if `extension` is one of this format's extensions.
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Returns true if this format has no binary signatures.
    pub fn is_tentative(&self) -> bool {
        self.signature_ids.is_empty()
    }
}

/// A path inside a container and the signatures its content must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFileSource {
    /// Entry path.
    pub path: String,
    /// Content signatures; any one must match. Empty means presence only.
    #[serde(default)]
    pub signatures: Vec<SignatureSource>,
}

impl ContainerFileSource {
    /// An entry that must be present.
    pub fn present(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            signatures: Vec::new(),
        }
    }

    /// Add a content signature.
    pub fn with_signature(mut self, signature: SignatureSource) -> Self {
        self.signatures.push(signature);
        self
    }
}

/// A container signature as written in a signature file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSignatureSource {
    /// Container signature id.
    pub id: u32,
    /// Format identified when the signature matches.
    pub puid: String,
    /// Container kind the signature applies to.
    pub container: ContainerKind,
    /// Entries that must all be present and match.
    pub files: Vec<ContainerFileSource>,
}

impl ContainerSignatureSource {
    /// Create a new container signature with no files.
    pub fn new(id: u32, puid: impl Into<String>, container: ContainerKind) -> Self {
        Self {
            id,
            puid: puid.into(),
            container,
            files: Vec::new(),
        }
    }

    /// Add a file requirement.
    pub fn with_file(mut self, file: ContainerFileSource) -> Self {
        self.files.push(file);
        self
    }
}

/// Maps a format identified by binary signature to the container kind whose
/// container signatures should then be tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerTrigger {
    /// Format identified by binary signature.
    pub puid: String,
    /// Container kind to examine.
    pub container: ContainerKind,
}

/// The serialized source of a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFile {
    /// Version label of the signature set.
    #[serde(default)]
    pub version: String,
    /// Formats.
    #[serde(default)]
    pub formats: Vec<Format>,
    /// Binary signatures.
    #[serde(default)]
    pub signatures: Vec<SignatureSource>,
    /// Container signatures.
    #[serde(default)]
    pub container_signatures: Vec<ContainerSignatureSource>,
    /// Container triggers.
    #[serde(default)]
    pub container_triggers: Vec<ContainerTrigger>,
}

impl SignatureFile {
    /// Create an empty signature file.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    /// Add a format.
    pub fn add_format(&mut self, format: Format) {
        self.formats.push(format);
    }

    /// Add a binary signature.
    pub fn add_signature(&mut self, signature: SignatureSource) {
        self.signatures.push(signature);
    }

    /// Add a container signature.
    pub fn add_container_signature(&mut self, signature: ContainerSignatureSource) {
        self.container_signatures.push(signature);
    }

    /// Add a container trigger.
    pub fn add_container_trigger(&mut self, puid: impl Into<String>, container: ContainerKind) {
        self.container_triggers.push(ContainerTrigger {
            puid: puid.into(),
            container,
        });
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save to a JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// A compiled binary signature. Every byte sequence must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Signature id.
    pub id: u32,
    /// Optional descriptive name.
    pub name: Option<String>,
    /// Compiled expressions.
    pub byte_sequences: Vec<CompiledByteSequence>,
}

impl Signature {
    /// Compile a signature source.
    ///
    /// Fails if the source has no byte sequences or any expression fails to
    /// compile.
    pub fn compile(source: &SignatureSource, options: &CompileOptions) -> Result<Self> {
        if source.byte_sequences.is_empty() {
            return Err(RegistryError::InvalidSignature {
                id: source.id,
                reason: "signature has no byte sequences".to_string(),
            });
        }
        let byte_sequences = source
            .byte_sequences
            .iter()
            .map(|seq| {
                compile_with(&seq.expression, seq.anchor, options).map_err(|source_err| {
                    RegistryError::Compile {
                        id: source.id,
                        expression: seq.expression.clone(),
                        source: source_err,
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: source.id,
            name: source.name.clone(),
            byte_sequences,
        })
    }

    /// Returns true if every byte sequence matches.
    pub fn matches(&self, source: &ByteSource<'_>, limits: &ScanLimits) -> io::Result<bool> {
        for sequence in &self.byte_sequences {
            if !sequence.matches(source, limits)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fewest bytes a resource must have for this signature to match.
    pub fn min_length(&self) -> u64 {
        self.byte_sequences
            .iter()
            .map(CompiledByteSequence::min_length)
            .max()
            .unwrap_or(0)
    }
}

/// A compiled container file requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    /// Entry path.
    pub path: String,
    /// Content signatures; any one must match. Empty means presence only.
    pub signatures: Vec<Signature>,
}

impl ContainerFile {
    /// Returns true if the entry content satisfies this requirement.
    pub fn matches_content(&self, source: &ByteSource<'_>, limits: &ScanLimits) -> io::Result<bool> {
        if self.signatures.is_empty() {
            return Ok(true);
        }
        for signature in &self.signatures {
            if signature.matches(source, limits)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns true if only the presence of the entry is required.
    pub fn is_presence_only(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// A compiled container signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSignature {
    /// Container signature id.
    pub id: u32,
    /// Format identified when the signature matches.
    pub puid: String,
    /// Container kind the signature applies to.
    pub container: ContainerKind,
    /// Entries that must all be present and match.
    pub files: Vec<ContainerFile>,
}

impl ContainerSignature {
    /// Compile a container signature source.
    pub fn compile(source: &ContainerSignatureSource, options: &CompileOptions) -> Result<Self> {
        if source.files.is_empty() {
            return Err(RegistryError::InvalidSignature {
                id: source.id,
                reason: "container signature has no files".to_string(),
            });
        }
        let files = source
            .files
            .iter()
            .map(|file| {
                let signatures = file
                    .signatures
                    .iter()
                    .map(|sig| Signature::compile(sig, options))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ContainerFile {
                    path: file.path.clone(),
                    signatures,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: source.id,
            puid: source.puid.clone(),
            container: source.container,
            files,
        })
    }

    /// Look up the requirement for an entry path.
    pub fn file(&self, path: &str) -> Option<&ContainerFile> {
        self.files.iter().find(|f| f.path == path)
    }
}
