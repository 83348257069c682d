//! Compiled signature registry.
//!
//! A [`Registry`] is an immutable snapshot built from a [`SignatureFile`].
//! Problems with individual signatures are reported as diagnostics and the
//! offending signature is left out; the rest of the file still loads.
//! [`RegistryHandle`] holds the current snapshot and swaps in a new one on
//! reload.

use crate::compiler::CompileOptions;
use crate::signature::{ContainerSignature, Format, Signature, SignatureFile};
use crate::{RegistryError, Result};
use formatid_core::ContainerKind;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// A problem found while loading one signature or format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadDiagnostic {
    /// Signature id, when the problem concerns a signature.
    pub signature_id: Option<u32>,
    /// Offending expression, when one failed to compile.
    pub expression: Option<String>,
    /// What went wrong.
    pub reason: String,
}

impl LoadDiagnostic {
    fn from_error(error: &RegistryError) -> Self {
        match error {
            RegistryError::Compile {
                id,
                expression,
                source,
            } => Self {
                signature_id: Some(*id),
                expression: Some(expression.clone()),
                reason: source.to_string(),
            },
            RegistryError::InvalidSignature { id, reason } => Self {
                signature_id: Some(*id),
                expression: None,
                reason: reason.clone(),
            },
            RegistryError::DuplicateSignature(id) => Self {
                signature_id: Some(*id),
                expression: None,
                reason: error.to_string(),
            },
            other => Self {
                signature_id: None,
                expression: None,
                reason: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for LoadDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(id) = self.signature_id {
            write!(f, "signature {}: ", id)?;
        }
        if let Some(expression) = &self.expression {
            write!(f, "{:?}: ", expression)?;
        }
        f.write_str(&self.reason)
    }
}

fn reject(error: RegistryError, diagnostics: &mut Vec<LoadDiagnostic>) {
    warn!("skipping: {}", error);
    diagnostics.push(LoadDiagnostic::from_error(&error));
}

/// A loaded registry and the problems skipped while loading it.
#[derive(Debug)]
pub struct LoadOutcome {
    pub registry: Registry,
    pub diagnostics: Vec<LoadDiagnostic>,
}

/// Compiled signatures, formats and container rules.
#[derive(Debug, Default)]
pub struct Registry {
    version: String,
    formats: Vec<Format>,
    format_index: HashMap<String, usize>,
    signatures: Vec<Signature>,
    signature_index: HashMap<u32, usize>,
    /// Formats identified by each signature id.
    signature_formats: HashMap<u32, Vec<String>>,
    container_signatures: Vec<ContainerSignature>,
    container_triggers: HashMap<String, ContainerKind>,
    /// PUIDs established only by container signatures.
    container_targets: HashSet<String>,
    options: CompileOptions,
}

impl Registry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry with default compile options.
    pub fn load(file: &SignatureFile) -> LoadOutcome {
        Self::load_with(file, &CompileOptions::default())
    }

    /// Build a registry.
    pub fn load_with(file: &SignatureFile, options: &CompileOptions) -> LoadOutcome {
        let mut registry = Registry {
            version: file.version.clone(),
            options: *options,
            ..Registry::default()
        };
        let mut diagnostics = Vec::new();

        for format in &file.formats {
            if registry.format_index.contains_key(&format.puid) {
                reject(RegistryError::DuplicateFormat(format.puid.clone()), &mut diagnostics);
                continue;
            }
            registry
                .format_index
                .insert(format.puid.clone(), registry.formats.len());
            registry.formats.push(format.clone());
        }

        for source in &file.signatures {
            if registry.signature_index.contains_key(&source.id) {
                reject(RegistryError::DuplicateSignature(source.id), &mut diagnostics);
                continue;
            }
            match Signature::compile(source, options) {
                Ok(signature) => {
                    registry
                        .signature_index
                        .insert(signature.id, registry.signatures.len());
                    registry.signatures.push(signature);
                }
                Err(error) => reject(error, &mut diagnostics),
            }
        }

        let mut signature_formats: HashMap<u32, Vec<String>> = HashMap::new();
        for format in &registry.formats {
            for id in &format.signature_ids {
                if registry.signature_index.contains_key(id) {
                    signature_formats
                        .entry(*id)
                        .or_default()
                        .push(format.puid.clone());
                } else {
                    debug!("format {} references unavailable signature {}", format.puid, id);
                }
            }
        }
        registry.signature_formats = signature_formats;

        let mut container_ids = HashSet::new();
        for source in &file.container_signatures {
            if !container_ids.insert(source.id) {
                reject(RegistryError::DuplicateSignature(source.id), &mut diagnostics);
                continue;
            }
            match ContainerSignature::compile(source, options) {
                Ok(signature) => {
                    registry.container_targets.insert(signature.puid.clone());
                    registry.container_signatures.push(signature);
                }
                Err(error) => reject(error, &mut diagnostics),
            }
        }

        for trigger in &file.container_triggers {
            registry
                .container_triggers
                .insert(trigger.puid.clone(), trigger.container);
        }

        LoadOutcome {
            registry,
            diagnostics,
        }
    }

    /// Build a registry from signature file JSON.
    pub fn from_json(json: &str) -> Result<LoadOutcome> {
        Ok(Self::load(&SignatureFile::from_json(json)?))
    }

    /// Build a registry from a signature file on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<LoadOutcome> {
        Ok(Self::load(&SignatureFile::load_json(path)?))
    }

    /// Built-in sample registry.
    pub fn builtin() -> Self {
        Self::load(&crate::builtin::signature_file()).registry
    }

    /// Version label of the source file.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Options the signatures were compiled with.
    pub fn compile_options(&self) -> &CompileOptions {
        &self.options
    }

    /// All formats, in file order.
    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    /// Look up a format by PUID.
    pub fn format(&self, puid: &str) -> Option<&Format> {
        self.format_index.get(puid).map(|&idx| &self.formats[idx])
    }

    /// All compiled binary signatures, in file order.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Look up a compiled signature by id.
    pub fn signature(&self, id: u32) -> Option<&Signature> {
        self.signature_index.get(&id).map(|&idx| &self.signatures[idx])
    }

    /// Compiled signatures of a format.
    pub fn signatures_for(&self, puid: &str) -> Vec<&Signature> {
        self.format(puid)
            .map(|format| {
                format
                    .signature_ids
                    .iter()
                    .filter_map(|&id| self.signature(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Formats a signature identifies.
    pub fn puids_for_signature(&self, id: u32) -> &[String] {
        self.signature_formats
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All container signatures.
    pub fn container_signatures(&self) -> &[ContainerSignature] {
        &self.container_signatures
    }

    /// Container signatures for one container kind.
    pub fn container_signatures_for(
        &self,
        kind: ContainerKind,
    ) -> impl Iterator<Item = &ContainerSignature> + '_ {
        self.container_signatures
            .iter()
            .filter(move |sig| sig.container == kind)
    }

    /// Container kind to examine when `puid` is identified by signature.
    pub fn container_trigger(&self, puid: &str) -> Option<ContainerKind> {
        self.container_triggers.get(puid).copied()
    }

    /// Returns true if `puid` is identified by a container signature.
    pub fn is_container_target(&self, puid: &str) -> bool {
        self.container_targets.contains(puid)
    }

    /// Formats with the given extension, in file order.
    pub fn formats_for_extension(&self, extension: &str) -> Vec<&Format> {
        self.formats
            .iter()
            .filter(|format| format.has_extension(extension))
            .collect()
    }

    /// Formats without binary signatures that have the given extension.
    pub fn tentative_formats_for_extension(&self, extension: &str) -> Vec<&Format> {
        self.formats
            .iter()
            .filter(|format| format.is_tentative() && format.has_extension(extension))
            .collect()
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        let byte_sequences = self
            .signatures
            .iter()
            .map(|sig| sig.byte_sequences.len())
            .sum();
        let subsequences = self
            .signatures
            .iter()
            .flat_map(|sig| &sig.byte_sequences)
            .map(|seq| seq.subsequences.len())
            .sum();
        RegistryStats {
            version: self.version.clone(),
            formats: self.formats.len(),
            tentative_formats: self.formats.iter().filter(|f| f.is_tentative()).count(),
            signatures: self.signatures.len(),
            byte_sequences,
            subsequences,
            container_signatures: self.container_signatures.len(),
            container_triggers: self.container_triggers.len(),
        }
    }
}

/// Statistics about a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Version label.
    pub version: String,
    /// Number of formats.
    pub formats: usize,
    /// Formats without binary signatures.
    pub tentative_formats: usize,
    /// Compiled binary signatures.
    pub signatures: usize,
    /// Compiled byte sequences across all signatures.
    pub byte_sequences: usize,
    /// Subsequences across all byte sequences.
    pub subsequences: usize,
    /// Compiled container signatures.
    pub container_signatures: usize,
    /// Container triggers.
    pub container_triggers: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Signature version: {}", self.version)?;
        writeln!(
            f,
            "Formats: {} ({} extension only)",
            self.formats, self.tentative_formats
        )?;
        writeln!(
            f,
            "Signatures: {} ({} byte sequences, {} subsequences)",
            self.signatures, self.byte_sequences, self.subsequences
        )?;
        writeln!(
            f,
            "Container signatures: {} ({} triggers)",
            self.container_signatures, self.container_triggers
        )?;
        Ok(())
    }
}

/// Shared, reloadable access to the current registry.
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<Registry>>,
}

impl RegistryHandle {
    /// Wrap a registry.
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// The current snapshot. Later reloads do not affect it.
    pub fn snapshot(&self) -> Arc<Registry> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the current registry, returning the previous one.
    pub fn swap(&self, registry: Registry) -> Arc<Registry> {
        let next = Arc::new(registry);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }

    /// Build a registry from `file` and make it current.
    ///
    /// Compilation happens before the lock is taken.
    pub fn reload(&self, file: &SignatureFile) -> Vec<LoadDiagnostic> {
        let outcome = Registry::load_with(file, self.snapshot().compile_options());
        self.swap(outcome.registry);
        outcome.diagnostics
    }

    /// Reload from a signature file on disk. The current registry is kept if
    /// the file cannot be read.
    pub fn reload_json(&self, path: impl AsRef<Path>) -> Result<Vec<LoadDiagnostic>> {
        let file = SignatureFile::load_json(path)?;
        Ok(self.reload(&file))
    }
}

impl Default for RegistryHandle {
    fn default() -> Self {
        Self::new(Registry::empty())
    }
}

impl From<Registry> for RegistryHandle {
    fn from(registry: Registry) -> Self {
        Self::new(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{ByteSource, ScanLimits};
    use crate::signature::{ContainerFileSource, ContainerSignatureSource, SignatureSource};
    use formatid_core::MemoryResource;

    fn sample_file() -> SignatureFile {
        let mut file = SignatureFile::new("test-1");
        file.add_format(
            Format::new("fmt/11", "PNG 1.0")
                .with_extension("png")
                .with_signature(1),
        );
        file.add_format(Format::new("x-fmt/263", "ZIP Format").with_extension("zip").with_signature(2));
        file.add_format(Format::new("x-fmt/111", "Plain Text File").with_extension("txt"));
        file.add_signature(SignatureSource::new(1).bof("89 'PNG' 0D0A1A0A"));
        file.add_signature(SignatureSource::new(2).bof("504B0304"));
        file.add_container_signature(
            ContainerSignatureSource::new(10, "fmt/412", ContainerKind::Zip)
                .with_file(ContainerFileSource::present("word/document.xml")),
        );
        file.add_container_trigger("x-fmt/263", ContainerKind::Zip);
        file
    }

    // ==================== Load Tests ====================

    #[test]
    fn test_load_basic() {
        let outcome = Registry::load(&sample_file());
        assert!(outcome.diagnostics.is_empty());
        let registry = outcome.registry;

        assert_eq!(registry.version(), "test-1");
        assert_eq!(registry.formats().len(), 3);
        assert_eq!(registry.format("fmt/11").unwrap().name, "PNG 1.0");
        assert!(registry.format("fmt/999").is_none());
        assert_eq!(registry.signatures_for("fmt/11").len(), 1);
        assert!(registry.signatures_for("x-fmt/111").is_empty());
        assert_eq!(registry.puids_for_signature(2), ["x-fmt/263".to_string()]);
        assert_eq!(registry.container_trigger("x-fmt/263"), Some(ContainerKind::Zip));
        assert!(registry.is_container_target("fmt/412"));
        assert!(!registry.is_container_target("fmt/11"));
        assert_eq!(registry.container_signatures_for(ContainerKind::Zip).count(), 1);
        assert_eq!(registry.container_signatures_for(ContainerKind::Tar).count(), 0);
    }

    #[test]
    fn test_bad_signatures_skipped() {
        let mut file = sample_file();
        file.add_signature(SignatureSource::new(3).bof("01 (02|)"));
        file.add_signature(SignatureSource::new(4));
        file.add_signature(SignatureSource::new(1).bof("FF"));

        let outcome = Registry::load(&file);
        assert_eq!(outcome.registry.signatures().len(), 2);
        assert_eq!(outcome.diagnostics.len(), 3);

        let compile = &outcome.diagnostics[0];
        assert_eq!(compile.signature_id, Some(3));
        assert_eq!(compile.expression.as_deref(), Some("01 (02|)"));
        assert_eq!(outcome.diagnostics[1].signature_id, Some(4));
        assert!(outcome.diagnostics[2].reason.contains("duplicate"));
        assert!(outcome.registry.signature(3).is_none());
        // The first definition of a duplicated id wins.
        let png = outcome.registry.signature(1).unwrap();
        assert_eq!(png.byte_sequences[0].subsequences[0].anchor.min_len(), 8);
    }

    #[test]
    fn test_extension_lookup() {
        let registry = Registry::load(&sample_file()).registry;
        assert_eq!(registry.formats_for_extension("PNG").len(), 1);
        assert!(registry.tentative_formats_for_extension("png").is_empty());
        let tentative = registry.tentative_formats_for_extension("txt");
        assert_eq!(tentative[0].puid, "x-fmt/111");
    }

    #[test]
    fn test_from_json() {
        let json = sample_file().to_json().unwrap();
        let outcome = Registry::from_json(&json).unwrap();
        assert_eq!(outcome.registry.signatures().len(), 2);
        assert!(Registry::from_json("not json").is_err());
    }

    #[test]
    fn test_stats() {
        let stats = Registry::load(&sample_file()).registry.stats();
        assert_eq!(stats.formats, 3);
        assert_eq!(stats.tentative_formats, 1);
        assert_eq!(stats.signatures, 2);
        assert_eq!(stats.byte_sequences, 2);
        assert_eq!(stats.container_signatures, 1);
        let text = stats.to_string();
        assert!(text.contains("Formats: 3"));
    }

    // ==================== Handle Tests ====================

    #[test]
    fn test_handle_swap_keeps_old_snapshot() {
        let handle = RegistryHandle::new(Registry::load(&sample_file()).registry);
        let before = handle.snapshot();

        let mut next = SignatureFile::new("test-2");
        next.add_signature(SignatureSource::new(7).bof("'GIF8'"));
        let diagnostics = handle.reload(&next);
        assert!(diagnostics.is_empty());

        assert_eq!(before.version(), "test-1");
        assert_eq!(before.signatures().len(), 2);
        let after = handle.snapshot();
        assert_eq!(after.version(), "test-2");
        assert!(after.signature(7).is_some());
    }

    #[test]
    fn test_handle_reload_json_failure_keeps_current() {
        let handle = RegistryHandle::new(Registry::load(&sample_file()).registry);
        let dir = tempfile::tempdir().unwrap();
        assert!(handle.reload_json(dir.path().join("missing.json")).is_err());
        assert_eq!(handle.snapshot().version(), "test-1");

        let path = dir.path().join("next.json");
        SignatureFile::new("test-3").save_json(&path).unwrap();
        handle.reload_json(&path).unwrap();
        assert_eq!(handle.snapshot().version(), "test-3");
    }

    fn matching_puids(registry: &Registry, data: &[u8]) -> Vec<String> {
        let resource = MemoryResource::new(data.to_vec());
        let source = ByteSource::new(&resource);
        let mut puids: Vec<String> = registry
            .signatures()
            .iter()
            .filter(|sig| sig.matches(&source, &ScanLimits::unlimited()).unwrap())
            .flat_map(|sig| registry.puids_for_signature(sig.id).iter().cloned())
            .collect();
        puids.sort();
        puids
    }

    #[test]
    fn test_handle_reload_under_concurrent_readers() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        sample_file().save_json(&first).unwrap();
        let mut next = SignatureFile::new("test-2");
        next.add_format(Format::new("fmt/4", "GIF 89a").with_extension("gif").with_signature(7));
        next.add_signature(SignatureSource::new(7).bof("'GIF89a'"));
        next.save_json(&second).unwrap();

        let handle = RegistryHandle::new(Registry::load(&sample_file()).registry);
        let png = b"\x89PNG\r\n\x1a\n\x00\x00";
        let gif = b"GIF89a\x01\x00";

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let snapshot = handle.snapshot();
                        match snapshot.version() {
                            "test-1" => {
                                assert_eq!(snapshot.formats().len(), 3);
                                assert_eq!(matching_puids(&snapshot, png), ["fmt/11"]);
                                assert!(matching_puids(&snapshot, gif).is_empty());
                            }
                            "test-2" => {
                                assert_eq!(snapshot.formats().len(), 1);
                                assert!(matching_puids(&snapshot, png).is_empty());
                                assert_eq!(matching_puids(&snapshot, gif), ["fmt/4"]);
                            }
                            other => panic!("unexpected registry {}", other),
                        }
                    }
                });
            }
            scope.spawn(|| {
                for round in 0..50 {
                    let path = if round % 2 == 0 { &second } else { &first };
                    assert!(handle.reload_json(path).unwrap().is_empty());
                }
            });
        });

        // The last reload wins
        assert_eq!(handle.snapshot().version(), "test-1");
    }

    #[test]
    fn test_handle_survives_poisoned_lock() {
        let handle = RegistryHandle::new(Registry::load(&sample_file()).registry);
        let result = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = handle.current.write().unwrap();
                    panic!("writer failed");
                })
                .join()
        });
        assert!(result.is_err());
        assert!(handle.current.is_poisoned());

        assert_eq!(handle.snapshot().version(), "test-1");
        let previous = handle.swap(Registry::empty());
        assert_eq!(previous.version(), "test-1");
        assert!(handle.snapshot().formats().is_empty());
    }

    #[test]
    fn test_builtin_loads_cleanly() {
        let outcome = Registry::load(&crate::builtin::signature_file());
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
        assert!(outcome.registry.format("x-fmt/263").is_some());
    }
}
