//! Engine configuration.
//!
//! Controls archive recursion, scan limits and extension fallback. The
//! configuration is a plain serde struct so it can be read from JSON.

use crate::error::{EngineError, Result};
use formatid_core::ContainerKind;
use formatid_signatures::{CompileOptions, CompileStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default nesting limit for archive recursion.
pub const DEFAULT_MAX_DEPTH: usize = 5;
/// Default limit on archive entries visited per top-level request.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
/// Default size above which archive entries are identified by name only.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Identification engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identify the entries of archives.
    pub process_archives: bool,
    /// Archive kinds to recurse into. `None` means every kind.
    pub expand_archive_kinds: Option<Vec<ContainerKind>>,
    /// Limit on bytes examined by unbounded searches.
    pub max_bytes_to_scan: Option<u64>,
    /// Fall back to extension matching when no signature matches.
    pub extension_fallback: bool,
    /// Extension fallback considers every format, not only formats
    /// without signatures.
    pub match_all_extensions: bool,
    /// Nesting limit for archives within archives.
    pub max_depth: usize,
    /// Limit on entries visited across one top-level request.
    pub max_entries: usize,
    /// Entries larger than this are identified by name only.
    pub max_entry_bytes: u64,
    /// Anchor strategy used when loading signature files.
    pub compile_strategy: CompileStrategy,
    /// Formats whose content is enumerated as an archive.
    pub archive_puids: BTreeMap<String, ContainerKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_archives: true,
            expand_archive_kinds: None,
            max_bytes_to_scan: None,
            extension_fallback: true,
            match_all_extensions: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            compile_strategy: CompileStrategy::default(),
            archive_puids: default_archive_puids(),
        }
    }
}

/// PUIDs of the archive formats the engine can open.
pub fn default_archive_puids() -> BTreeMap<String, ContainerKind> {
    [
        ("x-fmt/263", ContainerKind::Zip),
        ("x-fmt/265", ContainerKind::Tar),
        ("x-fmt/266", ContainerKind::Gzip),
        ("x-fmt/264", ContainerKind::Rar),
        ("fmt/411", ContainerKind::Rar),
        ("fmt/613", ContainerKind::Rar),
        ("fmt/468", ContainerKind::Iso),
    ]
    .into_iter()
    .map(|(puid, kind)| (puid.to_string(), kind))
    .collect()
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable archive recursion.
    pub fn with_process_archives(mut self, enabled: bool) -> Self {
        self.process_archives = enabled;
        self
    }

    /// Restrict recursion to the given archive kinds.
    pub fn with_expand_archive_kinds(mut self, kinds: impl IntoIterator<Item = ContainerKind>) -> Self {
        self.expand_archive_kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Limit unbounded searches.
    pub fn with_max_bytes_to_scan(mut self, bytes: Option<u64>) -> Self {
        self.max_bytes_to_scan = bytes;
        self
    }

    /// Enable or disable extension fallback.
    pub fn with_extension_fallback(mut self, enabled: bool) -> Self {
        self.extension_fallback = enabled;
        self
    }

    /// Let extension fallback consider every format.
    pub fn with_match_all_extensions(mut self, enabled: bool) -> Self {
        self.match_all_extensions = enabled;
        self
    }

    /// Set the archive nesting limit.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the archive entry limit.
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Set the entry size limit.
    pub fn with_max_entry_bytes(mut self, bytes: u64) -> Self {
        self.max_entry_bytes = bytes;
        self
    }

    /// Set the anchor strategy for signature loading.
    pub fn with_compile_strategy(mut self, strategy: CompileStrategy) -> Self {
        self.compile_strategy = strategy;
        self
    }

    /// Map a format to an archive kind.
    pub fn with_archive_puid(mut self, puid: impl Into<String>, kind: ContainerKind) -> Self {
        self.archive_puids.insert(puid.into(), kind);
        self
    }

    /// Compile options implied by this configuration.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions::default().with_strategy(self.compile_strategy)
    }

    /// Archive kind for a format, if it is one the engine opens.
    pub fn archive_kind(&self, puid: &str) -> Option<ContainerKind> {
        self.archive_puids.get(puid).copied()
    }

    /// Returns true if archives of `kind` may be recursed into.
    pub fn expands(&self, kind: ContainerKind) -> bool {
        self.process_archives
            && self
                .expand_archive_kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&kind))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes_to_scan == Some(0) {
            return Err(EngineError::InvalidConfig(
                "max_bytes_to_scan must be positive".to_string(),
            ));
        }
        if let Some(kind) = self.archive_puids.values().find(|k| **k == ContainerKind::Ole2) {
            return Err(EngineError::InvalidConfig(format!(
                "{} cannot be opened as an archive",
                kind
            )));
        }
        Ok(())
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
