//! The identification engine.
//!
//! One request runs the binary signature pass, then a container pass for
//! every archive kind the binary results call for, then the resolver.
//! Container passes identify archive entries as child requests, recursing
//! until the [`Budget`] runs out.

use crate::budget::Budget;
use crate::config::EngineConfig;
use crate::container::ContainerMatcher;
use crate::error::Result as EngineResult;
use crate::resolver::{resolve, RawMatch, ResolverContext};
use formatid_archive::{enumerator_for, ArchiveError};
use formatid_core::{
    ContainerKind, IdentificationMethod, IdentificationRequest, IdentificationResultCollection,
    MemoryResource, ResourceAccessError, Result,
};
use formatid_signatures::{ByteSource, LoadDiagnostic, Registry, RegistryHandle, ScanLimits, SignatureFile};
use log::{debug, trace};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

/// What a container pass found.
#[derive(Debug, Default)]
pub struct ContainerOutcome {
    /// Container signature matches. Empty if the archive could not be read.
    pub matches: Vec<RawMatch>,
    /// Results for the entries identified.
    pub children: Vec<IdentificationResultCollection>,
    /// Enumeration stopped early (budget, depth or corruption).
    pub partial: bool,
    /// Cancellation was observed.
    pub cancelled: bool,
}

/// File format identification engine.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<RegistryHandle>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine over a registry.
    pub fn new(registry: Registry, config: EngineConfig) -> Self {
        Self::with_handle(Arc::new(RegistryHandle::new(registry)), config)
    }

    /// Create an engine sharing a reloadable registry.
    pub fn with_handle(registry: Arc<RegistryHandle>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Engine over the builtin signatures with the default configuration.
    pub fn builtin() -> Self {
        Self::new(Registry::builtin(), EngineConfig::default())
    }

    /// Compile a signature file with the configured strategy.
    pub fn from_signature_file(file: &SignatureFile, config: EngineConfig) -> (Self, Vec<LoadDiagnostic>) {
        let outcome = Registry::load_with(file, &config.compile_options());
        (Self::new(outcome.registry, config), outcome.diagnostics)
    }

    /// Load a JSON signature file with the configured strategy.
    pub fn load_json(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<(Self, Vec<LoadDiagnostic>)> {
        config.validate()?;
        let file = SignatureFile::load_json(path)?;
        Ok(Self::from_signature_file(&file, config))
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current registry snapshot.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.snapshot()
    }

    /// The shared registry handle.
    pub fn handle(&self) -> &Arc<RegistryHandle> {
        &self.registry
    }

    /// Replace the registry. Requests already running keep their snapshot.
    pub fn reload(&self, file: &SignatureFile) -> Vec<LoadDiagnostic> {
        self.registry.reload(file)
    }

    fn limits(&self) -> ScanLimits {
        ScanLimits::unlimited().with_max_bytes_to_scan(self.config.max_bytes_to_scan)
    }

    /// Identify one request.
    ///
    /// Fails only when the request's resource cannot be read. A cancelled
    /// request returns a collection with status `Cancelled` and no results.
    pub fn identify(&self, request: &IdentificationRequest<'_>) -> Result<IdentificationResultCollection> {
        let registry = self.registry.snapshot();
        let mut budget = Budget::from_config(&self.config);
        self.identify_with(&registry, request, &mut budget)
    }

    /// Identify a file on disk.
    pub fn identify_path(&self, path: impl AsRef<Path>) -> EngineResult<IdentificationResultCollection> {
        let request = IdentificationRequest::from_file(path)?;
        Ok(self.identify(&request)?)
    }

    /// Identify independent requests in parallel. Results are in request
    /// order.
    pub fn identify_all(&self, requests: &[IdentificationRequest<'_>]) -> Vec<Result<IdentificationResultCollection>> {
        let registry = self.registry.snapshot();
        requests
            .par_iter()
            .map(|request| {
                let mut budget = Budget::from_config(&self.config);
                self.identify_with(&registry, request, &mut budget)
            })
            .collect()
    }

    /// Run a container pass of `kind` over the request's resource.
    pub fn identify_container(
        &self,
        request: &IdentificationRequest<'_>,
        kind: ContainerKind,
        budget: &mut Budget,
    ) -> Result<ContainerOutcome> {
        let registry = self.registry.snapshot();
        self.identify_container_with(&registry, request, kind, budget)
    }

    fn identify_with(
        &self,
        registry: &Registry,
        request: &IdentificationRequest<'_>,
        budget: &mut Budget,
    ) -> Result<IdentificationResultCollection> {
        trace!("identifying {} {} ({} bytes)", request.id, request.name, request.size());
        if request.is_cancelled() {
            return Ok(IdentificationResultCollection::cancelled(request));
        }
        let Some(mut raw) = self.binary_matches(registry, request)? else {
            return Ok(IdentificationResultCollection::cancelled(request));
        };

        let mut container_matches = Vec::new();
        let mut children = Vec::new();
        let mut partial = false;
        for kind in self.container_kinds(registry, &raw) {
            let outcome = self.identify_container_with(registry, request, kind, budget)?;
            if outcome.cancelled {
                return Ok(IdentificationResultCollection::cancelled(request));
            }
            partial |= outcome.partial;
            container_matches.extend(outcome.matches);
            children.extend(outcome.children);
        }
        if !container_matches.is_empty() {
            raw = container_matches;
        }

        let mut collection = resolve(raw, request, &ResolverContext::new(registry, &self.config));
        collection.partial = partial;
        collection.children = children;
        trace!("{} identified as {:?}", request.id, collection.puids());
        Ok(collection)
    }

    /// Binary signature pass. Returns `None` if cancelled.
    fn binary_matches(&self, registry: &Registry, request: &IdentificationRequest<'_>) -> Result<Option<Vec<RawMatch>>> {
        let source = ByteSource::new(request.resource());
        let limits = self.limits();
        let mut matched: BTreeMap<&str, Vec<u32>> = BTreeMap::new();

        for signature in registry.signatures() {
            if request.is_cancelled() {
                return Ok(None);
            }
            let hit = signature
                .matches(&source, &limits)
                .map_err(|e| ResourceAccessError::io(request.name.clone(), e))?;
            if !hit {
                continue;
            }
            for puid in registry.puids_for_signature(signature.id) {
                // Established only by the container pass
                if registry.is_container_target(puid) {
                    continue;
                }
                matched.entry(puid.as_str()).or_default().push(signature.id);
            }
        }

        Ok(Some(
            matched
                .into_iter()
                .map(|(puid, ids)| RawMatch::new(puid, IdentificationMethod::BinarySignature, ids))
                .collect(),
        ))
    }

    /// Container kinds to open for the binary results.
    fn container_kinds(&self, registry: &Registry, raw: &[RawMatch]) -> BTreeSet<ContainerKind> {
        let mut kinds = BTreeSet::new();
        for m in raw {
            if let Some(kind) = registry.container_trigger(&m.puid) {
                kinds.insert(kind);
            }
            if let Some(kind) = self.config.archive_kind(&m.puid) {
                if self.config.expands(kind) {
                    kinds.insert(kind);
                }
            }
        }
        kinds
    }

    fn identify_container_with(
        &self,
        registry: &Registry,
        request: &IdentificationRequest<'_>,
        kind: ContainerKind,
        budget: &mut Budget,
    ) -> Result<ContainerOutcome> {
        let mut outcome = ContainerOutcome::default();
        let Some(enumerator) = enumerator_for(kind) else {
            debug!("{}: {} containers are not enumerated", request.name, kind);
            return Ok(outcome);
        };
        let mut matcher = ContainerMatcher::new(registry, kind);
        let expand = self.config.expands(kind);
        if matcher.is_empty() && !expand {
            return Ok(outcome);
        }

        let recurse = expand && budget.descend();
        if expand && !recurse {
            debug!("{}: depth limit reached, entries not identified", request.name);
            outcome.partial = true;
        }

        let limits = self.limits();
        let max_entry_bytes = self.config.max_entry_bytes;
        let result = enumerator.enumerate(request.resource(), &request.name, &mut |entry| {
            if request.is_cancelled() {
                outcome.cancelled = true;
                return Ok(ControlFlow::Break(()));
            }
            if !budget.take_entry() {
                debug!("{}: entry budget exhausted", request.name);
                outcome.partial = true;
                return Ok(ControlFlow::Break(()));
            }

            let name = entry.name.clone();
            let size = entry.size;
            if entry.is_dir || !(recurse || matcher.wants_content(&name)) {
                matcher.observe(&name, None, &limits)?;
                return Ok(settled(recurse, &matcher));
            }

            match entry.load(max_entry_bytes)? {
                Some(content) => {
                    matcher.observe(&name, Some(&content), &limits)?;
                    if recurse {
                        let child = IdentificationRequest::new(name, content)
                            .with_parent(request.id)
                            .with_cancellation(request.cancellation.clone());
                        let collection = self.identify_with(registry, &child, budget)?;
                        if collection.is_cancelled() {
                            outcome.cancelled = true;
                            return Ok(ControlFlow::Break(()));
                        }
                        outcome.children.push(collection);
                    }
                }
                None => {
                    debug!("{}: entry {} identified by name only", request.name, name);
                    matcher.observe(&name, None, &limits)?;
                    if recurse {
                        let child = IdentificationRequest::new(name, MemoryResource::new(Vec::new()))
                            .with_parent(request.id);
                        let mut collection =
                            resolve(Vec::new(), &child, &ResolverContext::new(registry, &self.config));
                        collection.size = size;
                        outcome.children.push(collection);
                    }
                }
            }
            Ok(settled(recurse, &matcher))
        });
        if recurse {
            budget.ascend();
        }

        match result {
            Ok(()) => {
                outcome.matches = matcher.finish();
                Ok(outcome)
            }
            Err(err) if err.is_fatal() => Err(fatal_error(err, request)),
            Err(err) => {
                debug!("{}: not a readable {} archive: {}", request.name, kind, err);
                outcome.partial = true;
                Ok(outcome)
            }
        }
    }
}

/// Without recursion, enumeration can stop once every container
/// signature has matched.
fn settled(recurse: bool, matcher: &ContainerMatcher<'_>) -> ControlFlow<()> {
    if !recurse && matcher.all_satisfied() {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

fn fatal_error(err: ArchiveError, request: &IdentificationRequest<'_>) -> ResourceAccessError {
    match err {
        ArchiveError::Resource(inner) => inner,
        ArchiveError::Io(io) => ResourceAccessError::io(request.name.clone(), io),
        other => ResourceAccessError::io(request.name.clone(), std::io::Error::other(other.to_string())),
    }
}
