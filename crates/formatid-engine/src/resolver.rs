//! Result resolution: priority, ordering, extension checks and fallback.

use crate::config::EngineConfig;
use formatid_core::{
    IdentificationMethod, IdentificationRequest, IdentificationResult,
    IdentificationResultCollection,
};
use formatid_signatures::{Format, Registry};
use std::collections::{BTreeMap, BTreeSet};

/// A format match before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    /// Matched format.
    pub puid: String,
    /// How it matched.
    pub method: IdentificationMethod,
    /// Signatures (binary or container) that matched.
    pub signature_ids: Vec<u32>,
}

impl RawMatch {
    /// Creates a new raw match.
    pub fn new(puid: impl Into<String>, method: IdentificationMethod, signature_ids: Vec<u32>) -> Self {
        Self {
            puid: puid.into(),
            method,
            signature_ids,
        }
    }
}

/// Lookups and switches the resolver needs.
#[derive(Debug, Clone, Copy)]
pub struct ResolverContext<'r> {
    /// Format metadata and priorities.
    pub registry: &'r Registry,
    /// Emit extension results when nothing matched.
    pub extension_fallback: bool,
    /// Extension fallback considers every format.
    pub match_all_extensions: bool,
}

impl<'r> ResolverContext<'r> {
    /// Creates a context from an engine configuration.
    pub fn new(registry: &'r Registry, config: &EngineConfig) -> Self {
        Self {
            registry,
            extension_fallback: config.extension_fallback,
            match_all_extensions: config.match_all_extensions,
        }
    }
}

/// Turn raw matches into the ranked results for a request.
pub fn resolve(
    raw: Vec<RawMatch>,
    request: &IdentificationRequest<'_>,
    ctx: &ResolverContext<'_>,
) -> IdentificationResultCollection {
    let mut collection = IdentificationResultCollection::new(request);

    let merged = merge(raw);
    let kept = apply_priority(merged, ctx.registry);

    if let Some(ext) = &request.extension {
        collection.extension_mismatch = !kept.is_empty()
            && !kept
                .iter()
                .filter_map(|m| ctx.registry.format(&m.puid))
                .any(|format| format.has_extension(ext));
    }

    let mut results: Vec<IdentificationResult> = kept
        .into_iter()
        .map(|m| to_result(m, ctx.registry))
        .collect();

    if results.is_empty() && ctx.extension_fallback {
        if let Some(ext) = &request.extension {
            let formats = if ctx.match_all_extensions {
                ctx.registry.formats_for_extension(ext)
            } else {
                ctx.registry.tentative_formats_for_extension(ext)
            };
            results.extend(formats.into_iter().map(extension_result));
        }
    }

    results.sort_by(|a, b| a.method.cmp(&b.method).then_with(|| a.puid.cmp(&b.puid)));
    results.dedup_by(|a, b| a.puid == b.puid);
    collection.results = results;
    collection
}

/// Collapse matches of the same format, keeping the best method.
fn merge(raw: Vec<RawMatch>) -> Vec<RawMatch> {
    let mut by_puid: BTreeMap<String, RawMatch> = BTreeMap::new();
    for m in raw {
        match by_puid.get_mut(&m.puid) {
            Some(existing) => {
                existing.method = existing.method.min(m.method);
                existing.signature_ids.extend(m.signature_ids);
            }
            None => {
                by_puid.insert(m.puid.clone(), m);
            }
        }
    }
    by_puid
        .into_values()
        .map(|mut m| {
            m.signature_ids.sort_unstable();
            m.signature_ids.dedup();
            m
        })
        .collect()
}

/// Drop formats another matched format has priority over, unless the
/// priority is mutual.
fn apply_priority(matches: Vec<RawMatch>, registry: &Registry) -> Vec<RawMatch> {
    let matched: BTreeSet<&str> = matches.iter().map(|m| m.puid.as_str()).collect();
    let has_priority = |winner: &str, loser: &str| {
        registry
            .format(winner)
            .is_some_and(|f| f.priority_over.iter().any(|p| p == loser))
    };

    let dropped: BTreeSet<String> = matched
        .iter()
        .filter(|&&loser| {
            matched
                .iter()
                .any(|&winner| winner != loser && has_priority(winner, loser) && !has_priority(loser, winner))
        })
        .map(|p| p.to_string())
        .collect();

    matches
        .into_iter()
        .filter(|m| !dropped.contains(&m.puid))
        .collect()
}

fn to_result(m: RawMatch, registry: &Registry) -> IdentificationResult {
    match registry.format(&m.puid) {
        Some(format) => IdentificationResult {
            puid: m.puid,
            name: format.name.clone(),
            mime_type: format.mime_type.clone(),
            version: format.version.clone(),
            method: m.method,
            signature_ids: m.signature_ids,
        },
        None => IdentificationResult {
            name: m.puid.clone(),
            puid: m.puid,
            mime_type: None,
            version: None,
            method: m.method,
            signature_ids: m.signature_ids,
        },
    }
}

fn extension_result(format: &Format) -> IdentificationResult {
    IdentificationResult {
        puid: format.puid.clone(),
        name: format.name.clone(),
        mime_type: format.mime_type.clone(),
        version: format.version.clone(),
        method: IdentificationMethod::Extension,
        signature_ids: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formatid_core::MemoryResource;
    use formatid_signatures::{SignatureFile, SignatureSource};

    fn registry() -> Registry {
        let mut file = SignatureFile::new("test");
        file.add_format(Format::new("fmt/1", "One").with_extension("one").with_signature(1));
        file.add_format(
            Format::new("fmt/2", "Two")
                .with_extension("two")
                .with_signature(2)
                .with_priority_over("fmt/1"),
        );
        file.add_format(
            Format::new("fmt/3", "Three")
                .with_extension("three")
                .with_signature(3)
                .with_priority_over("fmt/4"),
        );
        file.add_format(
            Format::new("fmt/4", "Four")
                .with_extension("four")
                .with_signature(4)
                .with_priority_over("fmt/3"),
        );
        file.add_format(Format::new("x-fmt/5", "Text").with_extension("txt"));
        file.add_format(Format::new("fmt/6", "Signed text").with_extension("txt").with_signature(6));
        for id in [1, 2, 3, 4, 6] {
            file.add_signature(SignatureSource::new(id).bof(format!("{:02X}", id)));
        }
        Registry::load(&file).registry
    }

    fn request(name: &str) -> IdentificationRequest<'static> {
        IdentificationRequest::new(name, MemoryResource::new(vec![0u8; 4]))
    }

    fn binary(puid: &str, id: u32) -> RawMatch {
        RawMatch::new(puid, IdentificationMethod::BinarySignature, vec![id])
    }

    fn ctx(registry: &Registry) -> ResolverContext<'_> {
        ResolverContext::new(registry, &EngineConfig::default())
    }

    // ==================== Priority Tests ====================

    #[test]
    fn test_priority_drops_loser() {
        let registry = registry();
        let coll = resolve(vec![binary("fmt/1", 1), binary("fmt/2", 2)], &request("a.two"), &ctx(&registry));
        assert_eq!(coll.puids(), vec!["fmt/2"]);
        assert!(!coll.extension_mismatch);
    }

    #[test]
    fn test_mutual_priority_keeps_both() {
        let registry = registry();
        let coll = resolve(vec![binary("fmt/4", 4), binary("fmt/3", 3)], &request("a.four"), &ctx(&registry));
        assert_eq!(coll.puids(), vec!["fmt/3", "fmt/4"]);
    }

    // ==================== Ordering Tests ====================

    #[test]
    fn test_ordering_and_merge() {
        let registry = registry();
        let raw = vec![
            binary("fmt/3", 3),
            RawMatch::new("fmt/6", IdentificationMethod::Container, vec![100]),
            binary("fmt/6", 6),
            binary("fmt/1", 1),
        ];
        let coll = resolve(raw, &request("a.txt"), &ctx(&registry));
        assert_eq!(coll.puids(), vec!["fmt/6", "fmt/1", "fmt/3"]);
        assert_eq!(coll.results[0].method, IdentificationMethod::Container);
        assert_eq!(coll.results[0].signature_ids, vec![6, 100]);
        assert_eq!(coll.results[0].name, "Signed text");
    }

    #[test]
    fn test_unknown_puid_uses_puid_as_name() {
        let registry = registry();
        let coll = resolve(vec![binary("fmt/999", 1)], &request("a"), &ctx(&registry));
        assert_eq!(coll.results[0].name, "fmt/999");
    }

    // ==================== Extension Tests ====================

    #[test]
    fn test_extension_mismatch() {
        let registry = registry();
        let coll = resolve(vec![binary("fmt/1", 1)], &request("a.two"), &ctx(&registry));
        assert!(coll.extension_mismatch);

        let coll = resolve(vec![binary("fmt/1", 1)], &request("a.ONE"), &ctx(&registry));
        assert!(!coll.extension_mismatch);

        let coll = resolve(vec![binary("fmt/1", 1)], &request("noext"), &ctx(&registry));
        assert!(!coll.extension_mismatch);

        let coll = resolve(vec![], &request("a.two"), &ctx(&registry));
        assert!(!coll.extension_mismatch);
    }

    #[test]
    fn test_fallback_tentative_only() {
        let registry = registry();
        let coll = resolve(vec![], &request("notes.txt"), &ctx(&registry));
        assert_eq!(coll.puids(), vec!["x-fmt/5"]);
        assert_eq!(coll.results[0].method, IdentificationMethod::Extension);
    }

    #[test]
    fn test_fallback_match_all() {
        let registry = registry();
        let config = EngineConfig::default().with_match_all_extensions(true);
        let coll = resolve(vec![], &request("notes.txt"), &ResolverContext::new(&registry, &config));
        assert_eq!(coll.puids(), vec!["fmt/6", "x-fmt/5"]);
    }

    #[test]
    fn test_fallback_disabled() {
        let registry = registry();
        let config = EngineConfig::default().with_extension_fallback(false);
        let coll = resolve(vec![], &request("notes.txt"), &ResolverContext::new(&registry, &config));
        assert!(coll.is_empty());
    }

    #[test]
    fn test_no_fallback_when_matched() {
        let registry = registry();
        let coll = resolve(vec![binary("fmt/1", 1)], &request("notes.txt"), &ctx(&registry));
        assert_eq!(coll.puids(), vec!["fmt/1"]);
        assert!(coll.extension_mismatch);
    }
}
