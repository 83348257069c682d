//! Container signature evaluation over a stream of archive entries.
//!
//! A container signature matches when every file it lists is present in
//! the archive and, for files with content signatures, at least one of
//! them matches the entry.

use crate::resolver::RawMatch;
use formatid_core::{ContainerKind, IdentificationMethod, Resource};
use formatid_signatures::{ByteSource, ContainerSignature, Registry, ScanLimits};
use std::collections::BTreeMap;
use std::io;

/// Normalize an entry path for comparison with container signature paths.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut trimmed = path.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

struct Candidate<'r> {
    signature: &'r ContainerSignature,
    satisfied: Vec<bool>,
}

impl Candidate<'_> {
    fn is_satisfied(&self) -> bool {
        self.satisfied.iter().all(|&s| s)
    }
}

/// Tracks the container signatures of one kind while entries go by.
pub struct ContainerMatcher<'r> {
    candidates: Vec<Candidate<'r>>,
}

impl<'r> ContainerMatcher<'r> {
    /// Start matching the container signatures registered for `kind`.
    pub fn new(registry: &'r Registry, kind: ContainerKind) -> Self {
        let candidates = registry
            .container_signatures_for(kind)
            .map(|signature| Candidate {
                signature,
                satisfied: vec![false; signature.files.len()],
            })
            .collect();
        Self { candidates }
    }

    /// Returns true if no container signature applies.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Returns true if some unsatisfied requirement needs this entry's
    /// content.
    pub fn wants_content(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.candidates.iter().any(|c| {
            c.signature
                .files
                .iter()
                .zip(&c.satisfied)
                .any(|(file, &done)| !done && !file.is_presence_only() && file.path == path)
        })
    }

    /// Record an entry. `content` is `None` when the entry cannot be read,
    /// in which case only presence requirements can be satisfied.
    pub fn observe(&mut self, path: &str, content: Option<&dyn Resource>, limits: &ScanLimits) -> io::Result<()> {
        let path = normalize_path(path);
        let source = content.map(ByteSource::new);
        for candidate in &mut self.candidates {
            for (file, done) in candidate.signature.files.iter().zip(candidate.satisfied.iter_mut()) {
                if *done || file.path != path {
                    continue;
                }
                *done = match &source {
                    _ if file.is_presence_only() => true,
                    Some(source) => file.matches_content(source, limits)?,
                    None => false,
                };
            }
        }
        Ok(())
    }

    /// Returns true once every candidate is decided as matched.
    pub fn all_satisfied(&self) -> bool {
        !self.candidates.is_empty() && self.candidates.iter().all(Candidate::is_satisfied)
    }

    /// Formats whose container signatures matched.
    pub fn finish(self) -> Vec<RawMatch> {
        let mut by_puid: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for candidate in self.candidates.iter().filter(|c| c.is_satisfied()) {
            by_puid
                .entry(candidate.signature.puid.as_str())
                .or_default()
                .push(candidate.signature.id);
        }
        by_puid
            .into_iter()
            .map(|(puid, ids)| RawMatch::new(puid, IdentificationMethod::Container, ids))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formatid_core::MemoryResource;

    fn observe(matcher: &mut ContainerMatcher<'_>, path: &str, content: &[u8]) {
        let resource = MemoryResource::new(content.to_vec());
        matcher
            .observe(path, Some(&resource), &ScanLimits::unlimited())
            .unwrap();
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./word/document.xml"), "word/document.xml");
        assert_eq!(normalize_path("/META-INF\\manifest.xml"), "META-INF/manifest.xml");
        assert_eq!(normalize_path("mimetype"), "mimetype");
    }

    #[test]
    fn test_docx_presence() {
        let registry = Registry::builtin();
        let mut matcher = ContainerMatcher::new(&registry, ContainerKind::Zip);
        assert!(!matcher.is_empty());
        observe(&mut matcher, "[Content_Types].xml", b"<Types/>");
        assert!(matcher.finish().is_empty());

        let mut matcher = ContainerMatcher::new(&registry, ContainerKind::Zip);
        observe(&mut matcher, "[Content_Types].xml", b"<Types/>");
        observe(&mut matcher, "word/document.xml", b"<w:document/>");
        let matches = matcher.finish();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].puid, "fmt/412");
        assert_eq!(matches[0].method, IdentificationMethod::Container);
    }

    #[test]
    fn test_odt_content() {
        let registry = Registry::builtin();
        let mut matcher = ContainerMatcher::new(&registry, ContainerKind::Zip);
        assert!(matcher.wants_content("mimetype"));
        assert!(!matcher.wants_content("word/document.xml"));

        observe(&mut matcher, "mimetype", b"application/vnd.oasis.opendocument.text");
        assert!(!matcher.wants_content("mimetype"));
        observe(&mut matcher, "META-INF/manifest.xml", b"<manifest:manifest manifest:version=\"1.1\">");
        assert!(matcher.finish().is_empty());

        let mut matcher = ContainerMatcher::new(&registry, ContainerKind::Zip);
        observe(&mut matcher, "mimetype", b"application/vnd.oasis.opendocument.text");
        observe(&mut matcher, "META-INF/manifest.xml", b"<manifest:manifest manifest:version=\"1.2\">");
        let puids: Vec<String> = matcher.finish().into_iter().map(|m| m.puid).collect();
        assert_eq!(puids, vec!["fmt/291".to_string()]);
    }

    #[test]
    fn test_unreadable_entry_satisfies_presence_only() {
        let registry = Registry::builtin();
        let mut matcher = ContainerMatcher::new(&registry, ContainerKind::Zip);
        matcher.observe("[Content_Types].xml", None, &ScanLimits::unlimited()).unwrap();
        matcher.observe("word/document.xml", None, &ScanLimits::unlimited()).unwrap();
        matcher.observe("mimetype", None, &ScanLimits::unlimited()).unwrap();
        assert!(!matcher.all_satisfied());
        let puids: Vec<String> = matcher.finish().into_iter().map(|m| m.puid).collect();
        assert_eq!(puids, vec!["fmt/412".to_string()]);
    }

    #[test]
    fn test_no_signatures_for_kind() {
        let registry = Registry::builtin();
        let matcher = ContainerMatcher::new(&registry, ContainerKind::Tar);
        assert!(matcher.is_empty());
        assert!(!matcher.all_satisfied());
        assert!(matcher.finish().is_empty());
    }
}
