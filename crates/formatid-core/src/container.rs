//! Container (archive) kinds.

use serde::{Deserialize, Serialize};

/// Archive formats whose entries can be enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerKind {
    Zip,
    Tar,
    Gzip,
    Rar,
    Iso,
    /// OLE2 compound documents. Named by container signatures but not
    /// enumerated.
    Ole2,
}

impl ContainerKind {
    /// Parse a container kind from its name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "zip" => Some(Self::Zip),
            "tar" => Some(Self::Tar),
            "gzip" | "gz" => Some(Self::Gzip),
            "rar" => Some(Self::Rar),
            "iso" | "iso9660" => Some(Self::Iso),
            "ole2" => Some(Self::Ole2),
            _ => None,
        }
    }

    /// Upper-case name, as used in signature files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "ZIP",
            Self::Tar => "TAR",
            Self::Gzip => "GZIP",
            Self::Rar => "RAR",
            Self::Iso => "ISO",
            Self::Ole2 => "OLE2",
        }
    }

    /// All kinds, in declaration order.
    pub fn all() -> &'static [ContainerKind] {
        &[
            Self::Zip,
            Self::Tar,
            Self::Gzip,
            Self::Rar,
            Self::Iso,
            Self::Ole2,
        ]
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for kind in ContainerKind::all() {
            assert_eq!(ContainerKind::parse(kind.name()), Some(*kind));
        }
        assert_eq!(ContainerKind::parse("gz"), Some(ContainerKind::Gzip));
        assert_eq!(ContainerKind::parse("cpio"), None);
    }

    #[test]
    fn test_serde_uses_upper_case() {
        let json = serde_json::to_string(&ContainerKind::Zip).unwrap();
        assert_eq!(json, "\"ZIP\"");
        let kind: ContainerKind = serde_json::from_str("\"ISO\"").unwrap();
        assert_eq!(kind, ContainerKind::Iso);
    }
}
