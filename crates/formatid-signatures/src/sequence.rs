//! Compiled byte sequences.
//!
//! A [`CompiledByteSequence`] is the executable form of one expression for
//! one anchor. Unbounded gaps (`*`, `{n-*}`) split it into independent
//! [`SubSequence`]s; inside a subsequence, bounded gaps separate the anchor
//! run from the [`Fragment`]s on either side of it.

use crate::pattern::Alternation;
use serde::{Deserialize, Serialize};

/// Where in a resource an expression is tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    /// Offset from the beginning of the resource.
    #[serde(alias = "BOFoffset", alias = "bof")]
    Bof,
    /// Offset from the end of the resource.
    #[serde(alias = "EOFoffset", alias = "eof")]
    Eof,
    /// Anywhere in the resource.
    #[serde(alias = "variable")]
    Variable,
}

impl Anchor {
    /// Parse an anchor name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bof" | "bofoffset" => Some(Self::Bof),
            "eof" | "eofoffset" => Some(Self::Eof),
            "variable" | "var" | "any" => Some(Self::Variable),
            _ => None,
        }
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Anchor::Bof => "BOFoffset",
            Anchor::Eof => "EOFoffset",
            Anchor::Variable => "Variable",
        };
        f.write_str(name)
    }
}

/// A matcher beside the anchor run, with the gap separating it from its
/// neighbour on the anchor side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fragment {
    /// What must match.
    pub matcher: Alternation,
    /// Minimum number of bytes between this fragment and its neighbour.
    pub min_gap: u64,
    /// Maximum number of bytes between this fragment and its neighbour.
    pub max_gap: u64,
}

impl Fragment {
    /// A fragment directly adjacent to its neighbour.
    pub fn adjacent(matcher: Alternation) -> Self {
        Self {
            matcher,
            min_gap: 0,
            max_gap: 0,
        }
    }

    /// A fragment separated from its neighbour by `min..=max` bytes.
    pub fn with_gap(matcher: Alternation, min_gap: u64, max_gap: u64) -> Self {
        Self {
            matcher,
            min_gap,
            max_gap,
        }
    }
}

/// One independently located unit of a compiled sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubSequence {
    /// The longest fixed run of the segment.
    pub anchor: Alternation,
    /// Fragments before the anchor, in source order (farthest first).
    pub left: Vec<Fragment>,
    /// Fragments after the anchor, in source order (nearest first).
    pub right: Vec<Fragment>,
    /// Minimum distance from the previous match, or from the resource edge,
    /// to the near edge of this subsequence.
    pub min_offset: u64,
    /// Maximum distance; `None` is unbounded.
    pub max_offset: Option<u64>,
}

impl SubSequence {
    /// A subsequence consisting of an anchor only.
    pub fn new(anchor: Alternation) -> Self {
        Self {
            anchor,
            left: Vec::new(),
            right: Vec::new(),
            min_offset: 0,
            max_offset: None,
        }
    }

    /// Minimum and maximum number of bytes spanned by the left fragments.
    pub fn left_span(&self) -> (u64, u64) {
        fragment_span(&self.left)
    }

    /// Minimum and maximum number of bytes spanned by the right fragments.
    pub fn right_span(&self) -> (u64, u64) {
        fragment_span(&self.right)
    }

    /// Fewest bytes this subsequence needs, including its offset.
    pub fn min_length(&self) -> u64 {
        self.min_offset
            .saturating_add(self.left_span().0)
            .saturating_add(self.anchor.min_len() as u64)
            .saturating_add(self.right_span().0)
    }
}

fn fragment_span(fragments: &[Fragment]) -> (u64, u64) {
    fragments.iter().fold((0u64, 0u64), |(min, max), frag| {
        (
            min.saturating_add(frag.min_gap)
                .saturating_add(frag.matcher.min_len() as u64),
            max.saturating_add(frag.max_gap)
                .saturating_add(frag.matcher.max_len() as u64),
        )
    })
}

/// An expression compiled for one anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledByteSequence {
    /// Where the sequence is tested.
    pub anchor: Anchor,
    /// Subsequences in source order. EOF sequences are matched last first.
    pub subsequences: Vec<SubSequence>,
}

impl CompiledByteSequence {
    /// Fewest bytes a resource must have for this sequence to match.
    pub fn min_length(&self) -> u64 {
        self.subsequences
            .iter()
            .fold(0u64, |acc, sub| acc.saturating_add(sub.min_length()))
    }
}

impl std::fmt::Display for CompiledByteSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::serializer::serialize(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::SequenceMatcher;

    #[test]
    fn test_anchor_parse() {
        assert_eq!(Anchor::parse("BOFoffset"), Some(Anchor::Bof));
        assert_eq!(Anchor::parse("eof"), Some(Anchor::Eof));
        assert_eq!(Anchor::parse("Variable"), Some(Anchor::Variable));
        assert_eq!(Anchor::parse("middle"), None);
        assert_eq!(Anchor::Bof.to_string(), "BOFoffset");
    }

    #[test]
    fn test_anchor_serde_aliases() {
        let anchor: Anchor = serde_json::from_str("\"EOFoffset\"").unwrap();
        assert_eq!(anchor, Anchor::Eof);
        let anchor: Anchor = serde_json::from_str("\"Bof\"").unwrap();
        assert_eq!(anchor, Anchor::Bof);
    }

    #[test]
    fn test_min_length() {
        let mut sub = SubSequence::new(Alternation::literal(&[1, 2, 3]));
        sub.min_offset = 4;
        sub.left.push(Fragment::with_gap(Alternation::literal(&[9]), 2, 6));
        sub.right.push(Fragment::adjacent(Alternation::new(vec![
            SequenceMatcher::literal(&[5]),
            SequenceMatcher::literal(&[5, 6]),
        ])));
        assert_eq!(sub.left_span(), (3, 7));
        assert_eq!(sub.right_span(), (1, 2));
        assert_eq!(sub.min_length(), 4 + 3 + 3 + 1);

        let seq = CompiledByteSequence {
            anchor: Anchor::Bof,
            subsequences: vec![sub.clone(), SubSequence::new(Alternation::literal(&[0]))],
        };
        assert_eq!(seq.min_length(), 12);
    }
}
