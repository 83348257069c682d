//! Parse tree for signature expressions.

/// A parsed signature expression.
///
/// Built by [`crate::parse`] and consumed by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseTree {
    /// Ordered children.
    Sequence(Vec<ParseTree>),
    /// A single literal byte.
    Byte(u8),
    /// A quoted literal string.
    String(Vec<u8>),
    /// A set of byte members, optionally inverted.
    Set {
        members: Vec<SetMember>,
        inverted: bool,
    },
    /// An inclusive byte range, optionally inverted. `low <= high`.
    Range { low: u8, high: u8, inverted: bool },
    /// Two or more non-empty branches.
    Alternatives(Vec<ParseTree>),
    /// Exactly one arbitrary byte (`??`).
    Any,
    /// Zero or more arbitrary bytes (`*`).
    ZeroToMany,
    /// Exactly `n` arbitrary bytes (`{n}`).
    Repeat(u64),
    /// Between `min` and `max` arbitrary bytes (`{min-max}`).
    RepeatMinToMax { min: u64, max: u64 },
    /// At least `min` arbitrary bytes (`{min-*}`).
    RepeatMinToMany(u64),
}

/// A member of a byte set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetMember {
    Byte(u8),
    Range { low: u8, high: u8 },
    /// Bytes with every bit of the mask set (`&XX`).
    AllBitmask(u8),
    /// Bytes with any bit of the mask set (`~XX`).
    AnyBitmask(u8),
    /// Every byte of a quoted string.
    String(Vec<u8>),
}

impl ParseTree {
    /// Returns true for an empty sequence.
    pub fn is_empty(&self) -> bool {
        matches!(self, ParseTree::Sequence(children) if children.is_empty())
    }

    /// Returns true for the unbounded gap nodes that split a sequence.
    pub fn is_unbounded_gap(&self) -> bool {
        matches!(self, ParseTree::ZeroToMany | ParseTree::RepeatMinToMany(_))
    }
}
