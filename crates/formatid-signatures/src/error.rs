//! Error types for expression parsing and compilation.

use thiserror::Error;

/// Malformed signature expression text.
///
/// Positions are byte offsets into the expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A character that cannot start or continue an element.
    #[error("unexpected character {found:?} at position {position}")]
    UnexpectedChar { found: char, position: usize },

    /// A hex byte with only one digit.
    #[error("missing hex digit at position {position}")]
    MissingHexDigit { position: usize },

    /// A lone `?` that is not part of `??`.
    #[error("incomplete wildcard at position {position}: expected \"??\"")]
    IncompleteWildcard { position: usize },

    /// An unclosed string, set or group.
    #[error("unterminated {what} starting at position {position}")]
    Unterminated { what: &'static str, position: usize },

    /// An alternative group with an empty branch.
    #[error("empty alternative branch at position {position}")]
    EmptyAlternative { position: usize },

    /// A `''` string literal.
    #[error("empty string at position {position}")]
    EmptyString { position: usize },

    /// A range with a missing, mismatched, multi-character or descending bound.
    #[error("invalid range at position {position}: {reason}")]
    InvalidRange {
        position: usize,
        reason: &'static str,
    },

    /// A set with no members or with whitespace inside the brackets.
    #[error("invalid set at position {position}: {reason}")]
    InvalidSet {
        position: usize,
        reason: &'static str,
    },

    /// A gap with a missing operand, inverted bounds or an overflowing count.
    #[error("invalid gap at position {position}: {reason}")]
    InvalidGap {
        position: usize,
        reason: &'static str,
    },
}

impl ParseError {
    /// Creates a new InvalidRange error.
    pub fn invalid_range(position: usize, reason: &'static str) -> Self {
        Self::InvalidRange { position, reason }
    }

    /// Creates a new InvalidSet error.
    pub fn invalid_set(position: usize, reason: &'static str) -> Self {
        Self::InvalidSet { position, reason }
    }

    /// Creates a new InvalidGap error.
    pub fn invalid_gap(position: usize, reason: &'static str) -> Self {
        Self::InvalidGap { position, reason }
    }
}

/// Failure to compile an expression into a byte sequence matcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The expression text did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The expression has no matchable content.
    #[error("expression compiles to no subsequences")]
    Empty,

    /// An unbounded gap inside an alternative branch.
    #[error("unbounded gap is not allowed inside an alternative branch")]
    UnboundedGapInAlternative,

    /// Alternative branches expand to too many concrete sequences.
    #[error("alternative expands to {count} branches (limit {limit})")]
    TooManyBranches { count: usize, limit: usize },
}
