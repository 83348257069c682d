//! Byte matcher primitives.
//!
//! The compiler assembles signatures from a small set of matchers:
//! - [`ByteMatcher`]: one byte, tested by equality, class membership or
//!   not at all (wildcard)
//! - [`SequenceMatcher`]: a fixed-length run of byte matchers; strings
//!   compile to a run of literal bytes
//! - [`Alternation`]: one or more runs tried in declaration order

/// A set of byte values, stored as a 256-bit bitmap.
///
/// Sets, ranges, bitmasks and their inversions all lower to a class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteClass {
    bits: [u64; 4],
}

impl ByteClass {
    /// A class matching no byte.
    pub const fn empty() -> Self {
        Self { bits: [0; 4] }
    }

    /// A class matching every byte.
    pub const fn full() -> Self {
        Self {
            bits: [u64::MAX; 4],
        }
    }

    /// A class matching exactly one byte.
    pub fn single(byte: u8) -> Self {
        let mut class = Self::empty();
        class.insert(byte);
        class
    }

    /// A class matching `low..=high`.
    pub fn range(low: u8, high: u8) -> Self {
        let mut class = Self::empty();
        for byte in low..=high {
            class.insert(byte);
        }
        class
    }

    /// Bytes with every bit of `mask` set.
    pub fn all_bits(mask: u8) -> Self {
        Self::from_predicate(|b| b & mask == mask)
    }

    /// Bytes with at least one bit of `mask` set.
    pub fn any_bits(mask: u8) -> Self {
        Self::from_predicate(|b| b & mask != 0)
    }

    fn from_predicate(pred: impl Fn(u8) -> bool) -> Self {
        let mut class = Self::empty();
        for byte in 0..=u8::MAX {
            if pred(byte) {
                class.insert(byte);
            }
        }
        class
    }

    /// Add a byte to the class.
    pub fn insert(&mut self, byte: u8) {
        self.bits[usize::from(byte >> 6)] |= 1u64 << (byte & 63);
    }

    /// Union of two classes.
    pub fn union(self, other: Self) -> Self {
        let mut bits = self.bits;
        for (word, other) in bits.iter_mut().zip(other.bits) {
            *word |= other;
        }
        Self { bits }
    }

    /// Complement of this class.
    pub fn inverted(self) -> Self {
        Self {
            bits: self.bits.map(|word| !word),
        }
    }

    /// Check if the class contains a byte.
    pub fn contains(&self, byte: u8) -> bool {
        self.bits[usize::from(byte >> 6)] & (1u64 << (byte & 63)) != 0
    }

    /// Number of bytes in the class.
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|word| word.count_ones()).sum()
    }

    /// Returns true if the class matches no byte.
    pub fn is_empty(&self) -> bool {
        self.bits == [0; 4]
    }

    /// Returns true if the class matches every byte.
    pub fn is_full(&self) -> bool {
        self.bits == [u64::MAX; 4]
    }

    /// The bytes in the class, ascending.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&b| self.contains(b))
    }

    /// The class as maximal inclusive ranges, ascending.
    pub fn ranges(&self) -> Vec<(u8, u8)> {
        let mut ranges: Vec<(u8, u8)> = Vec::new();
        for byte in self.bytes() {
            match ranges.last_mut() {
                Some((_, high)) if high.checked_add(1) == Some(byte) => *high = byte,
                _ => ranges.push((byte, byte)),
            }
        }
        ranges
    }
}

impl std::fmt::Debug for ByteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteClass[")?;
        for (i, (low, high)) in self.ranges().into_iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if low == high {
                write!(f, "{:02X}", low)?;
            } else {
                write!(f, "{:02X}:{:02X}", low, high)?;
            }
        }
        write!(f, "]")
    }
}

/// A single byte position in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteMatcher {
    /// Exact byte match.
    Byte(u8),
    /// Class membership.
    Class(ByteClass),
    /// Match any byte.
    Any,
}

impl ByteMatcher {
    /// Normalise a class: a single byte becomes [`ByteMatcher::Byte`] and a
    /// full class becomes [`ByteMatcher::Any`].
    pub fn from_class(class: ByteClass) -> Self {
        if class.is_full() {
            return ByteMatcher::Any;
        }
        if class.count() == 1 {
            if let Some(byte) = class.bytes().next() {
                return ByteMatcher::Byte(byte);
            }
        }
        ByteMatcher::Class(class)
    }

    /// Check if this matcher accepts a byte.
    pub fn matches(&self, byte: u8) -> bool {
        match self {
            ByteMatcher::Byte(b) => *b == byte,
            ByteMatcher::Class(class) => class.contains(byte),
            ByteMatcher::Any => true,
        }
    }

    /// Returns true for the wildcard matcher.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, ByteMatcher::Any)
    }

    /// Returns true for an exact byte.
    pub fn is_literal(&self) -> bool {
        matches!(self, ByteMatcher::Byte(_))
    }

    /// The set of bytes this matcher accepts.
    pub fn class(&self) -> ByteClass {
        match self {
            ByteMatcher::Byte(b) => ByteClass::single(*b),
            ByteMatcher::Class(class) => *class,
            ByteMatcher::Any => ByteClass::full(),
        }
    }
}

/// A fixed-length run of byte matchers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SequenceMatcher {
    elements: Vec<ByteMatcher>,
}

impl SequenceMatcher {
    /// Create a run from byte matchers.
    pub fn new(elements: Vec<ByteMatcher>) -> Self {
        Self { elements }
    }

    /// Create a run of literal bytes.
    pub fn literal(bytes: &[u8]) -> Self {
        Self {
            elements: bytes.iter().map(|&b| ByteMatcher::Byte(b)).collect(),
        }
    }

    /// Number of bytes the run consumes.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the run is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The matchers in the run.
    pub fn elements(&self) -> &[ByteMatcher] {
        &self.elements
    }

    /// Returns true if every position is an exact byte.
    pub fn is_literal(&self) -> bool {
        self.elements.iter().all(ByteMatcher::is_literal)
    }

    /// Check if the run matches the start of `data`.
    pub fn matches(&self, data: &[u8]) -> bool {
        if data.len() < self.elements.len() {
            return false;
        }
        self.elements
            .iter()
            .zip(data.iter())
            .all(|(matcher, &byte)| matcher.matches(byte))
    }

    /// Check if the run matches at a specific offset.
    pub fn matches_at(&self, data: &[u8], offset: usize) -> bool {
        match data.get(offset..) {
            Some(rest) => self.matches(rest),
            None => false,
        }
    }

    pub(crate) fn push(&mut self, matcher: ByteMatcher) {
        self.elements.push(matcher);
    }

    pub(crate) fn extend_from(&mut self, other: &SequenceMatcher) {
        self.elements.extend_from_slice(&other.elements);
    }
}

impl std::fmt::Display for SequenceMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::serializer::render_run(self))
    }
}

/// One or more runs, tried in declaration order.
///
/// A plain run is an alternation with a single branch. Branches may differ
/// in length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Alternation {
    branches: Vec<SequenceMatcher>,
}

impl Alternation {
    /// Create an alternation. An empty branch list is treated as one empty run.
    pub fn new(branches: Vec<SequenceMatcher>) -> Self {
        if branches.is_empty() {
            return Self {
                branches: vec![SequenceMatcher::default()],
            };
        }
        Self { branches }
    }

    /// An alternation with a single run.
    pub fn single(run: SequenceMatcher) -> Self {
        Self {
            branches: vec![run],
        }
    }

    /// A single run of literal bytes.
    pub fn literal(bytes: &[u8]) -> Self {
        Self::single(SequenceMatcher::literal(bytes))
    }

    /// The branches, in declaration order.
    pub fn branches(&self) -> &[SequenceMatcher] {
        &self.branches
    }

    /// Returns true if there is exactly one branch.
    pub fn is_single(&self) -> bool {
        self.branches.len() == 1
    }

    /// Length of the shortest branch.
    pub fn min_len(&self) -> usize {
        self.branches.iter().map(SequenceMatcher::len).min().unwrap_or(0)
    }

    /// Length of the longest branch.
    pub fn max_len(&self) -> usize {
        self.branches.iter().map(SequenceMatcher::len).max().unwrap_or(0)
    }
}

impl std::fmt::Display for Alternation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::serializer::render_alternation(self))
    }
}
