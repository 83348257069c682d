//! Signature compiler.
//!
//! Lowers a parse tree plus an [`Anchor`] into a [`CompiledByteSequence`]:
//! 1. Flatten the tree into values, alternations, bounded gaps and splits.
//!    `??` and full sets become one-byte gaps.
//! 2. Split on unbounded gaps (`*`, `{n-*}`) into segments. Gaps touching a
//!    split belong to the segment farther from the anchored edge and become
//!    its minimum offset. Gaps at the far end of the last segment are ignored.
//! 3. In each segment pick the longest run of anchorable values as the
//!    anchor, ties to the first. Everything else becomes left or right
//!    fragments separated by the bounded gaps between them.

use crate::ast::{ParseTree, SetMember};
use crate::error::CompileError;
use crate::parser::parse;
use crate::pattern::{Alternation, ByteClass, ByteMatcher, SequenceMatcher};
use crate::sequence::{Anchor, CompiledByteSequence, Fragment, SubSequence};
use serde::{Deserialize, Serialize};

/// Default limit on the number of concrete branches an alternative expands to.
pub const DEFAULT_MAX_ALTERNATIVES: usize = 1024;

/// Longest fixed run a single alternative branch may expand to.
const MAX_BRANCH_LEN: u64 = 64 * 1024;

/// Densest class that may anchor a subsequence under [`CompileStrategy::Droid`].
const MAX_ANCHOR_CLASS_SIZE: u32 = 64;

/// Which values may form the anchor run of a subsequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompileStrategy {
    /// Only literal bytes and strings anchor.
    #[default]
    Pronom,
    /// Small sets and ranges (up to 64 byte values) also anchor.
    Droid,
}

impl CompileStrategy {
    /// Parse a strategy name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pronom" | "default" => Some(Self::Pronom),
            "droid" => Some(Self::Droid),
            _ => None,
        }
    }
}

/// Options controlling compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Anchor selection strategy.
    pub strategy: CompileStrategy,
    /// Limit on expanded alternative branches.
    pub max_alternatives: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strategy: CompileStrategy::default(),
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
        }
    }
}

impl CompileOptions {
    /// Set the anchor strategy.
    pub fn with_strategy(mut self, strategy: CompileStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the alternative expansion limit.
    pub fn with_max_alternatives(mut self, limit: usize) -> Self {
        self.max_alternatives = limit;
        self
    }
}

/// Compile an expression with default options.
pub fn compile(text: &str, anchor: Anchor) -> Result<CompiledByteSequence, CompileError> {
    compile_with(text, anchor, &CompileOptions::default())
}

/// Compile an expression.
pub fn compile_with(
    text: &str,
    anchor: Anchor,
    options: &CompileOptions,
) -> Result<CompiledByteSequence, CompileError> {
    let tree = parse(text)?;
    compile_tree(&tree, anchor, options)
}

/// Compile an already parsed expression.
pub fn compile_tree(
    tree: &ParseTree,
    anchor: Anchor,
    options: &CompileOptions,
) -> Result<CompiledByteSequence, CompileError> {
    let mut tokens = Vec::new();
    flatten(tree, options, &mut tokens)?;
    let segments = split_segments(merge_gaps(tokens));

    let subsequences = match anchor {
        Anchor::Bof | Anchor::Variable => forward_subsequences(&segments, anchor),
        Anchor::Eof => backward_subsequences(&segments),
    };
    if subsequences.is_empty() {
        return Err(CompileError::Empty);
    }
    Ok(CompiledByteSequence {
        anchor,
        subsequences,
    })
}

#[derive(Debug, Clone)]
enum Token {
    Value {
        matchers: Vec<ByteMatcher>,
        anchorable: bool,
    },
    Alt(Alternation),
    Gap {
        min: u64,
        max: u64,
    },
    Split {
        min: u64,
    },
}

fn flatten(tree: &ParseTree, options: &CompileOptions, out: &mut Vec<Token>) -> Result<(), CompileError> {
    match tree {
        ParseTree::Sequence(children) => {
            for child in children {
                flatten(child, options, out)?;
            }
        }
        ParseTree::Byte(b) => out.push(Token::Value {
            matchers: vec![ByteMatcher::Byte(*b)],
            anchorable: true,
        }),
        ParseTree::String(s) => out.push(Token::Value {
            matchers: s.iter().map(|&b| ByteMatcher::Byte(b)).collect(),
            anchorable: true,
        }),
        ParseTree::Set { .. } | ParseTree::Range { .. } => {
            let class = tree_class(tree).unwrap_or_else(ByteClass::full);
            match ByteMatcher::from_class(class) {
                ByteMatcher::Any => out.push(Token::Gap { min: 1, max: 1 }),
                matcher => {
                    let anchorable = match matcher {
                        ByteMatcher::Byte(_) => true,
                        _ => {
                            options.strategy == CompileStrategy::Droid
                                && class.count() <= MAX_ANCHOR_CLASS_SIZE
                        }
                    };
                    out.push(Token::Value {
                        matchers: vec![matcher],
                        anchorable,
                    });
                }
            }
        }
        ParseTree::Any => out.push(Token::Gap { min: 1, max: 1 }),
        ParseTree::Repeat(n) => out.push(Token::Gap { min: *n, max: *n }),
        ParseTree::RepeatMinToMax { min, max } => out.push(Token::Gap {
            min: *min,
            max: *max,
        }),
        ParseTree::ZeroToMany => out.push(Token::Split { min: 0 }),
        ParseTree::RepeatMinToMany(min) => out.push(Token::Split { min: *min }),
        ParseTree::Alternatives(branches) => {
            let mut expanded = Vec::new();
            for branch in branches {
                expanded.extend(expand_branch(branch, options)?);
                if expanded.len() > options.max_alternatives {
                    return Err(CompileError::TooManyBranches {
                        count: expanded.len(),
                        limit: options.max_alternatives,
                    });
                }
            }
            out.push(Token::Alt(Alternation::new(expanded)));
        }
    }
    Ok(())
}

/// The byte class of a set or range node.
fn tree_class(tree: &ParseTree) -> Option<ByteClass> {
    match tree {
        ParseTree::Range { low, high, inverted } => {
            let class = ByteClass::range(*low, *high);
            Some(if *inverted { class.inverted() } else { class })
        }
        ParseTree::Set { members, inverted } => {
            let class = members
                .iter()
                .fold(ByteClass::empty(), |acc, member| acc.union(member_class(member)));
            Some(if *inverted { class.inverted() } else { class })
        }
        _ => None,
    }
}

fn member_class(member: &SetMember) -> ByteClass {
    match member {
        SetMember::Byte(b) => ByteClass::single(*b),
        SetMember::Range { low, high } => ByteClass::range(*low, *high),
        SetMember::AllBitmask(mask) => ByteClass::all_bits(*mask),
        SetMember::AnyBitmask(mask) => ByteClass::any_bits(*mask),
        SetMember::String(s) => s
            .iter()
            .fold(ByteClass::empty(), |acc, &b| acc.union(ByteClass::single(b))),
    }
}

/// Expand one alternative branch into the fixed runs it can match.
fn expand_branch(tree: &ParseTree, options: &CompileOptions) -> Result<Vec<SequenceMatcher>, CompileError> {
    let limit = options.max_alternatives;
    let runs = match tree {
        ParseTree::Sequence(children) => {
            let mut acc = vec![SequenceMatcher::default()];
            for child in children {
                let options_for_child = expand_branch(child, options)?;
                let count = acc.len().saturating_mul(options_for_child.len());
                if count > limit {
                    return Err(CompileError::TooManyBranches { count, limit });
                }
                let mut next = Vec::with_capacity(count);
                for prefix in &acc {
                    for suffix in &options_for_child {
                        let mut run = prefix.clone();
                        run.extend_from(suffix);
                        next.push(run);
                    }
                }
                acc = next;
            }
            acc
        }
        ParseTree::Byte(b) => vec![SequenceMatcher::literal(&[*b])],
        ParseTree::String(s) => vec![SequenceMatcher::literal(s)],
        ParseTree::Set { .. } | ParseTree::Range { .. } => {
            let class = tree_class(tree).unwrap_or_else(ByteClass::full);
            vec![SequenceMatcher::new(vec![ByteMatcher::from_class(class)])]
        }
        ParseTree::Any => vec![SequenceMatcher::new(vec![ByteMatcher::Any])],
        ParseTree::Repeat(n) => vec![wildcard_run(*n)?],
        ParseTree::RepeatMinToMax { min, max } => {
            let count = usize::try_from(max - min).map_or(usize::MAX, |c| c.saturating_add(1));
            if count > limit {
                return Err(CompileError::TooManyBranches { count, limit });
            }
            (*min..=*max).map(wildcard_run).collect::<Result<Vec<_>, _>>()?
        }
        ParseTree::Alternatives(branches) => {
            let mut all = Vec::new();
            for branch in branches {
                all.extend(expand_branch(branch, options)?);
                if all.len() > limit {
                    return Err(CompileError::TooManyBranches {
                        count: all.len(),
                        limit,
                    });
                }
            }
            all
        }
        ParseTree::ZeroToMany | ParseTree::RepeatMinToMany(_) => {
            return Err(CompileError::UnboundedGapInAlternative)
        }
    };
    Ok(runs)
}

fn wildcard_run(n: u64) -> Result<SequenceMatcher, CompileError> {
    if n > MAX_BRANCH_LEN {
        return Err(CompileError::TooManyBranches {
            count: usize::try_from(n).unwrap_or(usize::MAX),
            limit: MAX_BRANCH_LEN as usize,
        });
    }
    let mut run = SequenceMatcher::default();
    for _ in 0..n {
        run.push(ByteMatcher::Any);
    }
    Ok(run)
}

/// Merge adjacent gaps and drop empty ones.
fn merge_gaps(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Gap { min: 0, max: 0 } => {}
            Token::Gap { min, max } => match out.last_mut() {
                Some(Token::Gap { min: m, max: x }) => {
                    *m = m.saturating_add(min);
                    *x = x.saturating_add(max);
                }
                _ => out.push(Token::Gap { min, max }),
            },
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Default)]
struct Segment {
    tokens: Vec<Token>,
    /// Minimum of the split preceding this segment.
    split_before: u64,
}

fn split_segments(tokens: Vec<Token>) -> Vec<Segment> {
    let mut segments = vec![Segment::default()];
    for token in tokens {
        match token {
            Token::Split { min } => segments.push(Segment {
                tokens: Vec::new(),
                split_before: min,
            }),
            other => {
                if let Some(segment) = segments.last_mut() {
                    segment.tokens.push(other);
                }
            }
        }
    }
    segments
}

fn take_leading_gap(tokens: &mut Vec<Token>) -> (u64, u64) {
    match tokens.first() {
        Some(Token::Gap { min, max }) => {
            let gap = (*min, *max);
            tokens.remove(0);
            gap
        }
        _ => (0, 0),
    }
}

fn take_trailing_gap(tokens: &mut Vec<Token>) -> (u64, u64) {
    match tokens.last() {
        Some(Token::Gap { min, max }) => {
            let gap = (*min, *max);
            tokens.pop();
            gap
        }
        _ => (0, 0),
    }
}

fn forward_subsequences(segments: &[Segment], anchor: Anchor) -> Vec<SubSequence> {
    let mut subsequences = Vec::new();
    let mut carry = 0u64;
    for (i, segment) in segments.iter().enumerate() {
        let mut tokens = segment.tokens.clone();
        let (lead_min, lead_max) = take_leading_gap(&mut tokens);
        let (trail_min, _) = take_trailing_gap(&mut tokens);
        let min_offset = carry
            .saturating_add(segment.split_before)
            .saturating_add(lead_min);
        if tokens.is_empty() {
            carry = min_offset.saturating_add(trail_min);
            continue;
        }
        let max_offset = (i == 0 && anchor == Anchor::Bof).then_some(lead_max);
        subsequences.push(build_subsequence(tokens, min_offset, max_offset));
        carry = trail_min;
    }
    subsequences
}

fn backward_subsequences(segments: &[Segment]) -> Vec<SubSequence> {
    let mut subsequences = Vec::new();
    let mut carry = 0u64;
    let last = segments.len().saturating_sub(1);
    for i in (0..segments.len()).rev() {
        let mut tokens = segments[i].tokens.clone();
        let (edge_min, edge_max) = take_trailing_gap(&mut tokens);
        let (far_min, _) = take_leading_gap(&mut tokens);
        let split_after = segments.get(i + 1).map_or(0, |s| s.split_before);
        let min_offset = carry.saturating_add(split_after).saturating_add(edge_min);
        if tokens.is_empty() {
            carry = min_offset.saturating_add(far_min);
            continue;
        }
        let max_offset = (i == last).then_some(edge_max);
        subsequences.push(build_subsequence(tokens, min_offset, max_offset));
        carry = far_min;
    }
    subsequences.reverse();
    subsequences
}

/// Token index range `[start, end)` of the anchor.
struct AnchorRun {
    start: usize,
    end: usize,
}

fn find_anchor(tokens: &[Token]) -> AnchorRun {
    for strict in [true, false] {
        let mut best: Option<(usize, usize, usize)> = None;
        let mut current: Option<(usize, usize)> = None;
        for (i, token) in tokens.iter().enumerate() {
            let len = match token {
                Token::Value {
                    matchers,
                    anchorable,
                } if *anchorable || !strict => Some(matchers.len()),
                _ => None,
            };
            match (len, current) {
                (Some(len), Some((start, total))) => current = Some((start, total + len)),
                (Some(len), None) => current = Some((i, len)),
                (None, Some((start, total))) => {
                    if best.map_or(true, |(_, _, b)| total > b) {
                        best = Some((start, i, total));
                    }
                    current = None;
                }
                (None, None) => {}
            }
        }
        if let Some((start, total)) = current {
            if best.map_or(true, |(_, _, b)| total > b) {
                best = Some((start, tokens.len(), total));
            }
        }
        if let Some((start, end, _)) = best {
            return AnchorRun { start, end };
        }
    }

    // Only alternations remain: anchor on the one with the longest shortest branch.
    let mut best: Option<(usize, usize)> = None;
    for (i, token) in tokens.iter().enumerate() {
        if let Token::Alt(alt) = token {
            if best.map_or(true, |(_, len)| alt.min_len() > len) {
                best = Some((i, alt.min_len()));
            }
        }
    }
    let start = best.map_or(0, |(i, _)| i);
    AnchorRun {
        start,
        end: start + 1,
    }
}

struct Unit {
    matcher: Alternation,
    gap_before: (u64, u64),
}

fn flush_run(run: &mut Vec<ByteMatcher>, pending_gap: &mut (u64, u64), units: &mut Vec<Unit>) {
    if run.is_empty() {
        return;
    }
    units.push(Unit {
        matcher: Alternation::single(SequenceMatcher::new(std::mem::take(run))),
        gap_before: std::mem::take(pending_gap),
    });
}

/// Build a subsequence from a segment with no leading or trailing gaps.
fn build_subsequence(tokens: Vec<Token>, min_offset: u64, max_offset: Option<u64>) -> SubSequence {
    let anchor = find_anchor(&tokens);
    let mut units: Vec<Unit> = Vec::new();
    let mut run: Vec<ByteMatcher> = Vec::new();
    let mut pending_gap = (0u64, 0u64);
    let mut anchor_unit = 0;

    for (i, token) in tokens.into_iter().enumerate() {
        if i == anchor.start || i == anchor.end {
            flush_run(&mut run, &mut pending_gap, &mut units);
        }
        if i == anchor.start {
            anchor_unit = units.len();
        }
        match token {
            Token::Value { matchers, .. } => run.extend(matchers),
            Token::Alt(alt) => {
                flush_run(&mut run, &mut pending_gap, &mut units);
                units.push(Unit {
                    matcher: alt,
                    gap_before: std::mem::take(&mut pending_gap),
                });
            }
            Token::Gap { min, max } => {
                flush_run(&mut run, &mut pending_gap, &mut units);
                pending_gap = (min, max);
            }
            Token::Split { .. } => {}
        }
    }
    flush_run(&mut run, &mut pending_gap, &mut units);

    let mut left = Vec::with_capacity(anchor_unit);
    let mut right = Vec::new();
    let mut anchor_matcher = Alternation::new(Vec::new());
    let mut gaps_after: Vec<(u64, u64)> = units.iter().skip(1).map(|u| u.gap_before).collect();
    gaps_after.push((0, 0));

    for (index, (unit, gap_after)) in units.into_iter().zip(gaps_after).enumerate() {
        if index < anchor_unit {
            left.push(Fragment::with_gap(unit.matcher, gap_after.0, gap_after.1));
        } else if index == anchor_unit {
            anchor_matcher = unit.matcher;
        } else {
            right.push(Fragment::with_gap(unit.matcher, unit.gap_before.0, unit.gap_before.1));
        }
    }

    SubSequence {
        anchor: anchor_matcher,
        left,
        right,
        min_offset,
        max_offset,
    }
}
