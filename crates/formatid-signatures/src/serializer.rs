//! Rendering compiled sequences back to expression text.
//!
//! The output is canonical: compiling it with the same anchor and strategy
//! yields a sequence equal to the one rendered.

use crate::pattern::{Alternation, ByteClass, ByteMatcher, SequenceMatcher};
use crate::sequence::{Anchor, CompiledByteSequence, SubSequence};

/// Shortest printable run rendered as a quoted string.
const MIN_STRING_RUN: usize = 4;

/// Render a compiled sequence as expression text.
pub fn serialize(sequence: &CompiledByteSequence) -> String {
    let mut parts: Vec<String> = Vec::new();
    let subs = &sequence.subsequences;

    match sequence.anchor {
        Anchor::Bof | Anchor::Variable => {
            for (i, sub) in subs.iter().enumerate() {
                if i == 0 {
                    push_nonempty(&mut parts, render_edge(sequence.anchor, sub));
                } else {
                    parts.push(render_split(sub.min_offset));
                }
                push_nonempty(&mut parts, render_body(sub));
            }
        }
        Anchor::Eof => {
            for (i, sub) in subs.iter().enumerate() {
                push_nonempty(&mut parts, render_body(sub));
                if i + 1 < subs.len() {
                    parts.push(render_split(sub.min_offset));
                } else {
                    push_nonempty(&mut parts, render_edge(sequence.anchor, sub));
                }
            }
        }
    }
    parts.join(" ")
}

/// Offset of the subsequence nearest the anchored edge.
fn render_edge(anchor: Anchor, sub: &SubSequence) -> String {
    match (anchor, sub.max_offset) {
        (Anchor::Variable, _) => render_gap(sub.min_offset, sub.min_offset),
        (_, Some(max)) => render_gap(sub.min_offset, max),
        (_, None) => render_split(sub.min_offset),
    }
}

fn push_nonempty(parts: &mut Vec<String>, part: String) {
    if !part.is_empty() {
        parts.push(part);
    }
}

fn render_body(sub: &SubSequence) -> String {
    let mut parts = Vec::new();
    for fragment in &sub.left {
        parts.push(render_alternation(&fragment.matcher));
        push_nonempty(&mut parts, render_gap(fragment.min_gap, fragment.max_gap));
    }
    parts.push(render_alternation(&sub.anchor));
    for fragment in &sub.right {
        push_nonempty(&mut parts, render_gap(fragment.min_gap, fragment.max_gap));
        parts.push(render_alternation(&fragment.matcher));
    }
    parts.join(" ")
}

fn render_gap(min: u64, max: u64) -> String {
    match (min, max) {
        (0, 0) => String::new(),
        (min, max) if min == max => format!("{{{}}}", min),
        (min, max) => format!("{{{}-{}}}", min, max),
    }
}

fn render_split(min: u64) -> String {
    if min == 0 {
        "*".to_string()
    } else {
        format!("{{{}-*}}", min)
    }
}

/// Render an alternation: a lone branch as its run, several as `(a|b)`.
pub fn render_alternation(alternation: &Alternation) -> String {
    if let [only] = alternation.branches() {
        return render_run(only);
    }
    let branches: Vec<String> = alternation
        .branches()
        .iter()
        .map(|branch| {
            if branch.is_empty() {
                "{0}".to_string()
            } else {
                render_run(branch)
            }
        })
        .collect();
    format!("({})", branches.join("|"))
}

/// Render a fixed-length run.
pub fn render_run(run: &SequenceMatcher) -> String {
    let mut parts = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    for element in run.elements() {
        match element {
            ByteMatcher::Byte(b) => literal.push(*b),
            ByteMatcher::Class(class) => {
                flush_literal(&mut literal, &mut parts);
                parts.push(render_class(class));
            }
            ByteMatcher::Any => {
                flush_literal(&mut literal, &mut parts);
                parts.push("??".to_string());
            }
        }
    }
    flush_literal(&mut literal, &mut parts);
    parts.join(" ")
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7E).contains(&b)
}

/// Render a literal byte run, quoting long printable stretches.
fn flush_literal(literal: &mut Vec<u8>, parts: &mut Vec<String>) {
    let mut hex = String::new();
    let mut i = 0;
    while i < literal.len() {
        let end = literal[i..]
            .iter()
            .position(|&b| !is_printable(b))
            .map_or(literal.len(), |p| i + p);
        if end - i >= MIN_STRING_RUN {
            if !hex.is_empty() {
                parts.push(std::mem::take(&mut hex));
            }
            parts.push(quote(&literal[i..end]));
            i = end;
        } else {
            hex.push_str(&format!("{:02X}", literal[i]));
            i += 1;
        }
    }
    if !hex.is_empty() {
        parts.push(hex);
    }
    literal.clear();
}

fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('\'');
    for &b in bytes {
        if b == b'\'' || b == b'\\' {
            out.push('\\');
        }
        out.push(b as char);
    }
    out.push('\'');
    out
}

fn render_class(class: &ByteClass) -> String {
    let count = class.count();
    if count == 0 || count > 128 {
        format!("[!{}]", class_members(&class.inverted()))
    } else {
        format!("[{}]", class_members(class))
    }
}

fn class_members(class: &ByteClass) -> String {
    class
        .ranges()
        .into_iter()
        .map(|(low, high)| {
            if low == high {
                format!("{:02X}", low)
            } else {
                format!("{:02X}:{:02X}", low, high)
            }
        })
        .collect()
}
