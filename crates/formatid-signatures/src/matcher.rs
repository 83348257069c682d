//! Matching compiled sequences against a resource.
//!
//! BOF and variable sequences are matched front to back: each subsequence
//! locates its anchor at or after the end of the previous match, then checks
//! its left fragments walking backward and its right fragments walking
//! forward. EOF sequences are matched symmetrically from the end.
//!
//! Alternations and variable gaps are explored depth first in declaration
//! order, smallest gap first. Failed `(fragment, position)` states are
//! remembered so that wide gaps do not cause repeated work.

use crate::pattern::SequenceMatcher;
use crate::sequence::{Anchor, CompiledByteSequence, Fragment, SubSequence};
use formatid_core::Resource;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io;

/// Size of the page cached by [`ByteSource`] for resources not in memory.
const PAGE_SIZE: usize = 8 * 1024;

/// Limits applied while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanLimits {
    /// Unbounded searches look no further than this many bytes from the
    /// edge they start at.
    pub max_bytes_to_scan: Option<u64>,
}

impl ScanLimits {
    /// No limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limit unbounded searches to `bytes` from their starting edge.
    pub fn with_max_bytes_to_scan(mut self, bytes: Option<u64>) -> Self {
        self.max_bytes_to_scan = bytes;
        self
    }
}

struct Page {
    start: u64,
    bytes: Vec<u8>,
}

/// Byte access to a resource for matching.
///
/// In-memory resources are read directly; anything else goes through a
/// single cached page.
pub struct ByteSource<'r> {
    resource: &'r dyn Resource,
    len: u64,
    direct: Option<&'r [u8]>,
    page: RefCell<Page>,
}

impl<'r> ByteSource<'r> {
    /// Wrap a resource.
    pub fn new(resource: &'r dyn Resource) -> Self {
        Self {
            len: resource.len(),
            direct: resource.as_bytes(),
            resource,
            page: RefCell::new(Page {
                start: 0,
                bytes: Vec::new(),
            }),
        }
    }

    /// Length of the underlying resource.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if the resource is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the byte at `pos`, which must be below [`ByteSource::len`].
    pub fn byte(&self, pos: u64) -> io::Result<u8> {
        if let Some(bytes) = self.direct {
            return usize::try_from(pos)
                .ok()
                .and_then(|i| bytes.get(i).copied())
                .ok_or_else(|| past_end(pos));
        }

        {
            let page = self.page.borrow();
            if pos >= page.start && pos - page.start < page.bytes.len() as u64 {
                return Ok(page.bytes[(pos - page.start) as usize]);
            }
        }

        let start = pos - pos % PAGE_SIZE as u64;
        let bytes = self.resource.read_range(start, PAGE_SIZE)?;
        let rel = (pos - start) as usize;
        let byte = bytes.get(rel).copied().ok_or_else(|| past_end(pos))?;
        *self.page.borrow_mut() = Page { start, bytes };
        Ok(byte)
    }

    /// Check whether a run matches at `pos`. Runs that would extend past
    /// the end do not match.
    pub fn matches_run(&self, run: &SequenceMatcher, pos: u64) -> io::Result<bool> {
        let Some(end) = pos.checked_add(run.len() as u64) else {
            return Ok(false);
        };
        if end > self.len {
            return Ok(false);
        }
        if let Some(bytes) = self.direct {
            return Ok(usize::try_from(pos).map_or(false, |p| run.matches_at(bytes, p)));
        }
        for (i, matcher) in run.elements().iter().enumerate() {
            if !matcher.matches(self.byte(pos + i as u64)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn past_end(pos: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("offset {} is past end of resource", pos),
    )
}

/// Span `[start, end)` of a successful match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: u64,
    pub end: u64,
}

/// Inclusive bounds on a position; `high = None` is unbounded.
#[derive(Debug, Clone, Copy)]
struct Window {
    low: u64,
    high: Option<u64>,
}

impl Window {
    fn accepts(&self, pos: u64) -> bool {
        pos >= self.low && self.high.map_or(true, |high| pos <= high)
    }
}

type Memo = HashSet<(usize, u64)>;

impl CompiledByteSequence {
    /// Check whether the sequence matches the resource.
    pub fn matches(&self, source: &ByteSource<'_>, limits: &ScanLimits) -> io::Result<bool> {
        Ok(self.find(source, limits)?.is_some())
    }

    /// Locate the sequence in the resource.
    ///
    /// Short resources decline the match without reading.
    pub fn find(&self, source: &ByteSource<'_>, limits: &ScanLimits) -> io::Result<Option<MatchSpan>> {
        if self.subsequences.is_empty() || self.min_length() > source.len() {
            return Ok(None);
        }
        match self.anchor {
            Anchor::Bof | Anchor::Variable => self.find_forward(source, limits),
            Anchor::Eof => self.find_backward(source, limits),
        }
    }

    fn find_forward(&self, source: &ByteSource<'_>, limits: &ScanLimits) -> io::Result<Option<MatchSpan>> {
        let mut from = 0u64;
        let mut start = None;
        for sub in &self.subsequences {
            let Some(span) = sub.find_forward(source, from, limits)? else {
                return Ok(None);
            };
            start.get_or_insert(span.start);
            from = span.end;
        }
        Ok(Some(MatchSpan {
            start: start.unwrap_or(0),
            end: from,
        }))
    }

    fn find_backward(&self, source: &ByteSource<'_>, limits: &ScanLimits) -> io::Result<Option<MatchSpan>> {
        let mut limit = source.len();
        let mut end = None;
        for sub in self.subsequences.iter().rev() {
            let Some(span) = sub.find_backward(source, limit, limits)? else {
                return Ok(None);
            };
            end.get_or_insert(span.end);
            limit = span.start;
        }
        Ok(Some(MatchSpan {
            start: limit,
            end: end.unwrap_or(limit),
        }))
    }
}

impl SubSequence {
    /// Locate this subsequence with its near (left) edge `min_offset..=max_offset`
    /// bytes after `from`.
    fn find_forward(
        &self,
        source: &ByteSource<'_>,
        from: u64,
        limits: &ScanLimits,
    ) -> io::Result<Option<MatchSpan>> {
        let len = source.len();
        let Some(low) = from.checked_add(self.min_offset) else {
            return Ok(None);
        };
        let window = Window {
            low,
            high: self.max_offset.map(|max| from.saturating_add(max)),
        };
        let (left_min, left_max) = self.left_span();
        let anchor_min = self.anchor.min_len() as u64;

        let first = low.saturating_add(left_min);
        let mut last = len.saturating_sub(anchor_min);
        match window.high {
            Some(high) => last = last.min(high.saturating_add(left_max)),
            None => {
                if let Some(max_scan) = limits.max_bytes_to_scan {
                    last = last.min(from.saturating_add(max_scan).saturating_sub(anchor_min));
                }
            }
        }
        if first > last {
            return Ok(None);
        }

        let mut left_memo = Memo::new();
        let mut right_memo = Memo::new();
        let mut pos = first;
        loop {
            for branch in self.anchor.branches() {
                if !source.matches_run(branch, pos)? {
                    continue;
                }
                let Some(start) = self.match_left(source, self.left.len(), pos, Some(window), &mut left_memo)? else {
                    continue;
                };
                let anchor_end = pos + branch.len() as u64;
                if let Some(end) = self.match_right(source, 0, anchor_end, None, &mut right_memo)? {
                    return Ok(Some(MatchSpan { start, end }));
                }
            }
            if pos >= last {
                return Ok(None);
            }
            pos += 1;
        }
    }

    /// Locate this subsequence with its far (right) edge `min_offset..=max_offset`
    /// bytes before `limit`.
    fn find_backward(
        &self,
        source: &ByteSource<'_>,
        limit: u64,
        limits: &ScanLimits,
    ) -> io::Result<Option<MatchSpan>> {
        let len = source.len();
        let Some(high) = limit.checked_sub(self.min_offset) else {
            return Ok(None);
        };
        let window = Window {
            low: self.max_offset.map_or(0, |max| limit.saturating_sub(max)),
            high: Some(high),
        };
        let (right_min, right_max) = self.right_span();

        // Range of anchor end positions.
        let Some(last) = high.checked_sub(right_min) else {
            return Ok(None);
        };
        let mut first = window.low.saturating_sub(right_max);
        if self.max_offset.is_none() {
            if let Some(max_scan) = limits.max_bytes_to_scan {
                first = first.max(limit.saturating_sub(max_scan));
            }
        }
        let last = last.min(len);
        if first > last {
            return Ok(None);
        }

        let mut left_memo = Memo::new();
        let mut right_memo = Memo::new();
        let mut anchor_end = last;
        loop {
            for branch in self.anchor.branches() {
                let Some(pos) = anchor_end.checked_sub(branch.len() as u64) else {
                    continue;
                };
                if !source.matches_run(branch, pos)? {
                    continue;
                }
                let Some(end) = self.match_right(source, 0, anchor_end, Some(window), &mut right_memo)? else {
                    continue;
                };
                if let Some(start) = self.match_left(source, self.left.len(), pos, None, &mut left_memo)? {
                    return Ok(Some(MatchSpan { start, end }));
                }
            }
            if anchor_end <= first {
                return Ok(None);
            }
            anchor_end -= 1;
        }
    }

    /// Match left fragments `0..remaining` ending before `pos`, returning
    /// the start of the leftmost one.
    fn match_left(
        &self,
        source: &ByteSource<'_>,
        remaining: usize,
        pos: u64,
        window: Option<Window>,
        memo: &mut Memo,
    ) -> io::Result<Option<u64>> {
        if remaining == 0 {
            return Ok(window.map_or(true, |w| w.accepts(pos)).then_some(pos));
        }
        if memo.contains(&(remaining, pos)) {
            return Ok(None);
        }
        let fragment: &Fragment = &self.left[remaining - 1];
        let floor = window.map_or(0, |w| w.low);
        let mut gap = fragment.min_gap;
        while gap <= fragment.max_gap {
            let Some(end) = pos.checked_sub(gap) else {
                break;
            };
            if end < floor {
                break;
            }
            for branch in fragment.matcher.branches() {
                let Some(start) = end.checked_sub(branch.len() as u64) else {
                    continue;
                };
                if start < floor || !source.matches_run(branch, start)? {
                    continue;
                }
                if let Some(found) = self.match_left(source, remaining - 1, start, window, memo)? {
                    return Ok(Some(found));
                }
            }
            gap += 1;
        }
        memo.insert((remaining, pos));
        Ok(None)
    }

    /// Match right fragments `index..` starting after `pos`, returning the
    /// end of the rightmost one.
    fn match_right(
        &self,
        source: &ByteSource<'_>,
        index: usize,
        pos: u64,
        window: Option<Window>,
        memo: &mut Memo,
    ) -> io::Result<Option<u64>> {
        if index == self.right.len() {
            return Ok(window.map_or(true, |w| w.accepts(pos)).then_some(pos));
        }
        if memo.contains(&(index, pos)) {
            return Ok(None);
        }
        let fragment: &Fragment = &self.right[index];
        let ceiling = window
            .and_then(|w| w.high)
            .unwrap_or(source.len())
            .min(source.len());
        let mut gap = fragment.min_gap;
        while gap <= fragment.max_gap {
            let Some(start) = pos.checked_add(gap) else {
                break;
            };
            if start > ceiling {
                break;
            }
            for branch in fragment.matcher.branches() {
                let end = start + branch.len() as u64;
                if end > ceiling || !source.matches_run(branch, start)? {
                    continue;
                }
                if let Some(found) = self.match_right(source, index + 1, end, window, memo)? {
                    return Ok(Some(found));
                }
            }
            gap += 1;
        }
        memo.insert((index, pos));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use formatid_core::MemoryResource;

    fn matches(expr: &str, anchor: Anchor, data: &[u8]) -> bool {
        let seq = compile(expr, anchor).unwrap();
        let res = MemoryResource::new(data.to_vec());
        let source = ByteSource::new(&res);
        seq.matches(&source, &ScanLimits::unlimited()).unwrap()
    }

    // ==================== Gap Tests ====================

    #[test]
    fn test_fixed_gap() {
        assert!(matches("01 {5} 02", Anchor::Bof, &[1, 0, 0, 0, 0, 0, 2]));
        assert!(!matches("01 {5} 02", Anchor::Bof, &[1, 0, 0, 0, 0, 2]));
        assert!(!matches("01 {5} 02", Anchor::Bof, &[1, 0, 0, 0, 0, 0, 0, 2]));
    }

    #[test]
    fn test_bounded_gap() {
        for n in 0..16 {
            let mut data = vec![1u8];
            data.extend(std::iter::repeat(0xEE).take(n));
            data.push(2);
            assert_eq!(
                matches("01 {4-12} 02", Anchor::Bof, &data),
                (4..=12).contains(&n),
                "gap of {}",
                n
            );
        }
    }

    #[test]
    fn test_min_to_many_gap() {
        let mut data = vec![1u8];
        data.extend(std::iter::repeat(0).take(31));
        data.push(2);
        assert!(!matches("01 {32-*} 02", Anchor::Bof, &data));
        data.insert(1, 0);
        assert!(matches("01 {32-*} 02", Anchor::Bof, &data));
        data.splice(1..1, std::iter::repeat(0).take(1000));
        assert!(matches("01 {32-*} 02", Anchor::Bof, &data));
    }

    // ==================== Anchor Tests ====================

    #[test]
    fn test_bof_offset() {
        assert!(matches("'PK'", Anchor::Bof, b"PK\x03\x04"));
        assert!(!matches("'PK'", Anchor::Bof, b"xPK\x03\x04"));
        assert!(matches("{2} 'PK'", Anchor::Bof, b"xxPK"));
        assert!(!matches("{2} 'PK'", Anchor::Bof, b"xxxPK"));
        assert!(matches("{1-3} 'PK'", Anchor::Bof, b"xxxPK"));
    }

    #[test]
    fn test_eof_offset() {
        assert!(matches("FF D9", Anchor::Eof, &[0xFF, 0xD8, 0x00, 0xFF, 0xD9]));
        assert!(!matches("FF D9", Anchor::Eof, &[0xFF, 0xD9, 0x00]));
        assert!(matches("FF D9 {0-2}", Anchor::Eof, &[0xFF, 0xD9, 0x00]));
        assert!(matches("'%%EOF' {1}", Anchor::Eof, b"...%%EOF\n"));
    }

    #[test]
    fn test_variable_offset() {
        assert!(matches("'needle'", Anchor::Variable, b"hay hay needle hay"));
        assert!(!matches("'needle'", Anchor::Variable, b"hay hay needl"));
    }

    #[test]
    fn test_multiple_subsequences() {
        let expr = "'%PDF' * 'obj' * 'endobj'";
        assert!(matches(expr, Anchor::Bof, b"%PDF-1.4 1 0 obj << >> endobj"));
        assert!(!matches(expr, Anchor::Bof, b"%PDF-1.4 endobj 1 0 obj"));
        assert!(!matches(expr, Anchor::Bof, b"x%PDF obj endobj"));
    }

    #[test]
    fn test_eof_multiple_subsequences() {
        let expr = "'trailer' * '%%EOF'";
        assert!(matches(expr, Anchor::Eof, b"...trailer <<>> %%EOF"));
        assert!(!matches(expr, Anchor::Eof, b"...%%EOF trailer"));
    }

    // ==================== Alternation Tests ====================

    #[test]
    fn test_alternation_branches_of_different_length() {
        let expr = "01 (02|03 04 05) 06";
        assert!(matches(expr, Anchor::Bof, &[1, 2, 6]));
        assert!(matches(expr, Anchor::Bof, &[1, 3, 4, 5, 6]));
        assert!(!matches(expr, Anchor::Bof, &[1, 3, 6]));
    }

    #[test]
    fn test_alternation_backtracks_into_later_branch() {
        // First branch matches the prefix but fails later; second must be tried.
        let expr = "'ab' ('c'|'cd') 'e'";
        assert!(matches(expr, Anchor::Bof, b"abcde"));
        assert!(matches(expr, Anchor::Bof, b"abce"));
    }

    #[test]
    fn test_left_fragments_with_gaps() {
        let expr = "01 02 {2-4} (0A|0B) 03 04 05";
        assert!(matches(expr, Anchor::Bof, &[1, 2, 0, 0, 0, 0x0B, 3, 4, 5]));
        assert!(!matches(expr, Anchor::Bof, &[1, 2, 0, 0x0B, 3, 4, 5]));
        assert!(!matches(expr, Anchor::Bof, &[9, 1, 2, 0, 0, 0x0A, 3, 4, 5]));
    }

    #[test]
    fn test_sets_and_ranges() {
        assert!(matches("[30:39] [!00]", Anchor::Bof, b"7x"));
        assert!(!matches("[30:39] [!00]", Anchor::Bof, b"7\x00"));
        assert!(matches("['a':'z'] [&80]", Anchor::Bof, b"q\x80"));
    }

    // ==================== Edge Case Tests ====================

    #[test]
    fn test_short_resources_decline() {
        assert!(!matches("01 02 03 04", Anchor::Bof, &[1, 2]));
        assert!(!matches("01 02 03 04", Anchor::Eof, &[3, 4]));
        assert!(!matches("01 * 02", Anchor::Variable, &[]));
        assert!(!matches("{100} 01", Anchor::Bof, &[1]));
    }

    #[test]
    fn test_max_bytes_to_scan() {
        let mut data = vec![0u8; 100];
        data.extend_from_slice(b"MAGIC");
        let seq = compile("'MAGIC'", Anchor::Variable).unwrap();
        let res = MemoryResource::new(data);
        let source = ByteSource::new(&res);
        assert!(seq.matches(&source, &ScanLimits::unlimited()).unwrap());
        let limited = ScanLimits::unlimited().with_max_bytes_to_scan(Some(50));
        assert!(!seq.matches(&source, &limited).unwrap());
        let enough = ScanLimits::unlimited().with_max_bytes_to_scan(Some(105));
        assert!(seq.matches(&source, &enough).unwrap());
    }

    #[test]
    fn test_find_reports_span() {
        let seq = compile("'ab' {2} 'cd'", Anchor::Variable).unwrap();
        let res = MemoryResource::new(b"xxab..cdyy".to_vec());
        let source = ByteSource::new(&res);
        let span = seq.find(&source, &ScanLimits::unlimited()).unwrap().unwrap();
        assert_eq!(span, MatchSpan { start: 2, end: 8 });
    }

    #[test]
    fn test_paged_source_matches_like_memory() {
        use std::io::Write;
        let mut data = vec![0u8; 20_000];
        data[17_000..17_004].copy_from_slice(b"GIF8");
        data.extend_from_slice(b"END");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let res = formatid_core::FileResource::open(file.path()).unwrap();
        let source = ByteSource::new(&res);
        let seq = compile("'GIF8' * 'END'", Anchor::Variable).unwrap();
        assert!(seq.matches(&source, &ScanLimits::unlimited()).unwrap());
        let eof = compile("'END'", Anchor::Eof).unwrap();
        assert!(eof.matches(&source, &ScanLimits::unlimited()).unwrap());
    }
}
