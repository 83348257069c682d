//! Signature expression parser.
//!
//! Expressions are written as:
//! - Hex bytes: `4D 5A` (whitespace between elements is optional)
//! - Strings: `'PK'`, with `\'` and `\\` escapes
//! - Sets: members are written without separators, `[0D0A'x'30:39]`; `[!00]`
//!   inverts, `&XX` and `~XX` match all-bits and any-bits masks
//! - Alternatives: `(01|02 03|'abc')`
//! - Gaps: `??`, `{n}`, `{min-max}`, `{min-*}` and `*`

use crate::ast::{ParseTree, SetMember};
use crate::error::ParseError;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Parse an expression into a parse tree.
///
/// The result is always a top-level [`ParseTree::Sequence`]; empty or
/// whitespace-only text yields an empty sequence.
pub fn parse(text: &str) -> ParseResult<ParseTree> {
    let mut parser = Parser::new(text);
    let children = parser.elements(None)?;
    Ok(ParseTree::Sequence(children))
}

struct Parser<'t> {
    text: &'t str,
    bytes: &'t [u8],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn char_at(&self, position: usize) -> char {
        self.text
            .get(position..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn unexpected(&self) -> ParseError {
        ParseError::UnexpectedChar {
            found: self.char_at(self.pos),
            position: self.pos,
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Parse elements until end of input, or until `|`/`)` inside a group.
    fn elements(&mut self, group_start: Option<usize>) -> ParseResult<Vec<ParseTree>> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else {
                return match group_start {
                    Some(position) => Err(ParseError::Unterminated {
                        what: "alternative group",
                        position,
                    }),
                    None => Ok(out),
                };
            };
            match c {
                b'|' | b')' if group_start.is_some() => return Ok(out),
                c if c.is_ascii_hexdigit() => out.push(ParseTree::Byte(self.hex_byte()?)),
                b'\'' => out.push(ParseTree::String(self.string()?)),
                b'[' => out.push(self.set()?),
                b'(' => self.group(&mut out)?,
                b'{' => out.push(self.gap()?),
                b'?' => {
                    self.wildcard()?;
                    out.push(ParseTree::Any);
                }
                b'*' => {
                    self.pos += 1;
                    out.push(ParseTree::ZeroToMany);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn hex_byte(&mut self) -> ParseResult<u8> {
        let start = self.pos;
        let high = self.peek().and_then(hex_value).ok_or_else(|| self.unexpected())?;
        self.pos += 1;
        let low = self
            .peek()
            .and_then(hex_value)
            .ok_or(ParseError::MissingHexDigit { position: start })?;
        self.pos += 1;
        Ok(high << 4 | low)
    }

    fn string(&mut self) -> ParseResult<Vec<u8>> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::Unterminated {
                        what: "string",
                        position: start,
                    })
                }
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => match self.bytes.get(self.pos + 1).copied() {
                    Some(escaped @ (b'\'' | b'\\')) => {
                        out.push(escaped);
                        self.pos += 2;
                    }
                    _ => {
                        out.push(b'\\');
                        self.pos += 1;
                    }
                },
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        if out.is_empty() {
            return Err(ParseError::EmptyString { position: start });
        }
        Ok(out)
    }

    fn wildcard(&mut self) -> ParseResult<()> {
        if self.bytes.get(self.pos + 1) == Some(&b'?') {
            self.pos += 2;
            Ok(())
        } else {
            Err(ParseError::IncompleteWildcard { position: self.pos })
        }
    }

    /// Parse `( branch | branch ... )`, pushing the result onto `out`.
    ///
    /// A group with a single branch is a plain parenthesised run and its
    /// elements are spliced into the enclosing sequence.
    fn group(&mut self, out: &mut Vec<ParseTree>) -> ParseResult<()> {
        let start = self.pos;
        self.pos += 1;
        let mut branches = Vec::new();
        loop {
            let branch_start = self.pos;
            let branch = self.elements(Some(start))?;
            if branch.is_empty() {
                return Err(ParseError::EmptyAlternative {
                    position: branch_start,
                });
            }
            branches.push(branch);
            match self.peek() {
                Some(b'|') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    return Err(ParseError::Unterminated {
                        what: "alternative group",
                        position: start,
                    })
                }
            }
        }

        if branches.len() == 1 {
            out.extend(branches.into_iter().flatten());
        } else {
            let branches = branches
                .into_iter()
                .map(|mut branch| {
                    if branch.len() == 1 {
                        branch.remove(0)
                    } else {
                        ParseTree::Sequence(branch)
                    }
                })
                .collect();
            out.push(ParseTree::Alternatives(branches));
        }
        Ok(())
    }

    fn gap(&mut self) -> ParseResult<ParseTree> {
        let start = self.pos;
        self.pos += 1;
        self.skip_whitespace();
        let min = self
            .number(start)?
            .ok_or(ParseError::invalid_gap(start, "missing lower bound"))?;
        self.skip_whitespace();
        match self.peek() {
            Some(b'}') => {
                self.pos += 1;
                Ok(ParseTree::Repeat(min))
            }
            Some(b'-') => {
                self.pos += 1;
                self.skip_whitespace();
                if self.peek() == Some(b'*') {
                    self.pos += 1;
                    self.close_gap(start)?;
                    return Ok(ParseTree::RepeatMinToMany(min));
                }
                let max = self
                    .number(start)?
                    .ok_or(ParseError::invalid_gap(start, "missing upper bound"))?;
                self.close_gap(start)?;
                if max < min {
                    return Err(ParseError::invalid_gap(
                        start,
                        "upper bound is below lower bound",
                    ));
                }
                Ok(ParseTree::RepeatMinToMax { min, max })
            }
            None => Err(ParseError::Unterminated {
                what: "gap",
                position: start,
            }),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn close_gap(&mut self, start: usize) -> ParseResult<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'}') => {
                self.pos += 1;
                Ok(())
            }
            None => Err(ParseError::Unterminated {
                what: "gap",
                position: start,
            }),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn number(&mut self, gap_start: usize) -> ParseResult<Option<u64>> {
        let mut value: Option<u64> = None;
        while let Some(digit @ b'0'..=b'9') = self.peek() {
            let current = value.unwrap_or(0);
            let next = current
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit - b'0')))
                .ok_or(ParseError::invalid_gap(gap_start, "count overflows"))?;
            value = Some(next);
            self.pos += 1;
        }
        Ok(value)
    }

    fn set(&mut self) -> ParseResult<ParseTree> {
        let start = self.pos;
        self.pos += 1;
        let inverted = if self.peek() == Some(b'!') {
            self.pos += 1;
            true
        } else {
            false
        };

        let mut members = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::Unterminated {
                        what: "set",
                        position: start,
                    })
                }
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(b) if b.is_ascii_whitespace() => {
                    return Err(ParseError::invalid_set(
                        self.pos,
                        "whitespace is not permitted inside brackets",
                    ))
                }
                Some(b'&') => {
                    self.pos += 1;
                    members.push(SetMember::AllBitmask(self.set_byte()?));
                }
                Some(b'~') => {
                    self.pos += 1;
                    members.push(SetMember::AnyBitmask(self.set_byte()?));
                }
                Some(b':' | b'-') => {
                    return Err(ParseError::invalid_range(self.pos, "missing lower bound"))
                }
                Some(b'\'') => members.push(self.string_member()?),
                Some(b) if b.is_ascii_hexdigit() => members.push(self.byte_member()?),
                Some(_) => return Err(self.unexpected()),
            }
        }

        if members.is_empty() {
            return Err(ParseError::invalid_set(start, "set has no members"));
        }
        if let [SetMember::Range { low, high }] = members.as_slice() {
            return Ok(ParseTree::Range {
                low: *low,
                high: *high,
                inverted,
            });
        }
        Ok(ParseTree::Set { members, inverted })
    }

    fn set_byte(&mut self) -> ParseResult<u8> {
        match self.peek() {
            Some(b) if b.is_ascii_hexdigit() => self.hex_byte(),
            None => Err(ParseError::Unterminated {
                what: "set",
                position: self.pos,
            }),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn byte_member(&mut self) -> ParseResult<SetMember> {
        let low = self.hex_byte()?;
        if !matches!(self.peek(), Some(b':' | b'-')) {
            return Ok(SetMember::Byte(low));
        }
        let op = self.pos;
        self.pos += 1;
        let high = match self.peek() {
            Some(b) if b.is_ascii_hexdigit() => self.hex_byte()?,
            Some(b'\'') => {
                return Err(ParseError::invalid_range(
                    op,
                    "bounds must both be bytes or both be characters",
                ))
            }
            _ => return Err(ParseError::invalid_range(op, "missing upper bound")),
        };
        if low > high {
            return Err(ParseError::invalid_range(op, "bounds are not ascending"));
        }
        Ok(SetMember::Range { low, high })
    }

    fn string_member(&mut self) -> ParseResult<SetMember> {
        let text = self.string()?;
        if self.peek() != Some(b':') {
            return Ok(SetMember::String(text));
        }
        let op = self.pos;
        self.pos += 1;
        let upper = match self.peek() {
            Some(b'\'') => self.string()?,
            Some(b) if b.is_ascii_hexdigit() => {
                return Err(ParseError::invalid_range(
                    op,
                    "bounds must both be bytes or both be characters",
                ))
            }
            _ => return Err(ParseError::invalid_range(op, "missing upper bound")),
        };
        let (&[low], &[high]) = (text.as_slice(), upper.as_slice()) else {
            return Err(ParseError::invalid_range(
                op,
                "character bounds must be single characters",
            ));
        };
        if low > high {
            return Err(ParseError::invalid_range(op, "bounds are not ascending"));
        }
        Ok(SetMember::Range { low, high })
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(children: Vec<ParseTree>) -> ParseTree {
        ParseTree::Sequence(children)
    }

    // ==================== Element Tests ====================

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse("").unwrap(), seq(vec![]));
        assert_eq!(parse("   \t\n ").unwrap(), seq(vec![]));
    }

    #[test]
    fn test_parse_bytes() {
        assert_eq!(
            parse("4D5a 00").unwrap(),
            seq(vec![
                ParseTree::Byte(0x4D),
                ParseTree::Byte(0x5A),
                ParseTree::Byte(0x00)
            ])
        );
    }

    #[test]
    fn test_parse_odd_hex_digit() {
        assert_eq!(
            parse("4D5").unwrap_err(),
            ParseError::MissingHexDigit { position: 2 }
        );
        assert!(parse("4 D").is_err());
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(
            parse("'PK' 'it\\'s' 'a\\b'").unwrap(),
            seq(vec![
                ParseTree::String(b"PK".to_vec()),
                ParseTree::String(b"it's".to_vec()),
                ParseTree::String(b"a\\b".to_vec()),
            ])
        );
    }

    #[test]
    fn test_parse_string_errors() {
        assert!(matches!(
            parse("01 'abc").unwrap_err(),
            ParseError::Unterminated { what: "string", position: 3 }
        ));
        assert!(matches!(
            parse("''").unwrap_err(),
            ParseError::EmptyString { position: 0 }
        ));
    }

    #[test]
    fn test_parse_wildcards() {
        assert_eq!(
            parse("?? *").unwrap(),
            seq(vec![ParseTree::Any, ParseTree::ZeroToMany])
        );
        assert!(matches!(
            parse("01 ? 02").unwrap_err(),
            ParseError::IncompleteWildcard { position: 3 }
        ));
    }

    // ==================== Gap Tests ====================

    #[test]
    fn test_parse_gaps() {
        assert_eq!(
            parse("{5} {4-12} {32-*}").unwrap(),
            seq(vec![
                ParseTree::Repeat(5),
                ParseTree::RepeatMinToMax { min: 4, max: 12 },
                ParseTree::RepeatMinToMany(32),
            ])
        );
    }

    #[test]
    fn test_parse_gap_errors() {
        for text in ["{}", "{-5}", "{5-}", "{9-3}", "{5", "{5-*", "{x}", "{99999999999999999999}"] {
            assert!(parse(text).is_err(), "{} should not parse", text);
        }
    }

    // ==================== Alternative Tests ====================

    #[test]
    fn test_parse_alternatives() {
        assert_eq!(
            parse("(01|02 03|'ab')").unwrap(),
            seq(vec![ParseTree::Alternatives(vec![
                ParseTree::Byte(0x01),
                seq(vec![ParseTree::Byte(0x02), ParseTree::Byte(0x03)]),
                ParseTree::String(b"ab".to_vec()),
            ])])
        );
    }

    #[test]
    fn test_parse_empty_alternatives() {
        for text in ["(|)", "(|01)", "(ff|)", "(ff||00)", "()"] {
            assert!(
                matches!(parse(text), Err(ParseError::EmptyAlternative { .. })),
                "{} should be an empty alternative",
                text
            );
        }
    }

    #[test]
    fn test_parse_single_branch_passthrough() {
        assert_eq!(
            parse("00 (01 02) 03").unwrap(),
            seq(vec![
                ParseTree::Byte(0),
                ParseTree::Byte(1),
                ParseTree::Byte(2),
                ParseTree::Byte(3),
            ])
        );
    }

    #[test]
    fn test_parse_unterminated_group() {
        assert!(matches!(
            parse("(01|02").unwrap_err(),
            ParseError::Unterminated { what: "alternative group", .. }
        ));
        assert!(parse("01)").is_err());
        assert!(parse("01|02").is_err());
    }

    // ==================== Set Tests ====================

    #[test]
    fn test_parse_range() {
        assert_eq!(
            parse("[01:FF]").unwrap(),
            seq(vec![ParseTree::Range { low: 0x01, high: 0xFF, inverted: false }])
        );
        assert_eq!(
            parse("[!01:FF]").unwrap(),
            seq(vec![ParseTree::Range { low: 0x01, high: 0xFF, inverted: true }])
        );
        assert_eq!(
            parse("['a':'z']").unwrap(),
            seq(vec![ParseTree::Range { low: b'a', high: b'z', inverted: false }])
        );
    }

    #[test]
    fn test_parse_range_errors() {
        for text in ["[:02]", "[01:]", "[02:01]", "[01:'a']", "['a':01]", "['ab':'c']", "['z':'a']"] {
            assert!(
                matches!(parse(text), Err(ParseError::InvalidRange { .. })),
                "{} should be an invalid range",
                text
            );
        }
    }

    #[test]
    fn test_parse_set_members() {
        assert_eq!(
            parse("[!0A0D'xy'&80~0F30-39]").unwrap(),
            seq(vec![ParseTree::Set {
                members: vec![
                    SetMember::Byte(0x0A),
                    SetMember::Byte(0x0D),
                    SetMember::String(b"xy".to_vec()),
                    SetMember::AllBitmask(0x80),
                    SetMember::AnyBitmask(0x0F),
                    SetMember::Range { low: 0x30, high: 0x39 },
                ],
                inverted: true,
            }])
        );
    }

    #[test]
    fn test_parse_set_errors() {
        assert!(matches!(
            parse("[01 02]").unwrap_err(),
            ParseError::InvalidSet { position: 3, .. }
        ));
        assert!(matches!(parse("[]").unwrap_err(), ParseError::InvalidSet { .. }));
        assert!(matches!(parse("[!]").unwrap_err(), ParseError::InvalidSet { .. }));
        assert!(matches!(
            parse("[01").unwrap_err(),
            ParseError::Unterminated { what: "set", .. }
        ));
        assert!(parse("[&]").is_err());
    }

    #[test]
    fn test_parse_unexpected_characters() {
        assert!(matches!(
            parse("01 zz").unwrap_err(),
            ParseError::UnexpectedChar { found: 'z', position: 3 }
        ));
        assert!(parse("01 é").is_err());
    }

    #[test]
    fn test_parse_realistic_expression() {
        let tree = parse("'%PDF-1.4' {0-1024} [0A0D] 25 (E2|E3) ?? * 2525454F46").unwrap();
        let ParseTree::Sequence(children) = tree else {
            panic!("expected sequence");
        };
        assert_eq!(children.len(), 12);
        assert_eq!(children[6], ParseTree::ZeroToMany);
    }

    #[test]
    fn test_parse_truncated_expression_positions() {
        let text = "'%PDF-1.4' {0-1024} [0A0D] 25 (E2|E3) ?? [!01:7F] {4-*} 2525454F46";
        for cut in 1..text.len() {
            if let Err(err) = parse(&text[..cut]) {
                let message = err.to_string();
                assert!(message.contains("position"), "{:?}: {}", &text[..cut], message);
            }
        }
        assert!(matches!(
            parse("'%PDF").unwrap_err(),
            ParseError::Unterminated { what: "string", position: 0 }
        ));
        assert!(matches!(parse("(E2|").unwrap_err(), ParseError::Unterminated { .. }));
        assert!(matches!(parse("{4-").unwrap_err(), ParseError::InvalidGap { .. } | ParseError::Unterminated { .. }));
    }
}
