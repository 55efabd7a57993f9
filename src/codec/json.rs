//! # JSON Text Codec
//!
//! Single-pass tokenizer feeding a recursive parser, plus an escaping
//! writer. Parsing is **strict**: input must be valid UTF-8, comments are
//! not JSON, and anything but whitespace after the root value is an error.
//!
//! ## Tokenizer
//!
//! Tokens are produced lazily. String tokens borrow the input slice when no
//! escape sequence occurs and only then pay for an unescaping copy:
//!
//! - `{` / `}` / `[` / `]` / `:` / `,` - structural
//! - String, Number, Bool, Null - values
//!
//! Numbers keep their raw text until the parser classifies them: integral
//! text becomes `Int` (or `Uint` above `i64::MAX`), anything with a decimal
//! point or exponent becomes `Float`, and integral overflow falls back to
//! `Float` rather than failing.
//!
//! ## Writer
//!
//! Floats print in their shortest round-trip form, gaining a trailing `.0`
//! when that form has no decimal point or exponent so the value re-parses
//! as a float. Non-finite floats print as `null`. Binary leaves have no
//! JSON representation and fail with `UnsupportedFormat`.

use std::borrow::Cow;

use eyre::{bail, Result, WrapErr};

use crate::codec::ByteSink;
use crate::config::MAX_DOCUMENT_DEPTH;
use crate::error::DocError;
use crate::memory::Arena;
use crate::types::{obj_upsert, Doc};

#[derive(Debug, Clone, PartialEq)]
enum Token<'i> {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    Colon,
    Comma,
    String(Cow<'i, str>),
    Number(&'i str),
    Bool(bool),
    Null,
}

struct Tokenizer<'i> {
    input: &'i str,
    pos: usize,
}

impl<'i> Tokenizer<'i> {
    fn new(input: &'i str) -> Self {
        Self { input, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() {
            match self.input.as_bytes()[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<'i>>> {
        self.skip_whitespace();

        if self.pos >= self.input.len() {
            return Ok(None);
        }

        let c = self.input.as_bytes()[self.pos];

        match c {
            b'{' => {
                self.pos += 1;
                Ok(Some(Token::ObjectStart))
            }
            b'}' => {
                self.pos += 1;
                Ok(Some(Token::ObjectEnd))
            }
            b'[' => {
                self.pos += 1;
                Ok(Some(Token::ArrayStart))
            }
            b']' => {
                self.pos += 1;
                Ok(Some(Token::ArrayEnd))
            }
            b':' => {
                self.pos += 1;
                Ok(Some(Token::Colon))
            }
            b',' => {
                self.pos += 1;
                Ok(Some(Token::Comma))
            }
            b'"' => self.scan_string(),
            b't' => self.scan_literal("true", Token::Bool(true)),
            b'f' => self.scan_literal("false", Token::Bool(false)),
            b'n' => self.scan_literal("null", Token::Null),
            b'-' | b'0'..=b'9' => self.scan_number(),
            _ => bail!(DocError::parse(format!(
                "unexpected character '{}' at position {}",
                c as char, self.pos
            ))),
        }
    }

    fn scan_string(&mut self) -> Result<Option<Token<'i>>> {
        let start = self.pos + 1;
        self.pos += 1;

        let mut has_escapes = false;
        while self.pos < self.input.len() {
            match self.input.as_bytes()[self.pos] {
                b'"' => {
                    let raw = &self.input[start..self.pos];
                    self.pos += 1;

                    return if has_escapes {
                        let unescaped = unescape(raw)?;
                        Ok(Some(Token::String(Cow::Owned(unescaped))))
                    } else {
                        Ok(Some(Token::String(Cow::Borrowed(raw))))
                    };
                }
                b'\\' => {
                    has_escapes = true;
                    self.pos += 2;
                }
                _ => self.pos += 1,
            }
        }

        bail!(DocError::parse(format!(
            "unterminated string starting at position {}",
            start - 1
        )))
    }

    fn scan_number(&mut self) -> Result<Option<Token<'i>>> {
        let start = self.pos;

        if self.input.as_bytes()[self.pos] == b'-' {
            self.pos += 1;
        }

        while self.pos < self.input.len() {
            match self.input.as_bytes()[self.pos] {
                b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-' => self.pos += 1,
                _ => break,
            }
        }

        Ok(Some(Token::Number(&self.input[start..self.pos])))
    }

    fn scan_literal(&mut self, literal: &str, token: Token<'i>) -> Result<Option<Token<'i>>> {
        if self.input[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(Some(token))
        } else {
            bail!(DocError::parse(format!(
                "expected '{}' at position {}",
                literal, self.pos
            )))
        }
    }

    /// Strict-mode tail check: only whitespace may follow the root value.
    fn expect_end(&mut self) -> Result<()> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            bail!(DocError::parse(format!(
                "trailing characters after JSON document at position {}",
                self.pos
            )));
        }
        Ok(())
    }
}

fn unescape(raw: &str) -> Result<String> {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('/') => result.push('/'),
            Some('b') => result.push('\x08'),
            Some('f') => result.push('\x0C'),
            Some('u') => {
                let unit = read_hex4(&mut chars)?;
                if (0xD800..0xDC00).contains(&unit) {
                    // high surrogate, must pair with \uDC00..\uDFFF
                    match (chars.next(), chars.next()) {
                        (Some('\\'), Some('u')) => {
                            let low = read_hex4(&mut chars)?;
                            if !(0xDC00..0xE000).contains(&low) {
                                bail!(DocError::parse("unpaired surrogate in \\u escape"));
                            }
                            let cp =
                                0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                            match char::from_u32(cp) {
                                Some(ch) => result.push(ch),
                                None => bail!(DocError::parse(format!(
                                    "invalid codepoint U+{:X}",
                                    cp
                                ))),
                            }
                        }
                        _ => bail!(DocError::parse("unpaired surrogate in \\u escape")),
                    }
                } else {
                    match char::from_u32(unit) {
                        Some(ch) => result.push(ch),
                        None => bail!(DocError::parse(format!(
                            "invalid codepoint U+{:04X}",
                            unit
                        ))),
                    }
                }
            }
            Some(other) => bail!(DocError::parse(format!(
                "invalid escape sequence: \\{}",
                other
            ))),
            None => bail!(DocError::parse("unexpected end of string after backslash")),
        }
    }

    Ok(result)
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Result<u32> {
    let hex: String = chars.by_ref().take(4).collect();
    if hex.len() != 4 {
        bail!(DocError::parse("incomplete \\u escape sequence"));
    }
    u32::from_str_radix(&hex, 16)
        .wrap_err_with(|| DocError::parse(format!("invalid \\u escape: \\u{}", hex)))
}

pub fn parse<'a>(arena: &'a Arena, bytes: &[u8]) -> Result<Doc<'a>> {
    let input = std::str::from_utf8(bytes)
        .map_err(|e| DocError::parse(format!("JSON input is not valid UTF-8: {}", e)))?;
    let mut tokenizer = Tokenizer::new(input);
    let doc = parse_value(arena, &mut tokenizer, 0)?;
    tokenizer.expect_end()?;
    Ok(doc)
}

fn parse_value<'a>(arena: &'a Arena, tokenizer: &mut Tokenizer<'_>, depth: usize) -> Result<Doc<'a>> {
    match tokenizer.next_token()? {
        Some(token) => token_to_value(arena, tokenizer, token, depth),
        None => bail!(DocError::parse("unexpected end of JSON input")),
    }
}

fn token_to_value<'a>(
    arena: &'a Arena,
    tokenizer: &mut Tokenizer<'_>,
    token: Token<'_>,
    depth: usize,
) -> Result<Doc<'a>> {
    if depth > MAX_DOCUMENT_DEPTH {
        bail!(DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        )));
    }
    match token {
        Token::Null => Ok(Doc::Null),
        Token::Bool(b) => Ok(Doc::Bool(b)),
        Token::Number(text) => classify_number(text, tokenizer.position()),
        Token::String(s) => Ok(Doc::Str(arena.alloc_str(&s))),
        Token::ArrayStart => parse_array(arena, tokenizer, depth),
        Token::ObjectStart => parse_object(arena, tokenizer, depth),
        other => bail!(DocError::parse(format!(
            "unexpected token {:?} at position {}",
            other,
            tokenizer.position()
        ))),
    }
}

fn classify_number<'a>(text: &str, position: usize) -> Result<Doc<'a>> {
    let bad = || DocError::parse(format!("invalid number '{}' at position {}", text, position));

    if text.bytes().any(|b| b == b'.' || b == b'e' || b == b'E') {
        return text.parse::<f64>().map(Doc::Float).map_err(|_| bad().into());
    }
    if let Some(stripped) = text.strip_prefix('-') {
        if stripped.is_empty() {
            bail!(bad());
        }
        return match text.parse::<i64>() {
            Ok(v) => Ok(Doc::Int(v)),
            // magnitude overflow degrades to float, like every lenient reader
            Err(_) => text.parse::<f64>().map(Doc::Float).map_err(|_| bad().into()),
        };
    }
    match text.parse::<u64>() {
        Ok(v) if v <= i64::MAX as u64 => Ok(Doc::Int(v as i64)),
        Ok(v) => Ok(Doc::Uint(v)),
        Err(_) => text.parse::<f64>().map(Doc::Float).map_err(|_| bad().into()),
    }
}

fn parse_array<'a>(arena: &'a Arena, tokenizer: &mut Tokenizer<'_>, depth: usize) -> Result<Doc<'a>> {
    let mut items = bumpalo::collections::Vec::new_in(arena.bump());
    let mut expect_value = true;

    loop {
        match tokenizer.next_token()? {
            Some(Token::ArrayEnd) => {
                if expect_value && !items.is_empty() {
                    bail!(DocError::parse(format!(
                        "trailing comma in array at position {}",
                        tokenizer.position()
                    )));
                }
                return Ok(Doc::Arr(items));
            }
            Some(Token::Comma) if !expect_value => {
                expect_value = true;
            }
            Some(token) if expect_value => {
                items.push(token_to_value(arena, tokenizer, token, depth + 1)?);
                expect_value = false;
            }
            Some(token) => bail!(DocError::parse(format!(
                "expected ',' or ']' in array, got {:?} at position {}",
                token,
                tokenizer.position()
            ))),
            None => bail!(DocError::parse("unexpected end of input in array")),
        }
    }
}

fn parse_object<'a>(arena: &'a Arena, tokenizer: &mut Tokenizer<'_>, depth: usize) -> Result<Doc<'a>> {
    let mut members = bumpalo::collections::Vec::new_in(arena.bump());
    let mut expect_member = true;

    loop {
        match tokenizer.next_token()? {
            Some(Token::ObjectEnd) => {
                if expect_member && !members.is_empty() {
                    bail!(DocError::parse(format!(
                        "trailing comma in object at position {}",
                        tokenizer.position()
                    )));
                }
                return Ok(Doc::Obj(members));
            }
            Some(Token::Comma) if !expect_member => {
                expect_member = true;
            }
            Some(Token::String(key)) if expect_member => {
                match tokenizer.next_token()? {
                    Some(Token::Colon) => {}
                    other => bail!(DocError::parse(format!(
                        "expected ':' after object key, got {:?} at position {}",
                        other,
                        tokenizer.position()
                    ))),
                }
                let value = parse_value(arena, tokenizer, depth + 1)?;
                obj_upsert(&mut members, arena.alloc_str(&key), value);
                expect_member = false;
            }
            Some(other) => bail!(DocError::parse(format!(
                "expected string key or '}}', got {:?} at position {}",
                other,
                tokenizer.position()
            ))),
            None => bail!(DocError::parse("unexpected end of input in object")),
        }
    }
}

pub fn dump(doc: &Doc<'_>, sink: &mut dyn ByteSink) -> Result<()> {
    dump_value(doc, sink, 0)
}

fn dump_value(doc: &Doc<'_>, sink: &mut dyn ByteSink, depth: usize) -> Result<()> {
    if depth > MAX_DOCUMENT_DEPTH {
        bail!(DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        )));
    }
    match doc {
        Doc::Null => sink.put_slice(b"null"),
        Doc::Bool(true) => sink.put_slice(b"true"),
        Doc::Bool(false) => sink.put_slice(b"false"),
        Doc::Int(v) => sink.put_slice(v.to_string().as_bytes()),
        Doc::Uint(v) => sink.put_slice(v.to_string().as_bytes()),
        Doc::Float(v) => dump_float(*v, sink),
        Doc::Str(s) => dump_string(s, sink),
        Doc::Bin(_) => bail!(DocError::unsupported(
            "binary values cannot be represented as JSON text"
        )),
        Doc::Arr(items) => {
            sink.put(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    sink.put(b',');
                }
                dump_value(item, sink, depth + 1)?;
            }
            sink.put(b']');
        }
        Doc::Obj(members) => {
            sink.put(b'{');
            for (i, (name, value)) in members.iter().enumerate() {
                if i > 0 {
                    sink.put(b',');
                }
                dump_string(name, sink);
                sink.put(b':');
                dump_value(value, sink, depth + 1)?;
            }
            sink.put(b'}');
        }
        Doc::Discarded => bail!(DocError::parse("cannot serialize a discarded document")),
    }
    Ok(())
}

fn dump_float(v: f64, sink: &mut dyn ByteSink) {
    if !v.is_finite() {
        // JSON has no NaN/Infinity
        sink.put_slice(b"null");
        return;
    }
    let text = v.to_string();
    sink.put_slice(text.as_bytes());
    if !text.bytes().any(|b| b == b'.' || b == b'e' || b == b'E') {
        sink.put_slice(b".0");
    }
}

fn dump_string(s: &str, sink: &mut dyn ByteSink) {
    sink.put(b'"');
    for byte in s.bytes() {
        match byte {
            b'"' => sink.put_slice(b"\\\""),
            b'\\' => sink.put_slice(b"\\\\"),
            b'\n' => sink.put_slice(b"\\n"),
            b'\r' => sink.put_slice(b"\\r"),
            b'\t' => sink.put_slice(b"\\t"),
            0x08 => sink.put_slice(b"\\b"),
            0x0C => sink.put_slice(b"\\f"),
            b if b < 0x20 => {
                const HEX: &[u8; 16] = b"0123456789abcdef";
                sink.put_slice(b"\\u00");
                sink.put(HEX[(b >> 4) as usize]);
                sink.put(HEX[(b & 0x0F) as usize]);
            }
            b => sink.put(b),
        }
    }
    sink.put(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn roundtrip(text: &str) -> String {
        let arena = Arena::new();
        let doc = parse(&arena, text.as_bytes()).unwrap();
        let mut out = Vec::new();
        dump(&doc, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parse_scalars() {
        let arena = Arena::new();
        assert_eq!(parse(&arena, b"null").unwrap(), Doc::Null);
        assert_eq!(parse(&arena, b"true").unwrap(), Doc::Bool(true));
        assert_eq!(parse(&arena, b"false").unwrap(), Doc::Bool(false));
        assert_eq!(parse(&arena, b"42").unwrap(), Doc::Int(42));
        assert_eq!(parse(&arena, b"-7").unwrap(), Doc::Int(-7));
        assert_eq!(parse(&arena, b"-3.25").unwrap(), Doc::Float(-3.25));
        assert_eq!(parse(&arena, b"1e10").unwrap(), Doc::Float(1e10));
        assert_eq!(
            parse(&arena, b"18446744073709551615").unwrap(),
            Doc::Uint(u64::MAX)
        );
    }

    #[test]
    fn parse_string_escapes() {
        let arena = Arena::new();
        assert_eq!(
            parse(&arena, br#""a\nb\t\"c\"""#).unwrap(),
            Doc::Str("a\nb\t\"c\"")
        );
        assert_eq!(parse(&arena, br#""A""#).unwrap(), Doc::Str("A"));
        assert_eq!(
            parse(&arena, b"\"\xf0\x9f\x98\x80\"").unwrap(),
            Doc::Str("\u{1F600}")
        );
    }

    #[test]
    fn unpaired_surrogate_fails() {
        let arena = Arena::new();
        assert!(parse(&arena, br#""\uD83D""#).is_err());
    }

    #[test]
    fn strict_mode_rejects_trailing_garbage() {
        let arena = Arena::new();
        let err = parse(&arena, b"{} tail").unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::Parse));
        assert!(parse(&arena, b"1 2").is_err());
        assert!(parse(&arena, b"{} ").is_ok());
    }

    #[test]
    fn rejects_trailing_commas() {
        let arena = Arena::new();
        assert!(parse(&arena, b"[1,]").is_err());
        assert!(parse(&arena, br#"{"a":1,}"#).is_err());
        assert!(parse(&arena, b"[]").is_ok());
        assert!(parse(&arena, b"{}").is_ok());
    }

    #[test]
    fn rejects_comments() {
        let arena = Arena::new();
        assert!(parse(&arena, b"// c\n1").is_err());
    }

    #[test]
    fn nested_structures() {
        let arena = Arena::new();
        let doc = parse(&arena, br#"{"a":{"b":[1,2,{"c":null}]},"d":"x"}"#).unwrap();
        let b = doc.member("a").unwrap().member("b").unwrap();
        match b {
            Doc::Arr(items) => assert_eq!(items.len(), 3),
            other => panic!("expected array, got {}", other.type_name()),
        }
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let arena = Arena::new();
        let doc = parse(&arena, br#"{"k":1,"k":2}"#).unwrap();
        assert_eq!(doc.member("k"), Some(&Doc::Int(2)));
    }

    #[test]
    fn dump_is_canonical() {
        assert_eq!(roundtrip(r#"{"b":1, "a": [true, null]}"#), r#"{"a":[true,null],"b":1}"#);
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        let mut out = Vec::new();
        dump(&Doc::Float(1.0), &mut out).unwrap();
        assert_eq!(out, b"1.0");

        out.clear();
        dump(&Doc::Float(f64::NAN), &mut out).unwrap();
        assert_eq!(out, b"null");

        let arena = Arena::new();
        assert_eq!(parse(&arena, b"1.0").unwrap(), Doc::Float(1.0));
    }

    #[test]
    fn control_characters_escape() {
        let mut out = Vec::new();
        dump(&Doc::Str("a\u{1}b"), &mut out).unwrap();
        assert_eq!(out, br#""a\u0001b""#);
    }

    #[test]
    fn depth_limit_enforced() {
        let arena = Arena::new();
        let mut deep = String::new();
        for _ in 0..200 {
            deep.push('[');
        }
        for _ in 0..200 {
            deep.push(']');
        }
        assert!(parse(&arena, deep.as_bytes()).is_err());
    }

    #[test]
    fn agrees_with_serde_json() {
        let arena = Arena::new();
        let text = r#"{"n":-12,"f":2.5,"s":"é\n","a":[true,false,null],"o":{"x":18446744073709551615}}"#;
        let doc = parse(&arena, text.as_bytes()).unwrap();
        let mut out = Vec::new();
        dump(&doc, &mut out).unwrap();

        let ours: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let theirs: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(ours, theirs);
    }
}
