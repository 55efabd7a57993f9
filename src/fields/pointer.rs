//! RFC 6901 JSON Pointers and field selectors.
//!
//! Pointer tokens are unescaped at compile time (`~1` -> `/`, `~0` -> `~`,
//! in that order) and kept in a small inline vector; unescaped tokens
//! borrow the selector string. Array tokens are strict RFC 6901: decimal
//! digits with no leading zero, or the past-the-end marker `-`, which is
//! addressable only on the write path.

use std::borrow::Cow;

use eyre::{bail, Result};
use smallvec::SmallVec;

use crate::config::POINTER_INLINE_TOKENS;
use crate::error::DocError;
use crate::types::Doc;

pub(crate) type Tokens<'f> = SmallVec<[Cow<'f, str>; POINTER_INLINE_TOKENS]>;

/// A compiled JSON Pointer.
#[derive(Debug, Clone)]
pub struct JsonPointer<'f> {
    tokens: Tokens<'f>,
}

impl<'f> JsonPointer<'f> {
    /// Compiles pointer text. The empty pointer is valid and addresses the
    /// whole document; callers that treat it specially do so before this.
    pub fn parse(text: &'f str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self {
                tokens: SmallVec::new(),
            });
        }
        if !text.starts_with('/') {
            bail!(DocError::argument(format!(
                "JSON Pointer must start with '/': {:?}",
                text
            )));
        }
        let mut tokens = SmallVec::new();
        for raw in text.split('/').skip(1) {
            tokens.push(unescape_token(raw)?);
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[Cow<'f, str>] {
        &self.tokens
    }
}

fn unescape_token(raw: &str) -> Result<Cow<'_, str>> {
    if !raw.contains('~') {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            other => bail!(DocError::argument(format!(
                "invalid escape '~{}' in JSON Pointer token {:?}",
                other.map(String::from).unwrap_or_default(),
                raw
            ))),
        }
    }
    Ok(Cow::Owned(out))
}

/// What one entry of a batched call addresses inside its document.
#[derive(Debug, Clone)]
pub enum FieldSelector<'f> {
    Whole,
    Member(&'f str),
    Pointer(JsonPointer<'f>),
}

impl<'f> FieldSelector<'f> {
    pub fn parse(field: Option<&'f str>) -> Result<Self> {
        match field {
            None | Some("") => Ok(FieldSelector::Whole),
            Some(text) if text.starts_with('/') => {
                Ok(FieldSelector::Pointer(JsonPointer::parse(text)?))
            }
            Some(name) => Ok(FieldSelector::Member(name)),
        }
    }

    pub fn is_whole(&self) -> bool {
        matches!(self, FieldSelector::Whole)
    }
}

/// Resolves a selector to a borrowed subtree; `None` means absent.
pub fn lookup<'d, 'a>(doc: &'d Doc<'a>, selector: &FieldSelector<'_>) -> Option<&'d Doc<'a>> {
    match selector {
        FieldSelector::Whole => Some(doc),
        FieldSelector::Member(name) => doc.member(name),
        FieldSelector::Pointer(ptr) => {
            let mut current = doc;
            for token in ptr.tokens() {
                current = step(current, token)?;
            }
            Some(current)
        }
    }
}

pub fn lookup_mut<'d, 'a>(
    doc: &'d mut Doc<'a>,
    selector: &FieldSelector<'_>,
) -> Option<&'d mut Doc<'a>> {
    match selector {
        FieldSelector::Whole => Some(doc),
        FieldSelector::Member(name) => doc.member_mut(name),
        FieldSelector::Pointer(ptr) => {
            let mut current = doc;
            for token in ptr.tokens() {
                current = step_mut(current, token)?;
            }
            Some(current)
        }
    }
}

fn step<'d, 'a>(doc: &'d Doc<'a>, token: &str) -> Option<&'d Doc<'a>> {
    match doc {
        Doc::Obj(_) => doc.member(token),
        Doc::Arr(items) => array_index(token, items.len()).map(|i| &items[i]),
        _ => None,
    }
}

fn step_mut<'d, 'a>(doc: &'d mut Doc<'a>, token: &str) -> Option<&'d mut Doc<'a>> {
    match doc {
        Doc::Obj(_) => doc.member_mut(token),
        Doc::Arr(items) => {
            let index = array_index(token, items.len())?;
            Some(&mut items[index])
        }
        _ => None,
    }
}

/// RFC 6901 array index for reads: strict decimal, no leading zeros, must
/// be in bounds. `-` is past-the-end and therefore absent here.
pub(crate) fn array_index(token: &str, len: usize) -> Option<usize> {
    parse_index(token).filter(|i| *i < len)
}

pub(crate) fn parse_index(token: &str) -> Option<usize> {
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json;
    use crate::memory::Arena;

    fn get<'d, 'a>(doc: &'d Doc<'a>, field: &'static str) -> Option<&'d Doc<'a>> {
        lookup(doc, &FieldSelector::parse(Some(field)).unwrap())
    }

    #[test]
    fn selector_classification() {
        assert!(matches!(
            FieldSelector::parse(None).unwrap(),
            FieldSelector::Whole
        ));
        assert!(matches!(
            FieldSelector::parse(Some("")).unwrap(),
            FieldSelector::Whole
        ));
        assert!(matches!(
            FieldSelector::parse(Some("name")).unwrap(),
            FieldSelector::Member("name")
        ));
        assert!(matches!(
            FieldSelector::parse(Some("/a/b")).unwrap(),
            FieldSelector::Pointer(_)
        ));
    }

    #[test]
    fn rfc6901_examples() {
        let arena = Arena::new();
        let doc = json::parse(
            &arena,
            br#"{"foo":["bar","baz"],"":0,"a/b":1,"c%d":2,"e^f":3,"g|h":4,"k\"l":6," ":7,"m~n":8}"#,
        )
        .unwrap();

        assert_eq!(get(&doc, "/foo/0"), Some(&Doc::Str("bar")));
        assert_eq!(get(&doc, "/"), Some(&Doc::Int(0)));
        assert_eq!(get(&doc, "/a~1b"), Some(&Doc::Int(1)));
        assert_eq!(get(&doc, "/c%d"), Some(&Doc::Int(2)));
        assert_eq!(get(&doc, "/e^f"), Some(&Doc::Int(3)));
        assert_eq!(get(&doc, "/g|h"), Some(&Doc::Int(4)));
        assert_eq!(get(&doc, "/ "), Some(&Doc::Int(7)));
        assert_eq!(get(&doc, "/m~0n"), Some(&Doc::Int(8)));
    }

    #[test]
    fn array_index_rules() {
        assert_eq!(parse_index("0"), Some(0));
        assert_eq!(parse_index("10"), Some(10));
        assert_eq!(parse_index("01"), None);
        assert_eq!(parse_index(""), None);
        assert_eq!(parse_index("3a"), None);
        assert_eq!(parse_index("-"), None);
    }

    #[test]
    fn absent_paths_are_none() {
        let arena = Arena::new();
        let doc = json::parse(&arena, br#"{"a":{"b":[1]}}"#).unwrap();
        assert_eq!(get(&doc, "/a/x"), None);
        assert_eq!(get(&doc, "/a/b/1"), None);
        assert_eq!(get(&doc, "/a/b/-"), None);
        assert_eq!(get(&doc, "/a/b/0/deep"), None);
    }

    #[test]
    fn malformed_escape_is_argument_error() {
        use crate::error::{DocError, ErrorKind};
        let err = JsonPointer::parse("/a~2b").unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::ArgumentInvalid));
    }

    #[test]
    fn member_selector_only_hits_root() {
        let arena = Arena::new();
        let doc = json::parse(&arena, br#"{"x":{"y":1}}"#).unwrap();
        assert!(get(&doc, "x").is_some());
        assert_eq!(get(&doc, "y"), None);
    }
}
