//! Search filters.
//!
//! Lookups describe what they are looking for through a filter template
//! such as `(&(objectClass=posixAccount)(uid=%s))`. The placeholders are
//! filled in from typed arguments by [`build`], escaping every string so
//! that a user name can never change the structure of the filter.
//!
//! With the `memory` feature, the module also contains a small evaluator
//! for the string form of filters, `Filter`, which is used by the
//! in-memory directory.

use std::fmt::Write;
use std::{error, fmt};

/// The maximum length of a filter in octets.
pub const MAX_FILTER_LEN: usize = 1024;

//------------ Arg -----------------------------------------------------------

/// An argument for a filter template.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arg<'a> {
    /// A string filling a `%s` placeholder.
    Str(&'a str),

    /// A number filling a `%d` placeholder.
    Num(i64),
}

impl<'a> Arg<'a> {
    pub fn as_str(self) -> Option<&'a str> {
        match self {
            Arg::Str(s) => Some(s),
            Arg::Num(_) => None,
        }
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(s: &'a str) -> Self {
        Arg::Str(s)
    }
}

impl<'a> From<i64> for Arg<'a> {
    fn from(n: i64) -> Self {
        Arg::Num(n)
    }
}

impl<'a> From<u32> for Arg<'a> {
    fn from(n: u32) -> Self {
        Arg::Num(n.into())
    }
}

//------------ build ---------------------------------------------------------

/// Fills a filter template with arguments.
///
/// The template may contain `%s` for a string argument, `%d` for a number,
/// and `%%` for a literal percent sign. The arguments must match the
/// placeholders in number and kind.
pub fn build(template: &str, args: &[Arg]) -> Result<String, Error> {
    let mut res = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            res.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => res.push('%'),
            Some('s') => match args.next() {
                Some(Arg::Str(value)) => escape_into(value, &mut res),
                _ => return Err(Error::Template),
            },
            Some('d') => match args.next() {
                Some(Arg::Num(value)) => {
                    write!(res, "{}", value).map_err(|_| Error::Template)?
                }
                _ => return Err(Error::Template),
            },
            _ => return Err(Error::Template),
        }
        if res.len() > MAX_FILTER_LEN {
            return Err(Error::TooLong);
        }
    }
    if args.next().is_some() {
        return Err(Error::Template);
    }
    if res.len() > MAX_FILTER_LEN {
        return Err(Error::TooLong);
    }
    Ok(res)
}

/// Escapes a string for use as a filter value.
pub fn escape(value: &str) -> String {
    let mut res = String::with_capacity(value.len());
    escape_into(value, &mut res);
    res
}

fn escape_into(value: &str, target: &mut String) {
    for ch in value.chars() {
        match ch {
            '*' => target.push_str("\\2a"),
            '(' => target.push_str("\\28"),
            ')' => target.push_str("\\29"),
            '\\' => target.push_str("\\5c"),
            '\0' => target.push_str("\\00"),
            ch => target.push(ch),
        }
    }
}

/// Combines a filter with an additional filter.
///
/// The additional filter may be given without enclosing parentheses.
pub fn and(filter: &str, extra: &str) -> String {
    if extra.starts_with('(') {
        format!("(&{}{})", filter, extra)
    } else {
        format!("(&{}({}))", filter, extra)
    }
}

//------------ Filter --------------------------------------------------------

/// A parsed search filter.
#[cfg(any(test, feature = "memory"))]
#[cfg_attr(docsrs, doc(cfg(feature = "memory")))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Present(String),
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
}

#[cfg(any(test, feature = "memory"))]
impl Filter {
    /// Parses the string form of a filter.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let mut parser = Parser {
            src: s.as_bytes(),
            pos: 0,
        };
        let res = parser.filter()?;
        if parser.pos != parser.src.len() {
            return Err(Error::Syntax);
        }
        Ok(res)
    }

    /// Returns whether the attributes of an entry match the filter.
    ///
    /// Values are compared ignoring ASCII case. Ordering comparisons are
    /// numeric if both sides are numbers.
    pub fn matches(&self, entry: &crate::conn::Entry) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|item| item.matches(entry)),
            Filter::Or(items) => items.iter().any(|item| item.matches(entry)),
            Filter::Not(item) => !item.matches(entry),
            Filter::Equal(attr, value) => entry
                .values(attr)
                .iter()
                .any(|item| item.eq_ignore_ascii_case(value)),
            Filter::Present(attr) => entry.has_attr(attr),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => entry.values(attr).iter().any(|item| {
                substring_match(item, initial.as_deref(), any, last.as_deref())
            }),
            Filter::GreaterOrEqual(attr, value) => {
                entry.values(attr).iter().any(|item| {
                    compare(item, value) != std::cmp::Ordering::Less
                })
            }
            Filter::LessOrEqual(attr, value) => {
                entry.values(attr).iter().any(|item| {
                    compare(item, value) != std::cmp::Ordering::Greater
                })
            }
        }
    }
}

#[cfg(any(test, feature = "memory"))]
fn substring_match(
    value: &str,
    initial: Option<&str>,
    any: &[String],
    last: Option<&str>,
) -> bool {
    let value = value.to_ascii_lowercase();
    let mut rest = value.as_str();
    if let Some(initial) = initial {
        match rest.strip_prefix(initial.to_ascii_lowercase().as_str()) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }
    for part in any {
        let part = part.to_ascii_lowercase();
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(last.to_ascii_lowercase().as_str()),
        None => true,
    }
}

#[cfg(any(test, feature = "memory"))]
fn compare(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.to_ascii_lowercase().cmp(&right.to_ascii_lowercase()),
    }
}

//------------ Parser --------------------------------------------------------

#[cfg(any(test, feature = "memory"))]
struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

#[cfg(any(test, feature = "memory"))]
impl<'a> Parser<'a> {
    fn filter(&mut self) -> Result<Filter, Error> {
        self.expect(b'(')?;
        let res = match self.peek()? {
            b'&' => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            b'|' => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            b'!' => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.expect(b')')?;
        Ok(res)
    }

    fn list(&mut self) -> Result<Vec<Filter>, Error> {
        let mut res = Vec::new();
        while self.peek()? == b'(' {
            res.push(self.filter()?);
        }
        Ok(res)
    }

    fn item(&mut self) -> Result<Filter, Error> {
        let start = self.pos;
        while !matches!(self.peek()?, b'=' | b'>' | b'<' | b'~') {
            self.pos += 1;
        }
        let attr = self.text(start, self.pos)?;
        if attr.is_empty() {
            return Err(Error::Syntax);
        }
        let op = self.src[self.pos];
        self.pos += 1;
        if op != b'=' {
            self.expect(b'=')?;
        }
        let start = self.pos;
        while self.peek()? != b')' {
            self.pos += 1;
        }
        let raw = self.text(start, self.pos)?;
        match op {
            b'>' => Ok(Filter::GreaterOrEqual(attr, unescape(&raw)?)),
            b'<' => Ok(Filter::LessOrEqual(attr, unescape(&raw)?)),
            // Approximate matching is treated as equality.
            b'~' => Ok(Filter::Equal(attr, unescape(&raw)?)),
            _ if raw == "*" => Ok(Filter::Present(attr)),
            _ if raw.contains('*') => {
                let mut parts = raw.split('*').collect::<Vec<_>>();
                let last = parts.pop().unwrap_or_default();
                let initial = parts.remove(0);
                Ok(Filter::Substring {
                    attr,
                    initial: non_empty(initial)?,
                    any: parts
                        .into_iter()
                        .filter(|part| !part.is_empty())
                        .map(unescape)
                        .collect::<Result<_, _>>()?,
                    last: non_empty(last)?,
                })
            }
            _ => Ok(Filter::Equal(attr, unescape(&raw)?)),
        }
    }

    fn peek(&self) -> Result<u8, Error> {
        self.src.get(self.pos).copied().ok_or(Error::Syntax)
    }

    fn expect(&mut self, ch: u8) -> Result<(), Error> {
        if self.peek()? != ch {
            return Err(Error::Syntax);
        }
        self.pos += 1;
        Ok(())
    }

    fn text(&self, start: usize, end: usize) -> Result<String, Error> {
        std::str::from_utf8(&self.src[start..end])
            .map(Into::into)
            .map_err(|_| Error::Syntax)
    }
}

#[cfg(any(test, feature = "memory"))]
fn non_empty(part: &str) -> Result<Option<String>, Error> {
    if part.is_empty() {
        Ok(None)
    } else {
        unescape(part).map(Some)
    }
}

/// Resolves the `\XX` escapes of a filter value.
#[cfg(any(test, feature = "memory"))]
fn unescape(value: &str) -> Result<String, Error> {
    let bytes = value.as_bytes();
    let mut res = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            let pair = bytes.get(idx + 1..idx + 3).ok_or(Error::Syntax)?;
            let pair = std::str::from_utf8(pair).map_err(|_| Error::Syntax)?;
            res.push(u8::from_str_radix(pair, 16).map_err(|_| Error::Syntax)?);
            idx += 3;
        } else {
            res.push(bytes[idx]);
            idx += 1;
        }
    }
    String::from_utf8(res).map_err(|_| Error::Syntax)
}

//------------ Error ---------------------------------------------------------

/// A filter could not be built or parsed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The arguments don’t match the template’s placeholders.
    Template,

    /// The filter is longer than [`MAX_FILTER_LEN`].
    TooLong,

    /// The filter is malformed.
    Syntax,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template => f.write_str("filter arguments don't match"),
            Error::TooLong => f.write_str("filter too long"),
            Error::Syntax => f.write_str("malformed filter"),
        }
    }
}

impl error::Error for Error {}

//============ Testing =======================================================
