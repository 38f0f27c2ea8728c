//! Copying attribute values into the caller’s buffer.
//!
//! These are the building blocks for record-specific parsers. Each one
//! takes values from an entry and packs them into the arena, failing with
//! [`ParseError::ShortBuf`] if they don’t fit and with
//! [`ParseError::NotFound`] if a required value is missing.

use crate::arena::{Arena, StrArrayRef, StrRef};
use crate::conn::Entry;
use crate::parse::{ParseError, ParseResult};

/// The scheme prefix of a password in crypt format.
pub const CRYPT_PREFIX: &str = "{CRYPT}";

/// The password used when the entry has none in crypt format.
pub const NO_PASSWORD: &str = "x";

//------------ Attribute Values ----------------------------------------------

/// Copies the first value of an attribute.
pub fn assign_attr_val(
    arena: &mut Arena,
    entry: &Entry,
    attr: &str,
) -> ParseResult<StrRef> {
    let value = entry.first_value(attr).ok_or(ParseError::NotFound)?;
    Ok(arena.copy_str(value)?)
}

/// Copies all values of an attribute as a string array.
///
/// A value equal to `omit` is skipped. A missing attribute results in an
/// empty array.
pub fn assign_attr_vals(
    arena: &mut Arena,
    entry: &Entry,
    attr: &str,
    omit: Option<&str>,
) -> ParseResult<StrArrayRef> {
    Ok(arena.copy_str_array(entry.values(attr), omit)?)
}

/// Copies the password from an attribute.
///
/// The first value with the crypt prefix is used without the prefix. The
/// prefix is matched ignoring case. If there is no such value, the
/// placeholder `"x"` is used.
pub fn assign_passwd(
    arena: &mut Arena,
    entry: &Entry,
    attr: &str,
) -> ParseResult<StrRef> {
    let passwd = entry
        .values(attr)
        .iter()
        .find_map(|value| strip_crypt_prefix(value))
        .unwrap_or(NO_PASSWORD);
    Ok(arena.copy_str(passwd)?)
}

fn strip_crypt_prefix(value: &str) -> Option<&str> {
    let prefix = value.get(..CRYPT_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(CRYPT_PREFIX) {
        Some(&value[CRYPT_PREFIX.len()..])
    } else {
        None
    }
}

/// Copies the value of the naming attribute.
///
/// See [`rdn_value`].
pub fn assign_rdn_value(
    arena: &mut Arena,
    entry: &Entry,
    attr: &str,
) -> ParseResult<StrRef> {
    let value = rdn_value(entry, attr).ok_or(ParseError::NotFound)?;
    Ok(arena.copy_str(&value)?)
}

//------------ Relative Distinguished Names ----------------------------------

/// Returns the value of an attribute that names the entry.
///
/// If the first RDN of the entry’s DN contains the attribute, its value is
/// used. Otherwise the first value of the attribute is returned. This
/// picks the canonical name among several values of, say, `cn`.
pub fn rdn_value(entry: &Entry, attr: &str) -> Option<String> {
    rdn_value_of(entry.dn(), attr)
        .or_else(|| entry.first_value(attr).map(Into::into))
}

/// Returns the value of an attribute in the first RDN of a DN.
///
/// Multi-valued RDNs, e.g., `cn=foo+uid=bar`, are supported. The attribute
/// type is matched ignoring ASCII case. Escaped characters in the value
/// are unescaped.
pub fn rdn_value_of(dn: &str, attr: &str) -> Option<String> {
    let rdn = split_unescaped(dn, b',').next()?;
    split_unescaped(rdn, b'+').find_map(|ava| {
        let (kind, value) = ava.split_once('=')?;
        if kind.trim().eq_ignore_ascii_case(attr) {
            unescape(value.trim())
        } else {
            None
        }
    })
}

/// Splits a string at separators not preceded by a backslash.
fn split_unescaped(s: &str, sep: u8) -> impl Iterator<Item = &str> {
    let mut start = 0;
    let mut escaped = false;
    let mut parts = Vec::new();
    for (idx, &ch) in s.as_bytes().iter().enumerate() {
        if escaped {
            escaped = false;
        } else if ch == b'\\' {
            escaped = true;
        } else if ch == sep {
            parts.push(&s[start..idx]);
            start = idx + 1;
        }
    }
    parts.push(&s[start..]);
    parts.into_iter()
}

/// Unescapes an attribute value.
///
/// Both `\c` and the hex form `\XX` are supported. Returns `None` if the
/// result isn’t valid UTF-8.
fn unescape(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut res = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] != b'\\' {
            res.push(bytes[idx]);
            idx += 1;
            continue;
        }
        let hex = bytes
            .get(idx + 1..idx + 3)
            .and_then(|pair| std::str::from_utf8(pair).ok())
            .and_then(|pair| u8::from_str_radix(pair, 16).ok());
        match hex {
            Some(octet) => {
                res.push(octet);
                idx += 3;
            }
            None => {
                if let Some(&octet) = bytes.get(idx + 1) {
                    res.push(octet);
                }
                idx += 2;
            }
        }
    }
    String::from_utf8(res).ok()
}

//============ Testing =======================================================
