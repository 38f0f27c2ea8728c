//! Turning directory entries into records.
//!
//! Record-specific parsers implement [`EntryParser`]. They receive an
//! entry, the resumption state of the current enumeration or lookup, and a
//! [`ParseContext`] giving access to the arena over the caller’s buffer.
//!
//! A parser can do one of three things. It can produce a record, in which
//! case it also decides via the [`ParseState`] whether the next call should
//! move on to the next entry or come back to the same one. It can decline
//! the entry with [`ParseError::NotFound`]. Or it can run out of buffer
//! space with [`ParseError::ShortBuf`], in which case the caller retries
//! the very same step with a larger buffer.

use crate::arena::Arena;
use crate::assemble::rdn_value_of;
use crate::conn::Entry;
use core::marker::PhantomData;
use octseq::builder::ShortBuf;
use std::{error, fmt};

//------------ ParseState ----------------------------------------------------

/// Resumption state carried between parser invocations.
///
/// The index marks how far the parser got through a multi-valued attribute
/// of the current entry. No index means the parser is done with the entry
/// and the next step moves on.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParseState {
    index: Option<usize>,
    key: Option<String>,
}

impl ParseState {
    /// Creates a state that starts at the next entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state carrying the key of a lookup.
    pub fn with_key(key: impl Into<String>) -> Self {
        ParseState {
            index: None,
            key: Some(key.into()),
        }
    }

    /// Returns the sub-value index to continue from, if any.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Asks to be called again on the same entry starting at `index`.
    pub fn resume_at(&mut self, index: usize) {
        self.index = Some(index)
    }

    /// Marks the current entry as done.
    pub fn finish(&mut self) {
        self.index = None
    }

    /// Returns whether the next step moves on to the next entry.
    pub fn is_finished(&self) -> bool {
        self.index.is_none()
    }

    /// Returns the lookup key, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

//------------ DnReader ------------------------------------------------------

/// Something that can map the DN of a user entry to the user’s name.
pub trait DnReader {
    /// Returns the `uid` of the entry with the given DN.
    fn read_uid(&mut self, dn: &str) -> Option<String>;
}

//------------ ParseContext --------------------------------------------------

/// What a parser gets to work with besides the entry.
pub struct ParseContext<'a, 'buf> {
    arena: Arena<'buf>,
    reader: Option<&'a mut dyn DnReader>,
}

impl<'a, 'buf> ParseContext<'a, 'buf> {
    /// Creates a context over the given buffer.
    pub fn new(buf: &'buf mut [u8], reader: &'a mut dyn DnReader) -> Self {
        ParseContext {
            arena: Arena::new(buf),
            reader: Some(reader),
        }
    }

    /// Creates a context that cannot go back to the directory.
    pub fn detached(buf: &'buf mut [u8]) -> Self {
        ParseContext {
            arena: Arena::new(buf),
            reader: None,
        }
    }

    pub fn arena(&mut self) -> &mut Arena<'buf> {
        &mut self.arena
    }

    /// Returns the user name for the DN of a user entry.
    ///
    /// If the DN is named by its `uid`, that value is used directly.
    /// Otherwise the entry is read from the directory, unless the context
    /// is detached.
    pub fn dn_to_uid(&mut self, dn: &str) -> Option<String> {
        if let Some(uid) = rdn_value_of(dn, "uid") {
            return Some(uid);
        }
        self.reader.as_mut()?.read_uid(dn)
    }
}

//------------ EntryParser ---------------------------------------------------

/// A record-specific parser.
pub trait EntryParser {
    /// The record produced.
    type Record;

    /// Parses an entry into a record.
    fn parse(
        &mut self,
        entry: &Entry,
        state: &mut ParseState,
        cx: &mut ParseContext<'_, '_>,
    ) -> ParseResult<Self::Record>;
}

impl<'p, P: EntryParser + ?Sized> EntryParser for &'p mut P {
    type Record = P::Record;

    fn parse(
        &mut self,
        entry: &Entry,
        state: &mut ParseState,
        cx: &mut ParseContext<'_, '_>,
    ) -> ParseResult<Self::Record> {
        (**self).parse(entry, state, cx)
    }
}

//------------ FnParser ------------------------------------------------------

/// A parser wrapping a closure.
///
/// Use [`parser_fn`] to create one.
pub struct FnParser<F, R> {
    op: F,
    marker: PhantomData<fn() -> R>,
}

/// Turns a closure into an [`EntryParser`].
pub fn parser_fn<F, R>(op: F) -> FnParser<F, R>
where
    F: FnMut(
        &Entry,
        &mut ParseState,
        &mut ParseContext<'_, '_>,
    ) -> ParseResult<R>,
{
    FnParser {
        op,
        marker: PhantomData,
    }
}

impl<F, R> EntryParser for FnParser<F, R>
where
    F: FnMut(
        &Entry,
        &mut ParseState,
        &mut ParseContext<'_, '_>,
    ) -> ParseResult<R>,
{
    type Record = R;

    fn parse(
        &mut self,
        entry: &Entry,
        state: &mut ParseState,
        cx: &mut ParseContext<'_, '_>,
    ) -> ParseResult<R> {
        (self.op)(entry, state, cx)
    }
}

//------------ ParseError ----------------------------------------------------

/// A parser did not produce a record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ParseError {
    /// The entry is not a match or lacks a required attribute.
    NotFound,

    /// The caller’s buffer is too small.
    ShortBuf,
}

pub type ParseResult<T> = Result<T, ParseError>;

impl From<ShortBuf> for ParseError {
    fn from(_: ShortBuf) -> Self {
        ParseError::ShortBuf
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::NotFound => f.write_str("entry not usable"),
            ParseError::ShortBuf => ShortBuf.fmt(f),
        }
    }
}

impl error::Error for ParseError {}

//============ Testing =======================================================
