//! Enumerating all records of a map.
//!
//! The name service switch enumerates a map through a sequence of calls,
//! each producing a single record into a buffer supplied by the caller.
//! An [`Enumeration`] keeps the state between these calls: the entries
//! returned by the search, the position of the current entry, and the
//! [`ParseState`] of the parser on that entry.
//!
//! The search happens on the first call. After that, entries are handed to
//! the parser one by one. A parser may produce several records from one
//! entry, asking to be called on the same entry again via its state. If the
//! caller’s buffer is too small, the call fails without moving on, so that
//! repeating it with a larger buffer continues exactly where it left off
//! without searching again. Once all entries are used up, the retained
//! entries are dropped and the next call starts over with a new search.

use crate::conn::{Connector, Entry};
use crate::parse::{EntryParser, ParseContext, ParseError, ParseState};
use crate::resolver::{SessionReader, UidCache};
use crate::search::{self, Query, SearchSpec};
use crate::session::Session;
use crate::status::Response;
use tracing::trace;

//------------ Enumeration ---------------------------------------------------

/// The state of an enumeration.
#[derive(Clone, Debug)]
pub struct Enumeration {
    /// What to search for.
    spec: SearchSpec,

    /// The entries of the last search, if there was one.
    entries: Option<Vec<Entry>>,

    /// The index of the entry to parse next.
    pos: usize,

    /// The parser’s state on the entry at `pos`.
    state: ParseState,
}

impl Enumeration {
    /// Creates a new enumeration that hasn’t searched yet.
    pub fn new(spec: SearchSpec) -> Self {
        Enumeration {
            spec,
            entries: None,
            pos: 0,
            state: ParseState::new(),
        }
    }

    pub fn spec(&self) -> &SearchSpec {
        &self.spec
    }

    /// Returns whether the enumeration holds no search result.
    ///
    /// The next step of an empty enumeration performs a new search.
    pub fn is_empty(&self) -> bool {
        self.entries.is_none()
    }

    /// Returns the index of the entry the next step will parse.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the parser state for the current entry.
    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Drops the retained entries and starts over.
    pub fn reset(&mut self) {
        self.entries = None;
        self.pos = 0;
        self.state = ParseState::new();
    }

    /// Produces the next record.
    ///
    /// The session must be locked by the caller for the whole step.
    pub(crate) fn next<C, P>(
        &mut self,
        session: &mut Session<C>,
        uids: &UidCache,
        mut parser: P,
        buf: &mut [u8],
    ) -> Response<P::Record>
    where
        C: Connector,
        P: EntryParser,
    {
        if self.entries.is_none() {
            let query = Query::search(
                &self.spec.filter,
                self.spec.map,
                &self.spec.attrs,
            );
            match search::execute(session, &query, 0) {
                Ok(entries) => {
                    trace!(count = entries.len(), "fetched entries");
                    self.entries = Some(entries);
                    self.pos = 0;
                    self.state = ParseState::new();
                }
                Err(err) => {
                    trace!(%err, "enumeration search failed");
                    return err.into();
                }
            }
        }

        let entries = match self.entries.as_ref() {
            Some(entries) => entries,
            None => return Response::NotFound,
        };
        while let Some(entry) = entries.get(self.pos) {
            let saved = self.state.clone();
            let mut reader = SessionReader::new(session, uids);
            let mut cx = ParseContext::new(buf, &mut reader);
            match parser.parse(entry, &mut self.state, &mut cx) {
                Ok(record) => {
                    if self.state.is_finished() {
                        self.pos += 1;
                    }
                    return Response::Success(record);
                }
                Err(ParseError::NotFound) => {
                    self.state = ParseState::new();
                    self.pos += 1;
                }
                Err(ParseError::ShortBuf) => {
                    trace!(pos = self.pos, "buffer exhausted");
                    self.state = saved;
                    return Response::TryAgain;
                }
            }
        }

        trace!("enumeration exhausted");
        self.reset();
        Response::NotFound
    }
}
