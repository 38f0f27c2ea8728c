//! Executing searches with a bounded retry.
//!
//! A single logical search goes through [`execute`]. It opens the session
//! if necessary, issues the search, and sorts the outcome into entries or
//! a [`LookupError`]. If the connection turns out to be broken, the
//! session is closed, reopened, and the search is retried exactly once.

use crate::conf::{Map, Scope};
use crate::conn::{Connection, Connector, Entry, ResultCode, SearchRequest};
use crate::filter;
use crate::session::Session;
use crate::status::LookupError;
use tracing::{debug, trace};

/// The filter used for reading a single entry.
const READ_FILTER: &str = "(objectClass=*)";

//------------ SearchSpec ----------------------------------------------------

/// What a lookup or enumeration searches for.
///
/// The filter is a template with `%s` and `%d` placeholders that a keyed
/// lookup fills in from its arguments. Enumerations use it as is.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchSpec {
    /// The filter template.
    pub filter: String,

    /// The attributes to request. Empty requests all of them.
    pub attrs: Vec<String>,

    /// The map whose search descriptor applies.
    pub map: Option<Map>,
}

impl SearchSpec {
    pub fn new<S: Into<String>>(
        filter: impl Into<String>,
        attrs: impl IntoIterator<Item = S>,
        map: Option<Map>,
    ) -> Self {
        SearchSpec {
            filter: filter.into(),
            attrs: attrs.into_iter().map(Into::into).collect(),
            map,
        }
    }
}

//------------ Query ---------------------------------------------------------

/// A single search to execute.
#[derive(Clone, Copy, Debug)]
pub struct Query<'a> {
    target: Target<'a>,
    attrs: &'a [String],
}

#[derive(Clone, Copy, Debug)]
enum Target<'a> {
    /// Read the entry with this DN.
    Read { dn: &'a str },

    /// Search below the configured base.
    Search { filter: &'a str, map: Option<Map> },
}

impl<'a> Query<'a> {
    /// Creates a query reading a single entry.
    pub fn read(dn: &'a str, attrs: &'a [String]) -> Self {
        Query {
            target: Target::Read { dn },
            attrs,
        }
    }

    /// Creates a query searching with a complete filter.
    pub fn search(
        filter: &'a str,
        map: Option<Map>,
        attrs: &'a [String],
    ) -> Self {
        Query {
            target: Target::Search { filter, map },
            attrs,
        }
    }
}

//------------ execute -------------------------------------------------------

/// Where we are in the retry cycle of a single search.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Attempt {
    First,
    Retried,
}

/// Executes a query on the session.
///
/// A `size_limit` of zero means no limit. Hitting the limit isn’t an
/// error, the entries received until then are returned. An empty result
/// is reported as [`LookupError::NotFound`].
pub fn execute<C: Connector>(
    session: &mut Session<C>,
    query: &Query,
    size_limit: usize,
) -> Result<Vec<Entry>, LookupError> {
    let mut attempt = Attempt::First;
    loop {
        if let Err(err) = session.ensure_open() {
            debug!(%err, "cannot open directory session");
            return Err(LookupError::Unavailable);
        }
        let (conn, conf) =
            session.active_mut().ok_or(LookupError::Unavailable)?;
        conn.set_size_limit(size_limit);

        let res = match query.target {
            Target::Read { dn } => conn.search(&SearchRequest {
                base: dn,
                scope: Scope::Base,
                filter: READ_FILTER,
                attrs: query.attrs,
            }),
            Target::Search { filter, map } => {
                let combined;
                let extra = conf
                    .descriptor(map)
                    .and_then(|desc| desc.filter.as_deref());
                let filter = match extra {
                    Some(extra) => {
                        combined = filter::and(filter, extra);
                        combined.as_str()
                    }
                    None => filter,
                };
                conn.search(&SearchRequest {
                    base: conf.search_base(map),
                    scope: conf.search_scope(map),
                    filter,
                    attrs: query.attrs,
                })
            }
        };

        let err = match res {
            Ok(res) => {
                if res.is_truncated() {
                    trace!(
                        entries = res.entries.len(),
                        "search result truncated"
                    );
                }
                if res.entries.is_empty() {
                    return Err(LookupError::NotFound);
                }
                return Ok(res.entries);
            }
            Err(err) => err,
        };
        if !err.is_transient() {
            trace!(%err, "search failed");
            return Err(classify(err.code()));
        }

        session.force_close();
        match attempt {
            Attempt::First => {
                debug!(%err, "search failed, reconnecting");
                attempt = Attempt::Retried;
            }
            Attempt::Retried => {
                debug!(%err, "search failed again, giving up");
                return Err(LookupError::Unavailable);
            }
        }
    }
}

/// Decides what a non-transient failure means for the caller.
fn classify(code: ResultCode) -> LookupError {
    match code {
        ResultCode::InvalidCredentials
        | ResultCode::InsufficientAccess
        | ResultCode::UnwillingToPerform
        | ResultCode::OperationsError
        | ResultCode::ProtocolError => LookupError::Unavailable,
        _ => LookupError::NotFound,
    }
}

//============ Testing =======================================================
