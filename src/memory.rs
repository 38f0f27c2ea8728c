//! An in-memory directory.
//!
//! [`MemoryDirectory`] implements [`Connector`] on top of a list of
//! entries kept in memory. It evaluates search scopes and filters much
//! like a real server would. In addition, it counts the operations it sees
//! and can be told to refuse connections, fail binds, or fail upcoming
//! searches with specific result codes. This makes it useful for testing
//! the session and retry logic as well as record parsers without a
//! server.
//!
//! Clones of a directory share the same state, so a test can hand one
//! clone to a resolver and keep another one for inspection.
//!
//! Filters are evaluated strictly on the stored attributes. Entries
//! should therefore carry an `objectClass` attribute like they would in a
//! real directory, or reading them by DN will not find them.

use crate::conf::{Config, Credentials, Endpoint, Scope};
use crate::conn::{
    Connection, Connector, Entry, Error, RebindProc, ResultCode,
    SearchRequest, SearchResult, SessionOptions,
};
use crate::filter::Filter;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

//------------ Stats ---------------------------------------------------------

/// Operation counters of a memory directory.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Successfully established connections.
    pub connects: usize,

    /// Refused connection attempts.
    pub failed_connects: usize,

    /// Bind attempts.
    pub binds: usize,

    /// Unbinds.
    pub unbinds: usize,

    /// Search attempts, including those that failed.
    pub searches: usize,
}

//------------ MemoryDirectory -----------------------------------------------

/// A directory kept in memory.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    refused: HashSet<String>,
    options_failure: Option<ResultCode>,
    bind_failure: Option<ResultCode>,
    search_failures: VecDeque<ResultCode>,
    last_bind: Option<Credentials>,
    rebind: Option<RebindProc>,
    stats: Stats,
}

impl MemoryDirectory {
    /// Creates a new, empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    pub fn add(&self, entry: Entry) {
        self.state.lock().entries.push(entry)
    }

    /// Removes the entry with the given DN.
    pub fn remove(&self, dn: &str) {
        let dn = normalize(dn);
        self.state
            .lock()
            .entries
            .retain(|entry| normalize(entry.dn()) != dn)
    }

    /// Refuses connections to the given host.
    pub fn refuse_host(&self, host: &str) {
        self.state.lock().refused.insert(host.into());
    }

    /// Accepts connections to the given host again.
    pub fn accept_host(&self, host: &str) {
        self.state.lock().refused.remove(host);
    }

    /// Fails setting session options with the given code.
    pub fn fail_options(&self, code: Option<ResultCode>) {
        self.state.lock().options_failure = code
    }

    /// Fails all binds with the given code.
    pub fn fail_binds(&self, code: Option<ResultCode>) {
        self.state.lock().bind_failure = code
    }

    /// Fails the next searches with the given codes, one per search.
    pub fn fail_searches(&self, codes: impl IntoIterator<Item = ResultCode>) {
        self.state.lock().search_failures.extend(codes)
    }

    /// Returns the operation counters.
    pub fn stats(&self) -> Stats {
        self.state.lock().stats
    }

    /// Resets the operation counters.
    pub fn reset_stats(&self) {
        self.state.lock().stats = Stats::default()
    }

    /// Returns the credentials of the last bind.
    pub fn last_bind(&self) -> Option<Credentials> {
        self.state.lock().last_bind.clone()
    }

    /// Asks the last installed rebind procedure for credentials.
    ///
    /// This is what following a referral would do.
    pub fn rebind(&self) -> Option<Credentials> {
        let rebind = self.state.lock().rebind.clone()?;
        Some(rebind())
    }
}

impl fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryDirectory")
            .field("entries", &state.entries.len())
            .field("stats", &state.stats)
            .finish()
    }
}

//--- Connector

impl Connector for MemoryDirectory {
    type Connection = MemoryConnection;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        _conf: &Config,
    ) -> Result<Self::Connection, Error> {
        let mut state = self.state.lock();
        if state.refused.contains(&endpoint.host) {
            state.stats.failed_connects += 1;
            return Err(Error::with_message(
                ResultCode::ConnectError,
                format!("{} refused connection", endpoint),
            ));
        }
        state.stats.connects += 1;
        Ok(MemoryConnection {
            state: self.state.clone(),
            size_limit: 0,
        })
    }
}

//------------ MemoryConnection ----------------------------------------------

/// A connection to a memory directory.
pub struct MemoryConnection {
    state: Arc<Mutex<State>>,
    size_limit: usize,
}

impl Connection for MemoryConnection {
    fn set_options(&mut self, _options: &SessionOptions) -> Result<(), Error> {
        match self.state.lock().options_failure {
            Some(code) => Err(code.into()),
            None => Ok(()),
        }
    }

    fn set_rebind_proc(&mut self, rebind: RebindProc) {
        self.state.lock().rebind = Some(rebind)
    }

    fn bind(&mut self, creds: &Credentials) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.stats.binds += 1;
        state.last_bind = Some(creds.clone());
        match state.bind_failure {
            Some(code) => Err(code.into()),
            None => Ok(()),
        }
    }

    fn set_size_limit(&mut self, limit: usize) {
        self.size_limit = limit
    }

    fn search(
        &mut self,
        request: &SearchRequest<'_>,
    ) -> Result<SearchResult, Error> {
        let mut state = self.state.lock();
        state.stats.searches += 1;
        if let Some(code) = state.search_failures.pop_front() {
            return Err(code.into());
        }
        let filter = Filter::parse(request.filter).map_err(|err| {
            Error::with_message(ResultCode::FilterError, err.to_string())
        })?;
        if request.scope == Scope::Base
            && !state
                .entries
                .iter()
                .any(|entry| same_dn(entry.dn(), request.base))
        {
            return Err(ResultCode::NoSuchObject.into());
        }

        let mut entries: Vec<_> = state
            .entries
            .iter()
            .filter(|entry| in_scope(entry.dn(), request.base, request.scope))
            .filter(|entry| filter.matches(entry))
            .map(|entry| entry.select(request.attrs))
            .collect();
        if self.size_limit > 0 && entries.len() > self.size_limit {
            entries.truncate(self.size_limit);
            return Ok(SearchResult::new(
                entries,
                ResultCode::SizeLimitExceeded,
            ));
        }
        Ok(SearchResult::new(entries, ResultCode::Success))
    }

    fn unbind(self) -> Result<(), Error> {
        self.state.lock().stats.unbinds += 1;
        Ok(())
    }
}

//------------ Helper Functions ----------------------------------------------

/// Normalizes a DN for comparison.
///
/// Removes spaces around separators and lowercases everything.
fn normalize(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| {
            rdn.split('=')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("=")
        })
        .collect::<Vec<_>>()
        .join(",")
        .to_ascii_lowercase()
}

fn same_dn(left: &str, right: &str) -> bool {
    normalize(left) == normalize(right)
}

fn in_scope(dn: &str, base: &str, scope: Scope) -> bool {
    let dn = normalize(dn);
    let base = normalize(base);
    match scope {
        Scope::Base => dn == base,
        Scope::OneLevel => {
            dn.split_once(',').map(|(_, parent)| parent) == Some(base.as_str())
        }
        Scope::Subtree => {
            base.is_empty() || dn == base || dn.ends_with(&format!(",{}", base))
        }
    }
}

//============ Testing =======================================================
