//! A connector using the `ldap3` crate.
//!
//! This module is only available if the `ldap3` feature is enabled. It
//! provides [`LdapConnector`], which establishes synchronous connections
//! through [`ldap3::LdapConn`].
//!
//! The `ldap3` crate doesn’t follow referrals. The rebind procedure is
//! kept with the connection but never called.

use crate::conf::{Config, Credentials, Deref, Endpoint, Scope, TlsMode};
use crate::conn::{
    Connection, Connector, Entry, Error, RebindProc, ResultCode,
    SearchRequest, SearchResult, SessionOptions,
};
use ldap3::{
    DerefAliases, LdapConn, LdapConnSettings, LdapError, SearchEntry,
    SearchOptions,
};
use std::time::Duration;
use tracing::{debug, trace};

//------------ LdapConnector -------------------------------------------------

/// Connects to directory servers via `ldap3`.
#[derive(Clone, Debug, Default)]
pub struct LdapConnector;

impl LdapConnector {
    pub fn new() -> Self {
        LdapConnector
    }
}

impl Connector for LdapConnector {
    type Connection = LdapConnection;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        conf: &Config,
    ) -> Result<Self::Connection, Error> {
        let url = endpoint.url(conf.tls, conf.port_for(endpoint));
        trace!(%url, "connecting");
        let settings = LdapConnSettings::new()
            .set_conn_timeout(conf.bind_time_limit)
            .set_starttls(conf.tls == TlsMode::StartTls);
        let conn = LdapConn::with_settings(settings, &url)
            .map_err(|err| map_error(err, ResultCode::ConnectError))?;
        Ok(LdapConnection {
            conn,
            options: SessionOptions::from_conf(conf),
            size_limit: 0,
            rebind: None,
        })
    }
}

//------------ LdapConnection ------------------------------------------------

/// A connection established via `ldap3`.
pub struct LdapConnection {
    conn: LdapConn,
    options: SessionOptions,
    size_limit: usize,
    rebind: Option<RebindProc>,
}

impl LdapConnection {
    /// Returns the installed rebind procedure.
    pub fn rebind_proc(&self) -> Option<&RebindProc> {
        self.rebind.as_ref()
    }

    fn search_options(&self) -> SearchOptions {
        let deref = match self.options.deref {
            Deref::Never => DerefAliases::Never,
            Deref::Searching => DerefAliases::Searching,
            Deref::Finding => DerefAliases::Finding,
            Deref::Always => DerefAliases::Always,
        };
        let time_limit = self
            .options
            .time_limit
            .map(secs_to_i32)
            .unwrap_or(0);
        SearchOptions::new()
            .deref(deref)
            .sizelimit(size_to_i32(self.size_limit))
            .timelimit(time_limit)
    }
}

impl Connection for LdapConnection {
    fn set_options(&mut self, options: &SessionOptions) -> Result<(), Error> {
        if options.version != 3 {
            // The crate only speaks version 3.
            debug!(version = options.version, "using protocol version 3");
        }
        self.options = options.clone();
        Ok(())
    }

    fn set_rebind_proc(&mut self, rebind: RebindProc) {
        self.rebind = Some(rebind)
    }

    fn bind(&mut self, creds: &Credentials) -> Result<(), Error> {
        let res = self
            .conn
            .simple_bind(
                creds.dn().unwrap_or_default(),
                creds.password().unwrap_or_default(),
            )
            .map_err(|err| map_error(err, ResultCode::ServerDown))?;
        match ResultCode::from_int(res.rc) {
            ResultCode::Success => Ok(()),
            code => Err(Error::with_message(code, res.text)),
        }
    }

    fn set_size_limit(&mut self, limit: usize) {
        self.size_limit = limit
    }

    fn search(
        &mut self,
        request: &SearchRequest<'_>,
    ) -> Result<SearchResult, Error> {
        let scope = match request.scope {
            Scope::Base => ldap3::Scope::Base,
            Scope::OneLevel => ldap3::Scope::OneLevel,
            Scope::Subtree => ldap3::Scope::Subtree,
        };
        let options = self.search_options();
        let ldap3::SearchResult(entries, res) = self
            .conn
            .with_search_options(options)
            .search(request.base, scope, request.filter, request.attrs.to_vec())
            .map_err(|err| map_error(err, ResultCode::ServerDown))?;
        let code = ResultCode::from_int(res.rc);
        if !code.is_success() {
            return Err(Error::with_message(code, res.text));
        }
        let entries = entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                let mut res = Entry::new(entry.dn);
                for (name, values) in entry.attrs {
                    for value in values {
                        res.push_value(&name, value);
                    }
                }
                res
            })
            .collect();
        Ok(SearchResult::new(entries, code))
    }

    fn unbind(mut self) -> Result<(), Error> {
        self.conn
            .unbind()
            .map_err(|err| map_error(err, ResultCode::ServerDown))
    }
}

//------------ Helper Functions ----------------------------------------------

/// Converts an `ldap3` error.
///
/// Errors carrying a protocol result keep its code. Everything else is a
/// problem with the connection and gets `fallback`.
fn map_error(err: LdapError, fallback: ResultCode) -> Error {
    match err {
        LdapError::LdapResult { result } => {
            Error::with_message(ResultCode::from_int(result.rc), result.text)
        }
        err => Error::with_message(fallback, err.to_string()),
    }
}

fn secs_to_i32(limit: Duration) -> i32 {
    i32::try_from(limit.as_secs()).unwrap_or(i32::MAX)
}

fn size_to_i32(limit: usize) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

//============ Testing =======================================================
