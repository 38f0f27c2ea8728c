//! The directory client capability.
//!
//! This crate doesn’t speak the directory protocol itself. Instead, the
//! session manager is handed a [`Connector`] that establishes connections
//! to a directory server. Each connection implements [`Connection`], a
//! small synchronous interface covering exactly the operations the name
//! service needs: setting options, binding, searching, and unbinding.
//!
//! Search results come back as a list of [`Entry`] values, each a DN plus
//! a set of multi-valued attributes. Failures carry the protocol’s
//! [`ResultCode`] which the search executor uses to decide whether a retry
//! makes sense.

use crate::conf::{Config, Credentials, Deref, Endpoint, Scope};
use std::sync::Arc;
use std::time::Duration;
use std::{error, fmt};

//------------ Entry ---------------------------------------------------------

/// A directory entry.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Entry {
    dn: String,
    attrs: Vec<(String, Vec<String>)>,
}

impl Entry {
    /// Creates a new entry without attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Entry {
            dn: dn.into(),
            attrs: Vec::new(),
        }
    }

    /// Adds an attribute with the given values.
    ///
    /// If the attribute already exists, the values are appended.
    pub fn with_attr<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.push_value(name, value);
        }
        self
    }

    /// Appends a value to an attribute, creating the attribute if needed.
    pub fn push_value(&mut self, name: &str, value: impl Into<String>) {
        match self.attr_idx(name) {
            Some(idx) => self.attrs[idx].1.push(value.into()),
            None => self.attrs.push((name.into(), vec![value.into()])),
        }
    }

    /// Returns the distinguished name of the entry.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Returns the values of an attribute.
    ///
    /// Attribute names are compared ignoring ASCII case. A missing attribute
    /// has no values.
    pub fn values(&self, name: &str) -> &[String] {
        match self.attr_idx(name) {
            Some(idx) => &self.attrs[idx].1,
            None => &[],
        }
    }

    /// Returns the first value of an attribute.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Returns whether the entry has the attribute.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attr_idx(name).is_some()
    }

    /// Returns an iterator over the attribute names and their values.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attrs
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Returns a copy restricted to the given attributes.
    ///
    /// An empty list keeps all attributes.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Self {
        if names.is_empty() {
            return self.clone();
        }
        Entry {
            dn: self.dn.clone(),
            attrs: self
                .attrs
                .iter()
                .filter(|(name, _)| {
                    names
                        .iter()
                        .any(|item| item.as_ref().eq_ignore_ascii_case(name))
                })
                .cloned()
                .collect(),
        }
    }

    fn attr_idx(&self, name: &str) -> Option<usize> {
        self.attrs
            .iter()
            .position(|(item, _)| item.eq_ignore_ascii_case(name))
    }
}

//------------ ResultCode ----------------------------------------------------

/// A directory protocol result code.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    NoSuchObject,
    InvalidCredentials,
    InsufficientAccess,
    Busy,
    Unavailable,
    UnwillingToPerform,

    /// The client lost or could not reach the server.
    ServerDown,

    /// The client gave up waiting for the server.
    Timeout,

    /// The client rejected a search filter.
    FilterError,

    /// The client could not connect to the server.
    ConnectError,

    /// Any other code.
    Other(u32),
}

impl ResultCode {
    pub fn from_int(value: u32) -> Self {
        match value {
            0 => ResultCode::Success,
            1 => ResultCode::OperationsError,
            2 => ResultCode::ProtocolError,
            3 => ResultCode::TimeLimitExceeded,
            4 => ResultCode::SizeLimitExceeded,
            32 => ResultCode::NoSuchObject,
            49 => ResultCode::InvalidCredentials,
            50 => ResultCode::InsufficientAccess,
            51 => ResultCode::Busy,
            52 => ResultCode::Unavailable,
            53 => ResultCode::UnwillingToPerform,
            81 => ResultCode::ServerDown,
            85 => ResultCode::Timeout,
            87 => ResultCode::FilterError,
            91 => ResultCode::ConnectError,
            other => ResultCode::Other(other),
        }
    }

    pub fn to_int(self) -> u32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::OperationsError => 1,
            ResultCode::ProtocolError => 2,
            ResultCode::TimeLimitExceeded => 3,
            ResultCode::SizeLimitExceeded => 4,
            ResultCode::NoSuchObject => 32,
            ResultCode::InvalidCredentials => 49,
            ResultCode::InsufficientAccess => 50,
            ResultCode::Busy => 51,
            ResultCode::Unavailable => 52,
            ResultCode::UnwillingToPerform => 53,
            ResultCode::ServerDown => 81,
            ResultCode::Timeout => 85,
            ResultCode::FilterError => 87,
            ResultCode::ConnectError => 91,
            ResultCode::Other(other) => other,
        }
    }

    /// Returns whether a search with this code produced usable results.
    ///
    /// Hitting a size or time limit still returns the entries found so far.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            ResultCode::Success
                | ResultCode::SizeLimitExceeded
                | ResultCode::TimeLimitExceeded
        )
    }

    /// Returns whether the code indicates a connectivity problem.
    ///
    /// These are the failures where reconnecting may help.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ResultCode::ServerDown
                | ResultCode::Timeout
                | ResultCode::Unavailable
                | ResultCode::Busy
                | ResultCode::ConnectError
        )
    }
}

impl From<u32> for ResultCode {
    fn from(value: u32) -> Self {
        ResultCode::from_int(value)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResultCode::Success => f.write_str("success"),
            ResultCode::OperationsError => f.write_str("operations error"),
            ResultCode::ProtocolError => f.write_str("protocol error"),
            ResultCode::TimeLimitExceeded => {
                f.write_str("time limit exceeded")
            }
            ResultCode::SizeLimitExceeded => {
                f.write_str("size limit exceeded")
            }
            ResultCode::NoSuchObject => f.write_str("no such object"),
            ResultCode::InvalidCredentials => {
                f.write_str("invalid credentials")
            }
            ResultCode::InsufficientAccess => {
                f.write_str("insufficient access")
            }
            ResultCode::Busy => f.write_str("server busy"),
            ResultCode::Unavailable => f.write_str("server unavailable"),
            ResultCode::UnwillingToPerform => {
                f.write_str("server unwilling to perform")
            }
            ResultCode::ServerDown => f.write_str("cannot contact server"),
            ResultCode::Timeout => f.write_str("timed out"),
            ResultCode::FilterError => f.write_str("bad search filter"),
            ResultCode::ConnectError => f.write_str("connect error"),
            ResultCode::Other(code) => write!(f, "result code {}", code),
        }
    }
}

//------------ SessionOptions ------------------------------------------------

/// Protocol options applied to a freshly established connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    pub version: u8,
    pub time_limit: Option<Duration>,
    pub deref: Deref,
}

impl SessionOptions {
    pub fn from_conf(conf: &Config) -> Self {
        SessionOptions {
            version: conf.version,
            time_limit: conf.time_limit,
            deref: conf.deref,
        }
    }
}

//------------ SearchRequest -------------------------------------------------

/// A search to be issued on a connection.
#[derive(Clone, Copy, Debug)]
pub struct SearchRequest<'a> {
    pub base: &'a str,
    pub scope: Scope,
    pub filter: &'a str,

    /// The attributes to return. An empty slice requests all of them.
    pub attrs: &'a [String],
}

//------------ SearchResult --------------------------------------------------

/// The entries returned by a successful search.
#[derive(Clone, Debug, Default)]
pub struct SearchResult {
    pub entries: Vec<Entry>,

    /// The code the server finished the search with.
    ///
    /// This is always one of the codes for which
    /// [`ResultCode::is_success`] returns true.
    pub code: Option<ResultCode>,
}

impl SearchResult {
    pub fn new(entries: Vec<Entry>, code: ResultCode) -> Self {
        SearchResult {
            entries,
            code: Some(code),
        }
    }

    /// Returns whether the server stopped short because of a limit.
    pub fn is_truncated(&self) -> bool {
        matches!(
            self.code,
            Some(ResultCode::SizeLimitExceeded)
                | Some(ResultCode::TimeLimitExceeded)
        )
    }
}

//------------ RebindProc ----------------------------------------------------

/// Supplies credentials when a connection follows a referral.
pub type RebindProc = Arc<dyn Fn() -> Credentials + Send + Sync>;

//------------ Connector -----------------------------------------------------

/// Establishes connections to directory servers.
pub trait Connector {
    /// The type of connection produced.
    type Connection: Connection;

    /// Connects to the given server.
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        conf: &Config,
    ) -> Result<Self::Connection, Error>;
}

//------------ Connection ----------------------------------------------------

/// An established connection to a directory server.
pub trait Connection {
    /// Applies protocol options.
    fn set_options(&mut self, options: &SessionOptions) -> Result<(), Error>;

    /// Installs the credential supplier for following referrals.
    fn set_rebind_proc(&mut self, rebind: RebindProc);

    /// Performs a simple bind.
    fn bind(&mut self, creds: &Credentials) -> Result<(), Error>;

    /// Limits the number of entries returned by subsequent searches.
    ///
    /// A limit of zero means no limit.
    fn set_size_limit(&mut self, limit: usize);

    /// Performs a search.
    ///
    /// Results ending with a size or time limit are returned as `Ok`. Any
    /// other non-success code is an error.
    fn search(
        &mut self,
        request: &SearchRequest<'_>,
    ) -> Result<SearchResult, Error>;

    /// Unbinds and closes the connection.
    fn unbind(self) -> Result<(), Error>;
}

//------------ Error ---------------------------------------------------------

/// A directory operation failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    code: ResultCode,
    message: Option<String>,
}

impl Error {
    pub fn new(code: ResultCode) -> Self {
        Error {
            code,
            message: None,
        }
    }

    pub fn with_message(code: ResultCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: Some(message.into()),
        }
    }

    pub fn code(&self) -> ResultCode {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

impl From<ResultCode> for Error {
    fn from(code: ResultCode) -> Self {
        Error::new(code)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => self.code.fmt(f),
        }
    }
}

impl error::Error for Error {}

//============ Testing =======================================================
