//! The directory session.
//!
//! A [`Session`] owns the one connection a process keeps to the directory
//! together with the configuration it was opened with. It is either closed,
//! holding nothing, or open, holding both a bound connection and its
//! configuration. There is no state in between.
//!
//! The session is opened lazily by [`Session::ensure_open`]. This loads the
//! configuration from the configured source if that hasn’t happened yet,
//! tries the configured servers in order until one accepts a connection,
//! applies the protocol options, installs the credentials for following
//! referrals, and binds.
//!
//! A connection must never be shared between a process and a child it
//! forked. The session therefore remembers the process ID it was opened in
//! and silently discards the connection if that changes. The connection is
//! not unbound in that case as doing so would tear down the parent’s
//! connection, too.

use crate::conf::{self, Config, ConfigSource, Endpoint};
use crate::conn::{self, Connection, Connector, SessionOptions};
use std::sync::Arc;
use std::{error, fmt};
use tracing::{debug, trace};

//------------ ProcessIdentity -----------------------------------------------

/// Provides the identity of the current process.
///
/// The default uses the real process ID and effective user ID. Tests
/// replace them to simulate forking and running as root.
pub struct ProcessIdentity {
    pid: Box<dyn Fn() -> u32 + Send + Sync>,
    euid: Box<dyn Fn() -> u32 + Send + Sync>,
}

impl ProcessIdentity {
    /// Creates the identity of the actual process.
    pub fn system() -> Self {
        ProcessIdentity {
            // SAFETY: Neither call has preconditions and both always
            //         succeed.
            pid: Box::new(|| unsafe { libc::getpid() } as u32),
            euid: Box::new(|| unsafe { libc::geteuid() }),
        }
    }

    /// Creates an identity from the given functions.
    pub fn new(
        pid: impl Fn() -> u32 + Send + Sync + 'static,
        euid: impl Fn() -> u32 + Send + Sync + 'static,
    ) -> Self {
        ProcessIdentity {
            pid: Box::new(pid),
            euid: Box::new(euid),
        }
    }

    pub fn pid(&self) -> u32 {
        (self.pid)()
    }

    /// Returns whether the process runs with root privileges.
    pub fn is_root(&self) -> bool {
        (self.euid)() == 0
    }
}

impl Default for ProcessIdentity {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProcessIdentity")
            .field("pid", &self.pid())
            .finish()
    }
}

//------------ Session -------------------------------------------------------

/// The process’s session with the directory.
pub struct Session<C: Connector> {
    /// Establishes new connections.
    connector: C,

    /// Where to get the configuration from.
    source: Box<dyn ConfigSource + Send>,

    /// The configuration once it has been loaded.
    conf: Option<Arc<Config>>,

    /// The open connection, if any.
    active: Option<Active<C::Connection>>,

    /// The identity of the running process.
    process: ProcessIdentity,
}

/// An open connection with everything that belongs to it.
struct Active<T> {
    conn: T,
    conf: Arc<Config>,

    /// Index of the endpoint in the configuration.
    endpoint: usize,

    /// The process the connection was opened in.
    owner: u32,
}

impl<C: Connector> Session<C> {
    /// Creates a new, closed session.
    pub fn new(
        connector: C,
        source: impl ConfigSource + Send + 'static,
    ) -> Self {
        Session {
            connector,
            source: Box::new(source),
            conf: None,
            active: None,
            process: ProcessIdentity::system(),
        }
    }

    /// Replaces the process identity.
    pub fn with_process(mut self, process: ProcessIdentity) -> Self {
        self.process = process;
        self
    }

    /// Returns whether the session currently holds a connection.
    ///
    /// This doesn’t check whether the connection belongs to this process.
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Returns the endpoint the session is bound to.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.active
            .as_ref()
            .and_then(|active| active.conf.endpoints.get(active.endpoint))
    }

    /// Returns the configuration the session is bound with.
    pub fn config(&self) -> Option<&Arc<Config>> {
        self.active.as_ref().map(|active| &active.conf)
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Returns the connection and its configuration if the session is open.
    pub(crate) fn active_mut(
        &mut self,
    ) -> Option<(&mut C::Connection, &Config)> {
        self.active
            .as_mut()
            .map(|active| (&mut active.conn, active.conf.as_ref()))
    }

    /// Makes sure the session is open.
    ///
    /// If the session was opened by a different process, the connection is
    /// discarded first. If it is open already, nothing happens.
    pub fn ensure_open(&mut self) -> Result<(), OpenError> {
        let pid = self.process.pid();
        if let Some(active) = self.active.as_ref() {
            if active.owner == pid {
                return Ok(());
            }
            debug!(
                owner = active.owner,
                pid, "process changed, discarding inherited connection"
            );
            self.active = None;
        }

        let conf = self.load_conf()?;
        let (endpoint, mut conn) = self.connect(&conf)?;

        if let Err(err) = conn.set_options(&SessionOptions::from_conf(&conf))
        {
            debug!(%err, "setting session options failed");
            close_conn(conn);
            return Err(OpenError::Options(err));
        }

        let creds = conf.bind_credentials(self.process.is_root());
        let rebind_creds = creds.clone();
        conn.set_rebind_proc(Arc::new(move || rebind_creds.clone()));

        if let Err(err) = conn.bind(&creds) {
            debug!(%err, dn = ?creds.dn(), "bind failed");
            close_conn(conn);
            return Err(OpenError::Bind(err));
        }

        debug!(
            endpoint = %conf.endpoints[endpoint],
            dn = ?creds.dn(),
            "session open"
        );
        self.active = Some(Active {
            conn,
            conf,
            endpoint,
            owner: pid,
        });
        Ok(())
    }

    /// Closes the session.
    ///
    /// The connection is unbound unless it was inherited from a parent
    /// process. Closing a closed session does nothing.
    pub fn force_close(&mut self) {
        let active = match self.active.take() {
            Some(active) => active,
            None => return,
        };
        if active.owner == self.process.pid() {
            close_conn(active.conn);
        }
        trace!("session closed");
    }

    /// Returns the configuration, loading it if necessary.
    fn load_conf(&mut self) -> Result<Arc<Config>, OpenError> {
        if let Some(conf) = self.conf.as_ref() {
            return Ok(conf.clone());
        }
        let conf = Arc::new(self.source.load()?);
        self.conf = Some(conf.clone());
        Ok(conf)
    }

    /// Connects to the first endpoint that accepts.
    fn connect(
        &mut self,
        conf: &Config,
    ) -> Result<(usize, C::Connection), OpenError> {
        let mut last_err = None;
        for (idx, endpoint) in conf.endpoints.iter().enumerate() {
            match self.connector.connect(endpoint, conf) {
                Ok(conn) => return Ok((idx, conn)),
                Err(err) => {
                    debug!(%endpoint, %err, "connect failed");
                    last_err = Some(err);
                }
            }
        }
        match last_err {
            Some(err) => Err(OpenError::Connect(err)),
            None => Err(OpenError::Config(conf::Error::NoHost)),
        }
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

fn close_conn<T: Connection>(conn: T) {
    if let Err(err) = conn.unbind() {
        trace!(%err, "unbind failed");
    }
}

//------------ OpenError -----------------------------------------------------

/// The session could not be opened.
#[derive(Debug)]
pub enum OpenError {
    /// No usable configuration.
    Config(conf::Error),

    /// None of the servers accepted a connection.
    ///
    /// Contains the error of the last server tried.
    Connect(conn::Error),

    /// Setting the protocol options failed.
    Options(conn::Error),

    /// Binding failed.
    Bind(conn::Error),
}

impl From<conf::Error> for OpenError {
    fn from(err: conf::Error) -> Self {
        OpenError::Config(err)
    }
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpenError::Config(err) => write!(f, "configuration: {}", err),
            OpenError::Connect(err) => write!(f, "connect: {}", err),
            OpenError::Options(err) => write!(f, "session options: {}", err),
            OpenError::Bind(err) => write!(f, "bind: {}", err),
        }
    }
}

impl error::Error for OpenError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            OpenError::Config(err) => Some(err),
            OpenError::Connect(err)
            | OpenError::Options(err)
            | OpenError::Bind(err) => Some(err),
        }
    }
}

//============ Testing =======================================================
