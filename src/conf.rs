//! Directory client configuration.
//!
//! The configuration tells the session manager which directory servers to
//! talk to, where in the directory tree to look for entries, and how to
//! authenticate. It is normally read from a glibc-style configuration file,
//! `/etc/ldap.conf`, via [`ConfigFile`]. As a fallback, it can be derived
//! from DNS service records through [`Discovery`] or, using the system’s
//! resolver, [`SystemDiscovery`]. All of them implement the
//! [`ConfigSource`] trait, which is all the session manager cares about.
//!
//! Once loaded, a [`Config`] is never modified. The session manager keeps it
//! behind an arc and only records which of its endpoints it is currently
//! bound to.

use std::collections::BTreeMap;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{error, fmt, fs, io};
use tracing::debug;

//------------ Module Configuration ------------------------------------------

/// The path of the system configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ldap.conf";

/// The path of the file holding the password for the root bind DN.
pub const DEFAULT_SECRET_PATH: &str = "/etc/ldap.secret";

/// The default port for plain LDAP and STARTTLS.
pub const LDAP_PORT: u16 = 389;

/// The default port for LDAP over TLS.
pub const LDAPS_PORT: u16 = 636;

/// The default protocol version.
pub const DEFAULT_VERSION: u8 = 2;

/// The default time limit for binding.
pub const DEFAULT_BIND_TIME_LIMIT: Duration = Duration::from_secs(30);

//------------ Endpoint ------------------------------------------------------

/// A directory server to connect to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint {
    /// The host name or address of the server.
    pub host: String,

    /// An explicit port for this server.
    ///
    /// If this is `None`, the configuration’s port applies.
    pub port: Option<u16>,
}

impl Endpoint {
    /// Creates a new endpoint using the configured port.
    pub fn new(host: impl Into<String>) -> Self {
        Endpoint {
            host: host.into(),
            port: None,
        }
    }

    /// Creates a new endpoint with an explicit port.
    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port: Some(port),
        }
    }

    /// Returns the URL for connecting to this server.
    pub fn url(&self, tls: TlsMode, port: u16) -> String {
        let scheme = match tls {
            TlsMode::Ldaps => "ldaps",
            TlsMode::Off | TlsMode::StartTls => "ldap",
        };
        if self.host.contains(':') {
            format!("{}://[{}]:{}", scheme, self.host, port)
        } else {
            format!("{}://{}:{}", scheme, self.host, port)
        }
    }
}

//--- FromStr

impl FromStr for Endpoint {
    type Err = Error;

    /// Parses `host`, `host:port`, or `[address]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix('[') {
            let (host, rest) = rest.split_once(']').ok_or(Error::Value)?;
            return match rest.strip_prefix(':') {
                Some(port) => Ok(Endpoint::with_port(host, parse_port(port)?)),
                None if rest.is_empty() => Ok(Endpoint::new(host)),
                None => Err(Error::Value),
            };
        }
        match s.split_once(':') {
            // More than one colon: a bare IPv6 address.
            Some((_, port)) if port.contains(':') => Ok(Endpoint::new(s)),
            Some((host, port)) => {
                Ok(Endpoint::with_port(host, parse_port(port)?))
            }
            None => Ok(Endpoint::new(s)),
        }
    }
}

//--- Display

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.port, self.host.contains(':')) {
            (Some(port), true) => write!(f, "[{}]:{}", self.host, port),
            (Some(port), false) => write!(f, "{}:{}", self.host, port),
            (None, _) => f.write_str(&self.host),
        }
    }
}

//------------ Scope ---------------------------------------------------------

/// How far below the search base a search reaches.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scope {
    /// Only the base entry itself.
    Base,

    /// The immediate children of the base entry.
    OneLevel,

    /// The base entry and everything below it.
    Subtree,
}

impl Scope {
    /// Returns the keyword used in the configuration file.
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Base => "base",
            Scope::OneLevel => "one",
            Scope::Subtree => "sub",
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Scope::Base),
            "one" => Ok(Scope::OneLevel),
            "sub" => Ok(Scope::Subtree),
            _ => Err(Error::Value),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------ Deref ---------------------------------------------------------

/// When the server should dereference aliases.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Deref {
    Never,
    Searching,
    Finding,
    Always,
}

impl Deref {
    /// Returns the keyword used in the configuration file.
    pub fn as_str(self) -> &'static str {
        match self {
            Deref::Never => "never",
            Deref::Searching => "searching",
            Deref::Finding => "finding",
            Deref::Always => "always",
        }
    }
}

impl FromStr for Deref {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(Deref::Never),
            "searching" => Ok(Deref::Searching),
            "finding" => Ok(Deref::Finding),
            "always" => Ok(Deref::Always),
            _ => Err(Error::Value),
        }
    }
}

impl fmt::Display for Deref {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------ TlsMode -------------------------------------------------------

/// Whether and how connections are secured.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TlsMode {
    /// Plain LDAP.
    Off,

    /// TLS from the start of the connection.
    Ldaps,

    /// Plain LDAP upgraded via the StartTLS extended operation.
    StartTls,
}

//------------ Map -----------------------------------------------------------

/// A name service map.
///
/// Each map can have its own search descriptor overriding the global
/// search base.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Map {
    Passwd,
    Shadow,
    Group,
    Hosts,
    Services,
    Networks,
    Protocols,
    Rpc,
    Ethers,
    Netmasks,
    Bootparams,
    Aliases,
    Netgroup,
}

impl Map {
    /// All maps in configuration file order.
    pub const ALL: [Map; 13] = [
        Map::Passwd,
        Map::Shadow,
        Map::Group,
        Map::Hosts,
        Map::Services,
        Map::Networks,
        Map::Protocols,
        Map::Rpc,
        Map::Ethers,
        Map::Netmasks,
        Map::Bootparams,
        Map::Aliases,
        Map::Netgroup,
    ];

    /// Returns the configuration keyword for the map’s search descriptor.
    pub fn key(self) -> &'static str {
        match self {
            Map::Passwd => "nss_base_passwd",
            Map::Shadow => "nss_base_shadow",
            Map::Group => "nss_base_group",
            Map::Hosts => "nss_base_hosts",
            Map::Services => "nss_base_services",
            Map::Networks => "nss_base_networks",
            Map::Protocols => "nss_base_protocols",
            Map::Rpc => "nss_base_rpc",
            Map::Ethers => "nss_base_ethers",
            Map::Netmasks => "nss_base_netmasks",
            Map::Bootparams => "nss_base_bootparams",
            Map::Aliases => "nss_base_aliases",
            Map::Netgroup => "nss_base_netgroup",
        }
    }

    /// Returns the map for a configuration keyword.
    ///
    /// The keyword is matched ignoring ASCII case.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|map| map.key().eq_ignore_ascii_case(key))
    }
}

//------------ SearchDescriptor ----------------------------------------------

/// Where to search for the entries of a map.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchDescriptor {
    /// The search base.
    pub base: String,

    /// The scope, if different from the global scope.
    pub scope: Option<Scope>,

    /// An additional filter ANDed with the map’s filter.
    pub filter: Option<String>,
}

impl SearchDescriptor {
    /// Creates a descriptor with only a base.
    pub fn new(base: impl Into<String>) -> Self {
        SearchDescriptor {
            base: base.into(),
            scope: None,
            filter: None,
        }
    }
}

//--- FromStr

impl FromStr for SearchDescriptor {
    type Err = Error;

    /// Parses `base[?scope[?filter]]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '?');
        let base = parts.next().unwrap_or_default();
        let scope = match parts.next() {
            Some("") | None => None,
            Some(scope) => Some(scope.parse()?),
        };
        let filter = match parts.next() {
            Some("") | None => None,
            Some(filter) => Some(filter.to_string()),
        };
        Ok(SearchDescriptor {
            base: base.to_string(),
            scope,
            filter,
        })
    }
}

//--- Display

impl fmt::Display for SearchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.base)?;
        match (self.scope, &self.filter) {
            (None, None) => Ok(()),
            (Some(scope), None) => write!(f, "?{}", scope),
            (scope, Some(filter)) => write!(
                f,
                "?{}?{}",
                scope.map(Scope::as_str).unwrap_or_default(),
                filter
            ),
        }
    }
}

//------------ Credentials ---------------------------------------------------

/// An identity and secret for a simple bind.
///
/// Both being `None` means an anonymous bind.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Credentials {
    dn: Option<String>,
    password: Option<String>,
}

impl Credentials {
    pub fn new(dn: Option<String>, password: Option<String>) -> Self {
        Credentials { dn, password }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("dn", &self.dn)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

//------------ Config --------------------------------------------------------

/// Directory client configuration.
///
/// The type follows the same pattern as the resolver configuration: create
/// a value with [`Config::new`], which provides the defaults, then either
/// set the fields directly or parse a configuration file into it via
/// [`Config::parse`] or [`Config::parse_file`]. Call [`Config::check`]
/// before using it.
#[derive(Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// The servers to try, in order.
    pub endpoints: Vec<Endpoint>,

    /// The port for endpoints without an explicit one.
    ///
    /// If this is `None`, the default port for the TLS mode is used.
    pub port: Option<u16>,

    /// The default search base.
    pub base: Option<String>,

    /// The default search scope.
    pub scope: Scope,

    /// The alias dereferencing policy.
    pub deref: Deref,

    /// The DN to bind as.
    pub bind_dn: Option<String>,

    /// The password for `bind_dn`.
    pub bind_pw: Option<String>,

    /// The DN to bind as when running as root.
    pub root_bind_dn: Option<String>,

    /// The password for `root_bind_dn`, read from the secret file.
    pub root_bind_pw: Option<String>,

    /// The protocol version.
    pub version: u8,

    /// The server-side time limit for searches.
    pub time_limit: Option<Duration>,

    /// The time limit for establishing a connection and binding.
    pub bind_time_limit: Duration,

    /// Whether and how to use TLS.
    pub tls: TlsMode,

    /// Path to the TLS certificate database.
    pub tls_cert_path: Option<String>,

    /// Per-map search descriptors.
    pub descriptors: BTreeMap<Map, SearchDescriptor>,
}

/// # Management
///
impl Config {
    /// Creates a new configuration with default values and no servers.
    pub fn new() -> Self {
        Config {
            endpoints: Vec::new(),
            port: None,
            base: None,
            scope: Scope::Subtree,
            deref: Deref::Never,
            bind_dn: None,
            bind_pw: None,
            root_bind_dn: None,
            root_bind_pw: None,
            version: DEFAULT_VERSION,
            time_limit: None,
            bind_time_limit: DEFAULT_BIND_TIME_LIMIT,
            tls: TlsMode::Off,
            tls_cert_path: None,
            descriptors: BTreeMap::new(),
        }
    }

    /// Loads the configuration from a file and the root secret file.
    pub fn from_file(
        path: impl AsRef<Path>,
        secret: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        let mut res = Self::new();
        res.parse_file(path)?;
        res.read_root_secret(secret);
        res.check()?;
        Ok(res)
    }

    /// Checks that the configuration is usable.
    pub fn check(&self) -> Result<(), Error> {
        if self.endpoints.is_empty() {
            return Err(Error::NoHost);
        }
        Ok(())
    }

    /// Returns the port to use for the given endpoint.
    pub fn port_for(&self, endpoint: &Endpoint) -> u16 {
        endpoint.port.or(self.port).unwrap_or(match self.tls {
            TlsMode::Ldaps => LDAPS_PORT,
            TlsMode::Off | TlsMode::StartTls => LDAP_PORT,
        })
    }

    /// Returns the search descriptor for a map if there is one.
    pub fn descriptor(&self, map: Option<Map>) -> Option<&SearchDescriptor> {
        map.and_then(|map| self.descriptors.get(&map))
    }

    /// Returns the search base for a map.
    pub fn search_base(&self, map: Option<Map>) -> &str {
        match self.descriptor(map) {
            Some(desc) => &desc.base,
            None => self.base.as_deref().unwrap_or_default(),
        }
    }

    /// Returns the search scope for a map.
    pub fn search_scope(&self, map: Option<Map>) -> Scope {
        self.descriptor(map)
            .and_then(|desc| desc.scope)
            .unwrap_or(self.scope)
    }

    /// Returns the credentials to bind with.
    ///
    /// If `as_root` is true and a root bind DN is configured, that DN and
    /// the password from the secret file are used.
    pub fn bind_credentials(&self, as_root: bool) -> Credentials {
        match (as_root, &self.root_bind_dn) {
            (true, Some(dn)) => {
                Credentials::new(Some(dn.clone()), self.root_bind_pw.clone())
            }
            _ => Credentials::new(self.bind_dn.clone(), self.bind_pw.clone()),
        }
    }
}

/// # Parsing Configuration File
///
impl Config {
    /// Parses the configuration from a file.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Parses the configuration from a reader.
    ///
    /// Each line holds a keyword followed by whitespace and a value. Empty
    /// lines and lines starting with `#` are skipped, as are lines with an
    /// unknown keyword and keywords without a value.
    pub fn parse<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        for (idx, line) in io::BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (keyword, value) = match line.split_once(char::is_whitespace)
            {
                Some((keyword, value)) => (keyword, value.trim()),
                None => continue,
            };
            self.parse_keyword(keyword, value)
                .map_err(|_| Error::Parse { line: idx + 1 })?;
        }
        Ok(())
    }

    fn parse_keyword(
        &mut self,
        keyword: &str,
        value: &str,
    ) -> Result<(), Error> {
        match keyword.to_ascii_lowercase().as_str() {
            "host" => {
                self.endpoints = value
                    .split_whitespace()
                    .map(Endpoint::from_str)
                    .collect::<Result<_, _>>()?;
            }
            "base" => self.base = Some(value.into()),
            "binddn" => self.bind_dn = Some(value.into()),
            "bindpw" => self.bind_pw = Some(value.into()),
            "rootbinddn" => self.root_bind_dn = Some(value.into()),
            "sslpath" => self.tls_cert_path = Some(value.into()),
            "scope" => {
                // Unknown scopes leave the default alone.
                if let Ok(scope) = value.parse() {
                    self.scope = scope
                }
            }
            "deref" => {
                if let Ok(deref) = value.parse() {
                    self.deref = deref
                }
            }
            "port" => self.port = Some(parse_port(value)?),
            "ssl" => {
                self.tls = match value.to_ascii_lowercase().as_str() {
                    "yes" | "on" => TlsMode::Ldaps,
                    "start_tls" => TlsMode::StartTls,
                    _ => TlsMode::Off,
                }
            }
            "ldap_version" => {
                self.version = value.parse().map_err(|_| Error::Value)?
            }
            "timelimit" => {
                self.time_limit = match parse_secs(value)? {
                    secs if secs.is_zero() => None,
                    secs => Some(secs),
                }
            }
            "bind_timelimit" => self.bind_time_limit = parse_secs(value)?,
            other => {
                if let Some(map) = Map::from_key(other) {
                    self.descriptors.insert(map, value.parse()?);
                }
            }
        }
        Ok(())
    }

    /// Reads the root bind password from the given file.
    ///
    /// Only the first line is used. If no root bind DN is configured, the
    /// file isn’t read. If the file cannot be read, the root bind DN is
    /// dropped so that the ordinary identity is used instead.
    pub fn read_root_secret(&mut self, path: impl AsRef<Path>) {
        if self.root_bind_dn.is_none() {
            return;
        }
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                let secret = content.lines().next().unwrap_or_default();
                self.root_bind_pw = Some(secret.into());
            }
            Err(err) => {
                debug!(path = %path.display(), %err, "cannot read root secret");
                self.root_bind_dn = None;
            }
        }
    }
}

//--- Default

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

//--- Debug

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let redacted = |pw: &Option<String>| pw.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("endpoints", &self.endpoints)
            .field("port", &self.port)
            .field("base", &self.base)
            .field("scope", &self.scope)
            .field("deref", &self.deref)
            .field("bind_dn", &self.bind_dn)
            .field("bind_pw", &redacted(&self.bind_pw))
            .field("root_bind_dn", &self.root_bind_dn)
            .field("root_bind_pw", &redacted(&self.root_bind_pw))
            .field("version", &self.version)
            .field("time_limit", &self.time_limit)
            .field("bind_time_limit", &self.bind_time_limit)
            .field("tls", &self.tls)
            .field("tls_cert_path", &self.tls_cert_path)
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

//--- Display

impl fmt::Display for Config {
    /// Writes the configuration in configuration file format.
    ///
    /// Only values different from the defaults are written. The root bind
    /// password lives in its own file and is never written.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.endpoints.is_empty() {
            f.write_str("host")?;
            for endpoint in &self.endpoints {
                write!(f, " {}", endpoint)?;
            }
            f.write_str("\n")?;
        }
        if let Some(port) = self.port {
            writeln!(f, "port {}", port)?;
        }
        if let Some(base) = &self.base {
            writeln!(f, "base {}", base)?;
        }
        if self.scope != Scope::Subtree {
            writeln!(f, "scope {}", self.scope)?;
        }
        if self.deref != Deref::Never {
            writeln!(f, "deref {}", self.deref)?;
        }
        if let Some(dn) = &self.bind_dn {
            writeln!(f, "binddn {}", dn)?;
        }
        if let Some(pw) = &self.bind_pw {
            writeln!(f, "bindpw {}", pw)?;
        }
        if let Some(dn) = &self.root_bind_dn {
            writeln!(f, "rootbinddn {}", dn)?;
        }
        if self.version != DEFAULT_VERSION {
            writeln!(f, "ldap_version {}", self.version)?;
        }
        if let Some(limit) = self.time_limit {
            writeln!(f, "timelimit {}", limit.as_secs())?;
        }
        if self.bind_time_limit != DEFAULT_BIND_TIME_LIMIT {
            writeln!(f, "bind_timelimit {}", self.bind_time_limit.as_secs())?;
        }
        match self.tls {
            TlsMode::Off => {}
            TlsMode::Ldaps => f.write_str("ssl yes\n")?,
            TlsMode::StartTls => f.write_str("ssl start_tls\n")?,
        }
        if let Some(path) = &self.tls_cert_path {
            writeln!(f, "sslpath {}", path)?;
        }
        for (map, desc) in &self.descriptors {
            writeln!(f, "{} {}", map.key(), desc)?;
        }
        Ok(())
    }
}

//------------ ConfigSource --------------------------------------------------

/// Something that can produce a configuration.
pub trait ConfigSource {
    /// Loads the configuration.
    ///
    /// The session manager calls this lazily when it first needs to open a
    /// connection and again after a failed attempt.
    fn load(&self) -> Result<Config, Error>;
}

impl ConfigSource for Config {
    fn load(&self) -> Result<Config, Error> {
        self.check()?;
        Ok(self.clone())
    }
}

//------------ ConfigFile ----------------------------------------------------

/// A configuration file and its root secret file.
#[derive(Clone, Debug)]
pub struct ConfigFile {
    path: PathBuf,
    secret: PathBuf,
}

impl ConfigFile {
    /// Creates a source for the given file and the default secret file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigFile {
            path: path.into(),
            secret: DEFAULT_SECRET_PATH.into(),
        }
    }

    /// Changes the path of the root secret file.
    pub fn secret(mut self, path: impl Into<PathBuf>) -> Self {
        self.secret = path.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

impl ConfigSource for ConfigFile {
    fn load(&self) -> Result<Config, Error> {
        Config::from_file(&self.path, &self.secret)
    }
}

//------------ Discovery -----------------------------------------------------

/// Configuration derived from DNS service records.
///
/// The servers are the targets of the `_ldap._tcp` SRV records of a domain
/// and the search base is built from the domain’s labels, so that
/// `example.com` becomes `dc=example,dc=com`. The actual DNS query is left
/// to the closure given upon creation, which receives the owner name to
/// query and returns the targets in order of preference.
pub struct Discovery<F> {
    domain: String,
    lookup: F,
}

impl<F> Discovery<F>
where
    F: Fn(&str) -> Result<Vec<Endpoint>, io::Error>,
{
    pub fn new(domain: impl Into<String>, lookup: F) -> Self {
        Discovery {
            domain: domain.into(),
            lookup,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl<F> ConfigSource for Discovery<F>
where
    F: Fn(&str) -> Result<Vec<Endpoint>, io::Error>,
{
    fn load(&self) -> Result<Config, Error> {
        let domain = self.domain.trim_end_matches('.');
        let endpoints = (self.lookup)(&format!("_ldap._tcp.{}", domain))?;
        let mut res = Config::new();
        res.endpoints = endpoints;
        res.base = Some(domain_to_base(domain));
        res.check()?;
        Ok(res)
    }
}

impl<F> fmt::Debug for Discovery<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Discovery")
            .field("domain", &self.domain)
            .finish()
    }
}

//------------ SystemDiscovery -----------------------------------------------

/// Discovery through the system’s DNS resolver.
///
/// The domain is the first search domain of the resolver configuration.
/// The SRV query goes through the stub resolver of the `domain` crate.
/// Without the `dns` feature, this source always fails with
/// [`Error::NoHost`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemDiscovery;

impl ConfigSource for SystemDiscovery {
    #[cfg(feature = "dns")]
    fn load(&self) -> Result<Config, Error> {
        let domain = match crate::dns::search_domain() {
            Some(domain) => domain,
            None => {
                debug!("no DNS search domain for discovery");
                return Err(Error::NoHost);
            }
        };
        Discovery::new(domain, crate::dns::lookup_srv).load()
    }

    #[cfg(not(feature = "dns"))]
    fn load(&self) -> Result<Config, Error> {
        debug!("DNS discovery not available");
        Err(Error::NoHost)
    }
}

/// Converts a domain name into a DN of domain components.
pub fn domain_to_base(domain: &str) -> String {
    domain
        .split('.')
        .filter(|label| !label.is_empty())
        .map(|label| format!("dc={}", label))
        .collect::<Vec<_>>()
        .join(",")
}

//------------ Fallback ------------------------------------------------------

/// A source trying a second source if the first one fails.
#[derive(Clone, Debug)]
pub struct Fallback<A, B> {
    first: A,
    second: B,
}

impl<A, B> Fallback<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Fallback { first, second }
    }
}

impl<A: ConfigSource, B: ConfigSource> ConfigSource for Fallback<A, B> {
    fn load(&self) -> Result<Config, Error> {
        match self.first.load() {
            Ok(conf) => Ok(conf),
            Err(err) => {
                debug!(%err, "primary configuration unusable, trying fallback");
                self.second.load()
            }
        }
    }
}

//------------ Private Helpers -----------------------------------------------

fn parse_port(s: &str) -> Result<u16, Error> {
    s.parse().map_err(|_| Error::Value)
}

fn parse_secs(s: &str) -> Result<Duration, Error> {
    s.parse().map(Duration::from_secs).map_err(|_| Error::Value)
}

//------------ Error ---------------------------------------------------------

/// The configuration could not be loaded.
#[derive(Debug)]
pub enum Error {
    /// No directory server is configured.
    NoHost,

    /// A value could not be parsed.
    Value,

    /// A line of the configuration file is malformed.
    Parse { line: usize },

    /// Something happend while reading.
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoHost => f.write_str("no directory server configured"),
            Error::Value => f.write_str("invalid configuration value"),
            Error::Parse { line } => {
                write!(f, "error parsing configuration in line {}", line)
            }
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

//============ Testing =======================================================
