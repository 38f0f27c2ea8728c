//! The process-wide resolver context.
//!
//! A [`Resolver`] bundles the directory session of a process with the
//! cache mapping user DNs to user names. All operations lock the session
//! for their whole duration, including the network round trips. Only one
//! lookup or enumeration step is in progress at any time.
//!
//! Keyed lookups go through [`Resolver::lookup`], enumerations through
//! [`Resolver::enum_start`], [`Resolver::enum_next`], and
//! [`Resolver::enum_stop`].

use crate::conf::{ConfigFile, ConfigSource, Fallback, SystemDiscovery};
use crate::conn::Connector;
use crate::enumerate::Enumeration;
use crate::filter::{self, Arg};
use crate::parse::{DnReader, EntryParser, ParseContext, ParseError, ParseState};
use crate::search::{self, Query, SearchSpec};
use crate::session::Session;
use crate::status::Response;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

/// The size limit for keyed lookups.
///
/// Keys should be unique. Asking for two entries still lets us notice
/// when they aren’t while bounding the work.
pub const LOOKUP_SIZE_LIMIT: usize = 2;

/// The default number of DNs kept by the [`UidCache`].
pub const UID_CACHE_LIMIT: usize = 4096;

/// The attribute holding the user name.
const UID_ATTR: &str = "uid";

//------------ Resolver ------------------------------------------------------

/// A directory-backed name service resolver.
pub struct Resolver<C: Connector> {
    session: Mutex<Session<C>>,
    uids: UidCache,
}

impl<C: Connector> Resolver<C> {
    /// Creates a resolver using the system configuration.
    ///
    /// The configuration is read from the default configuration file. If
    /// that fails, the servers are discovered through DNS.
    pub fn new(connector: C) -> Self {
        Self::with_discovery(connector, SystemDiscovery)
    }

    /// Creates a resolver using the system configuration file or else the
    /// given discovery source.
    pub fn with_discovery(
        connector: C,
        discovery: impl ConfigSource + Send + 'static,
    ) -> Self {
        Self::with_source(
            connector,
            Fallback::new(ConfigFile::default(), discovery),
        )
    }

    /// Creates a resolver using the given configuration source.
    pub fn with_source(
        connector: C,
        source: impl ConfigSource + Send + 'static,
    ) -> Self {
        Self::from_session(Session::new(connector, source))
    }

    /// Creates a resolver from a prepared session.
    pub fn from_session(session: Session<C>) -> Self {
        Resolver {
            session: Mutex::new(session),
            uids: UidCache::default(),
        }
    }

    /// Looks up a record by key.
    ///
    /// The filter template of `spec` is filled with `args`. If there is a
    /// second string argument, it is made available to the parser as the
    /// key of its state. The entries found are given to the parser in the
    /// order the server returned them and the first record produced wins.
    ///
    /// If the buffer is too small for an entry, the lookup stops right
    /// there with [`Response::TryAgain`], even if a later entry might have
    /// fit.
    pub fn lookup<P: EntryParser>(
        &self,
        spec: &SearchSpec,
        args: &[Arg],
        parser: P,
        buf: &mut [u8],
    ) -> Response<P::Record> {
        let filter = match filter::build(&spec.filter, args) {
            Ok(filter) => filter,
            Err(err) => {
                debug!(%err, template = %spec.filter, "cannot build filter");
                return Response::NotFound;
            }
        };
        let query = Query::search(&filter, spec.map, &spec.attrs);
        let state = match args.get(1).and_then(|arg| arg.as_str()) {
            Some(key) => ParseState::with_key(key),
            None => ParseState::new(),
        };
        self.run(&query, LOOKUP_SIZE_LIMIT, state, parser, buf)
    }

    /// Reads a single entry by its DN.
    pub fn read<P: EntryParser>(
        &self,
        dn: &str,
        attrs: &[String],
        parser: P,
        buf: &mut [u8],
    ) -> Response<P::Record> {
        self.run(&Query::read(dn, attrs), 1, ParseState::new(), parser, buf)
    }

    fn run<P: EntryParser>(
        &self,
        query: &Query,
        size_limit: usize,
        mut state: ParseState,
        mut parser: P,
        buf: &mut [u8],
    ) -> Response<P::Record> {
        let mut session = self.session.lock();
        let entries = match search::execute(&mut *session, query, size_limit)
        {
            Ok(entries) => entries,
            Err(err) => return err.into(),
        };
        let mut reader = SessionReader::new(&mut *session, &self.uids);
        for entry in &entries {
            state.finish();
            let mut cx = ParseContext::new(buf, &mut reader);
            match parser.parse(entry, &mut state, &mut cx) {
                Ok(record) => return Response::Success(record),
                Err(ParseError::NotFound) => {
                    trace!(dn = entry.dn(), "entry declined");
                }
                Err(ParseError::ShortBuf) => return Response::TryAgain,
            }
        }
        Response::NotFound
    }

    /// Starts an enumeration.
    ///
    /// Nothing is searched until the first call to
    /// [`enum_next`][Self::enum_next].
    pub fn enum_start(&self, spec: SearchSpec) -> Enumeration {
        Enumeration::new(spec)
    }

    /// Produces the next record of an enumeration.
    ///
    /// Returns [`Response::NotFound`] once the enumeration is exhausted.
    /// Calling again after that starts over with a new search. If the
    /// buffer is too small, returns [`Response::TryAgain`] and the next
    /// call continues with the same entry.
    pub fn enum_next<P: EntryParser>(
        &self,
        cursor: &mut Enumeration,
        parser: P,
        buf: &mut [u8],
    ) -> Response<P::Record> {
        let mut session = self.session.lock();
        cursor.next(&mut *session, &self.uids, parser, buf)
    }

    /// Ends an enumeration, releasing the retained entries.
    pub fn enum_stop(&self, mut cursor: Enumeration) {
        let _session = self.session.lock();
        cursor.reset();
    }

    /// Closes the directory session.
    ///
    /// The next operation opens a new one.
    pub fn close(&self) {
        self.session.lock().force_close();
    }

    /// Returns the DN to user name cache.
    pub fn uid_cache(&self) -> &UidCache {
        &self.uids
    }

    /// Runs a closure with exclusive access to the session.
    pub fn with_session<R>(&self, op: impl FnOnce(&mut Session<C>) -> R) -> R {
        op(&mut self.session.lock())
    }
}

//------------ UidCache ------------------------------------------------------

/// A cache mapping user DNs to user names.
///
/// DNs are compared ignoring ASCII case. The cache holds a limited number
/// of DNs. Adding a new DN to a full cache empties it first.
#[derive(Debug)]
pub struct UidCache {
    map: Mutex<HashMap<String, String>>,
    limit: usize,
}

impl UidCache {
    pub fn new() -> Self {
        Self::with_limit(UID_CACHE_LIMIT)
    }

    /// Creates a cache holding at most `limit` DNs.
    pub fn with_limit(limit: usize) -> Self {
        UidCache {
            map: Mutex::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    pub fn get(&self, dn: &str) -> Option<String> {
        self.map.lock().get(&dn.to_ascii_lowercase()).cloned()
    }

    pub fn insert(&self, dn: &str, uid: &str) {
        let key = dn.to_ascii_lowercase();
        let mut map = self.map.lock();
        if map.len() >= self.limit && !map.contains_key(&key) {
            debug!(limit = self.limit, "DN cache full, clearing");
            map.clear();
        }
        map.insert(key, uid.into());
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&self) {
        self.map.lock().clear()
    }
}

impl Default for UidCache {
    fn default() -> Self {
        Self::new()
    }
}

//------------ SessionReader -------------------------------------------------

/// Resolves user DNs through the cache and the locked session.
pub(crate) struct SessionReader<'a, C: Connector> {
    session: &'a mut Session<C>,
    uids: &'a UidCache,
}

impl<'a, C: Connector> SessionReader<'a, C> {
    pub(crate) fn new(session: &'a mut Session<C>, uids: &'a UidCache) -> Self {
        SessionReader { session, uids }
    }
}

impl<'a, C: Connector> DnReader for SessionReader<'a, C> {
    fn read_uid(&mut self, dn: &str) -> Option<String> {
        if let Some(uid) = self.uids.get(dn) {
            return Some(uid);
        }
        let attrs = [UID_ATTR.to_string()];
        let entries =
            search::execute(self.session, &Query::read(dn, &attrs), 1).ok()?;
        let uid = entries.first()?.first_value(UID_ATTR)?.to_string();
        self.uids.insert(dn, &uid);
        Some(uid)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::arena::{Arena, StrArrayRef, StrRef};
    use crate::assemble::{assign_attr_val, assign_attr_vals};
    use crate::conf::{Config, Endpoint, Map};
    use crate::conn::Entry;
    use crate::memory::MemoryDirectory;
    use crate::parse::parser_fn;

    fn resolver() -> (MemoryDirectory, Resolver<MemoryDirectory>) {
        let dir = MemoryDirectory::new();
        dir.add(
            Entry::new("cn=staff,ou=Group,dc=example,dc=com")
                .with_attr("objectClass", ["posixGroup"])
                .with_attr("cn", ["staff"])
                .with_attr(
                    "uniqueMember",
                    [
                        "uid=alice,ou=People,dc=example,dc=com",
                        "cn=Bob Builder,ou=People,dc=example,dc=com",
                    ],
                ),
        );
        dir.add(
            Entry::new("cn=Bob Builder,ou=People,dc=example,dc=com")
                .with_attr("objectClass", ["posixAccount"])
                .with_attr("uid", ["bob"]),
        );
        let mut conf = Config::new();
        conf.endpoints = vec![Endpoint::new("ldap1")];
        conf.base = Some("dc=example,dc=com".into());
        (dir.clone(), Resolver::with_source(dir, conf))
    }

    #[test]
    fn group_members_from_dns() {
        let (dir, resolver) = resolver();
        let spec = SearchSpec::new(
            "(&(objectClass=posixGroup)(cn=%s))",
            ["cn", "uniqueMember"],
            Some(Map::Group),
        );
        let parser = parser_fn(|entry, _, cx| {
            let name = assign_attr_val(cx.arena(), entry, "cn")?;
            let members: Vec<String> = entry
                .values("uniqueMember")
                .iter()
                .filter_map(|dn| cx.dn_to_uid(dn))
                .collect();
            let members = cx.arena().copy_str_array(&members, None)?;
            Ok::<(StrRef, StrArrayRef), ParseError>((name, members))
        });
        let mut buf = [0u8; 256];
        let (name, members) = resolver
            .lookup(&spec, &[Arg::Str("staff")], parser, &mut buf)
            .ok()
            .unwrap();
        let arena = Arena::new(&mut buf);
        assert_eq!(arena.get_str(name), Some("staff"));
        let members: Vec<_> = arena.get_str_array(members).collect();
        assert_eq!(members, ["alice", "bob"]);

        // One search for the group and one read for Bob.
        assert_eq!(dir.stats().searches, 2);
        assert_eq!(
            resolver
                .uid_cache()
                .get("CN=Bob Builder,ou=People,dc=example,dc=com")
                .as_deref(),
            Some("bob")
        );
    }

    #[test]
    fn cached_uid_avoids_read() {
        let (dir, resolver) = resolver();
        resolver
            .uid_cache()
            .insert("cn=Bob Builder,ou=People,dc=example,dc=com", "robert");
        let spec = SearchSpec::new(
            "(cn=staff)",
            Vec::<String>::new(),
            Some(Map::Group),
        );
        let parser = parser_fn(|entry, _, cx| {
            let members: Vec<String> = entry
                .values("uniqueMember")
                .iter()
                .filter_map(|dn| cx.dn_to_uid(dn))
                .collect();
            Ok(members)
        });
        let mut buf = [0u8; 16];
        let members =
            resolver.lookup(&spec, &[], parser, &mut buf).ok().unwrap();
        assert_eq!(members, ["alice", "robert"]);
        assert_eq!(dir.stats().searches, 1);
    }

    #[test]
    fn read_by_dn() {
        let (_, resolver) = resolver();
        let attrs = vec!["uid".to_string()];
        let read = |buf: &mut [u8]| {
            resolver.read(
                "cn=Bob Builder,ou=People,dc=example,dc=com",
                &attrs,
                parser_fn(|entry, _, cx| {
                    Ok(assign_attr_vals(cx.arena(), entry, "uid", None)?)
                }),
                buf,
            )
        };

        // Two pointer slots and "bob\0" don’t fit.
        let mut buf = [0u8; 16];
        assert_eq!(read(&mut buf), Response::TryAgain);

        let mut buf = [0u8; 64];
        let uid = read(&mut buf).ok().unwrap();
        assert_eq!(uid.len(), 1);
        let arena = Arena::new(&mut buf);
        assert_eq!(arena.get_str_array(uid).collect::<Vec<_>>(), ["bob"]);
    }

    #[test]
    fn cleared_cache_reads_again() {
        let (dir, resolver) = resolver();
        let spec = SearchSpec::new(
            "(cn=staff)",
            Vec::<String>::new(),
            Some(Map::Group),
        );
        let lookup = || {
            let parser = parser_fn(|entry, _, cx| {
                let members: Vec<String> = entry
                    .values("uniqueMember")
                    .iter()
                    .filter_map(|dn| cx.dn_to_uid(dn))
                    .collect();
                Ok(members)
            });
            let mut buf = [0u8; 16];
            resolver.lookup(&spec, &[], parser, &mut buf).ok().unwrap()
        };
        assert_eq!(lookup(), ["alice", "bob"]);
        assert_eq!(lookup(), ["alice", "bob"]);
        assert_eq!(dir.stats().searches, 3);

        resolver.uid_cache().clear();
        assert!(resolver.uid_cache().is_empty());
        assert_eq!(lookup(), ["alice", "bob"]);
        assert_eq!(dir.stats().searches, 5);
    }

    #[test]
    fn uid_cache_is_bounded() {
        let cache = UidCache::with_limit(2);
        cache.insert("uid=a,dc=example", "a");
        cache.insert("uid=b,dc=example", "b");
        assert_eq!(cache.len(), 2);

        // Replacing a known DN keeps the others.
        cache.insert("UID=B,dc=example", "bee");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("uid=a,dc=example").as_deref(), Some("a"));

        cache.insert("uid=c,dc=example", "c");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("uid=a,dc=example"), None);
        assert_eq!(cache.get("uid=c,dc=example").as_deref(), Some("c"));
        assert_eq!(UidCache::default().limit(), UID_CACHE_LIMIT);
    }

    #[test]
    fn bad_template_is_not_found() {
        let (dir, resolver) = resolver();
        let spec = SearchSpec::new("(cn=%s)", ["cn"], None);
        let mut buf = [0u8; 16];
        let res = resolver.lookup(
            &spec,
            &[],
            parser_fn(|_, _, _| Ok(())),
            &mut buf,
        );
        assert_eq!(res, Response::NotFound);
        assert_eq!(dir.stats().searches, 0);
    }

    #[test]
    fn close_unbinds() {
        let (dir, resolver) = resolver();
        let spec = SearchSpec::new("(cn=staff)", ["cn"], None);
        let mut buf = [0u8; 16];
        let res = resolver.lookup(
            &spec,
            &[],
            parser_fn(|_, _, _| Ok(())),
            &mut buf,
        );
        assert!(res.is_success());
        assert!(resolver.with_session(|session| session.is_open()));
        resolver.close();
        assert!(!resolver.with_session(|session| session.is_open()));
        assert_eq!(dir.stats().unbinds, 1);
    }
}
