//! Shared fixtures: a sample directory and record parsers.

#![allow(dead_code)]

use nss_ldap::arena::{Arena, StrArrayRef, StrRef};
use nss_ldap::assemble::{
    assign_attr_val, assign_attr_vals, assign_passwd, assign_rdn_value,
};
use nss_ldap::conf::{Config, Endpoint, Map};
use nss_ldap::conn::Entry;
use nss_ldap::memory::MemoryDirectory;
use nss_ldap::parse::{
    EntryParser, ParseContext, ParseError, ParseResult, ParseState,
};
use nss_ldap::search::SearchSpec;

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .try_init()
        .ok();
}

pub fn config(hosts: &[&str]) -> Config {
    let mut conf = Config::new();
    conf.endpoints = hosts.iter().map(|host| Endpoint::new(*host)).collect();
    conf.base = Some("dc=example,dc=com".into());
    conf.bind_dn = Some("cn=proxy,dc=example,dc=com".into());
    conf.bind_pw = Some("proxypw".into());
    conf
}

pub fn user(uid: &str, number: u32) -> Entry {
    Entry::new(format!("uid={},ou=People,dc=example,dc=com", uid))
        .with_attr("objectClass", ["top", "posixAccount"])
        .with_attr("uid", [uid])
        .with_attr("cn", [uid])
        .with_attr("userPassword", [format!("{{CRYPT}}$1${}", uid)])
        .with_attr("uidNumber", [number.to_string()])
        .with_attr("gidNumber", ["100"])
        .with_attr("homeDirectory", [format!("/home/{}", uid)])
        .with_attr("loginShell", ["/bin/sh"])
}

pub fn group(cn: &str, gid: u32, members: &[&str]) -> Entry {
    Entry::new(format!("cn={},ou=Group,dc=example,dc=com", cn))
        .with_attr("objectClass", ["top", "posixGroup"])
        .with_attr("cn", [cn])
        .with_attr("gidNumber", [gid.to_string()])
        .with_attr("memberUid", members.iter().copied())
}

pub fn service(cn: &str, port: u16, protocols: &[&str]) -> Entry {
    Entry::new(format!("cn={},ou=Services,dc=example,dc=com", cn))
        .with_attr("objectClass", ["top", "ipService"])
        .with_attr("cn", [cn])
        .with_attr("ipServicePort", [port.to_string()])
        .with_attr("ipServiceProtocol", protocols.iter().copied())
}

/// A directory with three users, two groups, and two services.
pub fn directory() -> MemoryDirectory {
    let dir = MemoryDirectory::new();
    dir.add(user("alice", 1000));
    dir.add(user("bob", 1001));
    dir.add(user("carol", 1002));
    dir.add(group("staff", 100, &["alice", "bob", "carol"]));
    dir.add(group("wheel", 10, &["alice"]));
    dir.add(service("ssh", 22, &["tcp"]));
    dir.add(service("domain", 53, &["tcp", "udp"]));
    dir
}

//------------ Passwd --------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct Passwd {
    pub name: StrRef,
    pub passwd: StrRef,
    pub uid: u32,
    pub gid: u32,
    pub dir: StrRef,
    pub shell: StrRef,

    /// Octets of the buffer used by the record.
    pub used: usize,
}

pub fn passwd_spec() -> SearchSpec {
    SearchSpec::new(
        "(&(objectClass=posixAccount)(uid=%s))",
        Vec::<String>::new(),
        Some(Map::Passwd),
    )
}

pub fn passwd_all() -> SearchSpec {
    SearchSpec::new(
        "(objectClass=posixAccount)",
        Vec::<String>::new(),
        Some(Map::Passwd),
    )
}

pub struct PasswdParser;

impl EntryParser for PasswdParser {
    type Record = Passwd;

    fn parse(
        &mut self,
        entry: &Entry,
        state: &mut ParseState,
        cx: &mut ParseContext<'_, '_>,
    ) -> ParseResult<Passwd> {
        state.finish();
        let name = assign_attr_val(cx.arena(), entry, "uid")?;
        let passwd = assign_passwd(cx.arena(), entry, "userPassword")?;
        let uid = number(entry, "uidNumber")?;
        let gid = number(entry, "gidNumber")?;
        let dir = assign_attr_val(cx.arena(), entry, "homeDirectory")?;
        let shell = assign_attr_val(cx.arena(), entry, "loginShell")?;
        Ok(Passwd {
            name,
            passwd,
            uid,
            gid,
            dir,
            shell,
            used: cx.arena().used(),
        })
    }
}

//------------ Group ---------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct Group {
    pub name: StrRef,
    pub gid: u32,
    pub members: StrArrayRef,
}

pub fn group_all() -> SearchSpec {
    SearchSpec::new(
        "(objectClass=posixGroup)",
        ["cn", "gidNumber", "memberUid"],
        Some(Map::Group),
    )
}

pub struct GroupParser;

impl EntryParser for GroupParser {
    type Record = Group;

    fn parse(
        &mut self,
        entry: &Entry,
        state: &mut ParseState,
        cx: &mut ParseContext<'_, '_>,
    ) -> ParseResult<Group> {
        state.finish();
        Ok(Group {
            name: assign_rdn_value(cx.arena(), entry, "cn")?,
            gid: number(entry, "gidNumber")?,
            members: assign_attr_vals(cx.arena(), entry, "memberUid", None)?,
        })
    }
}

//------------ Service -------------------------------------------------------

/// A service record, one per protocol of a service entry.
#[derive(Clone, Copy, Debug)]
pub struct Service {
    pub name: StrRef,
    pub port: u16,
    pub proto: StrRef,
}

pub fn service_all() -> SearchSpec {
    SearchSpec::new("(objectClass=ipService)", Vec::<String>::new(), None)
}

pub fn service_by_name() -> SearchSpec {
    SearchSpec::new(
        "(&(objectClass=ipService)(cn=%s)(ipServiceProtocol=%s))",
        Vec::<String>::new(),
        Some(Map::Services),
    )
}

/// Produces one record per protocol.
///
/// If the state carries a key, only that protocol is produced.
pub struct ServiceParser;

impl EntryParser for ServiceParser {
    type Record = Service;

    fn parse(
        &mut self,
        entry: &Entry,
        state: &mut ParseState,
        cx: &mut ParseContext<'_, '_>,
    ) -> ParseResult<Service> {
        let protocols = entry.values("ipServiceProtocol");
        let idx = match state.key() {
            Some(key) => protocols
                .iter()
                .position(|proto| proto.eq_ignore_ascii_case(key))
                .ok_or(ParseError::NotFound)?,
            None => state.index().unwrap_or(0),
        };
        let proto = protocols.get(idx).ok_or(ParseError::NotFound)?;
        let name = assign_rdn_value(cx.arena(), entry, "cn")?;
        let port = number(entry, "ipServicePort")?;
        let proto = cx.arena().copy_str(proto)?;
        if state.key().is_none() && idx + 1 < protocols.len() {
            state.resume_at(idx + 1);
        } else {
            state.finish();
        }
        Ok(Service { name, port, proto })
    }
}

//------------ Helpers -------------------------------------------------------

fn number<T: std::str::FromStr>(entry: &Entry, attr: &str) -> ParseResult<T> {
    entry
        .first_value(attr)
        .and_then(|value| value.parse().ok())
        .ok_or(ParseError::NotFound)
}

/// Resolves a string handle against a buffer.
pub fn text(buf: &mut [u8], item: StrRef) -> String {
    Arena::new(buf).get_str(item).unwrap().to_string()
}

/// Resolves a string array handle against a buffer.
pub fn texts(buf: &mut [u8], array: StrArrayRef) -> Vec<String> {
    Arena::new(buf)
        .get_str_array(array)
        .map(String::from)
        .collect()
}
