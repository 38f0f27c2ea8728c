#![cfg(feature = "memory")]

mod common;

use common::{
    config, directory, group_all, init_logging, passwd_all, service_all, text,
    texts, GroupParser, PasswdParser, ServiceParser,
};
use nss_ldap::conn::ResultCode;
use nss_ldap::memory::MemoryDirectory;
use nss_ldap::{Resolver, Response};

fn resolver(dir: &MemoryDirectory) -> Resolver<MemoryDirectory> {
    init_logging();
    Resolver::with_source(dir.clone(), config(&["ldap1"]))
}

#[test]
fn walks_all_entries() {
    let dir = directory();
    let resolver = resolver(&dir);
    let mut cursor = resolver.enum_start(passwd_all());
    assert_eq!(dir.stats().searches, 0);

    let mut names = Vec::new();
    let mut buf = [0u8; 128];
    while let Response::Success(pw) =
        resolver.enum_next(&mut cursor, PasswdParser, &mut buf)
    {
        names.push(text(&mut buf, pw.name));
    }
    assert_eq!(names, ["alice", "bob", "carol"]);
    assert_eq!(dir.stats().searches, 1);
}

#[test]
fn short_buffer_keeps_position() {
    let dir = directory();
    let resolver = resolver(&dir);
    let mut cursor = resolver.enum_start(group_all());

    // The member list of the first group doesn’t fit.
    let mut small = [0u8; 24];
    let res = resolver.enum_next(&mut cursor, GroupParser, &mut small);
    assert!(matches!(res, Response::TryAgain));
    assert_eq!(res.errno(), Some(libc::ERANGE));
    assert_eq!(cursor.position(), 0);
    assert!(!cursor.is_empty());

    let mut buf = [0u8; 128];
    let group = resolver
        .enum_next(&mut cursor, GroupParser, &mut buf)
        .ok()
        .unwrap();
    assert_eq!(text(&mut buf, group.name), "staff");
    assert_eq!(group.gid, 100);
    assert_eq!(texts(&mut buf, group.members), ["alice", "bob", "carol"]);

    let group = resolver
        .enum_next(&mut cursor, GroupParser, &mut buf)
        .ok()
        .unwrap();
    assert_eq!(text(&mut buf, group.name), "wheel");

    // Retrying didn’t search again.
    assert_eq!(dir.stats().searches, 1);
}

#[test]
fn exhausted_enumeration_starts_over() {
    let dir = directory();
    let resolver = resolver(&dir);
    let mut cursor = resolver.enum_start(passwd_all());
    let mut buf = [0u8; 128];
    for _ in 0..3 {
        assert!(resolver
            .enum_next(&mut cursor, PasswdParser, &mut buf)
            .is_success());
    }
    let res = resolver.enum_next(&mut cursor, PasswdParser, &mut buf);
    assert!(matches!(res, Response::NotFound));
    assert!(cursor.is_empty());
    assert_eq!(cursor.position(), 0);

    // Changes made in between are visible after starting over.
    dir.remove("uid=alice,ou=People,dc=example,dc=com");
    let pw = resolver
        .enum_next(&mut cursor, PasswdParser, &mut buf)
        .ok()
        .unwrap();
    assert_eq!(text(&mut buf, pw.name), "bob");
    assert_eq!(dir.stats().searches, 2);
}

#[test]
fn several_records_per_entry() {
    let dir = directory();
    let resolver = resolver(&dir);
    let mut cursor = resolver.enum_start(service_all());
    let mut seen = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        match resolver.enum_next(&mut cursor, ServiceParser, &mut buf) {
            Response::Success(svc) => seen.push((
                text(&mut buf, svc.name),
                svc.port,
                text(&mut buf, svc.proto),
            )),
            Response::NotFound => break,
            other => panic!("unexpected response {:?}", other.status()),
        }
    }
    assert_eq!(
        seen,
        [
            ("ssh".to_string(), 22, "tcp".to_string()),
            ("domain".to_string(), 53, "tcp".to_string()),
            ("domain".to_string(), 53, "udp".to_string()),
        ]
    );
}

#[test]
fn short_buffer_within_entry() {
    let dir = directory();
    let resolver = resolver(&dir);
    let mut cursor = resolver.enum_start(service_all());
    let mut buf = [0u8; 64];

    // ssh/tcp and domain/tcp.
    for _ in 0..2 {
        assert!(resolver
            .enum_next(&mut cursor, ServiceParser, &mut buf)
            .is_success());
    }
    assert_eq!(cursor.state().index(), Some(1));

    let mut small = [0u8; 4];
    assert!(matches!(
        resolver.enum_next(&mut cursor, ServiceParser, &mut small),
        Response::TryAgain
    ));
    assert_eq!(cursor.state().index(), Some(1));

    let svc = resolver
        .enum_next(&mut cursor, ServiceParser, &mut buf)
        .ok()
        .unwrap();
    assert_eq!(text(&mut buf, svc.proto), "udp");
}

#[test]
fn declined_entries_are_skipped() {
    let dir = directory();
    dir.add(
        nss_ldap::conn::Entry::new("uid=broken,ou=People,dc=example,dc=com")
            .with_attr("objectClass", ["posixAccount"])
            .with_attr("uid", ["broken"]),
    );
    dir.add(common::user("dave", 1003));
    let resolver = resolver(&dir);
    let mut cursor = resolver.enum_start(passwd_all());
    let mut names = Vec::new();
    let mut buf = [0u8; 128];
    while let Response::Success(pw) =
        resolver.enum_next(&mut cursor, PasswdParser, &mut buf)
    {
        names.push(text(&mut buf, pw.name));
    }
    assert_eq!(names, ["alice", "bob", "carol", "dave"]);
}

#[test]
fn stop_releases_entries() {
    let dir = directory();
    let resolver = resolver(&dir);
    let mut cursor = resolver.enum_start(passwd_all());
    let mut buf = [0u8; 128];
    assert!(resolver
        .enum_next(&mut cursor, PasswdParser, &mut buf)
        .is_success());
    resolver.enum_stop(cursor);

    let mut cursor = resolver.enum_start(passwd_all());
    let pw = resolver
        .enum_next(&mut cursor, PasswdParser, &mut buf)
        .ok()
        .unwrap();
    assert_eq!(text(&mut buf, pw.name), "alice");
    assert_eq!(dir.stats().searches, 2);
}

#[test]
fn unavailable_directory() {
    let dir = directory();
    let resolver = resolver(&dir);
    dir.fail_searches([ResultCode::Busy, ResultCode::Busy]);
    let mut cursor = resolver.enum_start(passwd_all());
    let mut buf = [0u8; 128];
    let res = resolver.enum_next(&mut cursor, PasswdParser, &mut buf);
    assert!(matches!(res, Response::Unavailable));
    assert!(cursor.is_empty());

    // The next step searches again.
    assert!(resolver
        .enum_next(&mut cursor, PasswdParser, &mut buf)
        .is_success());
    assert_eq!(dir.stats().searches, 3);
}
