#![cfg(feature = "memory")]

mod common;

use common::{
    config, directory, group_all, init_logging, passwd_spec, text, texts,
    GroupParser, PasswdParser,
};
use nss_ldap::filter::Arg;
use nss_ldap::memory::MemoryDirectory;
use nss_ldap::{Resolver, Response};
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const ROUNDS: usize = 25;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn resolver_is_send_and_sync() {
    assert_send_sync::<Resolver<MemoryDirectory>>();
}

#[test]
fn threads_share_one_session() {
    init_logging();
    let dir = directory();
    let resolver =
        Arc::new(Resolver::with_source(dir.clone(), config(&["ldap1"])));
    let users = [("alice", 1000), ("bob", 1001), ("carol", 1002)];

    let handles: Vec<_> = (0..THREADS)
        .map(|idx| {
            let resolver = resolver.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let (name, uid) = users[(idx + round) % users.len()];
                    let mut buf = [0u8; 128];
                    let pw = resolver
                        .lookup(
                            &passwd_spec(),
                            &[Arg::Str(name)],
                            PasswdParser,
                            &mut buf,
                        )
                        .ok()
                        .unwrap();
                    assert_eq!(pw.uid, uid);
                    assert_eq!(text(&mut buf, pw.name), name);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = dir.stats();
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.binds, 1);
    assert_eq!(stats.searches, THREADS * ROUNDS);
}

#[test]
fn enumerations_on_separate_threads() {
    init_logging();
    let dir = directory();
    let resolver =
        Arc::new(Resolver::with_source(dir.clone(), config(&["ldap1"])));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let resolver = resolver.clone();
            thread::spawn(move || {
                let mut cursor = resolver.enum_start(group_all());
                let mut names = Vec::new();
                loop {
                    let mut buf = [0u8; 256];
                    let res =
                        resolver.enum_next(&mut cursor, GroupParser, &mut buf);
                    match res {
                        Response::Success(group) => {
                            assert!(!texts(&mut buf, group.members).is_empty());
                            names.push(text(&mut buf, group.name));
                        }
                        Response::NotFound => break,
                        other => panic!("unexpected {:?}", other.status()),
                    }
                }
                resolver.enum_stop(cursor);
                names
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), ["staff", "wheel"]);
    }
    assert_eq!(dir.stats().connects, 1);
    assert_eq!(dir.stats().searches, THREADS);
}
