//! Directory server discovery through DNS.
//!
//! Without a configuration file, the servers are taken from the
//! `_ldap._tcp` SRV records of the host’s DNS domain. The domain is the
//! first entry of the search list in the system resolver configuration.
//! Queries go through the stub resolver of the
//! [domain](https://github.com/NLnetLabs/domain) crate.

use crate::conf::Endpoint;
use domain::base::iana::Rtype;
use domain::base::Name;
use domain::rdata::Srv;
use domain::resolv::stub::conf::ResolvConf;
use domain::resolv::StubResolver;
use std::io;
use std::str::FromStr;
use tracing::{debug, trace};

//------------ search_domain -------------------------------------------------

/// Returns the DNS domain of this host.
///
/// This is the first search domain of the system resolver configuration,
/// without its trailing dot.
pub fn search_domain() -> Option<String> {
    let conf = ResolvConf::default();
    let domain = conf.options.search.get(0)?.to_string();
    let domain = domain.trim_end_matches('.');
    if domain.is_empty() {
        None
    } else {
        Some(domain.into())
    }
}

//------------ lookup_srv ----------------------------------------------------

/// Looks up the SRV records for `qname`.
///
/// Returns the targets in order of preference. A target of the root name,
/// which announces that the service is not available, is skipped.
pub fn lookup_srv(qname: &str) -> Result<Vec<Endpoint>, io::Error> {
    let name = Name::<Vec<u8>>::from_str(qname).map_err(|err| {
        io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
    })?;
    let answer = StubResolver::run(move |stub| async move {
        stub.query((name, Rtype::SRV)).await
    })?;
    let records = answer.answer().map_err(invalid_data)?;
    let mut targets = Vec::new();
    for record in records.limit_to::<Srv<_>>() {
        let record = record.map_err(invalid_data)?;
        let data = record.data();
        targets.push(Target {
            priority: data.priority(),
            weight: data.weight(),
            host: data.target().to_string(),
            port: data.port(),
        });
    }
    trace!(qname, count = targets.len(), "SRV answer");
    let res = order(targets);
    if res.is_empty() {
        debug!(qname, "no usable SRV records");
    }
    Ok(res)
}

fn invalid_data(err: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

//------------ Target --------------------------------------------------------

/// The relevant content of an SRV record.
#[derive(Clone, Debug)]
struct Target {
    priority: u16,
    weight: u16,
    host: String,
    port: u16,
}

/// Orders targets by priority and, within a priority, heavier first.
fn order(mut targets: Vec<Target>) -> Vec<Endpoint> {
    targets.sort_by(|left, right| {
        left.priority
            .cmp(&right.priority)
            .then(right.weight.cmp(&left.weight))
    });
    targets
        .into_iter()
        .filter_map(|target| {
            let host = target.host.trim_end_matches('.');
            if host.is_empty() {
                None
            } else {
                Some(Endpoint::with_port(host, target.port))
            }
        })
        .collect()
}

//============ Testing =======================================================
