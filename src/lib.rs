//! A directory-backed name service resolver.
//!
//! This crate provides the core of a name service module that answers
//! queries for users, groups, hosts, and the like by searching a directory
//! server. It keeps a single session to the directory per process, retries
//! a failed search once after reconnecting, walks through search results
//! one record at a time for enumerations, and packs every record into a
//! buffer supplied by the caller rather than allocating.
//!
//! The crate doesn’t speak the directory protocol itself. A connector
//! implementing the traits of the [conn] module provides access to the
//! server. With the `ldap3` feature, such a connector based on the
//! [ldap3](https://github.com/inejge/ldap3) crate is available. For
//! testing, the `memory` feature provides a directory kept in memory.
//!
//! # Modules
//!
//! * [resolver] contains [`Resolver`], the context through which all
//!   lookups and enumerations happen,
//! * [session] manages the connection to the directory,
//! * [search] executes searches with a bounded retry,
//! * [enumerate] keeps the state of an enumeration,
//! * [arena] packs strings and string arrays into the caller’s buffer,
//! * [assemble] and [parse] provide what record-specific parsers need,
//! * [filter] builds and evaluates search filters,
//! * [conf] reads the configuration, and
//! * [status] contains the status values returned to the caller.
//!
//! # Reference of Feature Flags
//!
//! * `dns`: Enables discovering directory servers through DNS SRV records
//!   via the stub resolver of the [domain](https://github.com/NLnetLabs/domain)
//!   crate when there is no configuration file. This adds the
#![cfg_attr(feature = "dns", doc = "  [dns]")]
#![cfg_attr(not(feature = "dns"), doc = "  dns")]
//!   module.
//! * `ldap3`: Enables the
#![cfg_attr(feature = "ldap3", doc = "  [ldap]")]
#![cfg_attr(not(feature = "ldap3"), doc = "  ldap")]
//!   module with a connector based on the `ldap3` crate.
//! * `memory`: Enables the
#![cfg_attr(feature = "memory", doc = "  [memory]")]
#![cfg_attr(not(feature = "memory"), doc = "  memory")]
//!   module with a directory kept in memory for testing, together with
//!   the filter evaluator it needs.
//! * `serde`: Enables serializing and deserializing the configuration via
//!   [serde](https://serde.rs/).

#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod arena;
pub mod assemble;
pub mod conf;
pub mod conn;
#[cfg(feature = "dns")]
#[cfg_attr(docsrs, doc(cfg(feature = "dns")))]
pub mod dns;
pub mod enumerate;
pub mod filter;
#[cfg(feature = "ldap3")]
#[cfg_attr(docsrs, doc(cfg(feature = "ldap3")))]
pub mod ldap;
#[cfg(any(test, feature = "memory"))]
#[cfg_attr(docsrs, doc(cfg(feature = "memory")))]
pub mod memory;
pub mod parse;
pub mod resolver;
pub mod search;
pub mod session;
pub mod status;

pub use self::resolver::Resolver;
pub use self::status::{Response, Status};
