#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Rirscope - IP country attribution from RIR delegation data
//!
//! Rirscope downloads the extended delegation statistics published by the
//! five Regional Internet Registries, stores them in a local SQLite
//! database, and answers the question "which country is this address
//! delegated to" for three practical jobs: summarizing firewall logs by
//! country, generating country-based ACLs for several device dialects, and
//! looking up country codes and names.
//!
//! # Architecture
//!
//! - **[`normalizer`]**: parses RIR extended-format files into records
//! - **[`fetch`]**: registry endpoints, md5 verification, date fallback
//! - **[`refresh`]**: pulls all registries and replaces database rows
//! - **[`database`]**: SQLite storage (delegation records, country codes)
//! - **[`index`]**: longest-prefix-match index over the stored ranges
//! - **[`classify`]**: firewall log parsing and per-country counting
//! - **[`acl`]**: ACL generation (iptables, ASA, switch, router, ip list)
//! - **[`family`]**: shared IPv4/IPv6 handling
//! - **[`config`]**: configuration file and environment overrides

pub mod acl;
pub mod classify;
pub mod config;
pub mod database;
pub mod family;
pub mod fetch;
pub mod index;
pub mod normalizer;
pub mod refresh;

pub use crate::acl::{render as render_acl, AclDialect, AclOptions};
pub use crate::classify::{Classifier, ClassifyOptions, CountKey, Direction, LogDialect, TopN};
pub use crate::config::RirscopeConfig;
pub use crate::database::{CountryFilter, DatabaseConn, RangeRow};
pub use crate::family::AddressFamily;
pub use crate::fetch::{FetchScheme, HttpSource, RegistrySource};
pub use crate::index::{Attribution, RangeIndex};
pub use crate::normalizer::{parse_payload, Registry, RirRecord, ALL_REGISTRIES};
pub use crate::refresh::{refresh_all, refresh_country_codes, RegistryRefresh};
