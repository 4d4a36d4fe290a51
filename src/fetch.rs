//! Delegated-file retrieval
//!
//! Each RIR publishes a daily `delegated-<rir>-extended-<date>` file plus an
//! `.md5` companion. This module resolves the per-registry endpoint, pulls
//! the payload, verifies its digest, and falls back across a small window of
//! candidate dates when `latest` is not available.

use anyhow::{anyhow, Result};
use chrono::{Days, NaiveDate};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::normalizer::Registry;

/// Transport used for registry downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchScheme {
    #[default]
    Https,
    Http,
}

impl FetchScheme {
    fn as_str(&self) -> &'static str {
        match self {
            FetchScheme::Https => "https",
            FetchScheme::Http => "http",
        }
    }
}

/// Host and path prefix for one registry's statistics archive.
#[derive(Debug, Clone, Copy)]
pub struct RegistryEndpoint {
    pub host: &'static str,
    pub path: &'static str,
}

/// Number of dated candidates tried after `latest`, starting today.
pub const DATE_FALLBACK_WINDOW: u64 = 5;

/// Archive locations per registry. RIPE NCC serves its statistics from the
/// ftp host over HTTP(S) rather than from a `www.ripe.net` path.
pub fn endpoint(registry: Registry) -> RegistryEndpoint {
    match registry {
        Registry::Arin => RegistryEndpoint {
            host: "ftp.arin.net",
            path: "/pub/stats/arin",
        },
        Registry::Apnic => RegistryEndpoint {
            host: "ftp.apnic.net",
            path: "/pub/stats/apnic",
        },
        Registry::Afrinic => RegistryEndpoint {
            host: "ftp.afrinic.net",
            path: "/pub/stats/afrinic",
        },
        Registry::Lacnic => RegistryEndpoint {
            host: "ftp.lacnic.net",
            path: "/pub/stats/lacnic",
        },
        Registry::RipeNcc => RegistryEndpoint {
            host: "ftp.ripe.net",
            path: "/pub/stats/ripencc",
        },
    }
}

/// File name of the extended delegation file for a date string
/// (`latest` or `YYYYMMDD`).
pub fn data_file_name(registry: Registry, datestr: &str) -> String {
    format!("delegated-{}-extended-{}", registry.name(), datestr)
}

/// Full URL of the data file for one registry and date string.
pub fn data_url(registry: Registry, datestr: &str, scheme: FetchScheme) -> String {
    let ep = endpoint(registry);
    format!(
        "{}://{}{}/{}",
        scheme.as_str(),
        ep.host,
        ep.path,
        data_file_name(registry, datestr)
    )
}

/// Source of delegation payloads, separated out so the refresh engine can be
/// driven from canned payloads in tests.
pub trait RegistrySource {
    /// Fetch and verify the payload for one registry and date string.
    fn fetch(&self, registry: Registry, datestr: &str) -> Result<String>;
}

/// Network-backed source with md5 verification against the published
/// checksum companion file.
pub struct HttpSource {
    scheme: FetchScheme,
}

impl HttpSource {
    pub fn new(scheme: FetchScheme) -> Self {
        Self { scheme }
    }
}

impl RegistrySource for HttpSource {
    fn fetch(&self, registry: Registry, datestr: &str) -> Result<String> {
        let url = data_url(registry, datestr, self.scheme);
        debug!("fetching {}", url);
        let payload = oneio::read_to_string(url.as_str())
            .map_err(|e| anyhow!("failed to fetch {}: {}", url, e))?;

        let checksum_url = format!("{}.md5", url);
        let checksum_body = oneio::read_to_string(checksum_url.as_str())
            .map_err(|e| anyhow!("failed to fetch {}: {}", checksum_url, e))?;
        verify_checksum(&payload, &checksum_body)
            .map_err(|e| anyhow!("checksum verification failed for {}: {}", url, e))?;
        Ok(payload)
    }
}

/// Compare the payload's md5 digest against the published checksum file.
fn verify_checksum(payload: &str, checksum_body: &str) -> Result<()> {
    let expected =
        extract_md5(checksum_body).ok_or_else(|| anyhow!("no md5 digest in checksum file"))?;
    let actual = format!("{:x}", md5::compute(payload.as_bytes()));
    if actual != expected {
        return Err(anyhow!("expected {}, got {}", expected, actual));
    }
    Ok(())
}

/// Pull the 32-hex-digit digest out of a checksum file. The registries
/// format these differently (BSD `MD5 (file) = digest` vs `digest  file`),
/// so match the digest itself rather than the wrapper.
fn extract_md5(body: &str) -> Option<String> {
    let re = Regex::new(r"\b[0-9a-fA-F]{32}\b").ok()?;
    re.find(body).map(|m| m.as_str().to_lowercase())
}

/// Fetch one registry's delegation file, trying `latest` first and then
/// dated names for `today` and the next few days. Registries roll their
/// file names in their own timezones, so a date ahead of local time can be
/// the current one.
pub fn fetch_with_fallback(
    source: &dyn RegistrySource,
    registry: Registry,
    today: NaiveDate,
) -> Result<String> {
    let mut candidates = vec!["latest".to_string()];
    for offset in 0..DATE_FALLBACK_WINDOW {
        if let Some(date) = today.checked_add_days(Days::new(offset)) {
            candidates.push(date.format("%Y%m%d").to_string());
        }
    }

    let mut last_err = None;
    for datestr in &candidates {
        match source.fetch(registry, datestr) {
            Ok(payload) => {
                info!(
                    "fetched {} ({} bytes)",
                    data_file_name(registry, datestr),
                    payload.len()
                );
                return Ok(payload);
            }
            Err(e) => {
                warn!("{}: {}", data_file_name(registry, datestr), e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("no fetch candidates for {}", registry.name())))
}
