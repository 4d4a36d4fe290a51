//! Refresh engine
//!
//! Pulls each registry's delegation file, normalizes it, and replaces that
//! registry's database rows. A failed registry is logged and skipped so one
//! unreachable archive never blocks the other four. The country-code table
//! refreshes from a `Name,Code` CSV feed.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::database::{CountryCodeRepository, CountryEntry, RirRepository};
use crate::fetch::{fetch_with_fallback, RegistrySource};
use crate::normalizer::{parse_payload, Registry, ALL_REGISTRIES};

/// Outcome of one registry's refresh.
#[derive(Debug, Clone)]
pub struct RegistryRefresh {
    pub registry: Registry,
    pub records: usize,
    pub skipped: usize,
}

/// Refresh every registry in `registries` from `source`.
///
/// `today` anchors the dated fallback window when a registry's `latest`
/// file is unavailable. Returns a summary per registry that succeeded;
/// failures are logged and leave that registry's existing rows untouched.
pub fn refresh_registries(
    conn: &Connection,
    source: &dyn RegistrySource,
    registries: &[Registry],
    today: NaiveDate,
) -> Result<Vec<RegistryRefresh>> {
    let repo = RirRepository::new(conn);
    let mut results = Vec::new();

    for &registry in registries {
        let payload = match fetch_with_fallback(source, registry, today) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping {}: {}", registry, e);
                continue;
            }
        };

        let (records, summary) = parse_payload(registry, &payload);
        if records.is_empty() {
            // an empty feed would wipe the registry's rows; keep what we have
            warn!(
                "skipping {}: payload produced no records ({} lines skipped)",
                registry, summary.skipped
            );
            continue;
        }

        match repo.replace_registry(registry, &records, summary) {
            Ok(summary) => {
                results.push(RegistryRefresh {
                    registry,
                    records: records.len(),
                    skipped: summary.skipped,
                });
            }
            Err(e) => warn!("skipping {}: {}", registry, e),
        }
    }

    info!(
        "refreshed {} of {} registries",
        results.len(),
        registries.len()
    );
    Ok(results)
}

/// Refresh all five registries.
pub fn refresh_all(
    conn: &Connection,
    source: &dyn RegistrySource,
    today: NaiveDate,
) -> Result<Vec<RegistryRefresh>> {
    refresh_registries(conn, source, &ALL_REGISTRIES, today)
}

/// Replace the country-code table from a CSV feed with `Name,Code` rows.
///
/// Returns the number of entries stored, pseudo-codes included.
pub fn refresh_country_codes(conn: &Connection, url: &str) -> Result<usize> {
    let body = oneio::read_to_string(url)
        .map_err(|e| anyhow!("failed to fetch country list from {}: {}", url, e))?;
    let entries = parse_country_csv(&body)?;
    if entries.is_empty() {
        return Err(anyhow!("country list from {} contained no rows", url));
    }
    let repo = CountryCodeRepository::new(conn);
    let stored = repo.replace_all(&entries)?;
    info!("stored {} country codes", stored);
    Ok(stored)
}

fn parse_country_csv(body: &str) -> Result<Vec<CountryEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body.as_bytes());
    let mut entries = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| anyhow!("malformed country list row: {}", e))?;
        let (name, code) = match (record.get(0), record.get(1)) {
            (Some(name), Some(code)) => (name.trim(), code.trim()),
            _ => continue,
        };
        if name.is_empty() || code.is_empty() {
            continue;
        }
        entries.push(CountryEntry {
            code: code.to_uppercase(),
            name: name.to_string(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseConn;
    use crate::fetch::RegistrySource;

    struct FixedSource {
        payloads: Vec<(Registry, String)>,
    }

    impl RegistrySource for FixedSource {
        fn fetch(&self, registry: Registry, datestr: &str) -> Result<String> {
            if datestr != "latest" {
                return Err(anyhow!("not found"));
            }
            self.payloads
                .iter()
                .find(|(r, _)| *r == registry)
                .map(|(_, p)| p.clone())
                .ok_or_else(|| anyhow!("unreachable"))
        }
    }

    fn arin_payload() -> String {
        [
            "2.3|arin|20260829|2|19840101|20260829|+0000",
            "arin|*|ipv4|*|1|summary",
            "arin|US|ipv4|8.0.0.0|16777216|19921201|allocated|id1",
            "arin|US|ipv6|2620:101:c000::|40|20110801|allocated|id2",
        ]
        .join("\n")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()
    }

    #[test]
    fn test_refresh_stores_records() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let source = FixedSource {
            payloads: vec![(Registry::Arin, arin_payload())],
        };
        let results =
            refresh_registries(&db.conn, &source, &[Registry::Arin], today()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].records, 2);

        let repo = RirRepository::new(&db.conn);
        assert_eq!(repo.registry_count(Registry::Arin).unwrap(), 2);
    }

    #[test]
    fn test_failed_registry_is_skipped() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let source = FixedSource {
            payloads: vec![(Registry::Arin, arin_payload())],
        };
        // apnic has no payload and must not abort the run
        let results = refresh_registries(
            &db.conn,
            &source,
            &[Registry::Apnic, Registry::Arin],
            today(),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry, Registry::Arin);
    }

    #[test]
    fn test_empty_payload_preserves_existing_rows() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let good = FixedSource {
            payloads: vec![(Registry::Arin, arin_payload())],
        };
        refresh_registries(&db.conn, &good, &[Registry::Arin], today()).unwrap();

        // a comment-only payload parses to zero records
        let empty = FixedSource {
            payloads: vec![(Registry::Arin, "# nothing today\n".to_string())],
        };
        let results =
            refresh_registries(&db.conn, &empty, &[Registry::Arin], today()).unwrap();
        assert!(results.is_empty());

        let repo = RirRepository::new(&db.conn);
        assert_eq!(repo.registry_count(Registry::Arin).unwrap(), 2);
    }

    #[test]
    fn test_parse_country_csv() {
        let body = "Name,Code\nCanada,ca\n\"Korea, Republic of\",KR\n,\n";
        let entries = parse_country_csv(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, "CA");
        assert_eq!(entries[0].name, "Canada");
        assert_eq!(entries[1].name, "Korea, Republic of");
        assert_eq!(entries[1].code, "KR");
    }
}
