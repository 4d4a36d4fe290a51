//! Country code repository
//!
//! Lookup table joined against the rir table's `cc` column. Refreshed by
//! full replacement; the two non-ISO pseudo-codes used by registry data
//! (`EU`, `AP`) are always injected regardless of feed content.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::info;

/// A country entry with code and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct CountryEntry {
    /// ISO 3166-1 alpha-2 code, or one of the `EU`/`AP` pseudo-codes.
    pub code: String,
    pub name: String,
}

/// Pseudo-codes that appear in registry data but not in ISO 3166.
pub const PSEUDO_COUNTRY_CODES: [(&str, &str); 2] = [
    ("EU", "non-iso3166:Europe"),
    ("AP", "non-iso3166:Asia-Pacific"),
];

pub struct CountryCodeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> CountryCodeRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn initialize_schema(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS country_codes (
                    cc TEXT NOT NULL,
                    name TEXT NOT NULL
                )",
                [],
            )
            .map_err(|e| anyhow!("Failed to create country_codes table: {}", e))?;
        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_country_codes_cc ON country_codes(cc)",
                [],
            )
            .map_err(|e| anyhow!("Failed to create country_codes index: {}", e))?;
        Ok(())
    }

    /// Replace the whole table with a fresh set of entries, atomically.
    ///
    /// The `EU`/`AP` pseudo-codes are appended unconditionally.
    pub fn replace_all(&self, entries: &[CountryEntry]) -> Result<usize> {
        self.initialize_schema()?;

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;

        tx.execute("DELETE FROM country_codes", [])?;

        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare("INSERT INTO country_codes (cc, name) VALUES (?1, ?2)")?;
            for entry in entries {
                stmt.execute(params![entry.code, entry.name])?;
                inserted += 1;
            }
            for (code, name) in PSEUDO_COUNTRY_CODES {
                stmt.execute(params![code, name])?;
                inserted += 1;
            }
        }

        tx.commit()
            .map_err(|e| anyhow!("Failed to commit country code refresh: {}", e))?;

        info!("replaced {} country codes", inserted);
        Ok(inserted)
    }

    /// Name for a two-letter code, case-insensitive on the query side.
    pub fn lookup(&self, code: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT name FROM country_codes WHERE cc = ?1",
            [code.to_uppercase()],
            |row| row.get(0),
        );
        match result {
            Ok(name) => Ok(Some(name)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!("Failed to look up country code: {}", e)),
        }
    }

    /// Search by exact code or name substring. An exact code match returns
    /// only that entry.
    pub fn search(&self, query: &str) -> Result<Vec<CountryEntry>> {
        if let Some(name) = self.lookup(query)? {
            return Ok(vec![CountryEntry {
                code: query.to_uppercase(),
                name,
            }]);
        }

        let mut stmt = self.conn.prepare(
            "SELECT cc, name FROM country_codes WHERE name LIKE ?1 ORDER BY cc",
        )?;
        let rows = stmt.query_map([format!("%{}%", query)], |row| {
            Ok(CountryEntry {
                code: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// All entries sorted by code.
    pub fn all(&self) -> Result<Vec<CountryEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cc, name FROM country_codes ORDER BY cc")?;
        let rows = stmt.query_map([], |row| {
            Ok(CountryEntry {
                code: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
