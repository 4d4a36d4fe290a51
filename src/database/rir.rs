//! RIR delegation repository
//!
//! SQLite-backed storage for normalized [`RirRecord`]s. Each registry's rows
//! are fully replaced inside one transaction on refresh, so a failed refresh
//! of one registry never disturbs another's data.
//!
//! The `start_key` column holds the 16-byte address sort key computed by the
//! normalizer (IPv4 in IPv6-mapped form). It exists purely so ordered range
//! queries need no per-query address parsing; it is never rendered.

use anyhow::{anyhow, Result};
use ipnet::IpNet;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::family::AddressFamily;
use crate::normalizer::{NormalizeSummary, Registry, RirRecord};

/// SQL schema definitions for the rir table.
pub struct RirSchemaDefinitions;

impl RirSchemaDefinitions {
    pub const RIR_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS rir (
            registry TEXT NOT NULL,
            cc TEXT NOT NULL,
            type TEXT NOT NULL,
            start TEXT NOT NULL,
            start_key BLOB,
            value TEXT NOT NULL,
            cidr TEXT,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            reg_id TEXT
        );
    "#;

    pub const RIR_INDEXES: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_rir_registry ON rir(registry)",
        "CREATE INDEX IF NOT EXISTS idx_rir_cc ON rir(cc)",
        "CREATE INDEX IF NOT EXISTS idx_rir_type_status ON rir(type, status)",
    ];
}

/// Country filter applied to range queries.
#[derive(Debug, Clone, Default)]
pub enum CountryFilter {
    /// No filtering, all countries.
    #[default]
    All,
    /// Exact two-letter code match.
    Code(String),
    /// Country name prefix match (case follows the stored names).
    NamePrefix(String),
}

/// One row of the ordered range query: the input unit for both the range
/// index and the ACL emitters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeRow {
    pub cc: String,
    /// Resolved country name, or the `unknown:<cc>` placeholder when the
    /// code has no entry in the country table.
    pub country: String,
    pub net: IpNet,
    pub family: AddressFamily,
}

/// Repository for RIR delegation data.
pub struct RirRepository<'a> {
    conn: &'a Connection,
}

impl<'a> RirRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn initialize_schema(&self) -> Result<()> {
        self.conn
            .execute(RirSchemaDefinitions::RIR_TABLE, [])
            .map_err(|e| anyhow!("Failed to create rir table: {}", e))?;
        for index_sql in RirSchemaDefinitions::RIR_INDEXES {
            self.conn
                .execute(index_sql, [])
                .map_err(|e| anyhow!("Failed to create rir index: {}", e))?;
        }
        Ok(())
    }

    pub fn tables_exist(&self) -> bool {
        let exists: i32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='rir'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        exists > 0
    }

    /// Replace one registry's rows with a fresh batch, atomically.
    ///
    /// Delete and reinsert happen inside a single transaction: a failure at
    /// any point rolls back and leaves the previous rows intact, and other
    /// registries' rows are never touched.
    pub fn replace_registry(
        &self,
        registry: Registry,
        records: &[RirRecord],
        summary: NormalizeSummary,
    ) -> Result<NormalizeSummary> {
        self.initialize_schema()?;

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;

        tx.execute("DELETE FROM rir WHERE registry = ?1", [registry.name()])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO rir (registry, cc, type, start, start_key, value, cidr, date, status, reg_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.registry.name(),
                    record.cc,
                    record.kind.table_value(),
                    record.start,
                    record.start_key.as_ref().map(|k| k.as_slice()),
                    record.value,
                    record.cidr,
                    record.date,
                    record.status.table_value(),
                    record.reg_id,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| anyhow!("Failed to commit {} refresh: {}", registry, e))?;

        info!(
            "replaced {} rows for {} ({} lines skipped)",
            records.len(),
            registry,
            summary.skipped
        );
        Ok(summary)
    }

    /// Ordered range query, the shared input of the range index and the ACL
    /// emitters.
    ///
    /// Returns `allocated`/`assigned` address rows joined against the country
    /// table, ordered by `cc, type, start_key` so rows arrive grouped by
    /// country with numerically ascending start addresses.
    pub fn query_ranges(
        &self,
        families: &[AddressFamily],
        filter: &CountryFilter,
    ) -> Result<Vec<RangeRow>> {
        if !self.tables_exist() {
            return Ok(Vec::new());
        }
        if families.is_empty() {
            return Err(anyhow!("at least one address family is required"));
        }

        let type_list = families
            .iter()
            .map(|f| format!("'{}'", f.table_value()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT rir.cc, country_codes.name, rir.cidr, rir.type
             FROM rir
             LEFT JOIN country_codes ON country_codes.cc = rir.cc
             WHERE rir.type IN ({})
             AND rir.status IN ('allocated', 'assigned')",
            type_list
        );

        let param: Option<String> = match filter {
            CountryFilter::All => None,
            CountryFilter::Code(code) => {
                sql.push_str(" AND rir.cc = ?1");
                Some(code.to_uppercase())
            }
            CountryFilter::NamePrefix(prefix) => {
                sql.push_str(" AND country_codes.name LIKE ?1");
                Some(format!("{}%", prefix))
            }
        };

        sql.push_str(" ORDER BY rir.cc, rir.type, rir.start_key ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, Option<String>, Option<String>, String)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        };
        let rows: Vec<_> = match &param {
            Some(p) => stmt
                .query_map([p], map_row)?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<_>>()?,
        };

        let mut results = Vec::with_capacity(rows.len());
        for (cc, name, cidr, kind) in rows {
            let family: AddressFamily = match kind.parse() {
                Ok(f) => f,
                Err(_) => continue,
            };
            let Some(cidr) = cidr else { continue };
            let net: IpNet = match cidr.parse() {
                Ok(net) => net,
                Err(e) => {
                    debug!("dropping unparsable stored cidr '{}': {}", cidr, e);
                    continue;
                }
            };
            let country = name.unwrap_or_else(|| format!("unknown:{}", cc));
            results.push(RangeRow {
                cc,
                country,
                net,
                family,
            });
        }

        Ok(results)
    }

    /// Row count for one registry.
    pub fn registry_count(&self, registry: Registry) -> Result<u64> {
        if !self.tables_exist() {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rir WHERE registry = ?1",
            [registry.name()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Total row count across all registries.
    pub fn record_count(&self) -> Result<u64> {
        if !self.tables_exist() {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rir", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
