//! Database module
//!
//! SQLite storage for the toolkit, organized into:
//!
//! - **connection**: the `DatabaseConn` rusqlite wrapper
//! - **rir**: the delegation record store (per-registry replacement, ordered
//!   range queries)
//! - **country**: the country code lookup table
//!
//! Every run owns its connection exclusively; refreshes are delete-then-
//! reinsert inside one transaction per registry, so readers never observe a
//! half-replaced registry.

pub mod connection;
pub mod country;
pub mod rir;

pub use connection::DatabaseConn;
pub use country::{CountryCodeRepository, CountryEntry, PSEUDO_COUNTRY_CODES};
pub use rir::{CountryFilter, RangeRow, RirRepository, RirSchemaDefinitions};

use anyhow::Result;
use rusqlite::Connection;

/// Create all tables and indexes if they do not exist yet.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    RirRepository::new(conn).initialize_schema()?;
    CountryCodeRepository::new(conn).initialize_schema()?;
    Ok(())
}
