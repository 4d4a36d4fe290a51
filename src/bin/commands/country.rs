use anyhow::{anyhow, Result};
use clap::Args;
use rirscope::database::{CountryCodeRepository, CountryEntry};
use rirscope::RirscopeConfig;
use tabled::settings::Style;
use tabled::Table;

use super::open_existing_db;

/// Arguments for the Country command
#[derive(Args)]
pub struct CountryArgs {
    /// Search query, e.g. "US" or "United States"
    pub queries: Vec<String>,

    /// List every known country code
    #[clap(long, conflicts_with = "queries")]
    pub all: bool,
}

pub fn run(config: &RirscopeConfig, args: CountryArgs) -> Result<()> {
    if !args.all && args.queries.is_empty() {
        return Err(anyhow!("give one or more queries, or --all"));
    }

    let db = open_existing_db(config)?;
    let repo = CountryCodeRepository::new(&db.conn);

    let res: Vec<CountryEntry> = if args.all {
        repo.all()?
    } else {
        let mut res = Vec::new();
        for query in &args.queries {
            res.extend(repo.search(query)?);
        }
        res
    };

    if res.is_empty() {
        return Err(anyhow!("no matching country; run `rirscope refresh` to update the list"));
    }

    println!("{}", Table::new(res).with(Style::rounded()));
    Ok(())
}
