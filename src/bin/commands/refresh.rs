use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Args;
use rirscope::{
    refresh_all, refresh_country_codes, DatabaseConn, FetchScheme, HttpSource, RirscopeConfig,
};

/// Arguments for the Refresh command
#[derive(Args)]
pub struct RefreshArgs {
    /// Fetch over plain HTTP instead of HTTPS
    #[clap(long)]
    pub http: bool,

    /// Refresh even if a refresh already ran today
    #[clap(long, short)]
    pub force: bool,
}

/// True when the stamp file records a refresh for the given date.
fn refreshed_on(stamp_path: &str, stamp: &str) -> bool {
    match std::fs::read_to_string(stamp_path) {
        Ok(previous) => previous.trim() == stamp,
        Err(_) => false,
    }
}

pub fn run(config: &RirscopeConfig, args: RefreshArgs) -> Result<()> {
    let today = Local::now().date_naive();
    let stamp = today.format("%Y%m%d").to_string();
    let stamp_path = config.last_fetch_path();

    if !args.force && refreshed_on(&stamp_path, &stamp) {
        println!("already refreshed today; pass --force to refresh again");
        return Ok(());
    }

    let db = DatabaseConn::open_path(&config.sqlite_path())?;
    rirscope::database::initialize_schema(&db.conn)?;
    let scheme = if args.http {
        FetchScheme::Http
    } else {
        FetchScheme::Https
    };
    let source = HttpSource::new(scheme);

    let results = refresh_all(&db.conn, &source, today)?;
    if results.is_empty() {
        return Err(anyhow!("no registry could be refreshed"));
    }
    for result in &results {
        println!(
            "{}: {} records stored, {} lines skipped",
            result.registry, result.records, result.skipped
        );
    }

    let countries = refresh_country_codes(&db.conn, &config.country_list_url)?;
    println!("country codes: {} stored", countries);

    std::fs::write(&stamp_path, &stamp)
        .map_err(|e| anyhow!("failed to write {}: {}", stamp_path, e))?;
    Ok(())
}
