use anyhow::{anyhow, Result};
use config::Config;
use std::collections::HashMap;
use std::path::Path;

/// Default source for the ISO 3166 country list.
pub const DEFAULT_COUNTRY_LIST_URL: &str =
    "https://raw.githubusercontent.com/datasets/country-list/master/data.csv";

pub struct RirscopeConfig {
    /// Path to the directory holding the database and fetch stamp
    pub data_dir: String,

    /// URL of the `Name,Code` CSV used to refresh country names
    pub country_list_url: String,
}

const EMPTY_CONFIG: &str = r#"### rirscope configuration file

### directory for data stored by rirscope
# data_dir = "~/.rirscope"

### source of the ISO 3166 country list (Name,Code CSV)
# country_list_url = "https://raw.githubusercontent.com/datasets/country-list/master/data.csv"
"#;

impl Default for RirscopeConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            data_dir: format!("{}/.rirscope", home_dir),
            country_list_url: DEFAULT_COUNTRY_LIST_URL.to_string(),
        }
    }
}

impl RirscopeConfig {
    /// Create and initialize a new configuration.
    ///
    /// Reads `~/.rirscope/rirscope.toml` by default (creating a commented
    /// template if missing), or the given path. `RIRSCOPE_*` environment
    /// variables override file values.
    pub fn new(path: &Option<String>) -> Result<RirscopeConfig> {
        let mut builder = Config::builder();

        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        let rirscope_dir = format!("{}/.rirscope", home_dir.as_str());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(rirscope_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create rirscope directory: {}", e))?;
                let p = format!("{}/rirscope.toml", rirscope_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g. `RIRSCOPE_DATA_DIR=/tmp/rirscope rirscope ...`
        builder = builder.add_source(config::Environment::with_prefix("RIRSCOPE"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        let data_dir = match config.get("data_dir") {
            Some(p) => p.trim_end_matches('/').to_string(),
            None => rirscope_dir,
        };
        std::fs::create_dir_all(data_dir.as_str())
            .map_err(|e| anyhow!("Unable to create data directory {}: {}", data_dir, e))?;

        let country_list_url = config
            .get("country_list_url")
            .cloned()
            .unwrap_or_else(|| DEFAULT_COUNTRY_LIST_URL.to_string());

        Ok(RirscopeConfig {
            data_dir,
            country_list_url,
        })
    }

    /// Path to the SQLite database file
    pub fn sqlite_path(&self) -> String {
        let data_dir = self.data_dir.trim_end_matches('/');
        format!("{}/rirscope-data.sqlite3", data_dir)
    }

    /// Path to the stamp file recording the last refresh date
    pub fn last_fetch_path(&self) -> String {
        let data_dir = self.data_dir.trim_end_matches('/');
        format!("{}/lastfetchdate", data_dir)
    }
}
