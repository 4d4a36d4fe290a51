pub mod acl;
pub mod country;
pub mod logstats;
pub mod refresh;

use anyhow::{anyhow, Result};
use rirscope::{DatabaseConn, RirscopeConfig};

/// Open the database for a read-only command, failing with a hint when it
/// has never been populated.
pub(crate) fn open_existing_db(config: &RirscopeConfig) -> Result<DatabaseConn> {
    let path = config.sqlite_path();
    if !std::path::Path::new(&path).exists() {
        return Err(anyhow!(
            "no database at {}; run `rirscope refresh` first",
            path
        ));
    }
    DatabaseConn::open_path(&path)
}
