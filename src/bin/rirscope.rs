use clap::{Parser, Subcommand};
use rirscope::RirscopeConfig;
use tracing::Level;

mod commands;

use commands::{acl, country, logstats, refresh};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.rirscope/rirscope.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the RIR delegation files and rebuild the local database
    Refresh(refresh::RefreshArgs),
    /// Summarize firewall log lines by originating country
    Logstats(logstats::LogstatsArgs),
    /// Generate country-based deny ACLs from the stored ranges
    Acl(acl::AclArgs),
    /// Look up country codes and names
    Country(country::CountryArgs),
}

fn main() {
    // usage errors exit 1; --help/--version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let use_stderr = e.use_stderr();
            let _ = e.print();
            std::process::exit(if use_stderr { 1 } else { 0 });
        }
    };

    if cli.debug {
        tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    }

    let config = match RirscopeConfig::new(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Refresh(args) => refresh::run(&config, args),
        Commands::Logstats(args) => logstats::run(&config, args),
        Commands::Acl(args) => acl::run(&config, args),
        Commands::Country(args) => country::run(&config, args),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}
