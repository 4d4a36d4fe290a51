use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::{anyhow, Result};
use clap::{ArgGroup, Args};
use rirscope::database::RirRepository;
use rirscope::{
    AddressFamily, Classifier, ClassifyOptions, CountKey, CountryFilter, Direction, LogDialect,
    RangeIndex, RirscopeConfig, TopN,
};

use super::open_existing_db;

/// Arguments for the Logstats command
#[derive(Args)]
#[clap(group(ArgGroup::new("input").required(true)))]
pub struct LogstatsArgs {
    /// iptables LOG file to summarize, '-' for stdin
    #[clap(long, value_name = "FILE", group = "input")]
    pub iptables: Option<String>,

    /// Cisco ASA log file to summarize, '-' for stdin
    #[clap(long, value_name = "FILE", group = "input")]
    pub asa: Option<String>,

    /// ipfilter log file to summarize, '-' for stdin
    #[clap(long, value_name = "FILE", group = "input")]
    pub ipf: Option<String>,

    /// Count ASA permitted (Built) connections instead of denies
    #[clap(long)]
    pub asa_allow: bool,

    /// Include IPv4 addresses (the default when no family is given)
    #[clap(long)]
    pub ipv4: bool,

    /// Include IPv6 addresses
    #[clap(long)]
    pub ipv6: bool,

    /// Count source addresses (the default)
    #[clap(long, conflicts_with = "dst")]
    pub src: bool,

    /// Count destination addresses instead of sources
    #[clap(long)]
    pub dst: bool,

    /// Count individual addresses instead of countries
    #[clap(long)]
    pub addresses: bool,

    /// Number of report rows, or 'all'
    #[clap(long, default_value = "10")]
    pub top: TopN,
}

fn families(ipv4: bool, ipv6: bool) -> Vec<AddressFamily> {
    let mut families = Vec::new();
    if ipv4 {
        families.push(AddressFamily::Ipv4);
    }
    if ipv6 {
        families.push(AddressFamily::Ipv6);
    }
    if families.is_empty() {
        families.push(AddressFamily::Ipv4);
    }
    families
}

fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).map_err(|e| anyhow!("cannot read {}: {}", path, e))?;
    Ok(Box::new(BufReader::new(file)))
}

pub fn run(config: &RirscopeConfig, args: LogstatsArgs) -> Result<()> {
    let (dialect, path) = if let Some(path) = &args.iptables {
        (LogDialect::Iptables, path)
    } else if let Some(path) = &args.asa {
        (
            LogDialect::Asa {
                allow: args.asa_allow,
            },
            path,
        )
    } else if let Some(path) = &args.ipf {
        (LogDialect::Ipf, path)
    } else {
        // unreachable: the clap group requires one input
        return Err(anyhow!("no input file given"));
    };

    if args.asa_allow && args.asa.is_none() {
        return Err(anyhow!("--asa-allow only applies to --asa input"));
    }

    let options = ClassifyOptions {
        dialect,
        direction: if args.dst {
            Direction::Dst
        } else {
            Direction::Src
        },
        families: families(args.ipv4, args.ipv6),
        key: if args.addresses {
            CountKey::Address
        } else {
            CountKey::Country
        },
    };

    // open the input before building the index so a bad path fails fast
    let input = open_input(path)?;

    let db = open_existing_db(config)?;
    let repo = RirRepository::new(&db.conn);
    let rows = repo.query_ranges(&options.families, &CountryFilter::All)?;
    let index = RangeIndex::from_rows(&rows);
    if index.is_empty() {
        return Err(anyhow!(
            "the database holds no address ranges; run `rirscope refresh` first"
        ));
    }

    let report = Classifier::new(&index).classify(input, &options)?;
    print!("{}", report.render(&options.title(), args.top));
    Ok(())
}
