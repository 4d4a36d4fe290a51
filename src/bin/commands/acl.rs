use anyhow::{anyhow, Result};
use clap::{ArgGroup, Args};
use rirscope::database::RirRepository;
use rirscope::{render_acl, AclDialect, AclOptions, AddressFamily, CountryFilter, RirscopeConfig};

use super::open_existing_db;

/// Arguments for the Acl command
#[derive(Args)]
#[clap(group(ArgGroup::new("dialect").required(true)))]
pub struct AclArgs {
    /// Emit a bare CIDR list
    #[clap(long, group = "dialect")]
    pub iplist: bool,

    /// Emit iptables rules
    #[clap(long, group = "dialect")]
    pub iptables: bool,

    /// Emit Cisco ASA object-groups and access-lists
    #[clap(long, group = "dialect")]
    pub asa: bool,

    /// Emit Cisco switch extended ACLs
    #[clap(long, group = "dialect")]
    pub switch: bool,

    /// Emit Cisco router prefix-lists
    #[clap(long, group = "dialect")]
    pub router: bool,

    /// Include IPv4 ranges (the default when no family is given)
    #[clap(long)]
    pub ipv4: bool,

    /// Include IPv6 ranges
    #[clap(long)]
    pub ipv6: bool,

    /// Jump target for iptables rules
    #[clap(long, default_value = "DROP")]
    pub dropchain: String,

    /// Switch dialect: also deny traffic to each range
    #[clap(long)]
    pub bidir: bool,

    /// Restrict to one two-letter country code
    #[clap(long, conflicts_with = "country")]
    pub cc: Option<String>,

    /// Restrict to countries whose name starts with this prefix
    #[clap(long)]
    pub country: Option<String>,
}

impl AclArgs {
    fn dialect(&self) -> Result<AclDialect> {
        if self.iplist {
            Ok(AclDialect::IpList)
        } else if self.iptables {
            Ok(AclDialect::Iptables)
        } else if self.asa {
            Ok(AclDialect::Asa)
        } else if self.switch {
            Ok(AclDialect::Switch)
        } else if self.router {
            Ok(AclDialect::Router)
        } else {
            // unreachable: the clap group requires one dialect
            Err(anyhow!("no output dialect given"))
        }
    }

    fn filter(&self) -> CountryFilter {
        if let Some(cc) = &self.cc {
            CountryFilter::Code(cc.clone())
        } else if let Some(prefix) = &self.country {
            CountryFilter::NamePrefix(prefix.clone())
        } else {
            CountryFilter::All
        }
    }
}

pub fn run(config: &RirscopeConfig, args: AclArgs) -> Result<()> {
    let mut families = Vec::new();
    if args.ipv4 {
        families.push(AddressFamily::Ipv4);
    }
    if args.ipv6 {
        families.push(AddressFamily::Ipv6);
    }
    if families.is_empty() {
        families.push(AddressFamily::Ipv4);
    }

    let dialect = args.dialect()?;
    let options = AclOptions {
        families,
        drop_chain: args.dropchain.clone(),
        bidir: args.bidir,
    };

    let db = open_existing_db(config)?;
    let repo = RirRepository::new(&db.conn);
    let rows = repo.query_ranges(&options.families, &args.filter())?;
    if rows.is_empty() {
        return Err(anyhow!("no ranges matched; check the filter or refresh"));
    }

    let output = render_acl(dialect, &rows, &options)?;
    print!("{}", output);
    Ok(())
}
