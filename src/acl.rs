//! ACL emitters
//!
//! Renders the ordered range query into country-based deny rules in one of
//! several device dialects. Rows arrive pre-sorted by `cc, type, start`;
//! the emitters detect country boundaries by comparing each row's code to
//! the previous one, so output order always follows the query order.
//!
//! The switch and router dialects bind rules to a single named list per
//! country and therefore accept exactly one address family per invocation;
//! the iptables and ASA dialects accept both at once.

use std::fmt::Write as _;
use std::net::Ipv4Addr;

use anyhow::{anyhow, Result};
use ipnet::IpNet;

use crate::database::RangeRow;
use crate::family::AddressFamily;

/// Output dialect for ACL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDialect {
    /// Bare CIDR list, one per line.
    IpList,
    /// iptables `-A` rules with per-country comment headers.
    Iptables,
    /// Cisco ASA object-groups plus ingress/egress access-lists.
    Asa,
    /// Cisco switch extended ACLs with sequence numbers.
    Switch,
    /// Cisco router prefix-lists.
    Router,
}

/// Options shared by all dialects.
#[derive(Debug, Clone)]
pub struct AclOptions {
    pub families: Vec<AddressFamily>,
    /// Jump target for the iptables dialect.
    pub drop_chain: String,
    /// Switch dialect: also deny traffic *to* each range.
    pub bidir: bool,
}

impl Default for AclOptions {
    fn default() -> Self {
        Self {
            families: vec![AddressFamily::Ipv4],
            drop_chain: "DROP".to_string(),
            bidir: false,
        }
    }
}

const SEQ_START: u32 = 10;
const SEQ_STEP: u32 = 10;

/// Render `rows` in the requested dialect.
///
/// Family validation happens before anything is emitted: an empty family
/// set is always an error, and the switch/router dialects reject requests
/// naming both families.
pub fn render(dialect: AclDialect, rows: &[RangeRow], options: &AclOptions) -> Result<String> {
    if options.families.is_empty() {
        return Err(anyhow!("at least one address family is required"));
    }
    let single_family = match dialect {
        AclDialect::Switch | AclDialect::Router => {
            if options.families.len() != 1 {
                return Err(anyhow!(
                    "the switch and router dialects cannot mix IPv4 and IPv6 in one run; \
                     pass exactly one address family"
                ));
            }
            Some(options.families[0])
        }
        _ => None,
    };

    let mut out = String::new();
    match dialect {
        AclDialect::IpList => render_iplist(&mut out, rows),
        AclDialect::Iptables => render_iptables(&mut out, rows, &options.drop_chain),
        AclDialect::Asa => render_asa(&mut out, rows),
        AclDialect::Switch => {
            // single_family is always set for this dialect
            if let Some(family) = single_family {
                render_switch(&mut out, rows, family, options.bidir);
            }
        }
        AclDialect::Router => {
            if let Some(family) = single_family {
                render_router(&mut out, rows, family);
            }
        }
    }
    Ok(out)
}

/// Dotted-quad netmask for an IPv4 prefix length.
fn dotted_mask(prefix_len: u8) -> Ipv4Addr {
    let bits = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    };
    Ipv4Addr::from(bits)
}

/// Deny wildcard: the bitwise complement of the netmask.
fn wildcard_mask(prefix_len: u8) -> Ipv4Addr {
    let mask = u32::from(dotted_mask(prefix_len));
    Ipv4Addr::from(!mask)
}

fn render_iplist(out: &mut String, rows: &[RangeRow]) {
    for row in rows {
        let _ = writeln!(out, "{}", row.net);
    }
}

fn render_iptables(out: &mut String, rows: &[RangeRow], drop_chain: &str) {
    let mut last_cc = "";
    for row in rows {
        if row.cc != last_cc {
            let _ = writeln!(out);
            let _ = writeln!(out, "# {}: {}", row.cc, row.country);
            last_cc = &row.cc;
        }
        let _ = writeln!(out, "-A INPUT -p ip -s {} -j {}", row.net, drop_chain);
    }
}

fn render_asa(out: &mut String, rows: &[RangeRow]) {
    // first pass: all object-groups
    let mut objects: Vec<String> = Vec::new();
    let mut last_cc = "";
    for row in rows {
        if row.cc != last_cc {
            let object = format!("CountryCode:{}", row.cc);
            let _ = writeln!(out);
            let _ = writeln!(out, "! {}: {}", row.cc, row.country);
            let _ = writeln!(out, "object-group network {}", object);
            objects.push(object);
            last_cc = &row.cc;
        }
        match row.net {
            IpNet::V4(v4) => {
                let _ = writeln!(
                    out,
                    "    network-object {} {}",
                    v4.network(),
                    dotted_mask(v4.prefix_len())
                );
            }
            IpNet::V6(v6) => {
                let _ = writeln!(out, "    network-object {}", v6);
            }
        }
    }

    // second pass: access-lists, only after every object-group is out
    let _ = writeln!(out, "!");
    let _ = writeln!(out, "!");
    for object in &objects {
        let _ = writeln!(
            out,
            "access-list deny_country_ingress extended deny ip object-group {} any",
            object
        );
    }
    let _ = writeln!(out, "!");
    let _ = writeln!(out, "!");
    for object in &objects {
        let _ = writeln!(
            out,
            "access-list deny_country_egress extended deny ip any object-group {}",
            object
        );
    }
}

fn render_switch(out: &mut String, rows: &[RangeRow], family: AddressFamily, bidir: bool) {
    let proto = match family {
        AddressFamily::Ipv4 => "ip",
        AddressFamily::Ipv6 => "ipv6",
    };

    let mut last_cc = "";
    let mut seq = SEQ_START;
    for row in rows {
        if row.cc != last_cc {
            // close out the previous country before starting the next
            if !last_cc.is_empty() {
                let _ = writeln!(out, " {} permit {} any any", seq, proto);
            }
            let _ = writeln!(out, "!");
            let _ = writeln!(out, "! {}: {}", row.cc, row.country);
            match family {
                AddressFamily::Ipv4 => {
                    let _ = writeln!(out, "ip access-list extended deny-country-{}", row.cc);
                }
                AddressFamily::Ipv6 => {
                    let _ = writeln!(out, "ipv6 access-list deny-country-{}", row.cc);
                }
            }
            last_cc = &row.cc;
            seq = SEQ_START;
        }
        match row.net {
            IpNet::V4(v4) => {
                let wildcard = wildcard_mask(v4.prefix_len());
                let _ = writeln!(out, " {} deny ip {} {} any", seq, v4.network(), wildcard);
                seq += SEQ_STEP;
                if bidir {
                    let _ = writeln!(out, " {} deny ip any {} {}", seq, v4.network(), wildcard);
                    seq += SEQ_STEP;
                }
            }
            IpNet::V6(v6) => {
                let _ = writeln!(out, " {} deny ipv6 {} any", seq, v6);
                seq += SEQ_STEP;
                if bidir {
                    let _ = writeln!(out, " {} deny ipv6 any {}", seq, v6);
                    seq += SEQ_STEP;
                }
            }
        }
    }
    if !last_cc.is_empty() {
        let _ = writeln!(out, " {} permit {} any any", seq, proto);
    }
}

fn render_router(out: &mut String, rows: &[RangeRow], family: AddressFamily) {
    let keyword = match family {
        AddressFamily::Ipv4 => "ip",
        AddressFamily::Ipv6 => "ipv6",
    };

    let mut last_cc = "";
    let mut seq = SEQ_START;
    for row in rows {
        if row.cc != last_cc {
            let _ = writeln!(out, "!");
            let _ = writeln!(out, "! {}: {}", row.cc, row.country);
            last_cc = &row.cc;
            seq = SEQ_START;
        }
        let _ = writeln!(
            out,
            "{} prefix-list deny-country-{} seq {} deny {}",
            keyword, row.cc, seq, row.net
        );
        seq += SEQ_STEP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cc: &str, country: &str, net: &str) -> RangeRow {
        let net: IpNet = net.parse().unwrap();
        RangeRow {
            cc: cc.to_string(),
            country: country.to_string(),
            family: match net {
                IpNet::V4(_) => AddressFamily::Ipv4,
                IpNet::V6(_) => AddressFamily::Ipv6,
            },
            net,
        }
    }

    fn sample_rows() -> Vec<RangeRow> {
        vec![
            row("US", "United States", "8.0.0.0/8"),
            row("US", "United States", "12.0.0.0/8"),
            row("CA", "Canada", "9.0.0.0/8"),
        ]
    }

    fn v4_options() -> AclOptions {
        AclOptions::default()
    }

    #[test]
    fn test_masks() {
        assert_eq!(dotted_mask(8).to_string(), "255.0.0.0");
        assert_eq!(dotted_mask(12).to_string(), "255.240.0.0");
        assert_eq!(dotted_mask(32).to_string(), "255.255.255.255");
        assert_eq!(dotted_mask(0).to_string(), "0.0.0.0");
        assert_eq!(wildcard_mask(8).to_string(), "0.255.255.255");
        assert_eq!(wildcard_mask(24).to_string(), "0.0.0.255");
    }

    #[test]
    fn test_iplist_is_bare_cidrs() {
        let out = render(AclDialect::IpList, &sample_rows(), &v4_options()).unwrap();
        assert_eq!(out, "8.0.0.0/8\n12.0.0.0/8\n9.0.0.0/8\n");
    }

    #[test]
    fn test_iptables_one_header_per_country() {
        let out = render(AclDialect::Iptables, &sample_rows(), &v4_options()).unwrap();
        assert_eq!(out.matches("# US: United States").count(), 1);
        assert_eq!(out.matches("# CA: Canada").count(), 1);
        assert!(out.contains("-A INPUT -p ip -s 8.0.0.0/8 -j DROP"));
        assert!(out.contains("-A INPUT -p ip -s 12.0.0.0/8 -j DROP"));
        // the US header precedes both US rules, which precede the CA header
        let us_header = out.find("# US:").unwrap();
        let second_us_rule = out.find("-s 12.0.0.0/8").unwrap();
        let ca_header = out.find("# CA:").unwrap();
        assert!(us_header < second_us_rule);
        assert!(second_us_rule < ca_header);
    }

    #[test]
    fn test_iptables_custom_drop_chain() {
        let options = AclOptions {
            drop_chain: "COUNTRY_DROP".to_string(),
            ..v4_options()
        };
        let out = render(AclDialect::Iptables, &sample_rows(), &options).unwrap();
        assert!(out.contains("-j COUNTRY_DROP"));
        assert!(!out.contains("-j DROP"));
    }

    #[test]
    fn test_asa_two_pass_invariant() {
        let out = render(AclDialect::Asa, &sample_rows(), &v4_options()).unwrap();
        assert!(out.contains("object-group network CountryCode:US"));
        assert!(out.contains("    network-object 8.0.0.0 255.0.0.0"));

        // every object-group precedes every access-list line
        let last_object = out.rfind("object-group network").unwrap();
        let first_acl = out.find("access-list deny_country_ingress").unwrap();
        assert!(last_object < first_acl);

        // ingress lines all precede egress lines
        let last_ingress = out.rfind("deny_country_ingress").unwrap();
        let first_egress = out.find("deny_country_egress").unwrap();
        assert!(last_ingress < first_egress);

        assert!(out
            .contains("access-list deny_country_ingress extended deny ip object-group CountryCode:CA any"));
        assert!(out
            .contains("access-list deny_country_egress extended deny ip any object-group CountryCode:CA"));
    }

    #[test]
    fn test_asa_mixed_families() {
        let rows = vec![
            row("US", "United States", "8.0.0.0/8"),
            row("US", "United States", "2620:101:c000::/40"),
        ];
        let options = AclOptions {
            families: vec![AddressFamily::Ipv4, AddressFamily::Ipv6],
            ..v4_options()
        };
        let out = render(AclDialect::Asa, &rows, &options).unwrap();
        assert!(out.contains("    network-object 8.0.0.0 255.0.0.0"));
        assert!(out.contains("    network-object 2620:101:c000::/40"));
        // both families share the one object-group
        assert_eq!(out.matches("object-group network").count(), 1);
    }

    #[test]
    fn test_switch_sequencing_and_permit() {
        let out = render(AclDialect::Switch, &sample_rows(), &v4_options()).unwrap();
        assert!(out.contains("ip access-list extended deny-country-US"));
        assert!(out.contains(" 10 deny ip 8.0.0.0 0.255.255.255 any"));
        assert!(out.contains(" 20 deny ip 12.0.0.0 0.255.255.255 any"));
        // sequence resets to 10 for the next country
        assert!(out.contains(" 10 deny ip 9.0.0.0 0.255.255.255 any"));
        // one trailing permit per country, after its denies
        assert_eq!(out.matches("permit ip any any").count(), 2);
        assert!(out.contains(" 30 permit ip any any"));
        assert!(out.contains(" 20 permit ip any any"));
        let us_permit = out.find(" 30 permit ip any any").unwrap();
        let ca_acl = out.find("deny-country-CA").unwrap();
        assert!(us_permit < ca_acl);
    }

    #[test]
    fn test_switch_bidir_pairs() {
        let rows = vec![row("US", "United States", "8.0.0.0/8")];
        let options = AclOptions {
            bidir: true,
            ..v4_options()
        };
        let out = render(AclDialect::Switch, &rows, &options).unwrap();
        assert!(out.contains(" 10 deny ip 8.0.0.0 0.255.255.255 any"));
        assert!(out.contains(" 20 deny ip any 8.0.0.0 0.255.255.255"));
        assert!(out.contains(" 30 permit ip any any"));
    }

    #[test]
    fn test_switch_ipv6() {
        let rows = vec![row("DE", "Germany", "2001:db8::/32")];
        let options = AclOptions {
            families: vec![AddressFamily::Ipv6],
            ..v4_options()
        };
        let out = render(AclDialect::Switch, &rows, &options).unwrap();
        assert!(out.contains("ipv6 access-list deny-country-DE"));
        assert!(out.contains(" 10 deny ipv6 2001:db8::/32 any"));
        assert!(out.contains(" 20 permit ipv6 any any"));
    }

    #[test]
    fn test_router_prefix_lists() {
        let out = render(AclDialect::Router, &sample_rows(), &v4_options()).unwrap();
        assert!(out.contains("ip prefix-list deny-country-US seq 10 deny 8.0.0.0/8"));
        assert!(out.contains("ip prefix-list deny-country-US seq 20 deny 12.0.0.0/8"));
        assert!(out.contains("ip prefix-list deny-country-CA seq 10 deny 9.0.0.0/8"));
    }

    #[test]
    fn test_single_family_dialects_reject_both() {
        let options = AclOptions {
            families: vec![AddressFamily::Ipv4, AddressFamily::Ipv6],
            ..v4_options()
        };
        for dialect in [AclDialect::Switch, AclDialect::Router] {
            let err = render(dialect, &sample_rows(), &options).unwrap_err();
            assert!(err.to_string().contains("exactly one address family"));
        }
        // iptables and asa accept both
        assert!(render(AclDialect::Iptables, &sample_rows(), &options).is_ok());
        assert!(render(AclDialect::Asa, &sample_rows(), &options).is_ok());
    }

    #[test]
    fn test_empty_families_rejected() {
        let options = AclOptions {
            families: vec![],
            ..v4_options()
        };
        assert!(render(AclDialect::IpList, &sample_rows(), &options).is_err());
    }

    #[test]
    fn test_empty_rows_render_empty() {
        let out = render(AclDialect::Iptables, &[], &v4_options()).unwrap();
        assert!(out.is_empty());
        let out = render(AclDialect::Switch, &[], &v4_options()).unwrap();
        assert!(out.is_empty());
    }
}
