//! Log classifier
//!
//! Extracts candidate addresses from firewall log lines in one of several
//! device dialects, attributes them through the [`RangeIndex`], and
//! accumulates a frequency table by country (or by raw address).
//!
//! Non-matching lines are silently skipped; addresses the index cannot
//! attribute are dropped and do not count toward the total. The IPv4
//! RFC1918 ranges are always filtered out before lookup.
//!
//! The IPv6 patterns accept only the uncompressed 8-group form (fixed
//! four-hex-digit groups); `::`-compressed addresses are not extracted.
//! This mirrors the device output the dialects were written against and is
//! a known limitation, asserted as such in the tests.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::BufRead;
use std::str::FromStr;

use anyhow::{anyhow, Error, Result};
use regex::Regex;

use crate::family::AddressFamily;
use crate::index::RangeIndex;

/// Supported log-line dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDialect {
    /// Linux iptables kernel log lines (`SRC=.. DST=..`).
    Iptables,
    /// Cisco ASA syslog. `allow: false` matches "Deny" lines,
    /// `allow: true` matches "Built" connection lines (policy-allowed).
    Asa { allow: bool },
    /// BSD ipfilter log lines (`ip,port -> ip,port`).
    Ipf,
}

impl LogDialect {
    pub const fn label(&self) -> &'static str {
        match self {
            LogDialect::Iptables => "IPTABLES",
            LogDialect::Asa { .. } => "ASA",
            LogDialect::Ipf => "IPF",
        }
    }
}

/// Which end of the connection to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Src,
    Dst,
}

impl Direction {
    pub const fn label(&self) -> &'static str {
        match self {
            Direction::Src => "Source",
            Direction::Dst => "Destination",
        }
    }
}

/// What the frequency table is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountKey {
    /// Attributed country name (default).
    #[default]
    Country,
    /// Raw address, attribution only used as an existence filter.
    Address,
}

/// How many report rows to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopN {
    All,
    Count(usize),
}

impl FromStr for TopN {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(TopN::All);
        }
        let n: usize = s
            .parse()
            .map_err(|_| anyhow!("--top expects a number or 'all', got '{}'", s))?;
        Ok(TopN::Count(n))
    }
}

/// Classifier options: dialect, direction, families, and count key.
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub dialect: LogDialect,
    pub direction: Direction,
    pub families: Vec<AddressFamily>,
    pub key: CountKey,
}

impl ClassifyOptions {
    /// Report heading, e.g. `IPTABLES Firewall Hits by Source Country`.
    pub fn title(&self) -> String {
        let subject = match self.key {
            CountKey::Country => "Country",
            CountKey::Address => "Address",
        };
        format!(
            "{} Firewall Hits by {} {}",
            self.dialect.label(),
            self.direction.label(),
            subject
        )
    }
}

// Address atoms spliced into the dialect patterns. Groups in the v6 atom
// are fixed-width on purpose; see the module docs.
const ATOM_V4: &str = r"(?:\d{1,3}\.){3}\d{1,3}";
const ATOM_V6: &str = r"(?:[0-9a-fA-F]{4}:){7}[0-9a-fA-F]{4}";

fn atom(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::Ipv4 => ATOM_V4,
        AddressFamily::Ipv6 => ATOM_V6,
    }
}

/// Build the extraction pattern for one dialect/family/direction triple.
/// Every pattern captures exactly one `addr` group.
fn dialect_pattern(dialect: LogDialect, family: AddressFamily, direction: Direction) -> String {
    let a = atom(family);
    match (dialect, direction) {
        (LogDialect::Iptables, Direction::Src) => format!("SRC=(?P<addr>{a})"),
        (LogDialect::Iptables, Direction::Dst) => format!("DST=(?P<addr>{a})"),
        (LogDialect::Asa { allow: false }, Direction::Src) => {
            format!(r"Deny \S+ src \S+:(?P<addr>{a})")
        }
        (LogDialect::Asa { allow: false }, Direction::Dst) => {
            format!(r"Deny \S+ src \S+:{a}(?:/\d+)? dst \S+:(?P<addr>{a})")
        }
        (LogDialect::Asa { allow: true }, Direction::Src) => {
            format!(r"Built \S+ \S+ connection \d+ for \S+:(?P<addr>{a})/\d+")
        }
        (LogDialect::Asa { allow: true }, Direction::Dst) => {
            format!(r"Built \S+ \S+ connection \d+ for \S+:{a}/\d+ .* to \S+:(?P<addr>{a})/\d+")
        }
        (LogDialect::Ipf, Direction::Src) => format!(r"(?P<addr>{a}),\d+ -> {a},\d+"),
        (LogDialect::Ipf, Direction::Dst) => format!(r"{a},\d+ -> (?P<addr>{a}),\d+"),
    }
}

/// Accumulated classification counts.
#[derive(Debug, Default)]
pub struct FrequencyReport {
    counts: HashMap<String, u64>,
    total: u64,
}

impl FrequencyReport {
    fn record(&mut self, label: String) {
        *self.counts.entry(label).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Rows sorted by descending hit count. Tie order between equal counts
    /// follows the hash map's iteration order and is not defined.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut rows: Vec<(&str, u64)> = self
            .counts
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        rows
    }

    /// Render the ranked summary: rank, label, hits, and percentage of the
    /// total with two decimals.
    pub fn render(&self, title: &str, top: TopN) -> String {
        let mut out = String::new();
        let shown = match top {
            TopN::All => self.counts.len(),
            TopN::Count(n) => n,
        };
        let _ = writeln!(out);
        let _ = writeln!(out, " Top {} {}", shown, title);
        let _ = writeln!(
            out,
            "------------------------------------------------------------------"
        );
        for (rank, (label, hits)) in self.ranked().into_iter().take(shown).enumerate() {
            let percent = (hits as f64 / self.total as f64) * 100.0;
            let _ = writeln!(
                out,
                "{:02}: {:>30} | hits = {:>6} ({:>5.2}%)",
                rank + 1,
                label,
                hits,
                percent
            );
        }
        let _ = writeln!(
            out,
            "------------------------------------------------------------------"
        );
        out
    }
}

/// Log classifier bound to a built range index.
pub struct Classifier<'a> {
    index: &'a RangeIndex,
}

impl<'a> Classifier<'a> {
    pub fn new(index: &'a RangeIndex) -> Self {
        Self { index }
    }

    /// Classify every line of `input` and accumulate frequency counts.
    pub fn classify(
        &self,
        input: impl BufRead,
        options: &ClassifyOptions,
    ) -> Result<FrequencyReport> {
        if options.families.is_empty() {
            return Err(anyhow!("at least one address family is required"));
        }

        let patterns: Vec<(AddressFamily, Regex)> = options
            .families
            .iter()
            .map(|&family| {
                let pattern = dialect_pattern(options.dialect, family, options.direction);
                Regex::new(&pattern)
                    .map(|re| (family, re))
                    .map_err(|e| anyhow!("bad dialect pattern '{}': {}", pattern, e))
            })
            .collect::<Result<_>>()?;

        let mut report = FrequencyReport::default();

        for line in input.lines() {
            let line = line?;
            for (family, re) in &patterns {
                let Some(caps) = re.captures(&line) else {
                    continue;
                };
                let Some(m) = caps.name("addr") else {
                    continue;
                };
                // the dialect atom can match shapes that are not valid
                // addresses (e.g. 999.1.2.3); drop those quietly
                let Some(addr) = family.parse_addr(m.as_str()) else {
                    break;
                };
                if family.is_private(&addr) {
                    break;
                }
                let Some(attribution) = self.index.lookup(&addr) else {
                    break;
                };
                let label = match options.key {
                    CountKey::Country => attribution.country.clone(),
                    CountKey::Address => m.as_str().to_string(),
                };
                report.record(label);
                break;
            }
        }

        Ok(report)
    }
}
