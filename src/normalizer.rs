//! Record normalizer for RIR "extended" delegation files
//!
//! Each registry publishes a pipe-delimited statistics file, one record per
//! line:
//!
//! ```text
//! registry|cc|type|start|value|date|status[|reg_id]
//! arin|US|ipv4|8.0.0.0|16777216|19920101|allocated
//! ```
//!
//! The normalizer turns one registry's raw payload into canonical
//! [`RirRecord`]s. Malformed lines are counted and dropped; a bad line never
//! aborts the batch. Only the fetch layer can fail a refresh.

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::family::AddressFamily;

/// The five regional internet registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registry {
    Arin,
    Apnic,
    Afrinic,
    Lacnic,
    #[serde(rename = "ripencc")]
    RipeNcc,
}

/// All registries, in refresh order.
pub const ALL_REGISTRIES: [Registry; 5] = [
    Registry::Arin,
    Registry::Apnic,
    Registry::Afrinic,
    Registry::Lacnic,
    Registry::RipeNcc,
];

impl Registry {
    /// Lowercase wire name, as it appears in the delegation files.
    pub const fn name(&self) -> &'static str {
        match self {
            Registry::Arin => "arin",
            Registry::Apnic => "apnic",
            Registry::Afrinic => "afrinic",
            Registry::Lacnic => "lacnic",
            Registry::RipeNcc => "ripencc",
        }
    }
}

impl Display for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Registry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arin" => Ok(Registry::Arin),
            "apnic" => Ok(Registry::Apnic),
            "afrinic" => Ok(Registry::Afrinic),
            "lacnic" => Ok(Registry::Lacnic),
            "ripencc" => Ok(Registry::RipeNcc),
            other => Err(anyhow!("unknown registry: {}", other)),
        }
    }
}

/// Record type: address space or AS numbers.
///
/// `asn` rows are kept in storage for completeness but excluded from all
/// address-space queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Ipv4,
    Ipv6,
    Asn,
}

impl RecordType {
    pub const fn table_value(&self) -> &'static str {
        match self {
            RecordType::Ipv4 => "ipv4",
            RecordType::Ipv6 => "ipv6",
            RecordType::Asn => "asn",
        }
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(RecordType::Ipv4),
            "ipv6" => Ok(RecordType::Ipv6),
            "asn" => Ok(RecordType::Asn),
            other => Err(anyhow!("unknown record type: {}", other)),
        }
    }
}

/// Delegation status. Only `allocated` and `assigned` rows participate in
/// attribution; the rest are stored but filtered out of range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Allocated,
    Assigned,
    Available,
    Reserved,
    Unknown,
}

impl RecordStatus {
    pub const fn table_value(&self) -> &'static str {
        match self {
            RecordStatus::Allocated => "allocated",
            RecordStatus::Assigned => "assigned",
            RecordStatus::Available => "available",
            RecordStatus::Reserved => "reserved",
            RecordStatus::Unknown => "unknown",
        }
    }

    /// Lossy parse: anything unrecognized becomes `Unknown`, never an error.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "allocated" => RecordStatus::Allocated,
            "assigned" => RecordStatus::Assigned,
            "available" => RecordStatus::Available,
            "reserved" => RecordStatus::Reserved,
            _ => RecordStatus::Unknown,
        }
    }
}

/// A normalized delegation record, ready for storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RirRecord {
    pub registry: Registry,
    /// Two-letter country code, including the `EU`/`AP` pseudo-codes.
    pub cc: String,
    pub kind: RecordType,
    /// Textual start address (or first ASN for `asn` rows).
    pub start: String,
    /// 16-byte sort key derived from the start address. IPv4 addresses are
    /// stored in IPv6-mapped form so one blob column orders both families.
    /// Never exposed in output.
    pub start_key: Option<[u8; 16]>,
    /// Raw `value` field: host count for IPv4, prefix length for IPv6,
    /// ASN count for `asn` rows.
    pub value: String,
    /// Canonical `start/len` form, present for address records only.
    pub cidr: Option<String>,
    pub date: String,
    pub status: RecordStatus,
    /// Opaque registration id from the 8-field record variant.
    pub reg_id: Option<String>,
}

/// Outcome of normalizing one registry payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NormalizeSummary {
    /// Records successfully normalized.
    pub records: usize,
    /// Lines dropped due to per-line parse or conversion errors.
    pub skipped: usize,
}

/// A raw line split into its pipe-delimited fields.
///
/// The extended format has two record shapes: seven fields, or eight with a
/// trailing registration id. The variant is resolved here, once, so nothing
/// downstream branches on field counts.
#[derive(Debug)]
enum ParsedLine<'a> {
    Full {
        fields: RawFields<'a>,
        reg_id: &'a str,
    },
    Short {
        fields: RawFields<'a>,
    },
}

#[derive(Debug)]
struct RawFields<'a> {
    registry: &'a str,
    cc: &'a str,
    kind: &'a str,
    start: &'a str,
    value: &'a str,
    date: &'a str,
    status: &'a str,
}

impl<'a> ParsedLine<'a> {
    /// Split a record line. Returns `None` for any field count other than
    /// seven or eight.
    fn split(line: &'a str) -> Option<Self> {
        let fields: Vec<&str> = line.split('|').collect();
        match fields[..] {
            [registry, cc, kind, start, value, date, status] => Some(ParsedLine::Short {
                fields: RawFields {
                    registry,
                    cc,
                    kind,
                    start,
                    value,
                    date,
                    status,
                },
            }),
            [registry, cc, kind, start, value, date, status, reg_id] => Some(ParsedLine::Full {
                fields: RawFields {
                    registry,
                    cc,
                    kind,
                    start,
                    value,
                    date,
                    status,
                },
                reg_id,
            }),
            _ => None,
        }
    }

    fn into_parts(self) -> (RawFields<'a>, Option<&'a str>) {
        match self {
            ParsedLine::Full { fields, reg_id } => (fields, Some(reg_id)),
            ParsedLine::Short { fields } => (fields, None),
        }
    }
}

/// True for lines that are structural noise rather than records: comments,
/// the `N.M`-style version header, and summary lines.
fn is_header_or_summary(line: &str) -> bool {
    if line.starts_with('#') {
        return true;
    }
    let bytes = line.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_digit() && bytes[1] == b'.' && bytes[2].is_ascii_digit()
    {
        return true;
    }
    line.contains("|summary")
}

/// 16-byte sort key for an address (IPv4 mapped to `::ffff:a.b.c.d`).
fn addr_sort_key(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

fn normalize_line(registry: Registry, line: &str) -> Result<RirRecord, Error> {
    let parsed =
        ParsedLine::split(line).ok_or_else(|| anyhow!("unexpected field count: {}", line))?;
    let (fields, reg_id) = parsed.into_parts();

    let line_registry: Registry = fields.registry.parse()?;
    if line_registry != registry {
        return Err(anyhow!(
            "record registry '{}' does not match payload registry '{}'",
            fields.registry,
            registry
        ));
    }

    let kind: RecordType = fields.kind.parse()?;

    let (start_key, cidr) = match kind {
        RecordType::Ipv4 => {
            let start: Ipv4Addr = fields
                .start
                .parse()
                .map_err(|e| anyhow!("bad ipv4 start '{}': {}", fields.start, e))?;
            let size: u64 = fields
                .value
                .parse()
                .map_err(|e| anyhow!("bad ipv4 size '{}': {}", fields.value, e))?;
            let width = u32::from(AddressFamily::Ipv4.bit_width());
            // the size must be an exact power of two; never round
            if size == 0 || !size.is_power_of_two() || size > (1u64 << width) {
                return Err(anyhow!("ipv4 size {} is not a power of two", size));
            }
            let prefix_len = width - size.trailing_zeros();
            (
                Some(addr_sort_key(IpAddr::V4(start))),
                Some(format!("{}/{}", start, prefix_len)),
            )
        }
        RecordType::Ipv6 => {
            let start: Ipv6Addr = fields
                .start
                .parse()
                .map_err(|e| anyhow!("bad ipv6 start '{}': {}", fields.start, e))?;
            let prefix_len: u8 = fields
                .value
                .parse()
                .map_err(|e| anyhow!("bad ipv6 prefix length '{}': {}", fields.value, e))?;
            if prefix_len > AddressFamily::Ipv6.bit_width() {
                return Err(anyhow!("ipv6 prefix length {} out of range", prefix_len));
            }
            (
                Some(addr_sort_key(IpAddr::V6(start))),
                Some(format!("{}/{}", start, prefix_len)),
            )
        }
        RecordType::Asn => (None, None),
    };

    Ok(RirRecord {
        registry,
        cc: fields.cc.to_string(),
        kind,
        start: fields.start.to_string(),
        start_key,
        value: fields.value.to_string(),
        cidr,
        date: fields.date.to_string(),
        status: RecordStatus::parse_lossy(fields.status),
        reg_id: reg_id.map(|s| s.to_string()),
    })
}

/// Parse one registry's raw payload into normalized records.
///
/// Per-line failures are counted in the summary and the line is dropped;
/// parsing never fails as a whole.
pub fn parse_payload(registry: Registry, data: &str) -> (Vec<RirRecord>, NormalizeSummary) {
    let mut records = Vec::new();
    let mut summary = NormalizeSummary::default();

    for line in data.lines() {
        let line = line.trim_end();
        if line.is_empty() || is_header_or_summary(line) {
            continue;
        }
        match normalize_line(registry, line) {
            Ok(record) => {
                records.push(record);
                summary.records += 1;
            }
            Err(e) => {
                debug!("skipping line: {}", e);
                summary.skipped += 1;
            }
        }
    }

    (records, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
2.3|arin|20150101|4|19700101|20150101|+0000
# a comment line
arin|*|ipv4|*|12345|summary
arin|US|ipv4|8.0.0.0|16777216|19920101|allocated
arin|US|ipv4|12.0.0.0|16777216|19830823|assigned|b0e0a8a9
arin|CA|ipv6|2620:101:c000::|40|20110622|allocated
arin|US|asn|701|5|19901127|assigned
";

    #[test]
    fn test_parse_sample_payload() {
        let (records, summary) = parse_payload(Registry::Arin, SAMPLE);
        assert_eq!(summary.records, 4);
        assert_eq!(summary.skipped, 0);

        assert_eq!(records[0].cidr.as_deref(), Some("8.0.0.0/8"));
        assert_eq!(records[0].status, RecordStatus::Allocated);
        assert_eq!(records[0].reg_id, None);

        assert_eq!(records[1].reg_id.as_deref(), Some("b0e0a8a9"));
        assert_eq!(records[1].cidr.as_deref(), Some("12.0.0.0/8"));

        assert_eq!(records[2].kind, RecordType::Ipv6);
        assert_eq!(records[2].cidr.as_deref(), Some("2620:101:c000::/40"));

        assert_eq!(records[3].kind, RecordType::Asn);
        assert_eq!(records[3].start_key, None);
        assert_eq!(records[3].cidr, None);
    }

    #[test]
    fn test_ipv4_prefix_derivation() {
        // for every power of two, prefix = 32 - log2(size)
        for k in 0..=24u32 {
            let size = 1u64 << k;
            let data = format!("arin|US|ipv4|8.0.0.0|{}|19920101|allocated\n", size);
            let (records, summary) = parse_payload(Registry::Arin, &data);
            assert_eq!(summary.skipped, 0);
            assert_eq!(
                records[0].cidr.as_deref(),
                Some(format!("8.0.0.0/{}", 32 - k).as_str())
            );
        }
    }

    #[test]
    fn test_non_power_of_two_size_rejected() {
        let data = "arin|US|ipv4|8.0.0.0|100|19920101|allocated\n";
        let (records, summary) = parse_payload(Registry::Arin, data);
        assert!(records.is_empty());
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        // six fields
        let six = "arin|US|ipv4|8.0.0.0|256|19920101\n";
        let (records, summary) = parse_payload(Registry::Arin, six);
        assert!(records.is_empty());
        assert_eq!(summary.skipped, 1);

        // nine fields
        let nine = "arin|US|ipv4|8.0.0.0|256|19920101|allocated|id|extra\n";
        let (_, summary) = parse_payload(Registry::Arin, nine);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_version_line_skipped_silently() {
        // the modern version header has a numeric first field; it fails the
        // registry parse and is dropped as a bad line
        let data = "2|arin|20150101|63108|19700101|20150101|+0000\n";
        let (records, summary) = parse_payload(Registry::Arin, data);
        assert!(records.is_empty());
        assert_eq!(summary.skipped, 1);

        // the legacy dotted version header is recognized as a header
        let data = "2.3|arin|20150101|4|19700101|20150101|+0000\n";
        let (_, summary) = parse_payload(Registry::Arin, data);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_unknown_status_is_not_an_error() {
        let data = "arin|US|ipv4|8.0.0.0|256|19920101|weird-status\n";
        let (records, summary) = parse_payload(Registry::Arin, data);
        assert_eq!(summary.skipped, 0);
        assert_eq!(records[0].status, RecordStatus::Unknown);
    }

    #[test]
    fn test_registry_mismatch_rejected() {
        let data = "apnic|AU|ipv4|1.0.0.0|256|20110811|allocated\n";
        let (_, summary) = parse_payload(Registry::Arin, data);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_sort_key_ordering() {
        let a = "arin|US|ipv4|8.0.0.0|256|19920101|allocated\n\
                 arin|US|ipv4|9.0.0.0|256|19920101|allocated\n";
        let (records, _) = parse_payload(Registry::Arin, a);
        assert!(records[0].start_key.unwrap() < records[1].start_key.unwrap());
    }

    #[test]
    fn test_registry_name_round_trip() {
        for registry in ALL_REGISTRIES {
            assert_eq!(registry.name().parse::<Registry>().unwrap(), registry);
        }
        assert_eq!(Registry::RipeNcc.to_string(), "ripencc");
    }
}
