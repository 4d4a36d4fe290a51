//! Range index: longest-prefix-match attribution engine
//!
//! An in-memory [`IpnetTrie`] built from the ordered range query, answering
//! "which country owns this address" by the most specific covering prefix,
//! regardless of insertion order. The trie keeps the two address families
//! apart internally, so one index serves both. Lookups are bounded by the
//! prefix depth, which keeps per-log-line queries cheap even with hundreds
//! of thousands of ranges loaded.
//!
//! The index is rebuilt from a fresh query on every run and never persisted.

use std::net::IpAddr;

use ipnet::IpNet;
use ipnet_trie::IpnetTrie;
use serde::{Deserialize, Serialize};

use crate::database::RangeRow;

/// Country attribution attached to a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub cc: String,
    pub country: String,
}

/// Longest-prefix-match index over both address families.
pub struct RangeIndex {
    trie: IpnetTrie<Attribution>,
    len: usize,
}

impl RangeIndex {
    pub fn new() -> Self {
        Self {
            trie: IpnetTrie::new(),
            len: 0,
        }
    }

    /// Build an index from ordered range query results.
    pub fn from_rows(rows: &[RangeRow]) -> Self {
        let mut index = Self::new();
        for row in rows {
            index.insert(&row.net, &row.cc, &row.country);
        }
        index
    }

    pub fn insert(&mut self, net: &IpNet, cc: &str, country: &str) {
        let attribution = Attribution {
            cc: cc.to_string(),
            country: country.to_string(),
        };
        let net = net.trunc();
        if self.trie.exact_match(net).is_none() {
            self.len += 1;
        }
        // a duplicate prefix overwrites; registries are assumed internally
        // non-overlapping so this only matters for repeated inserts
        self.trie.insert(net, attribution);
    }

    /// Attribution of the most specific prefix covering `addr`, if any.
    pub fn lookup(&self, addr: &IpAddr) -> Option<&Attribution> {
        let host = IpNet::from(*addr);
        self.trie
            .longest_match(&host)
            .map(|(_prefix, attribution)| attribution)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for RangeIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::AddressFamily;

    fn index_with(prefixes: &[(&str, &str, &str)]) -> RangeIndex {
        let mut index = RangeIndex::new();
        for (net, cc, name) in prefixes {
            index.insert(&net.parse().unwrap(), cc, name);
        }
        index
    }

    fn cc_of(index: &RangeIndex, addr: &str) -> Option<String> {
        index
            .lookup(&addr.parse().unwrap())
            .map(|a| a.cc.clone())
    }

    #[test]
    fn test_basic_lookup() {
        let index = index_with(&[
            ("8.0.0.0/8", "US", "United States"),
            ("9.0.0.0/8", "CA", "Canada"),
        ]);

        assert_eq!(cc_of(&index, "8.5.6.7").as_deref(), Some("US"));
        assert_eq!(cc_of(&index, "9.255.0.1").as_deref(), Some("CA"));
        // not covered by any inserted block
        assert_eq!(cc_of(&index, "10.1.1.1"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        // insertion order must not matter, only specificity
        let index = index_with(&[
            ("1.1.1.0/24", "AU", "Australia"),
            ("1.0.0.0/8", "CN", "China"),
            ("1.1.0.0/16", "JP", "Japan"),
        ]);

        assert_eq!(cc_of(&index, "1.1.1.1").as_deref(), Some("AU"));
        assert_eq!(cc_of(&index, "1.1.2.1").as_deref(), Some("JP"));
        assert_eq!(cc_of(&index, "1.2.0.1").as_deref(), Some("CN"));
        assert_eq!(cc_of(&index, "2.0.0.1"), None);
    }

    #[test]
    fn test_ipv6_lookup() {
        let index = index_with(&[
            ("2001:db8::/32", "DE", "Germany"),
            ("2001:db8:1::/48", "FR", "France"),
        ]);

        assert_eq!(cc_of(&index, "2001:db8:1::1").as_deref(), Some("FR"));
        assert_eq!(cc_of(&index, "2001:db8:2::1").as_deref(), Some("DE"));
        assert_eq!(cc_of(&index, "2600::1"), None);
    }

    #[test]
    fn test_families_do_not_collide() {
        // a v6 prefix sharing the leading bits of a v4 block must not
        // answer v4 queries
        let index = index_with(&[("800::/8", "SE", "Sweden")]);
        assert_eq!(cc_of(&index, "8.5.6.7"), None);
        assert_eq!(cc_of(&index, "8ff::1").as_deref(), Some("SE"));
    }

    #[test]
    fn test_zero_length_prefix_matches_everything() {
        let index = index_with(&[("0.0.0.0/0", "XX", "everywhere")]);
        assert_eq!(cc_of(&index, "203.0.113.9").as_deref(), Some("XX"));
    }

    #[test]
    fn test_duplicate_prefix_overwrites() {
        let index = index_with(&[
            ("8.0.0.0/8", "US", "United States"),
            ("8.0.0.0/8", "CA", "Canada"),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(cc_of(&index, "8.8.8.8").as_deref(), Some("CA"));
    }

    #[test]
    fn test_from_rows() {
        let rows = vec![RangeRow {
            cc: "US".to_string(),
            country: "United States".to_string(),
            net: "8.0.0.0/8".parse().unwrap(),
            family: AddressFamily::Ipv4,
        }];
        let index = RangeIndex::from_rows(&rows);
        assert_eq!(index.len(), 1);
        assert_eq!(cc_of(&index, "8.8.8.8").as_deref(), Some("US"));
    }
}
