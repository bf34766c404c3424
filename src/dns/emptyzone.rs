/// RFC 6303 / RFC 7534 / RFC 8375 empty zones: private-use and
/// special-use reverse (and `home.arpa.`) names that get a synthetic
/// SOA/NXDOMAIN answer instead of being forwarded upstream.
const DEFAULT_ZONES: &[&str] = &[
    "10.in-addr.arpa.",
    "16.172.in-addr.arpa.",
    "17.172.in-addr.arpa.",
    "18.172.in-addr.arpa.",
    "19.172.in-addr.arpa.",
    "20.172.in-addr.arpa.",
    "21.172.in-addr.arpa.",
    "22.172.in-addr.arpa.",
    "23.172.in-addr.arpa.",
    "24.172.in-addr.arpa.",
    "25.172.in-addr.arpa.",
    "26.172.in-addr.arpa.",
    "27.172.in-addr.arpa.",
    "28.172.in-addr.arpa.",
    "29.172.in-addr.arpa.",
    "30.172.in-addr.arpa.",
    "31.172.in-addr.arpa.",
    "64.100.in-addr.arpa.",
    "65.100.in-addr.arpa.",
    "66.100.in-addr.arpa.",
    "67.100.in-addr.arpa.",
    "68.100.in-addr.arpa.",
    "69.100.in-addr.arpa.",
    "70.100.in-addr.arpa.",
    "71.100.in-addr.arpa.",
    "72.100.in-addr.arpa.",
    "73.100.in-addr.arpa.",
    "74.100.in-addr.arpa.",
    "75.100.in-addr.arpa.",
    "76.100.in-addr.arpa.",
    "77.100.in-addr.arpa.",
    "78.100.in-addr.arpa.",
    "79.100.in-addr.arpa.",
    "80.100.in-addr.arpa.",
    "81.100.in-addr.arpa.",
    "82.100.in-addr.arpa.",
    "83.100.in-addr.arpa.",
    "84.100.in-addr.arpa.",
    "85.100.in-addr.arpa.",
    "86.100.in-addr.arpa.",
    "87.100.in-addr.arpa.",
    "88.100.in-addr.arpa.",
    "89.100.in-addr.arpa.",
    "90.100.in-addr.arpa.",
    "91.100.in-addr.arpa.",
    "92.100.in-addr.arpa.",
    "93.100.in-addr.arpa.",
    "94.100.in-addr.arpa.",
    "95.100.in-addr.arpa.",
    "96.100.in-addr.arpa.",
    "97.100.in-addr.arpa.",
    "98.100.in-addr.arpa.",
    "99.100.in-addr.arpa.",
    "100.100.in-addr.arpa.",
    "101.100.in-addr.arpa.",
    "102.100.in-addr.arpa.",
    "103.100.in-addr.arpa.",
    "104.100.in-addr.arpa.",
    "105.100.in-addr.arpa.",
    "106.100.in-addr.arpa.",
    "107.100.in-addr.arpa.",
    "108.100.in-addr.arpa.",
    "109.100.in-addr.arpa.",
    "110.100.in-addr.arpa.",
    "111.100.in-addr.arpa.",
    "112.100.in-addr.arpa.",
    "113.100.in-addr.arpa.",
    "114.100.in-addr.arpa.",
    "115.100.in-addr.arpa.",
    "116.100.in-addr.arpa.",
    "117.100.in-addr.arpa.",
    "118.100.in-addr.arpa.",
    "119.100.in-addr.arpa.",
    "120.100.in-addr.arpa.",
    "121.100.in-addr.arpa.",
    "122.100.in-addr.arpa.",
    "123.100.in-addr.arpa.",
    "124.100.in-addr.arpa.",
    "125.100.in-addr.arpa.",
    "126.100.in-addr.arpa.",
    "127.100.in-addr.arpa.",
    "168.192.in-addr.arpa.",
    "254.169.in-addr.arpa.",
    "2.0.192.in-addr.arpa.",
    "100.51.198.in-addr.arpa.",
    "113.0.203.in-addr.arpa.",
    "d.f.ip6.arpa.",
    "8.e.f.ip6.arpa.",
    "9.e.f.ip6.arpa.",
    "a.e.f.ip6.arpa.",
    "b.e.f.ip6.arpa.",
    "home.arpa.",
];

/// Longest-suffix match against the empty zone table. Names are compared
/// label-wise so `10.in-addr.arpa.` doesn't accidentally match
/// `110.in-addr.arpa.`.
pub struct EmptyZoneSet {
    zones: Vec<String>,
}

impl Default for EmptyZoneSet {
    fn default() -> Self {
        Self {
            zones: DEFAULT_ZONES.iter().map(|z| z.to_string()).collect(),
        }
    }
}

impl EmptyZoneSet {
    pub fn with_extra(mut self, zones: impl IntoIterator<Item = String>) -> Self {
        self.zones.extend(zones);
        self
    }

    fn labels(name: &str) -> Vec<&str> {
        name.trim_end_matches('.').split('.').rev().collect()
    }

    /// Returns the longest configured zone that is a suffix of `name`,
    /// or `None` if `name` falls outside every empty zone.
    pub fn find_longest_match(&self, name: &str) -> Option<&str> {
        let query_labels = Self::labels(name);
        self.zones
            .iter()
            .filter(|zone| {
                let zone_labels = Self::labels(zone);
                zone_labels.len() <= query_labels.len()
                    && zone_labels
                        .iter()
                        .zip(query_labels.iter())
                        .all(|(a, b)| a.eq_ignore_ascii_case(b))
            })
            .max_by_key(|zone| Self::labels(zone).len())
            .map(|zone| zone.as_str())
    }

    /// DS queries are asked of the parent; strip the owner's first label
    /// before doing the lookup, per RFC 4035 ss3.1.4.1 delegation rules.
    pub fn find_for_ds(&self, name: &str) -> Option<&str> {
        let stripped = name.splitn(2, '.').nth(1)?;
        self.find_longest_match(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_zone() {
        let set = EmptyZoneSet::default();
        assert_eq!(set.find_longest_match("10.in-addr.arpa."), Some("10.in-addr.arpa."));
    }

    #[test]
    fn matches_subzone_by_longest_suffix() {
        let set = EmptyZoneSet::default();
        assert_eq!(
            set.find_longest_match("1.2.10.in-addr.arpa."),
            Some("10.in-addr.arpa.")
        );
    }

    #[test]
    fn does_not_match_unrelated_name() {
        let set = EmptyZoneSet::default();
        assert_eq!(set.find_longest_match("example.com."), None);
    }

    #[test]
    fn does_not_false_positive_on_prefix_overlap() {
        let set = EmptyZoneSet::default();
        assert_eq!(set.find_longest_match("110.in-addr.arpa."), None);
    }

    #[test]
    fn ds_strips_one_label_before_matching() {
        let set = EmptyZoneSet::default();
        assert_eq!(
            set.find_for_ds("1.10.in-addr.arpa."),
            Some("10.in-addr.arpa.")
        );
    }
}
