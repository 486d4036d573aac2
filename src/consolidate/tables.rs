//! Lookup tables for the root domain heuristic.

use std::collections::HashSet;

/// Country-code TLDs under which registrations sit one level deeper
/// (`example.co.uk`, `example.com.au`).
pub const DEFAULT_TWO_PART_TLDS: &[&str] = &[
    "uk", "au", "nz", "jp", "br", "za", "in", "il", "kr", "mx", "ar", "tr", "cn", "tw", "hk",
    "sg", "my", "id", "th", "ph", "pk", "ng", "ke", "ua", "eg", "pe", "co", "ve", "uy",
];

/// Second-level labels that make up the registrable suffix in those TLDs.
pub const DEFAULT_SECOND_LEVELS: &[&str] = &[
    "co", "com", "net", "org", "gov", "ac", "edu", "ne", "or", "go", "gob", "mil", "nic", "ltd",
    "plc", "sch", "nhs", "police", "me", "gen", "biz", "info",
];

/// The two-part TLD and second-level lookup sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainTables {
    pub two_part_tlds: HashSet<String>,
    pub second_levels: HashSet<String>,
}

impl Default for DomainTables {
    fn default() -> Self {
        Self {
            two_part_tlds: DEFAULT_TWO_PART_TLDS.iter().map(|s| s.to_string()).collect(),
            second_levels: DEFAULT_SECOND_LEVELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DomainTables {
    /// Defaults plus extra entries. Entries are lower-cased; blanks are skipped.
    pub fn with_extra<I, J, S, T>(tlds: I, second_levels: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut tables = Self::default();
        tables.two_part_tlds.extend(normalize(tlds));
        tables.second_levels.extend(normalize(second_levels));
        tables
    }

    pub fn is_two_part_tld(&self, label: &str) -> bool {
        self.two_part_tlds.contains(label)
    }

    pub fn is_second_level(&self, label: &str) -> bool {
        self.second_levels.contains(label)
    }
}

fn normalize<I, S>(entries: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|s| s.as_ref().trim().trim_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = DomainTables::default();
        assert!(t.is_two_part_tld("uk"));
        assert!(t.is_second_level("co"));
        assert!(!t.is_two_part_tld("com"));
    }

    #[test]
    fn test_with_extra_normalizes() {
        let t = DomainTables::with_extra([" .PL "], ["", "waw"]);
        assert!(t.is_two_part_tld("pl"));
        assert!(t.is_second_level("waw"));
        assert!(!t.is_second_level(""));
        assert!(t.is_two_part_tld("uk"));
    }
}
