//! Filter settings applied when consolidating ranked groups.

use chrono::{DateTime, Utc};

/// An inclusive date window. Either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    /// Whether `[earliest, latest]` overlaps this window.
    ///
    /// A range with a single known bound is treated as that one instant.
    /// A range with no bounds never overlaps.
    pub fn overlaps(&self, earliest: Option<DateTime<Utc>>, latest: Option<DateTime<Utc>>) -> bool {
        let (from, to) = match (earliest, latest) {
            (Some(e), Some(l)) => (e, l),
            (Some(e), None) => (e, e),
            (None, Some(l)) => (l, l),
            (None, None) => return false,
        };
        self.start.is_none_or(|s| to >= s) && self.end.is_none_or(|e| from <= e)
    }
}

/// What the caller wants to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Groups whose domain contains any of these substrings are dropped.
    pub excluded_domains: Vec<String>,
    /// Fold subdomains into their root domain.
    pub join_subdomains: bool,
    pub date_window: Option<DateWindow>,
    /// Groups with fewer messages are dropped (after joining).
    pub min_count: u64,
}

impl FilterSpec {
    pub fn is_excluded(&self, domain: &str) -> bool {
        self.excluded_domains
            .iter()
            .map(|e| e.trim())
            .any(|e| !e.is_empty() && domain.contains(&e.to_lowercase()))
    }
}
