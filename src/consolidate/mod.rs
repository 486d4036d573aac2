//! Post-processing of ranked groups: filtering and subdomain joining.
//!
//! Runs on the finalized ranking, never on the engine's working state, so a
//! filter change only needs this pass and not a new scan.

pub mod tables;

use std::collections::HashMap;

use tracing::debug;

use crate::model::aggregate::{max_date, min_date};
use crate::model::filter::FilterSpec;
use crate::model::ranked::{sort_groups, RankedGroup};

pub use tables::DomainTables;

/// Reduce `domain` to its registrable root.
///
/// `mail.example.com` becomes `example.com`, and `news.example.co.uk`
/// becomes `example.co.uk` when `uk` is a two-part TLD and `co` a known
/// second level. Domains with two labels or fewer are returned unchanged.
pub fn root_domain(domain: &str, tables: &DomainTables) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        return domain.to_string();
    }
    let n = labels.len();
    let keep = if tables.is_two_part_tld(labels[n - 1]) && tables.is_second_level(labels[n - 2]) {
        3
    } else {
        2
    };
    labels[n - keep..].join(".")
}

/// Apply `filter` to `groups` and return the re-ranked result.
///
/// Order of operations: exclusion, date window, subdomain join, minimum
/// count, sort by total count.
pub fn consolidate(
    groups: Vec<RankedGroup>,
    filter: &FilterSpec,
    tables: &DomainTables,
) -> Vec<RankedGroup> {
    let before = groups.len();
    let mut kept: Vec<RankedGroup> = groups
        .into_iter()
        .filter(|g| !filter.is_excluded(&g.domain))
        .filter(|g| {
            filter
                .date_window
                .is_none_or(|w| w.overlaps(g.earliest, g.latest))
        })
        .collect();

    if filter.join_subdomains {
        kept = join_subdomains(kept, tables);
    }

    kept.retain(|g| g.total_count >= filter.min_count);
    sort_groups(&mut kept);

    debug!(before, after = kept.len(), "Consolidated groups");
    kept
}

fn join_subdomains(groups: Vec<RankedGroup>, tables: &DomainTables) -> Vec<RankedGroup> {
    let mut joined: Vec<RankedGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for group in groups {
        let root = root_domain(&group.domain, tables);
        match index.get(&root) {
            Some(&i) => absorb_group(&mut joined[i], group),
            None => {
                index.insert(root.clone(), joined.len());
                joined.push(RankedGroup {
                    domain: root,
                    ..group
                });
            }
        }
    }

    for group in &mut joined {
        // Stable, so equal counts keep their concatenation order.
        group.senders.sort_by(|a, b| b.count.cmp(&a.count));
    }
    joined
}

fn absorb_group(into: &mut RankedGroup, other: RankedGroup) {
    into.total_count += other.total_count;
    into.earliest = min_date(into.earliest, other.earliest);
    into.latest = max_date(into.latest, other.latest);
    into.is_personal = other.is_personal;
    into.senders.extend(other.senders);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::filter::DateWindow;
    use crate::model::ranked::RankedSender;
    use chrono::{DateTime, TimeZone, Utc};

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn group(domain: &str, senders: &[(&str, u64)]) -> RankedGroup {
        RankedGroup {
            domain: domain.to_string(),
            total_count: senders.iter().map(|(_, c)| c).sum(),
            senders: senders
                .iter()
                .map(|(a, c)| RankedSender {
                    address: a.to_string(),
                    count: *c,
                    earliest: None,
                    latest: None,
                })
                .collect(),
            is_personal: false,
            earliest: None,
            latest: None,
        }
    }

    #[test]
    fn test_root_domain() {
        let t = DomainTables::default();
        assert_eq!(root_domain("example.com", &t), "example.com");
        assert_eq!(root_domain("localhost", &t), "localhost");
        assert_eq!(root_domain("mail.example.com", &t), "example.com");
        assert_eq!(root_domain("a.b.mail.example.com", &t), "example.com");
        assert_eq!(root_domain("news.example.co.uk", &t), "example.co.uk");
        assert_eq!(root_domain("example.co.uk", &t), "example.co.uk");
        // TLD known, second level not
        assert_eq!(root_domain("news.example.uk", &t), "example.uk");
    }

    #[test]
    fn test_join_subdomains() {
        let groups = vec![
            group("mail.example.com", &[("a@mail.example.com", 5)]),
            group("other.org", &[("z@other.org", 6)]),
            group("example.com", &[("b@example.com", 3)]),
        ];
        let filter = FilterSpec {
            join_subdomains: true,
            ..FilterSpec::default()
        };
        let out = consolidate(groups, &filter, &DomainTables::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].domain, "example.com");
        assert_eq!(out[0].total_count, 8);
        let addrs: Vec<&str> = out[0].senders.iter().map(|s| s.address.as_str()).collect();
        assert_eq!(addrs, vec!["a@mail.example.com", "b@example.com"]);
        assert_eq!(out[1].domain, "other.org");
    }

    #[test]
    fn test_join_two_part_tld() {
        let groups = vec![
            group("news.example.co.uk", &[("n@news.example.co.uk", 2)]),
            group("example.co.uk", &[("x@example.co.uk", 1)]),
        ];
        let filter = FilterSpec {
            join_subdomains: true,
            ..FilterSpec::default()
        };
        let out = consolidate(groups, &filter, &DomainTables::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].domain, "example.co.uk");
        assert_eq!(out[0].total_count, 3);
    }

    #[test]
    fn test_join_takes_last_personal_flag_and_widens_dates() {
        let mut a = group("a.example.com", &[("x@a.example.com", 1)]);
        a.is_personal = true;
        a.earliest = Some(day(2020, 1, 1));
        a.latest = Some(day(2020, 6, 1));
        let mut b = group("b.example.com", &[("y@b.example.com", 1)]);
        b.latest = Some(day(2021, 1, 1));
        let filter = FilterSpec {
            join_subdomains: true,
            ..FilterSpec::default()
        };
        let out = consolidate(vec![a, b], &filter, &DomainTables::default());
        assert!(!out[0].is_personal);
        assert_eq!(out[0].earliest, Some(day(2020, 1, 1)));
        assert_eq!(out[0].latest, Some(day(2021, 1, 1)));
    }

    #[test]
    fn test_exclusion_and_min_count() {
        let groups = vec![
            group("spam.example.com", &[("s@spam.example.com", 9)]),
            group("a.org", &[("a@a.org", 1)]),
            group("b.org", &[("b@b.org", 4)]),
        ];
        let filter = FilterSpec {
            excluded_domains: vec!["example".into()],
            min_count: 2,
            ..FilterSpec::default()
        };
        let out = consolidate(groups, &filter, &DomainTables::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].domain, "b.org");
    }

    #[test]
    fn test_min_count_applies_after_join() {
        let groups = vec![
            group("a.example.com", &[("x@a.example.com", 1)]),
            group("b.example.com", &[("y@b.example.com", 1)]),
        ];
        let filter = FilterSpec {
            join_subdomains: true,
            min_count: 2,
            ..FilterSpec::default()
        };
        let out = consolidate(groups, &filter, &DomainTables::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].total_count, 2);
    }

    #[test]
    fn test_date_window_drops_undated_groups() {
        let mut dated = group("dated.com", &[("a@dated.com", 1)]);
        dated.earliest = Some(day(2020, 3, 1));
        dated.latest = Some(day(2020, 4, 1));
        let undated = group("undated.com", &[("a@undated.com", 5)]);
        let filter = FilterSpec {
            date_window: Some(DateWindow {
                start: Some(day(2020, 1, 1)),
                end: Some(day(2020, 12, 31)),
            }),
            ..FilterSpec::default()
        };
        let out = consolidate(vec![dated, undated], &filter, &DomainTables::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].domain, "dated.com");
    }

    #[test]
    fn test_no_filter_keeps_everything() {
        let groups = vec![group("a.com", &[("a@a.com", 1)]), group("b.com", &[("b@b.com", 2)])];
        let out = consolidate(groups, &FilterSpec::default(), &DomainTables::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].domain, "b.com");
    }
}
