//! Final, ranked output records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::DomainAggregate;

/// One sender line inside a [`RankedGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedSender {
    pub address: String,
    pub count: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// A sending domain with its senders sorted by count, highest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedGroup {
    pub domain: String,
    pub total_count: u64,
    pub senders: Vec<RankedSender>,
    pub is_personal: bool,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl RankedGroup {
    pub fn from_aggregate(domain: String, aggregate: DomainAggregate) -> Self {
        let mut senders: Vec<RankedSender> = aggregate
            .senders
            .into_iter()
            .map(|(address, s)| RankedSender {
                address,
                count: s.count,
                earliest: s.earliest,
                latest: s.latest,
            })
            .collect();
        // Address as tiebreak so equal runs rank identically.
        senders.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.address.cmp(&b.address)));
        Self {
            domain,
            total_count: aggregate.total_count,
            senders,
            is_personal: aggregate.is_personal,
            earliest: aggregate.earliest,
            latest: aggregate.latest,
        }
    }
}

/// Sort groups by total count, highest first. Ties are ordered by domain
/// name so that store iteration order never leaks into the result.
pub fn sort_groups(groups: &mut [RankedGroup]) {
    groups.sort_by(|a, b| {
        b.total_count
            .cmp(&a.total_count)
            .then_with(|| a.domain.cmp(&b.domain))
    });
}
