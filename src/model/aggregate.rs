//! Partial aggregates and the merge law that combines them.
//!
//! Every place that combines aggregates (recording a message, folding a
//! batch into the accumulator, merging a spill into the overflow store) goes
//! through [`DomainAggregate::absorb`] / [`PartialAggregate::absorb`]. The law
//! is commutative and associative: counts add, earliest dates take the
//! minimum, latest dates take the maximum, an absent date is "unset".

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::address::SenderAddress;

/// Per-sender tally inside one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderAggregate {
    pub count: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl SenderAggregate {
    /// A single observation.
    pub fn single(date: Option<DateTime<Utc>>) -> Self {
        Self {
            count: 1,
            earliest: date,
            latest: date,
        }
    }

    pub fn absorb(&mut self, other: &SenderAggregate) {
        self.count += other.count;
        self.earliest = min_date(self.earliest, other.earliest);
        self.latest = max_date(self.latest, other.latest);
    }
}

/// Everything known about one sending domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainAggregate {
    /// Always equal to the sum of the senders' counts.
    pub total_count: u64,
    pub is_personal: bool,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub senders: HashMap<String, SenderAggregate>,
}

impl DomainAggregate {
    pub fn new(is_personal: bool) -> Self {
        Self {
            total_count: 0,
            is_personal,
            earliest: None,
            latest: None,
            senders: HashMap::new(),
        }
    }

    /// Combine `other` into `self`.
    pub fn absorb(&mut self, other: DomainAggregate) {
        self.total_count += other.total_count;
        self.is_personal |= other.is_personal;
        self.earliest = min_date(self.earliest, other.earliest);
        self.latest = max_date(self.latest, other.latest);
        for (address, sender) in other.senders {
            match self.senders.get_mut(&address) {
                Some(existing) => existing.absorb(&sender),
                None => {
                    self.senders.insert(address, sender);
                }
            }
        }
    }

    /// Value form of [`absorb`](Self::absorb).
    pub fn merged(mut self, other: DomainAggregate) -> Self {
        self.absorb(other);
        self
    }

    /// Whether `total_count` matches the senders and the domain bounds cover
    /// every sender bound.
    pub fn is_consistent(&self) -> bool {
        let sum: u64 = self.senders.values().map(|s| s.count).sum();
        let bounded = self.senders.values().all(|s| {
            s.earliest.is_none_or(|e| self.earliest.is_some_and(|d| d <= e))
                && s.latest.is_none_or(|l| self.latest.is_some_and(|d| d >= l))
        });
        let ordered = match (self.earliest, self.latest) {
            (Some(e), Some(l)) => e <= l,
            _ => true,
        };
        sum == self.total_count && bounded && ordered
    }
}

/// Domain → aggregate mapping for one batch, or for the accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialAggregate {
    domains: HashMap<String, DomainAggregate>,
}

impl PartialAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one message from `sender`.
    ///
    /// Equivalent to absorbing a singleton aggregate, without building one.
    pub fn record(
        &mut self,
        sender: &SenderAddress,
        date: Option<DateTime<Utc>>,
        is_personal: impl FnOnce(&str) -> bool,
    ) {
        if !self.domains.contains_key(&sender.domain) {
            let fresh = DomainAggregate::new(is_personal(&sender.domain));
            self.domains.insert(sender.domain.clone(), fresh);
        }
        let Some(domain) = self.domains.get_mut(&sender.domain) else {
            return;
        };
        let single = SenderAggregate::single(date);
        domain.total_count += 1;
        domain.earliest = min_date(domain.earliest, date);
        domain.latest = max_date(domain.latest, date);
        let key = sender.key();
        match domain.senders.get_mut(&key) {
            Some(existing) => existing.absorb(&single),
            None => {
                domain.senders.insert(key, single);
            }
        }
    }

    /// Combine another partial aggregate into this one.
    pub fn absorb(&mut self, other: PartialAggregate) {
        for (name, aggregate) in other.domains {
            self.absorb_domain(name, aggregate);
        }
    }

    /// Combine a single domain's aggregate into this one.
    pub fn absorb_domain(&mut self, name: String, aggregate: DomainAggregate) {
        match self.domains.get_mut(&name) {
            Some(existing) => existing.absorb(aggregate),
            None => {
                self.domains.insert(name, aggregate);
            }
        }
    }

    /// Value form of [`absorb`](Self::absorb).
    pub fn merged(mut self, other: PartialAggregate) -> Self {
        self.absorb(other);
        self
    }

    pub fn get(&self, domain: &str) -> Option<&DomainAggregate> {
        self.domains.get(domain)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn sender_count(&self) -> usize {
        self.domains.values().map(|d| d.senders.len()).sum()
    }

    /// Total messages recorded across all domains.
    pub fn message_count(&self) -> u64 {
        self.domains.values().map(|d| d.total_count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DomainAggregate)> {
        self.domains.iter()
    }

    /// Rough heap footprint in bytes, for progress reporting only.
    pub fn estimated_bytes(&self) -> u64 {
        const MAP_SLOT: usize = 16;
        let mut total = 0usize;
        for (name, domain) in &self.domains {
            total += name.capacity() + std::mem::size_of::<DomainAggregate>() + MAP_SLOT;
            for address in domain.senders.keys() {
                total += address.capacity() + std::mem::size_of::<SenderAggregate>() + MAP_SLOT;
            }
        }
        total as u64
    }
}

impl IntoIterator for PartialAggregate {
    type Item = (String, DomainAggregate);
    type IntoIter = std::collections::hash_map::IntoIter<String, DomainAggregate>;

    fn into_iter(self) -> Self::IntoIter {
        self.domains.into_iter()
    }
}

impl FromIterator<(String, DomainAggregate)> for PartialAggregate {
    fn from_iter<I: IntoIterator<Item = (String, DomainAggregate)>>(iter: I) -> Self {
        let mut partial = PartialAggregate::new();
        for (name, aggregate) in iter {
            partial.absorb_domain(name, aggregate);
        }
        partial
    }
}

pub(crate) fn min_date(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

pub(crate) fn max_date(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
    }

    fn addr(s: &str) -> SenderAddress {
        SenderAddress::parse(s).unwrap()
    }

    fn sample(entries: &[(&str, Option<DateTime<Utc>>)]) -> PartialAggregate {
        let mut p = PartialAggregate::new();
        for (a, d) in entries {
            p.record(&addr(a), *d, |domain| domain == "gmail.com");
        }
        p
    }

    #[test]
    fn test_record_counts_and_bounds() {
        let p = sample(&[
            ("a@x.com", day(2021, 6, 1)),
            ("a@x.com", day(2020, 1, 1)),
            ("b@x.com", None),
        ]);
        let x = p.get("x.com").unwrap();
        assert_eq!(x.total_count, 3);
        assert_eq!(x.earliest, day(2020, 1, 1));
        assert_eq!(x.latest, day(2021, 6, 1));
        let a = &x.senders["a@x.com"];
        assert_eq!(a.count, 2);
        assert_eq!(a.earliest, day(2020, 1, 1));
        assert_eq!(x.senders["b@x.com"].earliest, None);
        assert!(x.is_consistent());
    }

    #[test]
    fn test_personal_flag_from_predicate() {
        let p = sample(&[("me@gmail.com", None), ("me@corp.com", None)]);
        assert!(p.get("gmail.com").unwrap().is_personal);
        assert!(!p.get("corp.com").unwrap().is_personal);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = sample(&[("a@x.com", day(2020, 1, 1)), ("c@z.org", None)]);
        let b = sample(&[("a@x.com", day(2019, 3, 1)), ("b@y.com", day(2022, 2, 2))]);
        assert_eq!(a.clone().merged(b.clone()), b.merged(a));
    }

    #[test]
    fn test_merge_is_associative() {
        let a = sample(&[("a@x.com", day(2020, 1, 1))]);
        let b = sample(&[("a@x.com", None), ("b@x.com", day(2018, 5, 5))]);
        let c = sample(&[("a@x.com", day(2023, 7, 7)), ("d@w.net", day(2001, 1, 1))]);
        let left = a.clone().merged(b.clone()).merged(c.clone());
        let right = a.merged(b.merged(c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let all = [
            ("a@x.com", day(2020, 1, 1)),
            ("b@x.com", day(2020, 2, 1)),
            ("a@x.com", None),
            ("c@y.com", day(2019, 1, 1)),
        ];
        let whole = sample(&all);
        let split = sample(&all[..2]).merged(sample(&all[2..]));
        assert_eq!(whole, split);
        assert_eq!(whole.message_count(), 4);
    }

    #[test]
    fn test_absent_dates_are_unset() {
        let mut s = SenderAggregate::single(None);
        s.absorb(&SenderAggregate::single(day(2020, 1, 1)));
        assert_eq!(s.earliest, day(2020, 1, 1));
        assert_eq!(s.latest, day(2020, 1, 1));
        assert_eq!(s.count, 2);
    }

    #[test]
    fn test_counts() {
        let p = sample(&[("a@x.com", None), ("b@x.com", None), ("a@y.com", None)]);
        assert_eq!(p.domain_count(), 2);
        assert_eq!(p.sender_count(), 3);
        assert!(p.estimated_bytes() > 0);
        assert!(PartialAggregate::new().is_empty());
    }
}
