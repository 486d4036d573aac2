//! In-memory accumulator with a size-bounded spill policy.

use tracing::debug;

use crate::model::aggregate::PartialAggregate;

/// Default maximum number of distinct domains held in memory.
pub const DEFAULT_MAX_DOMAINS: usize = 20_000;

/// Default maximum number of distinct senders held in memory.
pub const DEFAULT_MAX_SENDERS: usize = 100_000;

/// When to spill the accumulator to the overflow store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillLimits {
    pub max_domains: usize,
    pub max_senders: usize,
}

impl Default for SpillLimits {
    fn default() -> Self {
        Self {
            max_domains: DEFAULT_MAX_DOMAINS,
            max_senders: DEFAULT_MAX_SENDERS,
        }
    }
}

/// Best-effort memory figures for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReport {
    /// Estimated heap footprint of the in-memory aggregate.
    pub used_bytes: u64,
    /// That estimate extrapolated to the spill ceiling.
    pub total_bytes: u64,
    pub distinct_domains: usize,
    pub distinct_senders: usize,
}

/// The run's single owned, mutable aggregate.
///
/// It only changes by absorbing batch results or by being taken for a spill.
#[derive(Debug, Default)]
pub struct Accumulator {
    current: PartialAggregate,
    limits: SpillLimits,
    sender_count: usize,
}

impl Accumulator {
    pub fn new(limits: SpillLimits) -> Self {
        Self {
            current: PartialAggregate::new(),
            limits,
            sender_count: 0,
        }
    }

    /// Fold a batch result in. Returns `true` when a limit is now exceeded
    /// and the caller should spill.
    pub fn absorb(&mut self, batch: PartialAggregate) -> bool {
        self.current.absorb(batch);
        self.sender_count = self.current.sender_count();
        let over = self.over_limits();
        if over {
            debug!(
                domains = self.current.domain_count(),
                senders = self.sender_count,
                "Accumulator over spill limits"
            );
        }
        over
    }

    pub fn over_limits(&self) -> bool {
        self.current.domain_count() > self.limits.max_domains
            || self.sender_count > self.limits.max_senders
    }

    /// Take everything accumulated so far, leaving the accumulator empty.
    pub fn take(&mut self) -> PartialAggregate {
        self.sender_count = 0;
        std::mem::take(&mut self.current)
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn domain_count(&self) -> usize {
        self.current.domain_count()
    }

    pub fn sender_count(&self) -> usize {
        self.sender_count
    }

    /// Memory figures, or `None` while nothing is held.
    pub fn memory_report(&self) -> Option<MemoryReport> {
        if self.current.is_empty() {
            return None;
        }
        let used = self.current.estimated_bytes();
        let fill = (self.domain_count() as f64 / self.limits.max_domains.max(1) as f64)
            .max(self.sender_count as f64 / self.limits.max_senders.max(1) as f64);
        let total = if fill > 0.0 {
            (used as f64 / fill) as u64
        } else {
            used
        };
        Some(MemoryReport {
            used_bytes: used,
            total_bytes: total.max(used),
            distinct_domains: self.domain_count(),
            distinct_senders: self.sender_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::address::SenderAddress;

    fn batch(addresses: &[&str]) -> PartialAggregate {
        let mut p = PartialAggregate::new();
        for a in addresses {
            p.record(&SenderAddress::parse(a).unwrap(), None, |_| false);
        }
        p
    }

    #[test]
    fn test_absorb_without_spill() {
        let mut acc = Accumulator::new(SpillLimits::default());
        assert!(!acc.absorb(batch(&["a@x.com", "b@x.com"])));
        assert!(!acc.absorb(batch(&["a@x.com"])));
        assert_eq!(acc.domain_count(), 1);
        assert_eq!(acc.sender_count(), 2);
    }

    #[test]
    fn test_domain_limit_triggers_spill() {
        let mut acc = Accumulator::new(SpillLimits {
            max_domains: 2,
            max_senders: 100,
        });
        assert!(!acc.absorb(batch(&["a@x.com", "a@y.com"])));
        assert!(acc.absorb(batch(&["a@z.com"])));
        let taken = acc.take();
        assert_eq!(taken.domain_count(), 3);
        assert!(acc.is_empty());
        assert_eq!(acc.sender_count(), 0);
        assert!(acc.memory_report().is_none());
    }

    #[test]
    fn test_sender_limit_triggers_spill() {
        let mut acc = Accumulator::new(SpillLimits {
            max_domains: 100,
            max_senders: 2,
        });
        assert!(acc.absorb(batch(&["a@x.com", "b@x.com", "c@x.com"])));
    }

    #[test]
    fn test_memory_report() {
        let mut acc = Accumulator::new(SpillLimits {
            max_domains: 4,
            max_senders: 100,
        });
        acc.absorb(batch(&["a@x.com", "a@y.com"]));
        let report = acc.memory_report().unwrap();
        assert_eq!(report.distinct_domains, 2);
        assert_eq!(report.distinct_senders, 2);
        assert!(report.total_bytes >= report.used_bytes);
    }
}
