//! Overflow store: a persistent, merge-on-write map from domain to aggregate.
//!
//! The engine spills its accumulator here when memory limits are hit and
//! reads everything back once at the end of a run. Writes apply the same
//! merge law as the in-memory accumulator, so neither flush order nor flush
//! size changes the final result.
//!
//! A store belongs to one run at a time: every run clears it before and after
//! use, so two concurrent runs sharing a store corrupt each other.

pub mod memory;
pub mod sqlite;
pub mod stored;

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::engine::{yield_point, CancelToken};
use crate::error::{RankError, Result};
use crate::model::aggregate::{DomainAggregate, PartialAggregate};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use stored::StoredAggregate;

/// Default number of domains written per sub-batch of a flush.
pub const DEFAULT_SPILL_SUB_BATCH: usize = 500;

/// Keyed persistent storage for spilled aggregates.
pub trait OverflowStore {
    fn get(&mut self, domain: &str) -> Result<Option<StoredAggregate>>;

    fn put(&mut self, domain: &str, value: &StoredAggregate) -> Result<()>;

    fn get_all(&mut self) -> Result<Vec<(String, StoredAggregate)>>;

    /// Remove every entry.
    fn clear(&mut self) -> Result<()>;

    /// Where the store lives, for error messages.
    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }

    /// Whether [`merge_chunk`](Self::merge_chunk) applies a sub-batch all or
    /// nothing. Flushes into other backends write and count failures one
    /// domain at a time.
    fn is_transactional(&self) -> bool {
        false
    }

    /// Merge one bounded sub-batch into the stored values.
    ///
    /// The default applies entries one by one and stops at the first error,
    /// leaving earlier entries written.
    fn merge_chunk(&mut self, chunk: Vec<(String, DomainAggregate)>) -> Result<()> {
        for (domain, incoming) in chunk {
            let merged = match self.get(&domain)? {
                Some(existing) => existing.into_aggregate().merged(incoming),
                None => incoming,
            };
            self.put(&domain, &StoredAggregate::from(&merged))?;
        }
        Ok(())
    }
}

impl<T: OverflowStore + ?Sized> OverflowStore for Box<T> {
    fn get(&mut self, domain: &str) -> Result<Option<StoredAggregate>> {
        (**self).get(domain)
    }

    fn put(&mut self, domain: &str, value: &StoredAggregate) -> Result<()> {
        (**self).put(domain, value)
    }

    fn get_all(&mut self) -> Result<Vec<(String, StoredAggregate)>> {
        (**self).get_all()
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn location(&self) -> PathBuf {
        (**self).location()
    }

    fn is_transactional(&self) -> bool {
        (**self).is_transactional()
    }

    fn merge_chunk(&mut self, chunk: Vec<(String, DomainAggregate)>) -> Result<()> {
        (**self).merge_chunk(chunk)
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub domains: usize,
    pub chunks: usize,
    /// Domains that failed to write and were dropped.
    pub failed_domains: usize,
}

/// Flush `batch` into `store` in sub-batches of at most `sub_batch` domains.
///
/// A failing sub-batch is logged and skipped; the flush carries on with the
/// rest. Only cancellation stops it early.
pub fn merge_into<S: OverflowStore + ?Sized>(
    store: &mut S,
    batch: PartialAggregate,
    sub_batch: usize,
    cancel: &CancelToken,
) -> Result<FlushReport> {
    let sub_batch = sub_batch.max(1);
    let mut report = FlushReport::default();
    let mut chunk: Vec<(String, DomainAggregate)> = Vec::with_capacity(sub_batch);

    for entry in batch {
        chunk.push(entry);
        if chunk.len() == sub_batch {
            write_chunk(store, std::mem::take(&mut chunk), &mut report);
            yield_point();
            if cancel.is_cancelled() {
                return Err(RankError::Cancelled);
            }
        }
    }
    if !chunk.is_empty() {
        write_chunk(store, chunk, &mut report);
    }

    debug!(
        domains = report.domains,
        chunks = report.chunks,
        failed = report.failed_domains,
        "Flush complete"
    );
    Ok(report)
}

fn write_chunk<S: OverflowStore + ?Sized>(
    store: &mut S,
    chunk: Vec<(String, DomainAggregate)>,
    report: &mut FlushReport,
) {
    let len = chunk.len();
    report.domains += len;
    report.chunks += 1;

    if store.is_transactional() {
        if let Err(e) = store.merge_chunk(chunk) {
            warn!(error = %e, domains = len, "Overflow store write failed, dropping sub-batch");
            report.failed_domains += len;
        }
        return;
    }

    for (domain, incoming) in chunk {
        if let Err(e) = store.merge_chunk(vec![(domain.clone(), incoming)]) {
            warn!(error = %e, domain = %domain, "Overflow store write failed, dropping domain");
            report.failed_domains += 1;
        }
    }
}

/// Read every stored aggregate back.
pub fn read_all<S: OverflowStore + ?Sized>(store: &mut S) -> Result<Vec<(String, DomainAggregate)>> {
    Ok(store
        .get_all()?
        .into_iter()
        .map(|(domain, stored)| (domain, stored.into_aggregate()))
        .collect())
}
