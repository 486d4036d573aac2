//! The streaming aggregation engine.
//!
//! One run walks the source in sequential batches on a single worker:
//!
//! ```text
//! source ─► BatchPlanner ─► aggregate_range ─► Accumulator ─(over limit)─► OverflowStore
//!                                                   │                            │
//!                                                   └──── finalize: flush, read back, rank
//! ```
//!
//! The overflow store is cleared before the first batch and after the last,
//! whether the run succeeds, fails or is cancelled.

pub mod accumulator;
pub mod batch;
pub mod finalize;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{RankError, Result};
use crate::model::personal::PersonalProviders;
use crate::model::ranked::RankedGroup;
use crate::source::planner::{BatchPlanner, DEFAULT_BATCH_SIZE};
use crate::source::ByteSource;
use crate::store::{self, OverflowStore, DEFAULT_SPILL_SUB_BATCH};

use accumulator::{Accumulator, MemoryReport, SpillLimits};
use batch::BatchOptions;

/// Cooperative cancellation handle. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next suspension point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hand control back to the host between batches and spill sub-batches.
pub(crate) fn yield_point() {
    std::thread::yield_now();
}

/// Progress report emitted after every batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// 0.0 ..= 100.0
    pub fraction_complete: f64,
    pub bytes_processed: u64,
    pub messages: u64,
    /// Absent when there is nothing in memory to report on.
    pub memory: Option<MemoryReport>,
}

/// Tuning for one engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Nominal batch size in bytes.
    pub batch_size: u64,
    /// Move batch cuts to the next envelope separator.
    pub align_batches: bool,
    pub batch: BatchOptions,
    pub limits: SpillLimits,
    /// Domains per overflow store sub-batch.
    pub spill_sub_batch: usize,
    pub personal: PersonalProviders,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            align_batches: true,
            batch: BatchOptions::default(),
            limits: SpillLimits::default(),
            spill_sub_batch: DEFAULT_SPILL_SUB_BATCH,
            personal: PersonalProviders::default(),
        }
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub bytes: u64,
    /// Messages with a usable `From:` address.
    pub messages: u64,
    pub batches: u64,
    pub spills: u64,
    /// Domains lost to failed overflow store writes.
    pub failed_store_writes: usize,
}

/// The ranked result of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub groups: Vec<RankedGroup>,
    pub summary: RunSummary,
}

impl RunOutput {
    /// What a cancelled run amounts to.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Streaming aggregation engine over one overflow store.
pub struct Engine<S: OverflowStore> {
    store: S,
    options: EngineOptions,
}

impl<S: OverflowStore> Engine<S> {
    pub fn new(store: S, options: EngineOptions) -> Self {
        Self { store, options }
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Aggregate the whole of `source` and return the ranked domains.
    ///
    /// Returns [`RankError::Cancelled`] (and no partial result) when
    /// `cancel` is raised, and [`RankError::Source`] when the source cannot
    /// be read. Overflow store write failures during spills are logged and
    /// counted in [`RunSummary::failed_store_writes`] instead.
    pub fn run<B: ByteSource + ?Sized>(
        &mut self,
        source: &mut B,
        progress: Option<&dyn Fn(&Progress)>,
        cancel: &CancelToken,
    ) -> Result<RunOutput> {
        info!(bytes = source.len(), "Starting run");

        self.store
            .clear()
            .map_err(|e| RankError::StoreInitialization {
                path: self.store.location(),
                reason: format!("cannot clear leftover state: {e}"),
            })?;

        let result = self.run_batches(source, progress, cancel);

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not clear overflow store after run");
        }

        match &result {
            Ok(output) => info!(
                groups = output.groups.len(),
                messages = output.summary.messages,
                batches = output.summary.batches,
                spills = output.summary.spills,
                "Run complete"
            ),
            Err(RankError::Cancelled) => info!("Run cancelled"),
            Err(e) => warn!(error = %e, "Run failed"),
        }
        result
    }

    fn run_batches<B: ByteSource + ?Sized>(
        &mut self,
        source: &mut B,
        progress: Option<&dyn Fn(&Progress)>,
        cancel: &CancelToken,
    ) -> Result<RunOutput> {
        let total = source.len();
        let mut planner =
            BatchPlanner::new(total, self.options.batch_size, self.options.align_batches);
        let mut accumulator = Accumulator::new(self.options.limits);
        let mut summary = RunSummary::default();

        loop {
            if cancel.is_cancelled() {
                return Err(RankError::Cancelled);
            }

            let range = match planner.next_range(source) {
                Ok(Some(range)) => range,
                Ok(None) => break,
                Err(e) => {
                    return Err(RankError::Source {
                        offset: summary.bytes,
                        bytes_processed: summary.bytes,
                        messages_counted: summary.messages,
                        source: e,
                    })
                }
            };

            let outcome = batch::aggregate_range(
                source,
                range,
                &self.options.batch,
                &self.options.personal,
                cancel,
            )
            .map_err(|e| with_run_context(e, &summary))?;

            summary.bytes += outcome.bytes;
            summary.messages += outcome.messages;
            summary.batches += 1;

            if accumulator.absorb(outcome.partial) {
                let report = store::merge_into(
                    &mut self.store,
                    accumulator.take(),
                    self.options.spill_sub_batch,
                    cancel,
                )?;
                summary.spills += 1;
                summary.failed_store_writes += report.failed_domains;
                info!(
                    spill = summary.spills,
                    domains = report.domains,
                    failed = report.failed_domains,
                    "Spilled accumulator to overflow store"
                );
            }

            if let Some(cb) = progress {
                cb(&Progress {
                    fraction_complete: percent(summary.bytes, total),
                    bytes_processed: summary.bytes,
                    messages: summary.messages,
                    memory: accumulator.memory_report(),
                });
            }
            yield_point();
        }

        if summary.batches == 0 {
            if let Some(cb) = progress {
                cb(&Progress {
                    fraction_complete: 100.0,
                    bytes_processed: 0,
                    messages: 0,
                    memory: None,
                });
            }
        }

        debug!(residual_domains = accumulator.domain_count(), "Finalizing");
        let (groups, report) = finalize::finalize(
            &mut self.store,
            accumulator.take(),
            self.options.spill_sub_batch,
            cancel,
        )?;
        summary.failed_store_writes += report.failed_domains;

        Ok(RunOutput { groups, summary })
    }
}

/// Add the run-wide counters to a batch-level source error.
fn with_run_context(e: RankError, summary: &RunSummary) -> RankError {
    match e {
        RankError::Source {
            offset,
            bytes_processed,
            messages_counted,
            source,
        } => RankError::Source {
            offset,
            bytes_processed: summary.bytes + bytes_processed,
            messages_counted: summary.messages + messages_counted,
            source,
        },
        other => other,
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64 * 100.0).min(100.0)
    }
}
