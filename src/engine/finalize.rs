//! End-of-run consolidation of everything spilled to the overflow store.

use tracing::info;

use crate::error::Result;
use crate::model::aggregate::PartialAggregate;
use crate::model::ranked::{sort_groups, RankedGroup};
use crate::store::{self, OverflowStore};

use super::CancelToken;

/// Flush the residual accumulator, read the store back and rank the result.
///
/// The store is left populated; the caller clears it.
pub fn finalize<S: OverflowStore + ?Sized>(
    store: &mut S,
    residual: PartialAggregate,
    sub_batch: usize,
    cancel: &CancelToken,
) -> Result<(Vec<RankedGroup>, store::FlushReport)> {
    let report = store::merge_into(store, residual, sub_batch, cancel)?;

    let mut groups: Vec<RankedGroup> = store::read_all(store)?
        .into_iter()
        .map(|(domain, aggregate)| RankedGroup::from_aggregate(domain, aggregate))
        .collect();
    sort_groups(&mut groups);

    info!(groups = groups.len(), "Finalized ranking");
    Ok((groups, report))
}
