//! Batch range planning.
//!
//! Cuts the source into successive, non-overlapping ranges of roughly the
//! nominal batch size. With alignment enabled each cut is moved forward to
//! the start of the next envelope separator line, so a message never spans
//! two batches.

use std::io;
use std::ops::Range;

use tracing::trace;

use super::{read_full, ByteSource};

/// Default nominal batch size (50 MiB).
pub const DEFAULT_BATCH_SIZE: u64 = 50 * 1024 * 1024;

/// How much to read at a time while looking for a separator.
const SCAN_WINDOW: usize = 64 * 1024;

const SEPARATOR: &[u8] = b"\nFrom ";

/// Yields the batch ranges for one source, in order.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    batch_size: u64,
    align: bool,
    next_start: u64,
    len: u64,
}

impl BatchPlanner {
    pub fn new(len: u64, batch_size: u64, align: bool) -> Self {
        Self {
            batch_size: batch_size.max(1),
            align,
            next_start: 0,
            len,
        }
    }

    /// The next range to process, or `None` once the source is covered.
    pub fn next_range<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> io::Result<Option<Range<u64>>> {
        let start = self.next_start;
        if start >= self.len {
            return Ok(None);
        }

        let nominal = start.saturating_add(self.batch_size);
        let end = if nominal >= self.len {
            self.len
        } else if self.align {
            find_separator(source, nominal, self.len)?.unwrap_or(self.len)
        } else {
            nominal
        };

        trace!(start, end, "Planned batch");
        self.next_start = end;
        Ok(Some(start..end))
    }
}

/// Offset of the first envelope separator line starting at or after `from`.
fn find_separator<S: ByteSource + ?Sized>(
    source: &mut S,
    from: u64,
    end: u64,
) -> io::Result<Option<u64>> {
    let mut window = vec![0u8; SCAN_WINDOW];
    // Start one byte early so a separator beginning exactly at `from` is seen.
    let mut pos = from.saturating_sub(1);

    while pos < end {
        let want = (end - pos).min(SCAN_WINDOW as u64) as usize;
        let n = read_full(source, pos, &mut window[..want])?;
        if let Some(i) = find_subslice(&window[..n], SEPARATOR) {
            return Ok(Some(pos + i as u64 + 1));
        }
        if n < want || pos + n as u64 >= end || n < SEPARATOR.len() {
            break;
        }
        // Overlap windows so a separator split across them is still found.
        pos += (n - (SEPARATOR.len() - 1)) as u64;
    }
    Ok(None)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
