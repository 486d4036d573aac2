//! Batch aggregation: one byte range in, one partial aggregate out.
//!
//! The range is read in chunks, decoded incrementally (a multi-byte
//! character split between two chunks is reassembled by the decoder), split
//! into lines, and fed to a fresh [`MessageScanner`]. Decoder and line
//! buffer state never outlive the batch.

use std::io::{ErrorKind, Read};
use std::ops::Range;

use encoding_rs::{CoderResult, Decoder, Encoding};
use tracing::debug;

use super::CancelToken;
use crate::error::{RankError, Result};
use crate::model::aggregate::PartialAggregate;
use crate::model::personal::PersonalProviders;
use crate::parser::scanner::{MessageScanner, ScannedMessage};
use crate::source::{ByteSource, RangeReader};

/// Default chunk size for reads inside a batch (1 MiB).
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Settings for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub read_chunk_size: usize,
    pub encoding: &'static Encoding,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            encoding: encoding_rs::UTF_8,
        }
    }
}

/// Result of aggregating one range.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub partial: PartialAggregate,
    /// Messages recorded (those with a usable `From:` address).
    pub messages: u64,
    /// Envelope separators seen.
    pub boundaries: u64,
    pub bytes: u64,
}

/// Aggregate the messages in `range` of `source`.
///
/// A sender still pending when the range ends is recorded, on the
/// assumption that ranges are cut at message boundaries.
///
/// I/O failures come back as [`RankError::Source`] with the counters of
/// this batch only.
pub fn aggregate_range<S: ByteSource + ?Sized>(
    source: &mut S,
    range: Range<u64>,
    options: &BatchOptions,
    personal: &PersonalProviders,
    cancel: &CancelToken,
) -> Result<BatchOutcome> {
    let mut decoder = if range.start == 0 {
        options.encoding.new_decoder()
    } else {
        options.encoding.new_decoder_without_bom_handling()
    };
    let mut raw = vec![0u8; options.read_chunk_size.max(1)];
    let mut pending = String::new();
    let mut scanner = MessageScanner::new();
    let mut outcome = BatchOutcome {
        bytes: range.end.saturating_sub(range.start),
        ..BatchOutcome::default()
    };
    let mut reader = RangeReader::new(source, range.clone());

    loop {
        if cancel.is_cancelled() {
            return Err(RankError::Cancelled);
        }

        let offset = reader.position();
        let n = match reader.read(&mut raw) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(RankError::Source {
                    offset,
                    bytes_processed: offset - range.start,
                    messages_counted: outcome.messages,
                    source: e,
                })
            }
        };
        let last = n == 0;

        decode_into(&mut decoder, &raw[..n], &mut pending, last);
        drain_lines(&mut pending, |line| {
            if let Some(msg) = scanner.feed_line(line) {
                record(&mut outcome, msg, personal);
            }
        });

        if last {
            break;
        }
    }

    // Unterminated final line
    if !pending.is_empty() {
        if let Some(msg) = scanner.feed_line(&pending) {
            record(&mut outcome, msg, personal);
        }
    }
    if let Some(msg) = scanner.finish() {
        record(&mut outcome, msg, personal);
    }
    outcome.boundaries = scanner.boundaries();

    debug!(
        start = range.start,
        end = range.end,
        messages = outcome.messages,
        domains = outcome.partial.domain_count(),
        "Batch aggregated"
    );
    Ok(outcome)
}

fn record(outcome: &mut BatchOutcome, msg: ScannedMessage, personal: &PersonalProviders) {
    outcome
        .partial
        .record(&msg.sender, msg.date, |domain| personal.contains(domain));
    outcome.messages += 1;
}

/// Decode `input` onto the end of `out`, carrying incomplete sequences in
/// the decoder until the next call.
fn decode_into(decoder: &mut Decoder, input: &[u8], out: &mut String, last: bool) {
    let mut consumed = 0;
    loop {
        match decoder.max_utf8_buffer_length(input.len() - consumed) {
            Some(needed) => out.reserve(needed),
            None => out.reserve(input.len() - consumed),
        }
        let (result, read, _had_errors) =
            decoder.decode_to_string(&input[consumed..], out, last);
        consumed += read;
        match result {
            CoderResult::InputEmpty => break,
            CoderResult::OutputFull => out.reserve(out.capacity().max(1024)),
        }
    }
}

/// Hand every complete line in `text` to `on_line` and keep the remainder.
fn drain_lines(text: &mut String, mut on_line: impl FnMut(&str)) {
    let Some(last_newline) = text.rfind('\n') else {
        return;
    };
    for line in text[..=last_newline].split_inclusive('\n') {
        on_line(line);
    }
    text.drain(..=last_newline);
}
