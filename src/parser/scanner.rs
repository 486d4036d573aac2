//! Line-level MBOX scanner.
//!
//! A forward-only state machine over decoded lines. It knows just enough of
//! the format to pull the sender address and date out of each message: the
//! `From ` envelope separator, the `From:` and `Date:` headers, and the blank
//! line that ends the header block. Everything else is inert.

use chrono::{DateTime, Utc};
use tracing::trace;

use super::header::{header_value, parse_date};
use crate::model::address::SenderAddress;

/// A completed message that had a usable `From:` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedMessage {
    pub sender: SenderAddress,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    InHeaders,
    InBody,
}

/// Streaming message scanner.
///
/// Feed lines with [`feed_line`](Self::feed_line) (with or without their
/// line terminator) and call [`finish`](Self::finish) at the end of input.
/// Each returns the message that just ended, if it had a sender.
#[derive(Debug)]
pub struct MessageScanner {
    state: State,
    sender: Option<SenderAddress>,
    date: Option<DateTime<Utc>>,
    from_seen: bool,
    first_line: bool,
    boundaries: u64,
}

impl Default for MessageScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageScanner {
    /// A scanner positioned before any message. Lines before the first
    /// envelope separator are ignored.
    pub fn new() -> Self {
        Self {
            state: State::InBody,
            sender: None,
            date: None,
            from_seen: false,
            first_line: true,
            boundaries: 0,
        }
    }

    /// Number of envelope separators seen so far.
    pub fn boundaries(&self) -> u64 {
        self.boundaries
    }

    /// Process one line.
    pub fn feed_line(&mut self, line: &str) -> Option<ScannedMessage> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let line = if self.first_line {
            self.first_line = false;
            line.strip_prefix('\u{feff}').unwrap_or(line)
        } else {
            line
        };

        if is_envelope_separator(line) {
            let ended = self.take_message();
            self.state = State::InHeaders;
            self.boundaries += 1;
            return ended;
        }

        if self.state == State::InBody {
            return None;
        }

        if line.is_empty() {
            self.state = State::InBody;
        } else if let Some(value) = header_value(line, "from") {
            // Only the first From: header counts, even when it is unusable.
            if !self.from_seen {
                self.from_seen = true;
                self.sender = SenderAddress::from_header_value(value);
                if self.sender.is_none() {
                    trace!(value, "From: header without a usable address");
                }
            }
        } else if let Some(value) = header_value(line, "date") {
            if self.date.is_none() {
                self.date = parse_date(value);
            }
        }
        None
    }

    /// Signal end of input; returns the pending message, if any.
    pub fn finish(&mut self) -> Option<ScannedMessage> {
        let ended = self.take_message();
        self.state = State::InBody;
        ended
    }

    fn take_message(&mut self) -> Option<ScannedMessage> {
        self.from_seen = false;
        let date = self.date.take();
        self.sender
            .take()
            .map(|sender| ScannedMessage { sender, date })
    }
}

/// Check whether a line is an MBOX envelope separator (`From ` at the start).
pub fn is_envelope_separator(line: &str) -> bool {
    line.starts_with("From ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Vec<ScannedMessage> {
        let mut scanner = MessageScanner::new();
        let mut out: Vec<ScannedMessage> = text
            .split_inclusive('\n')
            .filter_map(|line| scanner.feed_line(line))
            .collect();
        out.extend(scanner.finish());
        out
    }

    #[test]
    fn test_is_envelope_separator() {
        assert!(is_envelope_separator(
            "From user@example.com Thu Jan 01 00:00:00 2024"
        ));
        assert!(!is_envelope_separator("from user@example.com"));
        assert!(!is_envelope_separator(">From user@example.com"));
        assert!(!is_envelope_separator("From: user@example.com"));
        assert!(!is_envelope_separator("Subject: From here"));
    }

    #[test]
    fn test_two_messages() {
        let text = "From a@x.com Mon Jan 1 00:00:00 2024\n\
                    From: Alice <a@x.com>\n\
                    Date: Mon, 01 Jan 2024 10:00:00 +0000\n\
                    \n\
                    Hello\n\
                    From b@y.com Tue Jan 2 00:00:00 2024\n\
                    From: b@Y.com\n\
                    \n\
                    Body\n";
        let msgs = scan(text);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].sender.key(), "a@x.com");
        assert!(msgs[0].date.is_some());
        assert_eq!(msgs[1].sender.key(), "b@y.com");
        assert_eq!(msgs[1].date, None);
    }

    #[test]
    fn test_headers_in_body_are_ignored() {
        let text = "From a@x.com Mon Jan 1 00:00:00 2024\n\
                    Subject: hi\n\
                    \n\
                    From: fake@evil.com\n\
                    Date: Mon, 01 Jan 2024 10:00:00 +0000\n";
        let msgs = scan(text);
        assert!(msgs.is_empty(), "From: in body must not count");
    }

    #[test]
    fn test_first_from_and_first_valid_date_win() {
        let text = "From x Mon Jan 1 00:00:00 2024\n\
                    Date: garbage\n\
                    From: first@a.com\n\
                    From: second@b.com\n\
                    Date: Wed, 01 Jan 2020 00:00:00 +0000\n\
                    Date: Fri, 01 Jan 2021 00:00:00 +0000\n\
                    \n";
        let msgs = scan(text);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].sender.domain, "a.com");
        assert_eq!(
            msgs[0].date.unwrap().format("%Y").to_string(),
            "2020",
            "first parseable Date: wins"
        );
    }

    #[test]
    fn test_unusable_first_from_is_not_replaced() {
        let text = "From x Mon Jan 1 00:00:00 2024\n\
                    From: Mailer Daemon\n\
                    From: real@a.com\n\
                    \n";
        assert!(scan(text).is_empty());
    }

    #[test]
    fn test_missing_from_contributes_nothing() {
        let text = "From x Mon Jan 1 00:00:00 2024\n\
                    Subject: no sender\n\
                    \n\
                    body\n";
        assert!(scan(text).is_empty());
    }

    #[test]
    fn test_crlf_and_bom() {
        let text = "\u{feff}From a@x.com Mon Jan 1 00:00:00 2024\r\n\
                    From: a@x.com\r\n\
                    \r\n\
                    body\r\n";
        let msgs = scan(text);
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn test_lines_before_first_separator_ignored() {
        let text = "From: stray@x.com\n\
                    \n\
                    From a@x.com Mon Jan 1 00:00:00 2024\n\
                    From: a@x.com\n";
        let msgs = scan(text);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].sender.key(), "a@x.com");
    }

    #[test]
    fn test_truncated_headers_flushed_on_finish() {
        let mut scanner = MessageScanner::new();
        assert!(scanner.feed_line("From a@x.com Mon Jan 1 00:00:00 2024\n").is_none());
        assert!(scanner.feed_line("From: a@x.com\n").is_none());
        let last = scanner.finish().unwrap();
        assert_eq!(last.sender.key(), "a@x.com");
        assert!(scanner.finish().is_none());
        assert_eq!(scanner.boundaries(), 1);
    }
}
