//! Sender address extraction from `From:` header values.

/// A sender address normalized for aggregation.
///
/// The domain is lower-cased; the local part keeps the case it was observed
/// with, so `Alice@Example.COM` and `alice@example.com` are two senders of
/// the same domain.
///
/// # Examples
/// - `"Alice <Alice@Example.COM>"` → `local = "Alice"`, `domain = "example.com"`
/// - `"\"bob@y.com\""` → `local = "bob"`, `domain = "y.com"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderAddress {
    /// Everything before the `@`, as observed.
    pub local: String,
    /// Everything after the last unescaped `@`, lower-cased.
    pub domain: String,
}

impl SenderAddress {
    /// Parse the value of a `From:` header.
    ///
    /// An angle-bracketed address wins when present; otherwise the whole
    /// value is used with surrounding quotes stripped. Returns `None` for
    /// values that carry no usable `local@domain`.
    pub fn from_header_value(raw: &str) -> Option<Self> {
        Self::parse(&extract_candidate(raw))
    }

    /// Normalize a bare address candidate.
    pub fn parse(candidate: &str) -> Option<Self> {
        let at = last_unescaped_at(candidate)?;

        let domain: String = candidate[at + 1..]
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '>')
            .collect::<String>()
            .trim_end_matches(['"', '\'', ',', ';'])
            .to_lowercase();
        if domain.is_empty() {
            return None;
        }

        // "Display Name user@host" without brackets: the local part is the
        // last token before the '@'.
        let local = candidate[..at]
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(['<', '"', '\'']);
        if local.is_empty() {
            return None;
        }

        Some(Self {
            local: local.to_string(),
            domain,
        })
    }

    /// The aggregation key: `local@domain`.
    pub fn key(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

impl std::fmt::Display for SenderAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Pick the address-bearing part of a header value.
fn extract_candidate(raw: &str) -> String {
    let trimmed = raw.trim();
    // First bracketed part only: later ones belong to other mailboxes or comments.
    if let Some(angle_start) = trimmed.find('<') {
        if let Some(len) = trimmed[angle_start..].find('>') {
            return trimmed[angle_start + 1..angle_start + len].trim().to_string();
        }
    }
    strip_quotes(trimmed)
}

/// Strip surrounding double or single quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    s.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Byte index of the last `@` not preceded by a backslash.
fn last_unescaped_at(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    bytes
        .iter()
        .enumerate()
        .rev()
        .find(|&(i, &b)| b == b'@' && (i == 0 || bytes[i - 1] != b'\\'))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = SenderAddress::from_header_value("user@Example.com").unwrap();
        assert_eq!(addr.local, "user");
        assert_eq!(addr.domain, "example.com");
        assert_eq!(addr.key(), "user@example.com");
    }

    #[test]
    fn test_angle_address_preferred() {
        let addr = SenderAddress::from_header_value("User One <User1@MAIL.Example.com>").unwrap();
        assert_eq!(addr.key(), "User1@mail.example.com");
    }

    #[test]
    fn test_quoted_name_with_at_sign() {
        let addr =
            SenderAddress::from_header_value("\"someone@fake.org\" <real@example.com>").unwrap();
        assert_eq!(addr.domain, "example.com");
        assert_eq!(addr.local, "real");
    }

    #[test]
    fn test_first_bracketed_address_wins() {
        let addr = SenderAddress::from_header_value("Alice <a@x.com>, Bob <b@y.com>").unwrap();
        assert_eq!(addr.key(), "a@x.com");

        let addr =
            SenderAddress::from_header_value("Alice <a@x.com> (via <list@y.com>)").unwrap();
        assert_eq!(addr.key(), "a@x.com");
    }

    #[test]
    fn test_quoted_bare_address() {
        let addr = SenderAddress::from_header_value("'bob@y.com'").unwrap();
        assert_eq!(addr.key(), "bob@y.com");
    }

    #[test]
    fn test_domain_stops_at_whitespace() {
        let addr = SenderAddress::from_header_value("a@x.com (Alice)").unwrap();
        assert_eq!(addr.domain, "x.com");
        assert_eq!(addr.local, "a");
    }

    #[test]
    fn test_escaped_at_is_skipped() {
        let addr = SenderAddress::parse("weird\\@name@host.net").unwrap();
        assert_eq!(addr.domain, "host.net");
        assert_eq!(addr.local, "weird\\@name");
    }

    #[test]
    fn test_missing_at_is_rejected() {
        assert!(SenderAddress::from_header_value("Mailer Daemon").is_none());
        assert!(SenderAddress::from_header_value("").is_none());
        assert!(SenderAddress::from_header_value("<>").is_none());
    }

    #[test]
    fn test_empty_parts_are_rejected() {
        assert!(SenderAddress::parse("user@").is_none());
        assert!(SenderAddress::parse("@example.com").is_none());
    }
}
