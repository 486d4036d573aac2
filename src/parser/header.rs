//! Header field matching and lenient date parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

/// If `line` is the header `name` (case-insensitive, no folding), return its
/// trimmed value.
///
/// `name` must be lower-case ASCII and include no colon.
pub fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let prefix = line.get(..name.len())?;
    if !prefix.eq_ignore_ascii_case(name) {
        return None;
    }
    line[name.len()..].strip_prefix(':').map(str::trim)
}

/// Layouts tried in order once the strict RFC parsers have given up.
const LAYOUTS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %Z",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M %z",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Zone abbreviations and their offsets. Longer names first, since
/// `CEST` also ends in `EST`.
const ZONE_OFFSETS: &[(&str, &str)] = &[
    ("CEST", "+0200"),
    ("CET", "+0100"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("JST", "+0900"),
];

/// Lenient `Date:` parsing.
///
/// Accepts RFC 2822, RFC 3339, a bare `YYYY-MM-DD` and the usual mangled
/// variants: no weekday, `16-JUL-2025` months, zone names, trailing
/// `(comment)`s. Returns `None` when nothing fits.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let value = date_str.trim();
    if value.is_empty() {
        return None;
    }

    let strict = DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc));
    if strict.is_some() {
        return strict;
    }
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
    }

    let bare = drop_weekday(value);
    let variants = [bare.to_string(), normalize_imap_date(bare)];

    let parsed = variants
        .iter()
        .find_map(|v| with_layouts(v, true))
        .or_else(|| {
            variants
                .iter()
                .find_map(|v| with_layouts(&numeric_zone(drop_comment(v)), false))
        })
        .or_else(|| mail_parser_date(value));
    if parsed.is_none() {
        debug!(date = value, "Unparseable date");
    }
    parsed
}

/// First layout that fits `value`. Zoneless results are taken as UTC when
/// `allow_naive` is set.
fn with_layouts(value: &str, allow_naive: bool) -> Option<DateTime<Utc>> {
    LAYOUTS.iter().find_map(|layout| {
        if let Ok(dt) = DateTime::parse_from_str(value, layout) {
            return Some(dt.with_timezone(&Utc));
        }
        if !allow_naive {
            return None;
        }
        NaiveDateTime::parse_from_str(value, layout)
            .ok()
            .map(|ndt| Utc.from_utc_datetime(&ndt))
    })
}

fn mail_parser_date(value: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    let header_block = format!("Date: {value}\n\n");
    let message = MessageParser::default().parse(header_block.as_bytes())?;
    let date = message.date()?;
    // Unparseable input comes back as an all-zero date.
    if date.year == 0 {
        return None;
    }
    DateTime::parse_from_rfc3339(&date.to_rfc3339())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `"16-JUL-2025 03:01:03"` becomes `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    let bytes = s.as_bytes();
    for (i, window) in bytes.windows(5).enumerate() {
        if window[0] != b'-' || window[4] != b'-' {
            continue;
        }
        if let Some(month) = MONTHS
            .iter()
            .find(|m| m.as_bytes().eq_ignore_ascii_case(&window[1..4]))
        {
            return format!("{} {month} {}", &s[..i], &s[i + 5..]);
        }
    }
    s.to_string()
}

/// `"Thu, 04 Jan"` and `"Thu 04 Jan"` both become `"04 Jan"`.
fn drop_weekday(s: &str) -> &str {
    WEEKDAYS
        .iter()
        .find_map(|day| {
            let rest = s.strip_prefix(day)?;
            rest.starts_with([',', ' '])
                .then(|| rest.trim_start_matches(',').trim())
        })
        .unwrap_or(s)
}

fn drop_comment(s: &str) -> &str {
    let t = s.trim_end();
    match t.rfind('(') {
        Some(open) if t.ends_with(')') => t[..open].trim_end(),
        _ => s,
    }
}

fn numeric_zone(s: &str) -> String {
    ZONE_OFFSETS
        .iter()
        .find_map(|(name, offset)| s.strip_suffix(name).map(|head| format!("{head}{offset}")))
        .unwrap_or_else(|| s.to_string())
}
