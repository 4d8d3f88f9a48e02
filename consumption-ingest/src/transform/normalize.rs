//! Conversion of raw portal text into typed values.
//!
//! Everything here is total: malformed input yields `None` or a
//! [`DateParseError`], never a panic.

use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised date '{input}'")]
pub struct DateParseError {
    pub input: String,
}

/// Parses a locale-formatted number such as `"1.234,56"`.
///
/// `.` is a thousands separator and `,` the decimal mark. A lone dot that is
/// not followed by exactly three digits is read as a decimal point so that
/// already-normalized values like `"12.3"` round-trip unchanged. Units and
/// other stray characters are dropped. Empty or unparsable input is `None`,
/// which callers treat as "no reading" (distinct from `0.0`).
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        match ch {
            '0'..='9' | '.' | ',' => cleaned.push(ch),
            '-' if cleaned.is_empty() => cleaned.push(ch),
            _ => {}
        }
    }

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if is_plain_decimal(&cleaned) {
        cleaned
    } else {
        cleaned.replace('.', "")
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_plain_decimal(s: &str) -> bool {
    let mut parts = s.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(frac), None) => frac.len() != 3,
        _ => false,
    }
}

/// Parses the portal's day column into a calendar date.
///
/// Tried in order: `DD/MM/YYYY` or `DD.MM.YYYY`, then `YYYY-MM-DD`, then a
/// permissive pass (unpadded day/month, `DD-MM-YYYY`, `YYYY/MM/DD` and the
/// date part of an RFC 3339 timestamp).
pub fn parse_source_date(raw: &str) -> Result<Date, DateParseError> {
    let s = raw.trim();

    let day_first = [
        format_description!("[day]/[month]/[year]"),
        format_description!("[day].[month].[year]"),
    ];
    if let Some(date) = day_first.iter().find_map(|f| Date::parse(s, f).ok()) {
        return Ok(date);
    }

    if let Ok(date) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Ok(date);
    }

    permissive_date(s).ok_or_else(|| DateParseError {
        input: raw.to_string(),
    })
}

fn permissive_date(s: &str) -> Option<Date> {
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(ts.date());
    }

    let loose = [
        format_description!("[day padding:none]/[month padding:none]/[year]"),
        format_description!("[day padding:none].[month padding:none].[year]"),
        format_description!("[day padding:none]-[month padding:none]-[year]"),
        format_description!("[year]/[month padding:none]/[day padding:none]"),
        format_description!("[year]-[month padding:none]-[day padding:none]"),
    ];
    if let Some(date) = loose.iter().find_map(|f| Date::parse(s, f).ok()) {
        return Some(date);
    }

    // "2025-11-01 00:00" and similar: retry on the leading date token.
    let head = s.split([' ', 'T']).next().filter(|h| h.len() < s.len())?;
    parse_source_date(head).ok()
}

/// Reads an hour column header (`"7"`, `"07:00"`, `"07-08"`, `"h07"`).
pub fn parse_hour_label(raw: &str) -> Option<u8> {
    let s = raw.trim().trim_start_matches(['h', 'H']);
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    digits.parse::<u8>().ok().filter(|h| *h < 24)
}
