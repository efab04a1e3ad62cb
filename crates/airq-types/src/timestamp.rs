//! Provider timestamp parsing and UTC normalization.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

/// Parse a provider timestamp into an absolute instant.
///
/// RFC 3339 strings (`Z` or numeric offsets) keep their offset. ISO 8601
/// strings without any offset are taken to be UTC, which is what providers
/// that omit the offset report. Instants with no representable UTC
/// wall-clock time (e.g. `9999-12-31T23:59:59-01:00`) are rejected.
///
/// # Examples
///
/// ```
/// use airq_types::parse_timestamp;
///
/// let ts = parse_timestamp("2024-01-01T02:00:00+02:00").unwrap();
/// assert_eq!(ts.unix_timestamp(), 1_704_067_200);
/// ```
pub fn parse_timestamp(raw: &str) -> ParseResult<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return to_utc_seconds(ts).map(|_| ts);
    }

    let naive = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ];
    naive
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(raw, *fmt).ok())
        .map(PrimitiveDateTime::assume_utc)
        .ok_or_else(|| ParseError::InvalidTimestamp(raw.to_string()))
}

/// Convert an instant to UTC wall-clock time truncated to whole seconds.
///
/// The result carries no offset: it is the value persisted by the store.
/// Fails when the UTC date falls outside the supported calendar range.
pub fn to_utc_seconds(ts: OffsetDateTime) -> ParseResult<PrimitiveDateTime> {
    let utc = ts
        .checked_to_offset(UtcOffset::UTC)
        .ok_or_else(|| ParseError::InvalidTimestamp(ts.to_string()))?;
    let utc = utc.replace_nanosecond(0).unwrap_or(utc);
    Ok(PrimitiveDateTime::new(utc.date(), utc.time()))
}
