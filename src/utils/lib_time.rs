use jiff::{civil, tz::TimeZone, Timestamp};

/// Parse a timestamp as published by the catalog or stored in the metadata file.
/// Accepts, in order:
///  - an RFC 3339 instant, e.g. `2024-01-02T10:00:00Z` or `2024-01-02T10:00:00-05:00`
///  - a date-time without an offset, e.g. `2024-01-02T10:00:00.123456`, read as UTC
///  - a bare date, e.g. `2024-01-02`, read as midnight UTC
pub fn parse_timestamp(s: &str) -> Result<Timestamp, jiff::Error> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<Timestamp>() {
        return Ok(ts);
    }
    if let Ok(dt) = s.parse::<civil::DateTime>() {
        return Ok(dt.to_zoned(TimeZone::UTC)?.timestamp());
    }
    let date: civil::Date = s.parse()?;
    Ok(date.to_zoned(TimeZone::UTC)?.timestamp())
}
