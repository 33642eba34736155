use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Failure modes of the proprietary expiry stamp.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExpiryParseError {
    #[error("expiry stamp must be 13 digits, got {0} characters")]
    Length(usize),
    #[error("expiry stamp field '{0}' is not numeric")]
    NonNumeric(&'static str),
    #[error("expiry stamp component out of range: {0}")]
    OutOfRange(&'static str),
}

/// Parses the bureau's `YYYYDDDHHMMSS` expiry stamp into an absolute UTC
/// instant: 4-digit year, 3-digit ordinal day of year, then hour, minute,
/// second. The bureau documentation is ambiguous about this layout; the
/// parser is kept pure and isolated so a corrected encoding is a local
/// change, and every caller substitutes a fallback TTL on failure.
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, ExpiryParseError> {
    let trimmed = raw.trim();
    if trimmed.len() != 13 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if trimmed.len() != 13 {
            return Err(ExpiryParseError::Length(trimmed.len()));
        }
        return Err(ExpiryParseError::NonNumeric("stamp"));
    }

    let field = |range: std::ops::Range<usize>, name: &'static str| -> Result<u32, ExpiryParseError> {
        trimmed[range]
            .parse::<u32>()
            .map_err(|_| ExpiryParseError::NonNumeric(name))
    };

    let year = field(0..4, "year")?;
    let ordinal = field(4..7, "day-of-year")?;
    let hour = field(7..9, "hour")?;
    let minute = field(9..11, "minute")?;
    let second = field(11..13, "second")?;

    if !(1..=366).contains(&ordinal) {
        return Err(ExpiryParseError::OutOfRange("day-of-year"));
    }

    let date = NaiveDate::from_yo_opt(year as i32, ordinal)
        .ok_or(ExpiryParseError::OutOfRange("day-of-year"))?;
    let datetime = date
        .and_hms_opt(hour, minute, second)
        .ok_or(ExpiryParseError::OutOfRange("time"))?;

    Ok(Utc.from_utc_datetime(&datetime))
}
