use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// Zoned layouts tried after RFC 2822 and RFC 3339, in order.
/// The weekday has already been stripped by the time these run.
const ZONED_FORMATS: [&str; 4] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%z",
];

/// Layouts without an offset, read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Formats a UTC instant as an iCalendar DATE-TIME value (`20250727T120000Z`).
pub fn format_ical(datetime: DateTime<Utc>) -> String {
    datetime.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Converts a feed timestamp to an instant, falling back to the current time.
///
/// The fallback is silent towards the caller: an unrecognised date and a date
/// that happens to equal "now" are indistinguishable in the result.
pub fn normalize(raw: &str) -> DateTime<Utc> {
    parse_pub_date(raw).unwrap_or_else(|| {
        if !raw.trim().is_empty() {
            warn!(date = raw, "unrecognised date, using current time");
        }
        Utc::now()
    })
}

/// Tries each known grammar in turn and returns the first successful parse.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Feeds routinely carry a weekday that disagrees with the date, which
    // chrono rejects. The weekday is optional in RFC 2822, so drop it.
    let date_str = strip_weekday(raw);

    DateTime::parse_from_rfc2822(date_str)
        .or_else(|_| DateTime::parse_from_rfc3339(date_str))
        .ok()
        .or_else(|| {
            ZONED_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
        })
        .map(|datetime| datetime.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(date_str, format).ok())
                .map(|naive| naive.and_utc())
        })
}

fn strip_weekday(date_str: &str) -> &str {
    match date_str.split_once(',') {
        Some((weekday, rest))
            if !weekday.is_empty() && weekday.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            rest.trim_start()
        }
        _ => date_str,
    }
}
