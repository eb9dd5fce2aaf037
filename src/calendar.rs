use chrono::TimeDelta;
use icalendar::{Calendar, Component, Event};
use tracing::warn;
use uuid::Uuid;

use crate::custom_date::{format_ical, normalize};
use crate::feed::{Feed, Item};

pub const PRODUCT_ID: &str = "-//RSS2ICal//EN";

/// Events have no duration in RSS, so every item gets the same length.
pub const EVENT_DURATION: TimeDelta = TimeDelta::hours(1);

/// Builds a published calendar with one event per feed item, in feed order.
pub fn build(feed: &Feed) -> Calendar {
    // icalendar escapes DESCRIPTION itself but writes these keys verbatim.
    let name = escape_text(&feed.title);
    let caldesc = escape_text(&feed.description);
    let description = strip_cr(&feed.description);

    let mut calendar = Calendar::new();
    calendar
        .append_property(("METHOD", "PUBLISH"))
        .append_property(("NAME", name.as_str()))
        .append_property(("X-WR-CALNAME", name.as_str()))
        .append_property(("DESCRIPTION", description.as_str()))
        .append_property(("X-WR-CALDESC", caldesc.as_str()));

    for item in &feed.items {
        calendar.push(build_event(item));
    }

    calendar.done()
}

/// Renders the calendar, stamping our own product identifier.
pub fn serialize(calendar: &Calendar) -> String {
    let raw = calendar.to_string();
    let mut ics = String::with_capacity(raw.len());
    let mut stamped = false;

    for line in raw.split_terminator("\r\n") {
        if !stamped && line.starts_with("PRODID:") {
            ics.push_str("PRODID:");
            ics.push_str(PRODUCT_ID);
            stamped = true;
        } else {
            ics.push_str(line);
        }
        ics.push_str("\r\n");
    }

    ics
}

/// Converts a feed straight to iCalendar text.
pub fn to_ical(feed: &Feed) -> String {
    serialize(&build(feed))
}

fn build_event(item: &Item) -> Event {
    let start = normalize(&item.published_at);
    let end = start + EVENT_DURATION;

    let mut event = Event::new();
    event
        .uid(&single_line(&event_uid(item)))
        .summary(&strip_cr(&item.title))
        .description(&strip_cr(&item.description))
        .timestamp(start)
        .add_property("URL", single_line(&item.link))
        .add_property("DTSTART", format_ical(start))
        .add_property("DTEND", format_ical(end))
        .add_property("CREATED", format_ical(start))
        .add_property("LAST-MODIFIED", format_ical(start));

    event.done()
}

/// Escapes a TEXT value (RFC 5545 3.3.11). Bare carriage returns are dropped.
fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

fn strip_cr(value: &str) -> String {
    value.replace('\r', "")
}

/// Strips line breaks from values that are written without escaping.
fn single_line(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// The item guid, or a stable stand-in derived from the item when it is empty.
fn event_uid(item: &Item) -> String {
    if !item.guid.trim().is_empty() {
        return item.guid.clone();
    }

    let seed = format!("{}\n{}\n{}", item.link, item.title, item.published_at);
    let uid = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string();
    warn!(title = %item.title, link = %item.link, %uid, "item has no guid, synthesized event uid");
    uid
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, Utc};

    fn item(guid: &str, title: &str, published_at: &str) -> Item {
        Item {
            title: title.into(),
            description: format!("About {title}"),
            link: format!("https://example.com/{guid}"),
            guid: guid.into(),
            published_at: published_at.into(),
        }
    }

    fn sample_feed() -> Feed {
        Feed {
            title: "Test RSS Feed".into(),
            description: "Test RSS Description".into(),
            items: vec![
                item("test-guid-1", "Test Item 1", "Mon, 27 Jul 2025 12:00:00 GMT"),
                item("test-guid-2", "Test Item 2", "Mon, 27 Jul 2025 13:00:00 GMT"),
            ],
        }
    }

    fn property_values<'a>(ics: &'a str, name: &str) -> Vec<&'a str> {
        let prefix = format!("{name}:");
        ics.lines()
            .filter_map(|line| line.strip_prefix(prefix.as_str()))
            .collect()
    }

    #[test]
    fn emits_one_event_per_item() {
        let ics = to_ical(&sample_feed());

        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert_eq!(ics.matches("END:VEVENT").count(), 2);
        for expected in [
            "BEGIN:VCALENDAR",
            "VERSION:2.0",
            "PRODID:-//RSS2ICal//EN",
            "METHOD:PUBLISH",
            "NAME:Test RSS Feed",
            "DESCRIPTION:Test RSS Description",
            "UID:test-guid-1",
            "SUMMARY:Test Item 1",
            "DESCRIPTION:About Test Item 1",
            "URL:https://example.com/test-guid-1",
            "UID:test-guid-2",
            "SUMMARY:Test Item 2",
            "END:VCALENDAR",
        ] {
            assert!(ics.contains(expected), "missing {expected:?} in:\n{ics}");
        }
    }

    #[test]
    fn keeps_feed_order() {
        let ics = to_ical(&sample_feed());
        let first = ics.find("UID:test-guid-1").unwrap();
        let second = ics.find("UID:test-guid-2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn product_id_appears_once() {
        let ics = to_ical(&sample_feed());
        assert_eq!(property_values(&ics, "PRODID"), vec![PRODUCT_ID]);
    }

    #[test]
    fn events_last_one_hour() {
        let ics = to_ical(&sample_feed());

        let starts = property_values(&ics, "DTSTART");
        let ends = property_values(&ics, "DTEND");
        assert_eq!(starts, vec!["20250727T120000Z", "20250727T130000Z"]);
        assert_eq!(ends, vec!["20250727T130000Z", "20250727T140000Z"]);
        assert_eq!(
            property_values(&ics, "CREATED"),
            vec!["20250727T120000Z", "20250727T130000Z"]
        );
        assert_eq!(
            property_values(&ics, "LAST-MODIFIED"),
            vec!["20250727T120000Z", "20250727T130000Z"]
        );
    }

    #[test]
    fn unparsable_date_still_yields_one_hour_event() {
        let feed = Feed {
            items: vec![item("odd", "Odd", "sometime last week")],
            ..Feed::default()
        };
        let ics = to_ical(&feed);

        let start = property_values(&ics, "DTSTART")[0];
        let end = property_values(&ics, "DTEND")[0];
        let start = NaiveDateTime::parse_from_str(start, "%Y%m%dT%H%M%SZ")
            .unwrap()
            .and_utc();
        assert!((Utc::now() - start).num_minutes().abs() < 1);
        assert_eq!(end, format_ical(start + EVENT_DURATION));
    }

    #[test]
    fn empty_feed_has_no_events() {
        let ics = to_ical(&Feed::default());
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(!ics.contains("BEGIN:VEVENT"));
    }

    #[test]
    fn escapes_calendar_level_text() {
        let feed = Feed {
            title: "A, B; C".into(),
            description: "line1\r\nline2\nBEGIN:VEVENT".into(),
            items: vec![item("only", "Only", "Sun, 27 Jul 2025 12:00:00 GMT")],
        };
        let ics = to_ical(&feed);

        assert_eq!(property_values(&ics, "NAME"), vec!["A\\, B\\; C"]);
        assert_eq!(property_values(&ics, "X-WR-CALNAME"), vec!["A\\, B\\; C"]);
        assert_eq!(
            property_values(&ics, "X-WR-CALDESC"),
            vec!["line1\\nline2\\nBEGIN:VEVENT"]
        );
        assert!(!ics.lines().any(|line| line == "line2"));
        assert_eq!(ics.matches("\r\nBEGIN:VEVENT").count(), 1);
        assert!(!ics.replace("\r\n", "").contains('\n'));
        assert!(!ics.replace("\r\n", "").contains('\r'));
    }

    #[test]
    fn line_breaks_never_split_event_properties() {
        let feed = Feed {
            items: vec![Item {
                title: "Two\nlines".into(),
                description: "para one\r\n\r\npara two".into(),
                link: "https://example.com/a\nX-INJECTED:1".into(),
                guid: "guid\r\nBEGIN:VEVENT".into(),
                published_at: "Sun, 27 Jul 2025 12:00:00 GMT".into(),
            }],
            ..Feed::default()
        };
        let ics = to_ical(&feed);

        assert_eq!(ics.lines().filter(|line| *line == "BEGIN:VEVENT").count(), 1);
        assert!(!ics.lines().any(|line| line.starts_with("X-INJECTED")));
        assert!(!ics.replace("\r\n", "").contains('\n'));
        assert_eq!(
            property_values(&ics, "URL"),
            vec!["https://example.com/aX-INJECTED:1"]
        );
    }

    #[test]
    fn escape_text_handles_all_specials() {
        assert_eq!(escape_text("a\\b;c,d\r\ne"), "a\\\\b\\;c\\,d\\ne");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn synthesizes_stable_uid_for_missing_guid() {
        let guidless = item("", "No guid", "Sun, 27 Jul 2025 12:00:00 GMT");

        let uid = event_uid(&guidless);
        assert!(!uid.is_empty());
        assert!(Uuid::parse_str(&uid).is_ok());
        assert_eq!(uid, event_uid(&guidless.clone()));

        let other = Item {
            title: "Another".into(),
            ..guidless
        };
        assert_ne!(uid, event_uid(&other));
    }

    #[test]
    fn uses_guid_verbatim() {
        let odd = item("tag:example.com,2025:post/42", "Odd guid", "");
        assert_eq!(event_uid(&odd), "tag:example.com,2025:post/42");
    }
}
