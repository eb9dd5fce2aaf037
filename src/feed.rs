use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ParseError;

/// An RSS channel with only the fields the calendar needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub title: String,
    pub description: String,
    pub items: Vec<Item>,
}

/// A single `<item>`. Missing elements come through as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub description: String,
    pub link: String,
    pub guid: String,
    pub published_at: String,
}

/// Decodes an RSS 2.0 document (`rss > channel > item`).
///
/// Only un-prefixed elements are read, so extension elements such as
/// `itunes:title` or `atom:link` never shadow the core fields. A repeated
/// element overwrites the earlier value.
pub fn parse(bytes: &[u8]) -> Result<Feed, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut builder = FeedBuilder::default();
    let mut depth = 0usize;
    let mut root_seen = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(tag) => {
                if !root_seen {
                    check_root(tag.local_name().as_ref())?;
                    root_seen = true;
                }
                depth += 1;
                builder.start(tag.name().as_ref(), depth);
            }
            Event::Empty(tag) => {
                if !root_seen {
                    check_root(tag.local_name().as_ref())?;
                    root_seen = true;
                }
                builder.start(tag.name().as_ref(), depth + 1);
                builder.end(depth + 1);
            }
            Event::End(_) => {
                builder.end(depth);
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) if builder.is_capturing() => {
                builder.text(&text.unescape().map_err(malformed)?);
            }
            Event::CData(cdata) if builder.is_capturing() => {
                let text = std::str::from_utf8(&cdata).map_err(malformed)?;
                builder.text(text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(ParseError::Empty);
    }
    if depth != 0 {
        return Err(ParseError::Malformed("unexpected end of document".into()));
    }
    builder
        .channel
        .ok_or_else(|| ParseError::Malformed("missing <channel> element".into()))
}

fn malformed(err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed(err.to_string())
}

fn check_root(name: &[u8]) -> Result<(), ParseError> {
    if name == b"rss" {
        Ok(())
    } else {
        Err(ParseError::UnexpectedRoot(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    ChannelTitle,
    ChannelDescription,
    Title,
    Description,
    Link,
    Guid,
    PublishedAt,
}

impl Field {
    fn of_channel(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::ChannelTitle),
            b"description" => Some(Self::ChannelDescription),
            _ => None,
        }
    }

    fn of_item(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"description" => Some(Self::Description),
            b"link" => Some(Self::Link),
            b"guid" => Some(Self::Guid),
            b"pubDate" => Some(Self::PublishedAt),
            _ => None,
        }
    }
}

struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

/// Tracks where the reader is in `rss(1) > channel(2) > item(3) > field(4)`.
#[derive(Default)]
struct FeedBuilder {
    channel: Option<Feed>,
    channel_open: bool,
    item: Option<Item>,
    capture: Option<Capture>,
}

impl FeedBuilder {
    fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn start(&mut self, name: &[u8], depth: usize) {
        if self.capture.is_some() {
            return;
        }
        let field = match depth {
            2 if name == b"channel" && self.channel.is_none() => {
                self.channel = Some(Feed::default());
                self.channel_open = true;
                None
            }
            3 if self.channel_open && name == b"item" => {
                self.item = Some(Item::default());
                None
            }
            3 if self.channel_open => Field::of_channel(name),
            4 if self.item.is_some() => Field::of_item(name),
            _ => None,
        };
        self.capture = field.map(|field| Capture {
            field,
            depth,
            text: String::new(),
        });
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    fn end(&mut self, depth: usize) {
        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                self.store(capture);
            }
            return;
        }
        if self.capture.is_some() {
            return;
        }

        match depth {
            3 => {
                if let (Some(item), Some(channel)) = (self.item.take(), self.channel.as_mut()) {
                    channel.items.push(item);
                }
            }
            2 => self.channel_open = false,
            _ => {}
        }
    }

    fn store(&mut self, capture: Capture) {
        let value = capture.text.trim().to_string();
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        let item = self.item.as_mut();

        match (capture.field, item) {
            (Field::ChannelTitle, _) => channel.title = value,
            (Field::ChannelDescription, _) => channel.description = value,
            (Field::Title, Some(item)) => item.title = value,
            (Field::Description, Some(item)) => item.description = value,
            (Field::Link, Some(item)) => item.link = value,
            (Field::Guid, Some(item)) => item.guid = value,
            (Field::PublishedAt, Some(item)) => item.published_at = value,
            _ => {}
        }
    }
}
