//! RSS channel parsing with per-item validation.
//!
//! The document is walked with `quick-xml`'s event reader into a permissive
//! raw shape (every field optional), then validated into a [`Channel`].
//! Channel-level problems reject the whole document; item-level problems
//! drop only the offending item.

use chrono::{DateTime, NaiveDate};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::util::validate_link;

/// Errors that reject a whole document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not an RSS document, or the channel lacks a required field
    #[error("Malformed feed: {0}")]
    MalformedFeed(String),

    /// An item link failed URL validation under [`EntryPolicy::Strict`]
    #[error("Invalid entry '{link}': {reason}")]
    InvalidEntry { link: String, reason: String },
}

/// How items with a syntactically invalid link are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryPolicy {
    /// Skip the item, exactly like an item with a missing field
    #[default]
    Lenient,
    /// Fail the whole parse with [`ParseError::InvalidEntry`]
    Strict,
}

/// A validated feed entry. All fields are trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub description: String,
    /// The `pubDate` text as it appeared in the document
    pub pub_date: String,
}

impl Entry {
    /// Interpret `pub_date` as unix seconds.
    ///
    /// Accepts RFC 2822 (the RSS format), RFC 3339, and bare `YYYY-MM-DD`
    /// dates (midnight UTC). Anything else yields `None`.
    pub fn published_at(&self) -> Option<i64> {
        let raw = self.pub_date.as_str();
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.timestamp());
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.timestamp());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
    }
}

/// A validated RSS channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Entries in document order
    pub entries: Vec<Entry>,
}

/// Parsed channel plus the number of items that were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub channel: Channel,
    pub skipped: usize,
}

// ----------------------------------------------------------------------------
// Raw document shape
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    // Qualified names: `<atom:link>` is not `<link>`
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

/// Text fields of a channel or item, trimmed. The first non-empty
/// occurrence of each field wins.
#[derive(Debug, Default)]
struct RawFields {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
    /// Some field held child markup or an undecodable entity
    unreadable: bool,
}

impl RawFields {
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
        };
        if slot.is_none() {
            *slot = present(value);
        }
    }
}

#[derive(Debug, Default)]
struct RawChannel {
    fields: RawFields,
    items: Vec<RawFields>,
}

/// Text being collected for one field element.
struct Capture {
    field: Field,
    depth: usize,
    text: String,
    readable: bool,
}

fn present(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Walk the document and collect the first `<channel>` under the root.
///
/// Only the builtin XML entities are resolved; quick-xml never expands
/// DOCTYPE entity declarations.
fn read_channel(text: &str) -> Result<Option<RawChannel>, ParseError> {
    let mut reader = Reader::from_str(text);

    let mut depth: usize = 0;
    let mut channel: Option<RawChannel> = None;
    let mut in_channel = false;
    let mut item: Option<RawFields> = None;
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if let Some(capture) = capture.as_mut() {
                    capture.readable = false;
                    continue;
                }
                let name = e.name();
                match (depth, name.as_ref()) {
                    (2, b"channel") if channel.is_none() => {
                        channel = Some(RawChannel::default());
                        in_channel = true;
                    }
                    (3, b"item") if in_channel => item = Some(RawFields::default()),
                    (3, other) if in_channel && item.is_none() => {
                        capture = Field::from_name(other).map(|field| Capture::new(field, depth));
                    }
                    (4, other) if item.is_some() => {
                        capture = Field::from_name(other).map(|field| Capture::new(field, depth));
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(capture) = capture.as_mut() {
                    capture.readable = false;
                } else if in_channel && depth == 2 && e.name().as_ref() == b"item" {
                    if let Some(channel) = channel.as_mut() {
                        channel.items.push(RawFields::default());
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(capture) = capture.as_mut() {
                    match e.unescape() {
                        Ok(text) => capture.text.push_str(&text),
                        Err(_) => capture.readable = false,
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(capture) = capture.as_mut() {
                    capture.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => {
                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let Some(done) = capture.take() {
                        let target = match item.as_mut() {
                            Some(item) => Some(item),
                            None => channel.as_mut().map(|c| &mut c.fields),
                        };
                        if let Some(target) = target {
                            if done.readable {
                                target.set(done.field, done.text);
                            } else {
                                target.unreadable = true;
                            }
                        }
                    }
                } else if capture.is_none() {
                    match (depth, e.name().as_ref()) {
                        (3, b"item") => {
                            if let (Some(channel), Some(done)) = (channel.as_mut(), item.take()) {
                                channel.items.push(done);
                            }
                        }
                        (2, b"channel") => in_channel = false,
                        _ => {}
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::MalformedFeed(format!(
                    "not an RSS document: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(channel)
}

impl Capture {
    fn new(field: Field, depth: usize) -> Self {
        Self {
            field,
            depth,
            text: String::new(),
            readable: true,
        }
    }
}

/// Parse an RSS document with the default (lenient) entry policy.
pub fn parse_channel(text: &str) -> Result<ParseResult, ParseError> {
    parse_channel_with(text, EntryPolicy::default())
}

/// Parse an RSS document.
///
/// # Errors
///
/// - [`ParseError::MalformedFeed`] if the text is not XML, has no `channel`,
///   or the channel is missing its title, link or description
/// - [`ParseError::InvalidEntry`] if `policy` is [`EntryPolicy::Strict`] and
///   a complete item has an invalid link
pub fn parse_channel_with(text: &str, policy: EntryPolicy) -> Result<ParseResult, ParseError> {
    let raw = read_channel(text)?
        .ok_or_else(|| ParseError::MalformedFeed("missing channel".to_string()))?;
    let RawChannel { fields, items } = raw;

    let title = fields
        .title
        .ok_or_else(|| ParseError::MalformedFeed("missing channel title".to_string()))?;
    let link = fields
        .link
        .ok_or_else(|| ParseError::MalformedFeed("missing channel link".to_string()))?;
    let description = fields
        .description
        .ok_or_else(|| ParseError::MalformedFeed("missing channel description".to_string()))?;

    let mut entries = Vec::with_capacity(items.len());
    let mut skipped = 0;

    for item in items {
        if item.unreadable {
            tracing::debug!(link = ?item.link, "Skipping item with markup in a text field");
            skipped += 1;
            continue;
        }
        let (Some(title), Some(link), Some(description), Some(pub_date)) =
            (item.title, item.link, item.description, item.pub_date)
        else {
            skipped += 1;
            continue;
        };

        if let Err(e) = validate_link(&link) {
            match policy {
                EntryPolicy::Strict => {
                    return Err(ParseError::InvalidEntry {
                        link,
                        reason: e.to_string(),
                    })
                }
                EntryPolicy::Lenient => {
                    tracing::debug!(link = %link, error = %e, "Skipping item with invalid link");
                    skipped += 1;
                    continue;
                }
            }
        }

        entries.push(Entry {
            title,
            link,
            description,
            pub_date,
        });
    }

    Ok(ParseResult {
        channel: Channel {
            title,
            link,
            description,
            entries,
        },
        skipped,
    })
}
