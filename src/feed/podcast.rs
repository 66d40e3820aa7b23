//! RSS 2.0 + iTunes item reader for podcast channels.
//!
//! The generic feed model normalizes `itunes:duration` into a number and drops
//! the raw text, so podcast channels are read directly from the XML to
//! keep the raw duration, enclosure attributes and `itunes:image` artwork.
use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::media::Enclosure;
use super::parser::{EntryError, FeedEntry, Normalized, ParseError, DEFAULT_BODY, DEFAULT_TITLE, FALLBACK_URL};
use crate::storage::FeedKind;
use crate::util::{clean_line, parse_media_url};

/// Item child elements whose text is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    Summary,
    PubDate,
    Duration,
    Link,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"description" => Some(Field::Description),
            b"itunes:summary" => Some(Field::Summary),
            b"pubDate" => Some(Field::PubDate),
            b"itunes:duration" => Some(Field::Duration),
            b"link" => Some(Field::Link),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    pub_date: Option<String>,
    duration: Option<String>,
    link: Option<String>,
    enclosure: Option<Enclosure>,
    artwork: Option<String>,
}

impl RawItem {
    fn set(&mut self, field: Field, text: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Description => &mut self.description,
            Field::Summary => &mut self.summary,
            Field::PubDate => &mut self.pub_date,
            Field::Duration => &mut self.duration,
            Field::Link => &mut self.link,
        };
        // First occurrence wins (e.g. Media RSS may repeat <title>)
        if slot.is_none() {
            *slot = Some(text);
        }
    }

    fn into_entry(
        self,
        podcast_name: &str,
        channel_artwork: Option<&str>,
        now: i64,
    ) -> Result<FeedEntry, EntryError> {
        let enclosure = self.enclosure.ok_or(EntryError::MissingAudio)?;
        let audio_url = parse_media_url(&enclosure.url, None)
            .ok_or_else(|| EntryError::InvalidAudioUrl(enclosure.url.clone()))?;

        let external_url = self
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| parse_media_url(l, None).is_some())
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_URL.to_string());

        Ok(FeedEntry {
            title: self
                .title
                .as_deref()
                .and_then(clean_line)
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: self
                .description
                .or(self.summary)
                .unwrap_or_else(|| DEFAULT_BODY.to_string()),
            source_name: podcast_name.to_string(),
            published_at: self
                .pub_date
                .as_deref()
                .and_then(parse_pub_date)
                .unwrap_or(now),
            media_url: Some(audio_url.to_string()),
            external_url,
            kind: FeedKind::Podcast,
            enclosures: vec![enclosure],
            duration: self.duration,
            artwork_url: self.artwork.or_else(|| channel_artwork.map(str::to_string)),
        })
    }
}

/// RFC 2822 per RSS 2.0, with RFC 3339 accepted from sloppier publishers.
fn parse_pub_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.timestamp())
        .ok()
}

/// Read every `<item>` of a podcast channel.
///
/// Items without a usable audio enclosure are skipped and counted. Broken
/// XML anywhere in the document fails the whole channel: no partial entries
/// are salvaged from a malformed source.
pub(crate) fn parse_channel(bytes: &[u8], podcast_name: &str, now: i64) -> Result<Normalized, ParseError> {
    // SEC-002: quick-xml never expands <!ENTITY> declarations (see Cargo.toml pin)
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items: Vec<RawItem> = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut capture: Option<(Field, String)> = None;
    let mut channel_artwork: Option<String> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::Xml(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(e) => {
                let name = e.name();
                match name.as_ref() {
                    b"item" => current = Some(RawItem::default()),
                    b"enclosure" | b"itunes:image" => {
                        handle_media_tag(&e, &reader, current.as_mut(), &mut channel_artwork)
                    }
                    other => {
                        if current.is_some() && capture.is_none() {
                            if let Some(field) = Field::from_name(other) {
                                capture = Some((field, String::new()));
                            }
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if matches!(e.name().as_ref(), b"enclosure" | b"itunes:image") {
                    handle_media_tag(&e, &reader, current.as_mut(), &mut channel_artwork);
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = capture.as_mut() {
                    match e.unescape() {
                        Ok(unescaped) => text.push_str(&unescaped),
                        // Undeclared entities such as &nbsp; are kept verbatim
                        Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
                    }
                }
            }
            Event::CData(e) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(e) => {
                let name = e.name();
                if name.as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                    capture = None;
                } else if let Some((field, _)) = capture {
                    if Field::from_name(name.as_ref()) == Some(field) {
                        if let (Some((field, text)), Some(item)) = (capture.take(), current.as_mut()) {
                            item.set(field, text);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut out = Normalized::default();
    for item in items {
        out.push(item.into_entry(podcast_name, channel_artwork.as_deref(), now));
    }
    Ok(out)
}

/// `<enclosure url type>` inside an item, `<itunes:image href>` on item or channel.
fn handle_media_tag(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    item: Option<&mut RawItem>,
    channel_artwork: &mut Option<String>,
) {
    let is_enclosure = e.name().as_ref() == b"enclosure";
    let mut url = None;
    let mut media_type = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed podcast attribute");
                continue;
            }
        };
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(v) => v.trim().to_string(),
            Err(_) => continue,
        };
        match (is_enclosure, attr.key.as_ref()) {
            (true, b"url") | (false, b"href") => url = Some(value),
            (true, b"type") => media_type = Some(value),
            _ => {}
        }
    }

    let Some(url) = url.filter(|u| !u.is_empty()) else {
        return;
    };

    match (is_enclosure, item) {
        (true, Some(item)) => {
            if item.enclosure.is_none() {
                item.enclosure = Some(Enclosure::new(url, media_type));
            }
        }
        (false, Some(item)) => {
            item.artwork.get_or_insert(url);
        }
        (false, None) => {
            channel_artwork.get_or_insert(url);
        }
        (true, None) => {}
    }
}
