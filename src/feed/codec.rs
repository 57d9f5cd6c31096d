use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use super::types::{FeedDocument, NormalizedItem};
use crate::util::{decode_entities, strip_tags};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Serializes a document as Atom 1.0.
///
/// Every text node and attribute value goes through `quick_xml`'s full
/// escaping, which covers all five reserved characters. An empty item list
/// still produces a `<feed>` root with `title` and `updated`.
///
/// Each entry uses its link as the Atom `id`.
pub fn encode(doc: &FeedDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let updated = doc.updated.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut feed = BytesStart::new("feed");
    feed.push_attribute(("xmlns", ATOM_NS));
    writer
        .write_event(Event::Start(feed))
        .context("Failed to write feed element")?;

    write_text_element(&mut writer, "title", &doc.title)?;
    write_text_element(&mut writer, "updated", &updated)?;

    for item in &doc.items {
        writer
            .write_event(Event::Start(BytesStart::new("entry")))
            .context("Failed to write entry element")?;

        write_text_element(&mut writer, "title", &item.title)?;

        let mut link = BytesStart::new("link");
        link.push_attribute(("href", item.link.as_str()));
        writer
            .write_event(Event::Empty(link))
            .context("Failed to write link element")?;

        write_text_element(&mut writer, "id", &item.link)?;
        write_text_element(&mut writer, "updated", &updated)?;
        write_text_element(&mut writer, "summary", &item.summary)?;

        writer
            .write_event(Event::End(BytesEnd::new("entry")))
            .context("Failed to write entry end")?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("feed")))
        .context("Failed to write feed end")?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).context("Generated feed contains invalid UTF-8")
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write {name} element"))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .with_context(|| format!("Failed to write {name} text"))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write {name} end"))?;
    Ok(())
}

/// Which entry field the scanner is currently collecting text for.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
}

#[derive(Default)]
struct PartialItem {
    title: String,
    link: Option<String>,
    summary: String,
    content: String,
}

impl PartialItem {
    fn finish(self) -> NormalizedItem {
        let summary = if self.summary.is_empty() {
            self.content
        } else {
            self.summary
        };
        NormalizedItem {
            title: strip_tags(&self.title).into_owned(),
            link: self.link.unwrap_or_default(),
            summary: strip_tags(&summary).into_owned(),
        }
    }
}

/// Recovers items from an Atom or RSS document, tolerating broken input.
///
/// Reads `<entry>` (Atom) and `<item>` (RSS) blocks in document order. Field
/// text is entity-decoded and then tag-stripped, so escaped markup inside a
/// summary comes back as plain text. Whitespace is preserved, which keeps
/// plain-text fields stable across `encode`/`decode`.
///
/// Never fails: a hard XML error ends the scan and whatever was complete up
/// to that point is returned. No entries yields an empty `Vec`.
pub fn decode(text: &str) -> Vec<NormalizedItem> {
    let mut reader = Reader::from_str(text);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    let mut items = Vec::new();
    let mut current: Option<PartialItem> = None;
    // Field being collected, plus the element name that closes it. Nested
    // markup inside a field contributes its text only.
    let mut field: Option<(Field, Vec<u8>)> = None;
    let mut in_content = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if is_entry(&name) {
                    current = Some(PartialItem::default());
                    field = None;
                    in_content = false;
                    continue;
                }
                let Some(item) = current.as_mut() else {
                    continue;
                };
                if field.is_some() || in_content {
                    continue;
                }
                match name.as_slice() {
                    b"title" => field = Some((Field::Title, name.clone())),
                    b"summary" | b"description" => field = Some((Field::Summary, name.clone())),
                    b"content" => in_content = true,
                    b"link" => {
                        if let Some(href) = attribute(&e, b"href") {
                            item.link.get_or_insert(href);
                        } else {
                            field = Some((Field::Link, name.clone()));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(item) = current.as_mut() {
                    if field.is_none() && e.local_name().as_ref() == b"link" {
                        if let Some(href) = attribute(&e, b"href") {
                            item.link.get_or_insert(href);
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(item) = current.as_mut() {
                    let raw = String::from_utf8_lossy(&t);
                    let text = decode_entities(&raw);
                    push_text(item, field.as_ref().map(|(f, _)| *f), in_content, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(item) = current.as_mut() {
                    let raw = String::from_utf8_lossy(&c);
                    push_text(item, field.as_ref().map(|(f, _)| *f), in_content, &raw);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if field.as_ref().is_some_and(|(_, closing)| *closing == name) {
                    field = None;
                } else if in_content && name == b"content" {
                    in_content = false;
                } else if is_entry(&name) {
                    if let Some(item) = current.take() {
                        items.push(item.finish());
                    }
                    field = None;
                    in_content = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(
                    position = reader.buffer_position(),
                    error = %e,
                    recovered = items.len(),
                    "Stopping feed decode at malformed XML"
                );
                break;
            }
            _ => {}
        }
    }

    items
}

fn is_entry(name: &[u8]) -> bool {
    name == b"entry" || name == b"item"
}

fn push_text(item: &mut PartialItem, field: Option<Field>, in_content: bool, text: &str) {
    match field {
        Some(Field::Title) => item.title.push_str(text),
        Some(Field::Summary) => item.summary.push_str(text),
        Some(Field::Link) => {
            let href = text.trim();
            if !href.is_empty() && item.link.is_none() {
                item.link = Some(href.to_string());
            }
        }
        None if in_content => item.content.push_str(text),
        None => {}
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .map(|attr| decode_entities(&String::from_utf8_lossy(&attr.value)).into_owned())
}
