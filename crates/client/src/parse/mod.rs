//! RSS and Atom parsing.
//!
//! Supports RSS 2.0, RSS 1.0 (RDF) and Atom 1.0. Elements are matched by
//! local name, so namespaced extensions such as `dc:date` and
//! `content:encoded` are picked up without namespace resolution.

mod text;

pub use text::html_to_text;

use text::collapse_whitespace;

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tabfeed_core::{Article, Error};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Rss,
    Atom,
}

/// The child of an item whose text is being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    Published,
    Updated,
    Summary,
    Content,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"guid" | b"id" => Some(Field::Guid),
            b"pubDate" | b"published" | b"issued" => Some(Field::Published),
            b"date" | b"updated" | b"modified" => Some(Field::Updated),
            b"description" | b"summary" => Some(Field::Summary),
            b"encoded" | b"content" => Some(Field::Content),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: String,
    link: Option<String>,
    link_alternate: bool,
    guid: String,
    published: String,
    updated: String,
    summary: String,
    content: String,
}

impl ItemBuilder {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => self.link.get_or_insert_with(String::new),
            Field::Guid => &mut self.guid,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
        };
        // Text split by nested markup keeps a word boundary.
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text);
    }

    fn build(self, base: &Url) -> Article {
        let title = collapse_whitespace(&self.title);
        let title = if title.is_empty() { "Untitled".to_string() } else { title };

        let raw_link = self
            .link
            .filter(|l| !l.trim().is_empty())
            .or_else(|| Some(self.guid).filter(|g| !g.trim().is_empty()))
            .unwrap_or_default();
        let link = resolve(base, raw_link.trim());

        let published = parse_date(&self.published).or_else(|| parse_date(&self.updated));

        let summary_source = if self.summary.trim().is_empty() { &self.content } else { &self.summary };
        let summary = Some(html_to_text(summary_source)).filter(|s| !s.is_empty());

        Article { title, link, published, summary }
    }
}

/// Parse an RSS or Atom document into articles, in document order.
///
/// Relative article links are resolved against `base`, the URL the document
/// was served from.
pub fn parse_feed(bytes: &[u8], base: &Url) -> Result<Vec<Article>, Error> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut flavor: Option<Flavor> = None;
    let mut articles = Vec::new();

    let mut depth = 0usize;
    let mut item: Option<(usize, ItemBuilder)> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::FeedParse(format!("{} at byte {}", e, reader.buffer_position())))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                let name = e.local_name();
                let name = name.as_ref();

                if flavor.is_none() {
                    flavor = Some(root_flavor(name)?);
                } else if item.is_none() {
                    if is_item(flavor, name) {
                        item = Some((depth, ItemBuilder::default()));
                    }
                } else if let Some((item_depth, builder)) = &mut item
                    && depth == *item_depth + 1
                {
                    field = Field::from_local_name(name);
                    if field == Some(Field::Link) && flavor == Some(Flavor::Atom) {
                        atom_link(&e, builder);
                        field = None;
                    }
                }
            }
            Event::Empty(e) => {
                let name = e.local_name();
                if flavor.is_none() {
                    flavor = Some(root_flavor(name.as_ref())?);
                    break;
                }
                if flavor == Some(Flavor::Atom)
                    && name.as_ref() == b"link"
                    && let Some((item_depth, builder)) = &mut item
                    && depth == *item_depth
                {
                    atom_link(&e, builder);
                }
            }
            Event::End(_) => {
                let item_depth = item.as_ref().map(|(d, _)| *d);
                if item_depth.is_some_and(|d| depth == d + 1) {
                    field = None;
                } else if item_depth == Some(depth)
                    && let Some((_, builder)) = item.take()
                {
                    articles.push(builder.build(base));
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(e) => {
                if let (Some(f), Some((_, builder))) = (field, &mut item) {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    builder.push(f, &text);
                }
            }
            Event::CData(e) => {
                if let (Some(f), Some((_, builder))) = (field, &mut item) {
                    builder.push(f, &String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if flavor.is_none() {
        return Err(Error::FeedParse("document has no root element".into()));
    }

    if item.is_some() {
        return Err(Error::FeedParse("document ends inside an item".into()));
    }

    if depth > 0 {
        return Err(Error::FeedParse(format!("document is truncated ({depth} elements left open)")));
    }

    Ok(articles)
}

fn root_flavor(name: &[u8]) -> Result<Flavor, Error> {
    match name {
        b"rss" | b"RDF" => Ok(Flavor::Rss),
        b"feed" => Ok(Flavor::Atom),
        other => Err(Error::FeedParse(format!(
            "not an RSS or Atom document (root element <{}>)",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn is_item(flavor: Option<Flavor>, name: &[u8]) -> bool {
    match flavor {
        Some(Flavor::Rss) => name == b"item",
        Some(Flavor::Atom) => name == b"entry",
        None => false,
    }
}

/// Take the `href` of an Atom `<link>`, preferring `rel="alternate"`.
fn atom_link(e: &BytesStart<'_>, builder: &mut ItemBuilder) {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().map(|v| v.into_owned()).ok();
        match attr.key.local_name().as_ref() {
            b"href" => href = value,
            b"rel" => rel = value,
            _ => {}
        }
    }

    let Some(href) = href else { return };
    let alternate = rel.as_deref().is_none_or(|r| r == "alternate");
    if builder.link.is_none() || (alternate && !builder.link_alternate) {
        builder.link = Some(href);
        builder.link_alternate = alternate;
    }
}

fn resolve(base: &Url, link: &str) -> String {
    if link.is_empty() {
        return String::new();
    }
    match base.join(link) {
        Ok(url) => url.to_string(),
        Err(_) => link.to_string(),
    }
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom, Dublin Core) timestamps.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
