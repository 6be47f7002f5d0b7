//! DIALECT-A: the element-rooted `feed` dialect (Atom).

use super::{decode_charset, root_inner_bytes, root_is, DecodeError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// An Atom `<link href="..." rel="...">`.
#[derive(Debug, Clone, Default)]
pub struct AtomLink {
    pub href: Option<String>,
    pub rel: Option<String>,
}

/// One `<entry>` under the feed root.
#[derive(Debug, Clone, Default)]
pub struct AtomEntry {
    pub title: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub id: Option<String>,
    pub links: Vec<AtomLink>,
}

/// The decoded `<feed>` tree.
#[derive(Debug, Clone)]
pub struct AtomFeed {
    pub title: Option<String>,
    pub updated: Option<String>,
    pub entries: Vec<AtomEntry>,
    pub raw_inner: Vec<u8>,
}

/// Does the first significant start element carry the `feed` root name?
pub fn is_feed(data: &[u8]) -> bool {
    root_is(data, "feed")
}

/// Decode raw bytes into an `AtomFeed`. Fails if the root isn't `feed`, if the
/// document is structurally broken, or if it has zero entries.
pub fn decode(data: &[u8]) -> Result<AtomFeed, DecodeError> {
    if !is_feed(data) {
        return Err(DecodeError::NotDialect(
            "root element is not 'feed'".to_string(),
        ));
    }

    let text = decode_charset(data);
    let raw_inner = root_inner_bytes(&text, "feed")
        .ok_or_else(|| DecodeError::Malformed("missing or unbalanced feed element".to_string()))?;

    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut stack: Vec<String> = Vec::new();
    let mut text_buf = String::new();
    let mut feed_title = None;
    let mut feed_updated = None;
    let mut entries = Vec::new();
    let mut cur_entry: Option<AtomEntry> = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| DecodeError::Malformed(format!("xml error: {e}")))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    cur_entry = Some(AtomEntry::default());
                }
                if name == "link" {
                    push_link(&mut cur_entry, &e);
                }
                stack.push(name);
                text_buf.clear();
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "link" {
                    push_link(&mut cur_entry, &e);
                }
            }
            Event::Text(e) => {
                text_buf.push_str(&e.unescape().unwrap_or_default());
            }
            Event::CData(e) => {
                text_buf.push_str(&String::from_utf8_lossy(&e));
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let parent = stack.len().checked_sub(2).and_then(|i| stack.get(i));
                let value = text_buf.trim().to_string();

                match (parent.map(|s| s.as_str()), name.as_str()) {
                    (Some("feed"), "title") => feed_title = Some(value),
                    (Some("feed"), "updated") => feed_updated = Some(value),
                    (Some("entry"), "title") => set(&mut cur_entry, |e| e.title = Some(value)),
                    (Some("entry"), "published") => {
                        set(&mut cur_entry, |e| e.published = Some(value))
                    }
                    (Some("entry"), "updated") => set(&mut cur_entry, |e| e.updated = Some(value)),
                    (Some("entry"), "summary") => set(&mut cur_entry, |e| e.summary = Some(value)),
                    (Some("entry"), "content") => set(&mut cur_entry, |e| e.content = Some(value)),
                    (Some("entry"), "id") => set(&mut cur_entry, |e| e.id = Some(value)),
                    _ => {}
                }

                if name == "entry" {
                    if let Some(e) = cur_entry.take() {
                        entries.push(e);
                    }
                }
                stack.pop();
                text_buf.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if entries.is_empty() {
        return Err(DecodeError::EmptyItems("feed has no entries".to_string()));
    }

    Ok(AtomFeed {
        title: feed_title,
        updated: feed_updated,
        entries,
        raw_inner,
    })
}

fn push_link(entry: &mut Option<AtomEntry>, e: &BytesStart) {
    let Some(entry) = entry else { return };
    let mut link = AtomLink::default();
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => link.href = attr.unescape_value().ok().map(|c| c.into_owned()),
            b"rel" => link.rel = attr.unescape_value().ok().map(|c| c.into_owned()),
            _ => {}
        }
    }
    entry.links.push(link);
}

fn set(entry: &mut Option<AtomEntry>, f: impl FnOnce(&mut AtomEntry)) {
    if let Some(e) = entry {
        f(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERGE_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
<title>The Verge</title>
<entry>
<title>Electric bicycles</title>
<id>http://www.theverge.com/2015/4/26/8495991/electric-bicycles-vintage-electric-cruz</id>
<link rel="alternate" href="http://www.theverge.com/2015/4/26/8495991/electric-bicycles-vintage-electric-cruz"/>
<published>2015-04-26T02:01:02-04:00</published>
<summary>&lt;p&gt;Some bikes.&lt;/p&gt;&lt;p&gt;More.&lt;/p&gt;</summary>
</entry>
</feed>"#;

    #[test]
    fn detects_feed_root() {
        assert!(is_feed(VERGE_FIXTURE.as_bytes()));
        assert!(!is_feed(b"<?xml version=\"1.0\"?><rss></rss>"));
    }

    #[test]
    fn decodes_verge_fixture() {
        let feed = decode(VERGE_FIXTURE.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("The Verge"));
        assert_eq!(feed.entries.len(), 1);
        let entry = &feed.entries[0];
        assert_eq!(
            entry.id.as_deref(),
            Some("http://www.theverge.com/2015/4/26/8495991/electric-bicycles-vintage-electric-cruz")
        );
        assert_eq!(entry.links.len(), 1);
        assert_eq!(
            entry.links[0].href.as_deref(),
            Some("http://www.theverge.com/2015/4/26/8495991/electric-bicycles-vintage-electric-cruz")
        );
        assert_eq!(entry.published.as_deref(), Some("2015-04-26T02:01:02-04:00"));
        assert!(entry.summary.as_deref().unwrap().contains("bikes"));
    }

    #[test]
    fn fails_on_zero_entries() {
        let empty = "<feed><title>x</title></feed>";
        assert!(decode(empty.as_bytes()).is_err());
    }
}
