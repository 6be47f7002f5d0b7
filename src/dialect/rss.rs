//! DIALECT-R: the attribute-rooted `rss` dialect (RSS 2.0 and relatives).

use super::{decode_charset, root_inner_bytes, root_is, DecodeError};
use quick_xml::events::Event;
use quick_xml::Reader;

/// One `<item>` under `<channel>`, fields as-is from the source document.
#[derive(Debug, Clone, Default)]
pub struct RssItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub pub_date: Option<String>,
    pub guid: Option<String>,
}

/// The decoded `<rss><channel>` tree.
#[derive(Debug, Clone)]
pub struct RssFeed {
    pub title: Option<String>,
    pub ttl: Option<i64>,
    pub items: Vec<RssItem>,
    pub raw_inner: Vec<u8>,
}

/// Does the first significant start element carry the `rss` root name?
pub fn is_feed(data: &[u8]) -> bool {
    root_is(data, "rss")
}

/// Decode raw bytes into an `RssFeed`. Fails if the root isn't `rss`, if the
/// document is structurally broken, or if the channel has zero items.
pub fn decode(data: &[u8]) -> Result<RssFeed, DecodeError> {
    if !is_feed(data) {
        return Err(DecodeError::NotDialect(
            "root element is not 'rss'".to_string(),
        ));
    }

    let text = decode_charset(data);
    let raw_inner = root_inner_bytes(&text, "rss")
        .ok_or_else(|| DecodeError::Malformed("missing or unbalanced rss element".to_string()))?;

    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut stack: Vec<String> = Vec::new();
    let mut text_buf = String::new();
    let mut channel_title = None;
    let mut ttl = None;
    let mut items = Vec::new();
    let mut cur_item: Option<RssItem> = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| DecodeError::Malformed(format!("xml error: {e}")))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "item" {
                    cur_item = Some(RssItem::default());
                }
                stack.push(name);
                text_buf.clear();
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
                    (Some("channel"), "title") => channel_title = Some(value),
                    (Some("channel"), "ttl") => ttl = value.parse::<i64>().ok(),
                    (Some("item"), "title") => set(&mut cur_item, |it| it.title = Some(value)),
                    (Some("item"), "description") => {
                        set(&mut cur_item, |it| it.description = Some(value))
                    }
                    (Some("item"), "link") => set(&mut cur_item, |it| it.link = Some(value)),
                    (Some("item"), "pubDate") => {
                        set(&mut cur_item, |it| it.pub_date = Some(value))
                    }
                    (Some("item"), "guid") => set(&mut cur_item, |it| it.guid = Some(value)),
                    _ => {}
                }

                if name == "item" {
                    if let Some(it) = cur_item.take() {
                        items.push(it);
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

    if items.is_empty() {
        return Err(DecodeError::EmptyItems("channel has no items".to_string()));
    }

    Ok(RssFeed {
        title: channel_title,
        ttl,
        items,
        raw_inner,
    })
}

fn set(item: &mut Option<RssItem>, f: impl FnOnce(&mut RssItem)) {
    if let Some(it) = item {
        f(it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XKCD_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
<title>xkcd.com</title>
<ttl>30</ttl>
<item>
<title>Win by Induction</title>
<link>http://xkcd.com/1516/</link>
<description>&lt;p&gt;Proof by induction&lt;/p&gt;</description>
<pubDate>Fri, 24 Apr 2015 04:00:00 -0000</pubDate>
</item>
</channel>
</rss>"#;

    #[test]
    fn detects_rss_root() {
        assert!(is_feed(XKCD_FIXTURE.as_bytes()));
        assert!(!is_feed(b"<?xml version=\"1.0\"?><feed></feed>"));
    }

    #[test]
    fn decodes_xkcd_fixture() {
        let feed = decode(XKCD_FIXTURE.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("xkcd.com"));
        assert_eq!(feed.ttl, Some(30));
        assert_eq!(feed.items.len(), 1);
        let item = &feed.items[0];
        assert_eq!(item.title.as_deref(), Some("Win by Induction"));
        assert_eq!(item.link.as_deref(), Some("http://xkcd.com/1516/"));
        assert_eq!(item.guid, None);
        assert!(item.description.as_deref().unwrap().contains("Proof"));
    }

    #[test]
    fn fails_on_zero_items() {
        let empty = "<rss><channel><title>x</title></channel></rss>";
        assert!(decode(empty.as_bytes()).is_err());
    }

    #[test]
    fn raw_inner_excludes_root_tag() {
        let feed_bytes = b"<rss><channel><item><title>a</title></item></channel></rss>";
        let text = decode_charset(feed_bytes);
        let inner = root_inner_bytes(&text, "rss").unwrap();
        let inner_str = String::from_utf8(inner).unwrap();
        assert!(!inner_str.contains("<rss>"));
        assert!(inner_str.contains("<channel>"));
    }
}
