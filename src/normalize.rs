//! The Normalizer: merges either dialect's output into the uniform Feed/Item
//! model, fingerprints the raw payload, cleans text, and synthesizes stable
//! item identities. Grounded in `nimbus/feed.go`'s `NewFeed`/`PublishedAt`/
//! `Sum`/`Timeout`.

use crate::config::{MAX_TIMEOUT, MIN_TIMEOUT};
use crate::dialect::{atom, atom::AtomFeed, rss, rss::RssFeed};
use crate::error::{AggregatorError, Result};
use crate::model::{Feed, Item, TEASER_LIMIT, TITLE_LIMIT};
use chrono::{DateTime, Duration, Utc};
use md5::Md5;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;


/// Dialect-neutral entry, kept only long enough to apply the cleaning and
/// truncation pipeline. Optional fields preserve "source omitted this" until
/// normalization resolves each one to a concrete default (spec §9).
struct ParsedEntry {
    title: Option<String>,
    teaser: Option<String>,
    url: Option<String>,
    guid: Option<String>,
    published_candidates: Vec<String>,
}

struct ParsedFeed {
    title: Option<String>,
    entries: Vec<ParsedEntry>,
    raw_inner: Vec<u8>,
}

fn from_rss(rf: RssFeed) -> ParsedFeed {
    let entries = rf
        .items
        .into_iter()
        .map(|it| ParsedEntry {
            title: it.title,
            teaser: it.description,
            url: it.link,
            guid: it.guid,
            published_candidates: it.pub_date.into_iter().collect(),
        })
        .collect();
    ParsedFeed {
        title: rf.title,
        entries,
        raw_inner: rf.raw_inner,
    }
}

fn from_atom(af: AtomFeed) -> ParsedFeed {
    let entries = af
        .entries
        .into_iter()
        .map(|e| {
            let teaser = match e.summary {
                Some(s) if !s.is_empty() => Some(s),
                _ => e.content,
            };
            let url = e.links.first().and_then(|l| l.href.clone());
            ParsedEntry {
                title: e.title,
                teaser,
                url,
                guid: e.id,
                published_candidates: vec![e.published, e.updated].into_iter().flatten().collect(),
            }
        })
        .collect();
    ParsedFeed {
        title: af.title,
        entries,
        raw_inner: af.raw_inner,
    }
}

/// `Normalize(url, bytes) -> Feed | ErrBadFeed`, per spec §4.2.
pub fn normalize(url: &str, bytes: &[u8], now: DateTime<Utc>) -> Result<Feed> {
    let parsed = match rss::decode(bytes) {
        Ok(rf) => from_rss(rf),
        Err(e) if e.is_empty_items() => return Err(AggregatorError::EmptyFeed),
        Err(rss_err) => match atom::decode(bytes) {
            Ok(af) => from_atom(af),
            Err(e) if e.is_empty_items() => return Err(AggregatorError::EmptyFeed),
            Err(atom_err) => {
                return Err(AggregatorError::Parse {
                    rss: rss_err.message().to_string(),
                    atom: atom_err.message().to_string(),
                })
            }
        },
    };

    let mut items: Vec<Item> = parsed
        .entries
        .iter()
        .map(|entry| build_item(url, entry, now))
        .collect();

    // newest-first, matching the order items.feed.go's Timeout expects.
    items.sort_by_key(|item| std::cmp::Reverse(item.published_at));

    let sum = sha256_hex(&parsed.raw_inner);
    let timeout = timeout_for(&items);

    Ok(Feed {
        id: Uuid::nil(),
        title: clean_text(parsed.title.as_deref().unwrap_or(""), TITLE_LIMIT),
        url: truncate_runes(url, TITLE_LIMIT),
        items,
        sum,
        next_poll_at: now + timeout,
        created_at: now,
        updated_at: now,
    })
}

fn build_item(feed_url: &str, entry: &ParsedEntry, now: DateTime<Utc>) -> Item {
    let title = clean_text(entry.title.as_deref().unwrap_or(""), TITLE_LIMIT);
    let teaser = clean_text(entry.teaser.as_deref().unwrap_or(""), TEASER_LIMIT);
    let url = truncate_runes(entry.url.as_deref().unwrap_or(""), TITLE_LIMIT);
    let published_at = resolve_published_at(&entry.published_candidates, now);

    let guid = match &entry.guid {
        Some(g) if !g.is_empty() => g.clone(),
        _ => synthesize_guid(feed_url, &title, published_at),
    };

    Item {
        id: Uuid::nil(),
        feed_id: Uuid::nil(),
        title,
        teaser,
        url,
        guid,
        published_at,
    }
}

/// Strip HTML markup, fold newlines into spaces, collapse whitespace runs,
/// and trim. Rust's `String` is always valid UTF-8, so the "zero out if not
/// valid UTF-8" step the original applies to raw bytes has nothing to do here.
fn clean_text(raw: &str, limit: usize) -> String {
    let stripped = ammonia::Builder::empty().clean(raw).to_string();
    let folded = stripped.replace(['\n', '\r'], " ");
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_runes(collapsed.trim(), limit)
}

fn truncate_runes(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

/// Accepted in order: RFC3339, then RFC2822 (which covers both RFC1123 and
/// RFC1123Z, including named zone abbreviations like `GMT`/`EST` — unlike a
/// hand-rolled `%Z` format string, chrono's RFC2822 parser actually resolves
/// those to an offset).
fn resolve_published_at(candidates: &[String], now: DateTime<Utc>) -> DateTime<Utc> {
    for candidate in candidates {
        if candidate.is_empty() {
            continue;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(candidate) {
            return dt.with_timezone(&Utc);
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(candidate) {
            return dt.with_timezone(&Utc);
        }
    }
    debug!("no recognizable timestamp among {:?}, falling back to now", candidates);
    now
}

fn synthesize_guid(feed_url: &str, title: &str, published_at: DateTime<Utc>) -> String {
    format!(
        "{:x}:{:x}:{}",
        Md5::digest(feed_url.as_bytes()),
        Md5::digest(title.as_bytes()),
        published_at.timestamp()
    )
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn min_timeout() -> Duration {
    Duration::from_std(MIN_TIMEOUT).expect("fixed positive constant")
}

fn max_timeout() -> Duration {
    Duration::from_std(MAX_TIMEOUT).expect("fixed positive constant")
}

/// Adaptive timeout policy: half the average inter-item gap, clamped to
/// `[minTimeout, maxTimeout]`. `items` must be sorted newest-first.
fn timeout_for(items: &[Item]) -> Duration {
    if items.len() < 2 {
        return min_timeout();
    }
    let count = (items.len() - 1) as i32;
    let delta = items[0].published_at - items[items.len() - 1].published_at;
    let frequency = delta / count;
    let timeout = frequency / 2;
    timeout.clamp(min_timeout(), max_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const XKCD_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
<title>xkcd.com</title>
<item>
<title>Win by Induction</title>
<link>http://xkcd.com/1516/</link>
<description>A neat little proof.</description>
<pubDate>Fri, 24 Apr 2015 04:00:00 +0000</pubDate>
<guid>http://xkcd.com/1516/</guid>
</item>
</channel>
</rss>"#;

    const VERGE_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
<title>The Verge</title>
<entry>
<title>Electric bicycles</title>
<id>http://www.theverge.com/2015/4/26/8495991/electric-bicycles-vintage-electric-cruz</id>
<link rel="alternate" href="http://www.theverge.com/2015/4/26/8495991/electric-bicycles-vintage-electric-cruz"/>
<published>2015-04-26T02:01:02-04:00</published>
<summary>&lt;p&gt;Some bikes.&lt;/p&gt;

&lt;p&gt;More bikes.&lt;/p&gt;</summary>
</entry>
</feed>"#;

    #[test]
    fn s1_rss_parse() {
        let now = Utc::now();
        let feed = normalize("http://xkcd.com/rss.xml", XKCD_FIXTURE.as_bytes(), now).unwrap();
        let item = &feed.items[0];
        assert_eq!(item.title, "Win by Induction");
        assert_eq!(item.url, "http://xkcd.com/1516/");
        assert_eq!(item.guid, "http://xkcd.com/1516/");
        assert_eq!(
            item.published_at,
            Utc.with_ymd_and_hms(2015, 4, 24, 4, 0, 0).unwrap()
        );
        assert_eq!(feed.next_poll_at, now + min_timeout());
    }

    #[test]
    fn s2_atom_html_teaser() {
        let now = Utc::now();
        let feed = normalize(
            "http://www.theverge.com/rss/full.xml",
            VERGE_FIXTURE.as_bytes(),
            now,
        )
        .unwrap();
        let item = &feed.items[0];
        assert_eq!(
            item.url,
            "http://www.theverge.com/2015/4/26/8495991/electric-bicycles-vintage-electric-cruz"
        );
        assert_eq!(item.url, item.guid);
        assert_eq!(
            item.published_at,
            DateTime::parse_from_rfc3339("2015-04-26T02:01:02-04:00")
                .unwrap()
                .with_timezone(&Utc)
        );
        assert_eq!(item.teaser, "Some bikes. More bikes.");
    }

    /// First link wins even if it lacks an `href`, per `entry.Links[0].Href`
    /// in the original — a later link's href must not be substituted in.
    #[test]
    fn atom_url_uses_first_link_even_without_href() {
        const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
<title>Example</title>
<entry>
<title>Entry</title>
<id>urn:example:1</id>
<link rel="via"/>
<link rel="alternate" href="http://example.com/real"/>
</entry>
</feed>"#;
        let feed = normalize("http://example.com/feed", FIXTURE.as_bytes(), Utc::now()).unwrap();
        assert_eq!(feed.items[0].url, "");
    }

    #[test]
    fn s3_bad_feed_carries_both_messages() {
        let err = normalize("http://example.com", b"<html></html>", Utc::now()).unwrap_err();
        match err {
            AggregatorError::Parse { rss, atom } => {
                assert!(!rss.is_empty());
                assert!(!atom.is_empty());
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn single_item_yields_min_timeout() {
        let item = Item {
            id: Uuid::nil(),
            feed_id: Uuid::nil(),
            title: String::new(),
            teaser: String::new(),
            url: String::new(),
            guid: String::new(),
            published_at: Utc::now(),
        };
        assert_eq!(timeout_for(&[item]), min_timeout());
    }

    #[test]
    fn identical_timestamps_clamp_to_min_timeout() {
        let now = Utc::now();
        let make = |t: DateTime<Utc>| Item {
            id: Uuid::nil(),
            feed_id: Uuid::nil(),
            title: String::new(),
            teaser: String::new(),
            url: String::new(),
            guid: String::new(),
            published_at: t,
        };
        let items = vec![make(now), make(now), make(now)];
        assert_eq!(timeout_for(&items), min_timeout());
    }

    #[test]
    fn unrecognized_timestamp_falls_back_to_now() {
        let now = Utc::now();
        let resolved = resolve_published_at(&["not a date".to_string()], now);
        assert_eq!(resolved, now);
    }

    /// RFC1123 with a named zone abbreviation, the textbook form spec.md §6
    /// names — must resolve to an offset, not fall back to `now`.
    #[test]
    fn rfc1123_named_zone_resolves_correctly() {
        let now = Utc::now();
        let resolved = resolve_published_at(
            &["Fri, 24 Apr 2015 04:00:00 GMT".to_string()],
            now,
        );
        assert_eq!(resolved, Utc.with_ymd_and_hms(2015, 4, 24, 4, 0, 0).unwrap());
    }

    #[test]
    fn synthesized_guid_matches_expected_shape() {
        let guid = synthesize_guid("http://example.com/feed", "Title", Utc.timestamp_opt(0, 0).unwrap());
        let parts: Vec<&str> = guid.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 32);
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2], "0");
    }

    #[test]
    fn title_and_teaser_are_html_stripped_and_collapsed() {
        let cleaned = clean_text("<b>Hello</b>\n\nworld   again", TITLE_LIMIT);
        assert_eq!(cleaned, "Hello world again");
    }
}
