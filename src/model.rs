use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Maximum length, in runes (`char`s), of a cleaned title/URL.
pub const TITLE_LIMIT: usize = 255;
/// Maximum length, in runes, of a cleaned teaser.
pub const TEASER_LIMIT: usize = 1000;

/// The canonical record for one subscription URL. Internal fields (`id`,
/// `sum`, `created_at`) are never emitted in the JSON response — see §6.
#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    #[serde(skip)]
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub items: Vec<Item>,
    #[serde(skip)]
    pub sum: String,
    pub next_poll_at: DateTime<Utc>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single entry within a Feed. `feed_id` is a persistence-layer detail —
/// it does not appear on the in-memory item embedded in a Feed snapshot
/// (see spec.md §9, "cyclic shape of Feed↔Items").
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(skip)]
    pub feed_id: Uuid,
    pub title: String,
    pub teaser: String,
    pub url: String,
    pub guid: String,
    pub published_at: DateTime<Utc>,
}

/// A redirection record: `alias` (unique) -> `original` (indexed).
#[derive(Debug, Clone)]
pub struct Alias {
    pub alias: String,
    pub original: String,
    pub created_at: DateTime<Utc>,
}

/// A negative-cache marker for a URL that failed to produce a valid Feed.
#[derive(Debug, Clone)]
pub struct Invalid {
    pub url: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
}
