//! The persistent store: typed read/write of Feed, Item, Alias and Invalid
//! records against Postgres. Uses runtime-checked `sqlx::query`/`Row::get`
//! rather than the `query!`/`query_as!` macros, so the crate builds without a
//! live database connection — grounded on
//! `examples/iwismer-rusty-timer/services/server/src/repo/races.rs`.

use crate::config::ITEM_LIMIT;
use crate::error::Result;
use crate::model::{Alias, Feed, Invalid, Item};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(max_connections / 2)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn find_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row = sqlx::query("SELECT * FROM feeds WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    pub async fn find_feed_by_sum(&self, sum: &str) -> Result<Option<Feed>> {
        let row = sqlx::query("SELECT * FROM feeds WHERE sum = $1")
            .bind(sum)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    /// Every stored Feed, items included — used once at startup to prime the
    /// cache (spec §2, "Startup & cache fill").
    pub async fn all_feeds(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query("SELECT * FROM feeds").fetch_all(&self.pool).await?;
        let mut feeds = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(feed) = self.hydrate(Some(row)).await? {
                feeds.push(feed);
            }
        }
        Ok(feeds)
    }

    pub async fn all_aliases(&self) -> Result<Vec<Alias>> {
        let rows = sqlx::query("SELECT * FROM aliases").fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| Alias {
                alias: r.get("alias"),
                original: r.get("original"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn all_invalids(&self) -> Result<Vec<Invalid>> {
        let rows = sqlx::query("SELECT * FROM invalids").fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| Invalid {
                url: r.get("url"),
                error: r.get("error"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn hydrate(&self, row: Option<sqlx::postgres::PgRow>) -> Result<Option<Feed>> {
        let Some(row) = row else { return Ok(None) };
        let id: Uuid = row.get("id");
        let items = self.load_items(id).await?;
        Ok(Some(Feed {
            id,
            title: row.get("title"),
            url: row.get("url"),
            items,
            sum: row.get("sum"),
            next_poll_at: row.get("next_poll_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn find_alias_by_alias(&self, alias: &str) -> Result<Option<Alias>> {
        let row = sqlx::query("SELECT * FROM aliases WHERE alias = $1")
            .bind(alias)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Alias {
            alias: r.get("alias"),
            original: r.get("original"),
            created_at: r.get("created_at"),
        }))
    }

    pub async fn find_invalid_by_url(&self, url: &str) -> Result<Option<Invalid>> {
        let row = sqlx::query("SELECT * FROM invalids WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Invalid {
            url: r.get("url"),
            error: r.get("error"),
            created_at: r.get("created_at"),
        }))
    }

    /// Ordered by `published_at` descending, limited to `ITEM_LIMIT` — the
    /// window served to readers (spec §4.3).
    pub async fn load_items(&self, feed_id: Uuid) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE feed_id = $1 ORDER BY published_at DESC LIMIT $2",
        )
        .bind(feed_id)
        .bind(ITEM_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Item {
                id: r.get("id"),
                feed_id: r.get("feed_id"),
                title: r.get("title"),
                teaser: r.get("teaser"),
                url: r.get("url"),
                guid: r.get("guid"),
                published_at: r.get("published_at"),
            })
            .collect())
    }

    /// Inserts `feed` with a freshly generated id and its items inline.
    pub async fn insert_feed(&self, feed: &Feed) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO feeds (id, title, url, sum, next_poll_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(&feed.title)
        .bind(&feed.url)
        .bind(&feed.sum)
        .bind(feed.next_poll_at)
        .bind(feed.created_at)
        .bind(feed.updated_at)
        .execute(&self.pool)
        .await?;

        for item in &feed.items {
            self.insert_item(id, item).await?;
        }
        Ok(id)
    }

    pub async fn insert_item(&self, feed_id: Uuid, item: &Item) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO items (id, feed_id, title, teaser, url, guid, published_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(feed_id)
        .bind(&item.title)
        .bind(&item.teaser)
        .bind(&item.url)
        .bind(&item.guid)
        .bind(item.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn insert_alias(&self, alias: &str, original: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO aliases (alias, original, created_at) VALUES ($1, $2, $3)
             ON CONFLICT (alias) DO NOTHING",
        )
        .bind(alias)
        .bind(original)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_invalid(&self, url: &str, error: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO invalids (url, error, created_at) VALUES ($1, $2, $3)
             ON CONFLICT (url) DO UPDATE SET error = EXCLUDED.error, created_at = EXCLUDED.created_at",
        )
        .bind(url)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_invalid(&self, url: &str) -> Result<()> {
        sqlx::query("DELETE FROM invalids WHERE url = $1")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `SaveFeed(feed, omit={items, created_at})`.
    pub async fn save_feed(&self, feed: &Feed) -> Result<()> {
        sqlx::query(
            "UPDATE feeds SET title = $1, url = $2, sum = $3, next_poll_at = $4, updated_at = $5
             WHERE id = $6",
        )
        .bind(&feed.title)
        .bind(&feed.url)
        .bind(&feed.sum)
        .bind(feed.next_poll_at)
        .bind(feed.updated_at)
        .bind(feed.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `SaveItem(item, omit={guid, feed_id, published_at, created_at})`.
    pub async fn save_item(&self, item: &Item) -> Result<()> {
        sqlx::query("UPDATE items SET title = $1, teaser = $2, url = $3, updated_at = $4 WHERE id = $5")
            .bind(&item.title)
            .bind(&item.teaser)
            .bind(&item.url)
            .bind(Utc::now())
            .bind(item.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn push_next_poll_at(&self, feed_id: Uuid, delay: chrono::Duration) -> Result<()> {
        sqlx::query("UPDATE feeds SET next_poll_at = next_poll_at + $1 WHERE id = $2")
            .bind(delay)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_items_of_feed(&self, feed_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM items WHERE feed_id = $1")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_aliases_pointing_to(&self, url: &str) -> Result<()> {
        sqlx::query("DELETE FROM aliases WHERE original = $1")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_feed(&self, feed_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM feeds WHERE id = $1")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn due_urls(&self, horizon: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT f.url FROM feeds f
             LEFT JOIN invalids i ON i.url = f.url
             WHERE f.next_poll_at < $1 AND i.url IS NULL
             ORDER BY f.next_poll_at",
        )
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("url")).collect())
    }

    /// Removes Invalid records older than `threshold` and returns them, so
    /// the caller can clear their cache markers.
    pub async fn sweep_invalids_older_than(&self, threshold: DateTime<Utc>) -> Result<Vec<Invalid>> {
        let rows = sqlx::query("DELETE FROM invalids WHERE created_at < $1 RETURNING url, error, created_at")
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Invalid {
                url: r.get("url"),
                error: r.get("error"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
