//! The Redis cache: feed snapshots, the alias hash, and the invalid set,
//! with a pipelined bulk-read path (spec §4.4). Grounded on the redis
//! pipeline/`query_async` usage in
//! `examples/other_examples/f5511187_proerror77-Nova__backend-libs-nova-cache-src-feed.rs.rs`.

use crate::error::Result;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

const ALIASES_KEY: &str = "aliases";
const INVALIDS_KEY: &str = "invalids";

#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

impl Cache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub async fn set_feed(&self, url: &str, feed_json: &str) -> Result<()> {
        self.conn.clone().set::<_, _, ()>(url, feed_json).await?;
        Ok(())
    }

    pub async fn set_sentinel(&self, url: &str, value: &str) -> Result<()> {
        self.conn.clone().set::<_, _, ()>(url, value).await?;
        Ok(())
    }

    pub async fn expire(&self, url: &str, seconds: i64) -> Result<()> {
        self.conn.clone().expire::<_, ()>(url, seconds).await?;
        Ok(())
    }

    pub async fn set_alias(&self, alias: &str, original: &str) -> Result<()> {
        self.conn
            .clone()
            .hset::<_, _, _, ()>(ALIASES_KEY, alias, original)
            .await?;
        Ok(())
    }

    pub async fn add_invalid(&self, url: &str) -> Result<()> {
        self.conn.clone().sadd::<_, _, ()>(INVALIDS_KEY, url).await?;
        Ok(())
    }

    pub async fn remove_invalid(&self, url: &str) -> Result<()> {
        self.conn.clone().srem::<_, _, ()>(INVALIDS_KEY, url).await?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        debug!("flushing cache");
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    /// Bulk read: exactly 3 round-trips regardless of `urls.len()` (spec §4.4,
    /// §8 "GetFeeds issues exactly 3 round-trips").
    ///
    /// 1. Alias lookup for each input URL; rewrite resolved URLs.
    /// 2. Invalid-set membership test for each resolved URL.
    /// 3. Value get for each resolved URL that isn't invalid.
    ///
    /// The response is keyed by each *input* URL (an alias and the URL it
    /// resolves to can both appear as distinct keys sharing one snapshot);
    /// `missing` carries the resolved URLs that had no snapshot, which is
    /// what the caller must enqueue.
    pub async fn get_feeds(
        &self,
        urls: &[String],
    ) -> Result<(HashMap<String, String>, Vec<String>)> {
        if urls.is_empty() {
            return Ok((HashMap::new(), Vec::new()));
        }
        let mut conn = self.conn.clone();

        let mut alias_pipe = redis::pipe();
        for url in urls {
            alias_pipe.cmd("HGET").arg(ALIASES_KEY).arg(url);
        }
        let aliases: Vec<Option<String>> = alias_pipe.query_async(&mut conn).await?;

        let resolved: Vec<String> = urls
            .iter()
            .zip(aliases)
            .map(|(url, alias)| alias.unwrap_or_else(|| url.clone()))
            .collect();

        let mut invalid_pipe = redis::pipe();
        for url in &resolved {
            invalid_pipe.cmd("SISMEMBER").arg(INVALIDS_KEY).arg(url);
        }
        let invalid_flags: Vec<bool> = invalid_pipe.query_async(&mut conn).await?;

        let mut get_pipe = redis::pipe();
        let mut pending = 0usize;
        for (url, invalid) in resolved.iter().zip(&invalid_flags) {
            if !*invalid {
                get_pipe.cmd("GET").arg(url);
                pending += 1;
            }
        }
        let values: Vec<Option<String>> = if pending > 0 {
            get_pipe.query_async(&mut conn).await?
        } else {
            Vec::new()
        };

        Ok(assemble(urls, &resolved, &invalid_flags, values))
    }
}

fn assemble(
    urls: &[String],
    resolved: &[String],
    invalid_flags: &[bool],
    values: Vec<Option<String>>,
) -> (HashMap<String, String>, Vec<String>) {
    let mut response = HashMap::new();
    let mut missing = Vec::new();
    let mut values = values.into_iter();
    for ((input_url, resolved_url), invalid) in urls.iter().zip(resolved).zip(invalid_flags) {
        if *invalid {
            response.insert(input_url.clone(), "false".to_string());
            continue;
        }
        match values.next().flatten() {
            Some(value) => {
                response.insert(input_url.clone(), value);
            }
            None => {
                response.insert(input_url.clone(), "true".to_string());
                missing.push(resolved_url.clone());
            }
        }
    }
    (response, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S6 from spec §8: cache holds Feed(A) and Alias(A2 -> A); B is unknown;
    /// C is marked invalid. Both "A" and "A2" must appear as distinct keys
    /// sharing the one snapshot, and only B is reported missing.
    #[test]
    fn response_assembly_matches_s6_shape() {
        let urls = vec!["A".to_string(), "A2".to_string(), "B".to_string(), "C".to_string()];
        let resolved = vec!["A".to_string(), "A".to_string(), "B".to_string(), "C".to_string()];
        let invalid_flags = vec![false, false, false, true];
        // GET is sent only for non-invalid positions: A, A2(->A), B.
        let values: Vec<Option<String>> = vec![
            Some("{\"title\":\"a\"}".to_string()),
            Some("{\"title\":\"a\"}".to_string()),
            None,
        ];

        let (response, missing) = assemble(&urls, &resolved, &invalid_flags, values);

        assert_eq!(response.get("A"), Some(&"{\"title\":\"a\"}".to_string()));
        assert_eq!(response.get("A2"), Some(&"{\"title\":\"a\"}".to_string()));
        assert_eq!(response.get("C"), Some(&"false".to_string()));
        assert_eq!(response.get("B"), Some(&"true".to_string()));
        assert_eq!(missing, vec!["B".to_string()]);
    }
}
