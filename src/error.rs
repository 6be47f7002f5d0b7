use thiserror::Error;

/// Taxonomy of component failures, per the error handling design: every
/// variant is handled locally by its caller, never bubbled up to abort the
/// process (startup failures are handled separately, before any of this
/// type is constructed).
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("feed is not RSS: {rss}\nfeed is not Atom: {atom}")]
    Parse { rss: String, atom: String },

    #[error("feed has no items")]
    EmptyFeed,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
