use std::env;
use std::time::Duration;

/// Process-wide configuration, loaded once from the environment at startup.
///
/// `dotenvy` is consulted first so a local `.env` can stand in for real
/// environment variables during development; it never overrides a variable
/// that is actually set.
pub struct Config {
    pub port: String,
    pub pg_host: String,
    pub pg_port: String,
    pub pg_database: String,
    pub pg_user: String,
    pub pg_password: String,
    pub redis_host: String,
    pub redis_port: String,
}

impl Config {
    pub fn load() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: env::var("PORT").unwrap_or_else(|_| "8080".to_string()),
            pg_host: env::var("PGHOST")?,
            pg_port: env::var("PGPORT")?,
            pg_database: env::var("PGDATABASE")?,
            pg_user: env::var("PGUSER")?,
            pg_password: env::var("PGPASSWORD")?,
            redis_host: env::var("REDISHOST")?,
            redis_port: env::var("REDISPORT")?,
        })
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.pg_user, self.pg_password, self.pg_host, self.pg_port, self.pg_database
        )
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }
}

/// Fixed operational constants. The original program hard-codes these; the
/// specification gives them as fixed values rather than configuration knobs.
pub const POLL_FREQUENCY: Duration = Duration::from_secs(60);
pub const INVALID_DURATION: Duration = Duration::from_secs(60 * 60 * 24 * 7);
pub const WORKER_COUNT: usize = 80;
pub const QUEUE_LIMIT: usize = 1000;
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const ITEM_LIMIT: i64 = 50;
pub const MIN_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);
