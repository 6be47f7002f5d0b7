use rss_aggregator::cache::Cache;
use rss_aggregator::config::{Config, WORKER_COUNT};
use rss_aggregator::fetcher::Fetcher;
use rss_aggregator::http::{self, AppState};
use rss_aggregator::scheduler;
use rss_aggregator::store::Store;
use rss_aggregator::worker;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load().unwrap_or_else(|e| {
        error!(error = %e, "failed to load configuration");
        process::exit(1);
    });

    let store = Store::connect(&config.database_url(), WORKER_COUNT as u32)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to connect to store, exiting");
            process::exit(1);
        });
    store.run_migrations().await.unwrap_or_else(|e| {
        error!(error = %e, "failed to run migrations, exiting");
        process::exit(1);
    });
    info!("connected to store");

    let cache = Cache::connect(&config.redis_url()).await.unwrap_or_else(|e| {
        error!(error = %e, "failed to connect to cache, exiting");
        process::exit(1);
    });
    info!("connected to cache");

    prime_cache(&store, &cache).await;

    let store = Arc::new(store);
    let cache = Arc::new(cache);
    let fetcher = Arc::new(Fetcher::new());

    let queue = worker::spawn(store.clone(), cache.clone(), fetcher);
    scheduler::spawn(store, cache.clone(), queue.clone());

    let app = http::router(AppState { cache, queue });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        error!(error = %e, addr, "failed to bind, exiting");
        process::exit(1);
    });
    info!(addr, "listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        process::exit(1);
    }
}

/// Loads every existing Feed, Alias and Invalid from the store into the
/// cache before workers or the scheduler start (spec §2, "Startup & cache
/// fill"). Without this, every URL known to the store looks unknown to
/// `Cache::get_feeds` until it happens to be re-polled. Per-entry cache
/// failures are logged and skipped, not fatal — this is CacheFailure
/// disposition (spec §7), not a startup failure.
async fn prime_cache(store: &Store, cache: &Cache) {
    let feeds = store.all_feeds().await.unwrap_or_else(|e| {
        error!(error = %e, "failed to load feeds for cache priming, exiting");
        process::exit(1);
    });
    let mut primed = 0;
    for feed in &feeds {
        match serde_json::to_string(feed) {
            Ok(json) => match cache.set_feed(&feed.url, &json).await {
                Ok(()) => primed += 1,
                Err(e) => warn!(url = %feed.url, error = %e, "cache failure priming feed"),
            },
            Err(e) => error!(url = %feed.url, error = %e, "failed to serialize feed for priming"),
        }
    }

    let aliases = store.all_aliases().await.unwrap_or_else(|e| {
        error!(error = %e, "failed to load aliases for cache priming, exiting");
        process::exit(1);
    });
    for alias in &aliases {
        if let Err(e) = cache.set_alias(&alias.alias, &alias.original).await {
            warn!(alias = %alias.alias, error = %e, "cache failure priming alias");
        }
    }

    let invalids = store.all_invalids().await.unwrap_or_else(|e| {
        error!(error = %e, "failed to load invalids for cache priming, exiting");
        process::exit(1);
    });
    for invalid in &invalids {
        if let Err(e) = cache.add_invalid(&invalid.url).await {
            warn!(url = %invalid.url, error = %e, "cache failure priming invalid");
        }
        if let Err(e) = cache.set_sentinel(&invalid.url, "false").await {
            warn!(url = %invalid.url, error = %e, "cache failure priming invalid sentinel");
        }
    }

    info!(
        feeds = primed,
        aliases = aliases.len(),
        invalids = invalids.len(),
        "cache primed from store"
    );
}
