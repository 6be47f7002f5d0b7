//! The single-endpoint HTTP surface (spec §4.8, §6): POST resolves a batch
//! of URLs via the cache and enqueues misses; OPTIONS answers CORS
//! preflight; anything else is 501. Every response carries the same two CORS
//! headers.

use crate::cache::Cache;
use crate::worker::Queue;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::sync::Arc;
use tracing::{info, warn};

const ALLOW_ORIGIN: HeaderValue = HeaderValue::from_static("*");
const ALLOW_HEADERS: HeaderValue =
    HeaderValue::from_static("Origin, X-Requested-With, Content-Type, Accept");

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Cache>,
    pub queue: Arc<Queue>,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/", any(handle)).with_state(state)
}

async fn handle(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    let mut response = match method {
        Method::OPTIONS => StatusCode::OK.into_response(),
        Method::POST => handle_post(&state, &body).await,
        other => (
            StatusCode::NOT_IMPLEMENTED,
            unsupported_method_message(other.as_str()),
        )
            .into_response(),
    };

    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", ALLOW_ORIGIN.clone());
    headers.insert("Access-Control-Allow-Headers", ALLOW_HEADERS.clone());
    response
}

async fn handle_post(state: &AppState, body: &[u8]) -> Response {
    let urls: Vec<String> = match serde_json::from_slice(body) {
        Ok(urls) => urls,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let (snapshots, missing) = match state.cache.get_feeds(&urls).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "cache failure serving request");
            return (StatusCode::INTERNAL_SERVER_ERROR, "cache error").into_response();
        }
    };

    for url in &missing {
        if let Err(e) = state.cache.set_sentinel(url, "true").await {
            warn!(url, error = %e, "cache failure setting queued sentinel");
        }
        if !state.queue.try_enqueue(url) {
            info!(url, "queue full, stopping enqueue for this request");
            break;
        }
    }

    (
        StatusCode::OK,
        [("Content-Type", "application/json")],
        build_response_body(&snapshots),
    )
        .into_response()
}

fn unsupported_method_message(method: &str) -> String {
    format!("Unsupported method '{method}'")
}

/// `snapshots` values are already valid JSON (a serialized Feed object, or
/// the literal `"true"`/`"false"`) — embed them unquoted so the client sees
/// a real JSON object, not a map of strings.
fn build_response_body(snapshots: &std::collections::HashMap<String, String>) -> String {
    let parts: Vec<String> = snapshots
        .iter()
        .map(|(url, value)| format!("{}:{}", serde_json::to_string(url).unwrap(), value))
        .collect();
    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_method_message_matches_spec() {
        assert_eq!(unsupported_method_message("PUT"), "Unsupported method 'PUT'");
    }

    #[test]
    fn response_body_embeds_sentinels_unquoted() {
        let mut snapshots = std::collections::HashMap::new();
        snapshots.insert("B".to_string(), "true".to_string());
        let body = build_response_body(&snapshots);
        assert_eq!(body, r#"{"B":true}"#);
    }

    #[test]
    fn response_body_embeds_feed_json_as_object() {
        let mut snapshots = std::collections::HashMap::new();
        snapshots.insert("A".to_string(), r#"{"title":"a"}"#.to_string());
        let body = build_response_body(&snapshots);
        assert_eq!(body, r#"{"A":{"title":"a"}}"#);
    }
}
