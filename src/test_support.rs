// Shared helpers for the wiremock-backed tests.

use std::sync::Arc;

use serde_json::Value;
use wiremock::{Match, MockServer, Request};

use crate::config::{ClientConfig, RateLimitConfig, RetryConfig};
use crate::dispatcher::RequestDispatcher;
use crate::executor::QueryExecutor;
use crate::operations::SEARCH_TIMELINE;
use crate::query::Query;
use crate::rate_limit::RateLimiter;
use crate::session::SessionStore;

pub const TEST_COOKIES: &str = r#"{"auth_token": "tok", "ct0": "csrf", "twid": "u%3D44196397"}"#;

/// Config pointing at `base` with millisecond backoff and a roomy limiter.
pub fn test_config(base: &str, max_attempts: u32) -> ClientConfig {
    ClientConfig {
        api_url: format!("{base}/graphql"),
        retry: RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_jitter_ms: 0,
        },
        rate_limit: RateLimitConfig {
            max_calls: 100,
            window_secs: 60,
        },
        ..ClientConfig::new("en-US")
    }
}

pub fn mock_executor(server: &MockServer, max_attempts: u32) -> QueryExecutor {
    let config = test_config(&server.uri(), max_attempts);
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let dispatcher = RequestDispatcher::new(&config, limiter).unwrap();

    let sessions = Arc::new(SessionStore::new(config.locale.clone()));
    sessions.load_str(TEST_COOKIES).unwrap();
    QueryExecutor::new(dispatcher, sessions)
}

pub fn search_query(tweet_id: &str) -> Query {
    Query::new(SEARCH_TIMELINE).param("rawQuery", format!("quoted_tweet_id:{tweet_id}"))
}

/// Matches requests whose `variables` carry the given cursor (`None`: no cursor).
pub struct CursorIs(pub Option<String>);

impl Match for CursorIs {
    fn matches(&self, request: &Request) -> bool {
        let Some((_, raw)) = request.url.query_pairs().find(|(k, _)| k == "variables") else {
            return false;
        };
        let Ok(variables) = serde_json::from_str::<Value>(&raw) else {
            return false;
        };
        let cursor = variables.get("cursor").and_then(Value::as_str);
        cursor == self.0.as_deref()
    }
}
