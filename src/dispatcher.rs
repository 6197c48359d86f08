use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{AuthError, ClientError, ClientResult, DecodeError, TransientCause};
use crate::query::Query;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::session::Session;

/// Longest error body kept in error values and logs.
const MAX_ERROR_BODY: usize = 512;

/// GraphQL error codes that mean the cookies are no longer valid.
const AUTH_ERROR_CODES: &[i64] = &[32, 89, 215, 326];
const RATE_LIMIT_ERROR_CODE: i64 = 88;

/// Outcome of a single failed attempt.
enum AttemptError {
    Transient(TransientCause),
    Fatal(ClientError),
}

pub struct RequestDispatcher {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl RequestDispatcher {
    pub fn new(config: &ClientConfig, limiter: Arc<RateLimiter>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            limiter,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send `query` with `session`'s credentials and return the raw JSON tree.
    ///
    /// Every attempt, retries included, takes a slot from the rate limiter.
    /// Credential rejections are returned at once; transient failures are
    /// retried until the attempt cap and then surfaced as
    /// [`ClientError::TransientFailure`].
    pub async fn send(&self, query: &Query, session: &Session) -> ClientResult<Value> {
        let url = self.endpoint_url(query)?;
        let headers = self.headers(session)?;
        let operation = query.operation().name;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let waited = self.limiter.acquire_slot().await;
            if !waited.is_zero() {
                log::info!("{} delayed {}ms by rate limiter", operation, waited.as_millis());
            }

            log::debug!("{} attempt {}/{}", operation, attempt, self.retry.max_attempts);

            match self.attempt(&url, &headers).await {
                Ok(payload) => return Ok(payload),
                Err(AttemptError::Fatal(e)) => {
                    log::error!("{} failed: {}", operation, e);
                    return Err(e);
                }
                Err(AttemptError::Transient(cause)) => {
                    if !self.retry.should_retry(attempt) {
                        log::error!("{} giving up after {} attempts: {}", operation, attempt, cause);
                        return Err(ClientError::TransientFailure {
                            attempts: attempt,
                            cause,
                        });
                    }

                    let floor = match &cause {
                        TransientCause::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    let delay = self.retry.delay_for(attempt, floor);
                    log::warn!(
                        "{} attempt {} failed ({}), retrying in {}ms",
                        operation,
                        attempt,
                        cause,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &Url, headers: &HeaderMap) -> Result<Value, AttemptError> {
        let response = self
            .http
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    AttemptError::Transient(TransientCause::Connection(e.to_string()))
                } else {
                    AttemptError::Fatal(ClientError::Http(e))
                }
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Transient(TransientCause::RateLimited {
                retry_after: reset_delay(response.headers()),
            }));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = read_body(response).await;
            return Err(AttemptError::Fatal(
                AuthError::Rejected {
                    status: status.as_u16(),
                    message,
                }
                .into(),
            ));
        }

        if status.is_server_error() {
            let body = read_body(response).await;
            return Err(AttemptError::Transient(TransientCause::Server {
                status: status.as_u16(),
                body,
            }));
        }

        if !status.is_success() {
            let message = read_body(response).await;
            return Err(AttemptError::Fatal(ClientError::Api {
                status: status.as_u16(),
                message,
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(TransientCause::Connection(e.to_string())))?;

        let payload: Value = serde_json::from_str(&body).map_err(|e| {
            AttemptError::Fatal(DecodeError::payload(format!("response is not JSON: {e}")).into())
        })?;

        check_graphql_errors(&payload)?;
        Ok(payload)
    }

    fn endpoint_url(&self, query: &Query) -> ClientResult<Url> {
        let raw = format!("{}/{}", self.base_url, query.operation().path());
        let mut url =
            Url::parse(&raw).map_err(|e| ClientError::Config(format!("invalid URL {raw}: {e}")))?;

        url.query_pairs_mut()
            .append_pair("variables", &query.variables_json().to_string())
            .append_pair("features", &query.operation().features_json().to_string());

        Ok(url)
    }

    fn headers(&self, session: &Session) -> ClientResult<HeaderMap> {
        let pairs = [
            ("authorization", format!("Bearer {}", self.bearer_token)),
            ("cookie", session.cookie_header()),
            ("x-csrf-token", session.csrf_token().to_string()),
            ("x-twitter-auth-type", "OAuth2Session".to_string()),
            ("x-twitter-active-user", "yes".to_string()),
            ("x-twitter-client-language", session.locale().to_string()),
            ("accept-language", session.locale().to_string()),
            ("content-type", "application/json".to_string()),
        ];

        let mut headers = HeaderMap::with_capacity(pairs.len());
        for (name, value) in pairs {
            let value = HeaderValue::from_str(&value).map_err(|_| {
                AuthError::Malformed(format!("value for header `{name}` contains invalid characters"))
            })?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(headers)
    }
}

/// Map a body-level GraphQL error list to an attempt outcome. Bodies that
/// still carry `data` are partial successes and pass through.
fn check_graphql_errors(payload: &Value) -> Result<(), AttemptError> {
    let has_data = payload.get("data").is_some_and(|d| !d.is_null());
    let Some(errors) = payload.get("errors").and_then(Value::as_array) else {
        return Ok(());
    };
    if has_data || errors.is_empty() {
        return Ok(());
    }

    let first = &errors[0];
    let code = first.get("code").and_then(Value::as_i64);
    let message = first
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown GraphQL error")
        .to_string();

    match code {
        Some(code) if AUTH_ERROR_CODES.contains(&code) => Err(AttemptError::Fatal(
            AuthError::Rejected {
                status: 200,
                message,
            }
            .into(),
        )),
        Some(RATE_LIMIT_ERROR_CODE) => Err(AttemptError::Transient(TransientCause::RateLimited {
            retry_after: None,
        })),
        _ => Err(AttemptError::Fatal(ClientError::Api {
            status: 200,
            message,
        })),
    }
}

/// Time until the `x-rate-limit-reset` epoch, if the header is present.
fn reset_delay(headers: &HeaderMap) -> Option<Duration> {
    let reset: i64 = headers
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())?;
    let now = chrono::Utc::now().timestamp();
    let remaining = reset.checked_sub(now)?;
    u64::try_from(remaining).ok().map(Duration::from_secs)
}

async fn read_body(response: Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operation;
    use crate::session::SessionStore;
    use crate::test_support::{TEST_COOKIES, test_config};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OP: Operation = Operation {
        name: "SearchTimeline",
        query_id: "q1",
        features: &[("rweb_lists_timeline_redesign_enabled", true)],
    };

    fn dispatcher(config: &ClientConfig) -> RequestDispatcher {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        RequestDispatcher::new(config, limiter).unwrap()
    }

    fn session() -> Arc<Session> {
        SessionStore::new("en-US")
            .load_str(TEST_COOKIES)
            .unwrap()
    }

    fn query() -> Query {
        Query::new(OP).param("rawQuery", "quoted_tweet_id:1").count(20)
    }

    #[tokio::test]
    async fn test_send_attaches_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graphql/q1/SearchTimeline"))
            .and(header("x-csrf-token", "csrf"))
            .and(header("cookie", "auth_token=tok; ct0=csrf; twid=u%3D44196397"))
            .and(header("x-twitter-client-language", "en-US"))
            .and(query_param(
                "variables",
                r#"{"rawQuery":"quoted_tweet_id:1","count":20}"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"ok": true}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), 3);
        let payload = dispatcher(&config).send(&query(), &session()).await.unwrap();
        assert_eq!(payload["data"]["ok"], true);
    }

    #[tokio::test]
    async fn test_five_transient_failures_surface_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
            .expect(5)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), 5);
        let err = dispatcher(&config).send(&query(), &session()).await.unwrap_err();

        match err {
            ClientError::TransientFailure { attempts, cause } => {
                assert_eq!(attempts, 5);
                assert_eq!(
                    cause,
                    TransientCause::Server {
                        status: 503,
                        body: "over capacity".into()
                    }
                );
            }
            other => panic!("expected TransientFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "errors": [{"code": 32, "message": "Could not authenticate you."}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), 5);
        let err = dispatcher(&config).send(&query(), &session()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Auth(AuthError::Rejected { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), 5);
        let dispatcher = dispatcher(&config);
        dispatcher.send(&query(), &session()).await.unwrap();

        // every attempt took a limiter slot
        assert_eq!(dispatcher.limiter().remaining(), 97);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), 5);
        let err = dispatcher(&config).send(&query(), &session()).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_graphql_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{"code": 214, "message": "Bad request"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), 5);
        let err = dispatcher(&config).send(&query(), &session()).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_connection_error_exhausts_retries() {
        let config = test_config("http://127.0.0.1:1", 2);
        let err = dispatcher(&config).send(&query(), &session()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::TransientFailure {
                attempts: 2,
                cause: TransientCause::Connection(_)
            }
        ));
    }

    #[test]
    fn test_reset_delay_in_past_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-reset", HeaderValue::from_static("1000"));
        assert_eq!(reset_delay(&headers), None);
        assert_eq!(reset_delay(&HeaderMap::new()), None);

        headers.insert(
            "x-rate-limit-reset",
            HeaderValue::from_static("-9223372036854775808"),
        );
        assert_eq!(reset_delay(&headers), None);
    }

    #[test]
    fn test_reset_delay_far_future_is_some() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-rate-limit-reset",
            HeaderValue::from_static("9223372036854775807"),
        );
        assert!(reset_delay(&headers).is_some());
    }
}
