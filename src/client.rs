use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::dispatcher::RequestDispatcher;
use crate::error::{AuthError, ClientResult};
use crate::executor::QueryExecutor;
use crate::models::{Tweet, User, UserAbout};
use crate::operations::{self, SearchProduct};
use crate::page::ResultPage;
use crate::rate_limit::RateLimiter;
use crate::session::{Session, SessionStore};
use crate::timeline;
use crate::utils::normalize_screen_name;

/// Entry point of the library.
///
/// ```no_run
/// # async fn demo() -> rust_tweet_client::ClientResult<()> {
/// use rust_tweet_client::{Client, ClientConfig};
///
/// let client = Client::new(ClientConfig::new("en-US"))?;
/// client.load_cookies("cookies.json")?;
///
/// let page = client.get_tweet_quotes("1234567890123456789", 20).await?;
/// for tweet in &page {
///     println!("{}: {}", tweet.user.screen_name, tweet.text);
/// }
/// let _more = page.next().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    sessions: Arc<SessionStore>,
    executor: QueryExecutor,
}

impl Client {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let dispatcher = RequestDispatcher::new(&config, limiter)?;
        let sessions = Arc::new(SessionStore::new(config.locale.clone()));
        let executor = QueryExecutor::new(dispatcher, Arc::clone(&sessions));

        log::debug!(
            "Client ready: {} (locale {}, {} calls per {}s)",
            config.api_url,
            config.locale,
            config.rate_limit.max_calls,
            config.rate_limit.window_secs
        );

        Ok(Self {
            config,
            sessions,
            executor,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.executor.dispatcher().limiter()
    }

    // Session management

    pub fn load_cookies(&self, path: impl AsRef<Path>) -> ClientResult<Arc<Session>> {
        Ok(self.sessions.load(path)?)
    }

    pub fn load_cookies_str(&self, raw: &str) -> ClientResult<Arc<Session>> {
        Ok(self.sessions.load_str(raw)?)
    }

    pub fn save_cookies(&self, path: impl AsRef<Path>) -> ClientResult<()> {
        self.sessions.save(path)
    }

    /// Install a cookie set built in memory.
    pub fn set_cookies(&self, cookies: BTreeMap<String, String>) -> ClientResult<Arc<Session>> {
        let session = Session::from_cookies(cookies, self.sessions.locale())?;
        Ok(self.sessions.set(session))
    }

    // Operations

    /// The account the loaded cookies belong to.
    pub async fn user(&self) -> ClientResult<User> {
        let session = self.sessions.current()?;
        let user_id = session
            .user_id()
            .ok_or(AuthError::MissingCookie("twid"))?;
        self.get_user_by_id(&user_id).await
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> ClientResult<User> {
        let payload = self.executor.send(&operations::user_by_id(user_id)).await?;
        timeline::decode_user(&payload, user_id)
    }

    pub async fn get_user_about(&self, screen_name: &str) -> ClientResult<UserAbout> {
        let screen_name = normalize_screen_name(screen_name);
        let payload = self
            .executor
            .send(&operations::about_account(screen_name))
            .await?;
        timeline::decode_user_about(&payload, screen_name)
    }

    pub async fn get_tweet_by_id(&self, tweet_id: &str) -> ClientResult<Tweet> {
        let payload = self.executor.send(&operations::tweet_by_id(tweet_id)).await?;
        timeline::decode_tweet(&payload, tweet_id)
    }

    /// First page of the tweets quoting `tweet_id`, at most `count` items.
    pub async fn get_tweet_quotes(&self, tweet_id: &str, count: usize) -> ClientResult<ResultPage<Tweet>> {
        self.executor
            .run(
                operations::tweet_quotes(tweet_id, count),
                timeline::decode_search_timeline,
            )
            .await
    }

    pub async fn get_quotes(&self, tweet: &Tweet, count: usize) -> ClientResult<ResultPage<Tweet>> {
        self.get_tweet_quotes(&tweet.id, count).await
    }

    pub async fn search_tweets(
        &self,
        raw_query: &str,
        product: SearchProduct,
        count: usize,
    ) -> ClientResult<ResultPage<Tweet>> {
        self.executor
            .run(
                operations::search_tweets(raw_query, product, count),
                timeline::decode_search_timeline,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::test_support::{TEST_COOKIES, test_config};
    use crate::timeline::fixtures::{cursor_entry, search_page, tweet, tweet_entry, user};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> Client {
        let client = Client::new(test_config(&server.uri(), 3)).unwrap();
        client.load_cookies_str(TEST_COOKIES).unwrap();
        client
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = ClientConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(Client::new(config), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_set_cookies_requires_credentials() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let cookies = BTreeMap::from([("auth_token".to_string(), "tok".to_string())]);

        let err = client.set_cookies(cookies).unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::MissingCookie("ct0"))));
        assert!(client.sessions().current().is_err());
    }

    #[test]
    fn test_save_and_reload_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cookies.json");

        let client = Client::new(ClientConfig::default()).unwrap();
        let original = client.load_cookies_str(TEST_COOKIES).unwrap();
        client.save_cookies(&file).unwrap();

        let other = Client::new(ClientConfig::default()).unwrap();
        let reloaded = other.load_cookies(&file).unwrap();
        assert_eq!(reloaded.cookies(), original.cookies());
    }

    #[tokio::test]
    async fn test_user_resolves_twid_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graphql/tD8zKvQzwY3kdx5yz6YmOw/UserByRestId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"user": {"result": user("44196397", "elonmusk")}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let me = client(&server).user().await.unwrap();
        assert_eq!(me.id, "44196397");
        assert_eq!(me.screen_name, "elonmusk");
    }

    #[tokio::test]
    async fn test_get_user_about_strips_at_sign() {
        let server = MockServer::start().await;
        let mut raw = user("1605", "sama");
        raw["about_profile"] = json!({"account_based_in": "United States"});
        Mock::given(method("GET"))
            .and(path("/graphql/zs_jFPFT78rBpXv9Z3U2YQ/AboutAccountQuery"))
            .and(query_param("variables", r#"{"screenName":"sama"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"user_result_by_screen_name": {"result": raw}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let about = client(&server).get_user_about("@sama").await.unwrap();
        assert_eq!(about.screen_name, "sama");
        assert_eq!(about.account_based_in.as_deref(), Some("United States"));
    }

    #[tokio::test]
    async fn test_get_tweet_then_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graphql/Xl5pC_lBk_gcO2ItU39DQw/TweetResultByRestId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"tweetResult": {"result": tweet("1234567890123456789")}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/graphql/flaR-PUMshxFWZWPNpq4zA/SearchTimeline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_page(vec![
                tweet_entry("11"),
                tweet_entry("12"),
                cursor_entry("Bottom", "NEXT"),
            ])))
            .mount(&server)
            .await;

        let client = client(&server);
        let tweet = client.get_tweet_by_id("1234567890123456789").await.unwrap();
        let quotes = client.get_quotes(&tweet, 20).await.unwrap();

        assert_eq!(quotes.len(), 2);
        assert!(quotes.has_more());
        assert!(
            quotes
                .iter()
                .all(|q| q.quoted_tweet_id.as_deref() == Some("1234567890123456789"))
        );
    }

    #[tokio::test]
    async fn test_missing_tweet_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"tweetResult": {}}})),
            )
            .mount(&server)
            .await;

        let err = client(&server).get_tweet_by_id("1").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_operations_share_one_limiter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_page(vec![])))
            .mount(&server)
            .await;

        let client = client(&server);
        client.get_tweet_quotes("1", 5).await.unwrap();
        client
            .search_tweets("rust", SearchProduct::Top, 5)
            .await
            .unwrap();
        assert_eq!(client.rate_limiter().remaining(), 98);
    }
}
