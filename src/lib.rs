// Rust Tweet Client Library
//
// Cookie-session client for the X/Twitter web GraphQL API with a shared
// sliding-window rate limiter, retrying dispatch and cursor pagination.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod models;
pub mod operations;
pub mod page;
pub mod query;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod timeline;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use client::Client;
pub use config::{ClientConfig, RateLimitConfig, RetryConfig};
pub use error::{AuthError, ClientError, ClientResult, DecodeError, TransientCause};
pub use models::{Identified, Tweet, User, UserAbout};
pub use operations::SearchProduct;
pub use page::{PageState, ResultPage};
pub use query::{CursorToken, Query};
pub use rate_limit::RateLimiter;
pub use session::{Session, SessionStore};
pub use utils::{normalize_screen_name, tweet_id_from_url};
