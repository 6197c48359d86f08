use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Items that carry a stable service-side identifier. Pagination uses it to
/// guarantee no item is returned twice within one walk.
pub trait Identified {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub screen_name: String,
    pub name: String,
    pub description: String,
    pub followers_count: u64,
    pub following_count: u64,
    pub is_blue_verified: bool,
    pub created_at: Option<DateTime<FixedOffset>>,
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub lang: Option<String>,
    pub user: User,
    pub reply_count: u64,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub quote_count: u64,
    /// Id of the tweet this one quotes, if any.
    pub quoted_tweet_id: Option<String>,
}

impl Identified for Tweet {
    fn id(&self) -> &str {
        &self.id
    }
}

/// "About this account" data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAbout {
    pub id: String,
    pub screen_name: String,
    pub name: String,
    pub account_based_in: Option<String>,
    pub location_accurate: Option<bool>,
    pub username_changes: u32,
    /// Milliseconds since the epoch.
    pub last_username_change_at: Option<i64>,
    pub is_identity_verified: bool,
    /// Milliseconds since the epoch.
    pub verified_since: Option<i64>,
    pub affiliate_username: Option<String>,
}
