//! Decoding of raw GraphQL payloads into domain objects.
//!
//! Every shape the service can return is modelled as a tagged enum
//! (`__typename`, `entryType`, `itemType`, instruction `type`); anything that
//! does not match is a [`DecodeError`] rather than a missing field at use time.
//!
//! Timeline entries are decoded one by one so that a single malformed entry
//! can be reported without discarding the rest of the page.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClientError, ClientResult, DecodeError};
use crate::models::{Tweet, User, UserAbout};
use crate::query::CursorToken;

pub const SEARCH_TIMELINE_INSTRUCTIONS: &str =
    "/data/search_by_raw_query/search_timeline/timeline/instructions";
const TWEET_RESULT: &str = "/data/tweetResult/result";
const USER_RESULT: &str = "/data/user/result";
const ABOUT_RESULT: &str = "/data/user_result_by_screen_name/result";

const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// One page as decoded from a payload, before count capping and
/// de-duplication. Entry-level failures are kept in place.
#[derive(Debug)]
pub struct DecodedPage<T> {
    pub items: Vec<Result<T, DecodeError>>,
    pub next_cursor: Option<CursorToken>,
}

/// Turns a raw payload into a [`DecodedPage`]. A plain `fn` so pages can
/// carry it along to build their successors.
pub type PageDecoder<T> = fn(&Value) -> Result<DecodedPage<T>, DecodeError>;

#[derive(Deserialize)]
struct Results<T> {
    result: Option<T>,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum TweetResult {
    Tweet(Box<RawTweet>),
    TweetWithVisibilityResults { tweet: Box<RawTweet> },
    TweetTombstone,
    TweetUnavailable,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct RawTweet {
    rest_id: String,
    core: RawTweetCore,
    legacy: RawTweetLegacy,
    #[serde(default)]
    note_tweet: Option<RawNoteTweet>,
}

#[derive(Deserialize)]
struct RawTweetCore {
    user_results: Results<UserResult>,
}

#[derive(Deserialize)]
struct RawTweetLegacy {
    full_text: String,
    created_at: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    favorite_count: u64,
    #[serde(default)]
    quote_count: u64,
    #[serde(default)]
    quoted_status_id_str: Option<String>,
}

#[derive(Deserialize)]
struct RawNoteTweet {
    note_tweet_results: Results<RawNoteTweetResult>,
}

#[derive(Deserialize)]
struct RawNoteTweetResult {
    text: String,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum UserResult {
    User(Box<RawUser>),
    UserUnavailable,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct RawUser {
    rest_id: String,
    #[serde(default)]
    core: Option<RawUserCore>,
    #[serde(default)]
    legacy: RawUserLegacy,
    #[serde(default)]
    is_blue_verified: bool,
    #[serde(default)]
    about_profile: Option<RawAboutProfile>,
    #[serde(default)]
    verification_info: Option<RawVerificationInfo>,
}

#[derive(Deserialize)]
struct RawUserCore {
    screen_name: String,
    name: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawUserLegacy {
    screen_name: Option<String>,
    name: Option<String>,
    description: String,
    followers_count: u64,
    friends_count: u64,
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct RawAboutProfile {
    #[serde(default)]
    account_based_in: Option<String>,
    #[serde(default)]
    location_accurate: Option<bool>,
    #[serde(default)]
    affiliate_username: Option<String>,
    #[serde(default)]
    username_changes: Option<RawUsernameChanges>,
}

#[derive(Deserialize)]
struct RawUsernameChanges {
    #[serde(default)]
    count: Option<Numeric>,
    #[serde(default)]
    last_changed_at_msec: Option<Numeric>,
}

#[derive(Deserialize)]
struct RawVerificationInfo {
    #[serde(default)]
    is_identity_verified: bool,
    #[serde(default)]
    reason: Option<RawVerificationReason>,
}

#[derive(Deserialize)]
struct RawVerificationReason {
    #[serde(default)]
    verified_since_msec: Option<Numeric>,
}

/// Counters arrive either as JSON numbers or as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Text(String),
}

impl Numeric {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Instruction {
    TimelineAddEntries { entries: Vec<Value> },
    TimelineReplaceEntry { entry: Value },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "entryId")]
    entry_id: String,
    content: EntryContent,
}

#[derive(Deserialize)]
#[serde(tag = "entryType")]
enum EntryContent {
    TimelineTimelineItem {
        #[serde(rename = "itemContent")]
        item_content: ItemContent,
    },
    TimelineTimelineCursor {
        value: String,
        #[serde(rename = "cursorType")]
        cursor_type: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "itemType")]
enum ItemContent {
    TimelineTweet { tweet_results: Results<TweetResult> },
    #[serde(other)]
    Other,
}

fn parse_created_at(raw: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .map_err(|e| format!("invalid created_at {raw:?}: {e}"))
}

fn optional_created_at(raw: Option<&str>) -> Result<Option<DateTime<FixedOffset>>, String> {
    raw.map(parse_created_at).transpose()
}

impl RawUser {
    fn into_user(self) -> Result<User, String> {
        let created_at = self
            .core
            .as_ref()
            .and_then(|c| c.created_at.as_deref())
            .or(self.legacy.created_at.as_deref());
        let created_at = optional_created_at(created_at)?;

        let (screen_name, name) = match self.core {
            Some(core) => (core.screen_name, core.name),
            None => (
                self.legacy.screen_name.ok_or("user has no screen_name")?,
                self.legacy.name.unwrap_or_default(),
            ),
        };

        Ok(User {
            id: self.rest_id,
            screen_name,
            name,
            description: self.legacy.description,
            followers_count: self.legacy.followers_count,
            following_count: self.legacy.friends_count,
            is_blue_verified: self.is_blue_verified,
            created_at,
        })
    }

    fn into_about(mut self) -> Result<UserAbout, String> {
        let profile = self.about_profile.take();
        let verification = self.verification_info.take();
        let user = self.into_user()?;

        let (changes, last_change) = profile
            .as_ref()
            .and_then(|p| p.username_changes.as_ref())
            .map(|c| {
                (
                    c.count.as_ref().and_then(Numeric::as_i64),
                    c.last_changed_at_msec.as_ref().and_then(Numeric::as_i64),
                )
            })
            .unwrap_or_default();

        let (account_based_in, location_accurate, affiliate_username) = match profile {
            Some(p) => (p.account_based_in, p.location_accurate, p.affiliate_username),
            None => (None, None, None),
        };

        let (is_identity_verified, verified_since) = match verification {
            Some(v) => (
                v.is_identity_verified,
                v.reason
                    .and_then(|r| r.verified_since_msec)
                    .and_then(|n| n.as_i64()),
            ),
            None => (false, None),
        };

        Ok(UserAbout {
            id: user.id,
            screen_name: user.screen_name,
            name: user.name,
            account_based_in,
            location_accurate,
            username_changes: changes.and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
            last_username_change_at: last_change,
            is_identity_verified,
            verified_since,
            affiliate_username,
        })
    }
}

impl UserResult {
    fn into_raw(self) -> Result<Option<RawUser>, String> {
        match self {
            Self::User(raw) => Ok(Some(*raw)),
            Self::UserUnavailable => Ok(None),
            Self::Unknown => Err("unknown user result kind".to_string()),
        }
    }
}

impl RawTweet {
    fn into_tweet(self) -> Result<Tweet, String> {
        let user = self
            .core
            .user_results
            .result
            .ok_or("tweet has no author")?
            .into_raw()?
            .ok_or("tweet author is unavailable")?
            .into_user()?;

        let text = self
            .note_tweet
            .and_then(|n| n.note_tweet_results.result)
            .map(|n| n.text)
            .unwrap_or(self.legacy.full_text);

        Ok(Tweet {
            id: self.rest_id,
            text,
            created_at: Some(parse_created_at(&self.legacy.created_at)?),
            lang: self.legacy.lang,
            user,
            reply_count: self.legacy.reply_count,
            retweet_count: self.legacy.retweet_count,
            favorite_count: self.legacy.favorite_count,
            quote_count: self.legacy.quote_count,
            quoted_tweet_id: self.legacy.quoted_status_id_str,
        })
    }
}

impl TweetResult {
    /// `Ok(None)` for tombstones and withheld tweets: valid entries that
    /// carry no tweet.
    fn into_tweet(self) -> Result<Option<Tweet>, String> {
        match self {
            Self::Tweet(raw) | Self::TweetWithVisibilityResults { tweet: raw } => {
                (*raw).into_tweet().map(Some)
            }
            Self::TweetTombstone | Self::TweetUnavailable => Ok(None),
            Self::Unknown => Err("unknown tweet result kind".to_string()),
        }
    }
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, String> {
    T::deserialize(value).map_err(|e| e.to_string())
}

/// Decode a single timeline entry. `Ok(None)` means the entry is valid but
/// holds no tweet (cursor, module, tombstone, promoted content, ...).
fn decode_entry(
    raw: &Value,
    next_cursor: &mut Option<CursorToken>,
) -> Result<Option<Tweet>, DecodeError> {
    let entry_id = raw
        .get("entryId")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>");
    let entry: RawEntry = from_value(raw).map_err(|e| DecodeError::entry(entry_id, e))?;

    match entry.content {
        EntryContent::TimelineTimelineCursor { value, cursor_type } => {
            if cursor_type == "Bottom" {
                *next_cursor = Some(CursorToken::new(value));
            }
            Ok(None)
        }
        EntryContent::TimelineTimelineItem {
            item_content: ItemContent::TimelineTweet { tweet_results },
        } => match tweet_results.result {
            Some(result) => result
                .into_tweet()
                .map_err(|e| DecodeError::entry(&entry.entry_id, e)),
            None => Ok(None),
        },
        EntryContent::TimelineTimelineItem { .. } | EntryContent::Other => Ok(None),
    }
}

/// Decode the instruction list found at `pointer` into tweets and the
/// bottom cursor.
///
/// A page with no item entries at all is treated as terminal: the service
/// keeps handing out bottom cursors past the end of a result set.
pub fn decode_tweet_timeline(
    payload: &Value,
    pointer: &str,
) -> Result<DecodedPage<Tweet>, DecodeError> {
    let instructions = payload
        .pointer(pointer)
        .ok_or_else(|| DecodeError::payload(format!("no timeline instructions at {pointer}")))?;
    let instructions: Vec<Instruction> =
        from_value(instructions).map_err(DecodeError::payload)?;

    let mut items = Vec::new();
    let mut next_cursor = None;
    let mut saw_item_entry = false;

    for instruction in &instructions {
        let entries: Vec<&Value> = match instruction {
            Instruction::TimelineAddEntries { entries } => entries.iter().collect(),
            Instruction::TimelineReplaceEntry { entry } => vec![entry],
            Instruction::Other => Vec::new(),
        };

        for raw in entries {
            let is_item = raw
                .pointer("/content/entryType")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind != "TimelineTimelineCursor");
            saw_item_entry |= is_item;

            match decode_entry(raw, &mut next_cursor) {
                Ok(Some(tweet)) => items.push(Ok(tweet)),
                Ok(None) => {}
                Err(e) => items.push(Err(e)),
            }
        }
    }

    if !saw_item_entry {
        next_cursor = None;
    }

    Ok(DecodedPage { items, next_cursor })
}

/// Decoder for `SearchTimeline` responses.
pub fn decode_search_timeline(payload: &Value) -> Result<DecodedPage<Tweet>, DecodeError> {
    decode_tweet_timeline(payload, SEARCH_TIMELINE_INSTRUCTIONS)
}

fn result_at<'a>(payload: &'a Value, pointer: &str, what: &str) -> ClientResult<&'a Value> {
    match payload.pointer(pointer) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(ClientError::NotFound(what.to_string())),
    }
}

/// Decoder for `TweetResultByRestId` responses.
pub fn decode_tweet(payload: &Value, tweet_id: &str) -> ClientResult<Tweet> {
    let what = format!("tweet {tweet_id}");
    let result: TweetResult =
        from_value(result_at(payload, TWEET_RESULT, &what)?).map_err(DecodeError::payload)?;
    result
        .into_tweet()
        .map_err(DecodeError::payload)?
        .ok_or(ClientError::NotFound(what))
}

fn decode_user_result(payload: &Value, pointer: &str, what: &str) -> ClientResult<RawUser> {
    let result: UserResult =
        from_value(result_at(payload, pointer, what)?).map_err(DecodeError::payload)?;
    result
        .into_raw()
        .map_err(DecodeError::payload)?
        .ok_or_else(|| ClientError::NotFound(what.to_string()))
}

/// Decoder for `UserByRestId` responses.
pub fn decode_user(payload: &Value, user_id: &str) -> ClientResult<User> {
    let raw = decode_user_result(payload, USER_RESULT, &format!("user {user_id}"))?;
    Ok(raw.into_user().map_err(DecodeError::payload)?)
}

/// Decoder for `AboutAccountQuery` responses.
pub fn decode_user_about(payload: &Value, screen_name: &str) -> ClientResult<UserAbout> {
    let raw = decode_user_result(payload, ABOUT_RESULT, &format!("user @{screen_name}"))?;
    Ok(raw.into_about().map_err(DecodeError::payload)?)
}
