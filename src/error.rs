use std::time::Duration;

use thiserror::Error;

/// Credential problems. Never retried.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No session has been loaded or set.
    #[error("no session established; load cookies first")]
    NoSession,

    /// The persisted cookie document could not be parsed.
    #[error("malformed cookie document: {0}")]
    Malformed(String),

    /// A cookie required for an authenticated session is missing or empty.
    #[error("cookie `{0}` is missing or empty")]
    MissingCookie(&'static str),

    /// The cookie file could not be read.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// The service rejected the credentials.
    #[error("credentials rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Why a transient attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientCause {
    /// Connection, timeout or request-level transport failure.
    Connection(String),
    /// 5xx response.
    Server { status: u16, body: String },
    /// 429 response; `retry_after` comes from the reset header when present.
    RateLimited { retry_after: Option<Duration> },
}

impl std::fmt::Display for TransientCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(message) => write!(f, "connection error: {message}"),
            Self::Server { status, body } => write!(f, "server error {status}: {body}"),
            Self::RateLimited {
                retry_after: Some(after),
            } => write!(f, "rate limit exceeded, reset in {}s", after.as_secs()),
            Self::RateLimited { retry_after: None } => write!(f, "rate limit exceeded"),
        }
    }
}

/// A payload (or one entry of it) did not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("decode error{}: {reason}", .entry_id.as_deref().map(|id| format!(" in entry {id}")).unwrap_or_default())]
pub struct DecodeError {
    /// Timeline entry the failure belongs to, if it is entry-scoped.
    pub entry_id: Option<String>,
    pub reason: String,
}

impl DecodeError {
    pub fn payload(reason: impl Into<String>) -> Self {
        Self {
            entry_id: None,
            reason: reason.into(),
        }
    }

    pub fn entry(entry_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entry_id: Some(entry_id.into()),
            reason: reason.into(),
        }
    }
}

/// Top-level error returned by every client operation.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Retries exhausted on a transient condition.
    #[error("transient failure after {attempts} attempt(s): {cause}")]
    TransientFailure { attempts: u32, cause: TransientCause },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// `next()` was called on a page without a continuation cursor.
    #[error("pagination exhausted: the page has no continuation cursor")]
    ExhaustedPagination,

    /// The query cannot be run as built, e.g. a zero page size.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The requested object does not exist or is unavailable.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service rejected the request for a non-transient reason.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Request could not be built or sent for a non-transient reason.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
