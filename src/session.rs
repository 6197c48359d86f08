//! Cookie-backed session handling.
//!
//! A [`Session`] is either fully authenticated or does not exist: cookie sets
//! missing `auth_token` or `ct0`, or holding names and values that cannot be
//! sent in a `Cookie` header, are rejected when they are loaded, not on first
//! use.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::header::HeaderValue;
use serde::Deserialize;

use crate::error::{AuthError, ClientResult};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";
pub const CSRF_COOKIE: &str = "ct0";
const TWID_COOKIE: &str = "twid";

/// Authenticated credential context: cookies plus locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    cookies: BTreeMap<String, String>,
    locale: String,
}

impl Session {
    pub fn from_cookies(
        cookies: BTreeMap<String, String>,
        locale: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let locale = locale.into();
        if HeaderValue::from_str(&locale).is_err() {
            return Err(AuthError::Malformed(format!("invalid locale {locale:?}")));
        }
        for (name, value) in &cookies {
            check_cookie(name, value)?;
        }

        for required in [AUTH_TOKEN_COOKIE, CSRF_COOKIE] {
            match cookies.get(required) {
                Some(value) if !value.trim().is_empty() => {}
                _ => return Err(AuthError::MissingCookie(required)),
            }
        }

        Ok(Self { cookies, locale })
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Value echoed in the `x-csrf-token` header.
    pub fn csrf_token(&self) -> &str {
        self.cookie(CSRF_COOKIE).unwrap_or_default()
    }

    /// `Cookie` request header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Write the cookie set verbatim as a JSON object. No network access.
    pub fn save(&self, destination: impl AsRef<Path>) -> ClientResult<()> {
        let path = destination.as_ref();
        let json = serde_json::to_string_pretty(&self.cookies)?;
        std::fs::write(path, json)?;
        log::debug!("Saved {} cookies to {}", self.cookies.len(), path.display());
        Ok(())
    }

    /// Numeric id of the logged-in account, taken from the `twid` cookie
    /// (`u%3D<id>` or `"u=<id>"`).
    pub fn user_id(&self) -> Option<String> {
        let raw = self.cookie(TWID_COOKIE)?.trim_matches('"').replace("%3D", "=");
        let id = raw.strip_prefix("u=")?;
        (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
    }
}

/// A cookie must survive the trip into a `Cookie` header unchanged.
fn check_cookie(name: &str, value: &str) -> Result<(), AuthError> {
    let bad_name = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || !c.is_ascii() || matches!(c, ';' | '=' | ','));
    if bad_name {
        return Err(AuthError::Malformed(format!("invalid cookie name {name:?}")));
    }

    if value.contains(';') || HeaderValue::from_str(value).is_err() {
        return Err(AuthError::Malformed(format!("invalid value for cookie `{name}`")));
    }
    Ok(())
}

/// Accepted on-disk forms of a cookie set.
#[derive(Deserialize)]
#[serde(untagged)]
enum CookieDocument {
    /// `{"name": "value", ...}`
    Map(BTreeMap<String, String>),
    /// Browser export: `[{"name": ..., "value": ..., "domain": ...}, ...]`
    Export(Vec<ExportedCookie>),
}

#[derive(Deserialize)]
struct ExportedCookie {
    name: String,
    value: String,
}

/// Parse a persisted cookie document into a name -> value mapping.
pub fn parse_cookie_document(raw: &str) -> Result<BTreeMap<String, String>, AuthError> {
    let document: CookieDocument =
        serde_json::from_str(raw).map_err(|e| AuthError::Malformed(e.to_string()))?;

    let cookies = match document {
        CookieDocument::Map(map) => map,
        CookieDocument::Export(list) => list.into_iter().map(|c| (c.name, c.value)).collect(),
    };

    if cookies.is_empty() {
        return Err(AuthError::Malformed("cookie document is empty".into()));
    }
    Ok(cookies)
}

/// Holds the active session. Shared read-only by every dispatched request.
#[derive(Debug)]
pub struct SessionStore {
    locale: String,
    current: RwLock<Option<Arc<Session>>>,
}

impl SessionStore {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            current: RwLock::new(None),
        }
    }

    /// Load cookies from a JSON file and make them the active session.
    pub fn load(&self, source: impl AsRef<Path>) -> Result<Arc<Session>, AuthError> {
        let path = source.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let session = self.load_str(&raw)?;
        log::info!("Loaded {} cookies from {}", session.cookies().len(), path.display());
        Ok(session)
    }

    pub fn load_str(&self, raw: &str) -> Result<Arc<Session>, AuthError> {
        let cookies = parse_cookie_document(raw)?;
        let session = Session::from_cookies(cookies, self.locale.clone())?;
        Ok(self.set(session))
    }

    /// Write the active cookie set. See [`Session::save`].
    pub fn save(&self, destination: impl AsRef<Path>) -> ClientResult<()> {
        self.current()?.save(destination)
    }

    pub fn current(&self) -> Result<Arc<Session>, AuthError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AuthError::NoSession)
    }

    /// Replace the active session. Requests already in flight keep whichever
    /// session they started with.
    pub fn set(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&session));
        session
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }
}
