use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatcher::RequestDispatcher;
use crate::error::{ClientError, ClientResult, DecodeError};
use crate::models::Identified;
use crate::page::ResultPage;
use crate::query::{CursorToken, Query};
use crate::session::SessionStore;
use crate::timeline::{DecodedPage, PageDecoder};

/// Identifiers and cursors already seen during one pagination walk.
#[derive(Debug, Clone, Default)]
pub(crate) struct WalkState {
    pub(crate) seen_ids: HashSet<String>,
    pub(crate) seen_cursors: HashSet<CursorToken>,
}

struct ExecutorInner {
    dispatcher: RequestDispatcher,
    sessions: Arc<SessionStore>,
}

/// Cheap to clone; every page of a walk holds one to fetch its successor.
#[derive(Clone)]
pub struct QueryExecutor {
    inner: Arc<ExecutorInner>,
}

impl QueryExecutor {
    pub fn new(dispatcher: RequestDispatcher, sessions: Arc<SessionStore>) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                dispatcher,
                sessions,
            }),
        }
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.inner.dispatcher
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.inner.sessions
    }

    /// Dispatch `query` with the current session and return the raw payload.
    pub async fn send(&self, query: &Query) -> ClientResult<Value> {
        let session = self.inner.sessions.current()?;
        self.inner.dispatcher.send(query, &session).await
    }

    /// Run the first page of a new pagination walk.
    pub async fn run<T: Identified>(
        &self,
        query: Query,
        decode: PageDecoder<T>,
    ) -> ClientResult<ResultPage<T>> {
        if query.requested_count() == Some(0) {
            return Err(ClientError::InvalidQuery(format!(
                "{}: count must be at least 1",
                query.operation().name
            )));
        }
        self.run_walk(query, decode, WalkState::default(), Vec::new())
            .await
    }

    /// Fetch and build one page of an existing walk.
    pub(crate) async fn run_walk<T: Identified>(
        &self,
        query: Query,
        decode: PageDecoder<T>,
        walk: WalkState,
        held_back: Vec<T>,
    ) -> ClientResult<ResultPage<T>> {
        let payload = self.send(&query).await?;
        let decoded = decode(&payload)?;
        Ok(self.build_page(query, decode, walk, held_back, decoded))
    }

    /// Turn a decoded payload into the next page of a walk.
    ///
    /// Items held back from the previous page come first. Entries that fail
    /// to decode are skipped and kept as diagnostics on the page. Items whose
    /// id was already returned earlier in the walk are dropped. Items beyond
    /// the requested count are held back for the following page.
    pub(crate) fn build_page<T: Identified>(
        &self,
        query: Query,
        decode: PageDecoder<T>,
        mut walk: WalkState,
        held_back: Vec<T>,
        decoded: DecodedPage<T>,
    ) -> ResultPage<T> {
        let operation = query.operation().name;
        let mut items = held_back;
        let mut decode_errors: Vec<DecodeError> = Vec::new();
        let mut duplicates = 0;

        for item in decoded.items {
            match item {
                Ok(item) => {
                    if walk.seen_ids.insert(item.id().to_string()) {
                        items.push(item);
                    } else {
                        duplicates += 1;
                    }
                }
                Err(e) => {
                    log::warn!("{}: skipping entry: {}", operation, e);
                    decode_errors.push(e);
                }
            }
        }

        let limit = query.requested_count().unwrap_or(usize::MAX);
        let held_back = if items.len() > limit {
            items.split_off(limit)
        } else {
            Vec::new()
        };

        if duplicates > 0 {
            log::debug!("{}: dropped {} already-seen items", operation, duplicates);
        }
        if !held_back.is_empty() {
            log::debug!(
                "{}: holding {} items over the requested count for the next page",
                operation,
                held_back.len()
            );
        }

        if let Some(cursor) = query.cursor() {
            walk.seen_cursors.insert(cursor.clone());
        }
        let next_cursor = match decoded.next_cursor {
            Some(cursor) if walk.seen_cursors.contains(&cursor) => {
                log::warn!("{}: service repeated a cursor, ending the walk", operation);
                None
            }
            other => other,
        };

        log::info!(
            "{}: {} items, {} skipped, {}",
            operation,
            items.len(),
            decode_errors.len(),
            if next_cursor.is_some() || !held_back.is_empty() {
                "more available"
            } else {
                "last page"
            }
        );

        ResultPage::new(
            self.clone(),
            query,
            decode,
            items,
            next_cursor,
            held_back,
            decode_errors,
            walk,
        )
    }
}
