//! Cursor-paginated result pages.
//!
//! A walk is strictly sequential: page N+1 can only be built from page N.
//! Dropping a page (or the stream returned by [`ResultPage::into_stream`])
//! abandons the walk; nothing needs cleaning up.

use std::ops::Deref;

use futures::stream::{self, Stream, TryStreamExt};

use crate::error::{ClientError, ClientResult, DecodeError};
use crate::executor::{QueryExecutor, WalkState};
use crate::models::Identified;
use crate::query::{CursorToken, Query};
use crate::timeline::{DecodedPage, PageDecoder};

/// Position of a page in its walk. `Terminal` is absorbing: only a new
/// query starts another walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    HasMore,
    Terminal,
}

/// One page of an ordered, possibly continuable result set.
pub struct ResultPage<T> {
    items: Vec<T>,
    next_cursor: Option<CursorToken>,
    held_back: Vec<T>,
    decode_errors: Vec<DecodeError>,
    query: Query,
    decode: PageDecoder<T>,
    executor: QueryExecutor,
    walk: WalkState,
}

impl<T> std::fmt::Debug for ResultPage<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultPage")
            .field("items", &self.items)
            .field("next_cursor", &self.next_cursor)
            .field("held_back", &self.held_back)
            .field("decode_errors", &self.decode_errors)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

enum Walk<T> {
    First(ResultPage<T>),
    After(ResultPage<T>),
}

impl<T: Identified> ResultPage<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        executor: QueryExecutor,
        query: Query,
        decode: PageDecoder<T>,
        items: Vec<T>,
        next_cursor: Option<CursorToken>,
        held_back: Vec<T>,
        decode_errors: Vec<DecodeError>,
        walk: WalkState,
    ) -> Self {
        Self {
            items,
            next_cursor,
            held_back,
            decode_errors,
            query,
            decode,
            executor,
            walk,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn next_cursor(&self) -> Option<&CursorToken> {
        self.next_cursor.as_ref()
    }

    /// Items the service already sent past the requested count. They open
    /// the next page.
    pub fn held_back(&self) -> &[T] {
        &self.held_back
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some() || !self.held_back.is_empty()
    }

    pub fn state(&self) -> PageState {
        if self.has_more() {
            PageState::HasMore
        } else {
            PageState::Terminal
        }
    }

    /// Entries of this page that were skipped because they failed to decode.
    pub fn decode_errors(&self) -> &[DecodeError] {
        &self.decode_errors
    }

    /// The query that produced this page.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Consume this page and fetch the following one, handing the walk
    /// state over instead of copying it.
    ///
    /// Fails with [`ClientError::ExhaustedPagination`] on a terminal page.
    pub async fn into_next(mut self) -> ClientResult<ResultPage<T>> {
        let walk = std::mem::take(&mut self.walk);
        let held_back = std::mem::take(&mut self.held_back);
        self.successor(walk, held_back).await
    }

    async fn successor(&self, walk: WalkState, held_back: Vec<T>) -> ClientResult<ResultPage<T>> {
        match &self.next_cursor {
            Some(cursor) => {
                let query = self.query.with_cursor(cursor.clone());
                self.executor
                    .run_walk(query, self.decode, walk, held_back)
                    .await
            }
            // the service is done but items are still held back
            None if !held_back.is_empty() => {
                let decoded = DecodedPage {
                    items: Vec::new(),
                    next_cursor: None,
                };
                Ok(self
                    .executor
                    .build_page(self.query.clone(), self.decode, walk, held_back, decoded))
            }
            None => Err(ClientError::ExhaustedPagination),
        }
    }

    /// Walk forward from this page until `max` items are gathered or the
    /// walk ends.
    pub async fn collect_up_to(self, max: usize) -> ClientResult<Vec<T>> {
        let mut out = Vec::new();
        let mut page = self;

        loop {
            let remaining = max.saturating_sub(out.len());
            out.extend(page.items.drain(..).take(remaining));

            if out.len() >= max || !page.has_more() {
                return Ok(out);
            }
            log::debug!("Collected {} items so far", out.len());
            page = page.into_next().await?;
        }
    }

    /// Every item of the walk, starting with this page. The next page is
    /// only requested once the current one has been consumed.
    pub fn into_stream(self) -> impl Stream<Item = ClientResult<T>> {
        stream::try_unfold(Walk::First(self), |state| async move {
            let mut page = match state {
                Walk::First(page) => page,
                Walk::After(page) if page.has_more() => page.into_next().await?,
                Walk::After(_) => return Ok(None),
            };
            let items = std::mem::take(&mut page.items);
            Ok::<_, ClientError>(Some((
                stream::iter(items.into_iter().map(Ok::<T, ClientError>)),
                Walk::After(page),
            )))
        })
        .try_flatten()
    }
}

impl<T: Identified + Clone> ResultPage<T> {
    /// Fetch the following page of the same query. This page stays usable.
    ///
    /// Fails with [`ClientError::ExhaustedPagination`] on a terminal page,
    /// every time and without touching the network.
    pub async fn next(&self) -> ClientResult<ResultPage<T>> {
        if !self.has_more() {
            return Err(ClientError::ExhaustedPagination);
        }
        self.successor(self.walk.clone(), self.held_back.clone())
            .await
    }
}

impl<T> Deref for ResultPage<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> IntoIterator for ResultPage<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ResultPage<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
