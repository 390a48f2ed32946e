//! Cursor ("endless") pagination over newest-first data
//!
//! The same cursor contract is applied to three kinds of sources: an
//! in-memory list (usually a cached one), a durable query, and a cached list
//! that may need to fall back to a durable query.

mod cursor;

pub use cursor::{Cursor, CursorParams, TimeWindow};

use crate::domain::Timestamped;
use crate::error::TimelineResult;
use serde::Serialize;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            has_next_page: false,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            has_next_page: self.has_next_page,
        }
    }
}

/// Outcome of paginating a bounded cached list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedPage<T> {
    /// The cached list answers the request
    Complete(Page<T>),
    /// The list is at its cap and cannot prove there is nothing older
    Insufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page_size: usize,
    max_page_size: usize,
}

impl Paginator {
    pub const DEFAULT_PAGE_SIZE: usize = 20;
    pub const DEFAULT_MAX_PAGE_SIZE: usize = 20;

    pub fn new(page_size: usize, max_page_size: usize) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            page_size: page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    /// Apply a client-requested size; it is clamped, never honored past the max
    pub fn with_requested_size(&self, requested: Option<usize>) -> Self {
        match requested {
            Some(size) => Self::new(size, self.max_page_size),
            None => *self,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn paginate_ordered_list<T>(&self, list: &[T], cursor: Cursor) -> Page<T>
    where
        T: Timestamped + Clone,
    {
        let start = match cursor {
            Cursor::After(ts) => {
                let results = list
                    .iter()
                    .take_while(|item| item.created_at() > ts)
                    .cloned()
                    .collect();
                return Page {
                    results,
                    has_next_page: false,
                };
            }
            Cursor::Before(ts) => match list.iter().position(|item| item.created_at() < ts) {
                Some(index) => index,
                None => return Page::empty(),
            },
            Cursor::Newest => 0,
        };

        let end = (start + self.page_size).min(list.len());
        Page {
            results: list[start..end].to_vec(),
            has_next_page: list.len() > start + self.page_size,
        }
    }

    /// Run a durable query for one page.
    ///
    /// `fetch(window, limit)` must return rows newest first. Older-than and
    /// newest pages ask for one extra row to learn whether another page
    /// exists; newer-than asks for everything.
    pub async fn paginate_query<T, F, Fut>(&self, cursor: Cursor, fetch: F) -> TimelineResult<Page<T>>
    where
        F: FnOnce(TimeWindow, Option<usize>) -> Fut,
        Fut: Future<Output = TimelineResult<Vec<T>>>,
    {
        if let Cursor::After(_) = cursor {
            let results = fetch(cursor.window(), None).await?;
            return Ok(Page {
                results,
                has_next_page: false,
            });
        }

        let mut results = fetch(cursor.window(), Some(self.page_size + 1)).await?;
        let has_next_page = results.len() > self.page_size;
        results.truncate(self.page_size);
        Ok(Page {
            results,
            has_next_page,
        })
    }

    /// Paginate a cached list holding at most `list_cap` items
    pub fn paginate_cached_list<T>(&self, cached: &[T], cursor: Cursor, list_cap: usize) -> CachedPage<T>
    where
        T: Timestamped + Clone,
    {
        let page = self.paginate_ordered_list(cached, cursor);
        if matches!(cursor, Cursor::After(_)) || page.has_next_page || cached.len() < list_cap {
            return CachedPage::Complete(page);
        }
        CachedPage::Insufficient
    }

    /// Serve from the cached list when it is conclusive, else re-run the same
    /// cursor against the durable store
    pub async fn paginate_cached_or_query<T, F, Fut>(
        &self,
        cached: &[T],
        cursor: Cursor,
        list_cap: usize,
        fetch: F,
    ) -> TimelineResult<Page<T>>
    where
        T: Timestamped + Clone,
        F: FnOnce(TimeWindow, Option<usize>) -> Fut,
        Fut: Future<Output = TimelineResult<Vec<T>>>,
    {
        match self.paginate_cached_list(cached, cursor, list_cap) {
            CachedPage::Complete(page) => Ok(page),
            CachedPage::Insufficient => {
                tracing::debug!(cached = cached.len(), "Cached list inconclusive, querying durable store");
                self.paginate_query(cursor, fetch).await
            }
        }
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_SIZE, Self::DEFAULT_MAX_PAGE_SIZE)
    }
}
