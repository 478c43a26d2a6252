//! Content source boundary.
//!
//! The engine only ever talks to a source through [`ItemFetcher`]; the
//! feed-backed implementation lives in [`rss_fetcher`].

pub mod error;
pub mod rss_fetcher;

use async_trait::async_trait;
use serde::Serialize;

use crate::feed::error::FetchError;

/// One item as currently retained by a content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    /// Stable identifier of the item within its source.
    pub id: String,
    pub title: String,
    pub link: String,
}

impl FeedItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
        }
    }
}

/// Retrieves the current item list for a subscription's source.
///
/// Implementations return items newest first, the order feeds publish
/// them in. A failing source is reported, never removed: the poll that
/// sees the error simply retries on its next cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    async fn fetch(&self, source_key: &str) -> Result<Vec<FeedItem>, FetchError>;
}
