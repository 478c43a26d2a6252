//! Feed-backed [`ItemFetcher`] implementation.

use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::Quota;
use governor::RateLimiter;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use log::debug;
use log::info;
use wreq::Client;
use wreq::header::HeaderMap;
use wreq::header::HeaderValue;
use wreq::header::USER_AGENT;

use crate::feed::FeedItem;
use crate::feed::ItemFetcher;
use crate::feed::error::FetchError;

/// Fetches RSS/Atom documents over HTTP and maps their entries to
/// [`FeedItem`]s in document order (newest first, as feeds publish them).
pub struct RssFetcher {
    client: Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
}

impl RssFetcher {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("herald-bot/0.1"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to create client");

        // Many subscriptions can share one host; stay polite to it.
        let limiter = RateLimiter::direct(Quota::per_second(NonZeroU32::new(4).unwrap()));

        Self { client, limiter }
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        if self.limiter.check().is_err() {
            info!("Feed requests are ratelimited. Waiting...");
        }
        self.limiter.until_ready().await;

        debug!("Making request to: {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::unreachable(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::unreachable(url, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::unreachable(url, e))
    }
}

#[async_trait]
impl ItemFetcher for RssFetcher {
    async fn fetch(&self, source_key: &str) -> Result<Vec<FeedItem>, FetchError> {
        let body = self.download(source_key).await?;

        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| FetchError::malformed(source_key, e))?;

        let items = feed
            .entries
            .into_iter()
            .map(|entry| FeedItem {
                id: entry.id,
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(items)
    }
}
