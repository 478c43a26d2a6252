//! Subscription management and the per-fire poll pipeline.

use std::sync::Arc;

use log::debug;
use log::error;
use log::info;
use log::warn;
use uuid::Uuid;

use crate::diff;
use crate::entity::RecipientId;
use crate::entity::Schedule;
use crate::entity::Subscription;
use crate::feed::ItemFetcher;
use crate::notify::Notifier;
use crate::service::error::ServiceError;
use crate::store::SubscriptionStore;
use crate::store::codec::FIELD_DELIMITER;

/// The operations a chat front-end drives, plus [`Self::poll`], the entry
/// point each timer fire runs.
pub struct SubscriptionService {
    store: Arc<SubscriptionStore>,
    fetcher: Arc<dyn ItemFetcher>,
    notifier: Arc<dyn Notifier>,
}

pub enum SubscribeResult {
    /// Persisted; the caller still has to arm its timer.
    Created { subscription: Subscription },
    /// The recipient already follows this source key.
    AlreadyExists,
    /// The source did not answer with a usable document; nothing persisted.
    SourceUnreachable { reason: String },
}

pub enum UnsubscribeResult {
    Removed {
        subscription: Subscription,
        remaining: usize,
    },
    NotFound,
}

/// What one timer fire amounted to. Every failure mode maps to an outcome
/// rather than an error: one subscription's trouble must never disturb
/// another subscription's schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The subscription is gone (or was replaced); the timer must not
    /// rearm.
    Cancelled,
    NoNewItems,
    Notified { delivered: usize },
    /// Fetch failed; nothing changed, the next cycle retries.
    FetchDeferred,
    /// Delivery failed; the cursor stays put so the next cycle re-fetches
    /// and re-attempts the same items.
    NotifyDeferred,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<SubscriptionStore>,
        fetcher: Arc<dyn ItemFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
        }
    }

    /// Registers a new recurring check. The source must answer before
    /// anything is persisted; an unreachable or garbled source rejects the
    /// subscription instead of creating one that can never deliver.
    pub async fn subscribe(
        &self,
        recipient: RecipientId,
        display_name: &str,
        source_key: &str,
        schedule: Schedule,
    ) -> Result<SubscribeResult, ServiceError> {
        if let Schedule::Daily { hour } = schedule
            && hour > 23
        {
            return Err(ServiceError::InvalidHour { hour });
        }
        if source_key.is_empty() {
            return Err(ServiceError::EmptyField {
                field: "source key",
            });
        }
        for (field, value) in [("display name", display_name), ("source key", source_key)] {
            if value.contains(FIELD_DELIMITER) {
                return Err(ServiceError::ReservedDelimiter { field });
            }
        }

        // Cheap duplicate check before touching the network.
        if self
            .store
            .list(recipient)
            .await
            .iter()
            .any(|s| s.source_key == source_key)
        {
            return Ok(SubscribeResult::AlreadyExists);
        }

        if let Err(e) = self.fetcher.fetch(source_key).await {
            info!("Rejecting subscription to `{source_key}`: {e}");
            return Ok(SubscribeResult::SourceUnreachable {
                reason: e.to_string(),
            });
        }

        let subscription = Subscription::new(display_name, source_key, schedule);
        if !self.store.add(recipient, subscription.clone()).await {
            // Lost a race with a concurrent subscribe for the same source.
            return Ok(SubscribeResult::AlreadyExists);
        }
        self.persist(recipient).await;

        info!(
            "Registered `{display_name}` ({}) for recipient {recipient}.",
            subscription.schedule.describe()
        );
        Ok(SubscribeResult::Created { subscription })
    }

    /// The recipient's subscriptions, in the order listings show them.
    pub async fn list(&self, recipient: RecipientId) -> Vec<Subscription> {
        self.store.list(recipient).await
    }

    /// Removes by position in the listing, bounds `[0, len)`.
    pub async fn unsubscribe(
        &self,
        recipient: RecipientId,
        index: usize,
    ) -> UnsubscribeResult {
        match self.store.remove(recipient, index).await {
            Some(subscription) => {
                self.persist(recipient).await;
                let remaining = self.store.list(recipient).await.len();
                info!(
                    "Removed `{}` for recipient {recipient} ({remaining} remaining).",
                    subscription.display_name
                );
                UnsubscribeResult::Removed {
                    subscription,
                    remaining,
                }
            }
            None => UnsubscribeResult::NotFound,
        }
    }

    /// One timer fire for one subscription.
    ///
    /// Re-resolves the record through the store first: a timer must never
    /// act on a snapshot, because the subscription may have been removed
    /// (do not rearm) or just polled (read the latest cursor).
    pub async fn poll(
        &self,
        recipient: RecipientId,
        source_key: &str,
        id: Uuid,
    ) -> PollOutcome {
        let Some(subscription) = self.store.find(recipient, source_key, id).await else {
            info!("Subscription `{source_key}` for {recipient} is gone; cancelling its timer.");
            return PollOutcome::Cancelled;
        };

        debug!(
            "Checking `{}` for recipient {recipient}.",
            subscription.display_name
        );
        let fetched = match self.fetcher.fetch(source_key).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Fetch for `{source_key}` failed, deferring to next cycle: {e}");
                return PollOutcome::FetchDeferred;
            }
        };

        let delta = diff::items_since(&fetched, subscription.last_seen_id.as_deref());
        let Some(latest) = delta.latest_id else {
            debug!("`{}` returned an empty document.", subscription.display_name);
            return PollOutcome::NoNewItems;
        };
        if delta.fresh.is_empty() {
            debug!("No new items for `{}`.", subscription.display_name);
            return PollOutcome::NoNewItems;
        }

        let delivered = delta.fresh.len();
        if let Err(e) = self.notifier.notify(recipient, &delta.fresh).await {
            warn!(
                "Delivery for `{source_key}` failed, cursor kept at {:?}: {e}",
                subscription.last_seen_id
            );
            return PollOutcome::NotifyDeferred;
        }

        if self
            .store
            .advance_last_seen(recipient, source_key, id, &latest)
            .await
        {
            self.persist(recipient).await;
        }
        info!(
            "Delivered {delivered} new item(s) from `{}` to {recipient}.",
            subscription.display_name
        );
        PollOutcome::Notified { delivered }
    }

    async fn persist(&self, recipient: RecipientId) {
        if let Err(e) = self.store.save_recipient(recipient).await {
            error!("Failed to persist subscriptions for {recipient}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::entity::PollInterval;
    use crate::feed::FeedItem;
    use crate::feed::MockItemFetcher;
    use crate::feed::error::FetchError;
    use crate::notify::MockNotifier;
    use crate::notify::error::NotifyError;

    const FEED_A: &str = "https://example.com/feedA.xml";

    fn temp_dir() -> PathBuf {
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        PathBuf::from(format!("/tmp/herald-bot-service-test-{t}"))
    }

    fn items(ids: &[&str]) -> Vec<FeedItem> {
        ids.iter()
            .map(|id| FeedItem::new(*id, format!("title {id}"), format!("https://e/{id}")))
            .collect()
    }

    /// Notifier double that records each delivered batch as a list of ids.
    fn recording_notifier() -> (MockNotifier, Arc<Mutex<Vec<Vec<String>>>>) {
        let delivered: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(move |_, batch| {
            sink.lock()
                .unwrap()
                .push(batch.iter().map(|i| i.id.clone()).collect());
            Ok(())
        });
        (notifier, delivered)
    }

    fn service(
        dir: &PathBuf,
        fetcher: MockItemFetcher,
        notifier: MockNotifier,
    ) -> SubscriptionService {
        let store = Arc::new(SubscriptionStore::load(dir).unwrap());
        SubscriptionService::new(store, Arc::new(fetcher), Arc::new(notifier))
    }

    async fn subscribed(service: &SubscriptionService, recipient: RecipientId) -> Subscription {
        match service
            .subscribe(
                recipient,
                "Feed A",
                FEED_A,
                Schedule::Every(PollInterval::FiveMinutes),
            )
            .await
            .unwrap()
        {
            SubscribeResult::Created { subscription } => subscription,
            _ => panic!("expected Created"),
        }
    }

    #[tokio::test]
    async fn test_poll_sequence_delivers_only_unseen_items_in_order() {
        let dir = temp_dir();

        let mut fetcher = MockItemFetcher::new();
        let mut seq = mockall::Sequence::new();
        for fetched in [
            items(&[]),             // subscribe-time validation
            items(&["c", "b", "a"]),
            items(&["e", "d", "c"]),
            items(&["e", "d", "c"]),
        ] {
            fetcher
                .expect_fetch()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(fetched.clone()));
        }
        let (notifier, delivered) = recording_notifier();

        let service = service(&dir, fetcher, notifier);
        let sub = subscribed(&service, 42).await;

        assert_eq!(
            service.poll(42, FEED_A, sub.id).await,
            PollOutcome::Notified { delivered: 3 }
        );
        assert_eq!(
            service.list(42).await[0].last_seen_id.as_deref(),
            Some("c")
        );

        assert_eq!(
            service.poll(42, FEED_A, sub.id).await,
            PollOutcome::Notified { delivered: 2 }
        );
        assert_eq!(
            service.list(42).await[0].last_seen_id.as_deref(),
            Some("e")
        );

        // Unchanged fetch: nothing delivered, cursor untouched.
        assert_eq!(service.poll(42, FEED_A, sub.id).await, PollOutcome::NoNewItems);
        assert_eq!(
            service.list(42).await[0].last_seen_id.as_deref(),
            Some("e")
        );

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["d".to_string(), "e".to_string()],
            ]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unreachable_source() {
        let dir = temp_dir();

        let mut fetcher = MockItemFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|key| Err(FetchError::unreachable(key, "HTTP 404")));

        let service = service(&dir, fetcher, MockNotifier::new());
        let result = service
            .subscribe(42, "Feed A", FEED_A, Schedule::Every(PollInterval::TwoMinutes))
            .await
            .unwrap();

        assert!(matches!(result, SubscribeResult::SourceUnreachable { .. }));
        assert!(service.list(42).await.is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_duplicate_source_key_skips_the_network() {
        let dir = temp_dir();

        let mut fetcher = MockItemFetcher::new();
        // Only the first subscribe may validate against the source.
        fetcher.expect_fetch().times(1).returning(|_| Ok(vec![]));

        let service = service(&dir, fetcher, MockNotifier::new());
        subscribed(&service, 42).await;

        let result = service
            .subscribe(42, "Same feed", FEED_A, Schedule::Every(PollInterval::OneHour))
            .await
            .unwrap();
        assert!(matches!(result, SubscribeResult::AlreadyExists));
        assert_eq!(service.list(42).await.len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_validation_errors() {
        let dir = temp_dir();
        let service = service(&dir, MockItemFetcher::new(), MockNotifier::new());

        let err = service
            .subscribe(42, "Digest", "https://e/d", Schedule::Daily { hour: 24 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidHour { hour: 24 }));

        let err = service
            .subscribe(42, "Bad||name", FEED_A, Schedule::Daily { hour: 8 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ReservedDelimiter { .. }));

        let err = service
            .subscribe(42, "No source", "", Schedule::Daily { hour: 8 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmptyField { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_then_inflight_poll_cancels() {
        let dir = temp_dir();

        let mut fetcher = MockItemFetcher::new();
        // Subscribe-time validation only; the cancelled poll must not fetch.
        fetcher.expect_fetch().times(1).returning(|_| Ok(vec![]));

        let service = service(&dir, fetcher, MockNotifier::new());
        let sub = subscribed(&service, 42).await;

        match service.unsubscribe(42, 0).await {
            UnsubscribeResult::Removed { remaining, .. } => assert_eq!(remaining, 0),
            UnsubscribeResult::NotFound => panic!("expected Removed"),
        }
        assert!(service.list(42).await.is_empty());
        assert!(matches!(
            service.unsubscribe(42, 0).await,
            UnsubscribeResult::NotFound
        ));

        // The timer armed before the removal fires once more in flight.
        assert_eq!(service.poll(42, FEED_A, sub.id).await, PollOutcome::Cancelled);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_cursor_and_replays_next_poll() {
        let dir = temp_dir();

        let mut fetcher = MockItemFetcher::new();
        let mut seq = mockall::Sequence::new();
        for fetched in [items(&[]), items(&["b", "a"]), items(&["b", "a"])] {
            fetcher
                .expect_fetch()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(fetched.clone()));
        }

        let delivered: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let mut notifier = MockNotifier::new();
        let mut seq = mockall::Sequence::new();
        notifier
            .expect_notify()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|recipient, _| Err(NotifyError::delivery(recipient, "transport down")));
        notifier
            .expect_notify()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, batch| {
                sink.lock()
                    .unwrap()
                    .push(batch.iter().map(|i| i.id.clone()).collect());
                Ok(())
            });

        let service = service(&dir, fetcher, notifier);
        let sub = subscribed(&service, 42).await;

        assert_eq!(service.poll(42, FEED_A, sub.id).await, PollOutcome::NotifyDeferred);
        assert_eq!(service.list(42).await[0].last_seen_id, None);

        // Unchanged fetch on the next cycle reproduces the same batch.
        assert_eq!(
            service.poll(42, FEED_A, sub.id).await,
            PollOutcome::Notified { delivered: 2 }
        );
        assert_eq!(*delivered.lock().unwrap(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(service.list(42).await[0].last_seen_id.as_deref(), Some("b"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_fetch_defers_without_touching_state() {
        let dir = temp_dir();

        let mut fetcher = MockItemFetcher::new();
        let mut seq = mockall::Sequence::new();
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|key| Err(FetchError::malformed(key, "not xml")));

        let service = service(&dir, fetcher, MockNotifier::new());
        let sub = subscribed(&service, 42).await;

        assert_eq!(service.poll(42, FEED_A, sub.id).await, PollOutcome::FetchDeferred);
        // Still subscribed, still undelivered; the next cycle retries.
        assert_eq!(service.list(42).await.len(), 1);
        assert_eq!(service.list(42).await[0].last_seen_id, None);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
