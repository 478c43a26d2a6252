//! Durable mapping of recipient to subscription list.
//!
//! One flat file per recipient under the data directory, so a crash while
//! rewriting one recipient cannot corrupt another. All in-memory access
//! goes through a single [`tokio::sync::RwLock`]; the lock is never held
//! across fetch or notify I/O.

pub mod codec;
pub mod error;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entity::RecipientId;
use crate::entity::Subscription;
use crate::store::error::StoreError;

const FILE_EXTENSION: &str = "subs";

/// Owner of every [`Subscription`] record. Timers hold only
/// `(recipient, source_key, id)` and re-resolve through [`Self::find`] at
/// fire time.
pub struct SubscriptionStore {
    data_dir: PathBuf,
    inner: RwLock<HashMap<RecipientId, Vec<Subscription>>>,
}

impl SubscriptionStore {
    /// Loads every persisted recipient file from `data_dir`, creating the
    /// directory on first run.
    ///
    /// A single malformed record fails the whole load with a descriptive
    /// error; there is no partial load. The caller decides whether that
    /// aborts startup.
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).map_err(|e| StoreError::io(&data_dir, e))?;
        }

        let mut map: HashMap<RecipientId, Vec<Subscription>> = HashMap::new();
        let dir = fs::read_dir(&data_dir).map_err(|e| StoreError::io(&data_dir, e))?;

        for entry in dir {
            let entry = entry.map_err(|e| StoreError::io(&data_dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }

            let recipient: RecipientId = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse().ok())
                .ok_or_else(|| StoreError::InvalidFileName {
                    path: path.display().to_string(),
                })?;

            let contents = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            let mut subscriptions: Vec<Subscription> = Vec::new();

            for (idx, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record = codec::parse_line(line).map_err(|reason| {
                    StoreError::MalformedRecord {
                        path: path.display().to_string(),
                        line: idx + 1,
                        reason,
                    }
                })?;
                if subscriptions
                    .iter()
                    .any(|s| s.source_key == record.source_key)
                {
                    return Err(StoreError::MalformedRecord {
                        path: path.display().to_string(),
                        line: idx + 1,
                        reason: format!("duplicate source key `{}`", record.source_key),
                    });
                }
                subscriptions.push(record);
            }

            if !subscriptions.is_empty() {
                map.insert(recipient, subscriptions);
            }
        }

        let total: usize = map.values().map(Vec::len).sum();
        info!(
            "Loaded {} subscription(s) across {} recipient(s).",
            total,
            map.len()
        );

        Ok(Self {
            data_dir,
            inner: RwLock::new(map),
        })
    }

    /// Inserts a subscription for `recipient`. Returns false (and changes
    /// nothing) if the recipient already follows that source key.
    pub async fn add(&self, recipient: RecipientId, subscription: Subscription) -> bool {
        let mut map = self.inner.write().await;
        let list = map.entry(recipient).or_default();
        if list
            .iter()
            .any(|s| s.source_key == subscription.source_key)
        {
            return false;
        }
        list.push(subscription);
        true
    }

    /// Removes by position in the recipient's list, bounds `[0, len)`.
    pub async fn remove(&self, recipient: RecipientId, index: usize) -> Option<Subscription> {
        let mut map = self.inner.write().await;
        let list = map.get_mut(&recipient)?;
        if index >= list.len() {
            return None;
        }
        let removed = list.remove(index);
        if list.is_empty() {
            map.remove(&recipient);
        }
        Some(removed)
    }

    /// The recipient's subscriptions in listing order.
    pub async fn list(&self, recipient: RecipientId) -> Vec<Subscription> {
        self.inner
            .read()
            .await
            .get(&recipient)
            .cloned()
            .unwrap_or_default()
    }

    /// Resolves the live record a timer points at, if it still exists.
    ///
    /// The `id` check keeps a timer armed before a remove-and-readd from
    /// adopting the replacement record.
    pub async fn find(
        &self,
        recipient: RecipientId,
        source_key: &str,
        id: Uuid,
    ) -> Option<Subscription> {
        self.inner
            .read()
            .await
            .get(&recipient)?
            .iter()
            .find(|s| s.source_key == source_key && s.id == id)
            .cloned()
    }

    /// Advances the last-seen cursor in place after a successful delivery.
    ///
    /// A subscription that vanished (or was replaced) while its poll was in
    /// flight is an expected race: logged, nothing propagated.
    pub async fn advance_last_seen(
        &self,
        recipient: RecipientId,
        source_key: &str,
        id: Uuid,
        latest: &str,
    ) -> bool {
        let mut map = self.inner.write().await;
        let record = map
            .get_mut(&recipient)
            .and_then(|list| list.iter_mut().find(|s| s.source_key == source_key && s.id == id));

        match record {
            Some(subscription) => {
                debug!(
                    "Cursor for `{source_key}` ({recipient}): {:?} -> {latest}",
                    subscription.last_seen_id
                );
                subscription.last_seen_id = Some(latest.to_string());
                true
            }
            None => {
                warn!(
                    "Subscription `{source_key}` for {recipient} disappeared mid-poll; cursor not advanced."
                );
                false
            }
        }
    }

    /// Every `(recipient, subscription)` pair, for arming timers at startup.
    pub async fn registrations(&self) -> Vec<(RecipientId, Subscription)> {
        self.inner
            .read()
            .await
            .iter()
            .flat_map(|(recipient, subs)| subs.iter().map(|s| (*recipient, s.clone())))
            .collect()
    }

    /// Rewrites one recipient's file: write a temp file, then rename over
    /// the target, so a crash mid-write leaves the previous snapshot
    /// intact. A recipient whose list emptied gets the file removed.
    pub async fn save_recipient(&self, recipient: RecipientId) -> Result<(), StoreError> {
        let map = self.inner.read().await;
        let path = self.recipient_path(recipient);

        match map.get(&recipient) {
            Some(subscriptions) if !subscriptions.is_empty() => {
                let body = subscriptions
                    .iter()
                    .map(codec::encode_line)
                    .collect::<Vec<_>>()
                    .join("\n");

                let tmp = path.with_extension("subs.tmp");
                fs::write(&tmp, body).map_err(|e| StoreError::io(&tmp, e))?;
                fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
                debug!("Saved subscriptions for {recipient}.");
            }
            _ => {
                if path.exists() {
                    fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
                    debug!("Removed emptied subscription file for {recipient}.");
                }
            }
        }
        Ok(())
    }

    /// Flushes every recipient with subscriptions. Failures are logged per
    /// recipient and do not stop the remaining flushes; the next flush
    /// opportunity retries.
    pub async fn save_all(&self) {
        let recipients: Vec<RecipientId> = self.inner.read().await.keys().copied().collect();
        for recipient in recipients {
            if let Err(e) = self.save_recipient(recipient).await {
                error!("Failed to persist subscriptions for {recipient}: {e}");
            }
        }
    }

    fn recipient_path(&self, recipient: RecipientId) -> PathBuf {
        self.data_dir.join(format!("{recipient}.{FILE_EXTENSION}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PollInterval;
    use crate::entity::Schedule;

    fn temp_dir() -> PathBuf {
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        PathBuf::from(format!("/tmp/herald-bot-test-{t}"))
    }

    fn subscription(name: &str, key: &str) -> Subscription {
        Subscription::new(name, key, Schedule::Every(PollInterval::FiveMinutes))
    }

    #[tokio::test]
    async fn test_save_then_load_reproduces_the_mapping() {
        let dir = temp_dir();
        let store = SubscriptionStore::load(&dir).unwrap();

        assert!(store.add(42, subscription("A", "https://e/a.xml")).await);
        assert!(store.add(42, subscription("B", "https://e/b.xml")).await);
        assert!(
            store
                .add(
                    7,
                    Subscription::new("Digest", "https://e/digest", Schedule::Daily { hour: 8 }),
                )
                .await
        );

        let id = store.list(42).await[0].id;
        store
            .advance_last_seen(42, "https://e/a.xml", id, "post-3")
            .await;
        store.save_all().await;

        let reloaded = SubscriptionStore::load(&dir).unwrap();
        let subs = reloaded.list(42).await;
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].display_name, "A");
        assert_eq!(subs[0].last_seen_id.as_deref(), Some("post-3"));
        assert_eq!(subs[1].last_seen_id, None);

        let daily = reloaded.list(7).await;
        assert_eq!(daily[0].schedule, Schedule::Daily { hour: 8 });

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_source_key_is_a_no_op() {
        let dir = temp_dir();
        let store = SubscriptionStore::load(&dir).unwrap();

        assert!(store.add(42, subscription("A", "https://e/a.xml")).await);
        assert!(!store.add(42, subscription("A again", "https://e/a.xml")).await);
        assert_eq!(store.list(42).await.len(), 1);

        // Same source key under another recipient is independent.
        assert!(store.add(43, subscription("A", "https://e/a.xml")).await);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_remove_by_index_and_bounds() {
        let dir = temp_dir();
        let store = SubscriptionStore::load(&dir).unwrap();

        store.add(42, subscription("A", "https://e/a.xml")).await;
        store.add(42, subscription("B", "https://e/b.xml")).await;

        assert!(store.remove(42, 2).await.is_none());
        assert!(store.remove(99, 0).await.is_none());

        let removed = store.remove(42, 0).await.unwrap();
        assert_eq!(removed.display_name, "A");
        assert_eq!(store.list(42).await[0].display_name, "B");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_emptied_recipient_file_is_removed_on_save() {
        let dir = temp_dir();
        let store = SubscriptionStore::load(&dir).unwrap();

        store.add(42, subscription("A", "https://e/a.xml")).await;
        store.save_recipient(42).await.unwrap();
        assert!(dir.join("42.subs").exists());

        store.remove(42, 0).await.unwrap();
        store.save_recipient(42).await.unwrap();
        assert!(!dir.join("42.subs").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_cursor_advance_after_removal_is_a_logged_no_op() {
        let dir = temp_dir();
        let store = SubscriptionStore::load(&dir).unwrap();

        store.add(42, subscription("A", "https://e/a.xml")).await;
        let id = store.list(42).await[0].id;
        store.remove(42, 0).await.unwrap();

        assert!(!store.advance_last_seen(42, "https://e/a.xml", id, "post-1").await);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_stale_timer_identity_does_not_adopt_replacement() {
        let dir = temp_dir();
        let store = SubscriptionStore::load(&dir).unwrap();

        store.add(42, subscription("A", "https://e/a.xml")).await;
        let stale_id = store.list(42).await[0].id;

        store.remove(42, 0).await.unwrap();
        store.add(42, subscription("A v2", "https://e/a.xml")).await;

        assert!(store.find(42, "https://e/a.xml", stale_id).await.is_none());
        assert!(
            !store
                .advance_last_seen(42, "https://e/a.xml", stale_id, "post-9")
                .await
        );
        assert_eq!(store.list(42).await[0].last_seen_id, None);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_record_fails_the_whole_load() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("42.subs"),
            "Good||https://e/a.xml||300||\nbad record without fields",
        )
        .unwrap();

        let err = SubscriptionStore::load(&dir).unwrap_err();
        assert!(matches!(err, StoreError::MalformedRecord { line: 2, .. }));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_file_not_named_by_recipient_fails_the_load() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("not-a-recipient.subs"), "A||https://e/a.xml||300||").unwrap();

        let err = SubscriptionStore::load(&dir).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFileName { .. }));

        fs::remove_dir_all(&dir).unwrap();
    }
}
