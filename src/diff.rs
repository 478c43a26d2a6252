//! Decides which fetched items have not been delivered yet.

use crate::feed::FeedItem;

/// Result of comparing a fetch against a subscription's last seen item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDelta {
    /// Undelivered items in chronological order (oldest first), ready for
    /// sequential notification.
    pub fresh: Vec<FeedItem>,
    /// Identifier of the newest fetched item, the cursor to advance to
    /// once `fresh` has been delivered. `None` on an empty fetch.
    pub latest_id: Option<String>,
}

impl FeedDelta {
    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty()
    }
}

/// Scans `fetched` (newest first) and collects every item ahead of
/// `last_seen`.
///
/// Scanning stops at the first item whose id equals `last_seen`: that item
/// and everything older was already delivered. When `last_seen` is absent
/// from the list (first poll, or the cursor fell off the source's retained
/// history) the entire fetch counts as new.
pub fn items_since(fetched: &[FeedItem], last_seen: Option<&str>) -> FeedDelta {
    let mut fresh: Vec<FeedItem> = Vec::new();

    for item in fetched {
        if last_seen == Some(item.id.as_str()) {
            break;
        }
        fresh.push(item.clone());
    }

    fresh.reverse();

    FeedDelta {
        fresh,
        latest_id: fetched.first().map(|item| item.id.clone()),
    }
}
