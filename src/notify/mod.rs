//! Delivery boundary.
//!
//! The engine hands a batch of undelivered items to a [`Notifier`] and
//! advances the subscription's cursor only if delivery reported success.
//! On failure the same items are re-fetched and re-attempted on the next
//! cycle: at-least-once delivery, with a duplicate possible if the
//! transport partially succeeded on its side.

pub mod error;
pub mod webhook_notifier;

use async_trait::async_trait;

use crate::entity::RecipientId;
use crate::feed::FeedItem;
use crate::notify::error::NotifyError;

/// Delivers a batch of items to one recipient, in the given order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: RecipientId,
        items: &[FeedItem],
    ) -> Result<(), NotifyError>;
}
