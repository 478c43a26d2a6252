//! Per-subscription poll timers.
//!
//! One spawned task per subscription, so a slow source stalls only its own
//! cadence. A task never caches the record it polls for: each fire
//! re-resolves through the store, and a fire that finds nothing to poll
//! exits without rearming.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::debug;
use log::info;
use tokio::time::sleep;

use crate::entity::RecipientId;
use crate::entity::Schedule;
use crate::entity::Subscription;
use crate::service::subscription_service::PollOutcome;
use crate::service::subscription_service::SubscriptionService;
use crate::store::SubscriptionStore;

/// Arms and rearms the timers that drive [`SubscriptionService::poll`].
pub struct PollScheduler {
    service: Arc<SubscriptionService>,
    store: Arc<SubscriptionStore>,
    stagger_step: Duration,
}

impl PollScheduler {
    pub fn new(
        service: Arc<SubscriptionService>,
        store: Arc<SubscriptionStore>,
        stagger_step: Duration,
    ) -> Arc<Self> {
        info!("Initializing PollScheduler with stagger step {stagger_step:?}");
        Arc::new(Self {
            service,
            store,
            stagger_step,
        })
    }

    /// Arms one timer per persisted subscription.
    ///
    /// Interval subscriptions get their first fire offset by one stagger
    /// step each, so a restart does not hammer every source at the same
    /// instant. Daily subscriptions fire at their configured hour
    /// regardless of start order.
    pub async fn start(self: &Arc<Self>) -> usize {
        let registrations = self.store.registrations().await;
        let count = registrations.len();
        let mut stagger = Duration::ZERO;

        for (recipient, subscription) in registrations {
            let initial = match subscription.schedule {
                Schedule::Every(_) => {
                    let delay = stagger;
                    stagger += self.stagger_step;
                    delay
                }
                Schedule::Daily { hour } => until_next_daily(hour),
            };
            self.arm(recipient, subscription, initial);
        }

        info!("Armed {count} poll timer(s).");
        count
    }

    /// Arms the timer for a subscription created at runtime: first fire one
    /// full interval from now, or at the next occurrence of the daily hour.
    pub fn register(self: &Arc<Self>, recipient: RecipientId, subscription: &Subscription) {
        let initial = match subscription.schedule {
            Schedule::Every(interval) => interval.duration(),
            Schedule::Daily { hour } => until_next_daily(hour),
        };
        self.arm(recipient, subscription.clone(), initial);
    }

    fn arm(self: &Arc<Self>, recipient: RecipientId, subscription: Subscription, initial: Duration) {
        let scheduler = self.clone();
        let schedule = subscription.schedule;
        let source_key = subscription.source_key;
        let id = subscription.id;
        debug!("Arming timer for `{source_key}` ({recipient}), first fire in {initial:?}.");

        tokio::spawn(async move {
            let mut delay = initial;
            loop {
                sleep(delay).await;
                let outcome = scheduler.service.poll(recipient, &source_key, id).await;
                if outcome == PollOutcome::Cancelled {
                    break;
                }
                // Rearm from "now of this fire", so a slow fetch delays at
                // most its own next fire and the drift never compounds. The
                // daily case instead re-anchors to the fixed hour.
                delay = match schedule {
                    Schedule::Every(interval) => interval.duration(),
                    Schedule::Daily { hour } => until_next_daily(hour),
                };
            }
        });
    }
}

/// Duration until the next occurrence of `hour:00:00` process-local time:
/// today if not yet passed, else tomorrow.
fn until_next_daily(hour: u8) -> Duration {
    let now = chrono::Local::now().naive_local();
    (next_daily_occurrence(now, hour) - now)
        .to_std()
        .unwrap_or_default()
}

fn next_daily_occurrence(now: NaiveDateTime, hour: u8) -> NaiveDateTime {
    let mut target = now
        .date()
        .and_hms_opt(u32::from(hour), 0, 0)
        .expect("hour is validated to 0..=23");
    if target <= now {
        target += chrono::Duration::days(1);
    }
    target
}
