//! Persistence boundary of the alerting engine.
//!
//! Every mutation of a subscription goes through [`SubscriptionStore`]; callers never
//! write subscription fields themselves.

mod in_memory;
mod postgres;

pub use in_memory::InMemorySubscriptionStore;
pub use postgres::PgSubscriptionStore;

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    ChannelType, EligibleSubscription, Subscriber, Subscription, SubscriptionStats, Zone,
};

/// Minimum elapsed time between two alerts to the same subscription.
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60 * 60);

#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active subscriptions whose last alert is at least the store's frequency old,
    /// loaded with their subscriber and zone. No ordering is guaranteed.
    async fn eligible_for_sending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EligibleSubscription>, StoreError>;

    /// Points the subscriber at `zone_id`, disabling any other active subscription.
    /// Returns `false` when the subscriber was already actively subscribed to that zone.
    async fn subscribe(
        &self,
        subscriber_id: Uuid,
        zone_id: Uuid,
        current_pm25: Option<f64>,
    ) -> Result<(Subscription, bool), StoreError>;

    async fn unsubscribe(&self, subscriber_id: Uuid) -> Result<(), StoreError>;

    async fn record_alert_sent(
        &self,
        subscription_id: Uuid,
        new_pm25: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Used when the provider says the recipient can never be reached again.
    async fn disable_permanently(&self, subscription_id: Uuid) -> Result<(), StoreError>;

    async fn get_or_create_subscriber(
        &self,
        identifier: &str,
        channel: ChannelType,
    ) -> Result<(Subscriber, bool), StoreError>;

    async fn find_subscriber(
        &self,
        identifier: &str,
        channel: ChannelType,
    ) -> Result<Option<Subscriber>, StoreError>;

    async fn active_subscription(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn get_zone(&self, zone_id: Uuid) -> Result<Option<Zone>, StoreError>;

    /// Counters over phone subscribers.
    async fn stats(&self) -> Result<SubscriptionStats, StoreError>;
}

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("Failed to execute a subscription store query.")]
    Database(#[from] sqlx::Error),
    #[error("Zone {0} does not exist.")]
    UnknownZone(Uuid),
    #[error("Subscriber {0} does not exist.")]
    UnknownSubscriber(Uuid),
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(err) => write!(f, "{}\nCaused by:\n\t{}", self, err),
            _ => write!(f, "{}", self),
        }
    }
}

pub(crate) fn frequency_cutoff(now: DateTime<Utc>, frequency: Duration) -> i64 {
    now.timestamp() - frequency.as_secs() as i64
}
