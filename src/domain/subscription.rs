use uuid::Uuid;

use crate::domain::subscriber::Subscriber;
use crate::domain::zone::Zone;

/// Link between a subscriber and a zone.
///
/// Timestamps are unix seconds and `0` stands for "never": a subscription with
/// `disabled_at == 0` is active, one with `last_alert_sent_at == 0` never fired.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub zone_id: Uuid,
    pub last_pm25: Option<f64>,
    pub last_alert_sent_at: i64,
    pub disabled_at: i64,
    pub num_alerts_sent: i32,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.disabled_at == 0
    }
}

/// An active subscription loaded together with everything a sweep needs to process
/// it, so no further lookups happen per item.
#[derive(Debug, Clone)]
pub struct EligibleSubscription {
    pub subscription: Subscription,
    pub subscriber: Subscriber,
    pub zone: Zone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SubscriptionStats {
    pub active_subscriptions: i64,
    pub total_alerts_sent: i64,
}
