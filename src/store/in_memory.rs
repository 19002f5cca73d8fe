use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{frequency_cutoff, StoreError, SubscriptionStore, DEFAULT_FREQUENCY};
use crate::domain::{
    ChannelType, EligibleSubscription, Subscriber, Subscription, SubscriptionStats, Zone,
};

#[derive(Default)]
struct State {
    subscribers: HashMap<Uuid, Subscriber>,
    subscriptions: HashMap<Uuid, Subscription>,
    zones: HashMap<Uuid, Zone>,
}

impl State {
    fn active_of(&self, subscriber_id: Uuid) -> Option<&Subscription> {
        self.subscriptions
            .values()
            .find(|s| s.subscriber_id == subscriber_id && s.is_active())
    }
}

/// Process-local store. All mutations take the same write lock, so updates to one
/// subscription are never interleaved.
pub struct InMemorySubscriptionStore {
    frequency: Duration,
    state: RwLock<State>,
}

impl InMemorySubscriptionStore {
    pub fn new(frequency: Duration) -> Self {
        Self {
            frequency,
            state: RwLock::new(State::default()),
        }
    }

    /// Stands in for the ingestion process, which owns zone readings.
    pub fn upsert_zone(&self, zone: Zone) {
        self.state.write().zones.insert(zone.id, zone);
    }

    pub fn set_zone_pm25(&self, zone_id: Uuid, pm25: f64) {
        if let Some(zone) = self.state.write().zones.get_mut(&zone_id) {
            zone.pm25 = pm25;
        }
    }

    pub fn subscription(&self, subscription_id: Uuid) -> Option<Subscription> {
        self.state.read().subscriptions.get(&subscription_id).cloned()
    }

    pub fn subscriptions_of(&self, subscriber_id: Uuid) -> Vec<Subscription> {
        self.state
            .read()
            .subscriptions
            .values()
            .filter(|s| s.subscriber_id == subscriber_id)
            .cloned()
            .collect()
    }
}

impl Default for InMemorySubscriptionStore {
    fn default() -> Self {
        Self::new(DEFAULT_FREQUENCY)
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn eligible_for_sending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EligibleSubscription>, StoreError> {
        let cutoff = frequency_cutoff(now, self.frequency);
        let state = self.state.read();

        let eligible = state
            .subscriptions
            .values()
            .filter(|s| s.is_active() && s.last_alert_sent_at <= cutoff)
            .filter_map(|s| {
                let subscriber = state.subscribers.get(&s.subscriber_id)?;
                let zone = state.zones.get(&s.zone_id)?;

                Some(EligibleSubscription {
                    subscription: s.clone(),
                    subscriber: subscriber.clone(),
                    zone: zone.clone(),
                })
            })
            .collect();

        Ok(eligible)
    }

    async fn subscribe(
        &self,
        subscriber_id: Uuid,
        zone_id: Uuid,
        current_pm25: Option<f64>,
    ) -> Result<(Subscription, bool), StoreError> {
        let mut state = self.state.write();

        if !state.subscribers.contains_key(&subscriber_id) {
            return Err(StoreError::UnknownSubscriber(subscriber_id));
        }
        if !state.zones.contains_key(&zone_id) {
            return Err(StoreError::UnknownZone(zone_id));
        }

        let active = state.active_of(subscriber_id).cloned();
        if let Some(active) = &active {
            if active.zone_id == zone_id {
                return Ok((active.clone(), false));
            }
        }

        let now = Utc::now().timestamp();
        if let Some(active) = active {
            if let Some(previous) = state.subscriptions.get_mut(&active.id) {
                previous.disabled_at = now;
            }
        }

        let existing_id = state
            .subscriptions
            .values()
            .find(|s| s.subscriber_id == subscriber_id && s.zone_id == zone_id)
            .map(|s| s.id);

        if let Some(existing) = existing_id.and_then(|id| state.subscriptions.get_mut(&id)) {
            existing.disabled_at = 0;
            existing.last_pm25 = current_pm25;
            return Ok((existing.clone(), true));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            subscriber_id,
            zone_id,
            last_pm25: current_pm25,
            last_alert_sent_at: 0,
            disabled_at: 0,
            num_alerts_sent: 0,
        };
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());

        Ok((subscription, true))
    }

    async fn unsubscribe(&self, subscriber_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let now = Utc::now().timestamp();

        if let Some(active) = state
            .subscriptions
            .values_mut()
            .find(|s| s.subscriber_id == subscriber_id && s.is_active())
        {
            active.disabled_at = now;
            active.last_pm25 = None;
        }

        Ok(())
    }

    async fn record_alert_sent(
        &self,
        subscription_id: Uuid,
        new_pm25: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();

        if let Some(subscription) = state
            .subscriptions
            .get_mut(&subscription_id)
            .filter(|s| s.is_active())
        {
            subscription.last_pm25 = Some(new_pm25);
            subscription.last_alert_sent_at = now.timestamp();
            subscription.num_alerts_sent += 1;
        }

        Ok(())
    }

    async fn disable_permanently(&self, subscription_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write();

        if let Some(subscription) = state.subscriptions.get_mut(&subscription_id) {
            subscription.disabled_at = Utc::now().timestamp();
            subscription.last_pm25 = None;
        }

        Ok(())
    }

    async fn get_or_create_subscriber(
        &self,
        identifier: &str,
        channel: ChannelType,
    ) -> Result<(Subscriber, bool), StoreError> {
        let mut state = self.state.write();

        if let Some(subscriber) = state
            .subscribers
            .values()
            .find(|s| s.identifier == identifier && s.channel == channel)
        {
            return Ok((subscriber.clone(), false));
        }

        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            channel,
        };
        state.subscribers.insert(subscriber.id, subscriber.clone());

        Ok((subscriber, true))
    }

    async fn find_subscriber(
        &self,
        identifier: &str,
        channel: ChannelType,
    ) -> Result<Option<Subscriber>, StoreError> {
        let state = self.state.read();

        Ok(state
            .subscribers
            .values()
            .find(|s| s.identifier == identifier && s.channel == channel)
            .cloned())
    }

    async fn active_subscription(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.state.read().active_of(subscriber_id).cloned())
    }

    async fn get_zone(&self, zone_id: Uuid) -> Result<Option<Zone>, StoreError> {
        Ok(self.state.read().zones.get(&zone_id).cloned())
    }

    async fn stats(&self) -> Result<SubscriptionStats, StoreError> {
        let state = self.state.read();
        let phone_subscriptions = state.subscriptions.values().filter(|s| {
            state
                .subscribers
                .get(&s.subscriber_id)
                .map(|subscriber| subscriber.channel.is_phone_number())
                .unwrap_or(false)
        });

        let mut stats = SubscriptionStats {
            active_subscriptions: 0,
            total_alerts_sent: 0,
        };
        for subscription in phone_subscriptions {
            if subscription.is_active() {
                stats.active_subscriptions += 1;
            }
            stats.total_alerts_sent += i64::from(subscription.num_alerts_sent);
        }

        Ok(stats)
    }
}
