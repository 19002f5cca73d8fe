use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{frequency_cutoff, StoreError, SubscriptionStore, DEFAULT_FREQUENCY};
use crate::domain::{
    ChannelType, EligibleSubscription, Subscriber, Subscription, SubscriptionStats, Zone,
};

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, subscriber_id, zone_id, last_pm25, last_alert_sent_at, disabled_at, num_alerts_sent
"#;

/// Store backed by Postgres. Each mutation is a single statement or a transaction,
/// so concurrent updates to one subscription are serialised by the database.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    db_pool: PgPool,
    frequency: Duration,
}

impl PgSubscriptionStore {
    pub fn new(db_pool: PgPool, frequency: Duration) -> Self {
        Self { db_pool, frequency }
    }

    pub fn with_default_frequency(db_pool: PgPool) -> Self {
        Self::new(db_pool, DEFAULT_FREQUENCY)
    }
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, sqlx::Error> {
    Ok(Subscription {
        id: row.try_get("id")?,
        subscriber_id: row.try_get("subscriber_id")?,
        zone_id: row.try_get("zone_id")?,
        last_pm25: row.try_get("last_pm25")?,
        last_alert_sent_at: row.try_get("last_alert_sent_at")?,
        disabled_at: row.try_get("disabled_at")?,
        num_alerts_sent: row.try_get("num_alerts_sent")?,
    })
}

fn channel_from_row(row: &PgRow, column: &str) -> Result<ChannelType, sqlx::Error> {
    ChannelType::parse(row.try_get(column)?).map_err(|err| sqlx::Error::Decode(err.into()))
}

fn subscriber_from_row(row: &PgRow) -> Result<Subscriber, sqlx::Error> {
    Ok(Subscriber {
        id: row.try_get("id")?,
        identifier: row.try_get("identifier")?,
        channel: channel_from_row(row, "channel_type")?,
    })
}

fn eligible_from_row(row: PgRow) -> Result<EligibleSubscription, sqlx::Error> {
    let subscription = subscription_from_row(&row)?;
    let subscriber = Subscriber {
        id: subscription.subscriber_id,
        identifier: row.try_get("identifier")?,
        channel: channel_from_row(&row, "channel_type")?,
    };
    let zone = Zone {
        id: subscription.zone_id,
        name: row.try_get("zone_name")?,
        timezone: row.try_get("zone_timezone")?,
        pm25: row.try_get("zone_pm25")?,
    };

    Ok(EligibleSubscription {
        subscription,
        subscriber,
        zone,
    })
}

#[async_trait::async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    #[tracing::instrument(name = "Fetch subscriptions eligible for sending", skip(self))]
    async fn eligible_for_sending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EligibleSubscription>, StoreError> {
        let eligible = sqlx::query(
            r#"
            SELECT s.id, s.subscriber_id, s.zone_id, s.last_pm25, s.last_alert_sent_at,
                   s.disabled_at, s.num_alerts_sent,
                   sub.identifier, sub.channel_type,
                   z.name AS zone_name, z.timezone AS zone_timezone, z.pm25 AS zone_pm25
            FROM subscriptions s
            JOIN subscribers sub ON sub.id = s.subscriber_id
            JOIN zones z ON z.id = s.zone_id
            WHERE s.disabled_at = 0
              AND s.last_alert_sent_at <= $1
            "#,
        )
        .bind(frequency_cutoff(now, self.frequency))
        .try_map(eligible_from_row)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(eligible)
    }

    #[tracing::instrument(name = "Subscribe to a zone", skip(self))]
    async fn subscribe(
        &self,
        subscriber_id: Uuid,
        zone_id: Uuid,
        current_pm25: Option<f64>,
    ) -> Result<(Subscription, bool), StoreError> {
        let mut transaction = self.db_pool.begin().await?;

        // Locking the subscriber serialises concurrent subscribe calls for it.
        let subscriber = sqlx::query("SELECT id FROM subscribers WHERE id = $1 FOR UPDATE")
            .bind(subscriber_id)
            .fetch_optional(&mut transaction)
            .await?;
        if subscriber.is_none() {
            return Err(StoreError::UnknownSubscriber(subscriber_id));
        }

        let zone = sqlx::query("SELECT id FROM zones WHERE id = $1")
            .bind(zone_id)
            .fetch_optional(&mut transaction)
            .await?;
        if zone.is_none() {
            return Err(StoreError::UnknownZone(zone_id));
        }

        let active = fetch_active(&mut transaction, subscriber_id).await?;
        if let Some(active) = active {
            if active.zone_id == zone_id {
                transaction.commit().await?;
                return Ok((active, false));
            }

            sqlx::query("UPDATE subscriptions SET disabled_at = $2 WHERE id = $1")
                .bind(active.id)
                .bind(Utc::now().timestamp())
                .execute(&mut transaction)
                .await?;
        }

        let subscription = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions (id, subscriber_id, zone_id, last_pm25)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subscriber_id, zone_id)
            DO UPDATE SET disabled_at = 0, last_pm25 = EXCLUDED.last_pm25
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(subscriber_id)
        .bind(zone_id)
        .bind(current_pm25)
        .try_map(|row: PgRow| subscription_from_row(&row))
        .fetch_one(&mut transaction)
        .await?;

        transaction.commit().await?;

        Ok((subscription, true))
    }

    #[tracing::instrument(name = "Unsubscribe a subscriber", skip(self))]
    async fn unsubscribe(&self, subscriber_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET disabled_at = $2, last_pm25 = NULL
            WHERE subscriber_id = $1 AND disabled_at = 0
            "#,
        )
        .bind(subscriber_id)
        .bind(Utc::now().timestamp())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Record a sent alert", skip(self))]
    async fn record_alert_sent(
        &self,
        subscription_id: Uuid,
        new_pm25: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET last_pm25 = $2,
                last_alert_sent_at = $3,
                num_alerts_sent = num_alerts_sent + 1
            WHERE id = $1 AND disabled_at = 0
            "#,
        )
        .bind(subscription_id)
        .bind(new_pm25)
        .bind(now.timestamp())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Disable a subscription permanently", skip(self))]
    async fn disable_permanently(&self, subscription_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET disabled_at = $2, last_pm25 = NULL
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(Utc::now().timestamp())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Get or create a subscriber", skip(self, identifier))]
    async fn get_or_create_subscriber(
        &self,
        identifier: &str,
        channel: ChannelType,
    ) -> Result<(Subscriber, bool), StoreError> {
        // `xmax = 0` only holds for freshly inserted rows.
        let row = sqlx::query(
            r#"
            INSERT INTO subscribers (id, identifier, channel_type, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identifier, channel_type)
            DO UPDATE SET identifier = EXCLUDED.identifier
            RETURNING id, identifier, channel_type, (xmax = 0) AS created
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(identifier)
        .bind(channel.as_ref())
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        let subscriber = subscriber_from_row(&row)?;
        let created: bool = row.try_get("created")?;

        Ok((subscriber, created))
    }

    #[tracing::instrument(name = "Find a subscriber", skip(self, identifier))]
    async fn find_subscriber(
        &self,
        identifier: &str,
        channel: ChannelType,
    ) -> Result<Option<Subscriber>, StoreError> {
        let subscriber = sqlx::query(
            r#"
            SELECT id, identifier, channel_type
            FROM subscribers
            WHERE identifier = $1 AND channel_type = $2
            "#,
        )
        .bind(identifier)
        .bind(channel.as_ref())
        .try_map(|row: PgRow| subscriber_from_row(&row))
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(subscriber)
    }

    async fn active_subscription(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        let subscription = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = $1 AND disabled_at = 0",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscriber_id)
        .try_map(|row: PgRow| subscription_from_row(&row))
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(subscription)
    }

    async fn get_zone(&self, zone_id: Uuid) -> Result<Option<Zone>, StoreError> {
        let zone = sqlx::query("SELECT id, name, timezone, pm25 FROM zones WHERE id = $1")
            .bind(zone_id)
            .try_map(|row: PgRow| {
                Ok(Zone {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    timezone: row.try_get("timezone")?,
                    pm25: row.try_get("pm25")?,
                })
            })
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(zone)
    }

    #[tracing::instrument(name = "Compute subscription stats", skip(self))]
    async fn stats(&self) -> Result<SubscriptionStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT (COUNT(*) FILTER (WHERE s.disabled_at = 0))::BIGINT AS active_subscriptions,
                   COALESCE(SUM(s.num_alerts_sent), 0)::BIGINT AS total_alerts_sent
            FROM subscriptions s
            JOIN subscribers sub ON sub.id = s.subscriber_id
            WHERE sub.channel_type = 'phone_number'
            "#,
        )
        .fetch_one(&self.db_pool)
        .await?;

        Ok(SubscriptionStats {
            active_subscriptions: row.try_get("active_subscriptions")?,
            total_alerts_sent: row.try_get("total_alerts_sent")?,
        })
    }
}

async fn fetch_active(
    transaction: &mut Transaction<'_, Postgres>,
    subscriber_id: Uuid,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query(&format!(
        r#"
        SELECT {}
        FROM subscriptions
        WHERE subscriber_id = $1 AND disabled_at = 0
        FOR UPDATE
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(subscriber_id)
    .try_map(|row: PgRow| subscription_from_row(&row))
    .fetch_optional(&mut *transaction)
    .await
}
