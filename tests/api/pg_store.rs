use aqi_alerts::config::get_configuration;
use aqi_alerts::domain::{ChannelType, Zone};
use aqi_alerts::store::{PgSubscriptionStore, StoreError, SubscriptionStore};
use chrono::{Duration, TimeZone, Utc};
use claim::{assert_none, assert_ok};
use sqlx::PgPool;
use uuid::Uuid;

use crate::helpers::configure_db;

async fn spawn_store() -> (PgSubscriptionStore, PgPool) {
    let mut config = get_configuration().expect("Missing configuration file.");
    let db_pool = configure_db(&mut config.database).await;

    (
        PgSubscriptionStore::with_default_frequency(db_pool.clone()),
        db_pool,
    )
}

async fn insert_zone(db_pool: &PgPool, pm25: f64) -> Zone {
    let zone = Zone {
        id: Uuid::new_v4(),
        name: String::from("Oakland 94607"),
        timezone: Some(String::from("America/Los_Angeles")),
        pm25,
    };

    sqlx::query("INSERT INTO zones (id, name, timezone, pm25) VALUES ($1, $2, $3, $4)")
        .bind(zone.id)
        .bind(&zone.name)
        .bind(&zone.timezone)
        .bind(zone.pm25)
        .execute(db_pool)
        .await
        .expect("Failed to insert zone.");

    zone
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn get_or_create_subscriber_is_idempotent() {
    let (store, _) = spawn_store().await;

    let (first, created) = store
        .get_or_create_subscriber("+14155551234", ChannelType::PhoneNumber)
        .await
        .unwrap();
    assert!(created);
    let (second, created) = store
        .get_or_create_subscriber("+14155551234", ChannelType::PhoneNumber)
        .await
        .unwrap();
    assert!(!created);
    let (other_channel, _) = store
        .get_or_create_subscriber("+14155551234", ChannelType::Ip)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_ne!(first.id, other_channel.id);
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn subscribe_switches_zones_and_reactivates() {
    let (store, db_pool) = spawn_store().await;
    let first_zone = insert_zone(&db_pool, 8.0).await;
    let second_zone = insert_zone(&db_pool, 40.0).await;
    let (subscriber, _) = store
        .get_or_create_subscriber("+14155551234", ChannelType::PhoneNumber)
        .await
        .unwrap();

    let (first, changed) = store
        .subscribe(subscriber.id, first_zone.id, Some(8.0))
        .await
        .unwrap();
    assert!(changed);
    let (_, changed) = store
        .subscribe(subscriber.id, first_zone.id, Some(8.0))
        .await
        .unwrap();
    assert!(!changed);

    let (second, changed) = store
        .subscribe(subscriber.id, second_zone.id, Some(40.0))
        .await
        .unwrap();
    assert!(changed);
    let active = store
        .active_subscription(subscriber.id)
        .await
        .unwrap()
        .expect("No active subscription.");
    assert_eq!(active.id, second.id);

    let (reactivated, changed) = store
        .subscribe(subscriber.id, first_zone.id, Some(8.0))
        .await
        .unwrap();
    assert!(changed);
    assert_eq!(reactivated.id, first.id);
    assert!(reactivated.is_active());
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn subscribe_to_unknown_zone_fails() {
    let (store, _) = spawn_store().await;
    let (subscriber, _) = store
        .get_or_create_subscriber("+14155551234", ChannelType::PhoneNumber)
        .await
        .unwrap();

    let result = store.subscribe(subscriber.id, Uuid::new_v4(), None).await;

    assert!(matches!(result, Err(StoreError::UnknownZone(_))));
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn alert_lifecycle_respects_frequency() {
    let (store, db_pool) = spawn_store().await;
    let zone = insert_zone(&db_pool, 40.0).await;
    let (subscriber, _) = store
        .get_or_create_subscriber("+14155551234", ChannelType::PhoneNumber)
        .await
        .unwrap();
    let (subscription, _) = store
        .subscribe(subscriber.id, zone.id, None)
        .await
        .unwrap();
    let now = Utc.with_ymd_and_hms(2026, 10, 18, 18, 0, 0).unwrap();

    let eligible = store.eligible_for_sending(now).await.unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].zone, zone);
    assert_eq!(eligible[0].subscriber, subscriber);

    assert_ok!(store.record_alert_sent(subscription.id, 40.0, now).await);

    let half_an_hour_later = now + Duration::minutes(30);
    assert!(store
        .eligible_for_sending(half_an_hour_later)
        .await
        .unwrap()
        .is_empty());
    let an_hour_later = now + Duration::hours(1);
    assert_eq!(
        store.eligible_for_sending(an_hour_later).await.unwrap().len(),
        1
    );

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.active_subscriptions, 1);
    assert_eq!(stats.total_alerts_sent, 1);
}

#[tokio::test]
#[ignore = "requires a running Postgres instance"]
async fn disabled_subscriptions_are_not_eligible() {
    let (store, db_pool) = spawn_store().await;
    let zone = insert_zone(&db_pool, 40.0).await;
    let (subscriber, _) = store
        .get_or_create_subscriber("+14155551234", ChannelType::PhoneNumber)
        .await
        .unwrap();
    let (subscription, _) = store
        .subscribe(subscriber.id, zone.id, None)
        .await
        .unwrap();

    store.disable_permanently(subscription.id).await.unwrap();

    assert!(store
        .eligible_for_sending(Utc::now())
        .await
        .unwrap()
        .is_empty());
    assert_none!(store.active_subscription(subscriber.id).await.unwrap());
}
