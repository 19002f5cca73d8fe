use aqi_alerts::domain::ChannelType;
use aqi_alerts::store::SubscriptionStore;
use wiremock::matchers::{any, method, path_regex};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;

async fn subscribe(test_app: &TestApp, identifier: &str, channel: &str, pm25: f64) -> uuid::Uuid {
    let zone = test_app.add_zone(pm25);
    let response = test_app
        .post_subscription(serde_json::json!({
            "identifier": identifier,
            "channel": channel,
            "zone_id": zone.id,
        }))
        .await;
    assert_eq!(201, response.status().as_u16());

    zone.id
}

async fn sweep(test_app: &TestApp) -> serde_json::Value {
    let response = test_app.post_sweep().await;
    assert_eq!(200, response.status().as_u16());

    response
        .json()
        .await
        .expect("Sweep report is not valid JSON.")
}

#[tokio::test]
async fn no_sms_is_sent_while_the_level_is_unchanged() {
    let test_app = TestApp::spawn_app().await;
    subscribe(&test_app, "4155551234", "phone_number", 8.0).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&test_app.sms_server)
        .await;

    let report = sweep(&test_app).await;

    assert_eq!(report["evaluated"], 1);
    assert_eq!(report["fired"], 0);
}

#[tokio::test]
async fn level_change_is_delivered_by_sms() {
    let test_app = TestApp::spawn_app().await;
    let zone_id = subscribe(&test_app, "4155551234", "phone_number", 8.0).await;
    test_app.store.set_zone_pm25(zone_id, 40.0);

    Mock::given(path_regex("/Messages.json$"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&test_app.sms_server)
        .await;

    let report = sweep(&test_app).await;
    assert_eq!(report["delivered"], 1);

    let received_requests = test_app.sms_server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received_requests[0].body);
    assert!(body.contains("Unhealthy+for+Sensitive+Groups"));

    let stats: serde_json::Value = test_app.get_stats().await.json().await.unwrap();
    assert_eq!(stats["total_alerts_sent"], 1);
    assert_eq!(stats["active_subscriptions"], 1);
}

#[tokio::test]
async fn rejected_recipient_is_unsubscribed() {
    let test_app = TestApp::spawn_app().await;
    let zone_id = subscribe(&test_app, "4155551234", "phone_number", 8.0).await;
    test_app.store.set_zone_pm25(zone_id, 40.0);

    Mock::given(any())
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 21610,
            "message": "Attempt to send to unsubscribed recipient",
            "status": 400
        })))
        .expect(1)
        .mount(&test_app.sms_server)
        .await;

    let report = sweep(&test_app).await;
    assert_eq!(report["permanently_disabled"], 1);

    let subscriber = test_app
        .store
        .find_subscriber("+14155551234", ChannelType::PhoneNumber)
        .await
        .unwrap()
        .unwrap();
    assert!(test_app
        .store
        .active_subscription(subscriber.id)
        .await
        .unwrap()
        .is_none());

    // Nothing is eligible anymore, so the provider is not called again.
    let report = sweep(&test_app).await;
    assert_eq!(report["evaluated"], 0);

    // Subscribing again is the way back.
    let response = test_app
        .post_subscription(serde_json::json!({
            "identifier": "4155551234",
            "channel": "phone_number",
            "zone_id": zone_id,
        }))
        .await;
    assert_eq!(201, response.status().as_u16());

    let subscription = test_app
        .store
        .active_subscription(subscriber.id)
        .await
        .unwrap()
        .expect("The subscription was not reactivated.");
    assert_eq!(subscription.zone_id, zone_id);
    assert_eq!(subscription.disabled_at, 0);
    assert_eq!(test_app.store.subscriptions_of(subscriber.id).len(), 1);

    // The current reading is the new baseline, so it is evaluated without a send.
    let report = sweep(&test_app).await;
    assert_eq!(report["evaluated"], 1);
    assert_eq!(report["fired"], 0);
}

#[tokio::test]
async fn provider_outage_is_retried_on_the_next_sweep() {
    let test_app = TestApp::spawn_app().await;
    let zone_id = subscribe(&test_app, "4155551234", "phone_number", 8.0).await;
    test_app.store.set_zone_pm25(zone_id, 40.0);

    Mock::given(any())
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&test_app.sms_server)
        .await;

    let report = sweep(&test_app).await;
    assert_eq!(report["transient_failures"], 1);

    let report = sweep(&test_app).await;
    assert_eq!(report["transient_failures"], 1);

    let stats: serde_json::Value = test_app.get_stats().await.json().await.unwrap();
    assert_eq!(stats["total_alerts_sent"], 0);
}

#[tokio::test]
async fn channels_without_outbound_support_are_not_messaged() {
    let test_app = TestApp::spawn_app().await;
    let zone_id = subscribe(&test_app, "203.0.113.7", "ip", 8.0).await;
    test_app.store.set_zone_pm25(zone_id, 40.0);

    Mock::given(any())
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&test_app.sms_server)
        .await;

    let report = sweep(&test_app).await;

    assert_eq!(report["delivered"], 1);
}
