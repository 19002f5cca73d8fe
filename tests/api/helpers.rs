use reqwest::Response;
use sqlx::{migrate, Connection, Executor, PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::MockServer;

use aqi_alerts::{
    config::{get_configuration, DatabaseSettings},
    domain::Zone,
    startup::{get_connection_db_pool, Application},
    store::InMemorySubscriptionStore,
};

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemorySubscriptionStore>,
    pub sms_server: MockServer,
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        let mut config = get_configuration().expect("Missing configuration file.");
        let sms_server = MockServer::start().await;

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_sms_client_base_url(sms_server.uri());
        // Sweeps are triggered through the API with the current time, so the send window
        // must cover the whole day and the periodic driver must stay out of the way.
        config.alerts.send_window_start_hour = 0;
        config.alerts.send_window_end_hour = 24;
        config.alerts.sweep_interval_seconds = 24 * 60 * 60;

        let store = Arc::new(InMemorySubscriptionStore::new(config.alerts.get_frequency()));
        let application = Application::build_with_store(config, store.clone())
            .await
            .expect("Failed to build application.");

        let address = format!("http://127.0.0.1:{}", application.get_port());

        tokio::spawn(application.run_until_stop());

        TestApp {
            address,
            store,
            sms_server,
        }
    }

    pub fn add_zone(&self, pm25: f64) -> Zone {
        let zone = Zone {
            id: Uuid::new_v4(),
            name: String::from("Oakland 94607"),
            timezone: Some(String::from("America/Los_Angeles")),
            pm25,
        };
        self.store.upsert_zone(zone.clone());
        zone
    }

    pub async fn post_subscription(&self, body: serde_json::Value) -> Response {
        self.post("subscriptions", body).await
    }

    pub async fn post_unsubscribe(&self, body: serde_json::Value) -> Response {
        self.post("subscriptions/unsubscribe", body).await
    }

    pub async fn post_sweep(&self) -> Response {
        self.post("sweeps", serde_json::json!({})).await
    }

    pub async fn get_stats(&self) -> Response {
        reqwest::Client::new()
            .get(&format!("{}/stats", self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Response {
        let client = reqwest::Client::new();
        let url = format!("{}/{}", self.address, endpoint);

        client
            .post(&url)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub async fn configure_db(db_config: &mut DatabaseSettings) -> PgPool {
    let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));

    // Create database
    let mut connection = PgConnection::connect_with(&db_config.get_db_options())
        .await
        .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    // Execute migrations
    db_config.set_name(db_test_name.clone());

    let db_pool = get_connection_db_pool(db_config);

    migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run migrations.");

    db_pool
}
