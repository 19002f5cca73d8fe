use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::io::{Error, ErrorKind};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

use crate::config::{DatabaseSettings, Settings};
use crate::notifier::Notifier;
use crate::routes::{handle_subscribe, handle_unsubscribe, health_check, run_sweep, stats};
use crate::scheduler::AlertScheduler;
use crate::sms_client::SmsClient;
use crate::store::{PgSubscriptionStore, SubscriptionStore};

pub struct Application {
    pub port: u16,
    pub server: Server,
    scheduler: Arc<AlertScheduler>,
    sweep_interval: Duration,
}

impl Application {
    /// Builds the application on top of the Postgres store.
    pub async fn build(config: Settings) -> Result<Self, Error> {
        let db_pool = get_connection_db_pool(&config.database);
        let store = PgSubscriptionStore::new(db_pool, config.alerts.get_frequency());

        Self::build_with_store(config, Arc::new(store)).await
    }

    pub async fn build_with_store(
        config: Settings,
        store: Arc<dyn SubscriptionStore>,
    ) -> Result<Self, Error> {
        let sender = config
            .sms_client
            .get_sender()
            .map_err(|err| Error::new(ErrorKind::InvalidInput, err))?;
        let sms_client = SmsClient::new(
            config.sms_client.base_url.clone(),
            config.sms_client.account_sid.clone(),
            sender,
            config.sms_client.auth_token.clone(),
            Some(config.sms_client.get_timeout()),
        )
        .map_err(|err| Error::new(ErrorKind::Other, err))?;
        let evaluator = config
            .alerts
            .get_evaluator()
            .map_err(|err| Error::new(ErrorKind::InvalidInput, err))?;

        let notifier: Arc<dyn Notifier> = Arc::new(sms_client);
        let scheduler = Arc::new(AlertScheduler::new(
            store.clone(),
            notifier,
            evaluator,
            config.alerts.get_scheduler_settings(),
        ));

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        let server = run(listener, store, scheduler.clone())?;

        Ok(Self {
            port,
            server,
            scheduler,
            sweep_interval: config.alerts.get_sweep_interval(),
        })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Serves HTTP requests and runs the periodic alert sweep until the server stops.
    pub async fn run_until_stop(self) -> Result<(), Error> {
        let driver = self.scheduler.clone().start(self.sweep_interval);
        let result = self.server.await;

        self.scheduler.stop();
        if let Err(err) = driver.await {
            tracing::error!(error = ?err, "Alert scheduler task failed");
        }

        result
    }
}

pub fn run(
    listener: TcpListener,
    store: Arc<dyn SubscriptionStore>,
    scheduler: Arc<AlertScheduler>,
) -> Result<Server, Error> {
    let store = web::Data::from(store);
    let scheduler = web::Data::from(scheduler);

    let server = HttpServer::new(move || {
        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/subscriptions", web::post().to(handle_subscribe))
            .route(
                "/subscriptions/unsubscribe",
                web::post().to(handle_unsubscribe),
            )
            .route("/sweeps", web::post().to(run_sweep))
            .route("/stats", web::get().to(stats))
            .app_data(store.clone())
            .app_data(scheduler.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
