pub mod config;
pub mod domain;
pub mod evaluator;
pub mod notifier;
pub mod routes;
pub mod scheduler;
pub mod sms_client;
pub mod startup;
pub mod store;
pub mod telemetry;
