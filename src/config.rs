use chrono_tz::Tz;
use config::{Config, ConfigError, File};
use secrecy::{ExposeSecret, Secret};
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use std::time::Duration;

use crate::domain::phone_number::PhoneNumber;
use crate::evaluator::{AlertEvaluator, SendWindow};
use crate::scheduler::SchedulerSettings;

#[derive(Debug)]
pub enum Environment {
    Development,
    Production,
}

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub sms_client: SmsClientSettings,
    pub alerts: AlertSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct SmsClientSettings {
    pub base_url: String,
    pub account_sid: String,
    pub sender_number: String,
    pub auth_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    // secrecy protects secret information and prevents them to be exposed (eg: via logs)
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub name: String,
    pub require_ssl: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct AlertSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub frequency_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub sweep_interval_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub send_window_start_hour: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub send_window_end_hour: u32,
    pub fallback_timezone: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub send_timeout_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_sends: usize,
}

impl Settings {
    pub fn get_address(&self) -> String {
        format!(
            "{}:{}",
            self.application.get_host(),
            self.application.get_port()
        )
    }

    pub fn set_sms_client_base_url(&mut self, new_base_url: String) {
        self.sms_client.set_base_url(new_base_url)
    }

    pub fn set_app_port(&mut self, port: u16) {
        self.application.port = port;
    }
}

impl DatabaseSettings {
    pub fn get_db_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let mut db_options = PgConnectOptions::new()
            .host(&self.host)
            .password(self.password.expose_secret())
            .username(&self.username)
            .port(self.port)
            .database(&self.name)
            .ssl_mode(ssl_mode);

        db_options.log_statements(tracing::log::LevelFilter::Trace);

        db_options
    }

    pub fn set_name(&mut self, new_db_name: String) {
        self.name = new_db_name
    }
}

impl ApplicationSettings {
    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_host(&self) -> String {
        self.host.clone()
    }
}

impl SmsClientSettings {
    pub fn get_sender(&self) -> Result<PhoneNumber, String> {
        PhoneNumber::parse(self.sender_number.clone())
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn set_base_url(&mut self, new_base_url: String) {
        self.base_url = new_base_url
    }
}

impl AlertSettings {
    pub fn get_frequency(&self) -> Duration {
        Duration::from_secs(self.frequency_seconds)
    }

    pub fn get_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn get_evaluator(&self) -> Result<AlertEvaluator, String> {
        let window = SendWindow::new(self.send_window_start_hour, self.send_window_end_hour)?;
        let fallback_timezone = self.fallback_timezone.parse::<Tz>().map_err(|_| {
            format!(
                "{} is not a valid IANA timezone name.",
                self.fallback_timezone
            )
        })?;

        Ok(AlertEvaluator::new(window, fallback_timezone))
    }

    pub fn get_scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            send_timeout: Duration::from_millis(self.send_timeout_milliseconds),
            max_concurrent_sends: self.max_concurrent_sends,
        }
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            unknown_env => Err(format!(
                "{} is not supported environment. Use either 'development' or 'production'.",
                unknown_env
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let root_path = std::env::current_dir().map_err(|err| {
        ConfigError::Message(format!("Failed to determine the current directory: {}", err))
    })?;
    let config_directory = root_path.join("config");
    // Uses development environment by default
    let enviroment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "development".into())
        .try_into()
        .map_err(ConfigError::Message)?;
    let config_base_filepath = config_directory.join("base");
    let config_env_filepath = config_directory.join(enviroment.as_str());

    // It merges the base configuration file with the one from the specific environment (development or production)
    let settings = Config::builder()
        .add_source(File::from(config_base_filepath).required(true))
        .add_source(File::from(config_env_filepath).required(true))
        // Merge settings from environment variables with a prefix of APP and "__" separator
        // E.g APP_ALERTS__FREQUENCY_SECONDS would set Settings.alerts.frequency_seconds
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    tracing::info!("Application environment = {:?}", enviroment);

    // Try to convert the value from the configuration file into a Settings type
    settings.try_deserialize()
}
