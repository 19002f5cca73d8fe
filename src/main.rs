use aqi_alerts::config::get_configuration;
use aqi_alerts::startup::Application;
use aqi_alerts::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber(String::from("aqi_alerts"), String::from("info"));

    init_subscriber(subscriber)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;

    let config = get_configuration()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let application = Application::build(config).await?;

    tracing::info!("Server listening on port {}", application.get_port());

    application.run_until_stop().await
}
