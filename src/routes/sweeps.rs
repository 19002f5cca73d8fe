use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use chrono::Utc;

use crate::scheduler::{AlertScheduler, SweepError};

/// Runs one alert sweep right away instead of waiting for the next tick.
#[tracing::instrument(name = "Run a sweep handler", skip(scheduler))]
pub async fn run_sweep(
    scheduler: web::Data<AlertScheduler>,
) -> Result<HttpResponse, SweepError> {
    let report = scheduler.run_sweep(Utc::now()).await?;

    Ok(HttpResponse::Ok().json(report))
}

impl ResponseError for SweepError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
