use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};

use crate::store::{StoreError, SubscriptionStore};

#[tracing::instrument(name = "Subscription stats handler", skip(store))]
pub async fn stats(store: web::Data<dyn SubscriptionStore>) -> Result<HttpResponse, StoreError> {
    let stats = store.stats().await?;

    Ok(HttpResponse::Ok().json(stats))
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
