use actix_web::HttpResponse;

/// Liveness probe. Does not touch the store or the SMS provider.
#[tracing::instrument(name = "Health check")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
