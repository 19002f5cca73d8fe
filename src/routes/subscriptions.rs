use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use uuid::Uuid;

use crate::domain::new_subscription::{
    NewSubscription, NewSubscriptionBody, SubscriberIdentity, UnsubscribeBody,
};
use crate::store::{StoreError, SubscriptionStore};

#[derive(serde::Serialize)]
struct SubscriptionResponse {
    subscription_id: Uuid,
    zone_id: Uuid,
    changed: bool,
}

#[tracing::instrument(
    name = "Subscribe to a zone handler",
    skip(body, store),
    fields(
        channel = %body.channel,
        zone_id = %body.zone_id
    )
)]
pub async fn handle_subscribe(
    body: web::Json<NewSubscriptionBody>,
    store: web::Data<dyn SubscriptionStore>,
) -> Result<HttpResponse, SubscriptionError> {
    let new_subscription: NewSubscription =
        body.try_into().map_err(SubscriptionError::Validation)?;

    let zone = store
        .get_zone(new_subscription.zone_id)
        .await?
        .ok_or(SubscriptionError::UnknownZone(new_subscription.zone_id))?;
    let (subscriber, _) = store
        .get_or_create_subscriber(
            &new_subscription.subscriber.identifier,
            new_subscription.subscriber.channel,
        )
        .await?;
    // The subscriber is shown the current reading when subscribing, so it becomes the
    // baseline for the next alert.
    let (subscription, changed) = store
        .subscribe(subscriber.id, zone.id, Some(zone.pm25))
        .await?;

    let response = SubscriptionResponse {
        subscription_id: subscription.id,
        zone_id: subscription.zone_id,
        changed,
    };

    if changed {
        Ok(HttpResponse::Created().json(response))
    } else {
        Ok(HttpResponse::Ok().json(response))
    }
}

#[tracing::instrument(
    name = "Unsubscribe handler",
    skip(body, store),
    fields(channel = %body.channel)
)]
pub async fn handle_unsubscribe(
    body: web::Json<UnsubscribeBody>,
    store: web::Data<dyn SubscriptionStore>,
) -> Result<HttpResponse, SubscriptionError> {
    let identity: SubscriberIdentity = body.try_into().map_err(SubscriptionError::Validation)?;

    if let Some(subscriber) = store
        .find_subscriber(&identity.identifier, identity.channel)
        .await?
    {
        store.unsubscribe(subscriber.id).await?;
    }

    Ok(HttpResponse::Ok().finish())
}

#[derive(thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    Validation(String),
    #[error("Zone {0} does not exist.")]
    UnknownZone(Uuid),
    #[error("Failed to access the subscription store.")]
    Store(#[source] StoreError),
}

impl From<StoreError> for SubscriptionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownZone(zone_id) => SubscriptionError::UnknownZone(zone_id),
            err => SubscriptionError::Store(err),
        }
    }
}

impl std::fmt::Debug for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionError::Store(err) => write!(f, "{}\nCaused by:\n\t({:?})", self, err),
            _ => write!(f, "{}", self),
        }
    }
}

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::Validation(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::UnknownZone(_) => StatusCode::NOT_FOUND,
            SubscriptionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
