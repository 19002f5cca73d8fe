use actix_web::web;
use serde::Deserialize;
use uuid::Uuid;
use validator::validate_ip;

use crate::domain::channel_type::ChannelType;
use crate::domain::phone_number::PhoneNumber;

/// Validated identity of the subscriber issuing a command.
#[derive(Debug)]
pub struct SubscriberIdentity {
    pub identifier: String,
    pub channel: ChannelType,
}

pub struct NewSubscription {
    pub subscriber: SubscriberIdentity,
    pub zone_id: Uuid,
}

#[derive(Deserialize)]
pub struct NewSubscriptionBody {
    pub identifier: String,
    pub channel: String,
    pub zone_id: Uuid,
}

#[derive(Deserialize)]
pub struct UnsubscribeBody {
    pub identifier: String,
    pub channel: String,
}

impl SubscriberIdentity {
    pub fn parse(identifier: String, channel: String) -> Result<SubscriberIdentity, String> {
        let channel = ChannelType::parse(channel)?;
        let identifier = match channel {
            ChannelType::PhoneNumber => PhoneNumber::parse(identifier)?.as_ref().to_string(),
            ChannelType::Ip => {
                let identifier = identifier.trim().to_string();
                if !validate_ip(identifier.as_str()) {
                    return Err(format!("{} is not a valid IP address", identifier));
                }
                identifier
            }
        };

        Ok(SubscriberIdentity {
            identifier,
            channel,
        })
    }
}

impl TryFrom<web::Json<NewSubscriptionBody>> for NewSubscription {
    type Error = String;

    fn try_from(body: web::Json<NewSubscriptionBody>) -> Result<Self, Self::Error> {
        let body = body.into_inner();
        let subscriber = SubscriberIdentity::parse(body.identifier, body.channel)?;

        Ok(NewSubscription {
            subscriber,
            zone_id: body.zone_id,
        })
    }
}

impl TryFrom<web::Json<UnsubscribeBody>> for SubscriberIdentity {
    type Error = String;

    fn try_from(body: web::Json<UnsubscribeBody>) -> Result<Self, Self::Error> {
        let body = body.into_inner();

        SubscriberIdentity::parse(body.identifier, body.channel)
    }
}
