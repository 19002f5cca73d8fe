use uuid::Uuid;

use crate::domain::channel_type::ChannelType;

/// Someone reachable through a channel. Unique per (identifier, channel).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub identifier: String,
    pub channel: ChannelType,
}
