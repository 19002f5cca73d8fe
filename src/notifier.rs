use crate::domain::ChannelType;

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The destination will never accept messages from this sender again,
    /// e.g. the recipient blocked the sender.
    PermanentlyRejected,
    TransientFailure(String),
}

/// Outbound transport for alert messages. Only called for channels that support
/// delivery.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: ChannelType, identifier: &str, message: &str)
        -> DeliveryOutcome;
}
