pub mod aqi_level;
pub mod channel_type;
pub mod new_subscription;
pub mod phone_number;
pub mod subscriber;
pub mod subscription;
pub mod zone;

pub use aqi_level::{pm25_to_aqi, AqiLevel, MeasurementError};
pub use channel_type::ChannelType;
pub use subscriber::Subscriber;
pub use subscription::{EligibleSubscription, Subscription, SubscriptionStats};
pub use zone::Zone;
