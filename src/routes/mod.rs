mod health_check;
mod stats;
mod subscriptions;
mod sweeps;

pub use health_check::health_check;
pub use stats::stats;
pub use subscriptions::{handle_subscribe, handle_unsubscribe, SubscriptionError};
pub use sweeps::run_sweep;
