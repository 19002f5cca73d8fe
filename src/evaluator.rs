use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{pm25_to_aqi, AqiLevel, MeasurementError, Subscription, Zone};

pub const DEFAULT_FALLBACK_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

/// Daily local-time interval in which alerts may be sent, `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendWindow {
    start_hour: u32,
    end_hour: u32,
}

impl SendWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<SendWindow, String> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(format!(
                "{}-{} is not a valid send window. Hours must satisfy start < end <= 24.",
                start_hour, end_hour
            ));
        }

        Ok(SendWindow {
            start_hour,
            end_hour,
        })
    }

    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }
}

impl Default for SendWindow {
    /// 8 AM to 9 PM, so nobody gets woken up overnight.
    fn default() -> Self {
        SendWindow {
            start_hour: 8,
            end_hour: 21,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutsideWindow,
    NoChange,
}

impl AsRef<str> for SkipReason {
    fn as_ref(&self) -> &str {
        match self {
            SkipReason::OutsideWindow => "outside-window",
            SkipReason::NoChange => "no-change",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Skip(SkipReason),
    /// `new_pm25` is what gets persisted once the message is delivered.
    Fire { message: String, new_pm25: f64 },
}

#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    #[error("Failed to derive the air quality level.")]
    InvalidMeasurement(#[from] MeasurementError),
}

/// Decides whether a subscription should be alerted about its zone's current reading.
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    window: SendWindow,
    fallback_timezone: Tz,
    /// Timezone names already reported as unknown, so each one is warned about once.
    unknown_timezones: Arc<Mutex<HashSet<String>>>,
}

impl AlertEvaluator {
    pub fn new(window: SendWindow, fallback_timezone: Tz) -> Self {
        Self {
            window,
            fallback_timezone,
            unknown_timezones: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn evaluate(
        &self,
        subscription: &Subscription,
        zone: &Zone,
        now: DateTime<Utc>,
    ) -> Result<Decision, EvaluationError> {
        let local_hour = now.with_timezone(&self.timezone_of(zone)).hour();
        if !self.window.contains(local_hour) {
            return Ok(Decision::Skip(SkipReason::OutsideWindow));
        }

        // Levels, not raw readings, are compared so noise within a bucket stays quiet.
        let curr_level = AqiLevel::from_measurement(zone.pm25)?;
        let last_level = AqiLevel::from_last_measurement(subscription.last_pm25)?;
        if Some(curr_level) == last_level {
            return Ok(Decision::Skip(SkipReason::NoChange));
        }

        let message = format!(
            "Air quality in {} has changed to {} (AQI {})",
            zone.name,
            curr_level,
            pm25_to_aqi(zone.pm25)?
        );

        Ok(Decision::Fire {
            message,
            new_pm25: zone.pm25,
        })
    }

    fn timezone_of(&self, zone: &Zone) -> Tz {
        match zone.timezone.as_deref() {
            Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                if self.unknown_timezones.lock().insert(name.to_string()) {
                    tracing::warn!(
                        zone_id = %zone.id,
                        timezone = name,
                        "Unknown zone timezone, using the fallback"
                    );
                } else {
                    tracing::debug!(
                        zone_id = %zone.id,
                        timezone = name,
                        "Using the fallback timezone"
                    );
                }
                self.fallback_timezone
            }),
            None => self.fallback_timezone,
        }
    }
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(SendWindow::default(), DEFAULT_FALLBACK_TIMEZONE)
    }
}
