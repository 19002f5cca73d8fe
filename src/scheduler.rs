//! Periodic alert sweep.
//!
//! A sweep loads every subscription eligible for sending, evaluates each one on its
//! own, delivers the alerts that fire and applies the delivery outcome through the
//! store. Items never depend on each other, so they are processed concurrently up to
//! a fixed bound.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::domain::EligibleSubscription;
use crate::evaluator::{AlertEvaluator, Decision};
use crate::notifier::{DeliveryOutcome, Notifier};
use crate::store::{StoreError, SubscriptionStore};

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONCURRENT_SENDS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Upper bound for a single send. A send that exceeds it counts as a transient failure.
    pub send_timeout: Duration,
    pub max_concurrent_sends: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub evaluated: usize,
    pub fired: usize,
    pub delivered: usize,
    pub permanently_disabled: usize,
    pub transient_failures: usize,
    /// Items rejected because their data could not be evaluated.
    pub failed: usize,
    /// Items left untouched because the sweep was stopped.
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Skipped,
    Delivered,
    PermanentlyDisabled,
    TransientFailure,
    Failed,
    Cancelled,
}

impl SweepReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.evaluated += 1,
            ItemOutcome::Delivered => {
                self.evaluated += 1;
                self.fired += 1;
                self.delivered += 1;
            }
            ItemOutcome::PermanentlyDisabled => {
                self.evaluated += 1;
                self.fired += 1;
                self.permanently_disabled += 1;
            }
            ItemOutcome::TransientFailure => {
                self.evaluated += 1;
                self.fired += 1;
                self.transient_failures += 1;
            }
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(thiserror::Error)]
pub enum SweepError {
    #[error("Failed to load the subscriptions eligible for sending.")]
    Eligibility(#[source] StoreError),
    #[error("Failed to update subscription {0} after a delivery attempt.")]
    ApplyOutcome(Uuid, #[source] StoreError),
}

impl std::fmt::Debug for SweepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepError::Eligibility(err) | SweepError::ApplyOutcome(_, err) => {
                write!(f, "{}\nCaused by:\n\t{:?}", self, err)
            }
        }
    }
}

pub struct AlertScheduler {
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn Notifier>,
    evaluator: AlertEvaluator,
    settings: SchedulerSettings,
    /// Sweeps never overlap, so one subscription is never evaluated twice at once.
    sweep_lock: Mutex<()>,
    shutdown: watch::Sender<bool>,
}

impl AlertScheduler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn Notifier>,
        evaluator: AlertEvaluator,
        settings: SchedulerSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            store,
            notifier,
            evaluator,
            settings,
            sweep_lock: Mutex::new(()),
            shutdown,
        }
    }

    /// Spawns the periodic driver, which runs one sweep per `sweep_interval` until
    /// [`AlertScheduler::stop`] is called. The first sweep starts one interval from now.
    pub fn start(self: Arc<Self>, sweep_interval: Duration) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let first_tick = Instant::now() + sweep_interval;
            let mut ticker = tokio::time::interval_at(first_tick, sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_sweep(Utc::now()).await {
                            Ok(report) => tracing::info!(?report, "Alert sweep finished"),
                            Err(err) => tracing::error!(error = ?err, "Alert sweep aborted"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Alert scheduler shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Stops the driver. A running sweep finishes the sends already in flight and
    /// skips the rest.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    #[tracing::instrument(name = "Run an alert sweep", skip(self))]
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let _sweep = self.sweep_lock.lock().await;

        let eligible = self
            .store
            .eligible_for_sending(now)
            .await
            .map_err(SweepError::Eligibility)?;
        tracing::debug!(count = eligible.len(), "Loaded eligible subscriptions");

        let aborted = AtomicBool::new(false);
        let outcomes: Vec<Result<ItemOutcome, SweepError>> = stream::iter(eligible)
            .map(|item| self.process(item, now, &aborted))
            .buffer_unordered(self.settings.max_concurrent_sends.max(1))
            .collect()
            .await;

        let mut report = SweepReport::default();
        let mut fatal = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    fatal.get_or_insert(err);
                }
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    #[tracing::instrument(
        name = "Process a subscription",
        skip(self, item, now, aborted),
        fields(
            subscription_id = %item.subscription.id,
            zone_id = %item.zone.id
        )
    )]
    async fn process(
        &self,
        item: EligibleSubscription,
        now: DateTime<Utc>,
        aborted: &AtomicBool,
    ) -> Result<ItemOutcome, SweepError> {
        if aborted.load(Ordering::SeqCst) || self.is_stopping() {
            return Ok(ItemOutcome::Cancelled);
        }

        let (message, new_pm25) =
            match self.evaluator.evaluate(&item.subscription, &item.zone, now) {
                Ok(Decision::Skip(reason)) => {
                    tracing::debug!(reason = reason.as_ref(), "Not sending an alert");
                    return Ok(ItemOutcome::Skipped);
                }
                Ok(Decision::Fire { message, new_pm25 }) => (message, new_pm25),
                Err(err) => {
                    tracing::error!(error = ?err, "Failed to evaluate subscription");
                    return Ok(ItemOutcome::Failed);
                }
            };

        let outcome = if item.subscriber.channel.supports_delivery() {
            let send = self.notifier.send(
                item.subscriber.channel,
                &item.subscriber.identifier,
                &message,
            );
            tokio::time::timeout(self.settings.send_timeout, send)
                .await
                .unwrap_or_else(|_| {
                    DeliveryOutcome::TransientFailure(String::from("send timed out"))
                })
        } else {
            tracing::info!(
                channel = item.subscriber.channel.as_ref(),
                "Channel does not support outbound messages yet, not sending: {}",
                message
            );
            DeliveryOutcome::Delivered
        };

        let applied = match outcome {
            DeliveryOutcome::Delivered => self
                .store
                .record_alert_sent(item.subscription.id, new_pm25, now)
                .await
                .map(|_| ItemOutcome::Delivered),
            DeliveryOutcome::PermanentlyRejected => {
                tracing::warn!("Disabling alerts for a recipient that rejected the sender");
                self.store
                    .disable_permanently(item.subscription.id)
                    .await
                    .map(|_| ItemOutcome::PermanentlyDisabled)
            }
            DeliveryOutcome::TransientFailure(detail) => {
                tracing::warn!(%detail, "Failed to deliver alert, will retry on a later sweep");
                Ok(ItemOutcome::TransientFailure)
            }
        };

        applied.map_err(|err| {
            aborted.store(true, Ordering::SeqCst);
            SweepError::ApplyOutcome(item.subscription.id, err)
        })
    }
}
