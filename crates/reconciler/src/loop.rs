//! Continuous reconciliation loop.
//!
//! Each tick lists every FluxApp and reconciles the ones that are due.
//! A parent waiting at the gate is held back for the requeue delay it
//! returned; a parent whose invocation failed backs off exponentially.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fluxer_api::{ObjectKey, Resource};
use fluxer_core::ControllerConfig;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Interval between reconciliation cycles.
    pub interval: Duration,
    /// Delay after the first failed invocation of a parent.
    pub error_backoff_base: Duration,
    /// Ceiling for the error delay.
    pub error_backoff_max: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for LoopConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            interval: config.loop_interval,
            error_backoff_base: config.error_backoff_base,
            error_backoff_max: config.error_backoff_max,
        }
    }
}

/// Delay after `failures` consecutive failed invocations.
pub fn error_backoff(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    base.checked_mul(1_u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

/// Longest a parent is ever held back.
const MAX_DEFERRAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Instant `delay` after `now`, capped at [`MAX_DEFERRAL`].
fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(MAX_DEFERRAL)).unwrap_or(now)
}

#[derive(Debug, Clone, Copy)]
struct ScheduleEntry {
    not_before: Instant,
    failures: u32,
}

/// Counts from one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub reconciled: usize,
    pub converged: usize,
    pub waiting: usize,
    pub failed: usize,
    pub deferred: usize,
}

/// Continuous reconciliation loop.
pub struct ReconciliationLoop {
    reconciler: Arc<Reconciler>,
    config: LoopConfig,
    schedule: BTreeMap<ObjectKey, ScheduleEntry>,
    stop_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    pub fn new(reconciler: Arc<Reconciler>, config: LoopConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            reconciler,
            config,
            schedule: BTreeMap::new(),
            stop_rx,
            stop_tx,
        }
    }

    /// Run until stopped.
    ///
    /// Failures are per parent and never end the loop; a failed listing is
    /// logged and retried on the next tick.
    pub async fn run(&mut self) {
        info!(
            interval_ms = self.config.interval.as_millis(),
            "Starting reconciliation loop"
        );

        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.reconcile_once().await {
                        Ok(summary) => debug!(summary = ?summary, "Cycle complete"),
                        Err(e) => error!(error = %e, "Unable to list FluxApps"),
                    }
                }
                _ = self.stop_rx.changed() => {
                    if *self.stop_rx.borrow() {
                        info!("Reconciliation loop stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Run a single reconciliation cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only if the parents cannot be listed.
    pub async fn reconcile_once(&mut self) -> Result<CycleSummary> {
        let now = Instant::now();
        let parents = self.reconciler.list_parents().await?;
        let keys: Vec<ObjectKey> = parents.iter().map(Resource::key).collect();
        self.schedule.retain(|key, _| keys.contains(key));

        let (due, deferred): (Vec<ObjectKey>, Vec<ObjectKey>) = keys
            .into_iter()
            .partition(|key| self.schedule.get(key).is_none_or(|e| e.not_before <= now));

        let reconciler = Arc::clone(&self.reconciler);
        let results = join_all(due.iter().map(|key| reconciler.reconcile(key))).await;

        let mut summary = CycleSummary {
            deferred: deferred.len(),
            ..CycleSummary::default()
        };
        for (key, result) in due.into_iter().zip(results) {
            summary.reconciled += 1;
            self.record(key, result, now, &mut summary);
        }
        Ok(summary)
    }

    fn record(
        &mut self,
        key: ObjectKey,
        result: Result<ReconcileOutcome>,
        now: Instant,
        summary: &mut CycleSummary,
    ) {
        match result {
            Ok(outcome) => {
                match &outcome {
                    ReconcileOutcome::Converged => summary.converged += 1,
                    ReconcileOutcome::IncompleteDependency { .. } => summary.waiting += 1,
                    _ => {}
                }
                match outcome.requeue_after() {
                    Some(delay) => {
                        self.schedule.insert(
                            key,
                            ScheduleEntry {
                                not_before: deadline(now, delay),
                                failures: 0,
                            },
                        );
                    }
                    None => {
                        self.schedule.remove(&key);
                    }
                }
            }
            Err(e) => {
                summary.failed += 1;
                let failures = self
                    .schedule
                    .get(&key)
                    .map_or(0, |entry| entry.failures)
                    .saturating_add(1);
                let delay = error_backoff(
                    self.config.error_backoff_base,
                    self.config.error_backoff_max,
                    failures,
                );
                warn!(
                    app = %key,
                    error = %e,
                    failures,
                    retry_in_secs = delay.as_secs(),
                    "Reconciliation failed, backing off"
                );
                self.schedule.insert(
                    key,
                    ScheduleEntry {
                        not_before: deadline(now, delay),
                        failures,
                    },
                );
            }
        }
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use fluxer_api::FluxApp;

    use super::*;
    use crate::client::{ClientError, ResourceClient};
    use crate::memory::{InMemoryClient, Verb};
    use crate::reconciler::ReconcilerBuilder;
    use crate::registry::KindInfo;

    async fn setup(names: &[&str]) -> (ReconciliationLoop, Arc<InMemoryClient>) {
        setup_with(names, ControllerConfig::default()).await
    }

    async fn setup_with(
        names: &[&str],
        config: ControllerConfig,
    ) -> (ReconciliationLoop, Arc<InMemoryClient>) {
        let client = Arc::new(InMemoryClient::new());
        for name in names {
            client
                .create(
                    &KindInfo::of::<FluxApp>(),
                    serde_json::to_value(FluxApp::new(*name, "apps", format!("oci://ghcr.io/org/{name}")))
                        .unwrap(),
                )
                .await
                .unwrap();
        }
        let loop_config = LoopConfig::from(&config);
        let reconciler = ReconcilerBuilder::new()
            .with_client(client.clone())
            .with_config(config)
            .build()
            .unwrap();
        (
            ReconciliationLoop::new(Arc::new(reconciler), loop_config),
            client,
        )
    }

    #[test]
    fn test_error_backoff_doubles_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        assert_eq!(error_backoff(base, max, 1), Duration::from_secs(5));
        assert_eq!(error_backoff(base, max, 2), Duration::from_secs(10));
        assert_eq!(error_backoff(base, max, 4), Duration::from_secs(40));
        assert_eq!(error_backoff(base, max, 10), max);
        assert_eq!(error_backoff(base, max, u32::MAX), max);
    }

    #[test]
    fn test_deadline_caps_huge_delays() {
        let now = Instant::now();
        assert_eq!(deadline(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert_eq!(deadline(now, Duration::MAX), now + MAX_DEFERRAL);
    }

    /// Given a requeue delay too large to add to an instant
    /// When a parent waits at the gate
    /// Then the cycle completes and the parent stays deferred
    #[tokio::test(start_paused = true)]
    async fn huge_requeue_delay_is_capped() {
        let config = ControllerConfig {
            requeue_after: Duration::from_secs(u64::MAX),
            ..ControllerConfig::default()
        };
        let (mut runner, _) = setup_with(&["a"], config).await;
        runner.reconcile_once().await.unwrap();

        let waiting = runner.reconcile_once().await.unwrap();
        assert_eq!(waiting.waiting, 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let deferred = runner.reconcile_once().await.unwrap();
        assert_eq!(deferred.deferred, 1);
    }

    /// Given a backoff ceiling too large to add to an instant
    /// When a parent keeps failing
    /// Then every failure is recorded without overflow
    #[tokio::test(start_paused = true)]
    async fn huge_error_backoff_is_capped() {
        let config = ControllerConfig {
            error_backoff_base: Duration::from_secs(u64::MAX / 2),
            error_backoff_max: Duration::from_secs(u64::MAX),
            ..ControllerConfig::default()
        };
        let (mut runner, client) = setup_with(&["a"], config).await;
        client
            .fail_next(
                Verb::Patch,
                "FluxApp",
                ClientError::Transport {
                    reason: "connection reset".to_string(),
                },
            )
            .await;

        let failed = runner.reconcile_once().await.unwrap();
        assert_eq!(failed.failed, 1);

        let deferred = runner.reconcile_once().await.unwrap();
        assert_eq!(deferred.deferred, 1);
    }

    /// Given two FluxApps
    /// When the loop runs one cycle
    /// Then both are reconciled concurrently
    #[tokio::test(start_paused = true)]
    async fn every_parent_is_reconciled() {
        let (mut runner, client) = setup(&["a", "b"]).await;

        let summary = runner.reconcile_once().await.unwrap();

        assert_eq!(summary.reconciled, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(client.count(Verb::Patch).await, 2);
    }

    /// Given a parent waiting at the gate
    /// When the next cycle runs before the requeue delay
    /// Then the parent is deferred until the delay elapses
    #[tokio::test(start_paused = true)]
    async fn gate_requeue_defers_parent() {
        let (mut runner, _) = setup(&["a"]).await;
        runner.reconcile_once().await.unwrap();

        let waiting = runner.reconcile_once().await.unwrap();
        assert_eq!(waiting.waiting, 1);

        let deferred = runner.reconcile_once().await.unwrap();
        assert_eq!(deferred.deferred, 1);
        assert_eq!(deferred.reconciled, 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        let retried = runner.reconcile_once().await.unwrap();
        assert_eq!(retried.reconciled, 1);
    }

    /// Given a parent whose finalizer update fails
    /// When the loop runs
    /// Then the parent backs off instead of being retried immediately
    #[tokio::test(start_paused = true)]
    async fn failure_backs_off() {
        let (mut runner, client) = setup(&["a"]).await;
        client
            .fail_next(
                Verb::Patch,
                "FluxApp",
                ClientError::Transport {
                    reason: "connection reset".to_string(),
                },
            )
            .await;

        let failed = runner.reconcile_once().await.unwrap();
        assert_eq!(failed.failed, 1);

        let deferred = runner.reconcile_once().await.unwrap();
        assert_eq!(deferred.deferred, 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        let retried = runner.reconcile_once().await.unwrap();
        assert_eq!(retried.reconciled, 1);
        assert_eq!(retried.failed, 0);
    }

    /// Given a loop that is running
    /// When stop() is called
    /// Then the loop should exit gracefully
    #[tokio::test]
    async fn stop_signal_terminates_loop() {
        let (mut runner, _) = setup(&[]).await;
        let stopper = runner.stopper();

        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "Loop should stop within timeout");
    }
}
