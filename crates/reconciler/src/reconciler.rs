//! Reconciler implementation.

use std::sync::Arc;
use std::time::Duration;

use fluxer_api::{
    ChartStatus, Condition, ConditionStatus, DEPENDENCY_NOT_READY_REASON, FluxApp, ObjectKey,
    READY, RECONCILIATION_FAILED_REASON, Resource,
};
use fluxer_core::ControllerConfig;
use itertools::Itertools;
use tracing::{debug, error, info, instrument, warn};

use crate::client::ResourceClient;
use crate::error::{Error, Result};
use crate::lifecycle::{CleanupHook, LifecycleAction, LifecycleController, NoopCleanup};
use crate::pipeline::{PipelineOutcome, ReconciliationPipeline};
use crate::registry::KindRegistry;
use crate::status;
use crate::store::ManagedResourceStore;

/// Result of one invocation for one parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every stage is committed and the status persisted.
    Converged,
    /// Upstream chart data is missing; not an error.
    IncompleteDependency {
        requeue_after: Duration,
        unresolved: Vec<&'static str>,
    },
    /// The finalizer was added; the chain runs on the next invocation.
    FinalizerRegistered,
    /// Cleanup ran and the finalizer was released.
    Finalized,
    /// The parent no longer exists.
    NotFound,
    /// The parent is being deleted and no longer carries our finalizer.
    Terminating,
}

impl ReconcileOutcome {
    /// Delay before the parent should be reconciled again, if any.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::IncompleteDependency { requeue_after, .. } => Some(*requeue_after),
            Self::FinalizerRegistered => Some(Duration::ZERO),
            Self::Converged | Self::Finalized | Self::NotFound | Self::Terminating => None,
        }
    }
}

/// Converges one FluxApp per invocation.
pub struct Reconciler {
    store: ManagedResourceStore,
    lifecycle: LifecycleController,
    pipeline: ReconciliationPipeline,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        client: Arc<dyn ResourceClient>,
        registry: KindRegistry,
        config: ControllerConfig,
        cleanup: Arc<dyn CleanupHook>,
    ) -> Self {
        let store = ManagedResourceStore::new(client, Arc::new(registry));
        Self {
            lifecycle: LifecycleController::new(store.clone(), config.finalizer.clone(), cleanup),
            pipeline: ReconciliationPipeline::new(store.clone(), config),
            store,
        }
    }

    /// Reconcile the parent identified by `key`.
    ///
    /// The parent status is rebuilt from scratch and written once at the
    /// end, whether the chain completed, waited at the gate, or failed.
    ///
    /// # Errors
    ///
    /// Returns the first stage error, or the status write error if the chain
    /// itself succeeded.
    #[instrument(skip(self), fields(app = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let mut record = self.store.fetch::<FluxApp>(key).await?;
        if !record.existed() {
            debug!("FluxApp not found, nothing to do");
            return Ok(ReconcileOutcome::NotFound);
        }

        match self.lifecycle.advance(&mut record).await? {
            LifecycleAction::Proceed => {}
            LifecycleAction::Registered => return Ok(ReconcileOutcome::FinalizerRegistered),
            LifecycleAction::Finalized => return Ok(ReconcileOutcome::Finalized),
            LifecycleAction::Ignore => return Ok(ReconcileOutcome::Terminating),
        }

        let app = record.object_mut();
        let generation = app.metadata.generation;
        app.status.chart = ChartStatus::default();
        app.status.observed_generation = generation;

        let result = self.pipeline.run(app).await;
        let outcome = match result {
            Ok(PipelineOutcome::Completed) => {
                info!("FluxApp converged");
                Ok(ReconcileOutcome::Converged)
            }
            Ok(PipelineOutcome::Waiting {
                requeue_after,
                unresolved,
            }) => {
                status::apply_condition(
                    &mut app.status,
                    Condition::new(
                        READY,
                        ConditionStatus::False,
                        DEPENDENCY_NOT_READY_REASON,
                        format!("waiting for chart {}", unresolved.iter().join(", ")),
                    )
                    .with_observed_generation(generation),
                );
                Ok(ReconcileOutcome::IncompleteDependency {
                    requeue_after,
                    unresolved,
                })
            }
            Err(e) => {
                error!(error = %e, "Reconciliation failed");
                status::apply_condition(
                    &mut app.status,
                    Condition::new(
                        READY,
                        ConditionStatus::False,
                        RECONCILIATION_FAILED_REASON,
                        e.to_string(),
                    )
                    .with_observed_generation(generation),
                );
                Err(e)
            }
        };

        match (outcome, self.store.commit_status(&mut record).await) {
            (Ok(outcome), Ok(_)) => Ok(outcome),
            (Ok(_), Err(status_error)) => Err(status_error),
            (Err(stage_error), Ok(_)) => Err(stage_error),
            (Err(stage_error), Err(status_error)) => {
                warn!(error = %status_error, "Unable to update FluxApp status");
                Err(stage_error)
            }
        }
    }

    /// Every parent currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub async fn list_parents(&self) -> Result<Vec<FluxApp>> {
        self.store.list::<FluxApp>().await
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    client: Option<Arc<dyn ResourceClient>>,
    registry: KindRegistry,
    config: ControllerConfig,
    cleanup: Arc<dyn CleanupHook>,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            client: None,
            registry: KindRegistry::flux(),
            config: ControllerConfig::default(),
            cleanup: Arc::new(NoopCleanup),
        }
    }

    /// Set the object store client.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ResourceClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace the kind registry.
    #[must_use]
    pub fn with_registry(mut self, registry: KindRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the hook run before the finalizer is released.
    #[must_use]
    pub fn with_cleanup_hook(mut self, cleanup: Arc<dyn CleanupHook>) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if no client was given, the parent
    /// kind is not registered, or the configuration is invalid.
    pub fn build(self) -> Result<Reconciler> {
        let client = self
            .client
            .ok_or_else(|| Error::invalid_config("resource client is required"))?;

        if !self.registry.contains(FluxApp::KIND) {
            return Err(Error::invalid_config("registry must contain FluxApp"));
        }

        self.config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;

        Ok(Reconciler::new(client, self.registry, self.config, self.cleanup))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
