//! The ordered four-stage chain.
//!
//! ```text
//! ImageRepository -> ImagePolicy -> [gate] -> HelmRepository -> HelmRelease
//! ```
//!
//! Each stage builds its desired spec from the parent spec and the status
//! projected by earlier stages, persists the child, and projects what it
//! observes forward. The gate stops the chain while the chart coordinates are
//! incomplete; nothing downstream is written from unobserved data.

use std::time::Duration;

use fluxer_api::{FluxApp, ManagedObject, READY, Resource};
use fluxer_core::ControllerConfig;
use tracing::{debug, info, instrument};

use crate::desired::{self, StageDescriptor};
use crate::error::Result;
use crate::status;
use crate::store::ManagedResourceStore;

/// How far the chain got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every stage was committed.
    Completed,
    /// The gate stopped the chain; retry after `requeue_after`.
    Waiting {
        requeue_after: Duration,
        unresolved: Vec<&'static str>,
    },
}

/// Runs the chain for one parent.
#[derive(Clone)]
pub struct ReconciliationPipeline {
    store: ManagedResourceStore,
    config: ControllerConfig,
}

impl ReconciliationPipeline {
    pub const fn new(store: ManagedResourceStore, config: ControllerConfig) -> Self {
        Self { store, config }
    }

    /// Run every stage in order, writing projections into `app.status`.
    ///
    /// The caller resets the chart status beforehand and persists it after.
    ///
    /// # Errors
    ///
    /// Fails fast on the first stage error. Stages committed before the
    /// failure stay committed.
    #[instrument(skip_all, fields(app = %app.key()))]
    pub async fn run(&self, app: &mut FluxApp) -> Result<PipelineOutcome> {
        let stage = desired::image_repository(app, &self.config)?;
        let image_repository = self.sync(app, stage).await?;
        status::project_image_repository(&image_repository, &mut app.status.chart)?;

        let image_policy = self.sync(app, desired::image_policy(app)).await?;
        status::project_image_policy(&image_policy, &mut app.status.chart)?;

        let unresolved = app.status.chart.unresolved_fields();
        if !unresolved.is_empty() {
            info!(
                unresolved = ?unresolved,
                requeue_after_secs = self.config.requeue_after.as_secs(),
                "Chart not resolved yet, waiting"
            );
            return Ok(PipelineOutcome::Waiting {
                requeue_after: self.config.requeue_after,
                unresolved,
            });
        }

        if let Some(stage) = desired::helm_repository(app)? {
            self.sync(app, stage).await?;
        }

        let release = self
            .sync(app, desired::helm_release(app, &self.config))
            .await?;
        status::mirror_condition(
            &mut app.status,
            READY,
            Some(&release),
            status::release_not_ready(),
            app.metadata.generation,
        );

        Ok(PipelineOutcome::Completed)
    }

    /// Fetch, apply the desired spec, and commit one child.
    ///
    /// Ownership is recorded only on a newly initialized child. An existing
    /// child is patched as is, even when another parent controls it.
    async fn sync<K: ManagedObject>(&self, owner: &FluxApp, stage: StageDescriptor<K>) -> Result<K> {
        let kind = stage.kind();
        let StageDescriptor { key, spec } = stage;

        let mut record = self.store.fetch::<K>(&key).await?;
        if !record.existed() {
            self.store
                .set_controller_reference(record.object_mut(), owner)?;
        }
        record.object_mut().set_spec(spec);

        let outcome = self.store.commit(&mut record).await?;
        debug!(kind, key = %key, outcome = ?outcome, "Stage synced");
        Ok(record.into_object())
    }
}
