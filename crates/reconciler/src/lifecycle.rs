//! Finalizer lifecycle of the parent.
//!
//! ```text
//! Unregistered --add finalizer--> Registered --delete--> Terminating
//!      Terminating --cleanup, remove finalizer--> Removed
//! ```
//!
//! Children are removed by owner-reference garbage collection once the
//! parent is gone, so cleanup has nothing to delete by default.

use std::sync::Arc;

use async_trait::async_trait;
use fluxer_api::{FluxApp, ObjectMeta, Resource};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::store::{ManagedResource, ManagedResourceStore};

/// Where a parent stands relative to this controller's finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    /// Live, finalizer not yet added.
    Unregistered,
    /// Live and guarded by the finalizer.
    Registered,
    /// Deletion requested; the finalizer is still present.
    Terminating,
    /// Deletion requested and the finalizer is gone.
    Removed,
}

impl FinalizerState {
    pub fn of(metadata: &ObjectMeta, finalizer: &str) -> Self {
        match (metadata.is_terminating(), metadata.has_finalizer(finalizer)) {
            (false, false) => Self::Unregistered,
            (false, true) => Self::Registered,
            (true, true) => Self::Terminating,
            (true, false) => Self::Removed,
        }
    }
}

/// External cleanup run before the finalizer is released.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    /// Release anything owner references do not cover.
    async fn cleanup(&self, app: &FluxApp) -> Result<()>;
}

/// Cleanup hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCleanup;

#[async_trait]
impl CleanupHook for NoopCleanup {
    async fn cleanup(&self, _app: &FluxApp) -> Result<()> {
        Ok(())
    }
}

/// What the lifecycle step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Run the chain.
    Proceed,
    /// The finalizer was just added; the chain waits for the next invocation.
    Registered,
    /// Cleanup ran and the finalizer was released.
    Finalized,
    /// Deletion is already past this controller.
    Ignore,
}

/// Drives [`FinalizerState`] transitions.
#[derive(Clone)]
pub struct LifecycleController {
    store: ManagedResourceStore,
    finalizer: String,
    hook: Arc<dyn CleanupHook>,
}

impl LifecycleController {
    pub fn new(
        store: ManagedResourceStore,
        finalizer: impl Into<String>,
        hook: Arc<dyn CleanupHook>,
    ) -> Self {
        Self {
            store,
            finalizer: finalizer.into(),
            hook,
        }
    }

    /// Advance the parent's lifecycle by at most one transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup hook fails or the finalizer update
    /// cannot be persisted. The finalizer is kept when cleanup fails.
    #[instrument(skip_all, fields(app = %record.object().key()))]
    pub async fn advance(&self, record: &mut ManagedResource<FluxApp>) -> Result<LifecycleAction> {
        let state = FinalizerState::of(record.object().metadata(), &self.finalizer);
        debug!(state = ?state, "Lifecycle state");

        match state {
            FinalizerState::Registered => Ok(LifecycleAction::Proceed),
            FinalizerState::Unregistered => {
                record.object_mut().metadata.add_finalizer(&self.finalizer);
                self.store.commit(record).await?;
                info!(finalizer = %self.finalizer, "Registered finalizer");
                Ok(LifecycleAction::Registered)
            }
            FinalizerState::Terminating => {
                self.hook.cleanup(record.object()).await?;
                record.object_mut().metadata.remove_finalizer(&self.finalizer);
                self.store.commit(record).await?;
                info!(finalizer = %self.finalizer, "Released finalizer");
                Ok(LifecycleAction::Finalized)
            }
            FinalizerState::Removed => Ok(LifecycleAction::Ignore),
        }
    }
}
