//! Kubernetes-style reconciliation of a FluxApp into its Flux objects.
//!
//! One [`FluxApp`](fluxer_api::FluxApp) is converged into an ordered chain of
//! four children:
//!
//! 1. `ImageRepository` scans the chart's OCI repository
//! 2. `ImagePolicy` picks the newest tag matching the version constraint
//! 3. `HelmRepository` points Flux at the resolved registry location
//! 4. `HelmRelease` installs the resolved chart version
//!
//! # Key Concepts
//!
//! ## Store
//!
//! [`ManagedResourceStore`] fetches an object or initializes a zero value,
//! remembers a baseline, and commits by create or merge patch. Kinds are
//! resolved through an injected [`KindRegistry`].
//!
//! ## Pipeline
//!
//! [`ReconciliationPipeline`] runs the stages in order. Each stage reads only
//! the parent spec and what earlier stages projected into the parent status.
//! A gate after stage 2 holds the chain back until the chart repository,
//! name and version are all known, returning a timed requeue instead of an
//! error.
//!
//! ## Lifecycle
//!
//! [`LifecycleController`] adds the finalizer on first sight and releases it
//! after cleanup once deletion is requested.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fluxer_api::ObjectKey;
//! use fluxer_reconciler::{InMemoryClient, ReconcilerBuilder};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Arc::new(InMemoryClient::new());
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_client(client)
//!         .build()
//!         .expect("valid configuration");
//!
//!     let outcome = reconciler.reconcile(&ObjectKey::new("apps", "podinfo")).await;
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod client;
pub mod desired;
pub mod error;
pub mod lifecycle;
pub mod r#loop;
pub mod memory;
pub mod naming;
pub mod patch;
pub mod pipeline;
pub mod reconciler;
pub mod registry;
pub mod status;
pub mod store;

// Re-export main types
pub use client::{ClientError, ClientResult, ResourceClient, TracingClient};
pub use desired::{OCI_SCHEME, Provider, StageDescriptor, infer_provider, split_source_url};
pub use error::{Error, Result};
pub use lifecycle::{CleanupHook, FinalizerState, LifecycleAction, LifecycleController, NoopCleanup};
pub use memory::{InMemoryClient, Operation, Verb};
pub use naming::{child_name, child_names};
pub use pipeline::{PipelineOutcome, ReconciliationPipeline};
pub use r#loop::{CycleSummary, LoopConfig, LoopStopper, ReconciliationLoop, error_backoff};
pub use reconciler::{ReconcileOutcome, Reconciler, ReconcilerBuilder};
pub use registry::{KindInfo, KindRegistry};
pub use store::{CommitOutcome, ManagedResource, ManagedResourceStore};
