//! Typed resources for the fluxer controller.
//!
//! - [`FluxApp`] is the parent resource a user writes.
//! - [`ImageRepository`], [`ImagePolicy`], [`HelmRepository`] and
//!   [`HelmRelease`] are the Flux objects derived from it.
//!
//! Child kinds only model the spec and status fields the controller writes or
//! reads; everything else about them belongs to their own controllers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod resource;

pub mod condition;
pub mod fluxapp;
pub mod helm;
pub mod image;
pub mod meta;
pub mod source;

pub use condition::{
    Condition, ConditionStatus, HasConditions, DEPENDENCY_NOT_READY_REASON, PROGRESSING_REASON,
    READY, RECONCILIATION_FAILED_REASON, find_condition, set_condition,
};
pub use fluxapp::{Chart, ChartStatus, FluxApp, FluxAppSpec, FluxAppStatus, MATCH_ANY_VERSION};
pub use helm::{
    CrdPolicy, CrossNamespaceObjectReference, DriftDetection, DriftDetectionMode,
    HelmChartTemplate, HelmChartTemplateSpec, HelmRelease, HelmReleaseSpec, HelmReleaseStatus,
    IgnoreRule, Install, Upgrade,
};
pub use image::{
    ImagePolicy, ImagePolicyChoice, ImagePolicySpec, ImagePolicyStatus, ImageRepository,
    ImageRepositorySpec, ImageRepositoryStatus, SemVerPolicy,
};
pub use meta::{NamespacedObjectReference, ObjectKey, ObjectMeta, OwnerReference};
pub use resource::{ManagedObject, Resource, format_duration};
pub use source::{HelmRepository, HelmRepositorySpec, HelmRepositoryStatus, OCI_REPOSITORY_TYPE};
