//! Image reflector kinds: `ImageRepository` and `ImagePolicy`.

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::meta::{NamespacedObjectReference, ObjectMeta};
use crate::resource::managed_resource;

/// Scans an OCI registry repository for tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRepository {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ImageRepositorySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ImageRepositoryStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRepositorySpec {
    /// Image reference without scheme, e.g. `ghcr.io/org/charts/app`.
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepositoryStatus {
    /// Fully resolved image name reported by the reflector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

managed_resource!(
    ImageRepository,
    ImageRepositorySpec,
    ImageRepositoryStatus,
    "image.toolkit.fluxcd.io/v1beta2",
    "ImageRepository",
    "imagerepositories"
);

/// Selects the latest tag of an image repository matching a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePolicy {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ImagePolicySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ImagePolicyStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicySpec {
    #[serde(default)]
    pub image_repository_ref: NamespacedObjectReference,
    #[serde(default)]
    pub policy: ImagePolicyChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePolicyChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver: Option<SemVerPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemVerPolicy {
    pub range: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicyStatus {
    /// Latest selected reference in `repository:tag` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

managed_resource!(
    ImagePolicy,
    ImagePolicySpec,
    ImagePolicyStatus,
    "image.toolkit.fluxcd.io/v1beta2",
    "ImagePolicy",
    "imagepolicies"
);
