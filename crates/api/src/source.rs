//! Source kinds: `HelmRepository`.

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::meta::ObjectMeta;
use crate::resource::managed_resource;

/// Repository type for OCI registries.
pub const OCI_REPOSITORY_TYPE: &str = "oci";

/// A Helm chart repository, here always an OCI registry location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRepository {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: HelmRepositorySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HelmRepositoryStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRepositorySpec {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRepositoryStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

managed_resource!(
    HelmRepository,
    HelmRepositorySpec,
    HelmRepositoryStatus,
    "source.toolkit.fluxcd.io/v1",
    "HelmRepository",
    "helmrepositories"
);
