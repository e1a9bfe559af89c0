//! The `FluxApp` parent resource.

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, HasConditions};
use crate::meta::ObjectMeta;
use crate::resource::Resource;

/// Version constraint used when the user does not give one.
pub const MATCH_ANY_VERSION: &str = "*";

/// FluxApp is the user-authored resource the controller converges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FluxApp {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: FluxAppSpec,
    #[serde(default)]
    pub status: FluxAppStatus,
}

/// Desired state of a FluxApp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxAppSpec {
    /// The chart to deploy.
    pub chart: Chart,

    /// Namespace the release installs into. Defaults to the FluxApp's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    /// Full repository URL including scheme, e.g. `oci://ghcr.io/stefanprodan/charts/podinfo`.
    pub repository: String,

    /// Semver version or constraint. Defaults to [`MATCH_ANY_VERSION`].
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    MATCH_ANY_VERSION.to_string()
}

/// Observed state of a FluxApp, rebuilt on every reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxAppStatus {
    #[serde(default)]
    pub chart: ChartStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Chart coordinates resolved from the image resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartStatus {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl ChartStatus {
    /// Names of the fields that have not been resolved yet.
    pub fn unresolved_fields(&self) -> Vec<&'static str> {
        [
            ("repository", &self.repository),
            ("name", &self.name),
            ("version", &self.version),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.unresolved_fields().is_empty()
    }
}

impl FluxApp {
    /// Create a FluxApp for a chart repository with the default version constraint.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ObjectMeta::named(name, namespace),
            spec: FluxAppSpec {
                chart: Chart {
                    repository: repository.into(),
                    version: default_version(),
                },
                target_namespace: None,
            },
            status: FluxAppStatus::default(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.spec.chart.version = version.into();
        self
    }

    #[must_use]
    pub fn with_target_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.spec.target_namespace = Some(namespace.into());
        self
    }

    /// The version constraint, falling back to match-anything when blank.
    pub fn version_constraint(&self) -> &str {
        let version = self.spec.chart.version.trim();
        if version.is_empty() {
            MATCH_ANY_VERSION
        } else {
            version
        }
    }

    /// Namespace the release installs into.
    pub fn target_namespace(&self) -> &str {
        self.spec
            .target_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(self.metadata.namespace.as_str())
    }
}

impl Resource for FluxApp {
    const API_VERSION: &'static str = "apps.kloudy.uk/v1";
    const KIND: &'static str = "FluxApp";
    const PLURAL: &'static str = "fluxapps";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasConditions for FluxAppStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.conditions = conditions;
    }
}

impl HasConditions for FluxApp {
    fn conditions(&self) -> &[Condition] {
        self.status.conditions()
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.status.set_conditions(conditions);
    }
}
