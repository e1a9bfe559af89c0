//! Desired child specs, built from the parent spec and its projected status.

use std::fmt;

use fluxer_api::{
    CrdPolicy, CrossNamespaceObjectReference, DriftDetection, DriftDetectionMode, FluxApp,
    HelmChartTemplate, HelmChartTemplateSpec, HelmRelease, HelmReleaseSpec, HelmRepository,
    HelmRepositorySpec, IgnoreRule, ImagePolicy, ImagePolicyChoice, ImagePolicySpec,
    ImageRepository, ImageRepositorySpec, Install, ManagedObject, NamespacedObjectReference,
    OCI_REPOSITORY_TYPE, ObjectKey, Resource, SemVerPolicy, Upgrade, format_duration,
};
use fluxer_core::ControllerConfig;
use url::Url;

use crate::error::{Error, Result};
use crate::naming;

/// The only scheme a chart repository may use.
pub const OCI_SCHEME: &str = "oci://";

const SCHEME_SEPARATOR: &str = "://";

/// Paths drift detection leaves alone so autoscalers can own them.
const DRIFT_IGNORED_PATHS: [&str; 1] = ["/spec/replicas"];

/// Registry credential provider for image scanning and chart pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
    Generic,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infer the provider from the host of a scheme-qualified repository URL.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `repository` is not a URL.
pub fn infer_provider(repository: &str) -> Result<Provider> {
    let url = Url::parse(repository)
        .map_err(|e| Error::invalid_input(format!("invalid repository URL '{repository}': {e}")))?;
    let host = url.host_str().unwrap_or_default();

    let provider = if host.contains("amazonaws.com") {
        Provider::Aws
    } else if host.contains("azurecr.io") {
        Provider::Azure
    } else if host.contains("gcr.io") {
        Provider::Gcp
    } else {
        Provider::Generic
    };
    Ok(provider)
}

/// Strip the `oci://` scheme from a source URL.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless the URL contains exactly one
/// scheme separator and uses the `oci` scheme.
pub fn split_source_url(source_url: &str) -> Result<&str> {
    let mut parts = source_url.split(SCHEME_SEPARATOR);
    let (Some(scheme), Some(image), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::invalid_input(format!(
            "invalid chart repository URL: {source_url}"
        )));
    };

    if format!("{scheme}{SCHEME_SEPARATOR}") != OCI_SCHEME {
        return Err(Error::invalid_input(format!(
            "chart repository must use the {OCI_SCHEME} scheme: {source_url}"
        )));
    }
    if image.is_empty() {
        return Err(Error::invalid_input(format!(
            "chart repository has no image path: {source_url}"
        )));
    }
    Ok(image)
}

/// Identity and desired spec of one chain stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDescriptor<K: ManagedObject> {
    pub key: ObjectKey,
    pub spec: K::Spec,
}

impl<K: ManagedObject> StageDescriptor<K> {
    pub const fn kind(&self) -> &'static str {
        K::KIND
    }
}

/// Stage 1: scan the chart's OCI repository.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the parent's source URL is not a valid
/// `oci://` URL.
pub fn image_repository(
    app: &FluxApp,
    config: &ControllerConfig,
) -> Result<StageDescriptor<ImageRepository>> {
    let source_url = app.spec.chart.repository.as_str();
    let image = split_source_url(source_url)?;
    let provider = infer_provider(source_url)?;

    Ok(StageDescriptor {
        key: ObjectKey::new(app.namespace(), naming::image_repository_name(app.name())),
        spec: ImageRepositorySpec {
            image: image.to_string(),
            interval: format_duration(config.image_scan_interval),
            provider: provider.to_string(),
        },
    })
}

/// Stage 2: select the newest tag matching the version constraint.
pub fn image_policy(app: &FluxApp) -> StageDescriptor<ImagePolicy> {
    StageDescriptor {
        key: ObjectKey::new(app.namespace(), naming::image_policy_name(app.name())),
        spec: ImagePolicySpec {
            image_repository_ref: NamespacedObjectReference {
                name: naming::image_repository_name(app.name()),
                namespace: app.namespace().to_string(),
            },
            policy: ImagePolicyChoice {
                semver: Some(SemVerPolicy {
                    range: app.version_constraint().to_string(),
                }),
            },
        },
    }
}

/// Stage 3: the OCI source serving the resolved repository.
///
/// Returns `None` while the repository is unresolved.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the resolved repository is not a URL.
pub fn helm_repository(app: &FluxApp) -> Result<Option<StageDescriptor<HelmRepository>>> {
    let repository = app.status.chart.repository.as_str();
    if repository.is_empty() {
        return Ok(None);
    }

    Ok(Some(StageDescriptor {
        key: ObjectKey::new(app.namespace(), naming::helm_repository_name(repository)),
        spec: HelmRepositorySpec {
            url: repository.to_string(),
            type_: OCI_REPOSITORY_TYPE.to_string(),
            provider: infer_provider(repository)?.to_string(),
        },
    }))
}

/// Stage 4: install the resolved chart version.
pub fn helm_release(app: &FluxApp, config: &ControllerConfig) -> StageDescriptor<HelmRelease> {
    let chart = &app.status.chart;

    StageDescriptor {
        key: ObjectKey::new(app.namespace(), naming::helm_release_name(app.name())),
        spec: HelmReleaseSpec {
            chart: Some(HelmChartTemplate {
                spec: HelmChartTemplateSpec {
                    chart: chart.name.clone(),
                    version: chart.version.clone(),
                    source_ref: CrossNamespaceObjectReference {
                        kind: HelmRepository::KIND.to_string(),
                        name: naming::helm_repository_name(&chart.repository),
                        namespace: app.namespace().to_string(),
                    },
                },
            }),
            interval: format_duration(config.release_interval),
            release_name: app.name().to_string(),
            target_namespace: app.target_namespace().to_string(),
            drift_detection: Some(DriftDetection {
                mode: DriftDetectionMode::Enabled,
                ignore: vec![IgnoreRule {
                    paths: DRIFT_IGNORED_PATHS.iter().map(ToString::to_string).collect(),
                }],
            }),
            install: Some(Install {
                replace: true,
                crds: Some(CrdPolicy::CreateReplace),
                create_namespace: true,
            }),
            upgrade: Some(Upgrade {
                crds: Some(CrdPolicy::CreateReplace),
            }),
        },
    }
}
