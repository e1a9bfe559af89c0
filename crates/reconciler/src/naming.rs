//! Deterministic child naming.
//!
//! Every name is a pure function of the parent's identity, except the
//! HelmRepository. Each parent names its own HelmRepository after the chart
//! repository it resolved. Two parents in one namespace that resolve to the
//! same repository collide on that name; the collision is tolerated and the
//! later writer's spec wins.

use fluxer_api::{FluxApp, HelmRelease, HelmRepository, ImagePolicy, ImageRepository, Resource};

use crate::desired::OCI_SCHEME;
use crate::error::{Error, Result};

const CHART_SUFFIX: &str = "-chart";

pub fn image_repository_name(parent: &str) -> String {
    format!("{parent}{CHART_SUFFIX}")
}

pub fn image_policy_name(parent: &str) -> String {
    format!("{parent}{CHART_SUFFIX}")
}

/// Name for the HelmRepository serving `resolved_repository`.
///
/// The scheme is dropped, the rest lower-cased, and every character that is
/// not ASCII alphanumeric becomes `-`.
pub fn helm_repository_name(resolved_repository: &str) -> String {
    resolved_repository
        .strip_prefix(OCI_SCHEME)
        .unwrap_or(resolved_repository)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

pub fn helm_release_name(parent: &str) -> String {
    parent.to_string()
}

type NameFn = fn(&FluxApp) -> Option<String>;

fn image_repository_for(app: &FluxApp) -> Option<String> {
    Some(image_repository_name(app.name()))
}

fn image_policy_for(app: &FluxApp) -> Option<String> {
    Some(image_policy_name(app.name()))
}

fn helm_repository_for(app: &FluxApp) -> Option<String> {
    let repository = app.status.chart.repository.as_str();
    (!repository.is_empty()).then(|| helm_repository_name(repository))
}

fn helm_release_for(app: &FluxApp) -> Option<String> {
    Some(helm_release_name(app.name()))
}

/// Child kinds in chain order with their naming rule.
const NAMING_TABLE: [(&str, NameFn); 4] = [
    (ImageRepository::KIND, image_repository_for),
    (ImagePolicy::KIND, image_policy_for),
    (HelmRepository::KIND, helm_repository_for),
    (HelmRelease::KIND, helm_release_for),
];

/// Name of the child of `kind` for `app`.
///
/// `Ok(None)` means the name depends on upstream data that has not been
/// resolved yet.
///
/// # Errors
///
/// Returns [`Error::UnsupportedKind`] if `kind` is not a child kind.
pub fn child_name(kind: &str, app: &FluxApp) -> Result<Option<String>> {
    NAMING_TABLE
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, name)| name(app))
        .ok_or_else(|| Error::unsupported_kind(kind))
}

/// Names of every child of `app`, in chain order.
pub fn child_names(app: &FluxApp) -> Vec<(&'static str, Option<String>)> {
    NAMING_TABLE
        .iter()
        .map(|(kind, name)| (*kind, name(app)))
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parent_derived_names() {
        let app = FluxApp::new("podinfo", "apps", "oci://ghcr.io/stefanprodan/charts/podinfo");
        assert_eq!(child_name("ImageRepository", &app).ok().flatten().as_deref(), Some("podinfo-chart"));
        assert_eq!(child_name("ImagePolicy", &app).ok().flatten().as_deref(), Some("podinfo-chart"));
        assert_eq!(child_name("HelmRelease", &app).ok().flatten().as_deref(), Some("podinfo"));
    }

    #[test]
    fn test_helm_repository_waits_for_resolution() {
        let mut app = FluxApp::new("podinfo", "apps", "oci://ghcr.io/stefanprodan/charts/podinfo");
        assert_eq!(child_name("HelmRepository", &app).ok(), Some(None));

        app.status.chart.repository = "oci://ghcr.io/stefanprodan/charts".to_string();
        assert_eq!(
            child_name("HelmRepository", &app).ok().flatten().as_deref(),
            Some("ghcr-io-stefanprodan-charts")
        );
    }

    #[test]
    fn test_helm_repository_name_sanitizes() {
        assert_eq!(
            helm_repository_name("oci://123.dkr.ecr.eu-west-1.amazonaws.com/Charts_v2"),
            "123-dkr-ecr-eu-west-1-amazonaws-com-charts-v2"
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let app = FluxApp::new("podinfo", "apps", "oci://ghcr.io/org/podinfo");
        assert!(matches!(child_name("Deployment", &app), Err(Error::UnsupportedKind { .. })));
    }

    #[test]
    fn test_child_names_follow_chain_order() {
        let app = FluxApp::new("podinfo", "apps", "oci://ghcr.io/org/podinfo");
        let kinds: Vec<&str> = child_names(&app).into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec!["ImageRepository", "ImagePolicy", "HelmRepository", "HelmRelease"]);
    }

    proptest! {
        #[test]
        fn prop_names_are_deterministic(name in "[a-z][a-z0-9-]{0,40}", repo in "[a-zA-Z0-9./_-]{1,60}") {
            let mut app = FluxApp::new(name.clone(), "ns", format!("oci://{repo}"));
            app.status.chart.repository = format!("oci://{repo}");

            prop_assert_eq!(child_names(&app), child_names(&app.clone()));
            prop_assert_eq!(image_repository_name(&name), format!("{name}-chart"));
        }

        #[test]
        fn prop_helm_repository_name_is_dns_safe(repo in "\\PC{0,80}") {
            let name = helm_repository_name(&repo);
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert_eq!(helm_repository_name(&repo), name);
        }
    }
}
