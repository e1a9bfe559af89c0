//! Projection of child observations into the parent status.

use fluxer_api::{
    ChartStatus, Condition, ConditionStatus, HasConditions, ImagePolicy, ImageRepository,
    PROGRESSING_REASON, READY, find_condition, set_condition,
};

use crate::desired::OCI_SCHEME;
use crate::error::{Error, Result};

const CANONICAL_IMAGE_FIELD: &str = "status.canonicalImageName";
const SPEC_IMAGE_FIELD: &str = "spec.image";
const LATEST_IMAGE_FIELD: &str = "status.latestImage";

/// Message used while the HelmRelease has not reported readiness.
pub const RELEASE_NOT_READY_MESSAGE: &str = "HelmRelease is not ready";

/// The image reference stage 1 resolved to.
///
/// The reflector's canonical name wins; until it reports one, the committed
/// `spec.image` stands in.
pub fn resolved_image(repository: &ImageRepository) -> (&'static str, &str) {
    repository
        .status
        .as_ref()
        .and_then(|status| status.canonical_image_name.as_deref())
        .filter(|name| !name.is_empty())
        .map_or((SPEC_IMAGE_FIELD, repository.spec.image.as_str()), |name| {
            (CANONICAL_IMAGE_FIELD, name)
        })
}

/// Record the chart repository and name resolved by stage 1.
///
/// # Errors
///
/// Returns [`Error::MalformedUpstreamData`] if the image reference has no
/// repository path or ends in `/`.
pub fn project_image_repository(repository: &ImageRepository, chart: &mut ChartStatus) -> Result<()> {
    let (field, image) = resolved_image(repository);
    if image.is_empty() {
        return Ok(());
    }

    let (dir, base) = image
        .rsplit_once('/')
        .filter(|(dir, base)| !dir.is_empty() && !base.is_empty())
        .ok_or_else(|| Error::malformed(field, image))?;

    chart.repository = format!("{OCI_SCHEME}{dir}");
    chart.name = base.to_string();
    Ok(())
}

/// Extract the tag of a `repository:tag` reference.
///
/// Only the last path segment is inspected, so registry ports are allowed.
///
/// # Errors
///
/// Returns [`Error::MalformedUpstreamData`] unless the last segment splits
/// into exactly two non-empty parts on `:`.
pub fn parse_image_tag(reference: &str) -> Result<&str> {
    let leaf = reference.rsplit('/').next().unwrap_or(reference);
    let mut parts = leaf.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(tag), None) if !name.is_empty() && !tag.is_empty() => Ok(tag),
        _ => Err(Error::malformed(LATEST_IMAGE_FIELD, reference)),
    }
}

/// Record the chart version selected by stage 2, if any.
///
/// # Errors
///
/// Returns [`Error::MalformedUpstreamData`] if `latestImage` has no tag.
pub fn project_image_policy(policy: &ImagePolicy, chart: &mut ChartStatus) -> Result<()> {
    let latest = policy
        .status
        .as_ref()
        .and_then(|status| status.latest_image.as_deref())
        .filter(|latest| !latest.is_empty());

    if let Some(latest) = latest {
        chart.version = parse_image_tag(latest)?.to_string();
    }
    Ok(())
}

/// Upsert one condition on `target`.
pub fn apply_condition<T: HasConditions + ?Sized>(target: &mut T, condition: Condition) {
    let mut conditions = target.conditions().to_vec();
    set_condition(&mut conditions, condition);
    target.set_conditions(conditions);
}

/// Copy the `type_` condition of `source` onto `target`, or `fallback` if
/// the source has none.
pub fn mirror_condition<T, S>(
    target: &mut T,
    type_: &str,
    source: Option<&S>,
    fallback: Condition,
    observed_generation: Option<i64>,
) where
    T: HasConditions + ?Sized,
    S: HasConditions,
{
    let mirrored = source
        .and_then(|source| find_condition(source.conditions(), type_))
        .cloned()
        .unwrap_or(fallback)
        .with_observed_generation(observed_generation);
    apply_condition(target, mirrored);
}

/// Fallback Ready condition while the release has not reported.
pub fn release_not_ready() -> Condition {
    Condition::new(
        READY,
        ConditionStatus::False,
        PROGRESSING_REASON,
        RELEASE_NOT_READY_MESSAGE,
    )
}

#[cfg(test)]
mod tests {
    use fluxer_api::{
        FluxAppStatus, HelmRelease, HelmReleaseStatus, ImagePolicyStatus, ImageRepositorySpec,
        ImageRepositoryStatus,
    };

    use super::*;

    fn repository(image: &str, canonical: Option<&str>) -> ImageRepository {
        ImageRepository {
            spec: ImageRepositorySpec {
                image: image.to_string(),
                ..Default::default()
            },
            status: canonical.map(|name| ImageRepositoryStatus {
                canonical_image_name: Some(name.to_string()),
                conditions: Vec::new(),
            }),
            ..Default::default()
        }
    }

    fn policy(latest: Option<&str>) -> ImagePolicy {
        ImagePolicy {
            status: Some(ImagePolicyStatus {
                latest_image: latest.map(ToString::to_string),
                conditions: Vec::new(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_spec_image_projects_until_canonical_name_reported() {
        let mut chart = ChartStatus::default();
        let repo = repository("ghcr.io/stefanprodan/charts/podinfo", None);
        assert!(project_image_repository(&repo, &mut chart).is_ok());
        assert_eq!(chart.repository, "oci://ghcr.io/stefanprodan/charts");
        assert_eq!(chart.name, "podinfo");
    }

    #[test]
    fn test_canonical_name_wins() {
        let mut chart = ChartStatus::default();
        let repo = repository("docker.io/nginx", Some("index.docker.io/library/nginx"));
        assert!(project_image_repository(&repo, &mut chart).is_ok());
        assert_eq!(chart.repository, "oci://index.docker.io/library");
        assert_eq!(chart.name, "nginx");
    }

    #[test]
    fn test_image_without_path_is_malformed() {
        let mut chart = ChartStatus::default();
        let result = project_image_repository(&repository("ghcr.io", None), &mut chart);
        assert!(matches!(
            result,
            Err(Error::MalformedUpstreamData { field: "spec.image", .. })
        ));
        assert!(chart.repository.is_empty());
    }

    #[test]
    fn test_parse_image_tag() {
        assert_eq!(parse_image_tag("ghcr.io/org/podinfo:6.5.0").ok(), Some("6.5.0"));
        assert_eq!(parse_image_tag("localhost:5000/org/podinfo:1.0.0").ok(), Some("1.0.0"));
        assert!(parse_image_tag("ghcr.io/org/podinfo").is_err());
        assert!(parse_image_tag("ghcr.io/org/podinfo:").is_err());
        assert!(parse_image_tag("ghcr.io/org/podinfo:1:2").is_err());
        assert!(parse_image_tag("localhost:5000/org/podinfo").is_err());
    }

    #[test]
    fn test_policy_without_latest_image_leaves_version_unset() {
        let mut chart = ChartStatus::default();
        assert!(project_image_policy(&policy(None), &mut chart).is_ok());
        assert!(project_image_policy(&ImagePolicy::default(), &mut chart).is_ok());
        assert!(chart.version.is_empty());
    }

    #[test]
    fn test_policy_projects_tag() {
        let mut chart = ChartStatus::default();
        assert!(project_image_policy(&policy(Some("ghcr.io/org/podinfo:6.5.0")), &mut chart).is_ok());
        assert_eq!(chart.version, "6.5.0");
    }

    #[test]
    fn test_mirror_uses_fallback_without_source_condition() {
        let mut status = FluxAppStatus::default();
        let release = HelmRelease::default();

        mirror_condition(&mut status, READY, Some(&release), release_not_ready(), Some(3));

        let ready = find_condition(&status.conditions, READY);
        assert_eq!(ready.map(|c| c.status), Some(ConditionStatus::False));
        assert_eq!(ready.map(|c| c.reason.as_str()), Some(PROGRESSING_REASON));
        assert_eq!(ready.map(|c| c.message.as_str()), Some(RELEASE_NOT_READY_MESSAGE));
        assert_eq!(ready.and_then(|c| c.observed_generation), Some(3));
    }

    #[test]
    fn test_mirror_copies_source_condition() {
        let mut status = FluxAppStatus::default();
        let release = HelmRelease {
            status: Some(HelmReleaseStatus {
                conditions: vec![Condition::new(
                    READY,
                    ConditionStatus::True,
                    "InstallSucceeded",
                    "Helm install succeeded",
                )],
                last_attempted_revision: None,
            }),
            ..Default::default()
        };

        mirror_condition(&mut status, READY, Some(&release), release_not_ready(), None);

        let ready = find_condition(&status.conditions, READY);
        assert_eq!(ready.map(Condition::is_true), Some(true));
        assert_eq!(ready.map(|c| c.reason.as_str()), Some("InstallSucceeded"));
        assert_eq!(status.conditions.len(), 1);
    }
}
