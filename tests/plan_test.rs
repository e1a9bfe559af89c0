//! Integration tests for the `plan` and `names` commands.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::error::Error;
use std::io::Write;

use fluxer::cli::OutputFormat;
use fluxer::commands::{PlanOptions, names, plan, render};
use fluxer::fluxer_core::ControllerConfig;
use fluxer::manifest;
use serde_json::Value;

type TestResult = Result<(), Box<dyn Error>>;

const MANIFEST: &str = "\
apiVersion: apps.kloudy.uk/v1
kind: FluxApp
metadata:
  name: podinfo
  namespace: apps
spec:
  chart:
    repository: oci://ghcr.io/stefanprodan/charts/podinfo
    version: '>=6.0.0'
";

fn kinds(objects: &[Value]) -> Vec<&str> {
    objects
        .iter()
        .filter_map(|object| object.get("kind").and_then(Value::as_str))
        .collect()
}

fn object<'a>(objects: &'a [Value], kind: &str) -> Option<&'a Value> {
    objects
        .iter()
        .find(|object| object.get("kind").and_then(Value::as_str) == Some(kind))
}

fn ready_status(objects: &[Value]) -> Option<(String, String)> {
    let conditions = object(objects, "FluxApp")?
        .pointer("/status/conditions")?
        .as_array()?;
    let ready = conditions
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"))?;
    Some((
        ready.get("status")?.as_str()?.to_string(),
        ready.get("reason")?.as_str()?.to_string(),
    ))
}

#[tokio::test]
async fn given_manifest_file_when_plan_without_upstream_then_chain_stops_at_gate() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(MANIFEST.as_bytes())?;
    let apps = manifest::load(file.path())?;

    let objects = plan(apps, &PlanOptions::default(), ControllerConfig::default()).await?;

    assert_eq!(kinds(&objects), vec!["FluxApp", "ImagePolicy", "ImageRepository"]);
    assert_eq!(
        ready_status(&objects),
        Some(("False".to_string(), "DependencyNotReady".to_string()))
    );
    let finalizers = object(&objects, "FluxApp")
        .and_then(|app| app.pointer("/metadata/finalizers"))
        .cloned();
    assert!(finalizers.is_some_and(|f| f.as_array().is_some_and(|f| !f.is_empty())));
    Ok(())
}

#[tokio::test]
async fn given_latest_image_when_plan_then_release_is_created_but_not_ready() -> TestResult {
    let apps = manifest::parse(MANIFEST)?;
    let options = PlanOptions {
        latest_image: Some("ghcr.io/stefanprodan/charts/podinfo:6.5.0".to_string()),
        ready: false,
    };

    let objects = plan(apps, &options, ControllerConfig::default()).await?;

    assert_eq!(
        kinds(&objects),
        vec!["FluxApp", "HelmRelease", "HelmRepository", "ImagePolicy", "ImageRepository"]
    );
    let release = object(&objects, "HelmRelease").ok_or("release missing")?;
    assert_eq!(
        release.pointer("/spec/chart/spec/version").and_then(Value::as_str),
        Some("6.5.0")
    );
    assert_eq!(
        ready_status(&objects),
        Some(("False".to_string(), "Progressing".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn given_ready_release_when_plan_then_fluxapp_reports_ready() -> TestResult {
    let apps = manifest::parse(MANIFEST)?;
    let options = PlanOptions {
        latest_image: Some("ghcr.io/stefanprodan/charts/podinfo:6.5.0".to_string()),
        ready: true,
    };

    let objects = plan(apps, &options, ControllerConfig::default()).await?;

    assert_eq!(
        ready_status(&objects),
        Some(("True".to_string(), "InstallSucceeded".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn given_two_apps_on_one_repository_when_plan_then_both_get_releases() -> TestResult {
    let second = MANIFEST.replace("name: podinfo", "name: podinfo-canary");
    let apps = manifest::parse(&format!("{MANIFEST}---\n{second}"))?;
    let options = PlanOptions {
        latest_image: Some("ghcr.io/stefanprodan/charts/podinfo:6.5.0".to_string()),
        ready: false,
    };

    let objects = plan(apps, &options, ControllerConfig::default()).await?;

    assert_eq!(kinds(&objects).iter().filter(|k| **k == "HelmRelease").count(), 2);
    assert_eq!(kinds(&objects).iter().filter(|k| **k == "HelmRepository").count(), 1);
    Ok(())
}

#[tokio::test]
async fn given_plan_result_when_rendered_as_json_then_output_is_an_array() -> TestResult {
    let apps = manifest::parse(MANIFEST)?;
    let objects = plan(apps, &PlanOptions::default(), ControllerConfig::default()).await?;

    let rendered = render(&objects, OutputFormat::Json)?;
    let parsed: Value = serde_json::from_str(&rendered)?;

    assert_eq!(parsed.as_array().map(Vec::len), Some(objects.len()));
    Ok(())
}

#[test]
fn given_explicit_repository_when_names_then_source_name_follows_it() -> TestResult {
    let app = manifest::parse(MANIFEST)?.remove(0);

    let names = names(app, Some("oci://registry.example.com:5000/Team/Charts"))?;

    assert_eq!(
        names.get(2),
        Some(&(
            "HelmRepository",
            Some("apps/registry-example-com-5000-team-charts".to_string())
        ))
    );
    Ok(())
}

#[test]
fn given_http_source_when_names_then_error_is_reported() {
    let manifest = MANIFEST.replace("oci://", "https://");
    let app = manifest::parse(&manifest).ok().and_then(|mut apps| apps.pop());

    assert!(app.is_some_and(|app| names(app, None).is_err()));
}

#[test]
fn given_missing_file_when_loading_then_error_names_the_path() {
    let result = manifest::load(std::path::Path::new("/nonexistent/fluxapps.yaml"));

    assert!(result.is_err_and(|e| e.to_string().contains("/nonexistent/fluxapps.yaml")));
}
