//! CLI command handlers.
//!
//! All commands run against an [`InMemoryClient`] seeded from a manifest:
//! - `plan` drives each FluxApp through the chain, optionally simulating the
//!   upstream controllers, and prints every resulting object
//! - `names` prints the derived child names
//! - `run` keeps the reconciliation loop going until Ctrl+C

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fluxer_api::{
    Condition, ConditionStatus, FluxApp, HelmRelease, ImagePolicy, ImageRepository, ObjectKey,
    READY, Resource,
};
use fluxer_core::ControllerConfig;
use fluxer_reconciler::{
    InMemoryClient, KindInfo, LoopConfig, ReconcileOutcome, Reconciler, ReconcilerBuilder,
    ReconciliationLoop, ResourceClient, TracingClient, child_names, desired, naming, status,
};
use serde_json::{Value, json};
use tokio::signal;
use tracing::{error, info};

use crate::cli::{Commands, OutputFormat};
use crate::manifest;

/// Upstream behaviour simulated during `plan`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Reference the image policy reports as `latestImage`.
    pub latest_image: Option<String>,
    /// Whether the Helm release reports Ready.
    pub ready: bool,
}

/// Execute a CLI command.
///
/// This is the main command dispatcher that routes to the appropriate handler.
///
/// # Errors
///
/// Returns an error if configuration or the manifest cannot be loaded, or a
/// reconciliation fails.
pub async fn execute_command(command: Commands, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        Commands::Plan {
            file,
            latest_image,
            ready,
            output,
        } => {
            let options = PlanOptions {
                latest_image,
                ready,
            };
            cmd_plan(&file, &options, config_path.as_deref(), output).await
        }

        Commands::Names { file, repository } => cmd_names(&file, repository.as_deref()),

        Commands::Run { file } => cmd_run(&file, config_path.as_deref()).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<ControllerConfig> {
    ControllerConfig::load(path).context("Failed to load controller configuration")
}

/// Dry-run the chain and print the resulting objects.
async fn cmd_plan(
    file: &Path,
    options: &PlanOptions,
    config_path: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    let config = load_config(config_path)?;
    let apps = manifest::load(file)?;
    let objects = plan(apps, options, config).await?;
    println!("{}", render(&objects, output)?);
    Ok(())
}

/// Converge `apps` as far as `options` allow and return every stored object.
///
/// # Errors
///
/// Returns an error if any reconciliation fails.
pub async fn plan(
    apps: Vec<FluxApp>,
    options: &PlanOptions,
    config: ControllerConfig,
) -> Result<Vec<Value>> {
    let client = Arc::new(InMemoryClient::new());
    let reconciler = ReconcilerBuilder::new()
        .with_client(Arc::new(TracingClient::new(Arc::clone(&client))))
        .with_config(config)
        .build()
        .context("Failed to build reconciler")?;

    for app in apps {
        let key = app.key();
        seed(&client, app).await?;

        // Finalizer, then the chain up to the gate.
        reconcile(&reconciler, &key).await?;
        let mut outcome = reconcile(&reconciler, &key).await?;

        if let Some(reference) = &options.latest_image {
            let policy_key = ObjectKey::new(&key.namespace, naming::image_policy_name(&key.name));
            client
                .set_status(
                    &KindInfo::of::<ImagePolicy>(),
                    &policy_key,
                    json!({ "latestImage": reference }),
                )
                .await
                .with_context(|| format!("Failed to simulate image policy for {key}"))?;
            outcome = reconcile(&reconciler, &key).await?;
        }

        if options.ready && client.contains(HelmRelease::KIND, &key).await {
            client
                .set_status(
                    &KindInfo::of::<HelmRelease>(),
                    &key,
                    json!({ "conditions": [release_ready()] }),
                )
                .await
                .with_context(|| format!("Failed to simulate release readiness for {key}"))?;
            outcome = reconcile(&reconciler, &key).await?;
        }

        info!(app = %key, outcome = ?outcome, "Planned FluxApp");
    }

    Ok(client.snapshot().await)
}

async fn seed(client: &InMemoryClient, app: FluxApp) -> Result<()> {
    let key = app.key();
    let document = serde_json::to_value(app).context("Failed to encode FluxApp")?;
    client
        .create(&KindInfo::of::<FluxApp>(), document)
        .await
        .with_context(|| format!("Failed to store FluxApp {key}"))?;
    Ok(())
}

async fn reconcile(reconciler: &Reconciler, key: &ObjectKey) -> Result<ReconcileOutcome> {
    reconciler
        .reconcile(key)
        .await
        .with_context(|| format!("Reconciliation of {key} failed"))
}

fn release_ready() -> Condition {
    Condition::new(
        READY,
        ConditionStatus::True,
        "InstallSucceeded",
        "Helm install succeeded",
    )
}

/// Render objects as a YAML stream or a JSON array.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render(objects: &[Value], output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Json => {
            serde_json::to_string_pretty(objects).context("Failed to render JSON")
        }
        OutputFormat::Yaml => objects
            .iter()
            .map(|object| serde_yaml::to_string(object).context("Failed to render YAML"))
            .collect::<Result<Vec<_>>>()
            .map(|documents| documents.join("---\n")),
    }
}

/// Print the derived child names.
fn cmd_names(file: &Path, repository: Option<&str>) -> Result<()> {
    for app in manifest::load(file)? {
        for (kind, name) in names(app, repository)? {
            println!("{kind}\t{}", name.as_deref().unwrap_or("<unresolved>"));
        }
    }
    Ok(())
}

/// Child names for `app`, resolving the chart repository from `repository`
/// or, failing that, from the app's own source URL.
///
/// # Errors
///
/// Returns an error if the source URL is invalid.
pub fn names(
    mut app: FluxApp,
    repository: Option<&str>,
) -> Result<Vec<(&'static str, Option<String>)>> {
    match repository {
        Some(repository) => app.status.chart.repository = repository.to_string(),
        None => {
            let stage = desired::image_repository(&app, &ControllerConfig::default())
                .with_context(|| format!("Invalid FluxApp {}", app.key()))?;
            let image_repository = ImageRepository {
                spec: stage.spec,
                ..ImageRepository::default()
            };
            status::project_image_repository(&image_repository, &mut app.status.chart)
                .with_context(|| format!("Invalid FluxApp {}", app.key()))?;
        }
    }

    let key = app.key();
    Ok(child_names(&app)
        .into_iter()
        .map(|(kind, name)| (kind, name.map(|name| format!("{}/{name}", key.namespace))))
        .collect())
}

/// Run the reconciliation loop until Ctrl+C.
async fn cmd_run(file: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let apps = manifest::load(file)?;

    let client = Arc::new(InMemoryClient::new());
    for app in apps {
        seed(&client, app).await?;
    }

    let reconciler = ReconcilerBuilder::new()
        .with_client(Arc::new(TracingClient::new(Arc::clone(&client))))
        .with_config(config.clone())
        .build()
        .context("Failed to build reconciler")?;

    let mut runner = ReconciliationLoop::new(Arc::new(reconciler), LoopConfig::from(&config));
    let stopper = runner.stopper();
    let handle = tokio::spawn(async move { runner.run().await });

    info!("fluxer is running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, stopping"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
    stopper.stop();
    handle.await.context("Reconciliation loop panicked")?;

    println!("{}", render(&client.snapshot().await, OutputFormat::Yaml)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_yaml_separates_documents() {
        let objects = vec![json!({"kind": "A"}), json!({"kind": "B"})];
        let rendered = render(&objects, OutputFormat::Yaml).ok().unwrap_or_default();
        assert_eq!(rendered, "kind: A\n---\nkind: B\n");
    }

    #[test]
    fn test_names_derive_repository_from_source() {
        let app = FluxApp::new("podinfo", "apps", "oci://ghcr.io/stefanprodan/charts/podinfo");
        let names = names(app, None).ok().unwrap_or_default();
        assert_eq!(
            names,
            vec![
                ("ImageRepository", Some("apps/podinfo-chart".to_string())),
                ("ImagePolicy", Some("apps/podinfo-chart".to_string())),
                ("HelmRepository", Some("apps/ghcr-io-stefanprodan-charts".to_string())),
                ("HelmRelease", Some("apps/podinfo".to_string())),
            ]
        );
    }
}
