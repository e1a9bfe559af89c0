//! Loading FluxApps from YAML manifests.

use std::path::Path;

use anyhow::{Context, Result, bail};
use fluxer_api::{FluxApp, Resource};
use serde::Deserialize;
use serde_json::Value;

/// Namespace assumed for documents that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Read every FluxApp from a manifest file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any document is not a
/// well-formed FluxApp.
pub fn load(path: &Path) -> Result<Vec<FluxApp>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse(&content).with_context(|| format!("Invalid manifest {}", path.display()))
}

/// Parse one or more `---`-separated FluxApp documents.
///
/// # Errors
///
/// Returns an error for a document of another kind, a FluxApp without a
/// name, or a document that does not match the FluxApp schema.
pub fn parse(content: &str) -> Result<Vec<FluxApp>> {
    let mut apps = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = Value::deserialize(document)
            .with_context(|| format!("document {index} is not valid YAML"))?;
        if value.is_null() {
            continue;
        }

        let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
        if kind != FluxApp::KIND {
            bail!("document {index} has kind '{kind}', expected '{}'", FluxApp::KIND);
        }

        let mut app: FluxApp = serde_json::from_value(value)
            .with_context(|| format!("document {index} is not a valid FluxApp"))?;
        if app.metadata.name.is_empty() {
            bail!("document {index} has no metadata.name");
        }
        if app.metadata.namespace.is_empty() {
            app.metadata.namespace = DEFAULT_NAMESPACE.to_string();
        }
        apps.push(app);
    }

    if apps.is_empty() {
        bail!("no FluxApp documents found");
    }
    Ok(apps)
}
