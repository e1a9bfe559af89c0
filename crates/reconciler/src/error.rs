//! Error types for the reconciler crate.

use fluxer_api::ObjectKey;
use thiserror::Error;

use crate::client::ClientError;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// An unresolved upstream dependency is not an error; it is reported as
/// [`crate::ReconcileOutcome::IncompleteDependency`].
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A write raced with another writer; the next invocation retries.
    #[error("conflict writing {kind} '{key}': {reason}")]
    Conflict {
        kind: String,
        key: ObjectKey,
        reason: String,
    },

    /// The object store failed for a reason other than a conflict.
    #[error("{operation} {kind} '{key}' failed: {source}")]
    Client {
        operation: &'static str,
        kind: String,
        key: ObjectKey,
        #[source]
        source: ClientError,
    },

    /// A child reported data that cannot be interpreted.
    #[error("malformed upstream data in {field}: '{value}'")]
    MalformedUpstreamData { field: &'static str, value: String },

    /// The parent spec is invalid.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The kind was never registered with the store.
    #[error("kind '{kind}' is not registered")]
    UnsupportedKind { kind: String },

    /// An owner reference could not be set.
    #[error("cannot set owner of '{child}': {reason}")]
    OwnerReference { child: ObjectKey, reason: String },

    /// Conversion between typed and stored representations failed.
    #[error("failed to convert {kind}: {reason}")]
    Serialization { kind: String, reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Map a client failure, folding write races into [`Error::Conflict`].
    pub fn from_client(
        operation: &'static str,
        kind: impl Into<String>,
        key: &ObjectKey,
        source: ClientError,
    ) -> Self {
        let kind = kind.into();
        match source {
            ClientError::Conflict { reason } => Self::Conflict {
                kind,
                key: key.clone(),
                reason,
            },
            ClientError::AlreadyExists => Self::Conflict {
                kind,
                key: key.clone(),
                reason: "object already exists".to_string(),
            },
            ClientError::NotFound if operation != "get" => Self::Conflict {
                kind,
                key: key.clone(),
                reason: "object disappeared".to_string(),
            },
            source => Self::Client {
                operation,
                kind,
                key: key.clone(),
                source,
            },
        }
    }

    /// Create a malformed upstream data error.
    pub fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        Self::MalformedUpstreamData {
            field,
            value: value.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create an unsupported kind error.
    pub fn unsupported_kind(kind: impl Into<String>) -> Self {
        Self::UnsupportedKind { kind: kind.into() }
    }

    /// Create an owner reference error.
    pub fn owner_reference(child: ObjectKey, reason: impl Into<String>) -> Self {
        Self::OwnerReference {
            child,
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Serialization {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the error is a write conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ObjectKey {
        ObjectKey::new("apps", "podinfo")
    }

    #[test]
    fn test_conflict_mapping() {
        let err = Error::from_client(
            "patch",
            "HelmRelease",
            &key(),
            ClientError::Conflict {
                reason: "resource version mismatch".to_string(),
            },
        );
        assert!(err.is_conflict());
        assert!(err.to_string().contains("apps/podinfo"));
    }

    #[test]
    fn test_already_exists_is_conflict() {
        let err = Error::from_client("create", "HelmRelease", &key(), ClientError::AlreadyExists);
        assert!(err.is_conflict());
    }

    #[test]
    fn test_transport_is_not_conflict() {
        let err = Error::from_client(
            "get",
            "ImagePolicy",
            &key(),
            ClientError::Transport {
                reason: "connection reset".to_string(),
            },
        );
        assert!(!err.is_conflict());
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_malformed_display() {
        let err = Error::malformed("status.latestImage", "ghcr.io/org/app");
        assert!(err.to_string().contains("status.latestImage"));
        assert!(err.to_string().contains("ghcr.io/org/app"));
    }
}
