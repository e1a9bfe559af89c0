//! The object store capability the reconciler consumes.

use std::sync::Arc;

use async_trait::async_trait;
use fluxer_api::ObjectKey;
use serde_json::Value;
use thiserror::Error;

use crate::registry::KindInfo;

/// Result alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Failures reported by a [`ResourceClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("object not found")]
    NotFound,

    #[error("object already exists")]
    AlreadyExists,

    #[error("write conflict: {reason}")]
    Conflict { reason: String },

    #[error("invalid object: {reason}")]
    Invalid { reason: String },

    #[error("transport failure: {reason}")]
    Transport { reason: String },
}

/// Access to an external object store.
///
/// Objects travel as JSON documents. Absence is `Ok(None)` from
/// [`ResourceClient::get`], never an error.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch one object.
    async fn get(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<Option<Value>>;

    /// List all objects of a kind.
    async fn list(&self, kind: &KindInfo) -> ClientResult<Vec<Value>>;

    /// Create an object. Any `status` in the document is ignored.
    async fn create(&self, kind: &KindInfo, object: Value) -> ClientResult<Value>;

    /// Apply a JSON merge patch (RFC 7386) to everything except `status`.
    async fn patch(&self, kind: &KindInfo, key: &ObjectKey, patch: &Value) -> ClientResult<Value>;

    /// Apply a JSON merge patch to the `status` sub-resource only.
    async fn patch_status(
        &self,
        kind: &KindInfo,
        key: &ObjectKey,
        patch: &Value,
    ) -> ClientResult<Value>;

    /// Request deletion. Objects with finalizers are only marked as terminating.
    async fn delete(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<()>;
}

#[async_trait]
impl<C: ResourceClient + ?Sized> ResourceClient for Arc<C> {
    async fn get(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<Option<Value>> {
        (**self).get(kind, key).await
    }

    async fn list(&self, kind: &KindInfo) -> ClientResult<Vec<Value>> {
        (**self).list(kind).await
    }

    async fn create(&self, kind: &KindInfo, object: Value) -> ClientResult<Value> {
        (**self).create(kind, object).await
    }

    async fn patch(&self, kind: &KindInfo, key: &ObjectKey, patch: &Value) -> ClientResult<Value> {
        (**self).patch(kind, key, patch).await
    }

    async fn patch_status(
        &self,
        kind: &KindInfo,
        key: &ObjectKey,
        patch: &Value,
    ) -> ClientResult<Value> {
        (**self).patch_status(kind, key, patch).await
    }

    async fn delete(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<()> {
        (**self).delete(kind, key).await
    }
}

/// A wrapper that adds tracing to a client.
pub struct TracingClient<C: ResourceClient> {
    inner: C,
}

impl<C: ResourceClient> TracingClient<C> {
    /// Create a new tracing client.
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: ResourceClient> ResourceClient for TracingClient<C> {
    async fn get(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<Option<Value>> {
        tracing::trace!(kind = kind.kind, key = %key, "Getting object");
        let result = self.inner.get(kind, key).await;
        if let Ok(None) = result {
            tracing::trace!(kind = kind.kind, key = %key, "Object not found");
        }
        result
    }

    async fn list(&self, kind: &KindInfo) -> ClientResult<Vec<Value>> {
        tracing::trace!(kind = kind.kind, "Listing objects");
        self.inner.list(kind).await
    }

    async fn create(&self, kind: &KindInfo, object: Value) -> ClientResult<Value> {
        tracing::debug!(kind = kind.kind, "Creating object");
        self.inner.create(kind, object).await
    }

    async fn patch(&self, kind: &KindInfo, key: &ObjectKey, patch: &Value) -> ClientResult<Value> {
        tracing::debug!(kind = kind.kind, key = %key, patch = %patch, "Patching object");
        self.inner.patch(kind, key, patch).await
    }

    async fn patch_status(
        &self,
        kind: &KindInfo,
        key: &ObjectKey,
        patch: &Value,
    ) -> ClientResult<Value> {
        tracing::debug!(kind = kind.kind, key = %key, "Patching status");
        self.inner.patch_status(kind, key, patch).await
    }

    async fn delete(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<()> {
        tracing::debug!(kind = kind.kind, key = %key, "Deleting object");
        self.inner.delete(kind, key).await
    }
}
