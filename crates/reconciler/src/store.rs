//! Generic fetch-or-initialize and commit over registered kinds.
//!
//! A [`ManagedResource`] remembers the serialized form of the object as it
//! was fetched. Committing sends the difference between that baseline and the
//! mutated object as a merge patch, or creates the object if it never existed.

use std::sync::Arc;

use fluxer_api::{ObjectKey, OwnerReference, Resource};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::client::ResourceClient;
use crate::error::{Error, Result};
use crate::patch;
use crate::registry::KindRegistry;

/// A fetched or freshly initialized object plus its patch baseline.
#[derive(Debug, Clone)]
pub struct ManagedResource<K: Resource> {
    object: K,
    baseline: Option<Value>,
}

impl<K: Resource> ManagedResource<K> {
    /// Whether the object existed in the store when it was fetched.
    pub const fn existed(&self) -> bool {
        self.baseline.is_some()
    }

    pub const fn object(&self) -> &K {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut K {
        &mut self.object
    }

    pub fn into_object(self) -> K {
        self.object
    }

    fn refresh(&mut self, stored: Value) -> Result<()> {
        self.object = decode(stored)?;
        self.baseline = Some(encode(&self.object)?);
        Ok(())
    }
}

/// What a commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Created,
    Patched,
    /// The object already matched its baseline; nothing was sent.
    Unchanged,
}

impl CommitOutcome {
    /// Whether a write request was issued.
    pub const fn wrote(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Typed access to the object store.
#[derive(Clone)]
pub struct ManagedResourceStore {
    client: Arc<dyn ResourceClient>,
    registry: Arc<KindRegistry>,
}

impl ManagedResourceStore {
    pub fn new(client: Arc<dyn ResourceClient>, registry: Arc<KindRegistry>) -> Self {
        Self { client, registry }
    }

    /// Fetch an object, or initialize a zero value if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if `K` is not registered, the client fails for any
    /// reason other than absence, or the stored document does not decode.
    #[instrument(skip_all, fields(kind = K::KIND, key = %key))]
    pub async fn fetch<K: Resource>(&self, key: &ObjectKey) -> Result<ManagedResource<K>> {
        let info = self.registry.info_for::<K>()?;
        let stored = self
            .client
            .get(info, key)
            .await
            .map_err(|e| Error::from_client("get", K::KIND, key, e))?;

        match stored {
            Some(value) => {
                let object: K = decode(value)?;
                let baseline = encode(&object)?;
                Ok(ManagedResource {
                    object,
                    baseline: Some(baseline),
                })
            }
            None => {
                debug!("Object not found, initializing");
                let mut object = K::default();
                let metadata = object.metadata_mut();
                metadata.name.clone_from(&key.name);
                metadata.namespace.clone_from(&key.namespace);
                Ok(ManagedResource {
                    object,
                    baseline: None,
                })
            }
        }
    }

    /// List every object of kind `K`.
    ///
    /// # Errors
    ///
    /// Returns an error if `K` is not registered, the client fails, or a
    /// stored document does not decode.
    pub async fn list<K: Resource>(&self) -> Result<Vec<K>> {
        let info = self.registry.info_for::<K>()?;
        let values = self
            .client
            .list(info)
            .await
            .map_err(|e| Error::from_client("list", K::KIND, &ObjectKey::new("*", "*"), e))?;
        values.into_iter().map(decode).collect()
    }

    /// Persist everything but the status: create if new, else patch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the write raced with another writer,
    /// or another error if the client or conversion fails.
    #[instrument(skip_all, fields(kind = K::KIND, key = %record.object.key()))]
    pub async fn commit<K: Resource>(&self, record: &mut ManagedResource<K>) -> Result<CommitOutcome> {
        let info = self.registry.info_for::<K>()?;
        let key = record.object.key();
        let current = encode(&record.object)?;

        let (stored, outcome) = match &record.baseline {
            None => {
                let created = self
                    .client
                    .create(info, current)
                    .await
                    .map_err(|e| Error::from_client("create", K::KIND, &key, e))?;
                info!("Created object");
                (created, CommitOutcome::Created)
            }
            Some(baseline) => {
                let diff = patch::without_status(patch::merge_diff(baseline, &current));
                if patch::is_empty(&diff) {
                    debug!("Object unchanged");
                    return Ok(CommitOutcome::Unchanged);
                }
                let patched = self
                    .client
                    .patch(info, &key, &diff)
                    .await
                    .map_err(|e| Error::from_client("patch", K::KIND, &key, e))?;
                info!("Patched object");
                (patched, CommitOutcome::Patched)
            }
        };

        record.refresh(stored)?;
        Ok(outcome)
    }

    /// Persist only the status of an existing object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the object was never stored, or an
    /// error if the client or conversion fails.
    #[instrument(skip_all, fields(kind = K::KIND, key = %record.object.key()))]
    pub async fn commit_status<K: Resource>(
        &self,
        record: &mut ManagedResource<K>,
    ) -> Result<CommitOutcome> {
        let info = self.registry.info_for::<K>()?;
        let key = record.object.key();
        let Some(baseline) = &record.baseline else {
            return Err(Error::invalid_input(format!(
                "cannot write status of {} '{key}' before it exists",
                K::KIND
            )));
        };

        let diff = patch::status_only(patch::merge_diff(baseline, &encode(&record.object)?));
        if patch::is_empty(&diff) {
            debug!("Status unchanged");
            return Ok(CommitOutcome::Unchanged);
        }

        let stored = self
            .client
            .patch_status(info, &key, &diff)
            .await
            .map_err(|e| Error::from_client("patch status of", K::KIND, &key, e))?;
        debug!("Patched status");

        record.refresh(stored)?;
        Ok(CommitOutcome::Patched)
    }

    /// Mark `owner` as the controlling owner of `child`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnerReference`] if the owner has no uid, lives in a
    /// different namespace, or the child is controlled by another object.
    pub fn set_controller_reference<C: Resource, O: Resource>(
        &self,
        child: &mut C,
        owner: &O,
    ) -> Result<()> {
        let info = self.registry.info_for::<O>()?;
        let child_key = child.key();
        let owner_meta = owner.metadata();

        let uid = owner_meta
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| {
                Error::owner_reference(
                    child_key.clone(),
                    format!("owner {} '{}' has no uid", O::KIND, owner.key()),
                )
            })?;

        if owner_meta.namespace != child_key.namespace {
            return Err(Error::owner_reference(
                child_key,
                format!("owner namespace '{}' differs", owner_meta.namespace),
            ));
        }

        let metadata = child.metadata_mut();
        if let Some(existing) = metadata.controller_reference() {
            if existing.uid != uid {
                return Err(Error::owner_reference(
                    child_key,
                    format!("already controlled by {} '{}'", existing.kind, existing.name),
                ));
            }
        }

        let reference = OwnerReference {
            api_version: info.api_version.to_string(),
            kind: info.kind.to_string(),
            name: owner_meta.name.clone(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        };
        match metadata.owner_references.iter_mut().find(|r| r.uid == uid) {
            Some(slot) => *slot = reference,
            None => metadata.owner_references.push(reference),
        }
        Ok(())
    }
}

fn encode<K: Resource>(object: &K) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| Error::serialization(K::KIND, e.to_string()))
}

fn decode<K: Resource>(value: Value) -> Result<K> {
    serde_json::from_value(value).map_err(|e| Error::serialization(K::KIND, e.to_string()))
}
