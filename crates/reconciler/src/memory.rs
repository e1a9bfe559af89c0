//! In-memory object store.
//!
//! Behaves like the subset of an API server the controller relies on:
//! server-assigned uids and resource versions, status as a separate
//! sub-resource, finalizer-gated deletion and owner-reference garbage
//! collection. It also records every write and can inject failures, which
//! makes it the backbone of the test suite and of `fluxer plan`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use fluxer_api::{ObjectKey, Resource};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::client::{ClientError, ClientResult, ResourceClient};
use crate::patch;
use crate::registry::KindInfo;

/// Write verbs recorded by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Create,
    Patch,
    PatchStatus,
    Delete,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: Verb,
    pub kind: String,
    pub key: ObjectKey,
}

#[derive(Debug)]
struct InjectedFailure {
    verb: Verb,
    kind: String,
    error: ClientError,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<(String, ObjectKey), Value>,
    operations: Vec<Operation>,
    failures: Vec<InjectedFailure>,
    resource_version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version = self.resource_version.saturating_add(1);
        self.resource_version.to_string()
    }

    fn take_failure(&mut self, verb: Verb, kind: &str) -> Option<ClientError> {
        let index = self
            .failures
            .iter()
            .position(|f| f.verb == verb && f.kind == kind)?;
        Some(self.failures.remove(index).error)
    }

    fn record(&mut self, verb: Verb, kind: &str, key: &ObjectKey) {
        self.operations.push(Operation {
            verb,
            kind: kind.to_string(),
            key: key.clone(),
        });
    }

    /// Remove an object and, transitively, everything it owns.
    fn remove_cascading(&mut self, entry: &(String, ObjectKey)) {
        let mut pending: Vec<String> = self
            .objects
            .remove(entry)
            .and_then(|object| uid_of(&object))
            .into_iter()
            .collect();

        while let Some(owner_uid) = pending.pop() {
            let owned: Vec<(String, ObjectKey)> = self
                .objects
                .iter()
                .filter(|(_, object)| is_owned_by(object, &owner_uid))
                .map(|(entry, _)| entry.clone())
                .collect();

            for entry in owned {
                if let Some(uid) = self.objects.remove(&entry).and_then(|o| uid_of(&o)) {
                    pending.push(uid);
                }
            }
        }
    }

    /// Complete a pending deletion once the last finalizer is gone.
    fn release_if_finalized(&mut self, entry: &(String, ObjectKey)) {
        let released = self
            .objects
            .get(entry)
            .is_some_and(|object| is_terminating(object) && finalizers_of(object).is_empty());
        if released {
            self.remove_cascading(entry);
        }
    }
}

/// In-memory [`ResourceClient`].
#[derive(Debug, Default)]
pub struct InMemoryClient {
    state: RwLock<State>,
}

impl InMemoryClient {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the status of an object, as the kind's own controller would.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if the object does not exist.
    pub async fn set_status(
        &self,
        kind: &KindInfo,
        key: &ObjectKey,
        status: Value,
    ) -> ClientResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let object = state
            .objects
            .get_mut(&(kind.kind.to_string(), key.clone()))
            .ok_or(ClientError::NotFound)?;
        if let Some(map) = object.as_object_mut() {
            map.insert("status".to_string(), status);
        }
        set_metadata_field(object, "resourceVersion", Value::String(version));
        Ok(())
    }

    /// Fetch an object as a typed resource.
    pub async fn get_as<K: Resource>(&self, key: &ObjectKey) -> Option<K> {
        let state = self.state.read().await;
        state
            .objects
            .get(&(K::KIND.to_string(), key.clone()))
            .and_then(|object| serde_json::from_value(object.clone()).ok())
    }

    /// Whether an object exists.
    pub async fn contains(&self, kind: &str, key: &ObjectKey) -> bool {
        let state = self.state.read().await;
        state.objects.contains_key(&(kind.to_string(), key.clone()))
    }

    /// All stored objects, ordered by kind then key.
    pub async fn snapshot(&self) -> Vec<Value> {
        let state = self.state.read().await;
        state.objects.values().cloned().collect()
    }

    /// Every write recorded so far.
    pub async fn operations(&self) -> Vec<Operation> {
        self.state.read().await.operations.clone()
    }

    /// Number of recorded writes with the given verb.
    pub async fn count(&self, verb: Verb) -> usize {
        let state = self.state.read().await;
        state.operations.iter().filter(|op| op.verb == verb).count()
    }

    pub async fn clear_operations(&self) {
        self.state.write().await.operations.clear();
    }

    /// Make the next `verb` on `kind` fail with `error`.
    pub async fn fail_next(&self, verb: Verb, kind: &str, error: ClientError) {
        self.state.write().await.failures.push(InjectedFailure {
            verb,
            kind: kind.to_string(),
            error,
        });
    }
}

#[async_trait]
impl ResourceClient for InMemoryClient {
    async fn get(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<Option<Value>> {
        let state = self.state.read().await;
        Ok(state.objects.get(&(kind.kind.to_string(), key.clone())).cloned())
    }

    async fn list(&self, kind: &KindInfo) -> ClientResult<Vec<Value>> {
        let state = self.state.read().await;
        Ok(state
            .objects
            .iter()
            .filter(|((k, _), _)| k == kind.kind)
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, kind: &KindInfo, object: Value) -> ClientResult<Value> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(Verb::Create, kind.kind) {
            return Err(error);
        }

        let Value::Object(mut map) = object else {
            return Err(ClientError::Invalid {
                reason: "object must be a JSON map".to_string(),
            });
        };
        let key = key_of(&map).ok_or_else(|| ClientError::Invalid {
            reason: "metadata.name is required".to_string(),
        })?;
        let entry = (kind.kind.to_string(), key.clone());
        if state.objects.contains_key(&entry) {
            return Err(ClientError::AlreadyExists);
        }

        map.remove("status");
        map.insert("apiVersion".to_string(), Value::String(kind.api_version.to_string()));
        map.insert("kind".to_string(), Value::String(kind.kind.to_string()));
        let mut object = Value::Object(map);

        let version = state.next_version();
        set_metadata_field(&mut object, "uid", Value::String(Uuid::new_v4().to_string()));
        set_metadata_field(&mut object, "resourceVersion", Value::String(version));
        set_metadata_field(&mut object, "generation", Value::from(1));
        set_metadata_field(
            &mut object,
            "creationTimestamp",
            Value::String(Utc::now().to_rfc3339()),
        );
        remove_metadata_field(&mut object, "deletionTimestamp");

        state.objects.insert(entry, object.clone());
        state.record(Verb::Create, kind.kind, &key);
        Ok(object)
    }

    async fn patch(&self, kind: &KindInfo, key: &ObjectKey, patch: &Value) -> ClientResult<Value> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(Verb::Patch, kind.kind) {
            return Err(error);
        }

        let entry = (kind.kind.to_string(), key.clone());
        let version = state.next_version();
        let object = state.objects.get_mut(&entry).ok_or(ClientError::NotFound)?;

        let spec_before = object.get("spec").cloned();
        json_patch::merge(object, &patch::without_status(patch.clone()));
        if object.get("spec") != spec_before.as_ref() {
            let generation = object
                .pointer("/metadata/generation")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .saturating_add(1);
            set_metadata_field(object, "generation", Value::from(generation));
        }
        set_metadata_field(object, "resourceVersion", Value::String(version));
        let result = object.clone();

        state.record(Verb::Patch, kind.kind, key);
        state.release_if_finalized(&entry);
        Ok(result)
    }

    async fn patch_status(
        &self,
        kind: &KindInfo,
        key: &ObjectKey,
        patch: &Value,
    ) -> ClientResult<Value> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(Verb::PatchStatus, kind.kind) {
            return Err(error);
        }

        let version = state.next_version();
        let object = state
            .objects
            .get_mut(&(kind.kind.to_string(), key.clone()))
            .ok_or(ClientError::NotFound)?;
        json_patch::merge(object, &patch::status_only(patch.clone()));
        set_metadata_field(object, "resourceVersion", Value::String(version));
        let result = object.clone();

        state.record(Verb::PatchStatus, kind.kind, key);
        Ok(result)
    }

    async fn delete(&self, kind: &KindInfo, key: &ObjectKey) -> ClientResult<()> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure(Verb::Delete, kind.kind) {
            return Err(error);
        }

        let entry = (kind.kind.to_string(), key.clone());
        let version = state.next_version();
        let object = state.objects.get_mut(&entry).ok_or(ClientError::NotFound)?;

        if finalizers_of(object).is_empty() {
            state.remove_cascading(&entry);
        } else if !is_terminating(object) {
            set_metadata_field(
                object,
                "deletionTimestamp",
                Value::String(Utc::now().to_rfc3339()),
            );
            set_metadata_field(object, "resourceVersion", Value::String(version));
        }

        state.record(Verb::Delete, kind.kind, key);
        Ok(())
    }
}

fn key_of(map: &Map<String, Value>) -> Option<ObjectKey> {
    let metadata = map.get("metadata")?;
    let name = metadata.get("name").and_then(Value::as_str)?;
    if name.is_empty() {
        return None;
    }
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(ObjectKey::new(namespace, name))
}

fn uid_of(object: &Value) -> Option<String> {
    object
        .pointer("/metadata/uid")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn is_owned_by(object: &Value, owner_uid: &str) -> bool {
    object
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .is_some_and(|refs| {
            refs.iter()
                .any(|r| r.get("uid").and_then(Value::as_str) == Some(owner_uid))
        })
}

fn is_terminating(object: &Value) -> bool {
    object.pointer("/metadata/deletionTimestamp").is_some()
}

fn finalizers_of(object: &Value) -> Vec<&str> {
    object
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn set_metadata_field(object: &mut Value, field: &str, value: Value) {
    if let Some(map) = object.as_object_mut() {
        let metadata = map
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert(field.to_string(), value);
        }
    }
}

fn remove_metadata_field(object: &mut Value, field: &str) {
    if let Some(metadata) = object
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
    {
        metadata.remove(field);
    }
}
