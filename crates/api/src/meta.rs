//! Object metadata shared by every resource kind.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Set by the store when deletion was requested but finalizers remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Metadata with just a name and namespace.
    pub fn named(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// The namespaced identity of this object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Whether deletion has been requested.
    pub const fn is_terminating(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer. Returns `true` if the list changed.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove a finalizer. Returns `true` if the list changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    /// The owner reference flagged as controller, if any.
    pub fn controller_reference(&self) -> Option<&OwnerReference> {
        self.owner_references
            .iter()
            .find(|r| r.controller.unwrap_or(false))
    }

    /// Whether the object is owned by the object with `uid`.
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_references.iter().any(|r| r.uid == uid)
    }
}

/// Relation marking another object as the owner of this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

/// Namespaced identity of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to an object in a (possibly) different namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedObjectReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_add_is_idempotent() {
        let mut meta = ObjectMeta::named("app", "default");
        assert!(meta.add_finalizer("example.com/f"));
        assert!(!meta.add_finalizer("example.com/f"));
        assert_eq!(meta.finalizers.len(), 1);
    }

    #[test]
    fn test_finalizer_remove() {
        let mut meta = ObjectMeta::named("app", "default");
        meta.add_finalizer("a");
        meta.add_finalizer("b");
        assert!(meta.remove_finalizer("a"));
        assert!(!meta.remove_finalizer("a"));
        assert_eq!(meta.finalizers, vec!["b".to_string()]);
    }

    #[test]
    fn test_controller_reference() {
        let mut meta = ObjectMeta::named("child", "default");
        meta.owner_references.push(OwnerReference {
            api_version: "v1".to_string(),
            kind: "Other".to_string(),
            name: "other".to_string(),
            uid: "1".to_string(),
            controller: None,
            block_owner_deletion: None,
        });
        assert!(meta.controller_reference().is_none());

        meta.owner_references.push(OwnerReference {
            api_version: "v1".to_string(),
            kind: "Owner".to_string(),
            name: "owner".to_string(),
            uid: "2".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        });
        assert_eq!(meta.controller_reference().map(|r| r.uid.as_str()), Some("2"));
        assert!(meta.is_owned_by("1"));
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("flux-system", "podinfo").to_string(), "flux-system/podinfo");
    }
}
