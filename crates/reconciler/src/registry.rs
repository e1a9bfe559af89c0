//! Kind registry injected into the store.
//!
//! The registry resolves a typed resource to the API coordinates the client
//! needs. Supporting a new kind means registering it here.

use std::collections::BTreeMap;
use std::fmt;

use fluxer_api::{FluxApp, HelmRelease, HelmRepository, ImagePolicy, ImageRepository, Resource};

use crate::error::{Error, Result};

/// API coordinates of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindInfo {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl KindInfo {
    pub const fn of<K: Resource>() -> Self {
        Self {
            api_version: K::API_VERSION,
            kind: K::KIND,
            plural: K::PLURAL,
        }
    }
}

impl fmt::Display for KindInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// Table of kinds the store may operate on.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: BTreeMap<&'static str, KindInfo>,
}

impl KindRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The parent kind and the four child kinds of the chain.
    pub fn flux() -> Self {
        Self::new()
            .register::<FluxApp>()
            .register::<ImageRepository>()
            .register::<ImagePolicy>()
            .register::<HelmRepository>()
            .register::<HelmRelease>()
    }

    /// Register a kind.
    #[must_use]
    pub fn register<K: Resource>(mut self) -> Self {
        self.kinds.insert(K::KIND, KindInfo::of::<K>());
        self
    }

    /// Look up a kind by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedKind`] if the kind was never registered.
    pub fn lookup(&self, kind: &str) -> Result<&KindInfo> {
        self.kinds
            .get(kind)
            .ok_or_else(|| Error::unsupported_kind(kind))
    }

    /// Look up the entry for a typed resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedKind`] if `K` was never registered.
    pub fn info_for<K: Resource>(&self) -> Result<&KindInfo> {
        self.lookup(K::KIND)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &KindInfo> {
        self.kinds.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flux_registry_contains_chain_kinds() {
        let registry = KindRegistry::flux();
        for kind in ["FluxApp", "ImageRepository", "ImagePolicy", "HelmRepository", "HelmRelease"] {
            assert!(registry.contains(kind), "{kind} should be registered");
        }
        assert_eq!(registry.kinds().count(), 5);
    }

    #[test]
    fn test_unregistered_kind_is_rejected() {
        let registry = KindRegistry::new().register::<FluxApp>();
        let result = registry.info_for::<HelmRelease>();
        assert!(matches!(result, Err(Error::UnsupportedKind { .. })));
    }

    #[test]
    fn test_kind_info_coordinates() {
        let registry = KindRegistry::flux();
        let info = registry.lookup("HelmRelease").ok();
        assert_eq!(info.map(|i| i.api_version), Some("helm.toolkit.fluxcd.io/v2"));
        assert_eq!(info.map(|i| i.plural), Some("helmreleases"));
    }
}
