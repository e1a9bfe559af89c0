//! Capability traits implemented by every typed resource.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::meta::{ObjectKey, ObjectMeta};

/// A typed object persisted in the external store.
///
/// `Default` yields the zero-value object used when a fetch finds nothing.
pub trait Resource: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    const API_VERSION: &'static str;
    const KIND: &'static str;
    const PLURAL: &'static str;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }
}

/// A resource kind the reconciler drives through a desired spec.
pub trait ManagedObject: Resource {
    type Spec: Clone + PartialEq + fmt::Debug + Send + Sync;
    type Status;

    fn spec(&self) -> &Self::Spec;
    fn set_spec(&mut self, spec: Self::Spec);
    fn status(&self) -> Option<&Self::Status>;
}

/// Implement [`Resource`] and [`ManagedObject`] for a `{ metadata, spec, status }` struct.
macro_rules! managed_resource {
    ($ty:ty, $spec:ty, $status:ty, $api_version:expr, $kind:expr, $plural:expr) => {
        impl $crate::resource::Resource for $ty {
            const API_VERSION: &'static str = $api_version;
            const KIND: &'static str = $kind;
            const PLURAL: &'static str = $plural;

            fn metadata(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }
        }

        impl $crate::resource::ManagedObject for $ty {
            type Spec = $spec;
            type Status = $status;

            fn spec(&self) -> &Self::Spec {
                &self.spec
            }

            fn set_spec(&mut self, spec: Self::Spec) {
                self.spec = spec;
            }

            fn status(&self) -> Option<&Self::Status> {
                self.status.as_ref()
            }
        }
    };
}

pub(crate) use managed_resource;

/// Render a duration the way the upstream API expects it (`1m0s`, `30s`, `1h0m0s`).
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h2m5s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
