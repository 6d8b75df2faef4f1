//! Owned infrastructure of a Suggestion
//!
//! Every Suggestion owns up to six objects, one per [`OwnedKind`]. They are carried
//! around as an [`OwnedObject`] so the composer, the cluster client and the
//! convergence loop can treat them uniformly while still using typed k8s-openapi
//! structs underneath.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

use crate::Error;

/// Kind of an owned object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnedKind {
    /// Scoped identity of the algorithm pod
    ServiceAccount,
    /// Permissions of the scoped identity
    Role,
    /// Binds the identity to its permissions
    RoleBinding,
    /// Resume volume
    PersistentVolumeClaim,
    /// Algorithm service workload
    Deployment,
    /// Network endpoint of the algorithm service
    Service,
}

impl OwnedKind {
    /// Kinds in creation order; each kind only references kinds before it
    pub const CREATION_ORDER: [OwnedKind; 6] = [
        OwnedKind::ServiceAccount,
        OwnedKind::Role,
        OwnedKind::RoleBinding,
        OwnedKind::PersistentVolumeClaim,
        OwnedKind::Deployment,
        OwnedKind::Service,
    ];

    /// Kinds removed once a Suggestion completes
    pub const COMPLETION_TEARDOWN: [OwnedKind; 2] = [OwnedKind::Service, OwnedKind::Deployment];
}

impl std::fmt::Display for OwnedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ServiceAccount => "ServiceAccount",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::Deployment => "Deployment",
            Self::Service => "Service",
        };
        f.write_str(s)
    }
}

/// A typed owned object
#[derive(Clone, Debug, PartialEq)]
pub enum OwnedObject {
    /// ServiceAccount
    ServiceAccount(ServiceAccount),
    /// Role
    Role(Role),
    /// RoleBinding
    RoleBinding(RoleBinding),
    /// PersistentVolumeClaim
    PersistentVolumeClaim(PersistentVolumeClaim),
    /// Deployment
    Deployment(Deployment),
    /// Service
    Service(Service),
}

impl OwnedObject {
    /// Kind of this object
    pub fn kind(&self) -> OwnedKind {
        match self {
            Self::ServiceAccount(_) => OwnedKind::ServiceAccount,
            Self::Role(_) => OwnedKind::Role,
            Self::RoleBinding(_) => OwnedKind::RoleBinding,
            Self::PersistentVolumeClaim(_) => OwnedKind::PersistentVolumeClaim,
            Self::Deployment(_) => OwnedKind::Deployment,
            Self::Service(_) => OwnedKind::Service,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ServiceAccount(o) => &o.metadata,
            Self::Role(o) => &o.metadata,
            Self::RoleBinding(o) => &o.metadata,
            Self::PersistentVolumeClaim(o) => &o.metadata,
            Self::Deployment(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
        }
    }

    /// Mutable object metadata
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::ServiceAccount(o) => &mut o.metadata,
            Self::Role(o) => &mut o.metadata,
            Self::RoleBinding(o) => &mut o.metadata,
            Self::PersistentVolumeClaim(o) => &mut o.metadata,
            Self::Deployment(o) => &mut o.metadata,
            Self::Service(o) => &mut o.metadata,
        }
    }

    /// Object name (empty if unset)
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Object namespace (empty if unset)
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// The Deployment, if this is one
    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            Self::Deployment(d) => Some(d),
            _ => None,
        }
    }

    /// Whether `current` no longer matches this desired object.
    ///
    /// Everything set on the desired object must be present with the same value on
    /// `current`; fields the API server defaults or other controllers add are
    /// ignored, as is `status`. Claims only compare labels and owner references
    /// because their spec is immutable after binding.
    pub fn drifted_from(&self, current: &OwnedObject) -> Result<bool, Error> {
        if self.kind() != current.kind() {
            return Err(Error::validation(format!(
                "cannot compare {} with {}",
                self.kind(),
                current.kind()
            )));
        }
        let (desired, current) = match self.kind() {
            OwnedKind::PersistentVolumeClaim => (
                managed_metadata(self.metadata()),
                managed_metadata(current.metadata()),
            ),
            _ => (self.to_value()?, current.to_value()?),
        };
        Ok(!contains(&current, &strip_status(desired)))
    }

    fn to_value(&self) -> Result<Value, Error> {
        let value = match self {
            Self::ServiceAccount(o) => serde_json::to_value(o),
            Self::Role(o) => serde_json::to_value(o),
            Self::RoleBinding(o) => serde_json::to_value(o),
            Self::PersistentVolumeClaim(o) => serde_json::to_value(o),
            Self::Deployment(o) => serde_json::to_value(o),
            Self::Service(o) => serde_json::to_value(o),
        };
        Ok(value?)
    }
}

fn managed_metadata(meta: &ObjectMeta) -> Value {
    serde_json::json!({
        "labels": meta.labels,
        "ownerReferences": meta.owner_references,
    })
}

fn strip_status(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.remove("status");
    }
    value
}

/// Whether `desired` is a structural subset of `current`.
///
/// Objects match key by key, arrays element by element with equal length, and
/// scalars by equality. `null` in `desired` matches anything.
fn contains(current: &Value, desired: &Value) -> bool {
    match (current, desired) {
        (_, Value::Null) => true,
        (Value::Object(c), Value::Object(d)) => d
            .iter()
            .all(|(k, dv)| dv.is_null() || c.get(k).is_some_and(|cv| contains(cv, dv))),
        (Value::Array(c), Value::Array(d)) => {
            c.len() == d.len() && c.iter().zip(d).all(|(cv, dv)| contains(cv, dv))
        }
        _ => current == desired,
    }
}

/// Whether a Deployment reports the `Available` condition as true
pub fn is_deployment_available(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
        .unwrap_or(false)
}
