//! Convergence of owned infrastructure against the cluster

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use tracing::{debug, info};

use super::suggestion::KubeClient;
use crate::composer::object_name;
use crate::crd::Suggestion;
use crate::owned::{OwnedKind, OwnedObject};
use crate::Error;

/// Outcome of one convergence pass
#[derive(Debug, Default)]
pub struct Convergence {
    /// Kinds that were created or updated, in application order
    pub applied: Vec<OwnedKind>,
    /// The algorithm Deployment as last seen on the cluster
    pub deployment: Option<Deployment>,
}

/// Bring every desired object to its desired state, in the given order.
///
/// Objects that already match are left alone. An object still terminating from an
/// earlier teardown cannot be replaced yet and fails the pass with a retryable error.
pub async fn converge(
    kube: &dyn KubeClient,
    desired: &[OwnedObject],
) -> Result<Convergence, Error> {
    let mut convergence = Convergence::default();

    for object in desired {
        let kind = object.kind();
        let current = kube
            .get_owned(kind, object.namespace(), object.name())
            .await?;

        let stored = match current {
            Some(current) if current.metadata().deletion_timestamp.is_some() => {
                return Err(Error::unavailable(format!(
                    "{kind} {} is terminating",
                    object.name()
                )));
            }
            Some(current) if !object.drifted_from(&current)? => {
                debug!(%kind, name = object.name(), "owned object up to date");
                current
            }
            Some(_) => {
                info!(%kind, name = object.name(), "updating drifted owned object");
                convergence.applied.push(kind);
                kube.apply_owned(object).await?
            }
            None => {
                info!(%kind, name = object.name(), "creating owned object");
                convergence.applied.push(kind);
                kube.apply_owned(object).await?
            }
        };

        if let OwnedObject::Deployment(deployment) = stored {
            convergence.deployment = Some(deployment);
        }
    }

    Ok(convergence)
}

/// Delete the owned objects of `kinds`, in the given order
pub async fn teardown(
    kube: &dyn KubeClient,
    suggestion: &Suggestion,
    kinds: &[OwnedKind],
) -> Result<(), Error> {
    let namespace = suggestion.namespace().unwrap_or_default();
    for &kind in kinds {
        let name = object_name(suggestion, kind);
        kube.delete_owned(kind, &namespace, &name).await?;
        debug!(%kind, %name, "deleted owned object");
    }
    Ok(())
}
