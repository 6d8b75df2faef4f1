//! Kubernetes Event recording for the Suggestion controller.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails the
//! reconciliation pass that emitted it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about a Suggestion
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    ///
    /// `reason` shows up under REASON in `kubectl get events`, `action` under ACTION.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publishes through `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish event");
        }
    }
}

/// Drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons
pub mod reasons {
    /// Owned infrastructure was created or repaired
    pub const INFRASTRUCTURE_APPLIED: &str = "InfrastructureApplied";
    /// The algorithm service became available
    pub const DEPLOYMENT_READY: &str = "DeploymentReady";
    /// The algorithm service accepted the algorithm settings
    pub const SETTINGS_VALIDATED: &str = "AlgorithmSettingsValidated";
    /// The algorithm service rejected the algorithm settings
    pub const SETTINGS_REJECTED: &str = "AlgorithmSettingsRejected";
    /// New trial assignments were recorded
    pub const ASSIGNMENTS_SYNCED: &str = "AssignmentsSynced";
    /// The assignment sync failed
    pub const SYNC_FAILED: &str = "SyncFailed";
    /// No usable algorithm configuration
    pub const CONFIGURATION_MISSING: &str = "ConfigurationMissing";
    /// Algorithm service torn down after completion
    pub const INFRASTRUCTURE_RELEASED: &str = "InfrastructureReleased";
}

/// Event actions
pub mod actions {
    /// Reconciliation of owned infrastructure
    pub const RECONCILE: &str = "Reconcile";
    /// Validation call to the algorithm service
    pub const VALIDATE: &str = "Validate";
    /// Assignment sync call to the algorithm service
    pub const SYNC: &str = "Sync";
    /// Deleting owned infrastructure
    pub const DELETE: &str = "Delete";
}
