//! Desired-state composition
//!
//! Builds the owned infrastructure of a Suggestion from its spec and the algorithm
//! configuration. Composition is pure: the same inputs always produce identical
//! objects, which is what lets the convergence loop detect drift by comparison.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, GRPCAction, PersistentVolumeClaim,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, Service, ServiceAccount,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::config::{AlgorithmConfig, EarlyStoppingConfig};
use crate::crd::Suggestion;
use crate::owned::{OwnedKind, OwnedObject};
use crate::Error;

/// gRPC port of the suggestion algorithm service
pub const SUGGESTION_PORT: i32 = 6789;
/// Name of the suggestion port
pub const SUGGESTION_PORT_NAME: &str = "katib-api";
/// gRPC port of the early-stopping service
pub const EARLY_STOPPING_PORT: i32 = 6788;
/// Name of the early-stopping port
pub const EARLY_STOPPING_PORT_NAME: &str = "early-stop-api";
/// Container running the suggestion algorithm
pub const SUGGESTION_CONTAINER: &str = "suggestion";
/// Container running the early-stopping algorithm
pub const EARLY_STOPPING_CONTAINER: &str = "early-stopping";

/// Value of `app.kubernetes.io/managed-by` on owned objects
pub const MANAGED_BY: &str = "suggestion-controller";
/// Label carrying the owning Suggestion's name
pub const SUGGESTION_LABEL: &str = "katib.kubeflow.org/suggestion";
/// Label carrying the algorithm workload's name
pub const DEPLOYMENT_LABEL: &str = "katib.kubeflow.org/deployment";

const VOLUME_NAME: &str = "suggestion-volume";
const MAX_NAME_LEN: usize = 63;

/// Name of the workload, endpoint and storage claim: `<suggestion>-<algorithm>`
pub fn resource_name(suggestion: &Suggestion) -> String {
    format!(
        "{}-{}",
        suggestion.name_any(),
        suggestion.spec.algorithm.algorithm_name
    )
}

/// Name of the identity, permission and binding: `<suggestion>-<algorithm>-rbac`
pub fn rbac_name(suggestion: &Suggestion) -> String {
    format!("{}-rbac", resource_name(suggestion))
}

/// Name of the owned object of `kind`
pub fn object_name(suggestion: &Suggestion, kind: OwnedKind) -> String {
    match kind {
        OwnedKind::ServiceAccount | OwnedKind::Role | OwnedKind::RoleBinding => {
            rbac_name(suggestion)
        }
        OwnedKind::PersistentVolumeClaim | OwnedKind::Deployment | OwnedKind::Service => {
            resource_name(suggestion)
        }
    }
}

/// Turns a Suggestion and its algorithm configuration into owned objects
pub trait Composer: Send + Sync {
    /// Build the desired objects, ordered by [`crate::owned::OwnedKind::CREATION_ORDER`]
    fn compose(
        &self,
        suggestion: &Suggestion,
        algorithm: &AlgorithmConfig,
        early_stopping: Option<&EarlyStoppingConfig>,
    ) -> Result<Vec<OwnedObject>, Error>;
}

/// Standard layout: one Deployment running the algorithm service (plus an
/// early-stopping sidecar when configured), a ClusterIP Service in front of it, a
/// claim for `FromVolume` resumption and RBAC for the early-stopping sidecar.
#[derive(Clone, Debug, Default)]
pub struct DefaultComposer;

impl Composer for DefaultComposer {
    fn compose(
        &self,
        suggestion: &Suggestion,
        algorithm: &AlgorithmConfig,
        early_stopping: Option<&EarlyStoppingConfig>,
    ) -> Result<Vec<OwnedObject>, Error> {
        let names = Names::for_suggestion(suggestion)?;
        let needs_volume = suggestion.spec.resume_policy.needs_volume();
        let early_stopping = match (&suggestion.spec.early_stopping, early_stopping) {
            (Some(_), Some(config)) => Some(config),
            (Some(es), None) => {
                return Err(Error::configuration(format!(
                    "early stopping '{}' requested but not configured",
                    es.algorithm_name
                )))
            }
            (None, _) => None,
        };

        let mut objects = Vec::with_capacity(6);
        if early_stopping.is_some() {
            objects.push(OwnedObject::ServiceAccount(service_account(&names)));
            objects.push(OwnedObject::Role(role(&names)));
            objects.push(OwnedObject::RoleBinding(role_binding(&names)));
        }
        if needs_volume {
            objects.push(OwnedObject::PersistentVolumeClaim(claim(&names, algorithm)));
        }
        objects.push(OwnedObject::Deployment(deployment(
            &names,
            algorithm,
            early_stopping,
            needs_volume,
        )));
        objects.push(OwnedObject::Service(service(&names, early_stopping.is_some())));
        Ok(objects)
    }
}

/// Everything derived from the Suggestion's identity
struct Names {
    namespace: String,
    resource: String,
    rbac: String,
    labels: BTreeMap<String, String>,
    selector: BTreeMap<String, String>,
    owner: OwnerReference,
}

impl Names {
    fn for_suggestion(suggestion: &Suggestion) -> Result<Self, Error> {
        let name = suggestion.name_any();
        let namespace = suggestion
            .namespace()
            .ok_or_else(|| Error::validation(format!("suggestion {name} has no namespace")))?;
        let owner = suggestion
            .controller_owner_ref(&())
            .ok_or_else(|| Error::validation(format!("suggestion {name} has no uid")))?;

        let resource = resource_name(suggestion);
        let rbac = rbac_name(suggestion);
        if rbac.len() > MAX_NAME_LEN {
            return Err(Error::validation(format!(
                "object name '{rbac}' exceeds {MAX_NAME_LEN} characters"
            )));
        }

        let selector = BTreeMap::from([
            (SUGGESTION_LABEL.to_string(), name.clone()),
            (DEPLOYMENT_LABEL.to_string(), resource.clone()),
        ]);
        let mut labels = selector.clone();
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        );
        labels.insert(crate::crd::EXPERIMENT_LABEL.to_string(), name);

        Ok(Self {
            namespace,
            resource,
            rbac,
            labels,
            selector,
            owner,
        })
    }

    fn meta(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels.clone()),
            owner_references: Some(vec![self.owner.clone()]),
            ..Default::default()
        }
    }
}

fn grpc_probe(port: i32) -> Probe {
    Probe {
        grpc: Some(GRPCAction {
            port,
            service: None,
        }),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        ..Default::default()
    }
}

fn deployment(
    names: &Names,
    algorithm: &AlgorithmConfig,
    early_stopping: Option<&EarlyStoppingConfig>,
    needs_volume: bool,
) -> Deployment {
    let mut suggestion = Container {
        name: SUGGESTION_CONTAINER.to_string(),
        image: Some(algorithm.image.clone()),
        image_pull_policy: algorithm.image_pull_policy.clone(),
        resources: algorithm.resources.clone(),
        ports: Some(vec![ContainerPort {
            name: Some(SUGGESTION_PORT_NAME.to_string()),
            container_port: SUGGESTION_PORT,
            ..Default::default()
        }]),
        readiness_probe: Some(grpc_probe(SUGGESTION_PORT)),
        liveness_probe: Some(grpc_probe(SUGGESTION_PORT)),
        ..Default::default()
    };

    let mut volumes = None;
    if needs_volume {
        let mount_path = algorithm
            .volume_mount_path
            .clone()
            .unwrap_or_else(|| crate::config::DEFAULT_VOLUME_MOUNT_PATH.to_string());
        suggestion.volume_mounts = Some(vec![VolumeMount {
            name: VOLUME_NAME.to_string(),
            mount_path,
            ..Default::default()
        }]);
        volumes = Some(vec![Volume {
            name: VOLUME_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: names.resource.clone(),
                read_only: None,
            }),
            ..Default::default()
        }]);
    }

    let mut containers = vec![suggestion];
    let service_account_name = match early_stopping {
        Some(es) => {
            containers.push(Container {
                name: EARLY_STOPPING_CONTAINER.to_string(),
                image: Some(es.image.clone()),
                image_pull_policy: es.image_pull_policy.clone(),
                resources: es.resources.clone(),
                ports: Some(vec![ContainerPort {
                    name: Some(EARLY_STOPPING_PORT_NAME.to_string()),
                    container_port: EARLY_STOPPING_PORT,
                    ..Default::default()
                }]),
                readiness_probe: Some(grpc_probe(EARLY_STOPPING_PORT)),
                ..Default::default()
            });
            Some(names.rbac.clone())
        }
        None => algorithm.service_account_name.clone(),
    };

    Deployment {
        metadata: names.meta(&names.resource),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(names.selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(names.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    volumes,
                    service_account_name,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn service(names: &Names, early_stopping: bool) -> Service {
    let mut ports = vec![ServicePort {
        name: Some(SUGGESTION_PORT_NAME.to_string()),
        port: SUGGESTION_PORT,
        target_port: Some(IntOrString::Int(SUGGESTION_PORT)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];
    if early_stopping {
        ports.push(ServicePort {
            name: Some(EARLY_STOPPING_PORT_NAME.to_string()),
            port: EARLY_STOPPING_PORT,
            target_port: Some(IntOrString::Int(EARLY_STOPPING_PORT)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }
    Service {
        metadata: names.meta(&names.resource),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(names.selector.clone()),
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }
}

fn claim(names: &Names, algorithm: &AlgorithmConfig) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: names.meta(&names.resource),
        spec: algorithm.persistent_volume_claim_spec.clone(),
        status: None,
    }
}

fn service_account(names: &Names) -> ServiceAccount {
    ServiceAccount {
        metadata: names.meta(&names.rbac),
        ..Default::default()
    }
}

/// The early-stopping sidecar reads Trials and marks them EarlyStopped.
fn role(names: &Names) -> Role {
    let group = vec!["kubeflow.org".to_string()];
    Role {
        metadata: names.meta(&names.rbac),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(group.clone()),
                resources: Some(vec!["trials".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(group),
                resources: Some(vec!["trials/status".to_string()]),
                verbs: vec!["get".to_string(), "update".to_string(), "patch".to_string()],
                ..Default::default()
            },
        ]),
    }
}

fn role_binding(names: &Names) -> RoleBinding {
    RoleBinding {
        metadata: names.meta(&names.rbac),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: names.rbac.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: names.rbac.clone(),
            namespace: Some(names.namespace.clone()),
            ..Default::default()
        }]),
    }
}
