//! Algorithm configuration
//!
//! Maps algorithm names to the container image and runtime settings of their service.
//! The production source reads the `katib-config` ConfigMap, whose `suggestion` and
//! `early-stopping` keys hold JSON objects keyed by algorithm name:
//!
//! ```json
//! {"random": {"image": "docker.io/kubeflowkatib/suggestion-hyperopt:latest"}}
//! ```
//!
//! A [`ConfigSnapshot`] is loaded once per reconciliation pass and is immutable after
//! that, so concurrent passes never observe a half-updated mapping.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaimSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Default ConfigMap holding algorithm configuration
pub const DEFAULT_CONFIG_MAP_NAME: &str = "katib-config";
/// ConfigMap key for suggestion algorithms
pub const SUGGESTION_KEY: &str = "suggestion";
/// ConfigMap key for early-stopping algorithms
pub const EARLY_STOPPING_KEY: &str = "early-stopping";

/// Default image pull policy for algorithm containers
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
/// Default mount path of the resume volume
pub const DEFAULT_VOLUME_MOUNT_PATH: &str = "/opt/katib/data";
/// Default size of the resume volume
pub const DEFAULT_VOLUME_STORAGE: &str = "1Gi";

const DEFAULT_CPU_REQUEST: &str = "50m";
const DEFAULT_CPU_LIMIT: &str = "500m";
const DEFAULT_MEMORY_REQUEST: &str = "10Mi";
const DEFAULT_MEMORY_LIMIT: &str = "100Mi";

/// Runtime settings of a suggestion algorithm service
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfig {
    /// Container image of the algorithm service
    pub image: String,
    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Container resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Service account for the algorithm pod when early stopping is off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Where the resume volume is mounted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mount_path: Option<String>,
    /// Claim template for the resume volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_spec: Option<PersistentVolumeClaimSpec>,
}

impl AlgorithmConfig {
    /// Create a config with only an image
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the image pull policy
    pub fn pull_policy(mut self, policy: impl Into<String>) -> Self {
        self.image_pull_policy = Some(policy.into());
        self
    }

    fn with_defaults(mut self) -> Self {
        self.image_pull_policy
            .get_or_insert_with(|| DEFAULT_IMAGE_PULL_POLICY.to_string());
        self.resources = Some(default_resources(self.resources.take()));
        self.volume_mount_path
            .get_or_insert_with(|| DEFAULT_VOLUME_MOUNT_PATH.to_string());
        let pvc = self.persistent_volume_claim_spec.get_or_insert_with(Default::default);
        if pvc.access_modes.as_ref().map_or(true, |m| m.is_empty()) {
            pvc.access_modes = Some(vec!["ReadWriteOnce".to_string()]);
        }
        let requests = pvc
            .resources
            .get_or_insert_with(Default::default)
            .requests
            .get_or_insert_with(BTreeMap::new);
        requests
            .entry("storage".to_string())
            .or_insert_with(|| Quantity(DEFAULT_VOLUME_STORAGE.to_string()));
        self
    }
}

/// Runtime settings of an early-stopping service
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EarlyStoppingConfig {
    /// Container image of the early-stopping service
    pub image: String,
    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Container resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

impl EarlyStoppingConfig {
    /// Create a config with only an image
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the image pull policy
    pub fn pull_policy(mut self, policy: impl Into<String>) -> Self {
        self.image_pull_policy = Some(policy.into());
        self
    }

    fn with_defaults(mut self) -> Self {
        self.image_pull_policy
            .get_or_insert_with(|| DEFAULT_IMAGE_PULL_POLICY.to_string());
        self.resources = Some(default_resources(self.resources.take()));
        self
    }
}

/// Fill in cpu/memory requests and limits that the config left out.
fn default_resources(resources: Option<ResourceRequirements>) -> ResourceRequirements {
    let mut resources = resources.unwrap_or_default();
    let requests = resources.requests.get_or_insert_with(BTreeMap::new);
    requests
        .entry("cpu".to_string())
        .or_insert_with(|| Quantity(DEFAULT_CPU_REQUEST.to_string()));
    requests
        .entry("memory".to_string())
        .or_insert_with(|| Quantity(DEFAULT_MEMORY_REQUEST.to_string()));
    let limits = resources.limits.get_or_insert_with(BTreeMap::new);
    limits
        .entry("cpu".to_string())
        .or_insert_with(|| Quantity(DEFAULT_CPU_LIMIT.to_string()));
    limits
        .entry("memory".to_string())
        .or_insert_with(|| Quantity(DEFAULT_MEMORY_LIMIT.to_string()));
    resources
}

/// Immutable algorithm configuration for one reconciliation pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigSnapshot {
    suggestion: BTreeMap<String, AlgorithmConfig>,
    early_stopping: BTreeMap<String, EarlyStoppingConfig>,
}

impl ConfigSnapshot {
    /// Parse the data section of the algorithm ConfigMap
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, Error> {
        let mut snapshot = Self::default();
        if let Some(raw) = data.get(SUGGESTION_KEY) {
            let entries: BTreeMap<String, AlgorithmConfig> = serde_json::from_str(raw)
                .map_err(|e| Error::configuration(format!("invalid '{SUGGESTION_KEY}': {e}")))?;
            for (name, config) in entries {
                snapshot = snapshot.with_algorithm(name, config);
            }
        }
        if let Some(raw) = data.get(EARLY_STOPPING_KEY) {
            let entries: BTreeMap<String, EarlyStoppingConfig> = serde_json::from_str(raw)
                .map_err(|e| {
                    Error::configuration(format!("invalid '{EARLY_STOPPING_KEY}': {e}"))
                })?;
            for (name, config) in entries {
                snapshot = snapshot.with_early_stopping(name, config);
            }
        }
        Ok(snapshot)
    }

    /// Add a suggestion algorithm entry, applying defaults
    pub fn with_algorithm(mut self, name: impl Into<String>, config: AlgorithmConfig) -> Self {
        self.suggestion.insert(name.into(), config.with_defaults());
        self
    }

    /// Add an early-stopping algorithm entry, applying defaults
    pub fn with_early_stopping(
        mut self,
        name: impl Into<String>,
        config: EarlyStoppingConfig,
    ) -> Self {
        self.early_stopping.insert(name.into(), config.with_defaults());
        self
    }

    /// Look up a suggestion algorithm
    pub fn algorithm(&self, name: &str) -> Result<&AlgorithmConfig, Error> {
        let config = self.suggestion.get(name).ok_or_else(|| {
            Error::configuration(format!(
                "no suggestion configuration for algorithm '{name}'"
            ))
        })?;
        if config.image.is_empty() {
            return Err(Error::configuration(format!(
                "suggestion configuration for algorithm '{name}' has no image"
            )));
        }
        Ok(config)
    }

    /// Look up an early-stopping algorithm
    pub fn early_stopping(&self, name: &str) -> Result<&EarlyStoppingConfig, Error> {
        let config = self.early_stopping.get(name).ok_or_else(|| {
            Error::configuration(format!(
                "no early-stopping configuration for algorithm '{name}'"
            ))
        })?;
        if config.image.is_empty() {
            return Err(Error::configuration(format!(
                "early-stopping configuration for algorithm '{name}' has no image"
            )));
        }
        Ok(config)
    }
}

/// Source of algorithm configuration snapshots
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load the configuration used for one reconciliation pass
    async fn snapshot(&self) -> Result<ConfigSnapshot, Error>;
}

/// Reads algorithm configuration from a ConfigMap on every pass
pub struct ConfigMapSource {
    api: Api<ConfigMap>,
    namespace: String,
    name: String,
}

impl ConfigMapSource {
    /// Create a source for the given ConfigMap
    pub fn new(client: Client, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
            name: name.into(),
        }
    }
}

#[async_trait]
impl ConfigSource for ConfigMapSource {
    async fn snapshot(&self) -> Result<ConfigSnapshot, Error> {
        let config_map = self.api.get_opt(&self.name).await?.ok_or_else(|| {
            Error::configuration(format!(
                "config map {}/{} not found",
                self.namespace, self.name
            ))
        })?;
        debug!(config_map = %self.name, "loaded algorithm configuration");
        ConfigSnapshot::from_config_map_data(&config_map.data.unwrap_or_default())
    }
}

/// Fixed configuration, for tests and embedding
pub struct StaticConfigSource {
    snapshot: ConfigSnapshot,
}

impl StaticConfigSource {
    /// Serve the given snapshot on every pass
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn snapshot(&self) -> Result<ConfigSnapshot, Error> {
        Ok(self.snapshot.clone())
    }
}
