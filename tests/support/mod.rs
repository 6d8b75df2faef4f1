//! In-memory cluster and algorithm service shared by the lifecycle tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus};
use kube::ResourceExt;

use suggestion_controller::client::{ClientError, SuggestionClient, SyncReply};
use suggestion_controller::config::{
    AlgorithmConfig, ConfigSnapshot, EarlyStoppingConfig, StaticConfigSource,
};
use suggestion_controller::controller::{Context, KubeClient};
use suggestion_controller::crd::{
    AlgorithmSpec, Experiment, ExperimentSpec, ParameterAssignment, ResumePolicy, Suggestion,
    SuggestionSpec, SuggestionStatus, Trial, TrialAssignment, EXPERIMENT_LABEL,
};
use suggestion_controller::owned::{OwnedKind, OwnedObject};
use suggestion_controller::Error;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Cluster state held in memory.
///
/// Starts stopped; every API call fails as unavailable until [`TestEnv::start`].
/// Deleting a Suggestion garbage-collects the objects it owns.
#[derive(Default)]
pub struct TestEnv {
    running: AtomicBool,
    next_uid: AtomicU64,
    writes: AtomicUsize,
    suggestions: Mutex<BTreeMap<Key, Suggestion>>,
    experiments: Mutex<BTreeMap<Key, Experiment>>,
    trials: Mutex<BTreeMap<Key, Trial>>,
    owned: Mutex<BTreeMap<(OwnedKind, String, String), OwnedObject>>,
    ready_at: Mutex<BTreeMap<Key, Instant>>,
}

impl TestEnv {
    /// A fresh, stopped environment
    pub fn new() -> Self {
        Self::default()
    }

    /// The environment shared by every test in the binary, started on first use.
    ///
    /// Tests sharing it must use their own namespace.
    pub fn shared() -> Arc<TestEnv> {
        static ENV: OnceLock<Arc<TestEnv>> = OnceLock::new();
        ENV.get_or_init(|| {
            let env = Arc::new(TestEnv::new());
            env.start();
            env
        })
        .clone()
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), Error> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable("test environment is stopped"))
        }
    }

    /// Number of object and status writes performed through the client
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store a new Suggestion at generation 1
    pub fn create_suggestion(&self, mut suggestion: Suggestion) -> Suggestion {
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst);
        suggestion.metadata.uid = Some(format!("uid-{uid}"));
        suggestion.metadata.generation = Some(1);
        let namespace = suggestion.namespace().unwrap_or_default();
        self.suggestions
            .lock()
            .unwrap()
            .insert(key(&namespace, &suggestion.name_any()), suggestion.clone());
        suggestion
    }

    pub fn suggestion(&self, namespace: &str, name: &str) -> Option<Suggestion> {
        self.suggestions
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn status(&self, namespace: &str, name: &str) -> SuggestionStatus {
        self.suggestion(namespace, name)
            .and_then(|s| s.status)
            .unwrap_or_default()
    }

    /// Edit the spec the way a user would, bumping the generation
    pub fn update_spec(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut SuggestionSpec)) {
        let mut suggestions = self.suggestions.lock().unwrap();
        let suggestion = suggestions.get_mut(&key(namespace, name)).unwrap();
        edit(&mut suggestion.spec);
        suggestion.metadata.generation = suggestion.metadata.generation.map(|g| g + 1);
    }

    /// Edit the status the way the upstream experiment controller would
    pub fn update_status(
        &self,
        namespace: &str,
        name: &str,
        edit: impl FnOnce(&mut SuggestionStatus),
    ) {
        let mut suggestions = self.suggestions.lock().unwrap();
        let suggestion = suggestions.get_mut(&key(namespace, name)).unwrap();
        edit(suggestion.status.get_or_insert_with(Default::default));
    }

    /// Delete a Suggestion and garbage-collect everything it owns
    pub fn delete_suggestion(&self, namespace: &str, name: &str) {
        let Some(removed) = self.suggestions.lock().unwrap().remove(&key(namespace, name)) else {
            return;
        };
        let uid = removed.metadata.uid.unwrap_or_default();
        self.owned.lock().unwrap().retain(|_, object| {
            !object
                .metadata()
                .owner_references
                .iter()
                .flatten()
                .any(|o| o.uid == uid)
        });
    }

    pub fn create_experiment(&self, namespace: &str, name: &str) {
        let mut experiment = Experiment::new(name, ExperimentSpec::default());
        experiment.metadata.namespace = Some(namespace.to_string());
        self.experiments
            .lock()
            .unwrap()
            .insert(key(namespace, name), experiment);
    }

    pub fn owned(&self, kind: OwnedKind, namespace: &str, name: &str) -> Option<OwnedObject> {
        self.owned
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Report the Deployment `name` as Available (or not), as its controller would
    pub fn set_deployment_available(&self, namespace: &str, name: &str, available: bool) {
        let mut owned = self.owned.lock().unwrap();
        let Some(OwnedObject::Deployment(deployment)) =
            owned.get_mut(&(OwnedKind::Deployment, namespace.to_string(), name.to_string()))
        else {
            panic!("deployment {namespace}/{name} does not exist");
        };
        deployment.status = Some(DeploymentStatus {
            conditions: Some(vec![DeploymentCondition {
                type_: "Available".to_string(),
                status: if available { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        if available {
            self.ready_at
                .lock()
                .unwrap()
                .insert(key(namespace, name), Instant::now());
        }
    }

    /// When the Deployment `name` was last reported Available
    pub fn ready_at(&self, namespace: &str, name: &str) -> Option<Instant> {
        self.ready_at.lock().unwrap().get(&key(namespace, name)).copied()
    }
}

#[async_trait]
impl KubeClient for TestEnv {
    async fn get_suggestion(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Suggestion>, Error> {
        self.check()?;
        Ok(self.suggestion(namespace, name))
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SuggestionStatus,
    ) -> Result<(), Error> {
        self.check()?;
        let mut suggestions = self.suggestions.lock().unwrap();
        let suggestion = suggestions
            .get_mut(&key(namespace, name))
            .ok_or_else(|| Error::unavailable(format!("suggestion {namespace}/{name} is gone")))?;
        suggestion.status = Some(status.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_owned(
        &self,
        kind: OwnedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OwnedObject>, Error> {
        self.check()?;
        Ok(self.owned(kind, namespace, name))
    }

    async fn apply_owned(&self, object: &OwnedObject) -> Result<OwnedObject, Error> {
        self.check()?;
        let id = (
            object.kind(),
            object.namespace().to_string(),
            object.name().to_string(),
        );
        let mut owned = self.owned.lock().unwrap();
        let mut stored = object.clone();
        // Applying a spec never touches the status subresource.
        if let (Some(OwnedObject::Deployment(existing)), OwnedObject::Deployment(new)) =
            (owned.get(&id), &mut stored)
        {
            new.status = existing.status.clone();
        }
        owned.insert(id, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete_owned(&self, kind: OwnedKind, namespace: &str, name: &str) -> Result<(), Error> {
        self.check()?;
        self.owned
            .lock()
            .unwrap()
            .remove(&(kind, namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn get_experiment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Experiment>, Error> {
        self.check()?;
        Ok(self
            .experiments
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned())
    }

    async fn list_trials(&self, namespace: &str, experiment: &str) -> Result<Vec<Trial>, Error> {
        self.check()?;
        Ok(self
            .trials
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), trial)| {
                ns == namespace
                    && trial.labels().get(EXPERIMENT_LABEL).map(String::as_str) == Some(experiment)
            })
            .map(|(_, trial)| trial.clone())
            .collect())
    }
}

/// Which algorithm service call was made
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Validate,
    Sync,
}

/// Algorithm service that hands out numbered assignments and records its calls
#[derive(Default)]
pub struct FakeAlgorithmService {
    calls: Mutex<Vec<(Call, Instant)>>,
    /// Settings with this name are rejected as invalid
    pub rejected_setting: Option<String>,
}

impl FakeAlgorithmService {
    pub fn rejecting(setting: &str) -> Self {
        Self {
            rejected_setting: Some(setting.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(Call, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|(c, _)| *c == call).count()
    }
}

#[async_trait]
impl SuggestionClient for FakeAlgorithmService {
    async fn validate_algorithm_settings(
        &self,
        suggestion: &Suggestion,
        _experiment: &Experiment,
    ) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push((Call::Validate, Instant::now()));
        if let Some(bad) = &self.rejected_setting {
            if suggestion
                .spec
                .algorithm
                .algorithm_settings
                .iter()
                .any(|s| &s.name == bad)
            {
                return Err(ClientError::Rejected {
                    reason: "InvalidArgument".to_string(),
                    message: format!("unknown setting {bad}"),
                });
            }
        }
        Ok(())
    }

    async fn sync_assignments(
        &self,
        suggestion: &Suggestion,
        _experiment: &Experiment,
        _trials: &[Trial],
    ) -> Result<SyncReply, ClientError> {
        self.calls.lock().unwrap().push((Call::Sync, Instant::now()));
        let produced = suggestion
            .status
            .as_ref()
            .map(|s| s.suggestion_count)
            .unwrap_or_default();
        let assignments = (produced..suggestion.spec.requests)
            .map(|i| TrialAssignment {
                name: format!("{}-trial-{i}", suggestion.name_any()),
                parameter_assignments: vec![ParameterAssignment {
                    name: "lr".to_string(),
                    value: format!("0.0{}", i + 1),
                }],
                ..Default::default()
            })
            .collect();
        Ok(SyncReply {
            assignments,
            algorithm_settings: vec![],
        })
    }
}

/// Algorithm configuration with `random` and `medianstop`
pub fn config_snapshot() -> ConfigSnapshot {
    ConfigSnapshot::default()
        .with_algorithm("random", AlgorithmConfig::with_image("test-image"))
        .with_early_stopping("medianstop", EarlyStoppingConfig::with_image("es-image"))
}

/// A `random` Suggestion asking for `requests` assignments
pub fn suggestion(namespace: &str, name: &str, requests: i32) -> Suggestion {
    let mut s = Suggestion::new(
        name,
        SuggestionSpec {
            algorithm: AlgorithmSpec::named("random"),
            early_stopping: None,
            requests,
            resume_policy: ResumePolicy::Never,
        },
    );
    s.metadata.namespace = Some(namespace.to_string());
    s
}

/// Controller context wired to `env` and `service`
pub fn context(env: &Arc<TestEnv>, service: &Arc<FakeAlgorithmService>) -> Context {
    let kube: Arc<dyn KubeClient> = env.clone();
    let client: Arc<dyn SuggestionClient> = service.clone();
    Context::builder(
        kube,
        client,
        Arc::new(StaticConfigSource::new(config_snapshot())),
    )
    .build()
}
