//! Suggestion controller implementation
//!
//! One pass converges a Suggestion's owned infrastructure, waits for the algorithm
//! workload to become available, validates the algorithm settings once per
//! generation, fetches any missing trial assignments and writes the resulting status.
//!
//! Transient failures never mark a Suggestion failed: they turn into a requeue with
//! backoff. Only invariant violations and unusable configuration reach
//! [`error_policy`] as errors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::owned::{converge, teardown};
use crate::client::{ClientError, SuggestionClient};
use crate::composer::{Composer, DefaultComposer};
use crate::config::ConfigSource;
use crate::crd::{
    Experiment, Suggestion, SuggestionStatus, Trial, EXPERIMENT_LABEL,
};
use crate::events::{actions, reasons as event_reasons, EventPublisher, NoopEventPublisher};
use crate::owned::{is_deployment_available, OwnedKind, OwnedObject};
use crate::retry::RetryConfig;
use crate::status::reasons;
use crate::Error;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "suggestion-controller";

/// Cluster operations needed by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a Suggestion, `None` if it does not exist
    async fn get_suggestion(&self, namespace: &str, name: &str)
        -> Result<Option<Suggestion>, Error>;

    /// Replace the status of a Suggestion
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SuggestionStatus,
    ) -> Result<(), Error>;

    /// Fetch an owned object by kind and name
    async fn get_owned(
        &self,
        kind: OwnedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OwnedObject>, Error>;

    /// Create or update an owned object, returning it as stored
    async fn apply_owned(&self, object: &OwnedObject) -> Result<OwnedObject, Error>;

    /// Delete an owned object; deleting a missing object succeeds
    async fn delete_owned(&self, kind: OwnedKind, namespace: &str, name: &str)
        -> Result<(), Error>;

    /// Fetch the Experiment a Suggestion serves
    async fn get_experiment(&self, namespace: &str, name: &str)
        -> Result<Option<Experiment>, Error>;

    /// List the Trials of an Experiment
    async fn list_trials(&self, namespace: &str, experiment: &str) -> Result<Vec<Trial>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn apply<K>(&self, object: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(self
            .api::<K>(&namespace)
            .patch(&name, &params, &Patch::Apply(object))
            .await?)
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_suggestion(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Suggestion>, Error> {
        self.get_opt(namespace, name).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SuggestionStatus,
    ) -> Result<(), Error> {
        let status_patch = serde_json::json!({ "status": status });
        self.api::<Suggestion>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await?;
        Ok(())
    }

    async fn get_owned(
        &self,
        kind: OwnedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OwnedObject>, Error> {
        let object = match kind {
            OwnedKind::ServiceAccount => self
                .get_opt::<ServiceAccount>(namespace, name)
                .await?
                .map(OwnedObject::ServiceAccount),
            OwnedKind::Role => self
                .get_opt::<Role>(namespace, name)
                .await?
                .map(OwnedObject::Role),
            OwnedKind::RoleBinding => self
                .get_opt::<RoleBinding>(namespace, name)
                .await?
                .map(OwnedObject::RoleBinding),
            OwnedKind::PersistentVolumeClaim => self
                .get_opt::<PersistentVolumeClaim>(namespace, name)
                .await?
                .map(OwnedObject::PersistentVolumeClaim),
            OwnedKind::Deployment => self
                .get_opt::<Deployment>(namespace, name)
                .await?
                .map(OwnedObject::Deployment),
            OwnedKind::Service => self
                .get_opt::<Service>(namespace, name)
                .await?
                .map(OwnedObject::Service),
        };
        Ok(object)
    }

    async fn apply_owned(&self, object: &OwnedObject) -> Result<OwnedObject, Error> {
        let applied = match object {
            OwnedObject::ServiceAccount(o) => OwnedObject::ServiceAccount(self.apply(o).await?),
            OwnedObject::Role(o) => OwnedObject::Role(self.apply(o).await?),
            OwnedObject::RoleBinding(o) => OwnedObject::RoleBinding(self.apply(o).await?),
            OwnedObject::PersistentVolumeClaim(o) => {
                OwnedObject::PersistentVolumeClaim(self.apply(o).await?)
            }
            OwnedObject::Deployment(o) => OwnedObject::Deployment(self.apply(o).await?),
            OwnedObject::Service(o) => OwnedObject::Service(self.apply(o).await?),
        };
        Ok(applied)
    }

    async fn delete_owned(&self, kind: OwnedKind, namespace: &str, name: &str) -> Result<(), Error> {
        match kind {
            OwnedKind::ServiceAccount => self.delete::<ServiceAccount>(namespace, name).await,
            OwnedKind::Role => self.delete::<Role>(namespace, name).await,
            OwnedKind::RoleBinding => self.delete::<RoleBinding>(namespace, name).await,
            OwnedKind::PersistentVolumeClaim => {
                self.delete::<PersistentVolumeClaim>(namespace, name).await
            }
            OwnedKind::Deployment => self.delete::<Deployment>(namespace, name).await,
            OwnedKind::Service => self.delete::<Service>(namespace, name).await,
        }
    }

    async fn get_experiment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Experiment>, Error> {
        self.get_opt(namespace, name).await
    }

    async fn list_trials(&self, namespace: &str, experiment: &str) -> Result<Vec<Trial>, Error> {
        let params = ListParams::default().labels(&format!("{EXPERIMENT_LABEL}={experiment}"));
        Ok(self.api::<Trial>(namespace).list(&params).await?.items)
    }
}

/// Tunables of the reconciliation loop
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerSettings {
    /// Requeue delay while waiting for the workload or the Experiment
    pub readiness_requeue: Duration,
    /// Periodic requeue of healthy Suggestions; `None` waits for the next change
    pub resync_interval: Option<Duration>,
    /// Deadline of each algorithm service call
    pub backend_timeout: Duration,
    /// Backoff for transient failures and error requeues
    pub backoff: RetryConfig,
    /// Consecutive sync failures after which a Suggestion is marked failed
    pub max_sync_failures: Option<u32>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            readiness_requeue: Duration::from_secs(5),
            resync_interval: None,
            backend_timeout: Duration::from_secs(60),
            backoff: RetryConfig::default(),
            max_sync_failures: None,
        }
    }
}

/// Controller context shared by all reconciliation passes
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Client for the algorithm services
    pub suggestion_client: Arc<dyn SuggestionClient>,
    /// Source of algorithm configuration
    pub config: Arc<dyn ConfigSource>,
    /// Builds owned infrastructure
    pub composer: Arc<dyn Composer>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Loop tunables
    pub settings: ControllerSettings,
    /// Cancelled on shutdown; in-flight passes stop before writing status
    pub shutdown: CancellationToken,
    failures: DashMap<String, u32>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(
        kube: Arc<dyn KubeClient>,
        suggestion_client: Arc<dyn SuggestionClient>,
        config: Arc<dyn ConfigSource>,
    ) -> ContextBuilder {
        ContextBuilder::new(kube, suggestion_client, config)
    }

    /// Delay before the next retry of `key`, counting this failure
    pub fn next_backoff(&self, key: &str) -> Duration {
        let mut failures = self.failures.entry(key.to_string()).or_insert(0);
        let delay = self.settings.backoff.delay_for_attempt(*failures);
        *failures = failures.saturating_add(1);
        delay
    }

    /// Forget the failure history of `key`
    pub fn reset_backoff(&self, key: &str) {
        self.failures.remove(key);
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(kube, suggestion_client, config)
///     .events(Arc::new(KubeEventPublisher::new(client, FIELD_MANAGER)))
///     .settings(settings)
///     .build();
/// ```
pub struct ContextBuilder {
    kube: Arc<dyn KubeClient>,
    suggestion_client: Arc<dyn SuggestionClient>,
    config: Arc<dyn ConfigSource>,
    composer: Option<Arc<dyn Composer>>,
    events: Option<Arc<dyn EventPublisher>>,
    settings: ControllerSettings,
    shutdown: Option<CancellationToken>,
}

impl ContextBuilder {
    fn new(
        kube: Arc<dyn KubeClient>,
        suggestion_client: Arc<dyn SuggestionClient>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            kube,
            suggestion_client,
            config,
            composer: None,
            events: None,
            settings: ControllerSettings::default(),
            shutdown: None,
        }
    }

    /// Override the composer
    pub fn composer(mut self, composer: Arc<dyn Composer>) -> Self {
        self.composer = Some(composer);
        self
    }

    /// Set the Event publisher (defaults to dropping events)
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the loop tunables
    pub fn settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use an externally owned shutdown token
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self.kube,
            suggestion_client: self.suggestion_client,
            config: self.config,
            composer: self
                .composer
                .unwrap_or_else(|| Arc::new(DefaultComposer)),
            events: self.events.unwrap_or_else(|| Arc::new(NoopEventPublisher)),
            settings: self.settings,
            shutdown: self.shutdown.unwrap_or_default(),
            failures: DashMap::new(),
        }
    }
}

/// Reconcile entry point for the controller runtime
pub async fn reconcile(suggestion: Arc<Suggestion>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = suggestion.namespace().unwrap_or_default();
    reconcile_suggestion(&namespace, &suggestion.name_any(), &ctx).await
}

/// Run one reconciliation pass for the Suggestion `namespace/name`.
///
/// Retryable errors become a requeue with per-object backoff; everything else is
/// returned for [`error_policy`] to handle.
#[instrument(skip(ctx))]
pub async fn reconcile_suggestion(
    namespace: &str,
    name: &str,
    ctx: &Context,
) -> Result<Action, Error> {
    let key = format!("{namespace}/{name}");
    match run_pass(namespace, name, ctx).await {
        Ok(action) => {
            ctx.reset_backoff(&key);
            Ok(action)
        }
        Err(Error::Cancelled) => {
            info!("pass cancelled before completion");
            Ok(Action::requeue(ctx.settings.readiness_requeue))
        }
        Err(e) if e.is_retryable() => {
            let delay = ctx.next_backoff(&key);
            warn!(error = %e, delay_secs = delay.as_secs(), "transient failure, requeueing");
            Ok(Action::requeue(delay))
        }
        Err(e) => Err(e),
    }
}

async fn run_pass(namespace: &str, name: &str, ctx: &Context) -> Result<Action, Error> {
    let Some(suggestion) = ctx.kube.get_suggestion(namespace, name).await? else {
        debug!("suggestion not found, nothing to do");
        return Ok(Action::await_change());
    };
    if suggestion.metadata.deletion_timestamp.is_some() {
        debug!("suggestion is being deleted, owned objects are garbage collected");
        return Ok(Action::await_change());
    }

    suggestion.spec.validate()?;

    let now = Utc::now();
    let generation = suggestion.metadata.generation.unwrap_or_default();
    let old = suggestion.status.clone().unwrap_or_default();
    let mut status = old.clone();

    if status.is_failed()
        && status
            .rejected_generation
            .is_some_and(|rejected| rejected < generation)
    {
        info!(generation, "spec changed since settings were rejected, retrying");
        status.clear_failure("algorithm settings changed, validating again", now);
        status.rejected_generation = None;
        status.validated_generation = None;
    }

    if status.is_completed() {
        return complete(&suggestion, status, &old, ctx, now).await;
    }

    let snapshot = match ctx.config.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) if e.is_retryable() => return Err(e),
        Err(e) => return Err(configuration_failure(ctx, &suggestion, e).await),
    };
    let algorithm = match snapshot.algorithm(&suggestion.spec.algorithm.algorithm_name) {
        Ok(config) => config,
        Err(e) => return Err(configuration_failure(ctx, &suggestion, e).await),
    };
    let early_stopping = match &suggestion.spec.early_stopping {
        Some(es) => match snapshot.early_stopping(&es.algorithm_name) {
            Ok(config) => Some(config),
            Err(e) => return Err(configuration_failure(ctx, &suggestion, e).await),
        },
        None => None,
    };

    let desired = ctx.composer.compose(&suggestion, algorithm, early_stopping)?;
    let convergence = converge(ctx.kube.as_ref(), &desired).await?;
    if !convergence.applied.is_empty() {
        let applied: Vec<String> = convergence.applied.iter().map(|k| k.to_string()).collect();
        info!(applied = ?applied, "applied owned objects");
        publish(
            ctx,
            &suggestion,
            EventType::Normal,
            event_reasons::INFRASTRUCTURE_APPLIED,
            actions::RECONCILE,
            format!("applied {}", applied.join(", ")),
        )
        .await;
    }
    status.mark_created("algorithm deployment submitted", now);

    let ready = convergence
        .deployment
        .as_ref()
        .is_some_and(is_deployment_available);
    if !ready {
        debug!("deployment not available yet");
        let message = "waiting for the algorithm deployment to become available";
        status.mark_deployment_ready(false, reasons::DEPLOYMENT_NOT_READY, message, now);
        status.mark_not_running(reasons::DEPLOYMENT_NOT_READY, message, now);
        write_status(ctx, &suggestion, status, &old).await?;
        return Ok(Action::requeue(ctx.settings.readiness_requeue));
    }
    if !old.is_deployment_ready() {
        publish(
            ctx,
            &suggestion,
            EventType::Normal,
            event_reasons::DEPLOYMENT_READY,
            actions::RECONCILE,
            "algorithm service is available".to_string(),
        )
        .await;
    }
    status.mark_deployment_ready(
        true,
        reasons::DEPLOYMENT_READY,
        "algorithm deployment is available",
        now,
    );

    let experiment_name = experiment_name(&suggestion);
    let Some(experiment) = ctx.kube.get_experiment(namespace, &experiment_name).await? else {
        warn!(experiment = %experiment_name, "experiment not found, waiting");
        write_status(ctx, &suggestion, status, &old).await?;
        return Ok(Action::requeue(ctx.settings.readiness_requeue));
    };
    let trials = ctx.kube.list_trials(namespace, &experiment_name).await?;

    if status.validated_generation != Some(generation) {
        let call = ctx
            .suggestion_client
            .validate_algorithm_settings(&suggestion, &experiment);
        match backend_call(ctx, call).await? {
            Ok(()) => {
                info!(generation, "algorithm settings validated");
                status.validated_generation = Some(generation);
                publish(
                    ctx,
                    &suggestion,
                    EventType::Normal,
                    event_reasons::SETTINGS_VALIDATED,
                    actions::VALIDATE,
                    format!("settings accepted for generation {generation}"),
                )
                .await;
            }
            Err(e) if e.is_terminal() => {
                warn!(error = %e, generation, "algorithm settings rejected");
                let reason = if e.is_early_stopping_rejection() {
                    reasons::EARLY_STOPPING_VALIDATION_FAILED
                } else {
                    reasons::VALIDATION_FAILED
                };
                status.mark_failed(reason, &e.to_string(), now);
                status.rejected_generation = Some(generation);
                publish(
                    ctx,
                    &suggestion,
                    EventType::Warning,
                    event_reasons::SETTINGS_REJECTED,
                    actions::VALIDATE,
                    e.to_string(),
                )
                .await;
                write_status(ctx, &suggestion, status, &old).await?;
                return Ok(Action::await_change());
            }
            Err(e) => {
                write_status(ctx, &suggestion, status, &old).await?;
                return Err(Error::unavailable(format!(
                    "algorithm settings validation: {e}"
                )));
            }
        }
    }

    let requested = suggestion.spec.requests;
    if requested > status.suggestion_count {
        let call = ctx
            .suggestion_client
            .sync_assignments(&suggestion, &experiment, &trials);
        match backend_call(ctx, call).await? {
            Ok(reply) => {
                let wanted = (requested - status.suggestion_count) as usize;
                let fresh: Vec<_> = reply
                    .assignments
                    .into_iter()
                    .filter(|a| !status.suggestions.iter().any(|s| s.name == a.name))
                    .take(wanted)
                    .collect();
                info!(
                    added = fresh.len(),
                    requested,
                    "recorded trial assignments"
                );
                if !fresh.is_empty() {
                    publish(
                        ctx,
                        &suggestion,
                        EventType::Normal,
                        event_reasons::ASSIGNMENTS_SYNCED,
                        actions::SYNC,
                        format!("recorded {} new assignments", fresh.len()),
                    )
                    .await;
                }
                status.suggestion_count += fresh.len() as i32;
                status.suggestions.extend(fresh);
                if !reply.algorithm_settings.is_empty() {
                    status.algorithm_settings = reply.algorithm_settings;
                }
                status.sync_failures = 0;
            }
            Err(e) => {
                return sync_failure(ctx, &suggestion, status, &old, e, now).await;
            }
        }
    }

    status.mark_running("algorithm service is serving assignments", now);
    write_status(ctx, &suggestion, status, &old).await?;

    Ok(match ctx.settings.resync_interval {
        Some(interval) => Action::requeue(interval),
        None => Action::await_change(),
    })
}

/// Release the algorithm service of a completed Suggestion.
async fn complete(
    suggestion: &Suggestion,
    mut status: SuggestionStatus,
    old: &SuggestionStatus,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let policy = suggestion.spec.resume_policy;
    if policy.tears_down_on_completion() {
        teardown(ctx.kube.as_ref(), suggestion, &OwnedKind::COMPLETION_TEARDOWN).await?;
        if old.is_deployment_ready() {
            info!(%policy, "suggestion completed, algorithm service removed");
            publish(
                ctx,
                suggestion,
                EventType::Normal,
                event_reasons::INFRASTRUCTURE_RELEASED,
                actions::DELETE,
                format!("resume policy {policy}"),
            )
            .await;
        }
        status.mark_deployment_ready(
            false,
            reasons::COMPLETED,
            "suggestion completed, algorithm deployment removed",
            now,
        );
    }
    status.mark_not_running(reasons::COMPLETED, "suggestion completed", now);

    if ctx.shutdown.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let mut updated = suggestion.clone();
    updated.status = Some(status);
    update_status_condition(ctx, &updated, old).await?;
    Ok(Action::await_change())
}

async fn sync_failure(
    ctx: &Context,
    suggestion: &Suggestion,
    mut status: SuggestionStatus,
    old: &SuggestionStatus,
    error: ClientError,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    publish(
        ctx,
        suggestion,
        EventType::Warning,
        event_reasons::SYNC_FAILED,
        actions::SYNC,
        error.to_string(),
    )
    .await;

    if error.is_terminal() {
        warn!(error = %error, "assignment sync rejected");
        status.mark_failed(reasons::SYNC_FAILED, &error.to_string(), now);
        write_status(ctx, suggestion, status, old).await?;
        return Ok(Action::await_change());
    }

    status.sync_failures = status.sync_failures.saturating_add(1);
    let failures = status.sync_failures;
    if ctx
        .settings
        .max_sync_failures
        .is_some_and(|max| failures >= max)
    {
        warn!(failures, error = %error, "giving up on assignment sync");
        status.mark_failed(
            reasons::SYNC_RETRIES_EXHAUSTED,
            &format!("{failures} consecutive sync failures, last: {error}"),
            now,
        );
        write_status(ctx, suggestion, status, old).await?;
        return Ok(Action::await_change());
    }

    let delay = ctx.settings.backoff.delay_for_attempt(failures - 1);
    warn!(failures, error = %error, delay_secs = delay.as_secs(), "assignment sync failed");
    write_status(ctx, suggestion, status, old).await?;
    Ok(Action::requeue(delay))
}

async fn configuration_failure(ctx: &Context, suggestion: &Suggestion, error: Error) -> Error {
    error!(error = %error, "algorithm configuration unusable");
    publish(
        ctx,
        suggestion,
        EventType::Warning,
        event_reasons::CONFIGURATION_MISSING,
        actions::RECONCILE,
        error.to_string(),
    )
    .await;
    error
}

/// Await a backend call under the configured deadline.
///
/// The outer error is [`Error::Cancelled`] when shutdown interrupts the call.
async fn backend_call<T>(
    ctx: &Context,
    call: impl Future<Output = Result<T, ClientError>>,
) -> Result<Result<T, ClientError>, Error> {
    let deadline = ctx.settings.backend_timeout;
    tokio::select! {
        _ = ctx.shutdown.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(deadline, call) => {
            Ok(result.unwrap_or(Err(ClientError::Timeout(deadline))))
        }
    }
}

/// The Experiment a Suggestion serves: its controlling Experiment owner, falling back
/// to the Experiment of the same name.
fn experiment_name(suggestion: &Suggestion) -> String {
    suggestion
        .owner_references()
        .iter()
        .find(|o| o.kind == "Experiment")
        .map(|o| o.name.clone())
        .unwrap_or_else(|| suggestion.name_any())
}

async fn publish(
    ctx: &Context,
    suggestion: &Suggestion,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&suggestion.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

async fn write_status(
    ctx: &Context,
    suggestion: &Suggestion,
    status: SuggestionStatus,
    old: &SuggestionStatus,
) -> Result<bool, Error> {
    if ctx.shutdown.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let mut updated = suggestion.clone();
    updated.status = Some(status);
    update_status(ctx, &updated, old).await
}

fn require_name(suggestion: &Suggestion) -> Result<(String, String), Error> {
    let name = suggestion.metadata.name.clone().unwrap_or_default();
    if name.is_empty() {
        return Err(Error::validation("cannot update status of a suggestion without a name"));
    }
    Ok((suggestion.namespace().unwrap_or_default(), name))
}

/// Write `suggestion.status` if it differs from `old`.
///
/// Returns whether a write happened. Fails without writing when the Suggestion has no
/// name, which is what a zero-valued object from a failed fetch looks like.
pub async fn update_status(
    ctx: &Context,
    suggestion: &Suggestion,
    old: &SuggestionStatus,
) -> Result<bool, Error> {
    let (namespace, name) = require_name(suggestion)?;
    let new = suggestion.status.clone().unwrap_or_default();
    if &new == old {
        return Ok(false);
    }
    ctx.kube.patch_status(&namespace, &name, &new).await?;
    debug!(suggestion = %name, "status updated");
    Ok(true)
}

/// Write only the conditions of `suggestion.status` on top of `old`.
///
/// Same guard and no-op rules as [`update_status`].
pub async fn update_status_condition(
    ctx: &Context,
    suggestion: &Suggestion,
    old: &SuggestionStatus,
) -> Result<bool, Error> {
    let (namespace, name) = require_name(suggestion)?;
    let conditions = suggestion
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    if conditions == old.conditions {
        return Ok(false);
    }
    let mut new = old.clone();
    new.conditions = conditions;
    ctx.kube.patch_status(&namespace, &name, &new).await?;
    debug!(suggestion = %name, "status conditions updated");
    Ok(true)
}

/// Error policy for the controller runtime: requeue with capped exponential backoff
pub fn error_policy(suggestion: Arc<Suggestion>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = format!(
        "{}/{}",
        suggestion.namespace().unwrap_or_default(),
        suggestion.name_any()
    );
    let delay = ctx.next_backoff(&key);
    error!(
        ?error,
        suggestion = %key,
        delay_secs = delay.as_secs(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}
