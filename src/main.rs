//! Suggestion controller - runs hyperparameter-suggestion services for Experiments

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use suggestion_controller::client::{GrpcSuggestionClient, DEFAULT_DB_MANAGER_ADDRESS};
use suggestion_controller::config::{ConfigMapSource, DEFAULT_CONFIG_MAP_NAME};
use suggestion_controller::controller::{
    error_policy, reconcile, Context, ControllerSettings, KubeClientImpl, FIELD_MANAGER,
};
use suggestion_controller::crd::Suggestion;
use suggestion_controller::events::KubeEventPublisher;
use suggestion_controller::retry::{retry_with_backoff, RetryConfig};
use suggestion_controller::telemetry::{init_telemetry, LogFormat, TelemetryConfig};

/// Suggestion controller - runs hyperparameter-suggestion services for Experiments
#[derive(Parser, Debug)]
#[command(name = "suggestion-controller", version, about, long_about = None)]
struct Cli {
    /// Print the Suggestion CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Log line format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches Suggestions cluster-wide, runs their algorithm services and records
    /// the trial assignments those services produce.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Namespace of the algorithm configuration ConfigMap
    #[arg(long, env = "KATIB_CORE_NAMESPACE", default_value = "kubeflow")]
    config_namespace: String,

    /// Name of the algorithm configuration ConfigMap
    #[arg(long, default_value = DEFAULT_CONFIG_MAP_NAME)]
    config_name: String,

    /// Maximum number of Suggestions reconciled at once
    #[arg(long, default_value = "4")]
    concurrency: u16,

    /// Deadline of each algorithm service call, in seconds
    #[arg(long, default_value = "60")]
    backend_timeout_secs: u64,

    /// Requeue delay while the algorithm service is starting, in seconds
    #[arg(long, default_value = "5")]
    readiness_requeue_secs: u64,

    /// Periodic resync of healthy Suggestions, in seconds (unset: only on change)
    #[arg(long)]
    resync_secs: Option<u64>,

    /// Consecutive sync failures before a Suggestion is marked failed (unset: never)
    #[arg(long)]
    max_sync_failures: Option<u32>,

    /// Address of the metrics database manager, passed to early-stopping services
    #[arg(long, env = "KATIB_DB_MANAGER_ADDRESS", default_value = DEFAULT_DB_MANAGER_ADDRESS)]
    db_manager_address: String,
}

impl ControllerArgs {
    fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            readiness_requeue: Duration::from_secs(self.readiness_requeue_secs),
            resync_interval: self.resync_secs.map(Duration::from_secs),
            backend_timeout: Duration::from_secs(self.backend_timeout_secs),
            max_sync_failures: self.max_sync_failures,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Suggestion::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        ..Default::default()
    })?;

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        // Defaults plus any environment overrides
        None => run_controller(ControllerArgs::parse_from(["suggestion-controller"])).await,
    }
}

/// Ensure the Suggestion CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply, so the
/// stored schema always matches the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let crd = Suggestion::crd();

    tracing::info!("Installing Suggestion CRD...");
    retry_with_backoff(&RetryConfig::with_max_attempts(5), "install_crd", || async {
        crds.patch("suggestions.kubeflow.org", &params, &Patch::Apply(&crd))
            .await
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Suggestion CRD: {}", e))?;

    tracing::info!("Suggestion CRD installed/updated");
    Ok(())
}

/// Cancel `token` on the first SIGINT or SIGTERM
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("shutdown requested, cancelling in-flight passes");
        token.cancel();
    });
}

/// Run the Suggestion controller until a shutdown signal arrives
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Suggestion controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let settings = args.settings();
    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let ctx = Arc::new(
        Context::builder(
            Arc::new(KubeClientImpl::new(client.clone())),
            Arc::new(GrpcSuggestionClient::new(
                settings.backend_timeout,
                args.db_manager_address.clone(),
            )),
            Arc::new(ConfigMapSource::new(
                client.clone(),
                args.config_namespace.clone(),
                args.config_name.clone(),
            )),
        )
        .events(Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER)))
        .settings(settings)
        .shutdown(shutdown)
        .build(),
    );

    tracing::info!(
        concurrency = args.concurrency,
        config = %format!("{}/{}", args.config_namespace, args.config_name),
        "Starting Suggestion controller"
    );

    let suggestions: Api<Suggestion> = Api::all(client.clone());
    Controller::new(suggestions, WatcherConfig::default().timeout(25))
        .owns(Api::<Deployment>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Service>::all(client), WatcherConfig::default())
        .with_config(ControllerConfig::default().concurrency(args.concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    tracing::debug!(suggestion = %object.name, ?action, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Suggestion controller shutting down");
    Ok(())
}
