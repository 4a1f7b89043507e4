//! custom-operator - keeps one Deployment per CustomOperator at the requested replica count

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use custom_operator::controller::{error_policy, reconcile, Context};
use custom_operator::crd::CustomOperator;
use custom_operator::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use custom_operator::FIELD_MANAGER;

/// custom-operator - reconciles CustomOperator resources into Deployments
#[derive(Parser, Debug)]
#[command(name = "custom-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CustomOperator CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Only watch CustomOperators in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Install or update the CustomOperator CRD before starting
    #[arg(long, env = "INSTALL_CRDS")]
    install_crds: bool,

    /// Seconds to wait before retrying a failed reconcile
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value = "5")]
    error_requeue_secs: u64,

    /// Log line format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&CustomOperator::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        filter: None,
    })?;

    run_controller(cli).await
}

/// Ensure the CustomOperator CRD is installed
///
/// Uses server-side apply so the installed schema always matches this binary.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let crd = CustomOperator::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generated CRD has no name"))?;

    tracing::info!(crd = %name, "Installing CustomOperator CRD...");
    crds.patch(&name, &params, &Patch::Apply(&crd))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install CustomOperator CRD: {}", e))?;

    Ok(())
}

/// Run the CustomOperator controller until a shutdown signal arrives
async fn run_controller(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("custom-operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if cli.install_crds {
        ensure_crds_installed(&client).await?;
    }

    let (instances, deployments): (Api<CustomOperator>, Api<Deployment>) = match &cli.namespace {
        Some(ns) => {
            tracing::info!(namespace = %ns, "Watching a single namespace");
            (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            )
        }
        None => {
            tracing::info!("Watching all namespaces");
            (Api::all(client.clone()), Api::all(client.clone()))
        }
    };

    let ctx = Arc::new(
        Context::builder(client)
            .error_requeue(Duration::from_secs(cli.error_requeue_secs))
            .build(),
    );

    tracing::info!(
        error_requeue_secs = cli.error_requeue_secs,
        "Starting CustomOperator controller"
    );

    Controller::new(instances, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((instance, action)) => {
                    tracing::debug!(instance = %instance, ?action, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("custom-operator shutting down");
    Ok(())
}
