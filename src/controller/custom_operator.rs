//! CustomOperator controller implementation
//!
//! Each pass reads the CustomOperator and its Deployment straight from the
//! API server, creates the Deployment if it is missing, corrects replica
//! drift if there is any, and reports what it saw in the status
//! subresource. Nothing is remembered between passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::client::{KubeClient, KubeClientImpl};
use crate::crd::{CustomOperator, CustomOperatorPhase, CustomOperatorStatus};
use crate::workload::{current_replicas, deployment_name, desired_deployment, ready_replicas};
use crate::Error;

/// Default delay before retrying a failed reconcile
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Namespaced name of a CustomOperator, the unit of work for the loop
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    /// Namespace of the CustomOperator
    pub namespace: String,
    /// Name of the CustomOperator
    pub name: String,
}

impl InstanceKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a watched CustomOperator
    ///
    /// CustomOperator is namespaced, so an object without a namespace can
    /// only come from a malformed event.
    pub fn for_instance(instance: &CustomOperator) -> Result<Self, Error> {
        let name = instance.name_any();
        let namespace = instance.namespace().ok_or_else(|| {
            Error::validation_for_field(
                name.clone(),
                "metadata.namespace",
                "CustomOperator has no namespace",
            )
        })?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a successful reconcile pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged (or nothing to do); wait for the next change
    Done,
    /// Run again for the same key after the given delay
    Requeue {
        /// Delay before the next pass; zero means immediately
        after: Duration,
    },
}

impl ReconcileOutcome {
    /// Requeue without delay
    pub const fn requeue_immediate() -> Self {
        Self::Requeue {
            after: Duration::ZERO,
        }
    }

    /// Translate into the kube-rs controller action
    pub fn into_action(self) -> Action {
        match self {
            Self::Done => Action::await_change(),
            Self::Requeue { after } => Action::requeue(after),
        }
    }
}

/// Controller context shared by all reconcile calls
pub struct Context {
    /// Cluster access (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Delay before retrying after a retryable error
    pub error_requeue: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context with default settings
    pub fn new(client: Client) -> Self {
        Self::builder(client).build()
    }

    /// Create a context for testing with a custom cluster client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    error_requeue: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }

    /// Set the retry delay used by [`error_policy`]
    pub fn error_requeue(mut self, delay: Duration) -> Self {
        self.error_requeue = delay;
        self
    }

    /// Override the cluster client
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            error_requeue: self.error_requeue,
        }
    }
}

/// Reconcile the CustomOperator identified by `key`
///
/// Performs at most one Deployment create-or-update and at most one status
/// write. Every failure is returned as-is; retrying is the caller's job.
#[instrument(skip(ctx), fields(instance = %key))]
pub async fn reconcile_instance(
    key: &InstanceKey,
    ctx: &Context,
) -> Result<ReconcileOutcome, Error> {
    let Some(instance) = ctx
        .kube
        .get_custom_operator(&key.namespace, &key.name)
        .await?
    else {
        // Owned Deployment is garbage collected through its owner reference
        info!("CustomOperator not found, ignoring since it must have been deleted");
        return Ok(ReconcileOutcome::Done);
    };

    if let Err(e) = instance.validate() {
        warn!(error = %e, "CustomOperator spec is invalid, waiting for a spec change");
        let status = CustomOperatorStatus::with_phase(CustomOperatorPhase::Failed)
            .message(e.to_string())
            .observed_generation(instance.metadata.generation);
        update_status(&instance, key, status, ctx).await?;
        return Ok(ReconcileOutcome::Done);
    }

    let name = deployment_name(&instance);
    let desired = instance.desired_replicas();

    let Some(mut deployment) = ctx.kube.get_deployment(&key.namespace, &name).await? else {
        let deployment = desired_deployment(&instance);
        info!(deployment = %name, replicas = desired, "creating Deployment");

        if let Err(e) = ctx.kube.create_deployment(&deployment).await {
            error!(
                error = %e,
                deployment = %name,
                namespace = %key.namespace,
                "failed to create Deployment"
            );
            return Err(e);
        }

        // Our own write may not be visible yet; compare on the next pass
        info!(deployment = %name, "Deployment created");
        return Ok(ReconcileOutcome::requeue_immediate());
    };

    let current = current_replicas(&deployment);
    if current == Some(desired) {
        debug!(deployment = %name, replicas = desired, "Deployment already has desired replicas");
    } else {
        info!(
            deployment = %name,
            current = ?current,
            desired,
            "scaling Deployment to desired replicas"
        );
        deployment.spec.get_or_insert_with(Default::default).replicas = Some(desired);

        if let Err(e) = ctx.kube.update_deployment(&deployment).await {
            error!(
                error = %e,
                deployment = %name,
                namespace = %key.namespace,
                "failed to update Deployment"
            );
            return Err(e);
        }
        info!(deployment = %name, replicas = desired, "Deployment scaled");
    }

    let status = observed_status(&instance, &name, &deployment);
    update_status(&instance, key, status, ctx).await?;

    Ok(ReconcileOutcome::Done)
}

/// Reconcile entry point for the kube-rs controller
///
/// The watched object is only used for its key. The instance is re-read
/// from the API server, since the watch cache may lag behind.
pub async fn reconcile(instance: Arc<CustomOperator>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = InstanceKey::for_instance(&instance)?;
    reconcile_instance(&key, &ctx)
        .await
        .map(ReconcileOutcome::into_action)
}

/// Error policy for the controller
///
/// Retryable errors requeue after the configured delay. Validation errors
/// wait for the object to change.
pub fn error_policy(instance: Arc<CustomOperator>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        error = %error,
        instance = %instance.resource_id(),
        kind = error.kind().unwrap_or("CustomOperator"),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(ctx.error_requeue)
    } else {
        Action::await_change()
    }
}

/// Status describing `deployment` as seen by this pass
fn observed_status(
    instance: &CustomOperator,
    deployment_name: &str,
    deployment: &Deployment,
) -> CustomOperatorStatus {
    let desired = instance.desired_replicas();
    let observed = current_replicas(deployment);
    let ready = ready_replicas(deployment);

    let phase = if observed == Some(desired) && ready == desired {
        CustomOperatorPhase::Ready
    } else {
        CustomOperatorPhase::Scaling
    };

    CustomOperatorStatus {
        phase,
        deployment_name: Some(deployment_name.to_string()),
        observed_replicas: observed,
        ready_replicas: Some(ready),
        observed_generation: instance.metadata.generation,
        message: Some(format!("{ready}/{desired} replicas ready")),
    }
}

/// Write `status` unless the instance already reports it
async fn update_status(
    instance: &CustomOperator,
    key: &InstanceKey,
    status: CustomOperatorStatus,
    ctx: &Context,
) -> Result<(), Error> {
    if instance.status.as_ref() == Some(&status) {
        debug!("status unchanged, skipping update");
        return Ok(());
    }

    debug!(phase = %status.phase, "updating status");
    ctx.kube
        .patch_custom_operator_status(&key.namespace, &key.name, &status)
        .await
}
