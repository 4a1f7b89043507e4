//! Cluster access for the CustomOperator controller
//!
//! The reconcile loop only ever talks to the cluster through [`KubeClient`],
//! so tests can swap in a mock or an in-memory cluster.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::{CustomOperator, CustomOperatorStatus};
use crate::error::{is_not_found, Operation};
use crate::{Error, FIELD_MANAGER};

/// Kind string used in errors and logs for the managed child
pub const DEPLOYMENT_KIND: &str = "Deployment";

/// Kind string used in errors and logs for the custom resource
pub const CUSTOM_OPERATOR_KIND: &str = "CustomOperator";

/// Trait abstracting Kubernetes operations needed by the reconcile loop
///
/// Reads return `Ok(None)` when the object does not exist. The CustomOperator
/// spec is read-only to the controller, so the only write on it is the
/// status subresource.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Read a CustomOperator by namespace and name
    async fn get_custom_operator(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CustomOperator>, Error>;

    /// Read a Deployment by namespace and name
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;

    /// Create a Deployment
    ///
    /// Fails with [`Error::AlreadyExists`] if the name is taken.
    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Replace a Deployment previously read from the cluster
    ///
    /// The object's `resourceVersion` is sent along, so a concurrent
    /// modification fails with [`Error::Conflict`] instead of being
    /// overwritten.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Merge-patch the status subresource of a CustomOperator
    async fn patch_custom_operator_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CustomOperatorStatus,
    ) -> Result<(), Error>;
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

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn custom_operators(&self, namespace: &str) -> Api<CustomOperator> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Merge patch that sets the status subresource to exactly `status`
///
/// A merge patch only removes fields sent as `null`, so every field is
/// listed, cleared ones included.
pub(crate) fn status_patch(status: &CustomOperatorStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "phase": status.phase,
            "deploymentName": status.deployment_name,
            "observedReplicas": status.observed_replicas,
            "readyReplicas": status.ready_replicas,
            "observedGeneration": status.observed_generation,
            "message": status.message,
        }
    })
}

/// Namespace and name of an object about to be written
fn identity(deployment: &Deployment) -> Result<(String, String), Error> {
    let name = deployment.name_any();
    let namespace = deployment.namespace().ok_or_else(|| {
        Error::validation_for_field(
            format!("{DEPLOYMENT_KIND} {name}"),
            "metadata.namespace",
            "deployment has no namespace",
        )
    })?;
    Ok((namespace, name))
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_custom_operator(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CustomOperator>, Error> {
        match self.custom_operators(namespace).get(name).await {
            Ok(instance) => Ok(Some(instance)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::request(
                Operation::Get,
                CUSTOM_OPERATOR_KIND,
                namespace,
                name,
                e,
            )),
        }
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        match self.deployments(namespace).get(name).await {
            Ok(deployment) => Ok(Some(deployment)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::request(
                Operation::Get,
                DEPLOYMENT_KIND,
                namespace,
                name,
                e,
            )),
        }
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let (namespace, name) = identity(deployment)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        self.deployments(&namespace)
            .create(&params, deployment)
            .await
            .map_err(|e| Error::request(Operation::Create, DEPLOYMENT_KIND, &namespace, &name, e))?;

        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let (namespace, name) = identity(deployment)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        self.deployments(&namespace)
            .replace(&name, &params, deployment)
            .await
            .map_err(|e| Error::request(Operation::Update, DEPLOYMENT_KIND, &namespace, &name, e))?;

        Ok(())
    }

    async fn patch_custom_operator_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CustomOperatorStatus,
    ) -> Result<(), Error> {
        self.custom_operators(namespace)
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&status_patch(status)),
            )
            .await
            .map_err(|e| {
                Error::request(
                    Operation::PatchStatus,
                    CUSTOM_OPERATOR_KIND,
                    namespace,
                    name,
                    e,
                )
            })?;

        Ok(())
    }
}
