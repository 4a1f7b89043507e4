//! Desired Deployment for a CustomOperator
//!
//! Everything here is pure: the same CustomOperator always produces the same
//! Deployment, and nothing talks to the API server.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};

use crate::crd::CustomOperator;

/// Suffix appended to the instance name to form the Deployment name
pub const DEPLOYMENT_SUFFIX: &str = "deployment";

/// Value of the `app` label on every managed object
pub const APP_LABEL_VALUE: &str = "replicas";

/// Label key carrying the owning CustomOperator's name
pub const INSTANCE_LABEL: &str = "customoperator_cr";

/// Name of the single workload container
pub const CONTAINER_NAME: &str = "app";

/// Name of the workload container's port
pub const PORT_NAME: &str = "http";

/// Name of the Deployment managed for `instance`
pub fn deployment_name(instance: &CustomOperator) -> String {
    format!("{}-{}", instance.name_any(), DEPLOYMENT_SUFFIX)
}

/// Labels selecting the pods that belong to the named CustomOperator
///
/// These are used as the Deployment selector, which Kubernetes treats as
/// immutable, so they must never depend on anything but the instance name.
pub fn selector_labels(instance_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_LABEL_VALUE.to_string()),
        (INSTANCE_LABEL.to_string(), instance_name.to_string()),
    ])
}

/// Build the Deployment `instance` should own
///
/// The owner reference is set whenever the instance has a uid, which is
/// always the case for objects read from the API server.
pub fn desired_deployment(instance: &CustomOperator) -> Deployment {
    let labels = selector_labels(&instance.name_any());

    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(instance)),
            namespace: instance.namespace(),
            labels: Some(labels.clone()),
            owner_references: instance.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(instance.desired_replicas()),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec(instance)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_spec(instance: &CustomOperator) -> PodSpec {
    PodSpec {
        containers: vec![Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(instance.spec.image().to_string()),
            ports: Some(vec![ContainerPort {
                name: Some(PORT_NAME.to_string()),
                container_port: instance.spec.container_port(),
                ..Default::default()
            }]),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Replica count currently requested on a Deployment's spec
pub fn current_replicas(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|s| s.replicas)
}

/// Ready pods reported on a Deployment's status
pub fn ready_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}
