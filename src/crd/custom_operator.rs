//! CustomOperator Custom Resource Definition
//!
//! A CustomOperator declares how many replicas of a single-container workload
//! should run in its namespace. The controller owns exactly one Deployment
//! per CustomOperator.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Image used when `spec.image` is not set
pub const DEFAULT_IMAGE: &str = "nginx:latest";

/// Container port used when `spec.containerPort` is not set
pub const DEFAULT_CONTAINER_PORT: i32 = 80;

/// Longest instance name that still fits in a label value
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Specification for a CustomOperator
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "replica.example.com",
    version = "v1alpha1",
    kind = "CustomOperator",
    plural = "customoperators",
    shortname = "co",
    status = "CustomOperatorStatus",
    namespaced,
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CustomOperatorSpec {
    /// Number of pods the managed Deployment should run
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Container image for the workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Port the workload container listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 65535))]
    pub container_port: Option<i32>,
}

impl CustomOperatorSpec {
    /// Image to run, falling back to [`DEFAULT_IMAGE`]
    pub fn image(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    /// Container port, falling back to [`DEFAULT_CONTAINER_PORT`]
    pub fn container_port(&self) -> i32 {
        self.container_port.unwrap_or(DEFAULT_CONTAINER_PORT)
    }
}

impl CustomOperator {
    /// `namespace/name` of this instance, for messages
    pub fn resource_id(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Validate the instance before acting on it
    ///
    /// The API server enforces the schema ranges, but objects created
    /// against an older CRD (or with validation disabled) can still hold
    /// values the Deployment API would reject.
    pub fn validate(&self) -> Result<(), Error> {
        let resource = self.resource_id();

        if self.spec.replicas < 0 {
            return Err(Error::validation_for_field(
                resource,
                "spec.replicas",
                format!("replicas must be >= 0, got {}", self.spec.replicas),
            ));
        }

        if let Some(image) = &self.spec.image {
            if image.trim().is_empty() {
                return Err(Error::validation_for_field(
                    resource,
                    "spec.image",
                    "image must not be empty",
                ));
            }
        }

        let port = self.spec.container_port();
        if !(1..=65535).contains(&port) {
            return Err(Error::validation_for_field(
                resource,
                "spec.containerPort",
                format!("containerPort must be between 1 and 65535, got {port}"),
            ));
        }

        // The instance name is used verbatim as a selector label value
        if self.name_any().len() > MAX_LABEL_VALUE_LEN {
            return Err(Error::validation_for_field(
                resource,
                "metadata.name",
                format!("name must be at most {MAX_LABEL_VALUE_LEN} characters"),
            ));
        }

        Ok(())
    }

    /// Desired replica count
    pub fn desired_replicas(&self) -> i32 {
        self.spec.replicas
    }
}

/// Lifecycle phase reported in the status subresource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum CustomOperatorPhase {
    /// Nothing observed yet
    #[default]
    Pending,
    /// Deployment exists but not all desired pods are ready
    Scaling,
    /// Deployment runs the desired number of ready pods
    Ready,
    /// Spec is invalid and needs to be changed
    Failed,
}

impl std::fmt::Display for CustomOperatorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Scaling => write!(f, "Scaling"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status for a CustomOperator
///
/// Holds no timestamps so that an unchanged observation produces an
/// identical status and no write.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomOperatorStatus {
    /// Current phase
    #[serde(default)]
    pub phase: CustomOperatorPhase,

    /// Name of the managed Deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,

    /// Replica count last observed on the Deployment spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_replicas: Option<i32>,

    /// Ready pods last reported by the Deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,

    /// `metadata.generation` of the spec this status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CustomOperatorStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: CustomOperatorPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Set the observed generation and return self for chaining
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}
