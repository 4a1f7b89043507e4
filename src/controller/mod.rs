//! Controller for CustomOperator resources
//!
//! The reconcile loop follows the usual observe-diff-act shape: read the
//! instance and its Deployment, create or scale the Deployment, then report
//! status.

mod client;
mod custom_operator;

pub use client::{KubeClient, KubeClientImpl, CUSTOM_OPERATOR_KIND, DEPLOYMENT_KIND};
pub use custom_operator::{
    error_policy, reconcile, reconcile_instance, Context, ContextBuilder, InstanceKey,
    ReconcileOutcome, DEFAULT_ERROR_REQUEUE,
};
