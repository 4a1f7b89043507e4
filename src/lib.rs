//! custom-operator - keeps one Deployment per CustomOperator at the requested
//! replica count
//!
//! A CustomOperator is a namespaced custom resource that asks for N replicas
//! of a single-container workload. The controller creates a Deployment owned
//! by the CustomOperator, scales it back whenever its replica count drifts,
//! and reports progress in the CustomOperator status.
//!
//! # Modules
//!
//! - [`crd`] - The CustomOperator Custom Resource Definition
//! - [`workload`] - Pure construction of the desired Deployment
//! - [`controller`] - Cluster access and the reconcile loop
//! - [`telemetry`] - Log subscriber setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for every write the controller makes
pub const FIELD_MANAGER: &str = "custom-operator";
