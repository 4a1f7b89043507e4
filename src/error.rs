//! Error types for the custom-operator controller
//!
//! Errors carry the kind, namespace and name of the object involved so a
//! failed reconcile can be diagnosed from the log line alone.

use std::fmt;

use thiserror::Error;

/// HTTP status returned by the API server on create/update conflicts
const HTTP_CONFLICT: u16 = 409;

/// HTTP status returned by the API server when an object does not exist
const HTTP_NOT_FOUND: u16 = 404;

/// Cluster operation that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Read a single object
    Get,
    /// Create a new object
    Create,
    /// Replace an existing object
    Update,
    /// Merge-patch the status subresource
    PatchStatus,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::PatchStatus => write!(f, "patch status of"),
        }
    }
}

/// Main error type for custom-operator reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API request failed
    #[error("failed to {operation} {kind} {namespace}/{name}: {source}")]
    Request {
        /// What was attempted
        operation: Operation,
        /// Object kind (e.g. "Deployment")
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Create failed because an object with the same name exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Object kind
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// Update failed because the object changed since it was read
    #[error("conflict updating {kind} {namespace}/{name}: object was modified")]
    Conflict {
        /// Object kind
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The CustomOperator spec (or its identity) cannot be reconciled
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource the error applies to, as `namespace/name`
        resource: String,
        /// The invalid field path (e.g. "spec.replicas")
        field: Option<String>,
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Wrap a kube-rs error with the object it concerns.
    ///
    /// A 409 is classified as [`Error::AlreadyExists`] for creates and
    /// [`Error::Conflict`] for updates.
    pub fn request(
        operation: Operation,
        kind: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: kube::Error,
    ) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        match operation {
            Operation::Create if is_status(&source, HTTP_CONFLICT) => Self::AlreadyExists {
                kind,
                namespace,
                name,
            },
            Operation::Update if is_status(&source, HTTP_CONFLICT) => Self::Conflict {
                kind,
                namespace,
                name,
            },
            _ => Self::Request {
                operation,
                kind,
                namespace,
                name,
                source,
            },
        }
    }

    /// Create a validation error for the given resource
    pub fn validation(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: None,
            message: msg.into(),
        }
    }

    /// Create a validation error pointing at a specific field
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Check if this error is worth retrying without a spec change
    ///
    /// Validation errors need the user to edit the resource; everything
    /// else may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }

    /// The object kind this error is about, if known
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::Request { kind, .. }
            | Self::AlreadyExists { kind, .. }
            | Self::Conflict { kind, .. } => Some(*kind),
            Self::Validation { .. } => None,
        }
    }
}

/// Returns true if the kube-rs error is an API response with the given code
pub(crate) fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

/// Returns true if the kube-rs error is a 404 from the API server
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    is_status(err, HTTP_NOT_FOUND)
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} (test)"),
        reason: reason.to_string(),
        code,
    })
}
