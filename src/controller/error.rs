//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

use crate::upgrade::PassAborted;
use crate::upgrade::node::UpgradeNode;

/// Error type for controller and upgrade operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The live object no longer carries the UID observed in the cache
    #[error("Precondition failed for node {node}: uid {uid} no longer matches the live object")]
    PreconditionFailed { node: String, uid: String },

    /// An admission predicate could not reach a verdict
    #[error("Predicate {predicate} failed for node {node}: {reason}")]
    Predicate {
        predicate: String,
        node: String,
        reason: String,
    },

    /// Updating quorum membership ahead of a master removal failed
    #[error("Quorum reconfiguration failed for node {node}: {reason}")]
    QuorumReconfiguration { node: String, reason: String },

    /// Error talking to the managed cluster's own API
    #[error("Cluster API error: {0}")]
    ClusterApi(String),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permanent error that should not be retried
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// A rolling upgrade pass stopped partway, possibly after deleting nodes
    #[error(transparent)]
    PassAborted(Box<PassAborted>),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            Error::PassAborted(aborted) => aborted.error.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates the object changed under us
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::PreconditionFailed { .. } => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 409,
            Error::PassAborted(aborted) => aborted.error.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            // A stale cache resolves itself on the next watch event
            Error::PreconditionFailed { .. } => true,
            Error::Predicate { .. } | Error::QuorumReconfiguration { .. } => true,
            Error::ClusterApi(_) | Error::Transient(_) => true,
            Error::Validation(_) | Error::Permanent(_) | Error::MissingField(_) => false,
            Error::PassAborted(aborted) => aborted.error.is_retryable(),
        }
    }

    /// Nodes deleted by a pass before it stopped on this error
    pub fn deleted_nodes(&self) -> &[UpgradeNode] {
        match self {
            Error::PassAborted(aborted) => &aborted.deleted,
            _ => &[],
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_conflict() {
            Duration::from_secs(5)
        } else if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(3600)
        }
    }
}

impl From<PassAborted> for Error {
    fn from(aborted: PassAborted) -> Self {
        Error::PassAborted(Box::new(aborted))
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
