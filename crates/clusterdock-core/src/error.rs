//! Error types for cluster orchestration.

use std::time::Duration;

use clusterdock_runtime::RuntimeError;
use thiserror::Error;

/// Errors that can occur while building, starting or driving a cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Invalid topology, settings or override.
    #[error("configuration error: {0}")]
    Config(String),

    /// A cluster with the requested name is already running.
    #[error("cluster name {name} is already in use (active clusters: {})", .clusters.join(", "))]
    DuplicateClusterName {
        /// Requested name.
        name: String,
        /// Names of all active clusters.
        clusters: Vec<String>,
    },

    /// Nodes with the incoming hostnames already exist on the target network.
    #[error("hostnames {} already exist on network {network}", .duplicates.join(", "))]
    DuplicateHostnames {
        /// Conflicting hostnames, sorted.
        duplicates: Vec<String>,
        /// Target network.
        network: String,
    },

    /// A readiness condition did not hold before its deadline.
    #[error("timed out after {}s waiting for {condition}", .timeout.as_secs_f64())]
    Timeout {
        /// What was being waited for.
        condition: String,
        /// How long we waited.
        timeout: Duration,
    },

    /// An operation needs a node that has not been started.
    #[error("node {0} has not been started")]
    NotStarted(String),

    /// A tar archive could not be built or read.
    #[error("archive error: {0}")]
    Archive(String),

    /// The container runtime rejected a request.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_cluster_name_display() {
        let err = ClusterError::DuplicateClusterName {
            name: "brave_turing".to_string(),
            clusters: vec!["brave_turing".to_string(), "calm_hopper".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "cluster name brave_turing is already in use (active clusters: brave_turing, calm_hopper)"
        );
    }

    #[test]
    fn test_duplicate_hostnames_display() {
        let err = ClusterError::DuplicateHostnames {
            duplicates: vec!["node-1".to_string(), "node-2".to_string()],
            network: "cluster".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "hostnames node-1, node-2 already exist on network cluster"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = ClusterError::Timeout {
            condition: "node-1.cluster to be running".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 30s waiting for node-1.cluster to be running"
        );
    }

    #[test]
    fn test_runtime_error_is_transparent() {
        let err: ClusterError = RuntimeError::api(500, "boom").into();
        assert_eq!(err.to_string(), "runtime API error (500): boom");
    }
}
