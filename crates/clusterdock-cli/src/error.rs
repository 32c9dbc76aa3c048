//! CLI error types.

use clusterdock_core::ClusterError;
use clusterdock_runtime::RuntimeError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Orchestration failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// A direct runtime call failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// No active cluster has this name.
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_cluster_not_found() {
        let err = CliError::ClusterNotFound("calm_hopper".into());
        assert_eq!(err.to_string(), "cluster not found: calm_hopper");
    }

    #[test]
    fn cli_error_wraps_cluster_error() {
        let err = CliError::from(ClusterError::NotStarted("node-1".into()));
        assert_eq!(
            err.to_string(),
            ClusterError::NotStarted("node-1".into()).to_string()
        );
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
