//! Runtime error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by a container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Failed to connect to the runtime daemon.
    #[error("failed to connect to container runtime: {0}")]
    ConnectionFailed(String),

    /// The runtime answered a request with an error response.
    #[error("runtime API error ({status}): {message}")]
    Api {
        /// HTTP-style status code (404, 409, 500, ...).
        status: u16,
        /// Explanation returned by the runtime.
        message: String,
    },

    /// A streamed response broke off or could not be decoded.
    #[error("stream error: {0}")]
    Stream(String),

    /// Internal runtime error.
    #[error("internal runtime error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Build an API error from a status code and explanation.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Status code of an API error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the runtime reported a missing object.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the runtime reported a missing image (404 "No such image").
    ///
    /// Only this case is recovered by pulling; any other inspect failure
    /// must propagate.
    #[must_use]
    pub fn is_missing_image(&self) -> bool {
        matches!(self, Self::Api { status: 404, message } if message.contains("No such image"))
    }

    /// Whether a network create failed because `name` is already taken.
    #[must_use]
    pub fn is_network_exists(&self, name: &str) -> bool {
        match self {
            Self::Api { message, .. } => {
                message.contains(&format!("network with name {name} already exists"))
            }
            _ => false,
        }
    }
}

#[cfg(feature = "docker")]
impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Self::api(status_code, message),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Container ID wrapper for type safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a new container ID from a string.
    ///
    /// # Errors
    ///
    /// Returns error if ID is empty or contains invalid characters.
    pub fn new(id: impl Into<String>) -> RuntimeResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(RuntimeError::Internal(
                "container ID cannot be empty".to_string(),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(RuntimeError::Internal(format!("invalid container ID: {id}")));
        }
        Ok(Self(id))
    }

    /// Create a container ID without validation, for IDs handed back by the runtime.
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the short form (first 12 chars) of the container ID.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_short() {
        let id = ContainerId::new("abc123def456789012345678").expect("valid long hex ID");
        assert_eq!(id.short(), "abc123def456");
        assert_eq!(format!("{id}"), "abc123def456");
    }

    #[test]
    fn test_container_id_short_id_kept_whole() {
        let id = ContainerId::new_unchecked("abc");
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn test_container_id_rejects_bad_input() {
        assert!(ContainerId::new("").is_err());
        assert!(ContainerId::new("my container!").is_err());
    }

    #[test]
    fn test_missing_image_requires_404_and_message() {
        assert!(RuntimeError::api(404, "No such image: alpine:latest").is_missing_image());
        assert!(!RuntimeError::api(404, "No such container: abc").is_missing_image());
        assert!(!RuntimeError::api(500, "No such image: alpine").is_missing_image());
        assert!(!RuntimeError::Internal("No such image".into()).is_missing_image());
    }

    #[test]
    fn test_network_exists_matches_name() {
        let err = RuntimeError::api(409, "network with name cluster already exists");
        assert!(err.is_network_exists("cluster"));
        assert!(!err.is_network_exists("other"));
        assert!(!RuntimeError::api(500, "boom").is_network_exists("cluster"));
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::api(404, "No such container: abc");
        assert_eq!(err.to_string(), "runtime API error (404): No such container: abc");
        assert!(err.is_not_found());
        assert_eq!(RuntimeError::Stream("eof".into()).status(), None);
    }
}
