//! # clusterdock-runtime
//!
//! The container runtime seam for clusterdock.
//!
//! The orchestration core never talks to Docker directly. It holds an
//! `Arc<dyn Runtime>` and issues image, network, container, exec, archive
//! and commit requests through it.
//!
//! Two implementations ship with the crate:
//! - [`DockerRuntime`] (feature `docker`, on by default) - bollard client
//!   for a local or remote Docker daemon
//! - [`FakeRuntime`] - in-memory runtime that records calls, for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use clusterdock_runtime::{ContainerSpec, DockerRuntime, Runtime, RuntimeExt};
//!
//! let runtime = DockerRuntime::connect()?;
//! runtime.ensure_image("alpine:latest", false).await?;
//! let id = runtime.create_container(&ContainerSpec::new("alpine:latest")).await?;
//! runtime.start_container(&id).await?;
//! ```

#![warn(missing_docs)]

pub mod config;
#[cfg(feature = "docker")]
pub mod docker;
pub mod error;
pub mod fake;
pub mod runtime;
pub mod status;

// Re-exports
pub use config::{BindMount, CommitSpec, ContainerSpec, EndpointSpec, ExecSpec, HostSpec, NetworkSpec};
#[cfg(feature = "docker")]
pub use docker::DockerRuntime;
pub use error::{ContainerId, RuntimeError, RuntimeResult};
pub use fake::{Call, FakeRuntime, ScriptedExec};
pub use runtime::{
    ListOptions, RemoveOptions, Runtime, RuntimeExt, RuntimeFuture, RuntimeStream, StopOptions,
};
pub use status::{
    ContainerDetails, ContainerSummary, ImageInfo, NetworkEndpoint, NetworkInfo, OutputChunk,
    PortBinding, PushProgress,
};
