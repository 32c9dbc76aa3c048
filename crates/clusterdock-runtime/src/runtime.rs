//! Container runtime trait definition.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

use super::config::{CommitSpec, ContainerSpec, ExecSpec, NetworkSpec};
use super::error::{ContainerId, RuntimeResult};
use super::status::{
    ContainerDetails, ContainerSummary, ImageInfo, NetworkInfo, OutputChunk, PushProgress,
};

/// Boxed future returned by [`Runtime`] methods.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = RuntimeResult<T>> + Send + 'a>>;

/// Boxed stream returned by streaming [`Runtime`] methods.
pub type RuntimeStream<'a, T> = Pin<Box<dyn Stream<Item = RuntimeResult<T>> + Send + 'a>>;

/// Options for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Include stopped containers.
    pub all: bool,

    /// Filter by label (`key` or `key=value`).
    pub label_filter: Option<String>,
}

impl ListOptions {
    /// Create options for listing all containers.
    #[must_use]
    pub fn all() -> Self {
        Self {
            all: true,
            ..Default::default()
        }
    }

    /// Filter by label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label_filter = Some(label.into());
        self
    }
}

/// Options for stopping a container.
#[derive(Debug, Clone)]
pub struct StopOptions {
    /// Seconds to wait before killing.
    pub timeout_secs: u32,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Force removal of running container.
    pub force: bool,

    /// Remove anonymous volumes along with the container.
    pub volumes: bool,
}

impl RemoveOptions {
    /// Create options with force removal.
    #[must_use]
    pub fn force() -> Self {
        Self {
            force: true,
            volumes: false,
        }
    }

    /// Remove volumes along with container.
    #[must_use]
    pub fn with_volumes(mut self) -> Self {
        self.volumes = true;
        self
    }
}

/// Container runtime the orchestration core talks to.
///
/// Object safe, so one `Arc<dyn Runtime>` can be shared by a cluster and all
/// of its nodes and swapped for a fake in tests.
pub trait Runtime: Send + Sync {
    /// Inspect an image. A missing image is a 404 "No such image" API error.
    fn inspect_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()>;

    /// Pull an image, waiting for the pull to finish.
    fn pull_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()>;

    /// Create a network. Fails with a 409 when the name is taken.
    fn create_network<'a>(&'a self, spec: &'a NetworkSpec) -> RuntimeFuture<'a, NetworkInfo>;

    /// Inspect a network by name or ID.
    fn inspect_network<'a>(&'a self, name: &'a str) -> RuntimeFuture<'a, NetworkInfo>;

    /// List containers.
    fn list_containers<'a>(
        &'a self,
        options: &'a ListOptions,
    ) -> RuntimeFuture<'a, Vec<ContainerSummary>>;

    /// Create a container.
    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> RuntimeFuture<'a, ContainerId>;

    /// Start a container.
    fn start_container<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;

    /// Stop a container.
    fn stop_container<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a StopOptions,
    ) -> RuntimeFuture<'a, ()>;

    /// Remove a container.
    fn remove_container<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a RemoveOptions,
    ) -> RuntimeFuture<'a, ()>;

    /// Inspect a container.
    fn inspect_container<'a>(&'a self, id: &'a ContainerId)
    -> RuntimeFuture<'a, ContainerDetails>;

    /// Wait for a container to exit, returning its exit code.
    fn wait_container<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, i64>;

    /// Create an exec instance, returning its ID.
    fn create_exec<'a>(&'a self, id: &'a ContainerId, spec: &'a ExecSpec)
    -> RuntimeFuture<'a, String>;

    /// Start an exec instance and stream its demultiplexed output in arrival
    /// order. A detached exec yields an empty stream.
    fn start_exec<'a>(
        &'a self,
        exec_id: &'a str,
        detach: bool,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, OutputChunk>>;

    /// Exit code of an exec instance, `None` while it is still running.
    fn inspect_exec<'a>(&'a self, exec_id: &'a str) -> RuntimeFuture<'a, Option<i64>>;

    /// Stream a tar archive of `path` out of a container.
    fn get_archive<'a>(
        &'a self,
        id: &'a ContainerId,
        path: &'a str,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, Vec<u8>>>;

    /// Extract a tar archive into a container at `path`.
    fn put_archive<'a>(
        &'a self,
        id: &'a ContainerId,
        path: &'a str,
        archive: Vec<u8>,
    ) -> RuntimeFuture<'a, ()>;

    /// Commit a container to an image.
    fn commit_container<'a>(
        &'a self,
        id: &'a ContainerId,
        spec: &'a CommitSpec,
    ) -> RuntimeFuture<'a, ImageInfo>;

    /// Push an image, streaming progress records.
    fn push_image<'a>(
        &'a self,
        repository: &'a str,
        tag: Option<&'a str>,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, PushProgress>>;
}

/// Extension trait for convenient runtime operations.
pub trait RuntimeExt: Runtime {
    /// Make sure `image` is available locally.
    ///
    /// With `pull` set the image is always pulled. Otherwise it is inspected
    /// and pulled only when the runtime reports "No such image"; any other
    /// inspect failure propagates.
    fn ensure_image<'a>(&'a self, image: &'a str, pull: bool) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            if pull {
                tracing::info!(image, "pulling image");
                return self.pull_image(image).await;
            }
            match self.inspect_image(image).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_missing_image() => {
                    tracing::info!(image, "image not found locally, pulling");
                    self.pull_image(image).await
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Create, start and wait for a container, then remove it.
    fn run_to_completion<'a>(&'a self, spec: &'a ContainerSpec) -> RuntimeFuture<'a, i64> {
        Box::pin(async move {
            let id = self.create_container(spec).await?;
            self.start_container(&id).await?;
            let exit_code = self.wait_container(&id).await?;
            if !spec.host.auto_remove {
                self.remove_container(&id, &RemoveOptions::force()).await?;
            }
            Ok(exit_code)
        })
    }
}

// Blanket implementation for all Runtime implementations
impl<T: Runtime + ?Sized> RuntimeExt for T {}
