//! A single cluster host backed by one container.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use clusterdock_runtime::{
    BindMount, CommitSpec, ContainerId, ContainerSpec, ImageInfo, RemoveOptions, Runtime,
    RuntimeError, RuntimeExt, StopOptions,
};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive;
use crate::error::{ClusterError, Result};
use crate::exec::{self, ExecuteOptions, ExecuteResult};
use crate::labels;
use crate::poll::Poller;
use crate::settings::{self, Settings};
use crate::topology::{NodeSpec, Port, Volume};

/// Hook run after a node's container is created and before it is started.
pub type PreStartHook = dyn Fn(&ContainerId, &Node) -> Result<()> + Send + Sync;

/// Where a node is in its lifecycle.
///
/// Startup walks the states in declaration order up to `Established`. A
/// failed start leaves the node in the last state it reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not started yet.
    Unstarted,
    /// FQDN and container configuration assembled.
    Configured,
    /// Network endpoint configured.
    NetworkConfigured,
    /// Container created.
    Created,
    /// Container started and attached to the network.
    Connected,
    /// Container reports running.
    Running,
    /// Services inside the container answer.
    ServiceReady,
    /// Fully started and registered.
    Established,
    /// Stopped or removed. A stopped node cannot be restarted.
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unstarted => "unstarted",
            Self::Configured => "configured",
            Self::NetworkConfigured => "network_configured",
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Running => "running",
            Self::ServiceReady => "service_ready",
            Self::Established => "established",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Runtime state of a node, known once its container is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedNode {
    /// `<hostname>.<network>`.
    pub fqdn: String,
    /// Network the node is attached to.
    pub network: String,
    /// Container backing the node.
    pub container_id: ContainerId,
    /// Address on the cluster network.
    pub ip_address: Option<String>,
    /// Container port to published host port.
    pub host_ports: BTreeMap<u16, u16>,
}

/// Options for starting nodes.
#[derive(Clone)]
pub struct StartOptions {
    /// Network to attach nodes to.
    pub network: String,
    /// Always pull images, even when present locally.
    pub pull_images: bool,
    /// Register nodes in the host's `/etc/hosts`.
    pub update_etc_hosts: bool,
    /// Hook run between container creation and start.
    pub pre_start: Option<Arc<PreStartHook>>,
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOptions")
            .field("network", &self.network)
            .field("pull_images", &self.pull_images)
            .field("update_etc_hosts", &self.update_etc_hosts)
            .field("pre_start", &self.pre_start.is_some())
            .finish()
    }
}

impl StartOptions {
    /// Start on `network`, pulling only missing images and updating `/etc/hosts`.
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            pull_images: false,
            update_etc_hosts: true,
            pre_start: None,
        }
    }

    /// Always pull images.
    #[must_use]
    pub fn with_pull_images(mut self, pull_images: bool) -> Self {
        self.pull_images = pull_images;
        self
    }

    /// Enable or disable `/etc/hosts` registration.
    #[must_use]
    pub fn with_etc_hosts(mut self, update_etc_hosts: bool) -> Self {
        self.update_etc_hosts = update_etc_hosts;
        self
    }

    /// Run `hook` after each container is created.
    #[must_use]
    pub fn with_pre_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ContainerId, &Node) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_start = Some(Arc::new(hook));
        self
    }
}

/// Options for committing a node's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOptions {
    /// Commit message.
    pub comment: Option<String>,
    /// Author.
    pub author: Option<String>,
    /// Dockerfile instructions to apply.
    pub changes: Vec<String>,
    /// Pause the container while committing.
    pub pause: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            comment: None,
            author: None,
            changes: Vec::new(),
            pause: true,
        }
    }
}

/// Whether this host supports registering nodes in `/etc/hosts`.
///
/// Not on macOS, where containers are not reachable by IP, and not from
/// inside a container, where the file is not the host's.
pub fn host_allows_etc_hosts_update() -> bool {
    !cfg!(target_os = "macos") && !Path::new("/.dockerenv").exists()
}

/// One cluster host.
pub struct Node {
    spec: NodeSpec,
    runtime: Arc<dyn Runtime>,
    settings: Arc<Settings>,
    state: Mutex<NodeState>,
    fqdn: OnceLock<String>,
    container: OnceLock<ContainerId>,
    started: OnceLock<StartedNode>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("spec", &self.spec)
            .field("state", &*self.state.lock())
            .field("container", &self.container.get())
            .field("started", &self.started.get())
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create an unstarted node.
    pub fn new(spec: NodeSpec, runtime: Arc<dyn Runtime>, settings: Arc<Settings>) -> Self {
        Self {
            spec,
            runtime,
            settings,
            state: Mutex::new(NodeState::Unstarted),
            fqdn: OnceLock::new(),
            container: OnceLock::new(),
            started: OnceLock::new(),
        }
    }

    /// Desired state.
    #[must_use]
    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    /// Short hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.spec.hostname
    }

    /// Node group name.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.spec.group
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Runtime state, once started.
    pub fn started(&self) -> Result<&StartedNode> {
        self.started
            .get()
            .ok_or_else(|| ClusterError::NotStarted(self.spec.hostname.clone()))
    }

    /// `<hostname>.<network>`, known from the first step of a start.
    pub fn fqdn(&self) -> Result<&str> {
        self.fqdn
            .get()
            .map(String::as_str)
            .ok_or_else(|| ClusterError::NotStarted(self.spec.hostname.clone()))
    }

    /// The node's container, once created.
    ///
    /// Set even when a later startup step fails, so the container can still
    /// be stopped or removed.
    pub fn container_id(&self) -> Result<&ContainerId> {
        self.container
            .get()
            .ok_or_else(|| ClusterError::NotStarted(self.spec.hostname.clone()))
    }

    fn transition(&self, state: NodeState) {
        *self.state.lock() = state;
        debug!(hostname = %self.spec.hostname, %state, "node state changed");
    }

    /// Build the container spec for this node.
    ///
    /// `volumes_from` holds the IDs of the containers created for
    /// [`Volume::From`] entries, in order.
    pub fn container_spec(
        &self,
        network: &str,
        cluster_name: &str,
        volumes_from: Vec<String>,
    ) -> ContainerSpec {
        let fqdn = format!("{}.{network}", self.spec.hostname);
        let mut spec = ContainerSpec::new(self.spec.image.as_str()).with_hostname(fqdn);

        spec.host.cap_add = vec!["ALL".to_string()];
        spec.host.security_opt = vec!["seccomp=unconfined".to_string()];
        spec.host.privileged = self.settings.privileged;

        if self.settings.localtime_mount {
            let localtime = self.settings.localtime_path();
            spec = spec.with_bind(BindMount::rw(
                localtime.to_string_lossy().into_owned(),
                "/etc/localtime",
            ));
        } else {
            match settings::host_timezone() {
                Ok(tz) => {
                    spec.env.insert("TZ".to_string(), tz);
                }
                Err(e) => warn!(hostname = %self.spec.hostname, error = %e, "not setting TZ"),
            }
        }

        let options = &self.spec.options;
        spec.command.clone_from(&options.command);
        spec.entrypoint.clone_from(&options.entrypoint);
        spec.user.clone_from(&options.user);
        spec.working_dir.clone_from(&options.working_dir);
        spec.tty = options.tty;
        spec.labels.clone_from(&options.labels);
        spec.labels
            .extend(labels::management_labels(&self.settings.label_key, cluster_name));

        for volume in &self.spec.volumes {
            match volume {
                Volume::Named(paths) => spec.volumes.extend(paths.iter().cloned()),
                Volume::Bind { host, container } => {
                    debug!(hostname = %self.spec.hostname, host, container, "adding bind mount");
                    spec = spec.with_bind(BindMount::rw(host.as_str(), container.as_str()));
                }
                Volume::From(_) => {}
            }
        }
        spec.host.volumes_from = volumes_from;

        for port in &self.spec.ports {
            match port {
                Port::Exposed(container) => {
                    spec.exposed_ports.push(*container);
                    spec.host.port_bindings.insert(*container, None);
                }
                Port::Bound { host, container } => {
                    debug!(hostname = %self.spec.hostname, host, container, "adding port binding");
                    spec.exposed_ports.push(*container);
                    spec.host.port_bindings.insert(*container, Some(*host));
                }
            }
        }

        spec.env.extend(self.spec.environment.clone());
        spec.host.devices.clone_from(&self.spec.devices);

        spec.with_endpoint(network, vec![self.spec.hostname.clone()])
    }

    /// Create a container for each [`Volume::From`] image and return their IDs.
    async fn create_volume_sources(&self, cluster_name: &str, pull_images: bool) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for volume in &self.spec.volumes {
            let Volume::From(image) = volume else {
                continue;
            };
            self.runtime.ensure_image(image, pull_images).await?;

            let mut source = ContainerSpec::new(image.as_str());
            source.labels = labels::management_labels(&self.settings.label_key, cluster_name);
            let id = self.runtime.create_container(&source).await?;
            debug!(hostname = %self.spec.hostname, image, container = %id, "created volume source");
            ids.push(id.as_str().to_string());
        }
        Ok(ids)
    }

    /// Start the node's container and wait for it to be ready.
    ///
    /// Steps run strictly in order and nothing is rolled back on failure.
    pub async fn start(&self, cluster_name: &str, options: &StartOptions) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != NodeState::Unstarted {
                return Err(ClusterError::Config(format!(
                    "node {} cannot be started from state {}",
                    self.spec.hostname, *state
                )));
            }
            *state = NodeState::Configured;
        }

        let network = options.network.as_str();
        let fqdn = self
            .fqdn
            .get_or_init(|| format!("{}.{network}", self.spec.hostname))
            .as_str();
        debug!(hostname = %self.spec.hostname, %fqdn, "node configured");

        let volumes_from = self
            .create_volume_sources(cluster_name, options.pull_images)
            .await?;
        let spec = self.container_spec(network, cluster_name, volumes_from);
        self.transition(NodeState::NetworkConfigured);

        info!(%fqdn, image = %self.spec.image, "starting node");
        self.runtime
            .ensure_image(&self.spec.image, options.pull_images)
            .await?;
        let container_id = self.runtime.create_container(&spec).await?;
        let container_id = self.container.get_or_init(|| container_id);
        self.transition(NodeState::Created);

        if let Some(hook) = &options.pre_start {
            debug!(%fqdn, container = %container_id, "running pre-start hook");
            hook(container_id, self)?;
        }

        self.runtime.start_container(container_id).await?;
        self.transition(NodeState::Connected);

        self.wait_until_running(fqdn, container_id).await?;
        self.transition(NodeState::Running);

        let details = self.runtime.inspect_container(container_id).await?;
        let ip_address = details.ip_address(network).map(ToString::to_string);
        let host_ports = details.host_ports();
        if !host_ports.is_empty() {
            let mapping = host_ports
                .iter()
                .map(|(container, host)| format!("{host} => {container}"))
                .collect::<Vec<_>>()
                .join("; ");
            info!(%fqdn, %mapping, "created host port mapping");
        }

        self.wait_for_sshd(fqdn, container_id).await?;
        self.transition(NodeState::ServiceReady);

        let started = StartedNode {
            fqdn: fqdn.to_string(),
            network: network.to_string(),
            container_id: container_id.clone(),
            ip_address,
            host_ports,
        };
        let started = self.started.get_or_init(|| started);

        if options.update_etc_hosts && host_allows_etc_hosts_update() {
            if let Err(e) = self.add_to_etc_hosts(started, cluster_name).await {
                warn!(%fqdn, error = %e, "failed to add node to /etc/hosts");
            }
        }

        self.transition(NodeState::Established);
        info!(%fqdn, ip = ?started.ip_address, "node started");
        Ok(())
    }

    async fn wait_until_running(&self, fqdn: &str, container_id: &ContainerId) -> Result<()> {
        let runtime = &*self.runtime;
        Poller::new(
            format!("container of {fqdn} to be running"),
            self.settings.readiness_timeout(),
        )
        .with_interval(self.settings.poll_interval())
        .wait_for(|| async move {
            let running = runtime.inspect_container(container_id).await?.running;
            debug!(%fqdn, running, "container running state evaluated");
            Ok(running)
        })
        .await?;
        Ok(())
    }

    /// When the image ships an SSH daemon, wait for it to come up.
    async fn wait_for_sshd(&self, fqdn: &str, container_id: &ContainerId) -> Result<()> {
        let runtime = &*self.runtime;
        let shell = self.settings.shell.as_str();
        let quiet = ExecuteOptions::default().quiet();

        let which = exec::execute(runtime, container_id, shell, "which sshd", &quiet).await?;
        if !which.success() {
            return Ok(());
        }

        let quiet = &quiet;
        Poller::new(
            format!("SSH daemon on {fqdn}"),
            self.settings.readiness_timeout(),
        )
        .with_interval(self.settings.poll_interval())
        .wait_for(|| async move {
            let status =
                exec::execute(runtime, container_id, shell, "service sshd status", quiet).await?;
            debug!(%fqdn, exit_code = ?status.exit_code, "service sshd status");
            Ok(status.success())
        })
        .await?;
        Ok(())
    }

    /// Append `<ip> <fqdn>` to the host's `/etc/hosts` through a helper
    /// container that bind-mounts it.
    async fn add_to_etc_hosts(&self, started: &StartedNode, cluster_name: &str) -> Result<()> {
        let Some(ip) = started.ip_address.as_deref() else {
            return Err(ClusterError::Config(format!(
                "{} has no address on network {}",
                started.fqdn, started.network
            )));
        };

        let image = self.settings.etc_hosts_image.as_str();
        let line = format!("echo \"{ip} {}  # clusterdock\" >> /etc/hosts", started.fqdn);
        let mut helper = ContainerSpec::new(image)
            .with_command(vec![self.settings.shell.clone(), "-c".to_string(), line])
            .with_bind(BindMount::rw("/etc/hosts", "/etc/hosts"));
        helper.labels = labels::management_labels(&self.settings.label_key, cluster_name);

        debug!(fqdn = %started.fqdn, "adding node to /etc/hosts");
        self.runtime.ensure_image(image, false).await?;
        let exit_code = self.runtime.run_to_completion(&helper).await?;
        if exit_code != 0 {
            return Err(ClusterError::Runtime(RuntimeError::Internal(format!(
                "/etc/hosts helper exited with {exit_code}"
            ))));
        }
        Ok(())
    }

    /// Stop the node. With `remove` the container is force-removed along
    /// with its anonymous volumes; otherwise it is stopped gracefully.
    ///
    /// Works from any state once the container exists, including after a
    /// failed start.
    pub async fn stop(&self, remove: bool) -> Result<()> {
        let container_id = self.container_id()?;
        if remove {
            self.runtime
                .remove_container(container_id, &RemoveOptions::force().with_volumes())
                .await?;
        } else {
            self.runtime
                .stop_container(container_id, &StopOptions::default())
                .await?;
        }
        self.transition(NodeState::Stopped);
        info!(hostname = %self.spec.hostname, container = %container_id, remove, "node stopped");
        Ok(())
    }

    /// Run `command` through the node's shell.
    pub async fn execute(&self, command: &str, options: &ExecuteOptions) -> Result<ExecuteResult> {
        let started = self.started()?;
        exec::execute(
            &*self.runtime,
            &started.container_id,
            &self.settings.shell,
            command,
            options,
        )
        .await
    }

    /// Raw contents of the file at `path`.
    pub async fn get_file_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let started = self.started()?;
        let mut chunks = self
            .runtime
            .get_archive(&started.container_id, path)
            .await?;

        let mut buffer = Vec::new();
        while let Some(chunk) = chunks.next().await {
            buffer.extend(chunk?);
        }
        archive::decode_first_file(&buffer)
    }

    /// Contents of the text file at `path`.
    pub async fn get_file(&self, path: &str) -> Result<String> {
        let bytes = self.get_file_bytes(path).await?;
        String::from_utf8(bytes)
            .map_err(|e| ClusterError::Archive(format!("{path} is not valid UTF-8: {e}")))
    }

    /// Write `contents` to `path`, creating or replacing the file.
    pub async fn put_file(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let started = self.started()?;
        let data = archive::encode_file(path, contents.as_ref())?;
        self.runtime
            .put_archive(&started.container_id, archive::ARCHIVE_ROOT, data)
            .await?;
        debug!(fqdn = %started.fqdn, path, "file written");
        Ok(())
    }

    /// Commit the node's container to `repository[:tag]`, optionally pushing it.
    pub async fn commit(
        &self,
        repository: &str,
        tag: Option<&str>,
        push: bool,
        options: &CommitOptions,
    ) -> Result<ImageInfo> {
        let started = self.started()?;
        debug!(fqdn = %started.fqdn, container = %started.container_id, repository, "committing container");

        let spec = CommitSpec {
            repository: repository.to_string(),
            tag: tag.map(ToString::to_string),
            comment: options.comment.clone(),
            author: options.author.clone(),
            changes: options.changes.clone(),
            pause: options.pause,
        };
        let image = self
            .runtime
            .commit_container(&started.container_id, &spec)
            .await?;
        info!(fqdn = %started.fqdn, image = image.short_id(), tags = ?image.tags, "container committed");

        if push {
            debug!(fqdn = %started.fqdn, repository, "pushing image");
            let mut progress = self.runtime.push_image(repository, tag).await?;
            while let Some(record) = progress.next().await {
                let record = record?;
                if let Some(error) = record.error {
                    return Err(ClusterError::Runtime(RuntimeError::Stream(error)));
                }
                debug!(status = ?record.status, layer = ?record.id, "push progress");
            }
            info!(fqdn = %started.fqdn, tags = ?image.tags, "image pushed");
        }

        Ok(image)
    }
}
