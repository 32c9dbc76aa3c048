//! In-memory fake runtime for testing.
//!
//! Records every call, keeps containers, networks and files in memory and
//! answers execs from a script, so orchestration logic can be exercised
//! without a Docker daemon.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::config::{CommitSpec, ContainerSpec, ExecSpec, NetworkSpec};
use super::error::{ContainerId, RuntimeError, RuntimeResult};
use super::runtime::{
    ListOptions, RemoveOptions, Runtime, RuntimeFuture, RuntimeStream, StopOptions,
};
use super::status::{
    ContainerDetails, ContainerSummary, ImageInfo, NetworkEndpoint, NetworkInfo, OutputChunk,
    PortBinding, PushProgress,
};

const ARCHIVE_CHUNK_SIZE: usize = 512;
const FIRST_HOST_PORT: u16 = 32768;

/// A runtime call recorded by [`FakeRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `inspect_image(image)`.
    InspectImage(String),
    /// `pull_image(image)`.
    PullImage(String),
    /// `create_network(name)`.
    CreateNetwork(String),
    /// `inspect_network(name)`.
    InspectNetwork(String),
    /// `list_containers`.
    ListContainers,
    /// `create_container`.
    CreateContainer {
        /// Image.
        image: String,
        /// Hostname.
        hostname: Option<String>,
    },
    /// `start_container(id)`.
    StartContainer(ContainerId),
    /// `stop_container(id)`.
    StopContainer(ContainerId),
    /// `remove_container(id)`.
    RemoveContainer(ContainerId),
    /// `inspect_container(id)`.
    InspectContainer(ContainerId),
    /// `wait_container(id)`.
    WaitContainer(ContainerId),
    /// `create_exec`.
    CreateExec {
        /// Target container.
        container: ContainerId,
        /// Full argv.
        cmd: Vec<String>,
        /// Exec user.
        user: Option<String>,
    },
    /// `start_exec`.
    StartExec {
        /// Exec ID.
        exec_id: String,
        /// Detached.
        detach: bool,
    },
    /// `inspect_exec(exec_id)`.
    InspectExec(String),
    /// `get_archive`.
    GetArchive {
        /// Container.
        container: ContainerId,
        /// Path.
        path: String,
    },
    /// `put_archive`.
    PutArchive {
        /// Container.
        container: ContainerId,
        /// Extraction root.
        path: String,
    },
    /// `commit_container`.
    Commit {
        /// Container.
        container: ContainerId,
        /// Target repository.
        repository: String,
        /// Target tag.
        tag: Option<String>,
    },
    /// `push_image`.
    Push {
        /// Repository.
        repository: String,
        /// Tag.
        tag: Option<String>,
    },
}

impl Call {
    /// Whether this call creates or changes something on the runtime.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::PullImage(_)
                | Self::CreateNetwork(_)
                | Self::CreateContainer { .. }
                | Self::StartContainer(_)
                | Self::StopContainer(_)
                | Self::RemoveContainer(_)
                | Self::CreateExec { .. }
                | Self::StartExec { .. }
                | Self::PutArchive { .. }
                | Self::Commit { .. }
                | Self::Push { .. }
        )
    }
}

/// Scripted answer for an exec whose command matches a pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptedExec {
    /// Output chunks, in the order they are streamed.
    pub output: Vec<OutputChunk>,
    /// Exit code reported after the stream ends.
    pub exit_code: i64,
}

impl ScriptedExec {
    /// An exec that exits with `exit_code` and prints nothing.
    #[must_use]
    pub fn exit(exit_code: i64) -> Self {
        Self {
            output: Vec::new(),
            exit_code,
        }
    }

    /// Append a stdout chunk.
    #[must_use]
    pub fn stdout(mut self, text: &str) -> Self {
        self.output.push(OutputChunk::Stdout(text.as_bytes().to_vec()));
        self
    }

    /// Append a stderr chunk.
    #[must_use]
    pub fn stderr(mut self, text: &str) -> Self {
        self.output.push(OutputChunk::Stderr(text.as_bytes().to_vec()));
        self
    }
}

#[derive(Debug)]
struct FakeContainer {
    spec: ContainerSpec,
    name: String,
    running: bool,
    pending_inspects: u32,
    networks: BTreeMap<String, NetworkEndpoint>,
    host_ports: BTreeMap<u16, u16>,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

#[derive(Debug)]
struct FakeNetwork {
    id: String,
    containers: Vec<ContainerId>,
}

#[derive(Debug)]
struct FakeExec {
    cmd: Vec<String>,
    exit_code: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    images: BTreeSet<String>,
    containers: BTreeMap<ContainerId, FakeContainer>,
    created: Vec<ContainerSpec>,
    networks: BTreeMap<String, FakeNetwork>,
    execs: HashMap<String, FakeExec>,
    scripts: Vec<(String, ScriptedExec)>,
    failures: HashMap<&'static str, (u16, String)>,
    inspects_before_running: u32,
    next_id: u64,
    next_ip: u8,
    next_host_port: u16,
}

impl State {
    fn generate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:060x}", self.next_id)
    }

    fn injected_failure(&self, operation: &'static str) -> RuntimeResult<()> {
        match self.failures.get(operation) {
            Some((status, message)) => Err(RuntimeError::api(*status, message.clone())),
            None => Ok(()),
        }
    }

    fn container(&self, id: &ContainerId) -> RuntimeResult<&FakeContainer> {
        self.containers
            .get(id)
            .ok_or_else(|| RuntimeError::api(404, format!("No such container: {}", id.as_str())))
    }

    fn container_mut(&mut self, id: &ContainerId) -> RuntimeResult<&mut FakeContainer> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::api(404, format!("No such container: {}", id.as_str())))
    }

    fn allocate_ip(&mut self) -> String {
        self.next_ip = self.next_ip.wrapping_add(1).max(2);
        format!("192.168.123.{}", self.next_ip)
    }

    fn allocate_host_port(&mut self) -> u16 {
        if self.next_host_port < FIRST_HOST_PORT {
            self.next_host_port = FIRST_HOST_PORT;
        }
        let port = self.next_host_port;
        self.next_host_port = self.next_host_port.saturating_add(1);
        port
    }

    fn script_for(&self, cmd: &[String]) -> ScriptedExec {
        let command = cmd.join(" ");
        self.scripts
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, script)| script.clone())
            .unwrap_or_default()
    }
}

/// In-memory runtime that records calls.
///
/// Cloning yields a handle to the same state, so a test can keep one clone
/// for assertions and hand another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<State>>,
}

impl FakeRuntime {
    /// Create an empty fake runtime with no images, networks or containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an image as present locally.
    #[must_use]
    pub fn with_image(self, image: impl Into<String>) -> Self {
        self.state.lock().images.insert(image.into());
        self
    }

    /// Containers report running only after this many inspects following start.
    #[must_use]
    pub fn with_inspects_before_running(self, count: u32) -> Self {
        self.state.lock().inspects_before_running = count;
        self
    }

    /// Answer execs whose joined argv contains `pattern` with `script`.
    ///
    /// Patterns are tried in registration order. Unmatched execs print
    /// nothing and exit 0.
    #[must_use]
    pub fn with_exec(self, pattern: impl Into<String>, script: ScriptedExec) -> Self {
        self.state.lock().scripts.push((pattern.into(), script));
        self
    }

    /// Fail every call of `operation` (a trait method name) with an API error.
    #[must_use]
    pub fn with_failure(self, operation: &'static str, status: u16, message: impl Into<String>) -> Self {
        self.state
            .lock()
            .failures
            .insert(operation, (status, message.into()));
        self
    }

    /// Create a network directly, bypassing the call log.
    #[must_use]
    pub fn with_network(self, name: impl Into<String>) -> Self {
        {
            let mut state = self.state.lock();
            let id = state.generate_id("net");
            state.networks.insert(
                name.into(),
                FakeNetwork {
                    id,
                    containers: Vec::new(),
                },
            );
        }
        self
    }

    /// Add a running container attached to `network` under `alias`,
    /// bypassing the call log. The network is created if needed.
    pub fn add_network_member(&self, network: &str, alias: &str) -> ContainerId {
        let mut state = self.state.lock();
        if !state.networks.contains_key(network) {
            let id = state.generate_id("net");
            state.networks.insert(
                network.to_string(),
                FakeNetwork {
                    id,
                    containers: Vec::new(),
                },
            );
        }
        let id = ContainerId::new_unchecked(state.generate_id(""));
        let ip = state.allocate_ip();
        let mut networks = BTreeMap::new();
        networks.insert(
            network.to_string(),
            NetworkEndpoint {
                ip_address: Some(ip),
                aliases: vec![alias.to_string()],
            },
        );
        state.containers.insert(
            id.clone(),
            FakeContainer {
                spec: ContainerSpec::new("existing"),
                name: alias.to_string(),
                running: true,
                pending_inspects: 0,
                networks,
                host_ports: BTreeMap::new(),
                files: BTreeMap::new(),
            },
        );
        if let Some(net) = state.networks.get_mut(network) {
            net.containers.push(id.clone());
        }
        id
    }

    /// Add a running container carrying `labels`, bypassing the call log.
    pub fn add_labelled_container(&self, name: &str, labels: BTreeMap<String, String>) -> ContainerId {
        let mut state = self.state.lock();
        let id = ContainerId::new_unchecked(state.generate_id(""));
        let mut spec = ContainerSpec::new("existing");
        spec.labels = labels;
        state.containers.insert(
            id.clone(),
            FakeContainer {
                spec,
                name: name.to_string(),
                running: true,
                pending_inspects: 0,
                networks: BTreeMap::new(),
                host_ports: BTreeMap::new(),
                files: BTreeMap::new(),
            },
        );
        id
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Specs passed to `create_container`, in order.
    #[must_use]
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().created.clone()
    }

    /// Argv of every exec created so far, in order of creation.
    #[must_use]
    pub fn exec_commands(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::CreateExec { cmd, .. } => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of containers currently known.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    /// Whether a container exists and is running.
    #[must_use]
    pub fn is_running(&self, id: &ContainerId) -> bool {
        self.state
            .lock()
            .containers
            .get(id)
            .is_some_and(|c| c.running)
    }

    /// Whether a network exists.
    #[must_use]
    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().networks.contains_key(name)
    }

    /// Whether an image is present.
    #[must_use]
    pub fn has_image(&self, image: &str) -> bool {
        self.state.lock().images.contains(image)
    }

    /// Contents of a file previously written into a container.
    #[must_use]
    pub fn file(&self, id: &ContainerId, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .containers
            .get(id)
            .and_then(|c| c.files.get(&normalize(Path::new(path))).cloned())
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

/// Make `path` absolute and drop `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                normalized.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    normalized
}

fn unpack(root: &str, archive: &[u8]) -> RuntimeResult<Vec<(PathBuf, Vec<u8>)>> {
    let mut files = Vec::new();
    let mut archive = tar::Archive::new(archive);
    let entries = archive
        .entries()
        .map_err(|e| RuntimeError::api(400, format!("invalid tar archive: {e}")))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| RuntimeError::api(400, format!("invalid tar archive: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| RuntimeError::api(400, format!("invalid tar path: {e}")))?
            .into_owned();
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| RuntimeError::api(400, format!("invalid tar entry: {e}")))?;
        files.push((normalize(&Path::new(root).join(path)), data));
    }
    Ok(files)
}

fn pack(path: &Path, data: &[u8]) -> RuntimeResult<Vec<u8>> {
    let name = path
        .file_name()
        .map_or_else(|| PathBuf::from("file"), PathBuf::from);
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| RuntimeError::Internal(e.to_string()))?;
    builder
        .into_inner()
        .map_err(|e| RuntimeError::Internal(e.to_string()))
}

impl Runtime for FakeRuntime {
    fn inspect_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::InspectImage(image.to_string()));
            let state = self.state.lock();
            state.injected_failure("inspect_image")?;
            if state.images.contains(image) {
                Ok(())
            } else {
                Err(RuntimeError::api(404, format!("No such image: {image}")))
            }
        })
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::PullImage(image.to_string()));
            let mut state = self.state.lock();
            state.injected_failure("pull_image")?;
            state.images.insert(image.to_string());
            Ok(())
        })
    }

    fn create_network<'a>(&'a self, spec: &'a NetworkSpec) -> RuntimeFuture<'a, NetworkInfo> {
        Box::pin(async move {
            self.record(Call::CreateNetwork(spec.name.clone()));
            let mut state = self.state.lock();
            state.injected_failure("create_network")?;
            if state.networks.contains_key(&spec.name) {
                return Err(RuntimeError::api(
                    409,
                    format!("network with name {} already exists", spec.name),
                ));
            }
            let id = state.generate_id("net");
            state.networks.insert(
                spec.name.clone(),
                FakeNetwork {
                    id: id.clone(),
                    containers: Vec::new(),
                },
            );
            Ok(NetworkInfo {
                id,
                name: spec.name.clone(),
                containers: Vec::new(),
            })
        })
    }

    fn inspect_network<'a>(&'a self, name: &'a str) -> RuntimeFuture<'a, NetworkInfo> {
        Box::pin(async move {
            self.record(Call::InspectNetwork(name.to_string()));
            let state = self.state.lock();
            state.injected_failure("inspect_network")?;
            let network = state
                .networks
                .get(name)
                .ok_or_else(|| RuntimeError::api(404, format!("network {name} not found")))?;
            Ok(NetworkInfo {
                id: network.id.clone(),
                name: name.to_string(),
                containers: network.containers.clone(),
            })
        })
    }

    fn list_containers<'a>(
        &'a self,
        options: &'a ListOptions,
    ) -> RuntimeFuture<'a, Vec<ContainerSummary>> {
        Box::pin(async move {
            self.record(Call::ListContainers);
            let state = self.state.lock();
            state.injected_failure("list_containers")?;
            let filter = options
                .label_filter
                .as_deref()
                .map(|f| f.split_once('=').map_or((f, None), |(k, v)| (k, Some(v))));
            Ok(state
                .containers
                .iter()
                .filter(|(_, c)| options.all || c.running)
                .filter(|(_, c)| match filter {
                    None => true,
                    Some((key, None)) => c.spec.labels.contains_key(key),
                    Some((key, Some(value))) => {
                        c.spec.labels.get(key).is_some_and(|v| v == value)
                    }
                })
                .map(|(id, c)| ContainerSummary {
                    id: id.clone(),
                    name: c.name.clone(),
                    image: c.spec.image.clone(),
                    state: if c.running { "running" } else { "exited" }.to_string(),
                    labels: c.spec.labels.clone(),
                })
                .collect())
        })
    }

    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> RuntimeFuture<'a, ContainerId> {
        Box::pin(async move {
            self.record(Call::CreateContainer {
                image: spec.image.clone(),
                hostname: spec.hostname.clone(),
            });
            let mut state = self.state.lock();
            state.injected_failure("create_container")?;
            if !state.images.contains(&spec.image) {
                return Err(RuntimeError::api(404, format!("No such image: {}", spec.image)));
            }
            for source in &spec.host.volumes_from {
                state.container(&ContainerId::new_unchecked(source.as_str()))?;
            }

            let id = ContainerId::new_unchecked(state.generate_id(""));
            let mut networks = BTreeMap::new();
            if let Some(endpoint) = &spec.endpoint {
                if !state.networks.contains_key(&endpoint.network) {
                    return Err(RuntimeError::api(
                        404,
                        format!("network {} not found", endpoint.network),
                    ));
                }
                let ip = state.allocate_ip();
                networks.insert(
                    endpoint.network.clone(),
                    NetworkEndpoint {
                        ip_address: Some(ip),
                        aliases: endpoint.aliases.clone(),
                    },
                );
                if let Some(network) = state.networks.get_mut(&endpoint.network) {
                    network.containers.push(id.clone());
                }
            }

            let mut host_ports = BTreeMap::new();
            for (&container_port, host_port) in &spec.host.port_bindings {
                let host_port = match host_port {
                    Some(port) => *port,
                    None => state.allocate_host_port(),
                };
                host_ports.insert(container_port, host_port);
            }

            let name = spec
                .name
                .clone()
                .unwrap_or_else(|| id.short().to_string());
            state.containers.insert(
                id.clone(),
                FakeContainer {
                    spec: spec.clone(),
                    name,
                    running: false,
                    pending_inspects: 0,
                    networks,
                    host_ports,
                    files: BTreeMap::new(),
                },
            );
            state.created.push(spec.clone());
            Ok(id)
        })
    }

    fn start_container<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::StartContainer(id.clone()));
            let mut state = self.state.lock();
            state.injected_failure("start_container")?;
            let pending = state.inspects_before_running;
            let container = state.container_mut(id)?;
            container.running = true;
            container.pending_inspects = pending;
            Ok(())
        })
    }

    fn stop_container<'a>(
        &'a self,
        id: &'a ContainerId,
        _options: &'a StopOptions,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::StopContainer(id.clone()));
            let mut state = self.state.lock();
            state.injected_failure("stop_container")?;
            state.container_mut(id)?.running = false;
            Ok(())
        })
    }

    fn remove_container<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a RemoveOptions,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::RemoveContainer(id.clone()));
            let mut state = self.state.lock();
            state.injected_failure("remove_container")?;
            if state.container(id)?.running && !options.force {
                return Err(RuntimeError::api(
                    409,
                    format!(
                        "You cannot remove a running container {}. Stop the container before attempting removal or force remove",
                        id.as_str()
                    ),
                ));
            }
            state.containers.remove(id);
            for network in state.networks.values_mut() {
                network.containers.retain(|c| c != id);
            }
            Ok(())
        })
    }

    fn inspect_container<'a>(
        &'a self,
        id: &'a ContainerId,
    ) -> RuntimeFuture<'a, ContainerDetails> {
        Box::pin(async move {
            self.record(Call::InspectContainer(id.clone()));
            let mut state = self.state.lock();
            state.injected_failure("inspect_container")?;
            let container = state.container_mut(id)?;
            let running = container.running && container.pending_inspects == 0;
            container.pending_inspects = container.pending_inspects.saturating_sub(1);

            let ports = container
                .host_ports
                .iter()
                .map(|(container_port, host_port)| {
                    (
                        format!("{container_port}/tcp"),
                        vec![PortBinding {
                            host_ip: Some("0.0.0.0".to_string()),
                            host_port: Some(*host_port),
                        }],
                    )
                })
                .collect();

            Ok(ContainerDetails {
                id: id.clone(),
                name: container.name.clone(),
                image: container.spec.image.clone(),
                running,
                labels: container.spec.labels.clone(),
                networks: container.networks.clone(),
                ports,
            })
        })
    }

    fn wait_container<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, i64> {
        Box::pin(async move {
            self.record(Call::WaitContainer(id.clone()));
            let mut state = self.state.lock();
            state.injected_failure("wait_container")?;
            let container = state.container_mut(id)?;
            container.running = false;
            let auto_remove = container.spec.host.auto_remove;
            if auto_remove {
                state.containers.remove(id);
            }
            Ok(0)
        })
    }

    fn create_exec<'a>(
        &'a self,
        id: &'a ContainerId,
        spec: &'a ExecSpec,
    ) -> RuntimeFuture<'a, String> {
        Box::pin(async move {
            self.record(Call::CreateExec {
                container: id.clone(),
                cmd: spec.cmd.clone(),
                user: spec.user.clone(),
            });
            let mut state = self.state.lock();
            state.injected_failure("create_exec")?;
            if !state.container(id)?.running {
                return Err(RuntimeError::api(
                    409,
                    format!("Container {} is not running", id.as_str()),
                ));
            }
            let exec_id = state.generate_id("exec");
            state.execs.insert(
                exec_id.clone(),
                FakeExec {
                    cmd: spec.cmd.clone(),
                    exit_code: None,
                },
            );
            Ok(exec_id)
        })
    }

    fn start_exec<'a>(
        &'a self,
        exec_id: &'a str,
        detach: bool,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, OutputChunk>> {
        Box::pin(async move {
            self.record(Call::StartExec {
                exec_id: exec_id.to_string(),
                detach,
            });
            let mut state = self.state.lock();
            state.injected_failure("start_exec")?;
            let cmd = state
                .execs
                .get(exec_id)
                .map(|exec| exec.cmd.clone())
                .ok_or_else(|| RuntimeError::api(404, format!("No such exec instance: {exec_id}")))?;
            let script = state.script_for(&cmd);
            if let Some(exec) = state.execs.get_mut(exec_id) {
                exec.exit_code = Some(script.exit_code);
            }

            let chunks: Vec<RuntimeResult<OutputChunk>> = if detach {
                Vec::new()
            } else {
                script.output.into_iter().map(Ok).collect()
            };
            Ok(Box::pin(futures::stream::iter(chunks)) as RuntimeStream<'a, OutputChunk>)
        })
    }

    fn inspect_exec<'a>(&'a self, exec_id: &'a str) -> RuntimeFuture<'a, Option<i64>> {
        Box::pin(async move {
            self.record(Call::InspectExec(exec_id.to_string()));
            let state = self.state.lock();
            state.injected_failure("inspect_exec")?;
            state
                .execs
                .get(exec_id)
                .map(|exec| exec.exit_code)
                .ok_or_else(|| RuntimeError::api(404, format!("No such exec instance: {exec_id}")))
        })
    }

    fn get_archive<'a>(
        &'a self,
        id: &'a ContainerId,
        path: &'a str,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, Vec<u8>>> {
        Box::pin(async move {
            self.record(Call::GetArchive {
                container: id.clone(),
                path: path.to_string(),
            });
            let state = self.state.lock();
            state.injected_failure("get_archive")?;
            let target = normalize(Path::new(path));
            let data = state.container(id)?.files.get(&target).ok_or_else(|| {
                RuntimeError::api(
                    404,
                    format!("Could not find the file {path} in container {}", id.as_str()),
                )
            })?;
            let archive = pack(&target, data)?;
            let chunks: Vec<RuntimeResult<Vec<u8>>> = archive
                .chunks(ARCHIVE_CHUNK_SIZE)
                .map(|chunk| Ok(chunk.to_vec()))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)) as RuntimeStream<'a, Vec<u8>>)
        })
    }

    fn put_archive<'a>(
        &'a self,
        id: &'a ContainerId,
        path: &'a str,
        archive: Vec<u8>,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::PutArchive {
                container: id.clone(),
                path: path.to_string(),
            });
            let mut state = self.state.lock();
            state.injected_failure("put_archive")?;
            let files = unpack(path, &archive)?;
            let container = state.container_mut(id)?;
            container.files.extend(files);
            Ok(())
        })
    }

    fn commit_container<'a>(
        &'a self,
        id: &'a ContainerId,
        spec: &'a CommitSpec,
    ) -> RuntimeFuture<'a, ImageInfo> {
        Box::pin(async move {
            self.record(Call::Commit {
                container: id.clone(),
                repository: spec.repository.clone(),
                tag: spec.tag.clone(),
            });
            let mut state = self.state.lock();
            state.injected_failure("commit_container")?;
            state.container(id)?;
            let image_id = format!("sha256:{}", state.generate_id(""));
            let reference = format!(
                "{}:{}",
                spec.repository,
                spec.tag.as_deref().unwrap_or("latest")
            );
            state.images.insert(reference.clone());
            Ok(ImageInfo {
                id: image_id,
                tags: vec![reference],
            })
        })
    }

    fn push_image<'a>(
        &'a self,
        repository: &'a str,
        tag: Option<&'a str>,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, PushProgress>> {
        Box::pin(async move {
            self.record(Call::Push {
                repository: repository.to_string(),
                tag: tag.map(ToString::to_string),
            });
            let state = self.state.lock();
            state.injected_failure("push_image")?;
            let reference = format!("{repository}:{}", tag.unwrap_or("latest"));
            let progress = if state.images.contains(&reference) {
                vec![
                    Ok(PushProgress {
                        status: Some(format!("The push refers to repository [{repository}]")),
                        ..Default::default()
                    }),
                    Ok(PushProgress {
                        status: Some("Pushed".to_string()),
                        id: Some("layer0".to_string()),
                        error: None,
                    }),
                ]
            } else {
                vec![Ok(PushProgress {
                    error: Some(format!("An image does not exist locally with the tag: {repository}")),
                    ..Default::default()
                })]
            };
            Ok(Box::pin(futures::stream::iter(progress)) as RuntimeStream<'a, PushProgress>)
        })
    }
}
