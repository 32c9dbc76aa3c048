//! Docker runtime implementation using bollard.

use std::collections::{BTreeMap, HashMap};

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogOutput, NetworkingConfig, RemoveContainerOptions,
    StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CommitContainerOptions, CreateImageOptions, PushImageOptions};
use bollard::models::{
    Commit, ContainerInspectResponse, DeviceMapping, EndpointSettings, HostConfig,
    PortBinding as BollardPortBinding,
};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::config::{CommitSpec, ContainerSpec, ExecSpec, HostSpec, NetworkSpec};
use super::error::{ContainerId, RuntimeError, RuntimeResult};
use super::runtime::{
    ListOptions, RemoveOptions, Runtime, RuntimeFuture, RuntimeStream, StopOptions,
};
use super::status::{
    ContainerDetails, ContainerSummary, ImageInfo, NetworkEndpoint, NetworkInfo, OutputChunk,
    PortBinding, PushProgress,
};

/// Docker runtime implementation.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to Docker daemon using default connection method.
    ///
    /// # Errors
    ///
    /// Returns error if connection fails.
    pub fn connect() -> RuntimeResult<Self> {
        let client = Docker::connect_with_local_defaults().map_err(|e| {
            RuntimeError::ConnectionFailed(format!("failed to connect to Docker: {e}"))
        })?;

        Ok(Self { client })
    }

    /// Connect to Docker daemon at a specific URL with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if connection fails.
    pub fn connect_with_url(url: &str, timeout_secs: u64) -> RuntimeResult<Self> {
        let client = Docker::connect_with_http(url, timeout_secs, bollard::API_DEFAULT_VERSION)
            .map_err(|e| {
                RuntimeError::ConnectionFailed(format!(
                    "failed to connect to Docker at {url}: {e}"
                ))
            })?;

        Ok(Self { client })
    }
}

/// Split an image reference into repository and tag, defaulting to `latest`.
///
/// Digests (`repo@sha256:...`) are passed through as the repository.
fn split_image_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    match image.rsplit_once(':') {
        // A colon before the last slash belongs to a registry port.
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

/// Parse a device string of the form `host[:container[:permissions]]`.
fn device_mapping(device: &str) -> DeviceMapping {
    let mut parts = device.splitn(3, ':');
    let host = parts.next().unwrap_or_default().to_string();
    let container = parts.next().map_or_else(|| host.clone(), ToString::to_string);
    let permissions = parts.next().unwrap_or("rwm").to_string();
    DeviceMapping {
        path_on_host: Some(host),
        path_in_container: Some(container),
        cgroup_permissions: Some(permissions),
    }
}

fn port_key(port: u16) -> String {
    format!("{port}/tcp")
}

/// Build Docker `HostConfig` from our host spec.
fn build_host_config(host: &HostSpec) -> HostConfig {
    let mut host_config = HostConfig {
        privileged: Some(host.privileged),
        auto_remove: Some(host.auto_remove),
        ..Default::default()
    };

    if !host.cap_add.is_empty() {
        host_config.cap_add = Some(host.cap_add.clone());
    }
    if !host.security_opt.is_empty() {
        host_config.security_opt = Some(host.security_opt.clone());
    }
    if !host.binds.is_empty() {
        host_config.binds = Some(host.binds.iter().map(|b| b.to_bind_string()).collect());
    }
    if !host.volumes_from.is_empty() {
        host_config.volumes_from = Some(host.volumes_from.clone());
    }
    if !host.devices.is_empty() {
        host_config.devices = Some(host.devices.iter().map(|d| device_mapping(d)).collect());
    }

    if !host.port_bindings.is_empty() {
        let bindings: HashMap<String, Option<Vec<BollardPortBinding>>> = host
            .port_bindings
            .iter()
            .map(|(&container_port, host_port)| {
                (
                    port_key(container_port),
                    Some(vec![BollardPortBinding {
                        host_ip: None,
                        host_port: host_port.map(|p| p.to_string()),
                    }]),
                )
            })
            .collect();
        host_config.port_bindings = Some(bindings);
    }

    host_config
}

/// Build the Docker container `Config` for a spec.
fn build_container_config(spec: &ContainerSpec) -> Config<String> {
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    for &port in spec.exposed_ports.iter().chain(spec.host.port_bindings.keys()) {
        exposed_ports.insert(port_key(port), HashMap::new());
    }

    let volumes: HashMap<String, HashMap<(), ()>> = spec
        .volumes
        .iter()
        .map(|v| (v.clone(), HashMap::new()))
        .collect();

    let networking_config = spec.endpoint.as_ref().map(|endpoint| {
        let mut endpoints_config = HashMap::new();
        endpoints_config.insert(
            endpoint.network.clone(),
            EndpointSettings {
                aliases: Some(endpoint.aliases.clone()),
                ..Default::default()
            },
        );
        NetworkingConfig { endpoints_config }
    });

    Config {
        image: Some(spec.image.clone()),
        hostname: spec.hostname.clone(),
        cmd: spec.command.clone(),
        entrypoint: spec.entrypoint.clone(),
        user: spec.user.clone(),
        working_dir: spec.working_dir.clone(),
        tty: Some(spec.tty),
        env: (!env.is_empty()).then_some(env),
        labels: Some(spec.labels.clone().into_iter().collect()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        volumes: (!volumes.is_empty()).then_some(volumes),
        host_config: Some(build_host_config(&spec.host)),
        networking_config,
        ..Default::default()
    }
}

/// Convert a bollard inspect response to our details type.
fn container_details(inspect: ContainerInspectResponse) -> ContainerDetails {
    let mut networks = BTreeMap::new();
    let mut ports = BTreeMap::new();

    if let Some(settings) = inspect.network_settings {
        for (name, endpoint) in settings.networks.unwrap_or_default() {
            networks.insert(
                name,
                NetworkEndpoint {
                    ip_address: endpoint.ip_address,
                    aliases: endpoint.aliases.unwrap_or_default(),
                },
            );
        }
        for (port_spec, bindings) in settings.ports.unwrap_or_default() {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|binding| PortBinding {
                    host_ip: binding.host_ip,
                    host_port: binding.host_port.and_then(|p| p.parse().ok()),
                })
                .collect();
            ports.insert(port_spec, bindings);
        }
    }

    let config = inspect.config.unwrap_or_default();

    ContainerDetails {
        id: ContainerId::new_unchecked(inspect.id.unwrap_or_default()),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        running: inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false),
        labels: config.labels.unwrap_or_default().into_iter().collect(),
        networks,
        ports,
    }
}

/// Image produced by a commit, tagged `latest` when no tag was given.
fn committed_image(response: Commit, spec: &CommitSpec) -> ImageInfo {
    let tag = spec.tag.as_deref().unwrap_or("latest");
    ImageInfo {
        id: response.id.unwrap_or_default(),
        tags: vec![format!("{}:{tag}", spec.repository)],
    }
}

impl Runtime for DockerRuntime {
    fn inspect_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.client.inspect_image(image).await?;
            Ok(())
        })
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let (repository, tag) = split_image_reference(image);
            let options = CreateImageOptions {
                from_image: repository,
                tag,
                ..Default::default()
            };

            let mut progress = self.client.create_image(Some(options), None, None);
            while let Some(info) = progress.next().await {
                let info = info?;
                if let Some(status) = info.status {
                    debug!(image, %status, "pull progress");
                }
            }

            info!(image, "image pulled");
            Ok(())
        })
    }

    fn create_network<'a>(&'a self, spec: &'a NetworkSpec) -> RuntimeFuture<'a, NetworkInfo> {
        Box::pin(async move {
            let options = CreateNetworkOptions {
                name: spec.name.as_str(),
                driver: spec.driver.as_str(),
                check_duplicate: true,
                labels: spec
                    .labels
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect(),
                ..Default::default()
            };

            let response = self.client.create_network(options).await?;

            info!(network = %spec.name, id = %response.id, "network created");
            Ok(NetworkInfo {
                id: response.id,
                name: spec.name.clone(),
                containers: Vec::new(),
            })
        })
    }

    fn inspect_network<'a>(&'a self, name: &'a str) -> RuntimeFuture<'a, NetworkInfo> {
        Box::pin(async move {
            let network = self
                .client
                .inspect_network(name, None::<InspectNetworkOptions<String>>)
                .await?;

            let mut containers: Vec<ContainerId> = network
                .containers
                .unwrap_or_default()
                .into_keys()
                .map(ContainerId::new_unchecked)
                .collect();
            containers.sort();

            Ok(NetworkInfo {
                id: network.id.unwrap_or_default(),
                name: network.name.unwrap_or_else(|| name.to_string()),
                containers,
            })
        })
    }

    fn list_containers<'a>(
        &'a self,
        options: &'a ListOptions,
    ) -> RuntimeFuture<'a, Vec<ContainerSummary>> {
        Box::pin(async move {
            let mut filters: HashMap<String, Vec<String>> = HashMap::new();
            if let Some(ref label) = options.label_filter {
                filters.insert("label".to_string(), vec![label.clone()]);
            }

            let list_options = ListContainersOptions {
                all: options.all,
                filters,
                ..Default::default()
            };

            let containers = self.client.list_containers(Some(list_options)).await?;

            Ok(containers
                .into_iter()
                .map(|c| ContainerSummary {
                    id: ContainerId::new_unchecked(c.id.unwrap_or_default()),
                    name: c
                        .names
                        .and_then(|n| n.first().cloned())
                        .map(|n| n.trim_start_matches('/').to_string())
                        .unwrap_or_default(),
                    image: c.image.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default().into_iter().collect(),
                })
                .collect())
        })
    }

    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> RuntimeFuture<'a, ContainerId> {
        Box::pin(async move {
            debug!(image = %spec.image, hostname = ?spec.hostname, "creating container");

            let options = spec.name.as_ref().map(|name| CreateContainerOptions {
                name: name.clone(),
                platform: None,
            });

            let response = self
                .client
                .create_container(options, build_container_config(spec))
                .await?;

            info!(id = %response.id, image = %spec.image, "container created");
            Ok(ContainerId::new_unchecked(response.id))
        })
    }

    fn start_container<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            debug!(id = %id, "starting container");
            self.client
                .start_container::<String>(id.as_str(), None)
                .await?;
            Ok(())
        })
    }

    fn stop_container<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a StopOptions,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            debug!(id = %id, "stopping container");

            let stop_options = StopContainerOptions {
                t: i64::from(options.timeout_secs),
            };

            match self
                .client
                .stop_container(id.as_str(), Some(stop_options))
                .await
            {
                Ok(()) => {
                    info!(id = %id, "container stopped");
                    Ok(())
                }
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 304, ..
                }) => {
                    // Already stopped, not an error
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn remove_container<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a RemoveOptions,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            debug!(id = %id, force = options.force, "removing container");

            let remove_options = RemoveContainerOptions {
                force: options.force,
                v: options.volumes,
                ..Default::default()
            };

            self.client
                .remove_container(id.as_str(), Some(remove_options))
                .await?;

            info!(id = %id, "container removed");
            Ok(())
        })
    }

    fn inspect_container<'a>(
        &'a self,
        id: &'a ContainerId,
    ) -> RuntimeFuture<'a, ContainerDetails> {
        Box::pin(async move {
            let inspect = self
                .client
                .inspect_container(id.as_str(), None::<InspectContainerOptions>)
                .await?;
            Ok(container_details(inspect))
        })
    }

    fn wait_container<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, i64> {
        Box::pin(async move {
            let wait_options = WaitContainerOptions {
                condition: "not-running",
            };

            let mut stream = self.client.wait_container(id.as_str(), Some(wait_options));

            match stream.next().await {
                Some(Ok(response)) => Ok(response.status_code),
                // bollard reports non-zero exits as an error carrying the code
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                    Ok(code)
                }
                Some(Err(e)) => Err(e.into()),
                None => Err(RuntimeError::Stream(
                    "wait stream ended unexpectedly".to_string(),
                )),
            }
        })
    }

    fn create_exec<'a>(
        &'a self,
        id: &'a ContainerId,
        spec: &'a ExecSpec,
    ) -> RuntimeFuture<'a, String> {
        Box::pin(async move {
            let exec_options = CreateExecOptions {
                cmd: Some(spec.cmd.clone()),
                user: spec.user.clone(),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            };

            let exec = self.client.create_exec(id.as_str(), exec_options).await?;
            Ok(exec.id)
        })
    }

    fn start_exec<'a>(
        &'a self,
        exec_id: &'a str,
        detach: bool,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, OutputChunk>> {
        Box::pin(async move {
            let options = StartExecOptions {
                detach,
                ..Default::default()
            };

            match self.client.start_exec(exec_id, Some(options)).await? {
                StartExecResults::Attached { output, .. } => {
                    let chunks = output.filter_map(|item| async move {
                        match item {
                            Ok(LogOutput::StdOut { message } | LogOutput::Console { message }) => {
                                Some(Ok(OutputChunk::Stdout(message.to_vec())))
                            }
                            Ok(LogOutput::StdErr { message }) => {
                                Some(Ok(OutputChunk::Stderr(message.to_vec())))
                            }
                            Ok(LogOutput::StdIn { .. }) => None,
                            Err(e) => Some(Err(RuntimeError::Stream(e.to_string()))),
                        }
                    });
                    Ok(Box::pin(chunks) as RuntimeStream<'a, OutputChunk>)
                }
                StartExecResults::Detached => {
                    Ok(Box::pin(futures::stream::empty()) as RuntimeStream<'a, OutputChunk>)
                }
            }
        })
    }

    fn inspect_exec<'a>(&'a self, exec_id: &'a str) -> RuntimeFuture<'a, Option<i64>> {
        Box::pin(async move {
            let inspect = self.client.inspect_exec(exec_id).await?;
            Ok(inspect.exit_code)
        })
    }

    fn get_archive<'a>(
        &'a self,
        id: &'a ContainerId,
        path: &'a str,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, Vec<u8>>> {
        Box::pin(async move {
            let options = DownloadFromContainerOptions { path };
            let chunks = self
                .client
                .download_from_container(id.as_str(), Some(options))
                .map_ok(|bytes| bytes.to_vec())
                .map_err(RuntimeError::from);
            Ok(Box::pin(chunks) as RuntimeStream<'a, Vec<u8>>)
        })
    }

    fn put_archive<'a>(
        &'a self,
        id: &'a ContainerId,
        path: &'a str,
        archive: Vec<u8>,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let options = UploadToContainerOptions {
                path,
                ..Default::default()
            };
            self.client
                .upload_to_container(id.as_str(), Some(options), archive.into())
                .await?;
            Ok(())
        })
    }

    fn commit_container<'a>(
        &'a self,
        id: &'a ContainerId,
        spec: &'a CommitSpec,
    ) -> RuntimeFuture<'a, ImageInfo> {
        Box::pin(async move {
            let changes = spec.changes.join("\n");
            let options = CommitContainerOptions {
                container: id.as_str(),
                repo: spec.repository.as_str(),
                tag: spec.tag.as_deref().unwrap_or_default(),
                comment: spec.comment.as_deref().unwrap_or_default(),
                author: spec.author.as_deref().unwrap_or_default(),
                pause: spec.pause,
                changes: (!changes.is_empty()).then_some(changes.as_str()),
            };

            let response = self
                .client
                .commit_container(options, Config::<String>::default())
                .await?;

            Ok(committed_image(response, spec))
        })
    }

    fn push_image<'a>(
        &'a self,
        repository: &'a str,
        tag: Option<&'a str>,
    ) -> RuntimeFuture<'a, RuntimeStream<'a, PushProgress>> {
        Box::pin(async move {
            let options = PushImageOptions {
                tag: tag.unwrap_or("latest"),
            };
            let progress = self
                .client
                .push_image(repository, Some(options), None)
                .map_ok(|info| PushProgress {
                    status: info.status,
                    id: None,
                    error: info.error,
                })
                .map_err(RuntimeError::from);
            Ok(Box::pin(progress) as RuntimeStream<'a, PushProgress>)
        })
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::config::BindMount;

    // =========================================================================
    // Unit Tests (no Docker required)
    // =========================================================================

    #[test_case("alpine", ("alpine", "latest") ; "bare name")]
    #[test_case("alpine:3.19", ("alpine", "3.19") ; "tagged")]
    #[test_case("registry:5000/team/app", ("registry:5000/team/app", "latest") ; "registry port")]
    #[test_case("registry:5000/team/app:v2", ("registry:5000/team/app", "v2") ; "registry port tagged")]
    #[test_case("app@sha256:abc", ("app@sha256:abc", "") ; "digest")]
    fn test_split_image_reference(image: &str, expected: (&str, &str)) {
        assert_eq!(split_image_reference(image), expected);
    }

    #[test]
    fn test_device_mapping() {
        let device = device_mapping("/dev/fuse");
        assert_eq!(device.path_on_host.as_deref(), Some("/dev/fuse"));
        assert_eq!(device.path_in_container.as_deref(), Some("/dev/fuse"));
        assert_eq!(device.cgroup_permissions.as_deref(), Some("rwm"));

        let device = device_mapping("/dev/sda:/dev/xvda:r");
        assert_eq!(device.path_in_container.as_deref(), Some("/dev/xvda"));
        assert_eq!(device.cgroup_permissions.as_deref(), Some("r"));
    }

    #[test]
    fn test_build_host_config_ports() {
        let mut host = HostSpec::default();
        host.port_bindings.insert(8080, None);
        host.port_bindings.insert(8081, Some(9000));

        let host_config = build_host_config(&host);
        let bindings = host_config.port_bindings.expect("port bindings");

        let random = bindings["8080/tcp"].as_ref().expect("binding");
        assert_eq!(random[0].host_port, None);
        let explicit = bindings["8081/tcp"].as_ref().expect("binding");
        assert_eq!(explicit[0].host_port.as_deref(), Some("9000"));
    }

    #[test]
    fn test_build_host_config_binds_and_caps() {
        let host = HostSpec {
            cap_add: vec!["ALL".to_string()],
            security_opt: vec!["seccomp=unconfined".to_string()],
            binds: vec![BindMount::rw("/var/www", "/var/www")],
            volumes_from: vec!["abc123".to_string()],
            ..Default::default()
        };

        let host_config = build_host_config(&host);
        assert_eq!(host_config.cap_add, Some(vec!["ALL".to_string()]));
        assert_eq!(host_config.binds, Some(vec!["/var/www:/var/www:rw".to_string()]));
        assert_eq!(host_config.volumes_from, Some(vec!["abc123".to_string()]));
        assert_eq!(host_config.privileged, Some(false));
        assert!(host_config.port_bindings.is_none());
    }

    #[test]
    fn test_committed_image_tags() {
        let spec = CommitSpec {
            repository: "registry.local/node".to_string(),
            tag: None,
            comment: None,
            author: None,
            changes: Vec::new(),
            pause: true,
        };
        let image = committed_image(
            Commit {
                id: Some("sha256:abc".to_string()),
                ..Default::default()
            },
            &spec,
        );
        assert_eq!(image.id, "sha256:abc");
        assert_eq!(image.tags, vec!["registry.local/node:latest"]);

        let image = committed_image(Commit::default(), &spec);
        assert!(image.id.is_empty());
    }

    #[test]
    fn test_build_container_config_network_alias() {
        let spec = ContainerSpec::new("alpine")
            .with_hostname("node-1.cluster")
            .with_endpoint("cluster", vec!["node-1".to_string()]);

        let config = build_container_config(&spec);
        assert_eq!(config.hostname.as_deref(), Some("node-1.cluster"));

        let networking = config.networking_config.expect("networking config");
        let endpoint = &networking.endpoints_config["cluster"];
        assert_eq!(endpoint.aliases, Some(vec!["node-1".to_string()]));
    }

    #[test]
    fn test_build_container_config_exposes_bound_ports() {
        let mut spec = ContainerSpec::new("alpine");
        spec.host.port_bindings.insert(8080, None);
        spec.env.insert("TZ".to_string(), "UTC".to_string());

        let config = build_container_config(&spec);
        assert!(config.exposed_ports.expect("exposed").contains_key("8080/tcp"));
        assert_eq!(config.env, Some(vec!["TZ=UTC".to_string()]));
    }

    // =========================================================================
    // Integration Tests (require Docker)
    // =========================================================================

    #[tokio::test]
    #[ignore = "requires Docker daemon"]
    async fn test_docker_list_containers() {
        let runtime = DockerRuntime::connect().expect("connect");
        runtime
            .list_containers(&ListOptions::all())
            .await
            .expect("list");
    }
}
