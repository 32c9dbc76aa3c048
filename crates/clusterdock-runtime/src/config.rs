//! Desired-state types handed to a runtime: containers, networks, execs, commits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A bind mount of a host path into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Absolute path on the host.
    pub host: String,
    /// Absolute path in the container.
    pub container: String,
    /// Mount read-only.
    #[serde(default)]
    pub read_only: bool,
}

impl BindMount {
    /// Create a writable bind mount.
    pub fn rw(host: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: false,
        }
    }

    /// Render in the `host:container:mode` form used by the Docker API.
    #[must_use]
    pub fn to_bind_string(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{mode}", self.host, self.container)
    }
}

/// Host-level container configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Linux capabilities to add.
    pub cap_add: Vec<String>,
    /// Security options (e.g. `seccomp=unconfined`).
    pub security_opt: Vec<String>,
    /// Run in privileged mode.
    pub privileged: bool,
    /// Bind mounts.
    pub binds: Vec<BindMount>,
    /// Containers to inherit volumes from.
    pub volumes_from: Vec<String>,
    /// Container port to host port. `None` lets the runtime pick the host port.
    pub port_bindings: BTreeMap<u16, Option<u16>>,
    /// Host devices, as `host[:container[:permissions]]`.
    pub devices: Vec<String>,
    /// Remove the container when it exits.
    pub auto_remove: bool,
}

/// Attachment of a container to a network at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Network name.
    pub network: String,
    /// DNS aliases on that network.
    pub aliases: Vec<String>,
}

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Image reference.
    pub image: String,
    /// Container name; the runtime generates one when absent.
    pub name: Option<String>,
    /// Container hostname.
    pub hostname: Option<String>,
    /// Command override.
    pub command: Option<Vec<String>>,
    /// Entrypoint override.
    pub entrypoint: Option<Vec<String>>,
    /// User to run as.
    pub user: Option<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Allocate a TTY.
    pub tty: bool,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Anonymous volume mount points.
    pub volumes: Vec<String>,
    /// Container ports to expose.
    pub exposed_ports: Vec<u16>,
    /// Host configuration.
    pub host: HostSpec,
    /// Network attachment applied at creation.
    pub endpoint: Option<EndpointSpec>,
}

impl ContainerSpec {
    /// Create a spec for `image` with everything else unset.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: None,
            hostname: None,
            command: None,
            entrypoint: None,
            user: None,
            working_dir: None,
            tty: false,
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            volumes: Vec::new(),
            exposed_ports: Vec::new(),
            host: HostSpec::default(),
            endpoint: None,
        }
    }

    /// Set the hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Set the command.
    #[must_use]
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a bind mount, recording the container path as a volume.
    #[must_use]
    pub fn with_bind(mut self, bind: BindMount) -> Self {
        self.volumes.push(bind.container.clone());
        self.host.binds.push(bind);
        self
    }

    /// Remove the container once it exits.
    #[must_use]
    pub fn auto_remove(mut self) -> Self {
        self.host.auto_remove = true;
        self
    }

    /// Attach to `network` under `aliases` at creation.
    #[must_use]
    pub fn with_endpoint(mut self, network: impl Into<String>, aliases: Vec<String>) -> Self {
        self.endpoint = Some(EndpointSpec {
            network: network.into(),
            aliases,
        });
        self
    }
}

/// Network creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Network name.
    pub name: String,
    /// Driver (e.g. `bridge`).
    pub driver: String,
    /// Labels.
    pub labels: BTreeMap<String, String>,
}

/// Exec creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    /// Full argv.
    pub cmd: Vec<String>,
    /// User to run as.
    pub user: Option<String>,
}

impl ExecSpec {
    /// Exec `cmd` as the container's default user.
    #[must_use]
    pub fn cmd(cmd: Vec<String>) -> Self {
        Self { cmd, user: None }
    }

    /// Set user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Options for committing a container to an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSpec {
    /// Target repository.
    pub repository: String,
    /// Target tag.
    pub tag: Option<String>,
    /// Commit message.
    pub comment: Option<String>,
    /// Author.
    pub author: Option<String>,
    /// Dockerfile instructions applied to the image.
    pub changes: Vec<String>,
    /// Pause the container while committing.
    pub pause: bool,
}

impl CommitSpec {
    /// Commit to `repository` with an optional tag.
    pub fn new(repository: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            repository: repository.into(),
            tag,
            pause: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_string() {
        assert_eq!(BindMount::rw("/var/www", "/srv").to_bind_string(), "/var/www:/srv:rw");
        let ro = BindMount {
            read_only: true,
            ..BindMount::rw("/a", "/b")
        };
        assert_eq!(ro.to_bind_string(), "/a:/b:ro");
    }

    #[test]
    fn test_with_bind_records_volume() {
        let spec = ContainerSpec::new("alpine").with_bind(BindMount::rw("/etc/hosts", "/etc/hosts"));
        assert_eq!(spec.volumes, vec!["/etc/hosts"]);
        assert_eq!(spec.host.binds.len(), 1);
    }

    #[test]
    fn test_commit_spec_pauses_by_default() {
        let spec = CommitSpec::new("repo/image", Some("v1".into()));
        assert!(spec.pause);
        assert_eq!(spec.tag.as_deref(), Some("v1"));
    }
}
