//! Node specifications and topology files.
//!
//! A topology lists the nodes of a cluster:
//!
//! ```toml
//! [[node]]
//! hostname = "node-1"
//! group = "primary"
//! image = "clusterdock/nodebase:latest"
//! ports = [8080, { 9000 = 8080 }]
//! volumes = [["/data"], { "/var/www" = "/var/www" }, "clusterdock/jdk:8"]
//! devices = ["/dev/fuse"]
//!
//! [node.environment]
//! JAVA_HOME = "/opt/java"
//! ```
//!
//! Ports are either a bare container port (the host port is picked by the
//! runtime) or a `{ host = container }` table. Volumes are a list of named
//! volumes, a `{ host_path = container_path }` table of bind mounts, or the
//! name of an image whose volumes the node inherits.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{ClusterError, Result};

/// A port to publish from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// Container port published on a host port chosen by the runtime.
    Exposed(u16),
    /// Container port published on a fixed host port.
    Bound {
        /// Host port.
        host: u16,
        /// Container port.
        container: u16,
    },
}

impl Port {
    /// Container side of the mapping.
    #[must_use]
    pub const fn container_port(&self) -> u16 {
        match self {
            Self::Exposed(port) => *port,
            Self::Bound { container, .. } => *container,
        }
    }

    /// Fixed host side of the mapping, if any.
    #[must_use]
    pub const fn host_port(&self) -> Option<u16> {
        match self {
            Self::Exposed(_) => None,
            Self::Bound { host, .. } => Some(*host),
        }
    }
}

/// A volume to give a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Volume {
    /// Anonymous volumes at these container paths.
    Named(Vec<String>),
    /// Writable bind mount of a host path.
    Bind {
        /// Absolute host path.
        host: String,
        /// Absolute container path.
        container: String,
    },
    /// Inherit the volumes of a container created from this image.
    From(String),
}

/// Extra container-creation options for a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Command override.
    pub command: Option<Vec<String>>,
    /// Entrypoint override.
    pub entrypoint: Option<Vec<String>>,
    /// User the container runs as.
    pub user: Option<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Allocate a TTY.
    pub tty: bool,
    /// Extra labels. The management label always wins.
    pub labels: BTreeMap<String, String>,
}

/// Desired state of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    /// Short hostname, unique within the cluster.
    pub hostname: String,
    /// Node group the node belongs to.
    pub group: String,
    /// Image to run.
    pub image: String,
    /// Ports to publish.
    pub ports: Vec<Port>,
    /// Volumes, applied in order.
    pub volumes: Vec<Volume>,
    /// Host devices, as `host[:container[:permissions]]`.
    pub devices: Vec<String>,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// Extra container options.
    pub options: ContainerOptions,
}

impl NodeSpec {
    /// Create a node spec with no ports, volumes, devices or environment.
    pub fn new(hostname: impl Into<String>, group: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            group: group.into(),
            image: image.into(),
            ports: Vec::new(),
            volumes: Vec::new(),
            devices: Vec::new(),
            environment: BTreeMap::new(),
            options: ContainerOptions::default(),
        }
    }

    /// Add a port.
    #[must_use]
    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    /// Add a volume.
    #[must_use]
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }

    /// Add a device.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.devices.push(device.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set extra container options.
    #[must_use]
    pub fn with_options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }
}

/// A port to add to one node of a cluster, given as `host:port` or
/// `host:hostport->containerport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOverride {
    /// Hostname of the target node.
    pub hostname: String,
    /// Port to add.
    pub port: Port,
}

impl std::str::FromStr for PortOverride {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            ClusterError::Config(format!(
                "invalid port override {s:?} ({reason}); expected host:port or host:hostport->containerport"
            ))
        };

        let (hostname, value) = s.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        if hostname.is_empty() {
            return Err(invalid("empty hostname"));
        }

        let parse = |port: &str| port.trim().parse::<u16>().map_err(|_| invalid("bad port number"));
        let port = match value.split_once("->") {
            Some((host, container)) => Port::Bound {
                host: parse(host)?,
                container: parse(container)?,
            },
            None => Port::Exposed(parse(value)?),
        };

        Ok(Self {
            hostname: hostname.to_string(),
            port,
        })
    }
}

/// The nodes of a cluster, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Nodes.
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTopology {
    #[serde(default)]
    node: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    hostname: String,
    group: String,
    image: String,
    #[serde(default)]
    ports: Vec<toml::Value>,
    #[serde(default)]
    volumes: Vec<toml::Value>,
    #[serde(default)]
    devices: Vec<String>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    command: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    user: Option<String>,
    working_dir: Option<String>,
    #[serde(default)]
    tty: bool,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

fn parse_port_number(value: &toml::Value, hostname: &str) -> Result<u16> {
    value
        .as_integer()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| {
            ClusterError::Config(format!("node {hostname}: invalid port number {value}"))
        })
}

fn parse_ports(values: &[toml::Value], hostname: &str) -> Result<Vec<Port>> {
    let mut ports = Vec::new();
    for value in values {
        match value {
            toml::Value::Integer(_) => ports.push(Port::Exposed(parse_port_number(value, hostname)?)),
            toml::Value::Table(table) => {
                for (host, container) in table {
                    let host = host.parse::<u16>().map_err(|_| {
                        ClusterError::Config(format!("node {hostname}: invalid host port {host:?}"))
                    })?;
                    ports.push(Port::Bound {
                        host,
                        container: parse_port_number(container, hostname)?,
                    });
                }
            }
            other => {
                return Err(ClusterError::Config(format!(
                    "node {hostname}: saw port of type {} (must be table or integer)",
                    other.type_str()
                )));
            }
        }
    }
    Ok(ports)
}

fn parse_volumes(values: &[toml::Value], hostname: &str) -> Result<Vec<Volume>> {
    let as_string = |value: &toml::Value| {
        value.as_str().map(ToString::to_string).ok_or_else(|| {
            ClusterError::Config(format!(
                "node {hostname}: volume paths must be strings, saw {}",
                value.type_str()
            ))
        })
    };

    let mut volumes = Vec::new();
    for value in values {
        match value {
            toml::Value::String(image) => volumes.push(Volume::From(image.clone())),
            toml::Value::Array(paths) => {
                let paths = paths.iter().map(as_string).collect::<Result<Vec<_>>>()?;
                volumes.push(Volume::Named(paths));
            }
            toml::Value::Table(table) => {
                for (host, container) in table {
                    volumes.push(Volume::Bind {
                        host: host.clone(),
                        container: as_string(container)?,
                    });
                }
            }
            other => {
                return Err(ClusterError::Config(format!(
                    "node {hostname}: saw volume of type {} (must be array, table or string)",
                    other.type_str()
                )));
            }
        }
    }
    Ok(volumes)
}

impl Topology {
    /// Load a topology from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid topology.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClusterError::Config(format!(
                "failed to read topology file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse a topology from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a node entry has the wrong shape.
    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: RawTopology = toml::from_str(content)
            .map_err(|e| ClusterError::Config(format!("invalid TOML: {e}")))?;

        let nodes = raw
            .node
            .into_iter()
            .map(|node| {
                Ok(NodeSpec {
                    ports: parse_ports(&node.ports, &node.hostname)?,
                    volumes: parse_volumes(&node.volumes, &node.hostname)?,
                    hostname: node.hostname,
                    group: node.group,
                    image: node.image,
                    devices: node.devices,
                    environment: node.environment,
                    options: ContainerOptions {
                        command: node.command,
                        entrypoint: node.entrypoint,
                        user: node.user,
                        working_dir: node.working_dir,
                        tty: node.tty,
                        labels: node.labels,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let topology = Self { nodes };
        topology.validate()?;
        Ok(topology)
    }

    /// Validate the topology.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no nodes, a field is empty or a hostname repeats.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(ClusterError::Config(
                "topology must define at least one node".to_string(),
            ));
        }
        validate_nodes(&self.nodes)
    }
}

/// Check that every node has a hostname, group and image, and that no
/// hostname repeats.
///
/// # Errors
///
/// Returns [`ClusterError::Config`] naming the first offending node.
pub fn validate_nodes(nodes: &[NodeSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for node in nodes {
        if node.hostname.is_empty() || node.group.is_empty() || node.image.is_empty() {
            return Err(ClusterError::Config(format!(
                "node {:?}: hostname, group and image cannot be empty",
                node.hostname
            )));
        }
        if !seen.insert(node.hostname.as_str()) {
            return Err(ClusterError::Config(format!(
                "hostname {} is declared more than once",
                node.hostname
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_parse_topology() {
        let toml = r#"
            [[node]]
            hostname = "node-1"
            group = "primary"
            image = "nodebase"
            ports = [8080, { 9000 = 8080 }]
            volumes = [["/data", "/logs"], { "/var/www" = "/srv/www" }, "jdk:8"]
            devices = ["/dev/fuse"]
            user = "admin"

            [node.environment]
            JAVA_HOME = "/opt/java"

            [[node]]
            hostname = "node-2"
            group = "secondary"
            image = "nodebase"
        "#;

        let topology = Topology::from_toml(toml).expect("should parse");
        assert_eq!(topology.nodes.len(), 2);

        let node = &topology.nodes[0];
        assert_eq!(
            node.ports,
            vec![
                Port::Exposed(8080),
                Port::Bound {
                    host: 9000,
                    container: 8080
                }
            ]
        );
        assert_eq!(
            node.volumes,
            vec![
                Volume::Named(vec!["/data".into(), "/logs".into()]),
                Volume::Bind {
                    host: "/var/www".into(),
                    container: "/srv/www".into()
                },
                Volume::From("jdk:8".into()),
            ]
        );
        assert_eq!(node.devices, vec!["/dev/fuse"]);
        assert_eq!(node.environment["JAVA_HOME"], "/opt/java");
        assert_eq!(node.options.user.as_deref(), Some("admin"));
        assert_eq!(topology.nodes[1].group, "secondary");
    }

    #[test_case("ports = [\"8080\"]", "port of type string" ; "string port")]
    #[test_case("ports = [1.5]", "port of type float" ; "float port")]
    #[test_case("ports = [70000]", "invalid port number" ; "port out of range")]
    #[test_case("ports = [{ http = 80 }]", "invalid host port" ; "named host port")]
    #[test_case("volumes = [42]", "volume of type integer" ; "integer volume")]
    #[test_case("volumes = [true]", "volume of type boolean" ; "boolean volume")]
    #[test_case("volumes = [[1]]", "volume paths must be strings" ; "numeric named volume")]
    fn test_wrong_element_type_is_config_error(line: &str, expected: &str) {
        let toml = format!(
            "[[node]]\nhostname = \"n\"\ngroup = \"g\"\nimage = \"i\"\n{line}\n"
        );
        let err = Topology::from_toml(&toml).expect_err("must be rejected");
        assert!(matches!(err, ClusterError::Config(_)));
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[test]
    fn test_duplicate_hostname_rejected() {
        let toml = r#"
            [[node]]
            hostname = "n"
            group = "g"
            image = "i"
            [[node]]
            hostname = "n"
            group = "g"
            image = "i"
        "#;
        assert!(Topology::from_toml(toml).is_err());
    }

    #[test]
    fn test_empty_topology_rejected() {
        assert!(Topology::from_toml("").is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = "[[node]]\nhostname = \"n\"\ngroup = \"g\"\nimage = \"i\"\nportz = [1]\n";
        assert!(Topology::from_toml(toml).is_err());
    }

    #[test_case("node-1:8080", "node-1", Port::Exposed(8080) ; "exposed")]
    #[test_case("node-1:9000->8080", "node-1", Port::Bound { host: 9000, container: 8080 } ; "bound")]
    fn test_port_override_parse(input: &str, hostname: &str, port: Port) {
        let parsed: PortOverride = input.parse().expect("valid override");
        assert_eq!(parsed.hostname, hostname);
        assert_eq!(parsed.port, port);
    }

    #[test_case("node-1" ; "no colon")]
    #[test_case(":8080" ; "no hostname")]
    #[test_case("node-1:http" ; "named port")]
    #[test_case("node-1:9000->" ; "missing container port")]
    fn test_port_override_invalid(input: &str) {
        assert!(matches!(
            input.parse::<PortOverride>(),
            Err(ClusterError::Config(_))
        ));
    }

    #[test]
    fn test_port_accessors() {
        let port = Port::Bound {
            host: 9000,
            container: 8080,
        };
        assert_eq!(port.container_port(), 8080);
        assert_eq!(port.host_port(), Some(9000));
        assert_eq!(Port::Exposed(22).host_port(), None);
    }
}
