//! Observed-state types reported by a runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::ContainerId;

/// A container's attachment to one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    /// IP address on the network.
    pub ip_address: Option<String>,
    /// DNS aliases on the network.
    pub aliases: Vec<String>,
}

/// One host-side binding of a published container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Host interface.
    pub host_ip: Option<String>,
    /// Host port.
    pub host_port: Option<u16>,
}

/// Result of inspecting a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    /// Full container ID.
    pub id: ContainerId,
    /// Container name without the leading slash.
    pub name: String,
    /// Image the container was created from.
    pub image: String,
    /// Whether the container reports `Running == true`.
    pub running: bool,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Network name to endpoint.
    pub networks: BTreeMap<String, NetworkEndpoint>,
    /// Port spec (`8080/tcp`) to host bindings.
    pub ports: BTreeMap<String, Vec<PortBinding>>,
}

impl ContainerDetails {
    /// IP address on `network`.
    #[must_use]
    pub fn ip_address(&self, network: &str) -> Option<&str> {
        self.networks
            .get(network)
            .and_then(|endpoint| endpoint.ip_address.as_deref())
            .filter(|ip| !ip.is_empty())
    }

    /// First alias the container carries on `network`.
    #[must_use]
    pub fn first_alias(&self, network: &str) -> Option<&str> {
        self.networks
            .get(network)
            .and_then(|endpoint| endpoint.aliases.first())
            .map(String::as_str)
    }

    /// Container port to host port, taken from the first binding of each
    /// published port. Unpublished ports are skipped.
    #[must_use]
    pub fn host_ports(&self) -> BTreeMap<u16, u16> {
        self.ports
            .iter()
            .filter_map(|(spec, bindings)| {
                let container_port = spec.split('/').next()?.parse().ok()?;
                let host_port = bindings.first()?.host_port?;
                Some((container_port, host_port))
            })
            .collect()
    }
}

/// Summary of a container from a list call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Full container ID.
    pub id: ContainerId,
    /// Container name without the leading slash.
    pub name: String,
    /// Image.
    pub image: String,
    /// Runtime state (`running`, `exited`, ...).
    pub state: String,
    /// Labels.
    pub labels: BTreeMap<String, String>,
}

/// Result of creating or inspecting a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Network ID.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Containers currently attached.
    pub containers: Vec<ContainerId>,
}

/// One demultiplexed chunk of exec output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    /// Bytes written to stdout.
    Stdout(Vec<u8>),
    /// Bytes written to stderr.
    Stderr(Vec<u8>),
}

/// An image produced by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Image ID.
    pub id: String,
    /// Repository tags.
    pub tags: Vec<String>,
}

impl ImageInfo {
    /// Short form of the image ID, without the `sha256:` prefix.
    #[must_use]
    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        id.get(..12).unwrap_or(id)
    }
}

/// One progress record from an image push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushProgress {
    /// Status line.
    pub status: Option<String>,
    /// Layer ID the status refers to.
    pub id: Option<String>,
    /// Error reported by the registry.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ContainerDetails {
        let mut networks = BTreeMap::new();
        networks.insert(
            "cluster".to_string(),
            NetworkEndpoint {
                ip_address: Some("192.168.123.2".to_string()),
                aliases: vec!["node-1".to_string(), "abc123".to_string()],
            },
        );
        let mut ports = BTreeMap::new();
        ports.insert(
            "8080/tcp".to_string(),
            vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(32768),
            }],
        );
        ports.insert("22/tcp".to_string(), Vec::new());
        ContainerDetails {
            id: ContainerId::new_unchecked("abc123"),
            name: "node-1".to_string(),
            image: "alpine".to_string(),
            running: true,
            labels: BTreeMap::new(),
            networks,
            ports,
        }
    }

    #[test]
    fn test_host_ports_skips_unpublished() {
        let ports = details().host_ports();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports.get(&8080), Some(&32768));
    }

    #[test]
    fn test_network_lookups() {
        let details = details();
        assert_eq!(details.ip_address("cluster"), Some("192.168.123.2"));
        assert_eq!(details.first_alias("cluster"), Some("node-1"));
        assert_eq!(details.ip_address("other"), None);
    }

    #[test]
    fn test_image_short_id() {
        let image = ImageInfo {
            id: "sha256:0123456789abcdef0123".to_string(),
            tags: Vec::new(),
        };
        assert_eq!(image.short_id(), "0123456789ab");
    }
}
