//! Cluster orchestration.
//!
//! A [`Cluster`] owns its nodes, groups them by name, and starts them in
//! declaration order on one network after two guards: the cluster name must
//! not belong to an active cluster, and no container already on the network
//! may answer to an incoming hostname.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use clusterdock_runtime::{NetworkInfo, NetworkSpec, Runtime};
use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};
use crate::exec::{ExecuteOptions, ExecuteResult};
use crate::group::{self, NodeGroup};
use crate::labels;
use crate::names;
use crate::node::{Node, StartOptions};
use crate::settings::Settings;
use crate::topology::{self, NodeSpec, PortOverride};

/// Options for building a cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterOptions {
    /// Requested name; generated when absent.
    pub name: Option<String>,
    /// Ports added to nodes by hostname.
    pub port_overrides: Vec<PortOverride>,
    /// Orchestrator settings.
    pub settings: Settings,
}

impl ClusterOptions {
    /// Use `name` instead of a generated one.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a port override.
    #[must_use]
    pub fn with_port_override(mut self, port_override: PortOverride) -> Self {
        self.port_overrides.push(port_override);
        self
    }

    /// Use `settings`.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}

/// A set of nodes started together on one network.
pub struct Cluster {
    name: String,
    runtime: Arc<dyn Runtime>,
    settings: Arc<Settings>,
    nodes: Vec<Arc<Node>>,
    groups: Vec<NodeGroup>,
    network: OnceLock<String>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("network", &self.network.get())
            .finish_non_exhaustive()
    }
}

/// Apply `overrides` to `specs` by hostname.
///
/// An override replaces any port of the node with the same container port.
pub fn apply_port_overrides(specs: &mut [NodeSpec], overrides: &[PortOverride]) -> Result<()> {
    for port_override in overrides {
        let spec = specs
            .iter_mut()
            .find(|spec| spec.hostname == port_override.hostname)
            .ok_or_else(|| {
                ClusterError::Config(format!(
                    "port override for unknown node {}",
                    port_override.hostname
                ))
            })?;

        let container_port = port_override.port.container_port();
        spec.ports
            .retain(|port| port.container_port() != container_port);
        spec.ports.push(port_override.port);
        debug!(hostname = %spec.hostname, port = ?port_override.port, "applied port override");
    }
    Ok(())
}

/// Partition `nodes` into groups, in order of each group's first member.
pub fn group_nodes(nodes: &[Arc<Node>]) -> Vec<NodeGroup> {
    let mut order: Vec<&str> = Vec::new();
    for node in nodes {
        if !order.contains(&node.group()) {
            order.push(node.group());
        }
    }

    order
        .into_iter()
        .map(|name| {
            let members = nodes
                .iter()
                .filter(|node| node.group() == name)
                .cloned()
                .collect();
            NodeGroup::new(name, members)
        })
        .collect()
}

impl Cluster {
    /// Build a cluster from `specs`.
    ///
    /// Fails with [`ClusterError::Config`] when a hostname repeats, and with
    /// [`ClusterError::DuplicateClusterName`] when a requested name belongs to
    /// an active cluster. Nothing is created on the runtime.
    pub async fn new(
        runtime: Arc<dyn Runtime>,
        mut specs: Vec<NodeSpec>,
        options: ClusterOptions,
    ) -> Result<Self> {
        let ClusterOptions {
            name,
            port_overrides,
            settings,
        } = options;
        settings.validate()?;
        topology::validate_nodes(&specs)?;

        let active = names::cluster_names(&*runtime, &settings.label_key).await?;
        let name = match name {
            Some(name) if active.contains(&name) => {
                return Err(ClusterError::DuplicateClusterName {
                    name,
                    clusters: active.into_iter().collect(),
                });
            }
            Some(name) => name,
            None => names::generate_unused_name(&mut rand::thread_rng(), &active),
        };

        apply_port_overrides(&mut specs, &port_overrides)?;

        let settings = Arc::new(settings);
        let nodes: Vec<Arc<Node>> = specs
            .into_iter()
            .map(|spec| Arc::new(Node::new(spec, Arc::clone(&runtime), Arc::clone(&settings))))
            .collect();
        let groups = group_nodes(&nodes);

        debug!(cluster = %name, nodes = nodes.len(), groups = groups.len(), "cluster configured");
        Ok(Self {
            name,
            runtime,
            settings,
            nodes,
            groups,
            network: OnceLock::new(),
        })
    }

    /// Cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Node groups in order of first appearance.
    #[must_use]
    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    /// Group called `name`.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&NodeGroup> {
        self.groups.iter().find(|group| group.name() == name)
    }

    /// Node with short hostname `hostname`.
    #[must_use]
    pub fn node(&self, hostname: &str) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|node| node.hostname() == hostname)
    }

    /// Network the cluster was started on.
    #[must_use]
    pub fn network(&self) -> Option<&str> {
        self.network.get().map(String::as_str)
    }

    /// Settings shared by the nodes.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create the network or fetch it if it already exists.
    async fn setup_network(&self, network: &str) -> Result<NetworkInfo> {
        let spec = NetworkSpec {
            name: network.to_string(),
            driver: self.settings.network_driver.clone(),
            labels: labels::management_labels(&self.settings.label_key, &self.name),
        };

        match self.runtime.create_network(&spec).await {
            Ok(info) => {
                info!(network, driver = %spec.driver, "created network");
                Ok(info)
            }
            Err(e) if e.is_network_exists(network) => {
                debug!(network, "network already exists");
                Ok(self.runtime.inspect_network(network).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fail if a container on the network already answers to one of our hostnames.
    async fn check_hostnames(&self, info: &NetworkInfo) -> Result<()> {
        if info.containers.is_empty() {
            return Ok(());
        }

        let incoming: BTreeSet<&str> = self.nodes.iter().map(|node| node.hostname()).collect();
        let mut duplicates = BTreeSet::new();
        for id in &info.containers {
            let details = self.runtime.inspect_container(id).await?;
            if let Some(alias) = details.first_alias(&info.name) {
                if incoming.contains(alias) {
                    duplicates.insert(alias.to_string());
                }
            }
        }

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(ClusterError::DuplicateHostnames {
                duplicates: duplicates.into_iter().collect(),
                network: info.name.clone(),
            })
        }
    }

    /// Start every node on `options.network`.
    ///
    /// Network setup and the hostname check complete before any node is
    /// created. Nodes start one after another; a failure stops the sequence
    /// and leaves already-started nodes running.
    pub async fn start(&self, options: &StartOptions) -> Result<()> {
        let network = options.network.as_str();
        info!(cluster = %self.name, network, nodes = self.nodes.len(), "starting cluster");

        let info = self.setup_network(network).await?;
        self.check_hostnames(&info).await?;
        if self.network.set(network.to_string()).is_err() {
            warn!(cluster = %self.name, network, "cluster was already started");
        }

        for node in &self.nodes {
            node.start(&self.name, options).await?;
        }

        info!(cluster = %self.name, network, "cluster started");
        Ok(())
    }

    /// Run `command` on every node in declaration order, keyed by FQDN.
    pub async fn execute(
        &self,
        command: &str,
        options: &ExecuteOptions,
    ) -> Result<Vec<(String, ExecuteResult)>> {
        group::execute_on(&self.nodes, command, options).await
    }

    /// Stop every node that has a container, including nodes whose start
    /// failed part way. Nodes that never got a container are skipped.
    pub async fn stop(&self, remove: bool) -> Result<()> {
        for node in &self.nodes {
            if node.container_id().is_ok() {
                node.stop(remove).await?;
            }
        }
        info!(cluster = %self.name, remove, "cluster stopped");
        Ok(())
    }
}
