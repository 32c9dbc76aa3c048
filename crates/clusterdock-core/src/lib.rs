//! # clusterdock-core
//!
//! Orchestration of ephemeral, multi-node container clusters.
//!
//! A [`Cluster`] is built from a list of [`NodeSpec`]s, each describing one
//! host: hostname, group, image, ports, volumes, devices, environment. On
//! start the cluster sets up its network, checks that none of its hostnames
//! are taken on it, then walks every [`Node`] through its startup sequence:
//!
//! 1. Assemble the container configuration
//! 2. Ensure the image and create the container
//! 3. Run the pre-start hook and start the container
//! 4. Wait for it to run, then for its SSH daemon if it has one
//! 5. Optionally register it in the host's `/etc/hosts`
//!
//! Once started, nodes run commands ([`Node::execute`]), move files in and
//! out ([`Node::get_file`], [`Node::put_file`]) and can be committed to
//! images ([`Node::commit`]).
//!
//! All runtime access goes through an injected
//! [`clusterdock_runtime::Runtime`], so tests drive the whole sequence
//! against [`clusterdock_runtime::FakeRuntime`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clusterdock_core::{Cluster, ClusterOptions, NodeSpec, StartOptions};
//! use clusterdock_runtime::DockerRuntime;
//!
//! let runtime = Arc::new(DockerRuntime::connect()?);
//! let nodes = vec![
//!     NodeSpec::new("node-1", "primary", "centos:7"),
//!     NodeSpec::new("node-2", "secondary", "centos:7"),
//! ];
//! let cluster = Cluster::new(runtime, nodes, ClusterOptions::default()).await?;
//! cluster.start(&StartOptions::new("cluster")).await?;
//! for (fqdn, result) in cluster.execute("hostname", &Default::default()).await? {
//!     println!("{fqdn}: {}", result.output);
//! }
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod cluster;
pub mod error;
pub mod exec;
pub mod group;
pub mod labels;
pub mod names;
pub mod node;
pub mod poll;
pub mod settings;
pub mod topology;

// Re-exports
pub use cluster::{Cluster, ClusterOptions};
pub use error::{ClusterError, Result};
pub use exec::{ExecuteOptions, ExecuteResult};
pub use group::NodeGroup;
pub use names::{ActiveCluster, active_clusters, remove_cluster};
pub use node::{CommitOptions, Node, NodeState, PreStartHook, StartOptions, StartedNode};
pub use poll::Poller;
pub use settings::Settings;
pub use topology::{ContainerOptions, NodeSpec, Port, PortOverride, Topology, Volume};
