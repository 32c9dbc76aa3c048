//! Named node groups.

use std::sync::Arc;

use crate::error::Result;
use crate::exec::{ExecuteOptions, ExecuteResult};
use crate::node::Node;

/// Nodes sharing a group name, e.g. `primary` or `secondary`.
///
/// Groups hold the same [`Node`] handles as their cluster.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    name: String,
    nodes: Vec<Arc<Node>>,
}

impl NodeGroup {
    /// Create a group from its members, in order.
    pub fn new(name: impl Into<String>, nodes: Vec<Arc<Node>>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in topology order.
    #[must_use]
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Run `command` on every member in turn.
    ///
    /// Results are keyed by FQDN in member order. The first failure to run
    /// a command aborts the remaining members.
    pub async fn execute(
        &self,
        command: &str,
        options: &ExecuteOptions,
    ) -> Result<Vec<(String, ExecuteResult)>> {
        execute_on(&self.nodes, command, options).await
    }
}

/// Run `command` on each of `nodes` sequentially.
pub(crate) async fn execute_on(
    nodes: &[Arc<Node>],
    command: &str,
    options: &ExecuteOptions,
) -> Result<Vec<(String, ExecuteResult)>> {
    let mut results = Vec::with_capacity(nodes.len());
    for node in nodes {
        let fqdn = node.fqdn()?.to_string();
        let result = node.execute(command, options).await?;
        results.push((fqdn, result));
    }
    Ok(results)
}
