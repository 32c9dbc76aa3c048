//! Start command implementation.

use std::io::Write;
use std::sync::Arc;

use clusterdock_core::{Cluster, ClusterOptions, Settings, StartOptions, Topology};
use clusterdock_runtime::Runtime;
use tracing::debug;

use crate::cli::StartArgs;
use crate::error::CliError;
use crate::output::{NodeRow, OutputFormat, StartReport};

/// Start command executor.
pub struct StartCommand {
    runtime: Arc<dyn Runtime>,
    settings: Settings,
}

impl StartCommand {
    /// Create a new start command.
    #[must_use]
    pub fn new(runtime: Arc<dyn Runtime>, settings: Settings) -> Self {
        Self { runtime, settings }
    }

    /// Start the cluster and write a node table.
    ///
    /// # Errors
    ///
    /// Returns an error if the topology is invalid or any node fails to start.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &StartArgs,
    ) -> Result<(), CliError> {
        let report = self.start(args).await?;
        format.write(writer, &report)?;
        Ok(())
    }

    /// Start the cluster described by `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the topology is invalid or any node fails to start.
    pub async fn start(&self, args: &StartArgs) -> Result<StartReport, CliError> {
        let topology = Topology::from_file(&args.topology)?;
        debug!(topology = %args.topology.display(), nodes = topology.nodes.len(), "loaded topology");
        self.settings.prepare_config_dir()?;

        let options = ClusterOptions {
            name: args.cluster_name.clone(),
            port_overrides: args.ports.clone(),
            settings: self.settings.clone(),
        };
        let cluster = Cluster::new(Arc::clone(&self.runtime), topology.nodes, options).await?;

        let start = StartOptions::new(args.network.as_str())
            .with_pull_images(args.pull_images)
            .with_etc_hosts(!args.no_etc_hosts);
        cluster.start(&start).await?;

        let mut nodes = Vec::with_capacity(cluster.nodes().len());
        for node in cluster.nodes() {
            let started = node.started()?;
            nodes.push(NodeRow {
                hostname: node.hostname().to_string(),
                group: node.group().to_string(),
                fqdn: started.fqdn.clone(),
                ip_address: started.ip_address.clone(),
                ports: started
                    .host_ports
                    .iter()
                    .map(|(container, host)| format!("{host}->{container}"))
                    .collect(),
                container: started.container_id.short().to_string(),
            });
        }

        Ok(StartReport {
            cluster: cluster.name().to_string(),
            network: args.network.clone(),
            nodes,
        })
    }
}
