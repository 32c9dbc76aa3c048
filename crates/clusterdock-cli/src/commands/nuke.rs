//! Nuke command implementation.

use std::io::Write;
use std::sync::Arc;

use clusterdock_core::names::cluster_names;
use clusterdock_core::{Settings, remove_cluster};
use clusterdock_runtime::Runtime;

use crate::cli::NukeArgs;
use crate::error::CliError;
use crate::output::{NukeReport, OutputFormat, RemovedCluster};

/// Nuke command executor.
pub struct NukeCommand {
    runtime: Arc<dyn Runtime>,
    settings: Settings,
}

impl NukeCommand {
    /// Create a new nuke command.
    #[must_use]
    pub fn new(runtime: Arc<dyn Runtime>, settings: Settings) -> Self {
        Self { runtime, settings }
    }

    /// Remove the requested clusters.
    ///
    /// # Errors
    ///
    /// Returns an error if a named cluster is not active or removal fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &NukeArgs,
    ) -> Result<(), CliError> {
        let report = self.nuke(args).await?;
        format.write(writer, &report)?;
        Ok(())
    }

    /// Remove every container of the requested clusters.
    ///
    /// # Errors
    ///
    /// Returns an error if a named cluster is not active or removal fails.
    pub async fn nuke(&self, args: &NukeArgs) -> Result<NukeReport, CliError> {
        let label_key = self.settings.label_key.as_str();
        let active = cluster_names(&*self.runtime, label_key).await?;

        let targets: Vec<String> = if args.all {
            active.into_iter().collect()
        } else {
            if let Some(missing) = args.clusters.iter().find(|name| !active.contains(*name)) {
                return Err(CliError::ClusterNotFound(missing.clone()));
            }
            args.clusters.clone()
        };

        let mut removed = Vec::with_capacity(targets.len());
        for name in targets {
            let containers = remove_cluster(&*self.runtime, label_key, &name).await?;
            removed.push(RemovedCluster { name, containers });
        }
        Ok(NukeReport { removed })
    }
}
