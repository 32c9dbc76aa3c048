//! Exec command implementation.
//!
//! Runs against clusters found by label, so it works on clusters started by
//! other processes.

use std::io::Write;
use std::sync::Arc;

use clusterdock_core::{ExecuteOptions, Settings, active_clusters, exec};
use clusterdock_runtime::Runtime;

use crate::cli::ExecArgs;
use crate::error::CliError;
use crate::output::{ExecReport, ExecRow, OutputFormat};

/// Exec command executor.
pub struct ExecCommand {
    runtime: Arc<dyn Runtime>,
    settings: Settings,
}

impl ExecCommand {
    /// Create a new exec command.
    #[must_use]
    pub fn new(runtime: Arc<dyn Runtime>, settings: Settings) -> Self {
        Self { runtime, settings }
    }

    /// Run the command and write per-container output.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster does not exist or a command cannot be run.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ExecArgs,
    ) -> Result<ExecReport, CliError> {
        let report = self.run(args).await?;
        format.write(writer, &report)?;
        Ok(report)
    }

    /// Run `args.command` on every running container of `args.cluster`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster does not exist or a command cannot be run.
    pub async fn run(&self, args: &ExecArgs) -> Result<ExecReport, CliError> {
        let cluster = active_clusters(&*self.runtime, &self.settings.label_key)
            .await?
            .into_iter()
            .find(|cluster| cluster.name == args.cluster)
            .ok_or_else(|| CliError::ClusterNotFound(args.cluster.clone()))?;

        let command = args.command.join(" ");
        let options = ExecuteOptions::default().with_user(args.user.as_str());
        let mut results = Vec::new();
        for container in cluster.containers.iter().filter(|c| c.state == "running") {
            let result = exec::execute(
                &*self.runtime,
                &container.id,
                &self.settings.shell,
                &command,
                &options,
            )
            .await?;
            results.push(ExecRow {
                node: container.name.clone(),
                exit_code: result.exit_code,
                output: result.output,
            });
        }

        Ok(ExecReport {
            cluster: cluster.name,
            command,
            results,
        })
    }
}
