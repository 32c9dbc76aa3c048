//! Ps command implementation.

use std::io::Write;
use std::sync::Arc;

use clusterdock_core::{Settings, active_clusters};
use clusterdock_runtime::Runtime;

use crate::error::CliError;
use crate::output::{ClusterList, OutputFormat};

/// Ps command executor.
pub struct PsCommand {
    runtime: Arc<dyn Runtime>,
    settings: Settings,
}

impl PsCommand {
    /// Create a new ps command.
    #[must_use]
    pub fn new(runtime: Arc<dyn Runtime>, settings: Settings) -> Self {
        Self { runtime, settings }
    }

    /// List active clusters.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let clusters = active_clusters(&*self.runtime, &self.settings.label_key).await?;
        format.write(writer, &ClusterList { clusters })?;
        Ok(())
    }
}
