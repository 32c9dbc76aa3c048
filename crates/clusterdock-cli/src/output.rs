//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use clusterdock_core::ActiveCluster;
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// One started node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRow {
    /// Short hostname.
    pub hostname: String,
    /// Node group.
    pub group: String,
    /// Fully qualified name on the cluster network.
    pub fqdn: String,
    /// Address on the cluster network.
    pub ip_address: Option<String>,
    /// Published ports as `host->container`.
    pub ports: Vec<String>,
    /// Short container ID.
    pub container: String,
}

/// A freshly started cluster.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    /// Cluster name.
    pub cluster: String,
    /// Network the nodes are on.
    pub network: String,
    /// Nodes in declaration order.
    pub nodes: Vec<NodeRow>,
}

impl TableDisplay for StartReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Cluster {} started on network {}", self.cluster, self.network)?;
        writeln!(writer)?;
        writeln!(
            writer,
            "{:<24}  {:<12}  {:<32}  {:<15}  {:<12}  PORTS",
            "HOSTNAME", "GROUP", "FQDN", "IP", "CONTAINER"
        )?;
        writeln!(writer, "{}", "─".repeat(110))?;
        for node in &self.nodes {
            writeln!(
                writer,
                "{:<24}  {:<12}  {:<32}  {:<15}  {:<12}  {}",
                truncate(&node.hostname, 24),
                truncate(&node.group, 12),
                truncate(&node.fqdn, 32),
                node.ip_address.as_deref().unwrap_or("-"),
                node.container,
                node.ports.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Active clusters for `ps`.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterList {
    /// Clusters sorted by name.
    pub clusters: Vec<ActiveCluster>,
}

impl TableDisplay for ClusterList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.clusters.is_empty() {
            writeln!(writer, "No active clusters")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<24}  {:<12}  {:<32}  {:<24}  STATE",
            "CLUSTER", "CONTAINER", "NAME", "IMAGE"
        )?;
        writeln!(writer, "{}", "─".repeat(108))?;
        for cluster in &self.clusters {
            for container in &cluster.containers {
                writeln!(
                    writer,
                    "{:<24}  {:<12}  {:<32}  {:<24}  {}",
                    truncate(&cluster.name, 24),
                    container.id.short(),
                    truncate(&container.name, 32),
                    truncate(&container.image, 24),
                    container.state
                )?;
            }
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} cluster(s)", self.clusters.len())?;
        Ok(())
    }
}

/// Output of one command on one container.
#[derive(Debug, Clone, Serialize)]
pub struct ExecRow {
    /// Container name.
    pub node: String,
    /// Exit code, if known.
    pub exit_code: Option<i64>,
    /// Interleaved stdout and stderr.
    pub output: String,
}

/// Results of a broadcast command.
#[derive(Debug, Clone, Serialize)]
pub struct ExecReport {
    /// Cluster name.
    pub cluster: String,
    /// Command line.
    pub command: String,
    /// One row per container.
    pub results: Vec<ExecRow>,
}

impl ExecReport {
    /// Whether every command exited with status 0.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|row| row.exit_code == Some(0))
    }
}

impl TableDisplay for ExecReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        for row in &self.results {
            let code = row
                .exit_code
                .map_or_else(|| "?".to_string(), |code| code.to_string());
            writeln!(writer, "==> {} (exit {code})", row.node)?;
            write!(writer, "{}", row.output)?;
            if !row.output.is_empty() && !row.output.ends_with('\n') {
                writeln!(writer)?;
            }
        }
        Ok(())
    }
}

/// One removed cluster.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedCluster {
    /// Cluster name.
    pub name: String,
    /// Containers removed.
    pub containers: usize,
}

/// Results of `nuke`.
#[derive(Debug, Clone, Serialize)]
pub struct NukeReport {
    /// Removed clusters, in request order.
    pub removed: Vec<RemovedCluster>,
}

impl TableDisplay for NukeReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.removed.is_empty() {
            writeln!(writer, "Nothing to remove")?;
            return Ok(());
        }
        for cluster in &self.removed {
            writeln!(
                writer,
                "✓ Removed cluster {} ({} container(s))",
                cluster.name, cluster.containers
            )?;
        }
        Ok(())
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn render<T: Serialize + TableDisplay>(format: Format, value: &T) -> String {
        let mut buf = Vec::new();
        OutputFormat::new(format).write(&mut buf, value).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn truncate_handles_short_and_long() {
        assert_eq!(truncate("node-1", 10), "node-1");
        assert_eq!(truncate("a-very-long-hostname", 10), "a-very-...");
        assert_eq!(truncate("abcdef", 3), "abc");
    }

    #[test]
    fn empty_cluster_list_table() {
        let list = ClusterList { clusters: vec![] };
        assert_eq!(render(Format::Table, &list), "No active clusters\n");
    }

    #[test]
    fn exec_report_table_and_json() {
        let report = ExecReport {
            cluster: "calm_hopper".into(),
            command: "hostname".into(),
            results: vec![ExecRow {
                node: "node-1.cluster".into(),
                exit_code: Some(0),
                output: "node-1.cluster".into(),
            }],
        };
        assert!(report.all_succeeded());
        assert_eq!(
            render(Format::Table, &report),
            "==> node-1.cluster (exit 0)\nnode-1.cluster\n"
        );

        let json: serde_json::Value =
            serde_json::from_str(&render(Format::Json, &report)).unwrap();
        assert_eq!(json["results"][0]["exit_code"], 0);
        assert!(OutputFormat::new(Format::Json).is_json());
    }

    #[test]
    fn start_report_lists_nodes() {
        let report = StartReport {
            cluster: "calm_hopper".into(),
            network: "cluster".into(),
            nodes: vec![NodeRow {
                hostname: "node-1".into(),
                group: "primary".into(),
                fqdn: "node-1.cluster".into(),
                ip_address: None,
                ports: vec!["32768->8080".into()],
                container: "abc123".into(),
            }],
        };
        let table = render(Format::Table, &report);
        assert!(table.starts_with("Cluster calm_hopper started on network cluster"));
        assert!(table.contains("32768->8080"));
    }
}
