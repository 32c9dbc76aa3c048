//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clusterdock_core::PortOverride;

/// clusterdock - ephemeral multi-node container clusters.
#[derive(Parser, Debug, Clone)]
#[command(name = "clusterdock")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log debug output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Settings file (TOML).
    #[arg(short, long, env = "CLUSTERDOCK_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Docker daemon URL; local defaults are used when unset.
    #[arg(long, env = "CLUSTERDOCK_DOCKER_URL")]
    pub docker_url: Option<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a cluster from a topology file.
    Start(StartArgs),

    /// List active clusters and their containers.
    Ps,

    /// Run a command on every running container of a cluster.
    Exec(ExecArgs),

    /// Remove clusters and their containers.
    Nuke(NukeArgs),
}

/// Arguments for the start command.
#[derive(Parser, Debug, Clone)]
pub struct StartArgs {
    /// Topology file listing the nodes.
    pub topology: PathBuf,

    /// Network to start nodes on.
    #[arg(short, long, default_value = "cluster")]
    pub network: String,

    /// Cluster name; generated when omitted.
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Extra port for a node, as host:port or host:hostport->containerport.
    #[arg(short, long = "port", value_name = "HOST:PORT")]
    pub ports: Vec<PortOverride>,

    /// Always pull images.
    #[arg(long)]
    pub pull_images: bool,

    /// Do not add nodes to the host's /etc/hosts.
    #[arg(long)]
    pub no_etc_hosts: bool,
}

/// Arguments for the exec command.
#[derive(Parser, Debug, Clone)]
pub struct ExecArgs {
    /// Cluster to run on.
    pub cluster: String,

    /// User to run as.
    #[arg(short, long, default_value = "root")]
    pub user: String,

    /// Command to run through the node shell.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments for the nuke command.
#[derive(Parser, Debug, Clone)]
pub struct NukeArgs {
    /// Clusters to remove.
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub clusters: Vec<String>,

    /// Remove every active cluster.
    #[arg(long)]
    pub all: bool,
}
