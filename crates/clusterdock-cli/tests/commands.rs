//! CLI commands driven against the in-memory runtime.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clusterdock_cli::cli::{Cli, Commands, NukeArgs, StartArgs};
use clusterdock_cli::commands::{ExecCommand, NukeCommand, PsCommand, StartCommand};
use clusterdock_cli::{CliError, Format, OutputFormat};
use clusterdock_core::Settings;
use clusterdock_runtime::{FakeRuntime, Runtime, ScriptedExec};
use tempfile::{NamedTempFile, TempDir};

const TOPOLOGY: &str = r#"
[[node]]
hostname = "node-1"
group = "primary"
image = "nodebase:1"
ports = [8080]

[[node]]
hostname = "node-2"
group = "secondary"
image = "nodebase:1"
"#;

struct Harness {
    fake: FakeRuntime,
    runtime: Arc<dyn Runtime>,
    settings: Settings,
    _config: TempDir,
}

fn harness(fake: FakeRuntime) -> Harness {
    let config = tempfile::tempdir().expect("failed to create temp dir");
    let settings = Settings {
        localtime_mount: false,
        readiness_timeout_secs: 5,
        ..Settings::default()
    }
    .with_config_dir_override(Some(config.path().to_path_buf()));
    Harness {
        runtime: Arc::new(fake.clone()),
        fake,
        settings,
        _config: config,
    }
}

fn topology_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(TOPOLOGY.as_bytes())
        .expect("failed to write temp file");
    file
}

fn start_args(topology: PathBuf, name: &str) -> StartArgs {
    let cli = Cli::parse_from([
        "clusterdock".to_string(),
        "start".to_string(),
        topology.display().to_string(),
        "--cluster-name".to_string(),
        name.to_string(),
        "--port".to_string(),
        "node-2:9000->22".to_string(),
        "--no-etc-hosts".to_string(),
    ]);
    match cli.command {
        Commands::Start(args) => args,
        _ => unreachable!("parsed a start command"),
    }
}

async fn start(h: &Harness, name: &str) {
    let topology = topology_file();
    StartCommand::new(Arc::clone(&h.runtime), h.settings.clone())
        .start(&start_args(topology.path().to_path_buf(), name))
        .await
        .expect("cluster should start");
}

#[tokio::test]
async fn start_reports_nodes_and_ports() {
    let h = harness(FakeRuntime::new());
    let topology = topology_file();

    let report = StartCommand::new(Arc::clone(&h.runtime), h.settings.clone())
        .start(&start_args(topology.path().to_path_buf(), "calm_hopper"))
        .await
        .unwrap();

    assert_eq!(report.cluster, "calm_hopper");
    assert_eq!(report.network, "cluster");
    let fqdns: Vec<_> = report.nodes.iter().map(|n| n.fqdn.as_str()).collect();
    assert_eq!(fqdns, vec!["node-1.cluster", "node-2.cluster"]);
    assert_eq!(report.nodes[0].ports, vec!["32768->8080".to_string()]);
    assert_eq!(report.nodes[1].ports, vec!["9000->22".to_string()]);
    assert!(h.settings.config_dir.is_dir());
}

#[tokio::test]
async fn start_with_taken_name_fails() {
    let h = harness(FakeRuntime::new());
    start(&h, "calm_hopper").await;

    let topology = topology_file();
    let err = StartCommand::new(Arc::clone(&h.runtime), h.settings.clone())
        .start(&start_args(topology.path().to_path_buf(), "calm_hopper"))
        .await
        .expect_err("name taken");
    assert!(err.to_string().contains("calm_hopper"));
}

#[tokio::test]
async fn ps_lists_active_clusters() {
    let h = harness(FakeRuntime::new());
    start(&h, "calm_hopper").await;

    let mut out = Vec::new();
    PsCommand::new(Arc::clone(&h.runtime), h.settings.clone())
        .execute(&mut out, &OutputFormat::new(Format::Json))
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["clusters"][0]["name"], "calm_hopper");
    assert_eq!(json["clusters"][0]["containers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn exec_broadcasts_to_running_containers() {
    let h = harness(
        FakeRuntime::new().with_exec("cat /etc/os-release", ScriptedExec::exit(0).stdout("ID=centos\n")),
    );
    start(&h, "calm_hopper").await;

    let args = match Cli::parse_from(["clusterdock", "exec", "calm_hopper", "cat", "/etc/os-release"])
        .command
    {
        Commands::Exec(args) => args,
        _ => unreachable!("parsed an exec command"),
    };
    let mut out = Vec::new();
    let report = ExecCommand::new(Arc::clone(&h.runtime), h.settings.clone())
        .execute(&mut out, &OutputFormat::default(), &args)
        .await
        .unwrap();

    assert_eq!(report.command, "cat /etc/os-release");
    assert_eq!(report.results.len(), 2);
    assert!(report.all_succeeded());
    assert!(report.results.iter().all(|r| r.output == "ID=centos\n"));
    assert!(String::from_utf8(out).unwrap().contains("ID=centos"));
}

#[tokio::test]
async fn exec_unknown_cluster_fails() {
    let h = harness(FakeRuntime::new());
    let args = match Cli::parse_from(["clusterdock", "exec", "nobody_home", "true"]).command {
        Commands::Exec(args) => args,
        _ => unreachable!("parsed an exec command"),
    };

    let err = ExecCommand::new(Arc::clone(&h.runtime), h.settings.clone())
        .run(&args)
        .await
        .expect_err("no such cluster");
    assert!(matches!(err, CliError::ClusterNotFound(name) if name == "nobody_home"));
}

#[tokio::test]
async fn nuke_removes_only_named_clusters() {
    let h = harness(FakeRuntime::new());
    start(&h, "calm_hopper").await;

    let topology = topology_file();
    let mut other = start_args(topology.path().to_path_buf(), "brave_turing");
    other.network = "other".into();
    StartCommand::new(Arc::clone(&h.runtime), h.settings.clone())
        .start(&other)
        .await
        .unwrap();
    assert_eq!(h.fake.container_count(), 4);

    let nuke = NukeCommand::new(Arc::clone(&h.runtime), h.settings.clone());
    let report = nuke
        .nuke(&NukeArgs {
            clusters: vec!["calm_hopper".into()],
            all: false,
        })
        .await
        .unwrap();
    assert_eq!(report.removed.len(), 1);
    assert_eq!(report.removed[0].containers, 2);
    assert_eq!(h.fake.container_count(), 2);

    let err = nuke
        .nuke(&NukeArgs {
            clusters: vec!["calm_hopper".into()],
            all: false,
        })
        .await
        .expect_err("already gone");
    assert!(matches!(err, CliError::ClusterNotFound(_)));

    let report = nuke
        .nuke(&NukeArgs {
            clusters: Vec::new(),
            all: true,
        })
        .await
        .unwrap();
    assert_eq!(report.removed[0].name, "brave_turing");
    assert_eq!(h.fake.container_count(), 0);
}
