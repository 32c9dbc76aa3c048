//! Topology files through to created containers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::sync::Arc;

use clusterdock_core::{Cluster, ClusterError, ClusterOptions, Settings, StartOptions, Topology};
use clusterdock_runtime::{FakeRuntime, Runtime};
use tempfile::NamedTempFile;

const TOPOLOGY: &str = r#"
[[node]]
hostname = "node-1"
group = "primary"
image = "nodebase:1"
ports = [8080, { 9000 = 8081 }]
volumes = [["/data"], { "/var/www" = "/srv" }]
environment = { JAVA_HOME = "/opt/java" }
user = "admin"

[[node]]
hostname = "node-2"
group = "secondary"
image = "nodebase:1"
devices = ["/dev/fuse"]
"#;

fn write_topology(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("failed to write temp file");
    file
}

#[tokio::test]
async fn test_topology_file_drives_container_specs() {
    let file = write_topology(TOPOLOGY);
    let topology = Topology::from_file(file.path()).unwrap();

    let fake = FakeRuntime::new();
    let runtime: Arc<dyn Runtime> = Arc::new(fake.clone());
    let settings = Settings {
        localtime_mount: true,
        ..Settings::default()
    };
    let cluster = Cluster::new(
        runtime,
        topology.nodes,
        ClusterOptions::default().with_settings(settings),
    )
    .await
    .unwrap();
    cluster
        .start(&StartOptions::new("cluster").with_etc_hosts(false))
        .await
        .unwrap();

    let created = fake.created_specs();
    assert_eq!(created.len(), 2);

    let first = &created[0];
    assert_eq!(first.hostname.as_deref(), Some("node-1.cluster"));
    assert_eq!(first.user.as_deref(), Some("admin"));
    assert_eq!(first.env["JAVA_HOME"], "/opt/java");
    assert_eq!(first.host.port_bindings.get(&8080), Some(&None));
    assert_eq!(first.host.port_bindings.get(&8081), Some(&Some(9000)));
    assert!(first.volumes.contains(&"/data".to_string()));
    assert!(first.host.binds.iter().any(|b| b.host == "/var/www" && b.container == "/srv"));

    let second = &created[1];
    assert_eq!(second.host.devices, vec!["/dev/fuse"]);
}

#[test]
fn test_unsupported_volume_type_rejected_before_runtime_use() {
    let file = write_topology(
        r#"
        [[node]]
        hostname = "node-1"
        group = "primary"
        image = "nodebase:1"
        volumes = [42]
        "#,
    );

    let err = Topology::from_file(file.path()).expect_err("integer volume");
    assert!(matches!(err, ClusterError::Config(msg) if msg.contains("saw volume of type integer")));
}
