//! Cluster naming and discovery.

use std::collections::{BTreeMap, BTreeSet};

use clusterdock_runtime::{ContainerSummary, ListOptions, RemoveOptions, Runtime};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::labels;

const ADJECTIVES: &[&str] = &[
    "agitated", "amazing", "bold", "brave", "calm", "clever", "cranky", "dazzling", "eager",
    "elastic", "focused", "friendly", "gallant", "happy", "hungry", "jolly", "keen", "loving",
    "modest", "nifty", "peaceful", "quirky", "serene", "sharp", "stoic", "tender", "vibrant",
    "wizardly", "youthful", "zealous",
];

const NOUNS: &[&str] = &[
    "babbage", "bohr", "curie", "darwin", "dijkstra", "einstein", "euler", "fermat", "feynman",
    "galileo", "gauss", "hopper", "hypatia", "kepler", "knuth", "lamport", "lovelace", "maxwell",
    "newton", "noether", "pascal", "ritchie", "shannon", "tesla", "thompson", "torvalds",
    "turing", "wozniak", "yonath", "zuse",
];

/// Random attempts before falling back to a numbered name.
const MAX_ATTEMPTS: usize = 100;

/// Generate an `<adjective>_<noun>` name.
pub fn generate_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("clustered");
    let noun = NOUNS.choose(rng).copied().unwrap_or("node");
    format!("{adjective}_{noun}")
}

/// Generate a name not present in `taken`.
pub fn generate_unused_name<R: Rng + ?Sized>(rng: &mut R, taken: &BTreeSet<String>) -> String {
    for _ in 0..MAX_ATTEMPTS {
        let name = generate_name(rng);
        if !taken.contains(&name) {
            return name;
        }
    }

    // Word lists exhausted in practice; number the last candidate.
    let base = generate_name(rng);
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|name| !taken.contains(name))
        .unwrap_or(base)
}

/// A cluster discovered on the runtime by its management label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCluster {
    /// Cluster name.
    pub name: String,
    /// Containers belonging to the cluster.
    pub containers: Vec<ContainerSummary>,
}

/// Clusters with at least one container on the runtime, sorted by name.
///
/// Stopped containers count; a cluster stays active until its containers
/// are removed.
pub async fn active_clusters(runtime: &dyn Runtime, label_key: &str) -> Result<Vec<ActiveCluster>> {
    let containers = runtime
        .list_containers(&ListOptions::all().with_label(label_key))
        .await?;

    let mut clusters: BTreeMap<String, Vec<ContainerSummary>> = BTreeMap::new();
    for container in containers {
        match labels::cluster_name(&container.labels, label_key) {
            Some(name) => clusters.entry(name).or_default().push(container),
            None => debug!(container = %container.id, "skipping container with unreadable label"),
        }
    }

    Ok(clusters
        .into_iter()
        .map(|(name, containers)| ActiveCluster { name, containers })
        .collect())
}

/// Names of all active clusters.
pub async fn cluster_names(runtime: &dyn Runtime, label_key: &str) -> Result<BTreeSet<String>> {
    Ok(active_clusters(runtime, label_key)
        .await?
        .into_iter()
        .map(|cluster| cluster.name)
        .collect())
}

/// Force-remove every container of cluster `name`, with anonymous volumes.
///
/// Returns the number of containers removed. Removing an unknown cluster
/// removes nothing.
pub async fn remove_cluster(runtime: &dyn Runtime, label_key: &str, name: &str) -> Result<usize> {
    let Some(cluster) = active_clusters(runtime, label_key)
        .await?
        .into_iter()
        .find(|cluster| cluster.name == name)
    else {
        debug!(cluster = name, "no containers to remove");
        return Ok(0);
    };

    let options = RemoveOptions::force().with_volumes();
    for container in &cluster.containers {
        debug!(cluster = name, container = %container.id, "removing container");
        runtime.remove_container(&container.id, &options).await?;
    }

    info!(cluster = name, removed = cluster.containers.len(), "cluster removed");
    Ok(cluster.containers.len())
}
