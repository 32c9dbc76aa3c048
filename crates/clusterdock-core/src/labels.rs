//! The management label.
//!
//! Every network and container clusterdock creates carries one label whose
//! value is a JSON object naming the owning cluster:
//! `org.clusterdock = {"cluster_name": "brave_turing"}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct LabelValue {
    cluster_name: String,
}

/// Encode the label value for `cluster_name`.
pub fn encode_value(cluster_name: &str) -> String {
    serde_json::json!({ "cluster_name": cluster_name }).to_string()
}

/// Decode a label value, returning the cluster name.
pub fn decode_value(value: &str) -> Option<String> {
    serde_json::from_str::<LabelValue>(value)
        .ok()
        .map(|label| label.cluster_name)
}

/// Label map marking a resource as owned by `cluster_name`.
pub fn management_labels(label_key: &str, cluster_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(label_key.to_string(), encode_value(cluster_name));
    labels
}

/// Cluster that owns a resource with `labels`, if it is managed.
pub fn cluster_name(labels: &BTreeMap<String, String>, label_key: &str) -> Option<String> {
    labels.get(label_key).and_then(|value| decode_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_json_object() {
        assert_eq!(encode_value("brave_turing"), r#"{"cluster_name":"brave_turing"}"#);
    }

    #[test]
    fn test_decode_tolerates_spacing_and_extra_keys() {
        assert_eq!(
            decode_value(r#"{ "cluster_name": "x", "other": 1 }"#).as_deref(),
            Some("x")
        );
        assert_eq!(decode_value("not json"), None);
        assert_eq!(decode_value("{}"), None);
    }

    #[test]
    fn test_cluster_name_from_labels() {
        let labels = management_labels("org.clusterdock", "calm_hopper");
        assert_eq!(
            cluster_name(&labels, "org.clusterdock").as_deref(),
            Some("calm_hopper")
        );
        assert_eq!(cluster_name(&labels, "other.key"), None);
    }
}
