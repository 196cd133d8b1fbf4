use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical form of an entity identifier. Every lookup key goes through here so
/// that `0xABC` and `0xabc` address the same node, cache slot and halo.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn same_id(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoreRecord {
    pub id: String,
    pub network: String,
    /// Always finite and within `0..=100`.
    pub score: f64,
    pub blocked: bool,
    pub explain: Explain,
    pub breakdown: Vec<BreakdownEntry>,
    pub feats: Features,
    pub flags: EntityFlags,
    pub label: Option<String>,
    /// Upstream payload as received, kept so the record can be re-normalized
    /// once fresher neighbor statistics arrive.
    pub raw: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Explain {
    pub ofac_hit: bool,
    pub wallet_age_risk: Option<f64>,
    pub reasons: Vec<String>,
    pub neighbors_dormant: Option<DormantSignal>,
    pub neighbors_avg_tx: Option<NeighborAverage>,
    pub neighbors_avg_age: Option<NeighborAverage>,
    pub sparse_neighborhood: bool,
    /// Upstream explain entries this crate does not interpret.
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DormantSignal {
    pub inactive_ratio: Option<f64>,
    pub n: usize,
    pub avg_inactive_age: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborAverage {
    pub value: f64,
    pub n: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub label: String,
    #[serde(default)]
    pub delta: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Features {
    pub age_days: Option<f64>,
    pub mixer_taint: Option<f64>,
    pub risky_neighbor_ratio: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityFlags {
    pub custodian: bool,
    pub cluster_risk: bool,
    pub dormant: bool,
    pub mixer_link: bool,
    pub platform_entity: bool,
}

impl EntityFlags {
    pub fn labels(self) -> Vec<&'static str> {
        [
            (self.custodian, "Custodian"),
            (self.cluster_risk, "Cluster Risk"),
            (self.dormant, "Dormant"),
            (self.mixer_link, "Mixer Link"),
            (self.platform_entity, "Platform Entity"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborStats {
    pub id: String,
    #[serde(default)]
    pub n: usize,
    #[serde(default)]
    pub inactive_ratio: Option<f64>,
    #[serde(default)]
    pub avg_tx: Option<f64>,
    #[serde(default)]
    pub avg_days: Option<f64>,
    #[serde(default)]
    pub avg_inactive_age: Option<f64>,
    #[serde(default)]
    pub sparse_neighborhood: bool,
    /// Neighbors the service knows about beyond the requested cap.
    #[serde(default)]
    pub overflow: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, network: &str) -> Self {
        let id = id.into();
        Self {
            address: Some(id.clone()),
            id,
            network: Some(network.to_owned()),
        }
    }
}

fn default_link_weight() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub a: String,
    pub b: String,
    #[serde(default = "default_link_weight")]
    pub weight: f64,
}

/// Node/link working set. The first node is the focus; links reference nodes by
/// identifier value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDataset {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub links: Vec<GraphLink>,
}

impl GraphDataset {
    pub fn looks_like_graph(value: &Value) -> bool {
        value.get("nodes").is_some_and(Value::is_array)
            && value.get("links").is_some_and(Value::is_array)
    }

    /// Lenient conversion: a payload that does not deserialize becomes an empty
    /// dataset, which callers report as "no neighbors" rather than a failure.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(dataset) => dataset,
            Err(error) => {
                warn!("discarding malformed graph payload: {error}");
                Self::default()
            }
        }
    }

    pub fn seed(id: &str, network: &str) -> Self {
        Self {
            nodes: vec![GraphNode::new(normalize_id(id), network)],
            links: Vec::new(),
        }
    }

    /// Links alone never make a dataset worth showing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node count excluding the focus.
    pub fn neighbor_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|node| same_id(&node.id, id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position_of(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn graph_shape_requires_both_sequences() {
        assert!(GraphDataset::looks_like_graph(&json!({"nodes": [], "links": []})));
        assert!(!GraphDataset::looks_like_graph(&json!({"nodes": []})));
        assert!(!GraphDataset::looks_like_graph(&json!({"nodes": {}, "links": []})));
        assert!(!GraphDataset::looks_like_graph(&json!({"id": "0xabc", "score": 4})));
    }

    #[test]
    fn malformed_graph_payload_becomes_empty() {
        let dataset = GraphDataset::from_value(json!({"nodes": [{"nope": 1}], "links": []}));
        assert!(dataset.is_empty());
    }

    #[test]
    fn link_weight_defaults_to_one() {
        let dataset = GraphDataset::from_value(json!({
            "nodes": [{"id": "0xA"}, {"id": "0xb"}],
            "links": [{"a": "0xa", "b": "0xB"}]
        }));
        assert_eq!(dataset.links[0].weight, 1.0);
        assert_eq!(dataset.position_of("0XB"), Some(1));
        assert_eq!(dataset.neighbor_count(), 1);
    }

    #[test]
    fn flag_labels_follow_set_bits() {
        let flags = EntityFlags {
            mixer_link: true,
            custodian: true,
            ..EntityFlags::default()
        };
        assert_eq!(flags.labels(), vec!["Custodian", "Mixer Link"]);
    }
}
