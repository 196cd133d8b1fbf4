//! Scoring and neighbor-lookup backends. These run on the worker thread only.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::util::{stable_hash, stable_unit};

use super::protocol::{NeighborQuery, ScoreItem};
use super::record::{GraphDataset, GraphLink, GraphNode, NeighborStats, normalize_id};

pub trait RiskService: Send + Sync {
    /// Raw score payload for one entity.
    fn score(&self, item: &ScoreItem) -> Result<Value>;

    /// One hop around `query.id`. `total` counts every neighbor the service
    /// knows about, including those it did not return.
    fn neighbors(&self, query: &NeighborQuery) -> Result<Neighborhood>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Neighborhood {
    pub dataset: GraphDataset,
    pub total: usize,
    pub stats: NeighborStats,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceSettings {
    pub api_base: String,
    pub network: String,
    pub concurrency: usize,
}

pub type ServiceFactory = Box<dyn Fn(&ServiceSettings) -> Arc<dyn RiskService> + Send>;

/// HTTP service when an API base is configured, synthetic fallback otherwise.
pub fn default_factory() -> ServiceFactory {
    Box::new(|settings: &ServiceSettings| -> Arc<dyn RiskService> {
        if settings.api_base.trim().is_empty() {
            info!("no API base configured, using synthetic neighbors");
            return Arc::new(SyntheticRiskService::default());
        }

        match HttpRiskService::new(&settings.api_base) {
            Ok(service) => Arc::new(service),
            Err(error) => {
                warn!("falling back to synthetic service: {error:#}");
                Arc::new(SyntheticRiskService::default())
            }
        }
    })
}

pub struct HttpRiskService {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct NeighborsEnvelope {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    stats: Option<NeighborStats>,
}

impl HttpRiskService {
    pub fn new(api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base: api_base.trim().trim_end_matches('/').to_owned(),
        })
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{path}", self.base);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        let body = response
            .text()
            .with_context(|| format!("failed to read body from {url}"))?;
        if !status.is_success() {
            bail!("{url} returned {status}: {}", body.trim());
        }

        serde_json::from_str(&body).with_context(|| format!("invalid JSON from {url}"))
    }
}

impl RiskService for HttpRiskService {
    fn score(&self, item: &ScoreItem) -> Result<Value> {
        self.get_json(
            "score",
            &[
                ("network", item.network.clone()),
                ("address", item.id.clone()),
            ],
        )
    }

    fn neighbors(&self, query: &NeighborQuery) -> Result<Neighborhood> {
        let raw = self.get_json(
            "neighbors",
            &[
                ("network", query.network.clone()),
                ("address", query.id.clone()),
                ("hop", query.hop.to_string()),
                ("limit", query.limit.to_string()),
            ],
        )?;

        let envelope = NeighborsEnvelope::deserialize(&raw)
            .context("invalid neighbors envelope")?;
        let dataset = GraphDataset::from_value(raw);
        let total = envelope.total.unwrap_or_else(|| dataset.neighbor_count());
        let stats = envelope.stats.unwrap_or_else(|| NeighborStats {
            id: normalize_id(&query.id),
            n: total,
            sparse_neighborhood: total < SPARSE_BELOW,
            ..NeighborStats::default()
        });

        Ok(Neighborhood {
            dataset,
            total,
            stats,
        })
    }
}

const SPARSE_BELOW: usize = 5;

/// Offline stand-in: every value is derived from a stable hash of the address,
/// so repeated lookups agree with each other.
#[derive(Clone, Debug, Default)]
pub struct SyntheticRiskService {
    /// Forces the reported neighbor total for every address.
    fixed_total: Option<usize>,
}

impl SyntheticRiskService {
    pub fn with_total(total: usize) -> Self {
        Self {
            fixed_total: Some(total),
        }
    }

    fn total_for(&self, id: &str) -> usize {
        self.fixed_total
            .unwrap_or_else(|| 2 + (stable_unit(id, "degree") * 180.0) as usize)
    }

    fn neighbor_id(id: &str, index: usize) -> String {
        let salt = index.to_string();
        format!(
            "0x{:016x}{:016x}{:08x}",
            stable_hash(id, &salt),
            stable_hash(&salt, id),
            stable_hash(id, "tail") as u32 ^ index as u32
        )
    }
}

impl RiskService for SyntheticRiskService {
    fn score(&self, item: &ScoreItem) -> Result<Value> {
        let id = normalize_id(&item.id);
        if id.is_empty() {
            bail!("cannot score an empty address");
        }

        let risk = stable_unit(&id, "risk");
        let sanctioned = stable_unit(&id, "ofac") < 0.06;
        let mixer_taint = stable_unit(&id, "mixer") * 0.4;
        let age_days = (stable_unit(&id, "age") * 1800.0).round();

        let mut reasons = Vec::new();
        if sanctioned {
            reasons.push("OFAC/sanctions list match");
        }
        if risk > 0.7 {
            reasons.push("fan In High");
        }
        if risk > 0.55 {
            reasons.push("shortest Path To Sanctioned");
        }
        if mixer_taint > 0.3 {
            reasons.push("known Mixer Proximity");
        }

        let risk_score = if sanctioned {
            100.0
        } else {
            (risk * 92.0).round()
        };

        Ok(json!({
            "address": id,
            "network": item.network,
            "risk_score": risk_score,
            "reasons": reasons,
            "feats": {
                "ageDays": age_days,
                "mixerTaint": mixer_taint,
                "local": { "riskyNeighborRatio": stable_unit(&id, "neighbors") * 0.5 },
            },
            "flags": {
                "custodian": stable_unit(&id, "custodian") < 0.08,
                "clusterRisk": risk > 0.8,
                "dormant": stable_unit(&id, "dormant") < 0.15,
                "mixerLink": mixer_taint > 0.3,
                "platformEntity": stable_unit(&id, "platform") < 0.05,
            },
        }))
    }

    fn neighbors(&self, query: &NeighborQuery) -> Result<Neighborhood> {
        let focus = normalize_id(&query.id);
        if focus.is_empty() {
            bail!("cannot expand an empty address");
        }

        let total = self.total_for(&focus);
        let returned = total.min(query.limit);

        let mut nodes = Vec::with_capacity(returned + 1);
        let mut links = Vec::with_capacity(returned);
        nodes.push(GraphNode::new(focus.clone(), &query.network));
        for index in 0..returned {
            let neighbor = Self::neighbor_id(&focus, index);
            let salt = index.to_string();
            links.push(GraphLink {
                a: focus.clone(),
                b: neighbor.clone(),
                weight: 1.0 + (stable_unit(&neighbor, &salt) * 40.0).round(),
            });
            if index > 0 && stable_unit(&neighbor, "cross") < 0.08 {
                links.push(GraphLink {
                    a: Self::neighbor_id(&focus, index - 1),
                    b: neighbor.clone(),
                    weight: 1.0,
                });
            }
            nodes.push(GraphNode::new(neighbor, &query.network));
        }

        let stats = NeighborStats {
            id: focus.clone(),
            n: total,
            inactive_ratio: Some(stable_unit(&focus, "inactive")),
            avg_tx: Some((stable_unit(&focus, "avg-tx") * 400.0).round()),
            avg_days: Some((stable_unit(&focus, "avg-days") * 1500.0).round()),
            avg_inactive_age: Some((stable_unit(&focus, "inactive-age") * 900.0).round()),
            sparse_neighborhood: total < SPARSE_BELOW,
            overflow: 0,
        };

        Ok(Neighborhood {
            dataset: GraphDataset { nodes, links },
            total,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(id: &str, limit: usize) -> NeighborQuery {
        NeighborQuery {
            id: id.to_owned(),
            network: "eth".to_owned(),
            hop: 1,
            limit,
            cap: limit,
        }
    }

    #[test]
    fn synthetic_scores_are_stable_per_address() {
        let service = SyntheticRiskService::default();
        let item = ScoreItem::address("0xABC", "eth");
        let first = service.score(&item).expect("scored");
        let second = service
            .score(&ScoreItem::address("0xabc", "eth"))
            .expect("scored");
        assert_eq!(first, second);
        assert_eq!(first["address"], "0xabc");
    }

    #[test]
    fn synthetic_neighbors_respect_limit_but_report_total() {
        let service = SyntheticRiskService::with_total(150);
        let hood = service.neighbors(&query("0xabc", 120)).expect("expanded");
        assert_eq!(hood.total, 150);
        assert_eq!(hood.dataset.neighbor_count(), 120);
        assert_eq!(hood.dataset.nodes[0].id, "0xabc");
        assert!(
            hood.dataset
                .links
                .iter()
                .all(|link| hood.dataset.contains(&link.a) && hood.dataset.contains(&link.b))
        );
    }

    #[test]
    fn empty_addresses_are_rejected() {
        let service = SyntheticRiskService::default();
        assert!(service.score(&ScoreItem::address("  ", "eth")).is_err());
        assert!(service.neighbors(&query("", 10)).is_err());
    }
}
