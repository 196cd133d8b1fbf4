use std::collections::HashMap;
use std::fmt;

use log::{debug, info};

use super::record::{GraphDataset, NeighborStats, ScoreRecord, normalize_id};

/// `network:address`, with the address in canonical case.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    network: String,
    address: String,
}

impl CacheKey {
    pub fn new(network: &str, address: &str) -> Self {
        Self {
            network: network.to_owned(),
            address: normalize_id(address),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.address)
    }
}

/// Neighbor set last loaded for a focus, with the cap it was requested at.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedNeighborhood {
    pub cap: usize,
    pub dataset: GraphDataset,
}

/// What the session currently believes about each entity. Session-scoped and
/// small, so the only eviction is a full clear on network switch.
#[derive(Debug)]
pub struct ResultCache {
    network: String,
    scores: HashMap<CacheKey, ScoreRecord>,
    neighbor_stats: HashMap<CacheKey, NeighborStats>,
    neighborhoods: HashMap<CacheKey, CachedNeighborhood>,
}

impl ResultCache {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.to_owned(),
            scores: HashMap::new(),
            neighbor_stats: HashMap::new(),
            neighborhoods: HashMap::new(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    fn key(&self, id: &str) -> CacheKey {
        CacheKey::new(&self.network, id)
    }

    pub fn put(&mut self, record: ScoreRecord) {
        let key = CacheKey::new(&record.network, &record.id);
        debug!("cached score {} for {key}", record.score);
        self.scores.insert(key, record);
    }

    pub fn get(&self, network: &str, id: &str) -> Option<&ScoreRecord> {
        self.scores.get(&CacheKey::new(network, id))
    }

    /// Score for `id` on the active network.
    pub fn score(&self, id: &str) -> Option<&ScoreRecord> {
        self.scores.get(&self.key(id))
    }

    pub fn put_neighbor_stats(&mut self, stats: NeighborStats) {
        let key = self.key(&stats.id);
        self.neighbor_stats.insert(key, stats);
    }

    pub fn neighbor_stats(&self, id: &str) -> Option<&NeighborStats> {
        self.neighbor_stats.get(&self.key(id))
    }

    pub fn put_neighborhood(&mut self, focus: &str, cap: usize, dataset: GraphDataset) {
        let key = self.key(focus);
        self.neighborhoods
            .insert(key, CachedNeighborhood { cap, dataset });
    }

    pub fn neighborhood(&self, focus: &str) -> Option<&CachedNeighborhood> {
        self.neighborhoods.get(&self.key(focus))
    }

    pub fn clear(&mut self) {
        self.scores.clear();
        self.neighbor_stats.clear();
        self.neighborhoods.clear();
    }

    /// Scores are network-scoped, so any switch drops everything. Returns
    /// whether the network actually changed.
    pub fn switch_network(&mut self, network: &str) -> bool {
        if self.network == network {
            return false;
        }
        info!(
            "network {} -> {network}: dropping {} scores",
            self.network,
            self.scores.len()
        );
        self.network = network.to_owned();
        self.clear();
        true
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
