//! What the side panels show for the focused entity. Built from a score record
//! alone, so a render never needs to reach back into the cache.

use crate::util::{format_age_days, format_percent};
use crate::vision::normalize::blocked_visual;
use crate::vision::record::{BreakdownEntry, ScoreRecord};
use crate::vision::scheduler::{RenderError, RenderSink};

use super::graph::{GraphEngine, Halo};

const DORMANT_CLUSTER_RATIO: f64 = 0.6;
const HIGH_VOLUME_AVG_TX: f64 = 200.0;
const NEW_WALLET_RISK: f64 = 0.6;

#[derive(Clone, Debug, PartialEq)]
pub struct NeighborSummary {
    pub count: String,
    pub avg_age: String,
    pub inactive: String,
    pub limited: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetailView {
    pub id: String,
    pub network: String,
    pub score: f64,
    pub blocked: bool,
    pub label: Option<String>,
    pub age: String,
    pub mixer_taint: String,
    pub neighbors_flagged: String,
    pub neighbors: NeighborSummary,
    pub breakdown: Vec<BreakdownEntry>,
}

impl DetailView {
    pub fn from_record(record: &ScoreRecord) -> Self {
        let explain = &record.explain;
        let dormant = explain.neighbors_dormant.as_ref();
        let flagged = dormant
            .and_then(|dormant| dormant.inactive_ratio)
            .or(record.feats.risky_neighbor_ratio)
            .unwrap_or(0.0);

        Self {
            id: record.id.clone(),
            network: record.network.clone(),
            score: record.score,
            blocked: blocked_visual(record),
            label: record.label.clone(),
            age: format_age_days(record.feats.age_days),
            mixer_taint: format_percent(Some(record.feats.mixer_taint.unwrap_or(0.0))),
            neighbors_flagged: format_percent(Some(flagged)),
            neighbors: NeighborSummary {
                count: dormant.map_or_else(|| "—".to_owned(), |dormant| dormant.n.to_string()),
                avg_age: format_age_days(explain.neighbors_avg_age.map(|avg| avg.value)),
                inactive: format_percent(dormant.and_then(|dormant| dormant.inactive_ratio)),
                limited: explain.sparse_neighborhood,
            },
            breakdown: record.breakdown.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Risk,
    Safe,
    Warn,
    Info,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Badge {
    pub label: String,
    pub tone: Tone,
}

impl Badge {
    fn new(label: &str, tone: Tone) -> Self {
        Self {
            label: label.to_owned(),
            tone,
        }
    }
}

pub fn signal_badges(record: &ScoreRecord) -> Vec<Badge> {
    let explain = &record.explain;
    let mut badges = vec![if explain.ofac_hit {
        Badge::new("OFAC", Tone::Risk)
    } else {
        Badge::new("No OFAC", Tone::Safe)
    }];

    if explain
        .neighbors_dormant
        .as_ref()
        .and_then(|dormant| dormant.inactive_ratio)
        .is_some_and(|ratio| ratio >= DORMANT_CLUSTER_RATIO)
    {
        badges.push(Badge::new("Dormant Cluster", Tone::Warn));
    }
    if explain
        .neighbors_avg_tx
        .is_some_and(|avg| avg.value >= HIGH_VOLUME_AVG_TX)
    {
        badges.push(Badge::new("High Counterparty Volume", Tone::Warn));
    }
    if explain.sparse_neighborhood {
        badges.push(Badge::new("Limited Data", Tone::Warn));
    }
    if explain
        .wallet_age_risk
        .is_some_and(|risk| risk >= NEW_WALLET_RISK)
    {
        badges.push(Badge::new("New Wallet", Tone::Warn));
    }
    badges.extend(
        record
            .flags
            .labels()
            .into_iter()
            .map(|label| Badge::new(label, Tone::Info)),
    );
    badges
}

#[derive(Debug)]
pub struct Panels {
    network: String,
    enable_signals: bool,
    detail: Option<DetailView>,
    signals: Option<Vec<Badge>>,
}

impl Panels {
    pub fn new(network: &str, enable_signals: bool) -> Self {
        Self {
            network: network.to_owned(),
            enable_signals,
            detail: None,
            signals: None,
        }
    }

    pub fn detail(&self) -> Option<&DetailView> {
        self.detail.as_ref()
    }

    pub fn signals(&self) -> Option<&[Badge]> {
        self.signals.as_deref()
    }

    pub fn signals_enabled(&self) -> bool {
        self.enable_signals
    }

    pub fn set_network(&mut self, network: &str) {
        self.network = network.to_owned();
    }

    pub fn clear(&mut self) {
        self.detail = None;
        self.signals = None;
    }

    fn check_network(&self, surface: &'static str, record: &ScoreRecord) -> Result<(), RenderError> {
        if record.network == self.network {
            return Ok(());
        }
        Err(RenderError {
            surface,
            id: record.id.clone(),
            reason: format!("scored on {} while {} is active", record.network, self.network),
        })
    }
}

/// Render targets for one pass of the scheduler.
pub(super) struct Surfaces<'a> {
    pub panels: &'a mut Panels,
    pub graph: &'a mut GraphEngine,
}

impl RenderSink for Surfaces<'_> {
    fn update_detail_panel(&mut self, record: &ScoreRecord) -> Result<(), RenderError> {
        self.panels.check_network("detail panel", record)?;
        self.panels.detail = Some(DetailView::from_record(record));
        Ok(())
    }

    fn update_graph_overlay(&mut self, record: &ScoreRecord) -> Result<(), RenderError> {
        self.panels.check_network("graph overlay", record)?;
        self.graph.set_halo(
            &record.id,
            Halo::for_score(record.score, blocked_visual(record)),
        );
        Ok(())
    }

    fn update_signal_panel(&mut self, record: &ScoreRecord) -> Result<(), RenderError> {
        self.panels.check_network("signal panel", record)?;
        if self.panels.enable_signals {
            self.panels.signals = Some(signal_badges(record));
        }
        Ok(())
    }
}
