//! Session context: owns every component for one exploration session and
//! routes worker output between them. Driven once per frame by `pump`.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::util::{abbreviate_id, format_age_days};
use crate::vision::cache::ResultCache;
use crate::vision::channel::{Channel, Delivery, PendingReply, Reply};
use crate::vision::expander::{
    ExpansionOutcome, LOADING_STATUS, NeighborExpander, loaded_status, neighbor_status_line,
};
use crate::vision::navigator::Navigator;
use crate::vision::normalize::normalize;
use crate::vision::protocol::{InitPayload, RequestBody, ScoreItem, WorkerFlags};
use crate::vision::record::{GraphDataset, NeighborStats, ScoreRecord, normalize_id};
use crate::vision::scheduler::{FocusGuard, RenderMode, RenderScheduler};
use crate::vision::service::default_factory;

use super::graph::{GraphEngine, GraphEvent};
use super::panels::{Panels, Surfaces};

pub const DEMO_SEED: &str = "0xdemoseed00000000000000000000000000000001";
pub const NETWORKS: [&str; 6] = ["eth", "base", "arbitrum", "optimism", "polygon", "bsc"];

const IDLE_STATUS: &str = "Idle";
const OFFLINE_STATUS: &str = "API base missing — using offline fallback (synthetic neighbors)";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flags {
    pub debounce: Duration,
    pub label_threshold: usize,
    pub default_cap: usize,
    pub more_step: usize,
    pub enable_signals: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(180),
            label_threshold: 150,
            default_cap: 120,
            more_step: 120,
            enable_signals: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub api_base: String,
    pub network: String,
    pub concurrency: usize,
    pub seed: Option<String>,
    pub flags: Flags,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            network: "eth".to_owned(),
            concurrency: 8,
            seed: None,
            flags: Flags::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusOrigin {
    /// A fresh selection; recorded in history.
    Push,
    /// Back/forward traversal; history is left as is.
    History,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Ready,
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphStatus {
    pub text: String,
    pub loading: bool,
    /// Neighbors beyond the current cap. "Load more" is offered iff positive.
    pub overflow: usize,
}

pub struct Session {
    config: SessionConfig,
    network: String,
    channel: Channel,
    cache: ResultCache,
    focus: FocusGuard,
    scheduler: RenderScheduler,
    expander: NeighborExpander,
    navigator: Navigator,
    graph: GraphEngine,
    panels: Panels,
    phase: Phase,
    init: Option<PendingReply>,
    score_reply: Option<(String, PendingReply)>,
    batch: Option<PendingReply>,
    graph_status: GraphStatus,
    batch_status: String,
    hover_readout: Option<String>,
}

impl Session {
    /// Spawns the scoring worker and starts a session against it.
    pub fn start(config: SessionConfig) -> Self {
        Self::with_channel(config, Channel::connect(default_factory()))
    }

    pub fn with_channel(config: SessionConfig, mut channel: Channel) -> Self {
        let network = config.network.clone();
        let flags = config.flags;

        let init = channel.send(RequestBody::Init(InitPayload {
            api_base: Some(config.api_base.clone()),
            network: network.clone(),
            concurrency: Some(config.concurrency),
            flags: Some(WorkerFlags::default()),
        }));

        let status = if config.api_base.trim().is_empty() {
            warn!("no API base configured; neighbors come from the offline fallback");
            OFFLINE_STATUS
        } else {
            IDLE_STATUS
        };

        let mut session = Self {
            cache: ResultCache::new(&network),
            focus: FocusGuard::default(),
            scheduler: RenderScheduler::new(flags.debounce),
            expander: NeighborExpander::new(flags.default_cap, flags.more_step),
            navigator: Navigator::default(),
            graph: GraphEngine::new(flags.label_threshold),
            panels: Panels::new(&network, flags.enable_signals),
            phase: Phase::Connecting,
            init: Some(init),
            score_reply: None,
            batch: None,
            graph_status: GraphStatus {
                text: status.to_owned(),
                ..GraphStatus::default()
            },
            batch_status: IDLE_STATUS.to_owned(),
            hover_readout: None,
            network,
            channel,
            config,
        };
        session.seed();
        session
    }

    /// Places the seed node and selects it without scoring it yet.
    fn seed(&mut self) {
        let seed = self.config.seed.as_deref().unwrap_or(DEMO_SEED);
        let seed = normalize_id(seed);
        self.graph.set_data(GraphDataset::seed(&seed, &self.network));
        self.select(Some(&seed));
    }

    fn select(&mut self, id: Option<&str>) {
        self.focus.select(id);
        self.graph.set_selected(id);
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn selected(&self) -> Option<&str> {
        self.focus.selected()
    }

    pub fn graph(&self) -> &GraphEngine {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphEngine {
        &mut self.graph
    }

    pub fn panels(&self) -> &Panels {
        &self.panels
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn graph_status(&self) -> &GraphStatus {
        &self.graph_status
    }

    pub fn batch_status(&self) -> &str {
        &self.batch_status
    }

    pub fn hover_readout(&self) -> Option<&str> {
        self.hover_readout.as_deref()
    }

    pub fn neighbor_cap(&self) -> usize {
        self.expander.cap()
    }

    pub fn is_scoring(&self) -> bool {
        self.score_reply.is_some()
    }

    /// Whether any reply is still outstanding, so the frame loop keeps polling.
    pub fn is_busy(&self) -> bool {
        self.init.is_some()
            || self.score_reply.is_some()
            || self.batch.is_some()
            || self.expander.is_loading()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    fn after_score(&mut self, record: ScoreRecord, mode: RenderMode, now: Instant) -> bool {
        let mut surfaces = Surfaces {
            panels: &mut self.panels,
            graph: &mut self.graph,
        };
        self.scheduler.after_score(
            record,
            mode,
            &mut self.cache,
            &self.focus,
            &mut surfaces,
            now,
        )
    }

    fn set_graph_status(&mut self, text: impl Into<String>, loading: bool) {
        self.graph_status.text = text.into();
        self.graph_status.loading = loading;
    }

    /// Makes `raw` the focused entity: scores it (from cache when possible)
    /// and loads its neighbors.
    pub fn focus_address(&mut self, raw: &str, origin: FocusOrigin, now: Instant) {
        let id = normalize_id(raw);
        if id.is_empty() {
            return;
        }
        info!("focus {id} ({origin:?})");

        if origin == FocusOrigin::Push {
            self.navigator.push(&id);
        }
        self.select(Some(&id));
        self.graph.flash_halo(&id, now);

        // Re-derived so stats that arrived while unfocused are folded in.
        if let Some(raw) = self.cache.score(&id).map(|record| record.raw.clone()) {
            self.score_reply = None;
            let record = normalize(&raw, &self.cache);
            self.after_score(record, RenderMode::IMMEDIATE, now);
        } else {
            let reply = self.channel.send(RequestBody::ScoreOne {
                item: ScoreItem::address(id.clone(), &self.network),
            });
            self.score_reply = Some((id.clone(), reply));
        }

        self.graph_status = GraphStatus {
            text: LOADING_STATUS.to_owned(),
            loading: true,
            overflow: 0,
        };

        let cached = (origin == FocusOrigin::History)
            .then(|| self.cache.neighborhood(&id).cloned())
            .flatten();
        match cached {
            Some(neighborhood) => {
                debug!("reusing cached neighborhood for {id}");
                self.expander.restore(&id, neighborhood.cap);
                self.show_neighborhood(&id, neighborhood.dataset);
            }
            None => {
                let cap = self.config.flags.default_cap;
                self.expander
                    .expand(&mut self.channel, &id, cap, &self.network);
            }
        }
    }

    fn show_neighborhood(&mut self, focus: &str, dataset: GraphDataset) {
        let overflow = self
            .cache
            .neighbor_stats(focus)
            .map_or(0, |stats| stats.overflow);
        let status = loaded_status(dataset.nodes.len(), overflow);
        if !dataset.contains(focus) {
            warn!("neighbor set for {focus} does not include it");
        }

        self.graph.set_data(dataset);
        self.graph.center_on(focus);
        self.graph.zoom_fit();
        self.graph_status = GraphStatus {
            text: status,
            loading: false,
            overflow,
        };
    }

    pub fn load_more(&mut self) {
        if let Some(cap) = self.expander.load_more(&mut self.channel, &self.network) {
            debug!("requested {cap} neighbors");
            self.set_graph_status(LOADING_STATUS, true);
        }
    }

    pub fn back(&mut self, now: Instant) {
        if let Some(id) = self.navigator.back().map(str::to_owned) {
            self.focus_address(&id, FocusOrigin::History, now);
        }
    }

    pub fn forward(&mut self, now: Instant) {
        if let Some(id) = self.navigator.forward().map(str::to_owned) {
            self.focus_address(&id, FocusOrigin::History, now);
        }
    }

    /// Batch-scores every node in the graph that has no cached score yet.
    pub fn score_visible(&mut self) {
        let ids = self
            .graph
            .data()
            .nodes
            .iter()
            .map(|node| normalize_id(&node.id))
            .collect::<Vec<_>>();
        if ids.is_empty() {
            self.batch_status = "No nodes in view".to_owned();
            return;
        }
        self.batch_status = format!("Batch: {} nodes", ids.len());

        let items = ids
            .into_iter()
            .filter(|id| self.cache.score(id).is_none())
            .map(|id| ScoreItem::address(id, &self.network))
            .collect::<Vec<_>>();
        if items.is_empty() {
            return;
        }
        self.batch = Some(self.channel.send(RequestBody::ScoreBatch { items }));
    }

    pub fn switch_network(&mut self, network: &str) {
        if !self.cache.switch_network(network) {
            return;
        }
        self.network = network.to_owned();
        self.panels.set_network(network);
        self.scheduler.cancel();
        debug!(
            "switching to {network} with {} requests in flight",
            self.channel.pending_len()
        );
        self.init = Some(self.channel.send(RequestBody::Init(InitPayload {
            network: network.to_owned(),
            ..InitPayload::default()
        })));
        self.score_visible();
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.select(None);
        self.panels.clear();
        self.scheduler.cancel();
        self.expander.reset();
        self.navigator.clear();
        self.score_reply = None;
        self.batch = None;
        self.hover_readout = None;
        self.batch_status = IDLE_STATUS.to_owned();
        self.graph_status = GraphStatus {
            text: IDLE_STATUS.to_owned(),
            ..GraphStatus::default()
        };
    }

    /// Drains worker output, settles polled replies, fires a due debounced
    /// render and handles graph events.
    pub fn pump(&mut self, now: Instant) {
        while let Some(response) = self.channel.try_next() {
            let cache = &self.cache;
            let delivery = self
                .channel
                .dispatch(response, |raw| normalize(raw, cache));
            if let Some(delivery) = delivery {
                self.route(delivery, now);
            }
        }

        self.poll_init();
        self.poll_score();
        self.poll_batch();
        if let Some(outcome) = self.expander.poll(&self.cache, &self.focus) {
            self.apply_expansion(outcome);
        }

        let mut surfaces = Surfaces {
            panels: &mut self.panels,
            graph: &mut self.graph,
        };
        self.scheduler.tick(now, &self.focus, &mut surfaces);

        for event in self.graph.take_events() {
            self.handle_graph_event(event, now);
        }
    }

    fn route(&mut self, delivery: Delivery, now: Instant) {
        match delivery {
            Delivery::Score(record) | Delivery::Streamed(record) => {
                self.after_score(record, RenderMode::DEBOUNCED, now);
            }
            Delivery::NeighborStats(stats) => self.apply_neighbor_stats(stats, now),
            Delivery::BatchDone => self.batch_status = "Neighbors scored.".to_owned(),
            Delivery::Failed(message) => self.set_graph_status(message, self.expander.is_loading()),
        }
    }

    /// Stats for the focused entity re-derive its cached record right away so
    /// the neighbor-derived signals never lag behind the status line.
    fn apply_neighbor_stats(&mut self, stats: NeighborStats, now: Instant) {
        let id = normalize_id(&stats.id);
        let focused = self.focus.is_active(&id);
        if focused {
            self.graph_status.text = neighbor_status_line(Some(&stats));
            self.graph_status.overflow = stats.overflow;
        }
        self.cache.put_neighbor_stats(stats);

        if !focused {
            return;
        }
        if let Some(raw) = self.cache.score(&id).map(|record| record.raw.clone()) {
            let record = normalize(&raw, &self.cache);
            self.after_score(record, RenderMode::FORCED, now);
        }
    }

    fn apply_expansion(&mut self, outcome: ExpansionOutcome) {
        match outcome {
            ExpansionOutcome::Loaded {
                focus,
                cap,
                dataset,
                status,
            } => {
                debug!("{focus}: {status}");
                self.cache.put_neighborhood(&focus, cap, dataset.clone());
                self.show_neighborhood(&focus, dataset);
            }
            ExpansionOutcome::Empty { focus, status } => {
                debug!("{focus}: {status}");
                self.set_graph_status(status, false);
            }
            ExpansionOutcome::Failed { focus, message } => {
                warn!("expansion of {focus} failed: {message}");
                self.set_graph_status(message, false);
            }
            ExpansionOutcome::Stale { focus } => {
                debug!("ignored neighbors for {focus}");
                self.graph_status.loading = self.expander.is_loading();
            }
        }
    }

    fn poll_init(&mut self) {
        let Some(settlement) = self.init.as_ref().and_then(PendingReply::try_take) else {
            return;
        };
        self.init = None;

        match settlement {
            Ok(_) => {
                let first = self.phase == Phase::Connecting;
                self.phase = Phase::Ready;
                info!("scoring worker ready on {}", self.network);
                if first && let Some(seed) = self.config.seed.clone() {
                    self.focus_address(&seed, FocusOrigin::Push, Instant::now());
                }
            }
            Err(error) => {
                warn!("scoring worker failed to start: {error}");
                self.phase = Phase::Failed(error.to_string());
            }
        }
    }

    fn poll_score(&mut self) {
        let Some(settlement) = self
            .score_reply
            .as_ref()
            .and_then(|(_, reply)| reply.try_take())
        else {
            return;
        };
        let Some((id, _)) = self.score_reply.take() else {
            return;
        };

        match settlement {
            Ok(Reply::Score(_)) | Ok(Reply::Ack) => {}
            Ok(Reply::Graph(_)) => warn!("score request for {id} settled with a graph"),
            Err(error) if self.focus.is_active(&id) => {
                self.set_graph_status(format!("Score unavailable: {error}"), self.expander.is_loading());
            }
            Err(error) => debug!("score for {id} failed after focus moved: {error}"),
        }
    }

    fn poll_batch(&mut self) {
        let Some(settlement) = self.batch.as_ref().and_then(PendingReply::try_take) else {
            return;
        };
        self.batch = None;
        if let Err(error) = settlement {
            self.batch_status = format!("Batch failed: {error}");
        }
    }

    fn handle_graph_event(&mut self, event: GraphEvent, now: Instant) {
        match event {
            GraphEvent::SelectNode(id) => self.focus_address(&id, FocusOrigin::Push, now),
            GraphEvent::HoverNode(id) => {
                self.hover_readout = id.map(|id| self.readout_for(&id));
            }
            GraphEvent::DataChanged { nodes } => {
                debug!("graph now holds {nodes} nodes");
                self.hover_readout = None;
            }
        }
    }

    fn readout_for(&self, id: &str) -> String {
        let record = self.cache.score(id);
        let age = format_age_days(record.and_then(|record| record.feats.age_days));
        let neighbors = self
            .cache
            .neighbor_stats(id)
            .map_or_else(|| self.graph.node_count().saturating_sub(1), |stats| stats.n);
        let ofac = if record.is_some_and(|record| record.explain.ofac_hit) {
            "OFAC"
        } else {
            "No OFAC"
        };
        format!(
            "{}  |  Age {age}  |  Neighbors {neighbors}  |  {ofac}",
            abbreviate_id(id)
        )
    }
}
