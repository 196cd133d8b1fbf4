//! Radial graph surface: owns the working dataset, its layout and the view
//! transform. Painting lives in `view`, pointer handling in `interaction`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use eframe::egui::{Color32, Pos2, Rect, Vec2, pos2, vec2};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use log::debug;

use crate::vision::record::{GraphDataset, normalize_id};

use super::render_utils::{halo_intensity, score_color};

mod interaction;
mod view;

pub(super) const NODE_RADIUS: f32 = 11.0;
pub(super) const NODE_CORE_RADIUS: f32 = 5.5;
pub(super) const LABEL_OFFSET: f32 = 16.0;
const RING_RATIO: f32 = 0.28;
const FIT_PADDING: f32 = 40.0;
const MIN_SCALE: f32 = 0.1;
const MAX_SCALE: f32 = 4.0;
const FLASH_DURATION: Duration = Duration::from_millis(450);

/// Single group transform applied to layout coordinates:
/// `surface = translate + layout * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub translate: Vec2,
    pub scale: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            translate: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl ViewTransform {
    pub fn apply(self, layout: Pos2) -> Pos2 {
        (self.translate + layout.to_vec2() * self.scale).to_pos2()
    }

    pub fn invert(self, surface: Pos2) -> Pos2 {
        ((surface.to_vec2() - self.translate) / self.scale).to_pos2()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    SelectNode(String),
    /// `None` when the pointer leaves the last hovered node.
    HoverNode(Option<String>),
    DataChanged { nodes: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Unselected,
    Hovered,
    Selected,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Halo {
    pub blocked: bool,
    pub color: Color32,
    pub intensity: f32,
}

impl Halo {
    pub fn for_score(score: f64, blocked: bool) -> Self {
        Self {
            blocked,
            color: score_color(score, blocked),
            intensity: halo_intensity(score),
        }
    }
}

pub struct GraphEngine {
    data: GraphDataset,
    /// Layout coordinates, parallel to `data.nodes`.
    positions: Vec<Pos2>,
    index_by_id: HashMap<String, usize>,
    viewport: Vec2,
    transform: ViewTransform,
    halos: HashMap<String, Halo>,
    flash: Option<(String, Instant)>,
    show_labels: bool,
    label_threshold: usize,
    hovered: Option<usize>,
    selected: Option<String>,
    search: String,
    matches: HashSet<usize>,
    events: Vec<GraphEvent>,
}

impl GraphEngine {
    pub fn new(label_threshold: usize) -> Self {
        Self {
            data: GraphDataset::default(),
            positions: Vec::new(),
            index_by_id: HashMap::new(),
            viewport: vec2(960.0, 640.0),
            transform: ViewTransform::default(),
            halos: HashMap::new(),
            flash: None,
            show_labels: true,
            label_threshold,
            hovered: None,
            selected: None,
            search: String::new(),
            matches: HashSet::new(),
            events: Vec::new(),
        }
    }

    /// Replaces the working set. Duplicate identifiers keep their first
    /// occurrence.
    pub fn set_data(&mut self, dataset: GraphDataset) {
        let GraphDataset { nodes, links } = dataset;
        let mut seen = HashSet::new();
        let nodes = nodes
            .into_iter()
            .filter(|node| seen.insert(normalize_id(&node.id)))
            .collect();

        self.data = GraphDataset { nodes, links };
        self.hovered = None;
        self.relayout();
        self.refresh_matches();
        self.events.push(GraphEvent::DataChanged {
            nodes: self.data.nodes.len(),
        });
    }

    pub fn data(&self) -> &GraphDataset {
        &self.data
    }

    pub fn clear(&mut self) {
        self.set_data(GraphDataset::default());
        self.halos.clear();
        self.flash = None;
        self.selected = None;
    }

    pub fn node_count(&self) -> usize {
        self.data.nodes.len()
    }

    pub fn set_viewport(&mut self, size: Vec2) {
        if size.x <= 0.0 || size.y <= 0.0 || size == self.viewport {
            return;
        }
        self.viewport = size;
        self.relayout();
    }

    /// Focus at the view center, every other node on one ring at equal angular
    /// spacing.
    fn relayout(&mut self) {
        let center = (self.viewport / 2.0).to_pos2();
        let radius = self.viewport.x.min(self.viewport.y) * RING_RATIO;
        let ring = self.data.nodes.len().saturating_sub(1).max(1) as f32;

        self.positions = (0..self.data.nodes.len())
            .map(|index| {
                if index == 0 {
                    return center;
                }
                let theta = (index - 1) as f32 / ring * std::f32::consts::TAU;
                center + vec2(theta.cos(), theta.sin()) * radius
            })
            .collect();

        self.index_by_id = self
            .data
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (normalize_id(&node.id), index))
            .collect();
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(&normalize_id(id)).copied()
    }

    pub fn position(&self, id: &str) -> Option<Pos2> {
        self.index_of(id).and_then(|index| self.positions.get(index).copied())
    }

    /// Links whose endpoints are both present, as `(a, b, weight)`.
    pub(super) fn resolved_links(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.data.links.iter().filter_map(|link| {
            Some((self.index_of(&link.a)?, self.index_of(&link.b)?, link.weight))
        })
    }

    /// Promotes `id` to the focus slot and re-lays-out. Returns `false` when
    /// the node is absent or already at the center.
    pub fn center_on(&mut self, id: &str) -> bool {
        let Some(index) = self.index_of(id).filter(|index| *index > 0) else {
            return false;
        };
        let node = self.data.nodes.remove(index);
        self.data.nodes.insert(0, node);
        self.hovered = None;
        self.relayout();
        self.refresh_matches();
        self.events.push(GraphEvent::DataChanged {
            nodes: self.data.nodes.len(),
        });
        true
    }

    /// Layout-space bounds of everything drawn, including the labels.
    fn content_bounds(&self) -> Option<Rect> {
        let mut bounds = Rect::NOTHING;
        for position in &self.positions {
            bounds.extend_with(*position - vec2(NODE_RADIUS, NODE_RADIUS));
            bounds.extend_with(*position + vec2(NODE_RADIUS, NODE_RADIUS));
            if self.labels_visible() {
                bounds.extend_with(*position - vec2(0.0, LABEL_OFFSET + 6.0));
            }
        }
        bounds.is_positive().then_some(bounds)
    }

    pub fn zoom_fit(&mut self) {
        let Some(bounds) = self.content_bounds() else {
            return;
        };
        let sx = (self.viewport.x - FIT_PADDING) / bounds.width();
        let sy = (self.viewport.y - FIT_PADDING) / bounds.height();
        let scale = sx.min(sy).clamp(MIN_SCALE, MAX_SCALE);

        self.transform = ViewTransform {
            translate: vec2(
                (self.viewport.x - bounds.width() * scale) / 2.0 - bounds.min.x * scale,
                (self.viewport.y - bounds.height() * scale) / 2.0 - bounds.min.y * scale,
            ),
            scale,
        };
    }

    pub fn reset_view(&mut self) {
        self.transform = ViewTransform::default();
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    /// Zooms by `factor` keeping the layout point under `pointer` fixed.
    pub fn zoom_at(&mut self, pointer: Pos2, factor: f32) {
        let anchor = self.transform.invert(pointer);
        let scale = (self.transform.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        self.transform = ViewTransform {
            translate: pointer.to_vec2() - anchor.to_vec2() * scale,
            scale,
        };
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.transform.translate += delta;
    }

    pub fn set_halo(&mut self, id: &str, halo: Halo) {
        self.halos.insert(normalize_id(id), halo);
    }

    pub fn halo(&self, id: &str) -> Option<&Halo> {
        self.halos.get(&normalize_id(id))
    }

    pub fn flash_halo(&mut self, id: &str, now: Instant) {
        self.flash = Some((normalize_id(id), now));
    }

    /// Remaining flash strength in `[0, 1]` for `id`.
    pub fn flash_strength(&self, id: &str, now: Instant) -> f32 {
        let Some((flashed, started)) = &self.flash else {
            return 0.0;
        };
        if *flashed != normalize_id(id) {
            return 0.0;
        }
        let elapsed = now.saturating_duration_since(*started);
        1.0 - (elapsed.as_secs_f32() / FLASH_DURATION.as_secs_f32()).min(1.0)
    }

    pub fn set_label_visibility(&mut self, visible: bool) {
        self.show_labels = visible;
    }

    /// Labels are suppressed globally once the graph is too dense to read.
    pub fn labels_visible(&self) -> bool {
        self.show_labels && self.data.nodes.len() <= self.label_threshold
    }

    pub fn label_threshold(&self) -> usize {
        self.label_threshold
    }

    pub fn set_selected(&mut self, id: Option<&str>) {
        self.selected = id.map(normalize_id);
    }

    pub fn hovered_id(&self) -> Option<&str> {
        self.hovered
            .and_then(|index| self.data.nodes.get(index))
            .map(|node| node.id.as_str())
    }

    pub fn node_state(&self, id: &str) -> NodeState {
        if self
            .selected
            .as_deref()
            .is_some_and(|selected| selected == normalize_id(id))
        {
            NodeState::Selected
        } else if self.hovered.is_some() && self.hovered == self.index_of(id) {
            NodeState::Hovered
        } else {
            NodeState::Unselected
        }
    }

    pub fn set_search(&mut self, query: &str) {
        if self.search == query {
            return;
        }
        self.search = query.to_owned();
        self.refresh_matches();
    }

    pub fn is_match(&self, index: usize) -> bool {
        self.matches.contains(&index)
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    fn refresh_matches(&mut self) {
        let query = self.search.trim().to_lowercase();
        if query.is_empty() {
            self.matches.clear();
            return;
        }
        let matcher = SkimMatcherV2::default();
        self.matches = self
            .data
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matcher.fuzzy_match(&node.id.to_lowercase(), &query).is_some())
            .map(|(index, _)| index)
            .collect();
        debug!("search {query:?} matched {} nodes", self.matches.len());
    }

    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Surface point for a layout position under `transform`, offset by the
/// surface's top-left corner.
pub(super) fn to_screen(rect: Rect, transform: ViewTransform, layout: Pos2) -> Pos2 {
    rect.min + transform.apply(layout).to_vec2()
}

pub(super) fn to_surface(rect: Rect, screen: Pos2) -> Pos2 {
    pos2(screen.x - rect.min.x, screen.y - rect.min.y)
}
