//! One-hop neighbor loading with a growable page cap.

use log::{debug, info, warn};

use super::cache::ResultCache;
use super::channel::{Channel, PendingReply, Reply};
use super::protocol::{NeighborQuery, RequestBody};
use super::record::{GraphDataset, NeighborStats, normalize_id, same_id};
use super::scheduler::FocusGuard;

pub const LOADING_STATUS: &str = "Loading neighbors…";
pub const EMPTY_STATUS: &str = "No neighbors found.";

const HOP: u8 = 1;

#[derive(Debug)]
struct Expansion {
    focus: String,
    cap: usize,
    reply: PendingReply,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExpansionOutcome {
    /// Non-empty neighbor set for the still-selected focus; replaces the graph.
    Loaded {
        focus: String,
        cap: usize,
        dataset: GraphDataset,
        status: String,
    },
    /// Valid but empty answer. The prior graph stays on screen.
    Empty { focus: String, status: String },
    Failed { focus: String, message: String },
    /// Focus moved on while the request was in flight.
    Stale { focus: String },
}

#[derive(Debug)]
pub struct NeighborExpander {
    default_cap: usize,
    step: usize,
    cap: usize,
    focus: Option<String>,
    in_flight: Option<Expansion>,
}

impl NeighborExpander {
    pub fn new(default_cap: usize, step: usize) -> Self {
        let default_cap = default_cap.max(1);
        Self {
            default_cap,
            step: step.max(1),
            cap: default_cap,
            focus: None,
            in_flight: None,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Moves the expander to `id`. The cap only resets when the focus actually
    /// changes, so revisiting the same entity keeps its grown page size.
    pub fn set_focus(&mut self, id: &str) {
        if self.focus.as_deref().is_some_and(|focus| same_id(focus, id)) {
            return;
        }
        self.focus = Some(normalize_id(id));
        self.cap = self.default_cap;
    }

    /// Re-enters `id` at the page size its cached neighborhood was loaded
    /// with, so the next "Load more" grows past what is already shown.
    pub fn restore(&mut self, id: &str, cap: usize) {
        if let Some(previous) = self.in_flight.take() {
            debug!(
                "expansion {} for {} dropped on restore",
                previous.reply.id(),
                previous.focus
            );
        }
        self.focus = Some(normalize_id(id));
        self.cap = cap.max(1);
    }

    /// Issues a one-hop neighbor request for `focus` bounded by `cap`. Any
    /// expansion still in flight is superseded; its late answer settles nothing.
    pub fn expand(&mut self, channel: &mut Channel, focus: &str, cap: usize, network: &str) {
        self.set_focus(focus);
        self.cap = cap.max(1);
        let focus = normalize_id(focus);

        let reply = channel.send(RequestBody::Neighbors(NeighborQuery {
            id: focus.clone(),
            network: network.to_owned(),
            hop: HOP,
            limit: self.cap,
            cap: self.cap,
        }));
        if let Some(previous) = self.in_flight.take() {
            debug!(
                "expansion {} for {} superseded by {}",
                previous.reply.id(),
                previous.focus,
                reply.id()
            );
        }
        self.in_flight = Some(Expansion {
            focus,
            cap: self.cap,
            reply,
        });
    }

    /// Grows the cap by one step and re-expands the current focus. Returns the
    /// cap the new request was issued with.
    pub fn load_more(&mut self, channel: &mut Channel, network: &str) -> Option<usize> {
        let focus = self.focus.clone()?;
        let cap = self.cap.saturating_add(self.step);
        info!("loading more neighbors for {focus}: cap {} -> {cap}", self.cap);
        self.expand(channel, &focus, cap, network);
        Some(cap)
    }

    /// Drops all focus state, returning to the configured default cap.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.focus = None;
        self.cap = self.default_cap;
    }

    /// Checks the in-flight expansion. Overflow is read from the neighbor stats
    /// cache, which the worker fills before the graph answer arrives.
    pub fn poll(&mut self, cache: &ResultCache, guard: &FocusGuard) -> Option<ExpansionOutcome> {
        let settlement = self.in_flight.as_ref()?.reply.try_take()?;
        let Expansion { focus, cap, .. } = self.in_flight.take()?;

        let outcome = match settlement {
            Ok(Reply::Graph(_)) if !guard.is_active(&focus) => {
                debug!("dropping neighbors for {focus}: no longer selected");
                ExpansionOutcome::Stale { focus }
            }
            Ok(Reply::Graph(dataset)) if dataset.is_empty() => ExpansionOutcome::Empty {
                focus,
                status: EMPTY_STATUS.to_owned(),
            },
            Ok(Reply::Graph(dataset)) => {
                let overflow = cache.neighbor_stats(&focus).map_or(0, |stats| stats.overflow);
                let status = loaded_status(dataset.nodes.len(), overflow);
                info!("{status} for {focus} (cap {cap})");
                ExpansionOutcome::Loaded {
                    focus,
                    cap,
                    dataset,
                    status,
                }
            }
            Ok(other) => {
                warn!("neighbor request for {focus} settled with {other:?}");
                ExpansionOutcome::Failed {
                    focus,
                    message: "unexpected reply to neighbor request".to_owned(),
                }
            }
            Err(error) => {
                warn!("neighbor request for {focus} failed: {error}");
                ExpansionOutcome::Failed {
                    focus,
                    message: error.to_string(),
                }
            }
        };
        Some(outcome)
    }
}

fn overflow_suffix(overflow: usize) -> String {
    if overflow > 0 {
        format!(" (+{overflow} more)")
    } else {
        String::new()
    }
}

/// `node_count` includes the focus, which is not reported as a neighbor.
pub fn loaded_status(node_count: usize, overflow: usize) -> String {
    format!(
        "Neighbors loaded: {}{}",
        node_count.saturating_sub(1),
        overflow_suffix(overflow)
    )
}

pub fn neighbor_status_line(stats: Option<&NeighborStats>) -> String {
    let Some(stats) = stats else {
        return "Neighbors: (waiting on stats…)".to_owned();
    };

    let inactive = stats
        .inactive_ratio
        .map(|ratio| format!(", inactive {:.1}%", ratio * 100.0))
        .unwrap_or_default();
    let sparse = if stats.sparse_neighborhood {
        " — Limited neighbor data—metrics may be conservative."
    } else {
        ""
    };
    format!(
        "Neighbors: {}{}{inactive}{sparse}",
        stats.n,
        overflow_suffix(stats.overflow)
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::vision::channel::Delivery;
    use crate::vision::channel::tests::{Harness, harness};
    use crate::vision::normalize::normalize;
    use crate::vision::protocol::{Request, Response, ResponseBody};

    struct Fixture {
        h: Harness,
        cache: ResultCache,
        guard: FocusGuard,
        expander: NeighborExpander,
    }

    fn fixture(selected: &str) -> Fixture {
        let mut guard = FocusGuard::default();
        guard.select(Some(selected));
        Fixture {
            h: harness(),
            cache: ResultCache::new("eth"),
            guard,
            expander: NeighborExpander::new(120, 120),
        }
    }

    impl Fixture {
        fn sent(&self) -> Vec<Request> {
            self.h.requests.try_iter().collect()
        }

        fn respond(&self, request: &Request, body: ResponseBody) {
            self.h
                .responses
                .send(Response::new(request.id, body))
                .expect("queue open");
        }

        fn pump(&mut self) -> Option<ExpansionOutcome> {
            while let Some(response) = self.h.channel.try_next() {
                let cache = &self.cache;
                let delivery = self
                    .h
                    .channel
                    .dispatch(response, |raw| normalize(raw, cache));
                if let Some(Delivery::NeighborStats(stats)) = delivery {
                    self.cache.put_neighbor_stats(stats);
                }
            }
            self.expander.poll(&self.cache, &self.guard)
        }
    }

    fn query(request: &Request) -> &NeighborQuery {
        match &request.body {
            RequestBody::Neighbors(query) => query,
            other => panic!("expected NEIGHBORS, got {other:?}"),
        }
    }

    fn graph(ids: &[&str]) -> ResponseBody {
        let nodes = ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>();
        ResponseBody::Result(json!({"nodes": nodes, "links": []}))
    }

    fn stats(id: &str, n: usize, overflow: usize) -> ResponseBody {
        ResponseBody::NeighborStats(NeighborStats {
            id: id.to_owned(),
            n,
            overflow,
            ..NeighborStats::default()
        })
    }

    #[test]
    fn overflow_shows_up_in_the_loaded_status() {
        let mut f = fixture("0xa");
        f.expander.expand(&mut f.h.channel, "0xA", 120, "eth");
        let sent = f.sent();
        assert_eq!(query(&sent[0]).cap, 120);
        assert_eq!(query(&sent[0]).hop, 1);

        let ids = std::iter::once("0xa".to_owned())
            .chain((0..120).map(|i| format!("0xn{i}")))
            .collect::<Vec<_>>();
        let refs = ids.iter().map(String::as_str).collect::<Vec<_>>();
        f.respond(&sent[0], stats("0xa", 150, 30));
        f.respond(&sent[0], graph(&refs));

        match f.pump() {
            Some(ExpansionOutcome::Loaded { status, dataset, .. }) => {
                assert_eq!(dataset.neighbor_count(), 120);
                assert_eq!(status, "Neighbors loaded: 120 (+30 more)");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!f.expander.is_loading());
    }

    #[test]
    fn load_more_grows_the_cap_by_one_step_per_call() {
        let mut f = fixture("0xa");
        f.expander.expand(&mut f.h.channel, "0xa", 120, "eth");
        assert_eq!(f.expander.load_more(&mut f.h.channel, "eth"), Some(240));
        assert_eq!(f.expander.load_more(&mut f.h.channel, "eth"), Some(360));

        let caps = f.sent().iter().map(|r| query(r).cap).collect::<Vec<_>>();
        assert_eq!(caps, vec![120, 240, 360]);
    }

    #[test]
    fn changing_focus_resets_the_cap() {
        let mut f = fixture("0xa");
        f.expander.expand(&mut f.h.channel, "0xa", 120, "eth");
        f.expander.load_more(&mut f.h.channel, "eth");
        f.expander.set_focus("0xA");
        assert_eq!(f.expander.cap(), 240);

        f.expander.set_focus("0xb");
        assert_eq!(f.expander.cap(), 120);
        assert_eq!(f.expander.load_more(&mut f.h.channel, "eth"), Some(240));
        let last = f.sent().pop().expect("sent");
        assert_eq!(query(&last).id, "0xb");
    }

    #[test]
    fn restoring_a_grown_page_continues_from_its_cap() {
        let mut f = fixture("0xa");
        f.expander.expand(&mut f.h.channel, "0xb", 120, "eth");
        f.expander.restore("0xA", 240);
        assert!(!f.expander.is_loading());
        assert_eq!(f.expander.cap(), 240);

        assert_eq!(f.expander.load_more(&mut f.h.channel, "eth"), Some(360));
        let last = f.sent().pop().expect("sent");
        assert_eq!(query(&last).id, "0xa");
        assert_eq!(query(&last).cap, 360);
    }

    #[test]
    fn load_more_without_focus_does_nothing() {
        let mut f = fixture("0xa");
        assert_eq!(f.expander.load_more(&mut f.h.channel, "eth"), None);
        assert!(f.sent().is_empty());
    }

    #[test]
    fn empty_answers_report_no_neighbors() {
        let mut f = fixture("0xa");
        f.expander.expand(&mut f.h.channel, "0xa", 120, "eth");
        let sent = f.sent();
        f.respond(&sent[0], graph(&[]));

        assert_eq!(
            f.pump(),
            Some(ExpansionOutcome::Empty {
                focus: "0xa".to_owned(),
                status: EMPTY_STATUS.to_owned(),
            })
        );
    }

    #[test]
    fn superseded_expansions_never_surface() {
        let mut f = fixture("0xb");
        f.expander.expand(&mut f.h.channel, "0xa", 120, "eth");
        f.expander.expand(&mut f.h.channel, "0xb", 120, "eth");
        let sent = f.sent();

        f.respond(&sent[0], graph(&["0xa", "0xz"]));
        assert_eq!(f.pump(), None);
        assert!(f.expander.is_loading());

        f.respond(&sent[1], graph(&["0xb", "0xy"]));
        assert!(matches!(
            f.pump(),
            Some(ExpansionOutcome::Loaded { focus, .. }) if focus == "0xb"
        ));
    }

    #[test]
    fn answers_for_a_deselected_focus_are_stale() {
        let mut f = fixture("0xa");
        f.expander.expand(&mut f.h.channel, "0xa", 120, "eth");
        f.guard.select(Some("0xc"));
        let sent = f.sent();
        f.respond(&sent[0], graph(&["0xa", "0xb"]));

        assert_eq!(
            f.pump(),
            Some(ExpansionOutcome::Stale {
                focus: "0xa".to_owned()
            })
        );
    }

    #[test]
    fn transport_errors_are_reported_not_raised() {
        let mut f = fixture("0xa");
        f.expander.expand(&mut f.h.channel, "0xa", 120, "eth");
        let sent = f.sent();
        f.respond(
            &sent[0],
            ResponseBody::Error {
                message: "neighbors: timeout".to_owned(),
            },
        );

        assert!(matches!(
            f.pump(),
            Some(ExpansionOutcome::Failed { message, .. }) if message == "neighbors: timeout"
        ));
    }

    #[test]
    fn status_line_formats_stats() {
        assert_eq!(neighbor_status_line(None), "Neighbors: (waiting on stats…)");

        let stats = NeighborStats {
            id: "0xa".to_owned(),
            n: 12,
            inactive_ratio: Some(0.625),
            overflow: 3,
            sparse_neighborhood: true,
            ..NeighborStats::default()
        };
        assert_eq!(
            neighbor_status_line(Some(&stats)),
            "Neighbors: 12 (+3 more), inactive 62.5% — Limited neighbor data—metrics may be conservative."
        );
        assert_eq!(loaded_status(1, 0), "Neighbors loaded: 0");
    }
}
