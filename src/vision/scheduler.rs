//! Decides whether and when an incoming score reaches the screen.

use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use super::cache::ResultCache;
use super::record::{ScoreRecord, normalize_id, same_id};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderMode {
    pub debounced: bool,
    pub force: bool,
}

impl RenderMode {
    pub const IMMEDIATE: Self = Self {
        debounced: false,
        force: false,
    };
    pub const DEBOUNCED: Self = Self {
        debounced: true,
        force: false,
    };
    pub const FORCED: Self = Self {
        debounced: false,
        force: true,
    };
}

/// The one place that answers "is this record for the entity on screen".
/// Every render path asks it at render time, never at request time.
#[derive(Clone, Debug, Default)]
pub struct FocusGuard {
    selected: Option<String>,
}

impl FocusGuard {
    pub fn select(&mut self, id: Option<&str>) {
        self.selected = id.map(normalize_id).filter(|id| !id.is_empty());
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.selected
            .as_deref()
            .is_some_and(|selected| same_id(selected, id))
    }
}

/// A surface refused a record. The other surfaces still render it.
#[derive(Debug, Error)]
#[error("{surface} rejected {id}: {reason}")]
pub struct RenderError {
    pub surface: &'static str,
    pub id: String,
    pub reason: String,
}

/// Surfaces refreshed for the focused entity, in this order.
pub trait RenderSink {
    fn update_detail_panel(&mut self, record: &ScoreRecord) -> Result<(), RenderError>;
    fn update_graph_overlay(&mut self, record: &ScoreRecord) -> Result<(), RenderError>;
    fn update_signal_panel(&mut self, record: &ScoreRecord) -> Result<(), RenderError>;
}

/// A debounced render armed for one quiet period. Re-arming replaces the value
/// rather than mutating it.
#[derive(Debug)]
struct ScheduledRender {
    record: ScoreRecord,
    due: Instant,
}

#[derive(Debug)]
pub struct RenderScheduler {
    quiet: Duration,
    scheduled: Option<ScheduledRender>,
}

impl RenderScheduler {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            scheduled: None,
        }
    }

    /// Caches `record` and renders it if it belongs to the focused entity:
    /// immediately when forced or not debounced, otherwise once the quiet
    /// period passes without a newer record. Returns whether it rendered now.
    pub fn after_score(
        &mut self,
        record: ScoreRecord,
        mode: RenderMode,
        cache: &mut ResultCache,
        focus: &FocusGuard,
        sink: &mut dyn RenderSink,
        now: Instant,
    ) -> bool {
        cache.put(record.clone());

        if !focus.is_active(&record.id) {
            return false;
        }

        if mode.force || !mode.debounced {
            // Anything still armed is at most as fresh as the cache we just wrote.
            self.scheduled = None;
            render(&record, sink);
            return true;
        }

        self.scheduled = Some(ScheduledRender {
            record,
            due: now + self.quiet,
        });
        false
    }

    /// Fires the armed render once its quiet period has elapsed.
    pub fn tick(&mut self, now: Instant, focus: &FocusGuard, sink: &mut dyn RenderSink) -> bool {
        let Some(scheduled) = self.scheduled.take_if(|scheduled| scheduled.due <= now) else {
            return false;
        };

        if !focus.is_active(&scheduled.record.id) {
            debug!("dropping stale render for {}", scheduled.record.id);
            return false;
        }

        render(&scheduled.record, sink);
        true
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.scheduled.as_ref().map(|scheduled| scheduled.due)
    }

    pub fn cancel(&mut self) {
        self.scheduled = None;
    }
}

fn render(record: &ScoreRecord, sink: &mut dyn RenderSink) {
    let results = [
        ("detail", sink.update_detail_panel(record)),
        ("graph overlay", sink.update_graph_overlay(record)),
        ("signal", sink.update_signal_panel(record)),
    ];
    for (surface, result) in results {
        if let Err(error) = result {
            warn!("{surface} update failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::vision::normalize::normalize;

    const QUIET: Duration = Duration::from_millis(180);

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(&'static str, String, f64)>,
        fail_detail: bool,
    }

    impl Recorder {
        fn push(&mut self, surface: &'static str, record: &ScoreRecord) {
            self.calls.push((surface, record.id.clone(), record.score));
        }

        fn rendered_scores(&self) -> Vec<f64> {
            self.calls
                .iter()
                .filter(|(surface, ..)| *surface == "overlay")
                .map(|(_, _, score)| *score)
                .collect()
        }
    }

    impl RenderSink for Recorder {
        fn update_detail_panel(&mut self, record: &ScoreRecord) -> Result<(), RenderError> {
            if self.fail_detail {
                return Err(RenderError {
                    surface: "detail",
                    id: record.id.clone(),
                    reason: "panel closed".to_owned(),
                });
            }
            self.push("detail", record);
            Ok(())
        }

        fn update_graph_overlay(&mut self, record: &ScoreRecord) -> Result<(), RenderError> {
            self.push("overlay", record);
            Ok(())
        }

        fn update_signal_panel(&mut self, record: &ScoreRecord) -> Result<(), RenderError> {
            self.push("signal", record);
            Ok(())
        }
    }

    struct Fixture {
        scheduler: RenderScheduler,
        cache: ResultCache,
        focus: FocusGuard,
        sink: Recorder,
        start: Instant,
    }

    impl Fixture {
        fn new(selected: &str) -> Self {
            let mut focus = FocusGuard::default();
            focus.select(Some(selected));
            Self {
                scheduler: RenderScheduler::new(QUIET),
                cache: ResultCache::new("eth"),
                focus,
                sink: Recorder::default(),
                start: Instant::now(),
            }
        }

        fn score(&mut self, id: &str, score: u32, mode: RenderMode, at_ms: u64) -> bool {
            let record = normalize(&json!({"id": id, "score": score}), &self.cache);
            self.scheduler.after_score(
                record,
                mode,
                &mut self.cache,
                &self.focus,
                &mut self.sink,
                self.start + Duration::from_millis(at_ms),
            )
        }

        fn tick(&mut self, at_ms: u64) -> bool {
            self.scheduler.tick(
                self.start + Duration::from_millis(at_ms),
                &self.focus,
                &mut self.sink,
            )
        }
    }

    #[test]
    fn records_for_other_entities_are_cached_but_not_rendered() {
        let mut f = Fixture::new("0xA");
        assert!(f.score("0xa", 10, RenderMode::IMMEDIATE, 0));
        assert!(!f.score("0xb", 90, RenderMode::IMMEDIATE, 1));
        assert!(!f.score("0xb", 91, RenderMode::FORCED, 2));

        assert_eq!(f.sink.rendered_scores(), vec![10.0]);
        assert_eq!(f.cache.get("eth", "0xb").map(|r| r.score), Some(91.0));
        assert!(f.scheduler.next_due().is_none());
    }

    #[test]
    fn debounced_bursts_coalesce_into_the_last_record() {
        let mut f = Fixture::new("0xa");
        for (at, score) in [(0, 1), (50, 2), (120, 3)] {
            assert!(!f.score("0xa", score, RenderMode::DEBOUNCED, at));
        }

        assert!(!f.tick(250));
        assert!(f.tick(300));
        assert!(!f.tick(900));
        assert_eq!(f.sink.rendered_scores(), vec![3.0]);
    }

    #[test]
    fn immediate_render_replaces_an_armed_one() {
        let mut f = Fixture::new("0xa");
        f.score("0xa", 1, RenderMode::DEBOUNCED, 0);
        assert!(f.score("0xa", 2, RenderMode::FORCED, 10));
        assert!(!f.tick(1_000));
        assert_eq!(f.sink.rendered_scores(), vec![2.0]);
    }

    #[test]
    fn armed_render_rechecks_focus_when_it_fires() {
        let mut f = Fixture::new("0xa");
        f.score("0xa", 5, RenderMode::DEBOUNCED, 0);
        f.focus.select(Some("0xb"));
        assert!(!f.tick(500));
        assert!(f.sink.calls.is_empty());
    }

    #[test]
    fn a_failing_surface_does_not_block_the_others() {
        let mut f = Fixture::new("0xa");
        f.sink.fail_detail = true;
        assert!(f.score("0xa", 40, RenderMode::IMMEDIATE, 0));

        let surfaces = f
            .sink
            .calls
            .iter()
            .map(|(surface, ..)| *surface)
            .collect::<Vec<_>>();
        assert_eq!(surfaces, vec!["overlay", "signal"]);
    }

    #[test]
    fn focus_guard_ignores_case_and_blank_ids() {
        let mut focus = FocusGuard::default();
        focus.select(Some("0xABC"));
        assert!(focus.is_active("0xabc"));
        focus.select(Some("  "));
        assert_eq!(focus.selected(), None);
        assert!(!focus.is_active(""));
    }
}
