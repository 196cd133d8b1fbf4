//! The background compute context: a thread that owns the risk service and
//! talks to the UI only through the request and response queues.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use super::protocol::{
    InitPayload, NeighborQuery, Request, RequestBody, RequestId, Response, ResponseBody, ScoreItem,
    WorkerFlags,
};
use super::record::{GraphDataset, NeighborStats, normalize_id};
use super::service::{Neighborhood, RiskService, ServiceFactory, ServiceSettings};

const DEFAULT_CONCURRENCY: usize = 8;

pub fn spawn(factory: ServiceFactory) -> (Sender<Request>, Receiver<Response>) {
    let (request_tx, request_rx) = crossbeam_channel::unbounded();
    let (response_tx, response_rx) = crossbeam_channel::unbounded();

    let worker = Worker::new(factory, response_tx);
    let spawned = thread::Builder::new()
        .name("vision-worker".to_owned())
        .spawn(move || worker.run(request_rx));
    if let Err(error) = spawned {
        // Both queue ends owned by the worker are gone, so every request
        // settles as disconnected.
        error!("failed to spawn scoring worker: {error}");
    }

    (request_tx, response_rx)
}

struct Worker {
    factory: ServiceFactory,
    settings: ServiceSettings,
    flags: WorkerFlags,
    service: Option<Arc<dyn RiskService>>,
    out: Sender<Response>,
}

impl Worker {
    fn new(factory: ServiceFactory, out: Sender<Response>) -> Self {
        Self {
            factory,
            settings: ServiceSettings {
                concurrency: DEFAULT_CONCURRENCY,
                ..ServiceSettings::default()
            },
            flags: WorkerFlags::default(),
            service: None,
            out,
        }
    }

    fn run(mut self, requests: Receiver<Request>) {
        info!("scoring worker started");
        for request in requests.iter() {
            if !self.handle(request) {
                break;
            }
        }
        info!("scoring worker stopped");
    }

    /// Returns `false` once the UI side has hung up.
    fn emit(&self, id: RequestId, body: ResponseBody) -> bool {
        self.out.send(Response::new(id, body)).is_ok()
    }

    fn emit_error(&self, id: RequestId, error: &anyhow::Error) -> bool {
        self.emit(
            id,
            ResponseBody::Error {
                message: format!("{error:#}"),
            },
        )
    }

    fn configure(&mut self, payload: InitPayload) {
        if let Some(api_base) = payload.api_base {
            self.settings.api_base = api_base;
        }
        if let Some(concurrency) = payload.concurrency {
            self.settings.concurrency = concurrency.max(1);
        }
        if let Some(flags) = payload.flags {
            self.flags = flags;
        }
        self.settings.network = payload.network;
        self.service = Some((self.factory)(&self.settings));
        info!(
            "worker configured for {} (concurrency {})",
            self.settings.network, self.settings.concurrency
        );
    }

    fn service(&mut self) -> Arc<dyn RiskService> {
        let factory = &self.factory;
        let settings = &self.settings;
        Arc::clone(self.service.get_or_insert_with(|| factory(settings)))
    }

    fn handle(&mut self, request: Request) -> bool {
        let Request { id, body } = request;
        debug!("worker <- {} {id}", body.name());

        match body {
            RequestBody::Init(payload) => {
                self.configure(payload);
                self.emit(id, ResponseBody::InitOk)
            }
            RequestBody::ScoreOne { item } => match self.service().score(&item) {
                Ok(payload) => self.emit(id, ResponseBody::Result(payload)),
                Err(error) => self.emit_error(id, &error),
            },
            RequestBody::ScoreBatch { items } => self.score_batch(id, items),
            RequestBody::Neighbors(query) => self.neighbors(id, &query),
        }
    }

    fn neighbors(&mut self, id: RequestId, query: &NeighborQuery) -> bool {
        let neighborhood = match self.service().neighbors(query) {
            Ok(neighborhood) => neighborhood,
            Err(error) => return self.emit_error(id, &error),
        };

        let (dataset, stats) = cap_neighborhood(neighborhood, &query.id, query.cap);
        // Stats go first so the overflow is known when the graph lands.
        if self.flags.neighbor_stats && !self.emit(id, ResponseBody::NeighborStats(stats)) {
            return false;
        }

        match serde_json::to_value(&dataset) {
            Ok(payload) => self.emit(id, ResponseBody::Result(payload)),
            Err(error) => self.emit_error(id, &error.into()),
        }
    }

    /// Items are scored independently; a failing item is logged and skipped so
    /// the rest of the batch still streams. `DONE` always terminates the batch.
    fn score_batch(&mut self, id: RequestId, items: Vec<ScoreItem>) -> bool {
        let service = self.service();
        let workers = if self.flags.stream_batch {
            self.settings.concurrency.clamp(1, items.len().max(1))
        } else {
            1
        };
        debug!("batch {id}: {} items over {workers} threads", items.len());

        let (item_tx, item_rx) = crossbeam_channel::unbounded::<ScoreItem>();
        for item in items {
            let _ = item_tx.send(item);
        }
        drop(item_tx);

        thread::scope(|scope| {
            for _ in 0..workers {
                let item_rx = item_rx.clone();
                let out = self.out.clone();
                let service = Arc::clone(&service);
                scope.spawn(move || {
                    for item in item_rx.iter() {
                        match service.score(&item) {
                            Ok(payload) => {
                                let streamed =
                                    Response::new(id, ResponseBody::ResultStream(payload));
                                if out.send(streamed).is_err() {
                                    break;
                                }
                            }
                            Err(error) => warn!("batch item {} skipped: {error:#}", item.id),
                        }
                    }
                });
            }
        });

        self.emit(id, ResponseBody::Done)
    }
}

/// Trims a neighborhood to `cap` non-focus nodes and records how many neighbors
/// were left out.
pub(crate) fn cap_neighborhood(
    neighborhood: Neighborhood,
    focus: &str,
    cap: usize,
) -> (GraphDataset, NeighborStats) {
    let Neighborhood {
        mut dataset,
        total,
        mut stats,
    } = neighborhood;

    dataset.nodes.truncate(cap.saturating_add(1));
    let kept = dataset
        .nodes
        .iter()
        .map(|node| normalize_id(&node.id))
        .collect::<HashSet<_>>();
    dataset
        .links
        .retain(|link| kept.contains(&normalize_id(&link.a)) && kept.contains(&normalize_id(&link.b)));

    let total = total.max(dataset.neighbor_count());
    stats.id = if stats.id.trim().is_empty() {
        normalize_id(focus)
    } else {
        normalize_id(&stats.id)
    };
    stats.overflow = total.saturating_sub(cap);

    (dataset, stats)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::{Result, bail};
    use serde_json::{Value, json};

    use super::*;
    use crate::vision::service::SyntheticRiskService;

    const WAIT: Duration = Duration::from_secs(5);

    /// Fails for any address containing "bad".
    struct Picky;

    impl RiskService for Picky {
        fn score(&self, item: &ScoreItem) -> Result<Value> {
            if item.id.contains("bad") {
                bail!("no data for {}", item.id);
            }
            Ok(json!({"id": item.id, "score": 10}))
        }

        fn neighbors(&self, query: &NeighborQuery) -> Result<Neighborhood> {
            bail!("neighbors unavailable for {}", query.id)
        }
    }

    fn picky() -> ServiceFactory {
        Box::new(|_: &ServiceSettings| -> Arc<dyn RiskService> { Arc::new(Picky) })
    }

    fn synthetic(total: usize) -> ServiceFactory {
        Box::new(move |_: &ServiceSettings| -> Arc<dyn RiskService> {
            Arc::new(SyntheticRiskService::with_total(total))
        })
    }

    fn request(tx: &Sender<Request>, body: RequestBody) -> RequestId {
        let id = RequestId::fresh();
        tx.send(Request { id, body }).expect("worker alive");
        id
    }

    #[test]
    fn batch_failures_are_isolated_and_done_follows() {
        let (tx, rx) = spawn(picky());
        let items = ["0x1", "0xbad", "0x2", "0x3"]
            .into_iter()
            .map(|id| ScoreItem::address(id, "eth"))
            .collect();
        let id = request(&tx, RequestBody::ScoreBatch { items });

        let mut streamed = Vec::new();
        loop {
            let response = rx.recv_timeout(WAIT).expect("worker responded");
            assert_eq!(response.id, id);
            match response.body {
                ResponseBody::ResultStream(payload) => streamed.push(payload["id"].clone()),
                ResponseBody::Done => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        streamed.sort_by_key(|value| value.to_string());
        assert_eq!(streamed, vec![json!("0x1"), json!("0x2"), json!("0x3")]);
    }

    #[test]
    fn service_errors_become_error_responses() {
        let (tx, rx) = spawn(picky());
        let id = request(
            &tx,
            RequestBody::ScoreOne {
                item: ScoreItem::address("0xbad", "eth"),
            },
        );
        let response = rx.recv_timeout(WAIT).expect("worker responded");
        assert_eq!(response.id, id);
        assert!(
            matches!(response.body, ResponseBody::Error { ref message } if message.contains("0xbad"))
        );
    }

    #[test]
    fn neighbors_report_overflow_before_the_graph() {
        let (tx, rx) = spawn(synthetic(150));
        let id = request(
            &tx,
            RequestBody::Neighbors(NeighborQuery {
                id: "0xFocus".to_owned(),
                network: "eth".to_owned(),
                hop: 1,
                limit: 120,
                cap: 120,
            }),
        );

        let first = rx.recv_timeout(WAIT).expect("stats");
        let stats = match first.body {
            ResponseBody::NeighborStats(stats) => stats,
            other => panic!("expected stats first, got {other:?}"),
        };
        assert_eq!(stats.id, "0xfocus");
        assert_eq!(stats.overflow, 30);

        let second = rx.recv_timeout(WAIT).expect("graph");
        assert_eq!(second.id, id);
        let payload = match second.body {
            ResponseBody::Result(payload) => payload,
            other => panic!("expected graph, got {other:?}"),
        };
        assert_eq!(GraphDataset::from_value(payload).neighbor_count(), 120);
    }

    #[test]
    fn init_reconfigures_and_acknowledges() {
        let (tx, rx) = spawn(synthetic(3));
        let id = request(
            &tx,
            RequestBody::Init(InitPayload {
                api_base: Some(String::new()),
                network: "base".to_owned(),
                concurrency: Some(2),
                flags: Some(WorkerFlags {
                    stream_batch: true,
                    neighbor_stats: false,
                }),
            }),
        );
        let ack = rx.recv_timeout(WAIT).expect("ack");
        assert_eq!(ack, Response::new(id, ResponseBody::InitOk));

        request(
            &tx,
            RequestBody::Neighbors(NeighborQuery {
                id: "0xa".to_owned(),
                network: "base".to_owned(),
                hop: 1,
                limit: 10,
                cap: 10,
            }),
        );
        let response = rx.recv_timeout(WAIT).expect("graph");
        assert!(matches!(response.body, ResponseBody::Result(_)));
    }

    #[test]
    fn capping_drops_links_to_truncated_nodes() {
        let neighborhood = SyntheticRiskService::with_total(10)
            .neighbors(&NeighborQuery {
                id: "0xa".to_owned(),
                network: "eth".to_owned(),
                hop: 1,
                limit: 10,
                cap: 10,
            })
            .expect("expanded");

        let (dataset, stats) = cap_neighborhood(neighborhood, "0xa", 4);
        assert_eq!(dataset.neighbor_count(), 4);
        assert_eq!(stats.overflow, 6);
        assert!(
            dataset
                .links
                .iter()
                .all(|link| dataset.contains(&link.a) && dataset.contains(&link.b))
        );
    }
}
