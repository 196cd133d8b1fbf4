//! Request/response correlation over the worker queues.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;

use super::protocol::{Request, RequestBody, RequestId, Response, ResponseBody};
use super::record::{GraphDataset, NeighborStats, ScoreRecord};
use super::service::ServiceFactory;
use super::worker;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("{0}")]
    Remote(String),
    #[error("scoring worker disconnected")]
    Disconnected,
}

/// Settled value of a request.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// `INIT_OK` and `DONE`.
    Ack,
    Score(Box<ScoreRecord>),
    Graph(GraphDataset),
}

type Settlement = Result<Reply, ChannelError>;

/// One-shot handle for an outstanding request, polled from the frame loop.
#[derive(Debug)]
pub struct PendingReply {
    id: RequestId,
    rx: Receiver<Settlement>,
}

impl PendingReply {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// `None` while the request is still in flight.
    pub fn try_take(&self) -> Option<Settlement> {
        match self.rx.try_recv() {
            Ok(settlement) => Some(settlement),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ChannelError::Disconnected)),
        }
    }
}

/// What a response means once it has been matched against the pending map.
/// Only deliveries that need routing beyond settling a reply are returned.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// One-shot score result; the matching reply has already been settled.
    Score(ScoreRecord),
    /// Incremental score update from a batch.
    Streamed(ScoreRecord),
    NeighborStats(NeighborStats),
    BatchDone,
    Failed(String),
}

/// Responder for an outstanding request, with the network it was issued on.
struct Pending {
    responder: Sender<Settlement>,
    network: Option<String>,
}

pub struct Channel {
    outbound: Sender<Request>,
    inbound: Receiver<Response>,
    pending: HashMap<RequestId, Pending>,
}

impl Channel {
    pub fn new(outbound: Sender<Request>, inbound: Receiver<Response>) -> Self {
        Self {
            outbound,
            inbound,
            pending: HashMap::new(),
        }
    }

    /// Spawns the scoring worker and connects to it.
    pub fn connect(factory: ServiceFactory) -> Self {
        let (outbound, inbound) = worker::spawn(factory);
        Self::new(outbound, inbound)
    }

    pub fn send(&mut self, body: RequestBody) -> PendingReply {
        let id = RequestId::fresh();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let name = body.name();
        let network = body.network().map(str::to_owned);

        if self.outbound.send(Request { id, body }).is_err() {
            warn!("{name} {id} not delivered: worker is gone");
            let _ = tx.send(Err(ChannelError::Disconnected));
        } else {
            debug!("-> {name} {id}");
            self.pending.insert(
                id,
                Pending {
                    responder: tx,
                    network,
                },
            );
        }

        PendingReply { id, rx }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn try_next(&self) -> Option<Response> {
        self.inbound.try_recv().ok()
    }

    /// Removes the pending entry for `id` and settles it. Returns `false` when
    /// nothing was waiting, which is normal for streamed responses.
    fn settle(&mut self, id: RequestId, settlement: Settlement) -> bool {
        let Some(pending) = self.pending.remove(&id) else {
            return false;
        };
        if pending.responder.send(settlement).is_err() {
            debug!("reply {id} was dropped by its caller");
        }
        true
    }

    /// Score payloads that do not name a network take the one their request
    /// was issued on, so a network switch mid-flight cannot re-home them.
    fn tag_network(&self, id: RequestId, mut payload: Value) -> Value {
        let network = self
            .pending
            .get(&id)
            .and_then(|pending| pending.network.as_deref());
        if let (Some(network), Value::Object(fields)) = (network, &mut payload)
            && !fields
                .get("network")
                .and_then(Value::as_str)
                .is_some_and(|named| !named.is_empty())
        {
            fields.insert("network".to_owned(), Value::String(network.to_owned()));
        }
        payload
    }

    /// Matches one worker response against the pending map. Score payloads are
    /// run through `normalize` so that the settled reply and the returned
    /// delivery carry the same canonical record.
    pub fn dispatch<F>(&mut self, response: Response, mut normalize: F) -> Option<Delivery>
    where
        F: FnMut(&Value) -> ScoreRecord,
    {
        let Response { id, body } = response;
        match body {
            ResponseBody::InitOk => {
                self.settle(id, Ok(Reply::Ack));
                None
            }
            ResponseBody::Done => {
                self.settle(id, Ok(Reply::Ack));
                Some(Delivery::BatchDone)
            }
            ResponseBody::Result(payload) if GraphDataset::looks_like_graph(&payload) => {
                let dataset = GraphDataset::from_value(payload);
                debug!("<- RESULT {id} graph with {} nodes", dataset.nodes.len());
                self.settle(id, Ok(Reply::Graph(dataset)));
                None
            }
            ResponseBody::Result(payload) => {
                let record = normalize(&self.tag_network(id, payload));
                self.settle(id, Ok(Reply::Score(Box::new(record.clone()))));
                Some(Delivery::Score(record))
            }
            ResponseBody::ResultStream(payload) => {
                Some(Delivery::Streamed(normalize(&self.tag_network(id, payload))))
            }
            ResponseBody::NeighborStats(stats) => Some(Delivery::NeighborStats(stats)),
            ResponseBody::Error { message } => {
                warn!("<- ERROR {id}: {message}");
                self.settle(id, Err(ChannelError::Remote(message.clone())));
                Some(Delivery::Failed(message))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::vision::protocol::{NeighborQuery, ScoreItem};
    use crate::vision::record::normalize_id;

    /// Channel wired to in-memory queues; the test plays the worker.
    pub(crate) struct Harness {
        pub channel: Channel,
        pub requests: Receiver<Request>,
        pub responses: Sender<Response>,
    }

    pub(crate) fn harness() -> Harness {
        let (outbound, requests) = crossbeam_channel::unbounded();
        let (responses, inbound) = crossbeam_channel::unbounded();
        Harness {
            channel: Channel::new(outbound, inbound),
            requests,
            responses,
        }
    }

    fn plain_record(raw: &Value) -> ScoreRecord {
        ScoreRecord {
            id: normalize_id(raw["id"].as_str().unwrap_or_default()),
            network: "eth".to_owned(),
            score: raw["score"].as_f64().unwrap_or(0.0),
            blocked: false,
            explain: Default::default(),
            breakdown: Vec::new(),
            feats: Default::default(),
            flags: Default::default(),
            label: None,
            raw: raw.clone(),
        }
    }

    fn drain(harness: &mut Harness) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Some(response) = harness.channel.try_next() {
            deliveries.extend(harness.channel.dispatch(response, plain_record));
        }
        deliveries
    }

    fn score_one(channel: &mut Channel, id: &str) -> PendingReply {
        channel.send(RequestBody::ScoreOne {
            item: ScoreItem::address(id, "eth"),
        })
    }

    #[test]
    fn out_of_order_responses_settle_their_own_requests() {
        let mut h = harness();
        let replies = ["0xa", "0xb", "0xc"].map(|id| score_one(&mut h.channel, id));
        let sent = h.requests.try_iter().collect::<Vec<_>>();
        assert_eq!(sent.len(), 3);
        assert_eq!(h.channel.pending_len(), 3);

        for (request, score) in sent.iter().rev().zip([30.0, 20.0, 10.0]) {
            let RequestBody::ScoreOne { item } = &request.body else {
                panic!("unexpected request {request:?}");
            };
            h.responses
                .send(Response::new(
                    request.id,
                    ResponseBody::Result(json!({"id": item.id, "score": score})),
                ))
                .expect("queue open");
        }
        drain(&mut h);

        for (reply, (expected_id, expected_score)) in
            replies.iter().zip([("0xa", 10.0), ("0xb", 20.0), ("0xc", 30.0)])
        {
            match reply.try_take() {
                Some(Ok(Reply::Score(record))) => {
                    assert_eq!(record.id, expected_id);
                    assert_eq!(record.score, expected_score);
                }
                other => panic!("unexpected settlement {other:?}"),
            }
        }
        assert_eq!(h.channel.pending_len(), 0);
    }

    #[test]
    fn graph_results_settle_with_the_dataset() {
        let mut h = harness();
        let reply = h.channel.send(RequestBody::Neighbors(NeighborQuery {
            id: "0xa".to_owned(),
            network: "eth".to_owned(),
            hop: 1,
            limit: 120,
            cap: 120,
        }));
        h.responses
            .send(Response::new(
                reply.id(),
                ResponseBody::Result(json!({
                    "nodes": [{"id": "0xa"}, {"id": "0xb"}],
                    "links": [{"a": "0xa", "b": "0xb", "weight": 3}]
                })),
            ))
            .expect("queue open");

        assert!(drain(&mut h).is_empty());
        match reply.try_take() {
            Some(Ok(Reply::Graph(dataset))) => assert_eq!(dataset.nodes.len(), 2),
            other => panic!("unexpected settlement {other:?}"),
        }
    }

    #[test]
    fn errors_reject_without_touching_other_requests() {
        let mut h = harness();
        let failing = score_one(&mut h.channel, "0xa");
        let waiting = score_one(&mut h.channel, "0xb");
        h.responses
            .send(Response::new(
                failing.id(),
                ResponseBody::Error {
                    message: "upstream 502".to_owned(),
                },
            ))
            .expect("queue open");

        let deliveries = drain(&mut h);
        assert_eq!(deliveries, vec![Delivery::Failed("upstream 502".to_owned())]);
        assert_eq!(
            failing.try_take(),
            Some(Err(ChannelError::Remote("upstream 502".to_owned())))
        );
        assert!(waiting.try_take().is_none());
        assert_eq!(h.channel.pending_len(), 1);
    }

    #[test]
    fn streamed_results_do_not_settle_the_batch() {
        let mut h = harness();
        let batch = h.channel.send(RequestBody::ScoreBatch {
            items: vec![ScoreItem::address("0xa", "eth")],
        });
        h.responses
            .send(Response::new(
                batch.id(),
                ResponseBody::ResultStream(json!({"id": "0xA", "score": 5})),
            ))
            .expect("queue open");

        let deliveries = drain(&mut h);
        assert!(matches!(&deliveries[..], [Delivery::Streamed(record)] if record.id == "0xa"));
        assert!(batch.try_take().is_none());

        h.responses
            .send(Response::new(batch.id(), ResponseBody::Done))
            .expect("queue open");
        assert_eq!(drain(&mut h), vec![Delivery::BatchDone]);
        assert_eq!(batch.try_take(), Some(Ok(Reply::Ack)));
    }

    #[test]
    fn a_settled_id_is_never_settled_twice() {
        let mut h = harness();
        let reply = score_one(&mut h.channel, "0xa");
        for score in [1, 2] {
            h.responses
                .send(Response::new(
                    reply.id(),
                    ResponseBody::Result(json!({"id": "0xa", "score": score})),
                ))
                .expect("queue open");
        }
        let deliveries = drain(&mut h);

        // Both still reach the cache path, only the first settles.
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(reply.try_take(), Some(Ok(Reply::Score(record))) if record.score == 1.0));
        assert!(reply.try_take().is_some_and(|s| s == Err(ChannelError::Disconnected)));
    }

    #[test]
    fn scores_keep_the_network_they_were_requested_on() {
        let mut h = harness();
        let cache = crate::vision::cache::ResultCache::new("base");
        let reply = score_one(&mut h.channel, "0xa");
        let batch = h.channel.send(RequestBody::ScoreBatch {
            items: vec![ScoreItem::address("0xb", "eth")],
        });
        for (id, payload) in [
            (reply.id(), ResponseBody::Result(json!({"id": "0xa", "score": 3}))),
            (
                batch.id(),
                ResponseBody::ResultStream(json!({"id": "0xb", "network": "polygon"})),
            ),
            (batch.id(), ResponseBody::ResultStream(json!({"id": "0xc"}))),
        ] {
            h.responses
                .send(Response::new(id, payload))
                .expect("queue open");
        }

        let mut networks = Vec::new();
        while let Some(response) = h.channel.try_next() {
            let delivery = h
                .channel
                .dispatch(response, |raw| crate::vision::normalize::normalize(raw, &cache));
            if let Some(Delivery::Score(record) | Delivery::Streamed(record)) = delivery {
                networks.push((record.id, record.network));
            }
        }

        assert_eq!(
            networks,
            vec![
                ("0xa".to_owned(), "eth".to_owned()),
                ("0xb".to_owned(), "polygon".to_owned()),
                ("0xc".to_owned(), "eth".to_owned()),
            ]
        );
    }

    #[test]
    fn send_after_worker_exit_rejects_immediately() {
        let mut h = harness();
        drop(h.requests);

        let reply = score_one(&mut h.channel, "0xa");
        assert_eq!(reply.try_take(), Some(Err(ChannelError::Disconnected)));
        assert_eq!(h.channel.pending_len(), 0);
    }
}
