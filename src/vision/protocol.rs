//! Messages exchanged with the background scoring worker.
//!
//! Every message is an owned value moved across a queue; the worker and the UI
//! never share memory. On the wire a message reads `{id, type, payload}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::record::NeighborStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestBody {
    Init(InitPayload),
    ScoreOne { item: ScoreItem },
    ScoreBatch { items: Vec<ScoreItem> },
    Neighbors(NeighborQuery),
}

impl RequestBody {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "INIT",
            Self::ScoreOne { .. } => "SCORE_ONE",
            Self::ScoreBatch { .. } => "SCORE_BATCH",
            Self::Neighbors(_) => "NEIGHBORS",
        }
    }

    /// Network the request was issued against. A batch is always scored on a
    /// single network, so its first item speaks for it.
    pub fn network(&self) -> Option<&str> {
        match self {
            Self::Init(init) => Some(&init.network),
            Self::ScoreOne { item } => Some(&item.network),
            Self::ScoreBatch { items } => items.first().map(|item| item.network.as_str()),
            Self::Neighbors(query) => Some(&query.network),
        }
    }
}

/// `INIT` payload. Fields left `None` keep the worker's previous setting, so a
/// network switch only needs to carry the network.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<WorkerFlags>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerFlags {
    /// Fan batch items out over `concurrency` threads instead of scoring them
    /// one after another.
    pub stream_batch: bool,
    /// Emit `NEIGHBOR_STATS` alongside neighbor results.
    pub neighbor_stats: bool,
}

impl Default for WorkerFlags {
    fn default() -> Self {
        Self {
            stream_batch: true,
            neighbor_stats: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Address,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreItem {
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    pub id: String,
    pub network: String,
}

impl ScoreItem {
    pub fn address(id: impl Into<String>, network: &str) -> Self {
        Self {
            kind: ItemKind::Address,
            id: id.into(),
            network: network.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborQuery {
    pub id: String,
    pub network: String,
    pub hop: u8,
    pub limit: usize,
    pub cap: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    pub fn new(id: RequestId, body: ResponseBody) -> Self {
        Self { id, body }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseBody {
    InitOk,
    /// Either a score payload or a `{nodes, links}` graph payload.
    Result(Value),
    ResultStream(Value),
    NeighborStats(NeighborStats),
    Done,
    Error { message: String },
}
