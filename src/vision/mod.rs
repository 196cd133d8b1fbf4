//! Scoring side of the explorer: wire protocol, the background worker and
//! everything between a raw score payload and a render decision.

pub mod cache;
pub mod channel;
pub mod expander;
pub mod navigator;
pub mod normalize;
pub mod protocol;
pub mod record;
pub mod scheduler;
pub mod service;
pub mod worker;
