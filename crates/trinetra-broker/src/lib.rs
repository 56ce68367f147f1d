//! The pipeline backbone: both shared infrastructure contracts served
//! over HTTP from one daemon, plus the remote clients the services use.
//!
//! # Why a daemon
//!
//! The frame bus distributes entries across a consumer group and the event
//! log owns an exclusive-lock RocksDB directory; both need exactly one
//! owner that every service process can reach. The broker binary is that
//! owner: it hosts the in-process engines behind a small JSON API, and
//! [`RemoteFrameBus`] / [`RemoteEventLog`] implement the core contracts on
//! top of it. N ingestors, workers, and resolvers on different hosts all
//! dial the same endpoint, which is what makes consumer-group scaling
//! across OS processes real.
//!
//! Frame payloads and log records travel base64-encoded inside JSON;
//! entry ids and offsets are carried verbatim so acknowledgement and
//! commit semantics are identical to the in-process engines.

pub mod api;
pub mod client;
pub mod server;

#[cfg(test)]
mod tests;

pub use client::{RemoteEventLog, RemoteFrameBus};
pub use server::{router, BrokerState};
