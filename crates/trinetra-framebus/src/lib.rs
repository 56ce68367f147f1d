//! In-process engine for the frame bus contract.
//!
//! Per-camera bounded FIFO streams with consumer groups, pending lists,
//! idle reclaim, and tail-drop from the head past capacity. Semantics
//! follow the capped-stream shape the contract is written against
//! (capped-length append, group read, per-entry ack, idle autoclaim).
//!
//! The engine holds no durable state: a restart of the bus process is a
//! full camera outage by design, absorbed downstream by tracker-state
//! checkpoints and consumer-group replay.

mod engine;


pub use engine::MemoryFrameBus;
