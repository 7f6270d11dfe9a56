//! # Inbound Gossip Processor
//!
//! Sits directly behind the peer I/O layer and turns raw gossip frames into
//! node state: it parses transaction payloads, deduplicates concurrent
//! arrivals of the same payload across all peers, correlates arrivals with
//! outstanding local requests, answers transaction and milestone requests,
//! and decides whether a payload is worth rebroadcasting.
//!
//! ## Architecture Role
//!
//! ```text
//! [Peer I/O] ──process(peer, kind, bytes)──→ [WorkerPool queue]
//!                                                  │
//!                                      worker threads (fixed count)
//!                                                  │
//!             ┌────────────────────────────────────┼──────────────────┐
//!             ↓                                    ↓                  ↓
//!     transaction payload                transaction request   milestone request
//!     (WorkUnit state machine)           (tangle lookup)       (tangle lookup)
//!             │                                    │                  │
//!             ↓                                    └──── reply on the peer
//!     MessageProcessed / BroadcastMessage
//! ```
//!
//! ## Deduplication
//!
//! Each distinct payload byte-string maps to exactly one live [`WorkUnit`]
//! in the [`WorkUnitCache`]; the unit's state machine guarantees the
//! expensive parse-and-hash step runs at most once per payload no matter how
//! many peers deliver it concurrently.
//!
//! [`WorkUnit`]: domain::WorkUnit
//! [`WorkUnitCache`]: domain::WorkUnitCache

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod wire;
pub mod worker_pool;

pub use domain::{
    Broadcast, CacheConfig, CachedWorkUnit, LeakDetectionConfig, ProcessError, ProcessorConfig,
    WorkUnit, WorkUnitCache, WorkUnitState,
};
pub use events::{MessageProcessed, ProcessorEvents, Signal, SubscriptionId};
pub use metrics::{Counter, PeerMetrics, ServerMetrics};
pub use ports::inbound::ProcessorApi;
pub use ports::outbound::{Peer, PeerManager, Request, RequestQueue, Tangle};
pub use service::Processor;
pub use wire::{MessageKind, WireMessage};
pub use worker_pool::WorkerPool;
