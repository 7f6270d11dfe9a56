//! # Shared Types Crate
//!
//! Domain entities shared across the node's subsystems: network and message
//! identifiers, the parsed gossip [`Message`] with its binary frame layout,
//! milestone data, and the message validation error taxonomy.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Wire-Derived Identity**: A [`MessageId`] is a function of the raw
//!   frame bytes, never assigned out of band.
//! - **Validation at the Boundary**: [`Message::from_bytes`] is the only way
//!   to obtain a parsed message from network input, and it validates.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod entities;
pub mod errors;

pub use entities::{
    Message, MessageId, Milestone, MilestoneIndex, NodeId, PeerId, SerializationMode,
    MESSAGE_ID_LENGTH, MESSAGE_MAX_PAYLOAD_LENGTH, MESSAGE_MIN_LENGTH, MESSAGE_VERSION,
};
pub use errors::MessageError;
