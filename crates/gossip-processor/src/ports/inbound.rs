//! Inbound port (API) of the processor.

use std::sync::Arc;

use shared_types::{Message, SerializationMode};

use crate::domain::errors::ProcessError;
use crate::ports::outbound::Peer;
use crate::wire::MessageKind;

/// Driving interface of the inbound gossip processor.
pub trait ProcessorApi: Send + Sync {
    /// Submits a peer frame for asynchronous processing.
    ///
    /// Non-blocking except when the worker queue is saturated, in which case
    /// the caller blocks until a slot frees (back-pressure towards the peer
    /// I/O layer).
    fn process(&self, peer: Arc<dyn Peer>, kind: MessageKind, data: Vec<u8>);

    /// Serializes a locally constructed message, then fires the
    /// message-processed and broadcast events for it.
    ///
    /// On serialization failure no event fires.
    fn serialize_and_emit(
        &self,
        message: Arc<Message>,
        mode: SerializationMode,
    ) -> Result<(), ProcessError>;

    /// Number of work units currently cached.
    fn work_units_size(&self) -> usize;
}
