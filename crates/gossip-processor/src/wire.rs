//! Gossip wire frames exchanged with peers.
//!
//! Every frame is `[kind: u8][payload length: u32 LE][payload]`. The payload
//! of a transaction-payload frame is a full message frame as defined by
//! [`shared_types::Message`]; a transaction request carries a bare message
//! id; a milestone request carries a little-endian milestone index.

use shared_types::MilestoneIndex;

use crate::domain::errors::ProcessError;

/// Kind discriminator of a gossip frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// A gossiped transaction payload.
    TransactionPayload = 1,
    /// A request for a message by id.
    TransactionRequest = 2,
    /// A request for a milestone by index.
    MilestoneRequest = 3,
}

impl MessageKind {
    /// Decodes the wire discriminator.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::TransactionPayload),
            2 => Some(Self::TransactionRequest),
            3 => Some(Self::MilestoneRequest),
            _ => None,
        }
    }

    /// The wire discriminator.
    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

/// Sentinel index meaning "send the latest milestone you know".
pub const LATEST_MILESTONE_REQUEST_INDEX: MilestoneIndex = 0;

/// Byte width of a milestone request payload.
pub const MILESTONE_REQUEST_PAYLOAD_LENGTH: usize = 4;

/// A framed gossip message ready for a peer's outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireMessage {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Encodes the frame for the socket.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 + self.payload.len());
        out.push(self.kind.as_wire());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Builds a transaction-payload frame from raw message bytes.
pub fn new_transaction_message(raw: &[u8]) -> WireMessage {
    WireMessage {
        kind: MessageKind::TransactionPayload,
        payload: raw.to_vec(),
    }
}

/// Extracts the requested milestone index from a milestone request payload.
pub fn extract_requested_milestone_index(data: &[u8]) -> Result<MilestoneIndex, ProcessError> {
    if data.len() != MILESTONE_REQUEST_PAYLOAD_LENGTH {
        return Err(ProcessError::BadRequestFormat {
            expected: MILESTONE_REQUEST_PAYLOAD_LENGTH,
            actual: data.len(),
        });
    }
    let mut bytes = [0u8; MILESTONE_REQUEST_PAYLOAD_LENGTH];
    bytes.copy_from_slice(data);
    Ok(MilestoneIndex::from_le_bytes(bytes))
}
