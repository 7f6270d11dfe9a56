//! # Core Domain Entities
//!
//! Defines the core entities of the tangle node as seen by every subsystem.
//!
//! ## Clusters
//!
//! - **Networking**: [`NodeId`], [`PeerId`]
//! - **Messages**: [`MessageId`], [`Message`], [`SerializationMode`]
//! - **Milestones**: [`MilestoneIndex`], [`Milestone`]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;

use crate::errors::MessageError;

// =============================================================================
// CLUSTER A: NETWORKING
// =============================================================================

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Creates a new node ID from a 32-byte array.
    pub fn new(id: [u8; 32]) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A peer identifier (alias for [`NodeId`] in peer contexts).
pub type PeerId = NodeId;

// =============================================================================
// CLUSTER B: MESSAGES
// =============================================================================

/// Width of a message identifier on the wire, in bytes.
pub const MESSAGE_ID_LENGTH: usize = 49;

/// Protocol version accepted for gossiped message frames.
pub const MESSAGE_VERSION: u8 = 1;

/// Maximum payload carried by a single message frame.
pub const MESSAGE_MAX_PAYLOAD_LENGTH: usize = 64 * 1024;

/// Byte length of the fixed frame header:
/// version (1) + trunk (49) + branch (49) + timestamp (8) + payload length (4).
pub const MESSAGE_MIN_LENGTH: usize = 1 + 2 * MESSAGE_ID_LENGTH + 8 + 4;

const TRUNK_OFFSET: usize = 1;
const BRANCH_OFFSET: usize = TRUNK_OFFSET + MESSAGE_ID_LENGTH;
const TIMESTAMP_OFFSET: usize = BRANCH_OFFSET + MESSAGE_ID_LENGTH;
const PAYLOAD_LENGTH_OFFSET: usize = TIMESTAMP_OFFSET + 8;

/// Identifier of a message, derived from the raw frame bytes.
///
/// The width matches the identifier carried in transaction requests, so ids
/// move between the request path and the payload path without re-encoding.
/// Derivation is a SHAKE-256 digest of the full frame with the XOF output
/// sized to [`MESSAGE_ID_LENGTH`].
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(#[serde_as(as = "Bytes")] pub [u8; MESSAGE_ID_LENGTH]);

impl MessageId {
    /// Creates a message ID from a byte slice.
    ///
    /// Returns `None` unless the slice is exactly [`MESSAGE_ID_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == MESSAGE_ID_LENGTH {
            let mut id = [0u8; MESSAGE_ID_LENGTH];
            id.copy_from_slice(bytes);
            Some(Self(id))
        } else {
            None
        }
    }

    /// The raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

/// Controls whether structural invariants are re-checked when a message is
/// packed back into frame bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerializationMode {
    /// Re-validate the frame before emitting it.
    Validated,
    /// Emit the frame as-is.
    Unvalidated,
}

/// A parsed and validated gossip message.
///
/// The only constructors are [`Message::from_bytes`] (network input) and
/// [`Message::new`] (local origination); both leave the raw frame and the
/// derived id consistent by construction.
#[derive(Clone)]
pub struct Message {
    id: MessageId,
    trunk: MessageId,
    branch: MessageId,
    timestamp: u64,
    raw: Vec<u8>,
}

impl Message {
    /// Parses a message frame received from the network.
    ///
    /// Validates the version, framing and payload cap, and derives the
    /// message id. The issue timestamp is carried but not range-checked
    /// here; see [`MessageError::TimestampOutOfRange`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let (trunk, branch, timestamp) = validate_frame(bytes)?;
        Ok(Self {
            id: derive_id(bytes),
            trunk,
            branch,
            timestamp,
            raw: bytes.to_vec(),
        })
    }

    /// Builds a locally originated message and packs its frame.
    pub fn new(
        trunk: MessageId,
        branch: MessageId,
        timestamp: u64,
        payload: &[u8],
    ) -> Result<Self, MessageError> {
        if payload.len() > MESSAGE_MAX_PAYLOAD_LENGTH {
            return Err(MessageError::PayloadTooLarge {
                len: payload.len(),
                max: MESSAGE_MAX_PAYLOAD_LENGTH,
            });
        }
        let mut raw = Vec::with_capacity(MESSAGE_MIN_LENGTH + payload.len());
        raw.push(MESSAGE_VERSION);
        raw.extend_from_slice(&trunk.0);
        raw.extend_from_slice(&branch.0);
        raw.extend_from_slice(&timestamp.to_le_bytes());
        raw.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        raw.extend_from_slice(payload);
        Ok(Self {
            id: derive_id(&raw),
            trunk,
            branch,
            timestamp,
            raw,
        })
    }

    /// Serializes the message back into frame bytes.
    ///
    /// [`SerializationMode::Validated`] re-checks the structural invariants
    /// and surfaces the first violation instead of emitting bytes.
    pub fn pack(&self, mode: SerializationMode) -> Result<Vec<u8>, MessageError> {
        if mode == SerializationMode::Validated {
            validate_frame(&self.raw)?;
        }
        Ok(self.raw.clone())
    }

    /// The derived message identifier.
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Identifier of the trunk parent.
    pub fn trunk(&self) -> &MessageId {
        &self.trunk
    }

    /// Identifier of the branch parent.
    pub fn branch(&self) -> &MessageId {
        &self.branch
    }

    /// Issue timestamp as carried on the wire (seconds since epoch).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The application payload.
    pub fn payload(&self) -> &[u8] {
        &self.raw[MESSAGE_MIN_LENGTH..]
    }

    /// The full raw frame, exactly as gossiped.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("trunk", &self.trunk)
            .field("branch", &self.branch)
            .field("timestamp", &self.timestamp)
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

/// Checks the structural invariants of a frame and extracts the header fields.
fn validate_frame(bytes: &[u8]) -> Result<(MessageId, MessageId, u64), MessageError> {
    if bytes.len() < MESSAGE_MIN_LENGTH {
        return Err(MessageError::Truncated {
            len: bytes.len(),
            min: MESSAGE_MIN_LENGTH,
        });
    }
    if bytes[0] != MESSAGE_VERSION {
        return Err(MessageError::UnsupportedVersion {
            received: bytes[0],
            supported: MESSAGE_VERSION,
        });
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[PAYLOAD_LENGTH_OFFSET..PAYLOAD_LENGTH_OFFSET + 4]);
    let payload_len = u32::from_le_bytes(len_bytes) as usize;
    if payload_len > MESSAGE_MAX_PAYLOAD_LENGTH {
        return Err(MessageError::PayloadTooLarge {
            len: payload_len,
            max: MESSAGE_MAX_PAYLOAD_LENGTH,
        });
    }
    let expected = MESSAGE_MIN_LENGTH + payload_len;
    if bytes.len() != expected {
        return Err(MessageError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let mut timestamp_bytes = [0u8; 8];
    timestamp_bytes.copy_from_slice(&bytes[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]);

    let mut trunk = [0u8; MESSAGE_ID_LENGTH];
    trunk.copy_from_slice(&bytes[TRUNK_OFFSET..BRANCH_OFFSET]);
    let mut branch = [0u8; MESSAGE_ID_LENGTH];
    branch.copy_from_slice(&bytes[BRANCH_OFFSET..TIMESTAMP_OFFSET]);

    Ok((
        MessageId(trunk),
        MessageId(branch),
        u64::from_le_bytes(timestamp_bytes),
    ))
}

/// Derives the wire-width message id from the raw frame.
fn derive_id(raw: &[u8]) -> MessageId {
    let mut hasher = Shake256::default();
    hasher.update(raw);
    let mut reader = hasher.finalize_xof();
    let mut id = [0u8; MESSAGE_ID_LENGTH];
    reader.read(&mut id);
    MessageId(id)
}

// =============================================================================
// CLUSTER C: MILESTONES
// =============================================================================

/// Index of a milestone checkpoint in the tangle.
pub type MilestoneIndex = u32;

/// A milestone checkpoint together with its constituent messages.
#[derive(Clone, Debug)]
pub struct Milestone {
    /// The milestone's index.
    pub index: MilestoneIndex,
    /// Messages making up the milestone, in milestone order.
    pub messages: Vec<Arc<Message>>,
}
