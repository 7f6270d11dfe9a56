//! Outbound ports (SPI) consumed by the processor.

use std::sync::Arc;

use shared_types::{Message, MessageId, Milestone, MilestoneIndex, PeerId};

use crate::metrics::PeerMetrics;
use crate::wire::WireMessage;

/// A connected peer as seen by the processor.
///
/// Peers travel through the worker queue and the events as `Arc<dyn Peer>`.
pub trait Peer: Send + Sync {
    /// Network identity of the peer.
    fn id(&self) -> PeerId;

    /// Appends a frame to the peer's FIFO outbound queue.
    fn enqueue_for_sending(&self, message: WireMessage);

    /// Per-peer gossip counters.
    fn metrics(&self) -> &PeerMetrics;
}

/// Peer registry hook used for punishment.
pub trait PeerManager: Send + Sync {
    /// Forcibly disconnects the peer.
    fn remove(&self, peer_id: &PeerId);
}

/// An outstanding, locally initiated ask for a specific message.
///
/// Opaque to the processor: it is obtained from the [`RequestQueue`] and
/// forwarded unchanged in the message-processed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Identifier the request asked for.
    pub message_id: MessageId,
    /// Milestone the requested message belongs to.
    pub milestone_index: MilestoneIndex,
}

/// Queue of outstanding message requests.
pub trait RequestQueue: Send + Sync {
    /// Atomically marks the request for `message_id` as satisfied.
    ///
    /// Returns the request handle iff this arrival fulfilled a pending
    /// request; at most one caller receives it.
    fn received(&self, message_id: &MessageId) -> Option<Request>;
}

/// Persistent DAG storage consulted by the processor.
///
/// Reads may block on disk I/O; the processor never holds a lock across a
/// tangle call.
pub trait Tangle: Send + Sync {
    /// The message stored under `message_id`, if any.
    fn get_message(&self, message_id: &MessageId) -> Option<Arc<Message>>;

    /// Whether `message_id` is already stored.
    fn contains_message(&self, message_id: &MessageId) -> bool;

    /// Index of the latest known milestone.
    fn latest_milestone_index(&self) -> MilestoneIndex;

    /// The milestone at `index` with its constituent messages, if known.
    fn get_milestone(&self, index: MilestoneIndex) -> Option<Milestone>;
}
