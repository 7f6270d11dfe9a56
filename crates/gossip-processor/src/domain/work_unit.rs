//! Per-payload processing record and its lifecycle state machine.
//!
//! A [`WorkUnit`] exists once per distinct payload byte-string while the
//! cache holds it live. The state machine below is what makes concurrent
//! duplicate deliveries cheap: exactly one worker wins the transition into
//! `Hashing` and performs the parse; everyone else observes the state and
//! leaves.
//!
//! ```text
//! Unhashed ──→ Hashing ──→ Hashed     (terminal)
//!                  └─────→ Invalid    (terminal)
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use shared_types::{Message, MessageId, PeerId};

use crate::metrics::ServerMetrics;
use crate::ports::outbound::{Peer, PeerManager, Request};

/// Lifecycle state of a [`WorkUnit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkUnitState {
    /// Payload received, not yet parsed.
    Unhashed = 0,
    /// Exactly one worker is parsing and validating the payload.
    Hashing = 1,
    /// Parsed, validated and id derived. Terminal.
    Hashed = 2,
    /// Parse failed or payload blocklisted. Terminal.
    Invalid = 3,
}

impl WorkUnitState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unhashed,
            1 => Self::Hashing,
            2 => Self::Hashed,
            _ => Self::Invalid,
        }
    }
}

/// A peer that delivered this payload, with the request that delivery
/// satisfied, if any.
struct Origin {
    peer: Arc<dyn Peer>,
    request: Option<Request>,
}

/// Fields guarded by the data lock.
#[derive(Default)]
struct WorkUnitData {
    message: Option<Arc<Message>>,
    message_id: Option<MessageId>,
    received_from: Vec<Origin>,
}

/// Per-payload processing record; the unit of deduplication.
///
/// Lock order is processing lock before data lock, never reversed. Neither
/// lock is held across peer I/O or event firings.
pub struct WorkUnit {
    received_bytes: Arc<[u8]>,
    state: AtomicU8,
    processing_lock: Mutex<()>,
    data: Mutex<WorkUnitData>,
}

impl WorkUnit {
    /// Creates a fresh unit in the `Unhashed` state.
    pub fn new(received_bytes: Arc<[u8]>) -> Self {
        Self {
            received_bytes,
            state: AtomicU8::new(WorkUnitState::Unhashed as u8),
            processing_lock: Mutex::new(()),
            data: Mutex::new(WorkUnitData::default()),
        }
    }

    /// The raw payload bytes as delivered by peers.
    pub fn received_bytes(&self) -> &[u8] {
        &self.received_bytes
    }

    /// Acquires the processing lock serializing state-machine prologues.
    pub fn lock_processing(&self) -> MutexGuard<'_, ()> {
        self.processing_lock.lock()
    }

    /// The current state.
    pub fn state(&self) -> WorkUnitState {
        WorkUnitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the unit is currently in `state`.
    pub fn is(&self, state: WorkUnitState) -> bool {
        self.state() == state
    }

    /// Transitions the state machine.
    ///
    /// Callers either hold the processing lock or own the `Hashing` state;
    /// terminal states are never left again.
    pub fn update_state(&self, state: WorkUnitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Records that `peer` delivered this payload.
    ///
    /// Idempotent per peer; the first `Some` request for a peer is retained.
    pub fn add_received_from(&self, peer: Arc<dyn Peer>, request: Option<Request>) {
        let mut data = self.data.lock();
        match data
            .received_from
            .iter_mut()
            .find(|origin| origin.peer.id() == peer.id())
        {
            Some(origin) => {
                if origin.request.is_none() {
                    origin.request = request;
                }
            }
            None => data.received_from.push(Origin { peer, request }),
        }
    }

    /// Stores the parsed message and its id.
    ///
    /// Called exactly once, by the worker owning the `Hashing` state, before
    /// the transition to `Hashed`.
    pub fn set_message(&self, message: Arc<Message>) {
        let mut data = self.data.lock();
        data.message_id = Some(*message.id());
        data.message = Some(message);
    }

    /// The parsed message, once the unit reached `Hashed`.
    pub fn message(&self) -> Option<Arc<Message>> {
        self.data.lock().message.clone()
    }

    /// The derived message id, once the unit reached `Hashed`.
    pub fn message_id(&self) -> Option<MessageId> {
        self.data.lock().message_id
    }

    /// Number of distinct peers that delivered this payload.
    pub fn origin_count(&self) -> usize {
        self.data.lock().received_from.len()
    }

    /// Punishes every peer that delivered this payload.
    ///
    /// Called only after the transition to `Invalid`. Best-effort: counts
    /// each sender as an invalid-transaction source and disconnects it.
    pub fn punish(&self, peer_manager: &dyn PeerManager, metrics: &ServerMetrics) {
        let peers: Vec<Arc<dyn Peer>> = {
            let data = self.data.lock();
            data.received_from
                .iter()
                .map(|origin| Arc::clone(&origin.peer))
                .collect()
        };
        for peer in peers {
            metrics.invalid_transactions.inc();
            peer_manager.remove(&peer.id());
        }
    }

    /// Increments the known-transactions counter of every delivering peer
    /// except `except`.
    ///
    /// Called exactly once, on the first successful `Hashed` transition.
    pub fn increase_known_count(&self, except: &PeerId) {
        let peers: Vec<Arc<dyn Peer>> = {
            let data = self.data.lock();
            data.received_from
                .iter()
                .filter(|origin| origin.peer.id() != *except)
                .map(|origin| Arc::clone(&origin.peer))
                .collect()
        };
        for peer in peers {
            peer.metrics().known_transactions.inc();
        }
    }

    /// Builds the broadcast value for this payload, excluding every peer
    /// that already has it.
    pub fn broadcast(&self) -> Broadcast {
        let exclude_peers: HashSet<PeerId> = {
            let data = self.data.lock();
            data.received_from
                .iter()
                .map(|origin| origin.peer.id())
                .collect()
        };
        Broadcast {
            message_bytes: Arc::clone(&self.received_bytes),
            exclude_peers,
        }
    }
}

/// A payload scheduled for rebroadcast, with the peers to skip.
#[derive(Clone, Debug)]
pub struct Broadcast {
    /// The serialized message frame.
    pub message_bytes: Arc<[u8]>,
    /// Peers that already have the payload.
    pub exclude_peers: HashSet<PeerId>,
}
