//! Inbound gossip processor service.
//!
//! Dispatches peer frames by kind, drives the per-payload work-unit state
//! machine, answers transaction and milestone requests, and fires the
//! completion and broadcast signals.

use std::collections::HashSet;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use tracing::{debug, trace, warn};

use shared_types::{Message, MessageId, SerializationMode};

use crate::domain::cache::WorkUnitCache;
use crate::domain::config::ProcessorConfig;
use crate::domain::errors::ProcessError;
use crate::domain::work_unit::{Broadcast, WorkUnit, WorkUnitState};
use crate::events::{MessageProcessed, ProcessorEvents};
use crate::metrics::ServerMetrics;
use crate::ports::inbound::ProcessorApi;
use crate::ports::outbound::{Peer, PeerManager, RequestQueue, Tangle};
use crate::wire::{self, MessageKind, LATEST_MILESTONE_REQUEST_INDEX};
use crate::worker_pool::WorkerPool;

/// A queued unit of peer input.
pub(crate) struct Task {
    peer: Arc<dyn Peer>,
    kind: MessageKind,
    data: Vec<u8>,
}

/// Processes submitted gossip frames in parallel and fires the appropriate
/// completion events.
///
/// Generic over the peer registry, the request queue and the tangle so the
/// surrounding node wires in its own implementations.
pub struct Processor<PM, RQ, TG>
where
    PM: PeerManager,
    RQ: RequestQueue,
    TG: Tangle,
{
    /// Completion and broadcast signals.
    pub events: ProcessorEvents,
    peer_manager: Arc<PM>,
    request_queue: Arc<RQ>,
    tangle: Arc<TG>,
    metrics: Arc<ServerMetrics>,
    work_units: WorkUnitCache,
    pool: WorkerPool<Task>,
    config: ProcessorConfig,
}

impl<PM, RQ, TG> Processor<PM, RQ, TG>
where
    PM: PeerManager + 'static,
    RQ: RequestQueue + 'static,
    TG: Tangle + 'static,
{
    /// Creates a new processor. Workers are not spawned until [`Self::run`].
    pub fn new(
        config: ProcessorConfig,
        peer_manager: Arc<PM>,
        request_queue: Arc<RQ>,
        tangle: Arc<TG>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let pool = WorkerPool::new(config.worker_count, config.worker_queue_size);
        let work_units = WorkUnitCache::new(config.work_unit_cache.clone());
        Self {
            events: ProcessorEvents::default(),
            peer_manager,
            request_queue,
            tangle,
            metrics,
            work_units,
            pool,
            config,
        }
    }

    /// Runs the processor until the shutdown signal fires (or its sender is
    /// dropped), then drains the queue and joins the workers.
    pub fn run(self: &Arc<Self>, shutdown: Receiver<()>) {
        let processor = Arc::clone(self);
        self.pool.start(move |task| processor.dispatch(task));
        let _ = shutdown.recv();
        self.pool.stop_and_wait();
    }

    /// Node-wide counters maintained by this processor.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    fn dispatch(&self, task: Task) {
        match task.kind {
            MessageKind::TransactionPayload => self.process_transaction(&task.peer, &task.data),
            MessageKind::TransactionRequest => self.process_message_request(&task.peer, &task.data),
            MessageKind::MilestoneRequest => self.process_milestone_request(&task.peer, &task.data),
        }
    }

    /// Gets or creates the work unit for the payload and processes it on
    /// behalf of `peer`.
    fn process_transaction(&self, peer: &Arc<dyn Peer>, data: &[u8]) {
        let cached = self.work_units.compute_if_absent(data, WorkUnit::new);
        let work_unit = cached.work_unit();
        work_unit.add_received_from(Arc::clone(peer), None);
        self.process_work_unit(work_unit, peer);
    }

    /// Drives the work unit's state machine for one delivery.
    ///
    /// Safe to call repeatedly for the same unit: concurrent callers for the
    /// same payload either observe a terminal state or find hashing already
    /// in progress and leave.
    fn process_work_unit(&self, work_unit: &WorkUnit, peer: &Arc<dyn Peer>) {
        let guard = work_unit.lock_processing();

        match work_unit.state() {
            WorkUnitState::Hashing => return,
            WorkUnitState::Invalid => {
                drop(guard);

                self.metrics.invalid_transactions.inc();

                // drop the connection to the peer
                self.peer_manager.remove(&peer.id());

                return;
            }
            WorkUnitState::Hashed => {
                drop(guard);

                let Some(message) = work_unit.message() else {
                    return;
                };
                if let Some(request) = self.request_queue.received(message.id()) {
                    self.events.message_processed.fire(&MessageProcessed {
                        message,
                        request: Some(request),
                        peer: Some(Arc::clone(peer)),
                    });
                    return;
                }

                if self.tangle.contains_message(message.id()) {
                    self.metrics.known_transactions.inc();
                    peer.metrics().known_transactions.inc();
                }

                return;
            }
            WorkUnitState::Unhashed => {}
        }

        work_unit.update_state(WorkUnitState::Hashing);
        drop(guard);

        // Parse outside the processing lock; the Hashing state keeps other
        // workers out during the expensive part.
        let message = match Message::from_bytes(work_unit.received_bytes()) {
            Ok(message) => Arc::new(message),
            Err(err) => {
                debug!(
                    peer = %peer.id(),
                    error = %ProcessError::Parse(err),
                    "dropping invalid transaction payload"
                );
                work_unit.update_state(WorkUnitState::Invalid);
                work_unit.punish(&*self.peer_manager, &self.metrics);
                return;
            }
        };

        // Mark the message as received.
        let request = self.request_queue.received(message.id());

        // TODO: validate the minimum weight magnitude of unrequested
        // payloads against `ProcessorConfig::valid_mwm` once the nonce
        // scheme is settled.

        work_unit.set_message(Arc::clone(&message));

        if self.config.invalid_milestone_ids.contains(message.id()) {
            debug!(
                error = %ProcessError::BlocklistedMilestone(*message.id()),
                "rejecting blocklisted milestone payload"
            );
            work_unit.update_state(WorkUnitState::Invalid);
            work_unit.punish(&*self.peer_manager, &self.metrics);
            return;
        }

        work_unit.update_state(WorkUnitState::Hashed);
        self.metrics.new_transactions.inc();

        // Check the existence of the message before the events fire.
        let already_contained = self.tangle.contains_message(message.id());

        self.events.message_processed.fire(&MessageProcessed {
            message: Arc::clone(&message),
            request: request.clone(),
            peer: Some(Arc::clone(peer)),
        });

        // Every other sender already had this payload.
        work_unit.increase_known_count(&peer.id());

        // Broadcast only what was neither requested nor already known.
        if request.is_none() && !already_contained {
            self.events.broadcast_message.fire(&work_unit.broadcast());
        }
    }

    /// Replies to a transaction request with the requested message, if the
    /// tangle has it.
    fn process_message_request(&self, peer: &Arc<dyn Peer>, data: &[u8]) {
        let Some(message_id) = MessageId::from_slice(data) else {
            trace!(
                error = %ProcessError::BadRequestLength { actual: data.len() },
                "dropping transaction request"
            );
            return;
        };

        let Some(message) = self.tangle.get_message(&message_id) else {
            // can't reply if we don't have the requested message
            trace!(error = %ProcessError::NotFound(message_id), "transaction request miss");
            return;
        };

        peer.enqueue_for_sending(wire::new_transaction_message(message.raw_bytes()));
    }

    /// Replies to a milestone request with every message of the requested
    /// milestone.
    fn process_milestone_request(&self, peer: &Arc<dyn Peer>, data: &[u8]) {
        let index = match wire::extract_requested_milestone_index(data) {
            Ok(index) => index,
            Err(err) => {
                warn!(peer = %peer.id(), error = %err, "malformed milestone request");
                self.metrics.invalid_requests.inc();

                // drop the connection to the peer
                self.peer_manager.remove(&peer.id());
                return;
            }
        };

        // Peers can ask for the latest milestone we know.
        let index = if index == LATEST_MILESTONE_REQUEST_INDEX {
            self.tangle.latest_milestone_index()
        } else {
            index
        };

        let Some(milestone) = self.tangle.get_milestone(index) else {
            // can't reply if we don't have the wanted milestone
            return;
        };

        for message in &milestone.messages {
            peer.enqueue_for_sending(wire::new_transaction_message(message.raw_bytes()));
        }
    }
}

impl<PM, RQ, TG> ProcessorApi for Processor<PM, RQ, TG>
where
    PM: PeerManager + 'static,
    RQ: RequestQueue + 'static,
    TG: Tangle + 'static,
{
    fn process(&self, peer: Arc<dyn Peer>, kind: MessageKind, data: Vec<u8>) {
        self.pool.submit(Task { peer, kind, data });
    }

    fn serialize_and_emit(
        &self,
        message: Arc<Message>,
        mode: SerializationMode,
    ) -> Result<(), ProcessError> {
        let bytes = message.pack(mode).map_err(ProcessError::Serialization)?;

        self.events.message_processed.fire(&MessageProcessed {
            message,
            request: None,
            peer: None,
        });
        self.events.broadcast_message.fire(&Broadcast {
            message_bytes: bytes.into(),
            exclude_peers: HashSet::new(),
        });

        Ok(())
    }

    fn work_units_size(&self) -> usize {
        self.work_units.size()
    }
}
