//! End-to-end scenarios for the inbound gossip processor.
//!
//! Every test here drives the public API across the real worker pool:
//! frames are submitted through `process`, picked up by worker threads, and
//! the assertions run after a drain-and-join shutdown (or after polling for
//! an intermediate state).

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use rand::RngCore;

use gossip_processor::{
    Broadcast, CacheConfig, MessageKind, MessageProcessed, Peer, PeerManager, PeerMetrics,
    Processor, ProcessorApi, ProcessorConfig, Request, RequestQueue, ServerMetrics, Tangle,
    WireMessage,
};
use shared_types::{
    Message, MessageId, Milestone, MilestoneIndex, PeerId, SerializationMode, MESSAGE_ID_LENGTH,
};

// =============================================================================
// MOCK COLLABORATORS
// =============================================================================

struct MockPeer {
    id: PeerId,
    metrics: PeerMetrics,
    sent: Mutex<Vec<WireMessage>>,
}

impl MockPeer {
    fn new(byte: u8) -> Arc<Self> {
        Arc::new(Self {
            id: PeerId::new([byte; 32]),
            metrics: PeerMetrics::default(),
            sent: Mutex::new(Vec::new()),
        })
    }
}

impl Peer for MockPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn enqueue_for_sending(&self, message: WireMessage) {
        self.sent.lock().push(message);
    }

    fn metrics(&self) -> &PeerMetrics {
        &self.metrics
    }
}

#[derive(Default)]
struct MockPeerManager {
    removed: Mutex<Vec<PeerId>>,
}

impl PeerManager for MockPeerManager {
    fn remove(&self, peer_id: &PeerId) {
        self.removed.lock().push(*peer_id);
    }
}

#[derive(Default)]
struct MockRequestQueue {
    pending: Mutex<HashMap<MessageId, Request>>,
}

impl MockRequestQueue {
    fn insert(&self, request: Request) {
        self.pending.lock().insert(request.message_id, request);
    }
}

impl RequestQueue for MockRequestQueue {
    fn received(&self, message_id: &MessageId) -> Option<Request> {
        self.pending.lock().remove(message_id)
    }
}

#[derive(Default)]
struct MockTangle {
    messages: Mutex<HashMap<MessageId, Arc<Message>>>,
    milestones: Mutex<HashMap<MilestoneIndex, Milestone>>,
    latest: Mutex<MilestoneIndex>,
}

impl MockTangle {
    fn insert_message(&self, message: Arc<Message>) {
        self.messages.lock().insert(*message.id(), message);
    }

    fn insert_milestone(&self, milestone: Milestone) {
        let mut latest = self.latest.lock();
        if milestone.index > *latest {
            *latest = milestone.index;
        }
        self.milestones.lock().insert(milestone.index, milestone);
    }
}

impl Tangle for MockTangle {
    fn get_message(&self, message_id: &MessageId) -> Option<Arc<Message>> {
        self.messages.lock().get(message_id).cloned()
    }

    fn contains_message(&self, message_id: &MessageId) -> bool {
        self.messages.lock().contains_key(message_id)
    }

    fn latest_milestone_index(&self) -> MilestoneIndex {
        *self.latest.lock()
    }

    fn get_milestone(&self, index: MilestoneIndex) -> Option<Milestone> {
        self.milestones.lock().get(&index).cloned()
    }
}

// =============================================================================
// HARNESS
// =============================================================================

type TestProcessor = Processor<MockPeerManager, MockRequestQueue, MockTangle>;

struct Node {
    processor: Arc<TestProcessor>,
    peer_manager: Arc<MockPeerManager>,
    request_queue: Arc<MockRequestQueue>,
    tangle: Arc<MockTangle>,
    processed: Arc<Mutex<Vec<MessageProcessed>>>,
    broadcasts: Arc<Mutex<Vec<Broadcast>>>,
    shutdown: Sender<()>,
    runner: thread::JoinHandle<()>,
}

impl Node {
    fn start() -> Self {
        Self::start_with_config(test_config())
    }

    fn start_with_config(config: ProcessorConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let peer_manager = Arc::new(MockPeerManager::default());
        let request_queue = Arc::new(MockRequestQueue::default());
        let tangle = Arc::new(MockTangle::default());
        let processor = Arc::new(Processor::new(
            config,
            Arc::clone(&peer_manager),
            Arc::clone(&request_queue),
            Arc::clone(&tangle),
            Arc::new(ServerMetrics::new()),
        ));

        let processed = Arc::new(Mutex::new(Vec::new()));
        let processed_ref = Arc::clone(&processed);
        processor
            .events
            .message_processed
            .subscribe(move |event: &MessageProcessed| processed_ref.lock().push(event.clone()));

        let broadcasts = Arc::new(Mutex::new(Vec::new()));
        let broadcasts_ref = Arc::clone(&broadcasts);
        processor
            .events
            .broadcast_message
            .subscribe(move |event: &Broadcast| broadcasts_ref.lock().push(event.clone()));

        let (shutdown, shutdown_rx) = bounded(1);
        let runner = {
            let processor = Arc::clone(&processor);
            thread::spawn(move || processor.run(shutdown_rx))
        };

        Self {
            processor,
            peer_manager,
            request_queue,
            tangle,
            processed,
            broadcasts,
            shutdown,
            runner,
        }
    }

    /// Signals shutdown and waits until every queued task has drained.
    fn stop(self) -> Stopped {
        self.shutdown.send(()).expect("processor already stopped");
        self.runner.join().expect("processor run thread panicked");
        Stopped {
            processor: self.processor,
            peer_manager: self.peer_manager,
            processed: self.processed,
            broadcasts: self.broadcasts,
        }
    }

    /// Polls until `condition` holds or the timeout elapses.
    fn wait_until(&self, condition: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition(self) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached within timeout");
    }
}

struct Stopped {
    processor: Arc<TestProcessor>,
    peer_manager: Arc<MockPeerManager>,
    processed: Arc<Mutex<Vec<MessageProcessed>>>,
    broadcasts: Arc<Mutex<Vec<Broadcast>>>,
}

fn test_config() -> ProcessorConfig {
    ProcessorConfig {
        worker_count: 4,
        worker_queue_size: 1_024,
        work_unit_cache: CacheConfig { cache_time_ms: 60_000, ..CacheConfig::default() },
        ..ProcessorConfig::default()
    }
}

fn payload(tag: u8) -> Vec<u8> {
    Message::new(
        MessageId([tag; MESSAGE_ID_LENGTH]),
        MessageId([tag.wrapping_add(1); MESSAGE_ID_LENGTH]),
        1_700_000_000,
        &[tag; 64],
    )
    .unwrap()
    .pack(SerializationMode::Unvalidated)
    .unwrap()
}

fn random_payload(rng: &mut impl RngCore) -> Vec<u8> {
    let mut trunk = [0u8; MESSAGE_ID_LENGTH];
    rng.fill_bytes(&mut trunk);
    let mut branch = [0u8; MESSAGE_ID_LENGTH];
    rng.fill_bytes(&mut branch);
    let mut body = [0u8; 128];
    rng.fill_bytes(&mut body);
    Message::new(MessageId(trunk), MessageId(branch), 1_700_000_000, &body)
        .unwrap()
        .pack(SerializationMode::Unvalidated)
        .unwrap()
}

fn id_of(bytes: &[u8]) -> MessageId {
    *Message::from_bytes(bytes).unwrap().id()
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn deduplicated_delivery_hashes_once() {
    let node = Node::start();
    let peer_a = MockPeer::new(1);
    let peer_b = MockPeer::new(2);
    let bytes = payload(10);

    // Both peers deliver the same payload at the same time.
    let submitters: Vec<_> = [peer_a.clone(), peer_b.clone()]
        .into_iter()
        .map(|peer| {
            let processor = Arc::clone(&node.processor);
            let bytes = bytes.clone();
            thread::spawn(move || processor.process(peer, MessageKind::TransactionPayload, bytes))
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    let stopped = node.stop();

    // Exactly one parse happened: one processed event, one broadcast, one
    // first-seen transaction.
    assert_eq!(stopped.processed.lock().len(), 1);
    assert_eq!(stopped.broadcasts.lock().len(), 1);
    assert_eq!(stopped.processor.metrics().new_transactions.value(), 1);
    assert_eq!(stopped.processor.work_units_size(), 1);
    assert!(stopped.peer_manager.removed.lock().is_empty());
    // The hashing peer never counts itself as a duplicate sender.
    let known_a = peer_a.metrics.known_transactions.value();
    let known_b = peer_b.metrics.known_transactions.value();
    assert!(known_a + known_b <= 1, "at most one duplicate sender accounted");
}

#[test]
fn concurrent_distinct_payloads_all_processed_once() {
    let node = Node::start();
    let mut rng = rand::thread_rng();
    let payloads: Vec<Vec<u8>> = (0..50).map(|_| random_payload(&mut rng)).collect();

    // Each payload delivered by three peers from three submitting threads.
    let peers: Vec<Arc<MockPeer>> = (1..=3).map(MockPeer::new).collect();
    let submitters: Vec<_> = peers
        .iter()
        .map(|peer| {
            let processor = Arc::clone(&node.processor);
            let peer = Arc::clone(peer);
            let payloads = payloads.clone();
            thread::spawn(move || {
                for bytes in payloads {
                    processor.process(
                        Arc::clone(&peer) as Arc<dyn Peer>,
                        MessageKind::TransactionPayload,
                        bytes,
                    );
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    let stopped = node.stop();

    assert_eq!(stopped.processor.metrics().new_transactions.value(), 50);
    assert_eq!(stopped.processed.lock().len(), 50);
    assert_eq!(stopped.broadcasts.lock().len(), 50);
    assert_eq!(stopped.processor.work_units_size(), 50);
}

#[test]
fn processed_always_fires_before_broadcast() {
    let node = Node::start();

    // Record a per-payload event sequence.
    let order: Arc<Mutex<Vec<(MessageId, &'static str)>>> = Arc::new(Mutex::new(Vec::new()));
    let order_ref = Arc::clone(&order);
    node.processor
        .events
        .message_processed
        .subscribe(move |event: &MessageProcessed| {
            order_ref.lock().push((*event.message.id(), "processed"));
        });
    let order_ref = Arc::clone(&order);
    node.processor
        .events
        .broadcast_message
        .subscribe(move |event: &Broadcast| {
            order_ref.lock().push((id_of(&event.message_bytes), "broadcast"));
        });

    let peer = MockPeer::new(1);
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        node.processor.process(
            Arc::clone(&peer) as Arc<dyn Peer>,
            MessageKind::TransactionPayload,
            random_payload(&mut rng),
        );
    }
    node.stop();

    let order = order.lock();
    let mut first_seen: HashMap<MessageId, &'static str> = HashMap::new();
    for (id, kind) in order.iter() {
        first_seen.entry(*id).or_insert(*kind);
    }
    assert!(first_seen.values().all(|kind| *kind == "processed"));
}

#[test]
fn invalid_payload_punishes_sender() {
    let node = Node::start();
    let peer = MockPeer::new(1);

    node.processor.process(
        Arc::clone(&peer) as Arc<dyn Peer>,
        MessageKind::TransactionPayload,
        vec![0xFF; 200],
    );
    let stopped = node.stop();

    assert!(stopped.processed.lock().is_empty());
    assert!(stopped.broadcasts.lock().is_empty());
    assert_eq!(stopped.processor.metrics().invalid_transactions.value(), 1);
    assert_eq!(*stopped.peer_manager.removed.lock(), vec![peer.id()]);
}

#[test]
fn requested_payload_satisfies_request_without_broadcast() {
    let node = Node::start();
    let peer = MockPeer::new(1);
    let bytes = payload(10);
    let request = Request { message_id: id_of(&bytes), milestone_index: 7 };
    node.request_queue.insert(request.clone());

    node.processor.process(
        Arc::clone(&peer) as Arc<dyn Peer>,
        MessageKind::TransactionPayload,
        bytes,
    );
    let stopped = node.stop();

    let processed = stopped.processed.lock();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].request, Some(request));
    assert_eq!(processed[0].peer.as_ref().unwrap().id(), peer.id());
    assert!(stopped.broadcasts.lock().is_empty());
}

#[test]
fn transaction_request_for_known_message_gets_reply() {
    let node = Node::start();
    let peer = MockPeer::new(1);
    let bytes = payload(10);
    let message = Arc::new(Message::from_bytes(&bytes).unwrap());
    node.tangle.insert_message(Arc::clone(&message));

    node.processor.process(
        Arc::clone(&peer) as Arc<dyn Peer>,
        MessageKind::TransactionRequest,
        message.id().as_bytes().to_vec(),
    );
    let stopped = node.stop();

    let sent = peer.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, MessageKind::TransactionPayload);
    assert_eq!(sent[0].payload, bytes);
    assert!(stopped.processed.lock().is_empty());
    assert!(stopped.broadcasts.lock().is_empty());
}

#[test]
fn milestone_request_with_sentinel_replies_latest() {
    let node = Node::start();
    let peer = MockPeer::new(1);
    let milestone = Milestone {
        index: 12,
        messages: vec![
            Arc::new(Message::from_bytes(&payload(10)).unwrap()),
            Arc::new(Message::from_bytes(&payload(20)).unwrap()),
        ],
    };
    node.tangle.insert_milestone(milestone);

    node.processor.process(
        Arc::clone(&peer) as Arc<dyn Peer>,
        MessageKind::MilestoneRequest,
        0u32.to_le_bytes().to_vec(),
    );
    node.stop();

    let sent = peer.sent.lock();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].payload, payload(10));
    assert_eq!(sent[1].payload, payload(20));
}

#[test]
fn malformed_milestone_request_counts_and_removes() {
    let node = Node::start();
    let peer = MockPeer::new(1);

    node.processor.process(
        Arc::clone(&peer) as Arc<dyn Peer>,
        MessageKind::MilestoneRequest,
        vec![1, 2, 3],
    );
    let stopped = node.stop();

    assert_eq!(stopped.processor.metrics().invalid_requests.value(), 1);
    assert_eq!(*stopped.peer_manager.removed.lock(), vec![peer.id()]);
    assert!(peer.sent.lock().is_empty());
}

#[test]
fn shutdown_drains_queued_work() {
    let node = Node::start();
    let peer = MockPeer::new(1);
    let mut rng = rand::thread_rng();

    for _ in 0..100 {
        node.processor.process(
            Arc::clone(&peer) as Arc<dyn Peer>,
            MessageKind::TransactionPayload,
            random_payload(&mut rng),
        );
    }
    let stopped = node.stop();

    assert_eq!(stopped.processed.lock().len(), 100);
    assert_eq!(stopped.processor.metrics().new_transactions.value(), 100);
}

#[test]
fn evicted_work_unit_is_reprocessed() {
    let node = Node::start_with_config(ProcessorConfig {
        worker_count: 1,
        worker_queue_size: 64,
        work_unit_cache: CacheConfig { cache_time_ms: 0, ..CacheConfig::default() },
        ..ProcessorConfig::default()
    });
    let peer = MockPeer::new(1);
    let bytes = payload(10);

    node.processor.process(
        Arc::clone(&peer) as Arc<dyn Peer>,
        MessageKind::TransactionPayload,
        bytes.clone(),
    );
    node.wait_until(|node| node.processed.lock().len() == 1);

    // The idle entry's cache time has elapsed, so the second delivery finds
    // a fresh work unit and parses again.
    node.processor.process(
        Arc::clone(&peer) as Arc<dyn Peer>,
        MessageKind::TransactionPayload,
        bytes,
    );
    let stopped = node.stop();

    assert_eq!(stopped.processed.lock().len(), 2);
    assert_eq!(stopped.processor.metrics().new_transactions.value(), 2);
}

#[test]
fn local_injection_emits_without_peer() {
    let node = Node::start();
    let message = Arc::new(Message::from_bytes(&payload(10)).unwrap());

    node.processor
        .serialize_and_emit(Arc::clone(&message), SerializationMode::Validated)
        .unwrap();
    let stopped = node.stop();

    let processed = stopped.processed.lock();
    assert_eq!(processed.len(), 1);
    assert!(processed[0].peer.is_none());
    let broadcasts = stopped.broadcasts.lock();
    assert_eq!(broadcasts.len(), 1);
    assert!(broadcasts[0].exclude_peers.is_empty());
}
