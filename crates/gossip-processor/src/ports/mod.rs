//! Ports of the processor: the driving API and the collaborator interfaces
//! it consumes.

pub mod inbound;
pub mod outbound;

pub use inbound::ProcessorApi;
pub use outbound::{Peer, PeerManager, Request, RequestQueue, Tangle};
