//! Transport adapter: delivers typed messages to some or all peers of a
//! session, regardless of medium.
//!
//! Two interchangeable media implement the [`Transport`] trait:
//!
//! - [`LocalBusTransport`] - a shared in-process broadcast bus keyed by
//!   game id. Reachability boundary: transports built from the same
//!   [`LocalBusNetwork`] value, i.e. one process. Used to run several
//!   simulated peers in one test process.
//! - [`SocketTransport`] - a direct peer channel over WebSocket in a star
//!   topology: the host listens and answers incoming connections, peers
//!   dial the host offer embedded in the connect payload. Reachability
//!   boundary: peers that can open a TCP connection to the host.
//!
//! Delivery is best effort, in order per sender. A transport never
//! delivers a process's own outbound messages back to it, and filters
//! unicasts addressed to someone else before they reach a handler.

pub mod config;
pub mod error;
pub mod local_bus;
pub mod socket;
pub mod subscriptions;

use std::sync::Arc;

use game_types::{ConnectPayload, GameId, MessageBody, MessageKind, PeerId};

pub use config::TransportConfig;
pub use error::TransportError;
pub use local_bus::{LocalBusNetwork, LocalBusTransport};
pub use socket::SocketTransport;
pub use subscriptions::{SubscriptionToken, Subscriptions};

/// Callback invoked once per inbound message of a subscribed kind.
/// Messages from one sender arrive in the order sent; handlers for
/// different senders may run concurrently (the socket host reads each
/// connection on its own task), so shared state needs its own lock.
/// Handlers must not block or await: every game-state mutation runs
/// synchronously to completion inside its handler.
pub type MessageHandler = Arc<dyn Fn(game_types::Envelope) + Send + Sync>;

/// Callback invoked exactly once per peer per disconnection.
pub type PeerLeftHandler = Arc<dyn Fn(PeerId) + Send + Sync>;

pub trait Transport: Send + Sync + 'static {
    /// Id the medium assigned to this process.
    fn local_peer_id(&self) -> PeerId;

    fn game_id(&self) -> GameId;

    fn is_host(&self) -> bool;

    /// Fan a message out to every currently connected peer. Best effort:
    /// a peer disconnecting mid-send misses the message.
    fn broadcast(&self, body: MessageBody) -> Result<(), TransportError>;

    /// Unicast where the medium allows; on media without per-peer
    /// addressing this degrades to a broadcast annotated with an
    /// intended-recipient field that non-target receivers drop.
    fn send_to(&self, to: PeerId, body: MessageBody) -> Result<(), TransportError>;

    fn subscribe(&self, kind: MessageKind, handler: MessageHandler) -> SubscriptionToken;

    fn unsubscribe(&self, token: SubscriptionToken);

    fn on_peer_left(&self, handler: PeerLeftHandler) -> SubscriptionToken;

    /// Out-of-band payload another process needs to join this session.
    fn connect_payload(&self) -> ConnectPayload;

    /// Graceful teardown. For a host: best-effort `Terminated` broadcast,
    /// then removal of the session advertisement so no further joins
    /// succeed. For a peer: departure visible to the host as a peer-left.
    /// Idempotent.
    fn shutdown(&self);
}
