//! Session layer: the host-authoritative game protocol and the facade
//! consumed by UI code.
//!
//! Exactly one process per game runs a [`HostSession`], which owns the
//! authoritative [`GameState`] and is the only place guesses are scored.
//! Every other process runs a [`PeerSession`], which forwards actions to
//! the host and mirrors the last received snapshot. Both roles implement
//! the [`Session`] trait, so [`GameClient`] and tests are written once
//! against it. Sessions are constructed explicitly around an injected
//! transport; there is no process-global instance.

pub mod client;
pub mod error;
pub mod events;
pub mod host;
pub mod peer;
pub mod store;

use game_types::{ConnectPayload, GameId, GameState, PeerId};
use tokio::sync::broadcast;

pub use client::GameClient;
pub use error::SessionError;
pub use events::{EventBus, SessionEvent};
pub use host::HostSession;
pub use peer::PeerSession;
pub use store::{FileNameStore, MemoryNameStore, NameStore};

/// Role-independent session contract.
pub trait Session: Send + Sync {
    fn game_id(&self) -> GameId;

    /// Transport-assigned id of this process; doubles as the local
    /// player's id.
    fn local_player_id(&self) -> PeerId;

    fn is_host(&self) -> bool;

    /// Latest known state: the authoritative copy on a host, the last
    /// received snapshot on a peer. `None` on a peer before the first
    /// snapshot arrives or after termination.
    fn game_state(&self) -> Option<GameState>;

    /// Submit a word for the local player. On a host this scores the
    /// guess in place; on a peer it is forwarded to the host. Malformed
    /// input is reported synchronously and nothing is sent.
    fn submit_guess(&self, word: &str) -> Result<(), SessionError>;

    /// Leave the session gracefully. For a host this ends the game for
    /// everyone. Idempotent.
    fn leave(&self);

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Out-of-band payload another process needs to join this session.
    fn connect_payload(&self) -> ConnectPayload;
}
