use game_transport::TransportError;
use game_types::GameId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Recoverable input problem surfaced to the local caller; the
    /// session stays usable.
    #[error("invalid input: {0}")]
    Validation(String),

    /// No remembered display name exists for this session, so a
    /// reconnect cannot be attempted - fall back to a fresh join.
    #[error("no remembered name for session {0}")]
    CannotReconnect(GameId),

    /// The host ended the session or dropped off the medium. Terminal:
    /// local state is cleared and the session accepts nothing further.
    #[error("session terminated by host")]
    HostTerminated,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
