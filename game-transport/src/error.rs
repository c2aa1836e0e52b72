use game_types::GameId;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No reachable host advertises this game id, or its advertisement
    /// has gone stale.
    #[error("session {0} not found or host no longer alive")]
    SessionNotFound(GameId),

    #[error("session {0} already exists on this bus")]
    SessionExists(GameId),

    /// The transport has been shut down; no further sends are accepted.
    #[error("transport closed")]
    Closed,

    #[error("join handshake failed: {0}")]
    Handshake(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
