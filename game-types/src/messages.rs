use serde::{Deserialize, Serialize};

use crate::errors::ErrorReason;
use crate::game::GameState;
use crate::player::{Guess, PeerId};

/// Logical wire messages, transport-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Full snapshot fan-out from the host. The secret is always masked.
    State { state: GameState },
    /// Non-host -> host: admission request.
    JoinRequest { player: crate::player::Player },
    /// Host -> all: a player was admitted.
    PlayerJoined { player: crate::player::Player },
    /// Non-host -> host: voluntary departure.
    Leave { player_id: PeerId },
    /// Host -> all: a player left or dropped.
    PlayerLeft { player_id: PeerId },
    /// Host -> all: a scored guess was recorded.
    Guess { player_id: PeerId, guess: Guess },
    /// Non-host -> host: raw word submission, scored host-side only.
    SubmitGuess { player_id: PeerId, word: String },
    /// Host -> all: a player reached an exact match.
    Finished { player_id: PeerId, time_used: u32 },
    /// Host -> one peer: directed rejection.
    Error { reason: ErrorReason, message: String },
    /// Host -> all: session is over, clear local state.
    Terminated,
}

/// Subscription key: one per message body variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    State,
    JoinRequest,
    PlayerJoined,
    Leave,
    PlayerLeft,
    Guess,
    SubmitGuess,
    Finished,
    Error,
    Terminated,
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::State { .. } => MessageKind::State,
            MessageBody::JoinRequest { .. } => MessageKind::JoinRequest,
            MessageBody::PlayerJoined { .. } => MessageKind::PlayerJoined,
            MessageBody::Leave { .. } => MessageKind::Leave,
            MessageBody::PlayerLeft { .. } => MessageKind::PlayerLeft,
            MessageBody::Guess { .. } => MessageKind::Guess,
            MessageBody::SubmitGuess { .. } => MessageKind::SubmitGuess,
            MessageBody::Finished { .. } => MessageKind::Finished,
            MessageBody::Error { .. } => MessageKind::Error,
            MessageBody::Terminated => MessageKind::Terminated,
        }
    }
}

/// Wrapper around every message on the wire: sender id, optional intended
/// recipient (for media without per-peer addressing), creation timestamp.
/// Receivers ignore envelopes whose sender equals their own id, and
/// envelopes addressed to someone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: PeerId,
    pub to: Option<PeerId>,
    pub timestamp: String, // ISO 8601 string
    pub body: MessageBody,
}

impl Envelope {
    pub fn new(sender: PeerId, to: Option<PeerId>, body: MessageBody) -> Self {
        Self {
            sender,
            to,
            timestamp: chrono::Utc::now().to_rfc3339(),
            body,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Whether a peer with the given id should process this envelope.
    pub fn is_for(&self, local: PeerId) -> bool {
        if self.sender == local {
            return false;
        }
        match self.to {
            Some(target) => target == local,
            None => true,
        }
    }
}
