use serde::{Deserialize, Serialize};

use crate::game::GameId;

/// Out-of-band connection payload, shared as a scannable code or pasted
/// text. Media that need handshake data embed the host's offer (for the
/// socket medium this is the host's WebSocket URL); the local bus needs
/// only the game id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub game_id: GameId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<String>,
}

impl ConnectPayload {
    pub fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            offer: None,
        }
    }

    pub fn with_offer(game_id: GameId, offer: String) -> Self {
        Self {
            game_id,
            offer: Some(offer),
        }
    }

    /// Accepts the JSON form or a bare game-id string.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if let Ok(payload) = serde_json::from_str::<ConnectPayload>(input) {
            return Some(payload);
        }
        Some(Self::new(input.to_string()))
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.game_id.clone())
    }
}
