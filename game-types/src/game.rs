use serde::{Deserialize, Serialize};

use crate::player::{PeerId, Player, PlayerStatus};

pub type GameId = String;

/// Placeholder sent to non-host peers instead of the real secret word.
pub const MASKED_WORD: &str = "****";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Waiting,  // Fewer than 2 players admitted, no timer running
    Playing,  // Timer running, guesses accepted
    Finished, // Every non-disconnected player has finished
}

/// The single authoritative game record. Owned exclusively by the host's
/// session; every other peer holds a read-only copy replaced wholesale on
/// each snapshot broadcast, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub id: GameId,
    pub secret_word: String,
    pub players: Vec<Player>, // insertion order = join order
    pub status: GameStatus,
    pub start_time: Option<i64>, // epoch millis, stamped once at Waiting -> Playing
}

impl GameState {
    pub fn new(id: GameId, secret_word: String, host: Player) -> Self {
        Self {
            id,
            secret_word,
            players: vec![host],
            status: GameStatus::Waiting,
            start_time: None,
        }
    }

    /// Copy of this state with the secret word replaced by a placeholder.
    /// Every snapshot that leaves the host process goes through here.
    pub fn masked(&self) -> GameState {
        GameState {
            secret_word: MASKED_WORD.to_string(),
            ..self.clone()
        }
    }

    pub fn player(&self, id: PeerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PeerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// True when every player not marked disconnected has finished.
    /// Disconnected players are excluded from the check entirely.
    pub fn all_active_finished(&self) -> bool {
        let active: Vec<_> = self.players.iter().filter(|p| p.is_active()).collect();
        !active.is_empty() && active.iter().all(|p| p.status == PlayerStatus::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(players: Vec<Player>) -> GameState {
        let mut it = players.into_iter();
        let host = it.next().unwrap();
        let mut state = GameState::new("ab12cd".to_string(), "HOUSE".to_string(), host);
        state.players.extend(it);
        state
    }

    #[test]
    fn test_masked_state_hides_secret() {
        let state = state_with(vec![Player::new(PeerId::new(), "Alice".to_string())]);
        let masked = state.masked();

        assert_eq!(masked.secret_word, MASKED_WORD);
        assert_eq!(masked.id, state.id);
        assert_eq!(masked.players, state.players);

        // The serialized form must not carry the real word either
        let json = serde_json::to_string(&masked).unwrap();
        assert!(!json.contains("HOUSE"));
    }

    #[test]
    fn test_all_active_finished_excludes_disconnected() {
        let mut state = state_with(vec![
            Player::new(PeerId::new(), "Alice".to_string()),
            Player::new(PeerId::new(), "Bob".to_string()),
        ]);

        assert!(!state.all_active_finished());

        state.players[0].status = PlayerStatus::Finished;
        assert!(!state.all_active_finished());

        state.players[1].status = PlayerStatus::Disconnected;
        assert!(state.all_active_finished());
    }

    #[test]
    fn test_all_active_finished_requires_someone_active() {
        let mut state = state_with(vec![Player::new(PeerId::new(), "Alice".to_string())]);
        state.players[0].status = PlayerStatus::Disconnected;
        assert!(!state.all_active_finished());
    }
}
