use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transport-assigned identifier for a peer. Doubles as the player id:
/// a participant is addressed by the same id at both layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
    Playing,
    Finished,     // Terminal - reached by an exact match
    Disconnected, // Transport-level peer loss; guess history is retained
}

/// One guess as recorded by the host. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guess {
    pub word: String,
    pub common_letters: u8,
    pub timestamp: String, // ISO 8601 string
}

impl Guess {
    pub fn new(word: String, common_letters: u8) -> Self {
        Self {
            word,
            common_letters,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One entry per participant. Created on join, mutated only by the host,
/// never deleted - status changes instead of removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PeerId,
    pub name: String,
    pub guesses: Vec<Guess>,
    pub time_used: u32, // seconds elapsed at last guess or at finish
    pub status: PlayerStatus,
}

impl Player {
    pub fn new(id: PeerId, name: String) -> Self {
        Self {
            id,
            name,
            guesses: Vec::new(),
            time_used: 0,
            status: PlayerStatus::Playing,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != PlayerStatus::Disconnected
    }
}
