use game_types::{GameState, Guess, PeerId, Player};
use tokio::sync::broadcast;

/// Typed notifications a session emits toward its UI or embedding code.
/// Every wire message that changes what a participant can observe has a
/// counterpart here, and the host emits the same events for its own
/// mutations as peers receive over the wire.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A fresh authoritative snapshot is available.
    StateChanged(GameState),
    PlayerJoined(Player),
    PlayerLeft(PeerId),
    GuessScored { player_id: PeerId, guess: Guess },
    PlayerFinished { player_id: PeerId, time_used: u32 },
    /// A directed rejection from the host (bad word, name taken, ...).
    Rejected(String),
    /// The session is over; local state has been cleared.
    Terminated,
}

const EVENT_CAPACITY: usize = 64;

/// Broadcast fan-out for [`SessionEvent`]s. Emitting with no subscribers
/// is not an error; slow subscribers lose the oldest events first.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
