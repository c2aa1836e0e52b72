use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use game_types::{GameState, GameStatus, Player, PlayerStatus};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::Session;

/// Per-process view consumed by UI code. Routes actions to the session,
/// exposes the cached state and the local player record, and drives the
/// elapsed-time counter. No game rules live here.
pub struct GameClient {
    session: Arc<dyn Session>,
    elapsed: Arc<AtomicU32>,
    ticker: JoinHandle<()>,
}

impl GameClient {
    pub fn new(session: Arc<dyn Session>) -> Self {
        let elapsed = Arc::new(AtomicU32::new(0));
        let ticker = tokio::spawn(tick_elapsed(Arc::clone(&session), Arc::clone(&elapsed)));
        Self {
            session,
            elapsed,
            ticker,
        }
    }

    pub fn game_state(&self) -> Option<GameState> {
        self.session.game_state()
    }

    /// This process's own player record, if admitted yet.
    pub fn local_player(&self) -> Option<Player> {
        let state = self.session.game_state()?;
        state.player(self.session.local_player_id()).cloned()
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    /// Whole seconds the local player has been playing. Only advances
    /// while the game is running and the local player has not finished.
    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed.load(Ordering::Relaxed)
    }

    pub fn submit_guess(&self, word: &str) -> Result<(), SessionError> {
        self.session.submit_guess(word)
    }

    pub fn leave(&self) {
        self.session.leave();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// Encoded connection payload for out-of-band sharing (pasted text
    /// or a scannable code).
    pub fn shareable_connection_data(&self) -> String {
        self.session.connect_payload().encode()
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

async fn tick_elapsed(session: Arc<dyn Session>, elapsed: Arc<AtomicU32>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so the counter
    // starts at zero.
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(state) = session.game_state() else {
            continue;
        };
        if state.status != GameStatus::Playing {
            continue;
        }
        let local_playing = state
            .player(session.local_player_id())
            .map(|p| p.status == PlayerStatus::Playing)
            .unwrap_or(false);
        if local_playing {
            elapsed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
