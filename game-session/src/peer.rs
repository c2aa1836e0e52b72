use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use game_core::{WORD_LENGTH, normalize_word, validate_word_format};
use game_transport::{SubscriptionToken, Transport};
use game_types::{
    ConnectPayload, GameId, GameState, MessageBody, MessageKind, PeerId, Player,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::Session;
use crate::error::SessionError;
use crate::events::{EventBus, SessionEvent};
use crate::store::NameStore;

/// The non-authoritative side of a game. Never sees the real secret
/// word: it forwards actions to the host and mirrors the last received
/// snapshot wholesale.
pub struct PeerSession {
    inner: Arc<PeerInner>,
    tokens: Mutex<Vec<SubscriptionToken>>,
}

struct PeerInner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn NameStore>,
    cached: Mutex<Option<GameState>>,
    // Learned from the sender of the first snapshot; used to tell a host
    // loss apart from an ordinary peer departure.
    host_id: Mutex<Option<PeerId>>,
    terminated: AtomicBool,
    events: EventBus,
}

impl PeerSession {
    /// Join the session the transport is connected to under the given
    /// display name. Admission is confirmed by the first snapshot (or
    /// denied by a directed rejection); callers watch events with their
    /// own timeout.
    pub fn join(
        transport: Arc<dyn Transport>,
        name: &str,
        store: Arc<dyn NameStore>,
    ) -> Result<Arc<Self>, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation(
                "name must not be empty".to_string(),
            ));
        }

        let inner = Arc::new(PeerInner {
            transport,
            store,
            cached: Mutex::new(None),
            host_id: Mutex::new(None),
            terminated: AtomicBool::new(false),
            events: EventBus::new(),
        });

        let mut tokens = Vec::new();
        for kind in [
            MessageKind::State,
            MessageKind::PlayerJoined,
            MessageKind::PlayerLeft,
            MessageKind::Guess,
            MessageKind::Finished,
            MessageKind::Error,
            MessageKind::Terminated,
        ] {
            let handler_inner = Arc::clone(&inner);
            tokens.push(inner.transport.subscribe(
                kind,
                Arc::new(move |envelope| handler_inner.handle(envelope)),
            ));
        }
        let left_inner = Arc::clone(&inner);
        tokens.push(
            inner
                .transport
                .on_peer_left(Arc::new(move |peer| left_inner.handle_peer_left(peer))),
        );

        let game_id = inner.transport.game_id();
        inner.store.remember(&game_id, name);
        info!(%game_id, player = name, "requesting to join");

        let player = Player::new(inner.transport.local_peer_id(), name.to_string());
        inner
            .transport
            .broadcast(MessageBody::JoinRequest { player })?;

        Ok(Arc::new(Self {
            inner,
            tokens: Mutex::new(tokens),
        }))
    }

    /// Rejoin a session this process was part of before, under the name
    /// remembered for its game id. Without a remembered name the caller
    /// must fall back to a fresh join.
    pub fn reconnect(
        transport: Arc<dyn Transport>,
        store: Arc<dyn NameStore>,
    ) -> Result<Arc<Self>, SessionError> {
        let game_id = transport.game_id();
        let name = store
            .recall(&game_id)
            .ok_or(SessionError::CannotReconnect(game_id))?;
        Self::join(transport, &name, store)
    }
}

impl PeerInner {
    fn handle(&self, envelope: game_types::Envelope) {
        match envelope.body {
            MessageBody::State { state } => {
                *self.host_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(envelope.sender);
                let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
                // Replaced wholesale, never patched in place.
                *cached = Some(state.clone());
                drop(cached);
                self.events.emit(SessionEvent::StateChanged(state));
            }
            MessageBody::PlayerJoined { player } => {
                self.events.emit(SessionEvent::PlayerJoined(player));
            }
            MessageBody::PlayerLeft { player_id } => {
                self.events.emit(SessionEvent::PlayerLeft(player_id));
            }
            MessageBody::Guess { player_id, guess } => {
                self.events.emit(SessionEvent::GuessScored { player_id, guess });
            }
            MessageBody::Finished {
                player_id,
                time_used,
            } => {
                self.events.emit(SessionEvent::PlayerFinished {
                    player_id,
                    time_used,
                });
            }
            MessageBody::Error { reason, message } => {
                warn!(?reason, "rejected by host: {message}");
                self.events.emit(SessionEvent::Rejected(message));
            }
            MessageBody::Terminated => self.terminate(),
            other => warn!("unexpected message: {:?}", other.kind()),
        }
    }

    fn handle_peer_left(&self, peer: PeerId) {
        let host = *self.host_id.lock().unwrap_or_else(|e| e.into_inner());
        // Host loss ends the game by design; other departures are
        // announced by the host as PlayerLeft.
        if host == Some(peer) {
            self.terminate();
        }
    }

    /// The session is over: clear local state, nothing is accepted after.
    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(game_id = %self.transport.game_id(), "session terminated");
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.events.emit(SessionEvent::Terminated);
    }
}

impl Session for PeerSession {
    fn game_id(&self) -> GameId {
        self.inner.transport.game_id()
    }

    fn local_player_id(&self) -> PeerId {
        self.inner.transport.local_peer_id()
    }

    fn is_host(&self) -> bool {
        false
    }

    fn game_state(&self) -> Option<GameState> {
        self.inner
            .cached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forward the word to the host for scoring. Never scored locally:
    /// this process only ever holds a masked secret.
    fn submit_guess(&self, word: &str) -> Result<(), SessionError> {
        if self.inner.terminated.load(Ordering::SeqCst) {
            return Err(SessionError::HostTerminated);
        }
        if !validate_word_format(word) {
            return Err(SessionError::Validation(format!(
                "word must be {WORD_LENGTH} alphabetic letters"
            )));
        }
        self.inner.transport.broadcast(MessageBody::SubmitGuess {
            player_id: self.inner.transport.local_peer_id(),
            word: normalize_word(word),
        })?;
        Ok(())
    }

    fn leave(&self) {
        let tokens: Vec<_> = self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for token in tokens {
            self.inner.transport.unsubscribe(token);
        }
        if !self.inner.terminated.swap(true, Ordering::SeqCst) {
            let game_id = self.inner.transport.game_id();
            info!(%game_id, "leaving session");
            let leave = MessageBody::Leave {
                player_id: self.inner.transport.local_peer_id(),
            };
            if let Err(err) = self.inner.transport.broadcast(leave) {
                warn!("failed to announce departure: {err}");
            }
            // Graceful departure: no reconnect is expected, drop the
            // remembered name.
            self.inner.store.forget(&game_id);
            *self.inner.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
            self.inner.events.emit(SessionEvent::Terminated);
        }
        self.inner.transport.shutdown();
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn connect_payload(&self) -> ConnectPayload {
        self.inner.transport.connect_payload()
    }
}
