use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use game_core::{ScoringEngine, WORD_LENGTH, normalize_word, validate_word_format};
use game_transport::{SubscriptionToken, Transport};
use game_types::{
    ConnectPayload, ErrorReason, GameId, GameState, GameStatus, Guess, MessageBody, MessageKind,
    PeerId, Player, PlayerStatus,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::Session;
use crate::error::SessionError;
use crate::events::{EventBus, SessionEvent};

/// The authoritative side of a game. Owns the real [`GameState`],
/// including the unmasked secret word; every snapshot that leaves this
/// process goes through [`GameState::masked`].
pub struct HostSession {
    inner: Arc<HostInner>,
    tokens: Mutex<Vec<SubscriptionToken>>,
}

struct HostInner {
    transport: Arc<dyn Transport>,
    state: Mutex<GameState>,
    events: EventBus,
    closed: AtomicBool,
}

impl HostSession {
    /// Establish this process as host. The secret word is validated and
    /// normalized up front; the host is admitted as the first player.
    pub fn create(
        transport: Arc<dyn Transport>,
        secret_word: &str,
        host_name: &str,
    ) -> Result<Arc<Self>, SessionError> {
        if !validate_word_format(secret_word) {
            return Err(SessionError::Validation(format!(
                "secret word must be {WORD_LENGTH} alphabetic letters"
            )));
        }
        let host_name = host_name.trim();
        if host_name.is_empty() {
            return Err(SessionError::Validation(
                "name must not be empty".to_string(),
            ));
        }

        let host_player = Player::new(transport.local_peer_id(), host_name.to_string());
        let state = GameState::new(
            transport.game_id(),
            normalize_word(secret_word),
            host_player,
        );
        info!(game_id = %state.id, host = host_name, "created game");

        let inner = Arc::new(HostInner {
            transport,
            state: Mutex::new(state),
            events: EventBus::new(),
            closed: AtomicBool::new(false),
        });

        let mut tokens = Vec::new();

        let join_inner = Arc::clone(&inner);
        tokens.push(inner.transport.subscribe(
            MessageKind::JoinRequest,
            Arc::new(move |envelope| {
                if let MessageBody::JoinRequest { player } = envelope.body {
                    join_inner.admit(player);
                }
            }),
        ));

        let guess_inner = Arc::clone(&inner);
        tokens.push(inner.transport.subscribe(
            MessageKind::SubmitGuess,
            Arc::new(move |envelope| {
                let sender = envelope.sender;
                if let MessageBody::SubmitGuess { player_id, word } = envelope.body {
                    // Remote callers get rejections as directed messages,
                    // never as a dropped connection.
                    if let Err(SessionError::Validation(message)) =
                        guess_inner.process_guess(player_id, &word)
                    {
                        guess_inner.reject(sender, ErrorReason::InvalidWord, message);
                    }
                }
            }),
        ));

        let leave_inner = Arc::clone(&inner);
        tokens.push(inner.transport.subscribe(
            MessageKind::Leave,
            Arc::new(move |envelope| {
                if let MessageBody::Leave { player_id } = envelope.body {
                    leave_inner.mark_disconnected(player_id);
                }
            }),
        ));

        let left_inner = Arc::clone(&inner);
        tokens.push(
            inner
                .transport
                .on_peer_left(Arc::new(move |peer| left_inner.mark_disconnected(peer))),
        );

        Ok(Arc::new(Self {
            inner,
            tokens: Mutex::new(tokens),
        }))
    }
}

impl HostInner {
    fn lock_state(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reject(&self, to: PeerId, reason: ErrorReason, message: String) {
        if let Err(err) = self.transport.send_to(to, MessageBody::Error { reason, message }) {
            warn!(%to, "failed to deliver rejection: {err}");
        }
    }

    fn broadcast(&self, body: MessageBody) {
        if let Err(err) = self.transport.broadcast(body) {
            warn!("broadcast failed: {err}");
        }
    }

    /// Fan the current snapshot out, masked on the wire, unmasked to
    /// local subscribers.
    fn publish_snapshot(&self, state: &GameState) {
        self.broadcast(MessageBody::State {
            state: state.masked(),
        });
        self.events.emit(SessionEvent::StateChanged(state.clone()));
    }

    fn admit(&self, requester: Player) {
        let mut state = self.lock_state();

        if state.status == GameStatus::Finished {
            drop(state);
            self.reject(
                requester.id,
                ErrorReason::NotAccepting,
                "game is already over".to_string(),
            );
            return;
        }
        if state.player(requester.id).is_some() {
            drop(state);
            self.reject(
                requester.id,
                ErrorReason::AlreadyJoined,
                "player already admitted".to_string(),
            );
            return;
        }

        // A disconnected player rejoining under the same name resumes
        // their record, guess history intact, under the new peer id.
        if let Some(i) = state.players.iter().position(|p| p.name == requester.name) {
            if state.players[i].is_active() {
                drop(state);
                self.reject(
                    requester.id,
                    ErrorReason::NameTaken,
                    format!("name \"{}\" is already in use", requester.name),
                );
                return;
            }
            let secret = state.secret_word.clone();
            let player = &mut state.players[i];
            player.id = requester.id;
            player.status = if player
                .guesses
                .iter()
                .any(|g| ScoringEngine::is_exact_match(&secret, &g.word))
            {
                PlayerStatus::Finished
            } else {
                PlayerStatus::Playing
            };
            let rejoined = player.clone();
            info!(game_id = %state.id, player = %rejoined.name, "player reconnected");
            self.broadcast(MessageBody::PlayerJoined {
                player: rejoined.clone(),
            });
            self.events.emit(SessionEvent::PlayerJoined(rejoined));
            self.publish_snapshot(&state);
            return;
        }

        let admitted = Player::new(requester.id, requester.name);
        state.players.push(admitted.clone());
        info!(game_id = %state.id, player = %admitted.name, "player joined");

        if state.status == GameStatus::Waiting
            && state.players.iter().filter(|p| p.is_active()).count() >= 2
        {
            state.status = GameStatus::Playing;
            state.start_time = Some(Utc::now().timestamp_millis());
            info!(game_id = %state.id, "game started");
        }

        self.broadcast(MessageBody::PlayerJoined {
            player: admitted.clone(),
        });
        self.events.emit(SessionEvent::PlayerJoined(admitted));
        self.publish_snapshot(&state);
    }

    /// Score a word against the true secret. Unknown and already-finished
    /// players are no-ops. A malformed word is an error to the caller and
    /// nothing is recorded or broadcast.
    fn process_guess(&self, player_id: PeerId, word: &str) -> Result<(), SessionError> {
        let mut state = self.lock_state();

        let Some(i) = state.players.iter().position(|p| p.id == player_id) else {
            return Ok(());
        };
        if state.players[i].status == PlayerStatus::Finished {
            return Ok(());
        }
        if !validate_word_format(word) {
            return Err(SessionError::Validation(format!(
                "word must be {WORD_LENGTH} alphabetic letters"
            )));
        }

        let word = normalize_word(word);
        let common = ScoringEngine::common_letter_count(&state.secret_word, &word);
        let exact = ScoringEngine::is_exact_match(&state.secret_word, &word);
        let elapsed = state
            .start_time
            .map(|start| ((Utc::now().timestamp_millis() - start).max(0) / 1000) as u32)
            .unwrap_or(0);
        let guess = Guess::new(word, common);

        let player = &mut state.players[i];
        player.guesses.push(guess.clone());
        player.time_used = player.time_used.max(elapsed);
        let time_used = player.time_used;
        if exact {
            player.status = PlayerStatus::Finished;
        }
        let name = player.name.clone();

        if exact {
            info!(game_id = %state.id, player = %name, time_used, "player finished");
            self.broadcast(MessageBody::Finished {
                player_id,
                time_used,
            });
            self.events.emit(SessionEvent::PlayerFinished {
                player_id,
                time_used,
            });
        }
        if state.status == GameStatus::Playing && state.all_active_finished() {
            state.status = GameStatus::Finished;
            info!(game_id = %state.id, "game finished");
        }

        self.broadcast(MessageBody::Guess {
            player_id,
            guess: guess.clone(),
        });
        self.events.emit(SessionEvent::GuessScored { player_id, guess });
        self.publish_snapshot(&state);
        Ok(())
    }

    /// Peer-left and voluntary-leave handling. Only a `playing` player
    /// transitions; a finished player's record is already complete.
    fn mark_disconnected(&self, peer: PeerId) {
        let mut state = self.lock_state();

        let Some(i) = state.players.iter().position(|p| p.id == peer) else {
            return;
        };
        if state.players[i].status != PlayerStatus::Playing {
            return;
        }
        state.players[i].status = PlayerStatus::Disconnected;
        info!(game_id = %state.id, player = %state.players[i].name, "player disconnected");

        // The departed player no longer counts toward completion.
        if state.status == GameStatus::Playing && state.all_active_finished() {
            state.status = GameStatus::Finished;
            info!(game_id = %state.id, "game finished");
        }

        self.broadcast(MessageBody::PlayerLeft { player_id: peer });
        self.events.emit(SessionEvent::PlayerLeft(peer));
        self.publish_snapshot(&state);
    }

    fn terminate(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(game_id = %self.transport.game_id(), "terminating session");
        // Broadcasts `Terminated` and withdraws the session advertisement.
        self.transport.shutdown();
        self.events.emit(SessionEvent::Terminated);
    }
}

impl Session for HostSession {
    fn game_id(&self) -> GameId {
        self.inner.transport.game_id()
    }

    fn local_player_id(&self) -> PeerId {
        self.inner.transport.local_peer_id()
    }

    fn is_host(&self) -> bool {
        true
    }

    fn game_state(&self) -> Option<GameState> {
        Some(self.inner.lock_state().clone())
    }

    fn submit_guess(&self, word: &str) -> Result<(), SessionError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SessionError::HostTerminated);
        }
        self.inner
            .process_guess(self.inner.transport.local_peer_id(), word)
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
        self.inner.terminate();
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn connect_payload(&self) -> ConnectPayload {
        self.inner.transport.connect_payload()
    }
}
