use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use game_session::{
    GameClient, HostSession, MemoryNameStore, NameStore, PeerSession, Session, SessionError,
    SessionEvent,
};
use game_transport::{LocalBusNetwork, LocalBusTransport, Transport, TransportConfig};
use game_types::{
    ConnectPayload, Envelope, ErrorReason, GameStatus, MASKED_WORD, MessageBody, MessageKind,
    Player, PlayerStatus,
};

const GAME: &str = "ab12cd";

fn test_config() -> TransportConfig {
    TransportConfig {
        advert_heartbeat: Duration::from_millis(20),
        advert_expiry: Duration::from_millis(200),
        listen_addr: "127.0.0.1:0".to_string(),
        join_timeout: Duration::from_secs(1),
    }
}

async fn host_transport(network: &LocalBusNetwork) -> Arc<LocalBusTransport> {
    Arc::new(
        LocalBusTransport::host(network.clone(), GAME.to_string(), test_config())
            .await
            .unwrap(),
    )
}

async fn peer_transport(network: &LocalBusNetwork) -> Arc<LocalBusTransport> {
    Arc::new(
        LocalBusTransport::join(network.clone(), GAME.to_string(), test_config())
            .await
            .unwrap(),
    )
}

/// Poll until a condition on session state holds. Used where the
/// triggering action happens before an event receiver can exist.
async fn wait_until(mut pred: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !pred() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if pred(&event) {
            return event;
        }
    }
}

async fn expect_no_event(rx: &mut broadcast::Receiver<SessionEvent>) {
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "expected no event"
    );
}

/// Alice hosting "HOUSE" with Bob admitted and the game running.
async fn started_game() -> (
    LocalBusNetwork,
    Arc<HostSession>,
    Arc<PeerSession>,
    Arc<LocalBusTransport>,
    Arc<MemoryNameStore>,
) {
    let network = LocalBusNetwork::new();
    let alice = HostSession::create(host_transport(&network).await, "HOUSE", "Alice").unwrap();

    let store = Arc::new(MemoryNameStore::new());
    let bob_transport = peer_transport(&network).await;
    let bob = PeerSession::join(bob_transport.clone(), "Bob", store.clone()).unwrap();

    wait_until(|| bob.game_state().is_some_and(|s| s.status == GameStatus::Playing)).await;
    (network, alice, bob, bob_transport, store)
}

#[tokio::test]
async fn test_create_validates_secret_and_name() {
    let network = LocalBusNetwork::new();
    let transport = host_transport(&network).await;

    assert!(matches!(
        HostSession::create(transport.clone(), "HOUSES", "Alice"),
        Err(SessionError::Validation(_))
    ));
    assert!(matches!(
        HostSession::create(transport.clone(), "h0use", "Alice"),
        Err(SessionError::Validation(_))
    ));
    assert!(matches!(
        HostSession::create(transport.clone(), "HOUSE", "   "),
        Err(SessionError::Validation(_))
    ));

    let session = HostSession::create(transport, "house", "Alice").unwrap();
    let state = session.game_state().unwrap();
    assert_eq!(state.secret_word, "HOUSE"); // stored normalized
    assert_eq!(state.status, GameStatus::Waiting);
    assert_eq!(state.players.len(), 1);
    assert_eq!(state.start_time, None);
}

#[tokio::test]
async fn test_full_game_flow() {
    let (_network, alice, bob, _bob_transport, _store) = started_game().await;

    let start = alice.game_state().unwrap();
    assert_eq!(start.status, GameStatus::Playing);
    assert!(start.start_time.is_some());
    assert_eq!(start.players.len(), 2);

    // Bob guesses a near miss
    let mut bob_rx = bob.subscribe();
    bob.submit_guess("mouse").unwrap();
    let event = wait_for(&mut bob_rx, |e| matches!(e, SessionEvent::GuessScored { .. })).await;
    let SessionEvent::GuessScored { player_id, guess } = event else {
        unreachable!()
    };
    assert_eq!(player_id, bob.local_player_id());
    assert_eq!(guess.word, "MOUSE");
    assert_eq!(guess.common_letters, 4);

    wait_until(|| {
        bob.game_state()
            .is_some_and(|s| s.player(bob.local_player_id()).is_some_and(|p| p.guesses.len() == 1))
    })
    .await;
    assert_eq!(
        alice
            .game_state()
            .unwrap()
            .player(bob.local_player_id())
            .unwrap()
            .status,
        PlayerStatus::Playing
    );

    // Bob finds the word; Alice is still playing, so the game stays open
    bob.submit_guess("HOUSE").unwrap();
    let event = wait_for(&mut bob_rx, |e| matches!(e, SessionEvent::PlayerFinished { .. })).await;
    let SessionEvent::PlayerFinished { player_id, .. } = event else {
        unreachable!()
    };
    assert_eq!(player_id, bob.local_player_id());

    wait_until(|| {
        bob.game_state().is_some_and(|s| {
            s.player(bob.local_player_id())
                .is_some_and(|p| p.status == PlayerStatus::Finished)
        })
    })
    .await;
    assert_eq!(alice.game_state().unwrap().status, GameStatus::Playing);

    // Alice finishes too and the game is over
    alice.submit_guess("HOUSE").unwrap();
    assert_eq!(alice.game_state().unwrap().status, GameStatus::Finished);
    wait_until(|| bob.game_state().is_some_and(|s| s.status == GameStatus::Finished)).await;
}

#[tokio::test]
async fn test_peer_snapshots_never_contain_secret() {
    let (_network, _alice, bob, _bob_transport, _store) = started_game().await;

    bob.submit_guess("ARROW").unwrap();
    wait_until(|| {
        bob.game_state()
            .is_some_and(|s| s.player(bob.local_player_id()).is_some_and(|p| !p.guesses.is_empty()))
    })
    .await;

    let snapshot = bob.game_state().unwrap();
    assert_eq!(snapshot.secret_word, MASKED_WORD);
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(!json.contains("HOUSE"));
}

#[tokio::test]
async fn test_duplicate_name_rejected_case_sensitively() {
    let network = LocalBusNetwork::new();
    let alice = HostSession::create(host_transport(&network).await, "HOUSE", "Alice").unwrap();

    let store = Arc::new(MemoryNameStore::new());
    let impostor_transport = peer_transport(&network).await;
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<Envelope>();
    impostor_transport.subscribe(
        MessageKind::Error,
        Arc::new(move |envelope| {
            let _ = err_tx.send(envelope);
        }),
    );
    let _impostor =
        PeerSession::join(impostor_transport.clone(), "Alice", store.clone()).unwrap();

    let rejection = timeout(Duration::from_secs(2), err_rx.recv())
        .await
        .expect("timed out waiting for rejection")
        .unwrap();
    assert!(matches!(
        rejection.body,
        MessageBody::Error {
            reason: ErrorReason::NameTaken,
            ..
        }
    ));
    assert_eq!(alice.game_state().unwrap().players.len(), 1);

    // Different case is a different name
    let lowercase = PeerSession::join(peer_transport(&network).await, "alice", store).unwrap();
    wait_until(|| lowercase.game_state().is_some_and(|s| s.players.len() == 2)).await;
}

#[tokio::test]
async fn test_admitting_same_peer_id_twice_is_rejected() {
    let (network, alice, _bob, _bob_transport, _store) = started_game().await;

    let raw = peer_transport(&network).await;
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<Envelope>();
    raw.subscribe(
        MessageKind::Error,
        Arc::new(move |envelope| {
            let _ = err_tx.send(envelope);
        }),
    );

    let player = Player::new(raw.local_peer_id(), "Carol".to_string());
    raw.broadcast(MessageBody::JoinRequest {
        player: player.clone(),
    })
    .unwrap();
    wait_until(|| alice.game_state().unwrap().players.len() == 3).await;

    raw.broadcast(MessageBody::JoinRequest { player }).unwrap();
    let rejection = timeout(Duration::from_secs(2), err_rx.recv())
        .await
        .expect("timed out waiting for rejection")
        .unwrap();
    assert!(matches!(
        rejection.body,
        MessageBody::Error {
            reason: ErrorReason::AlreadyJoined,
            ..
        }
    ));
    assert_eq!(alice.game_state().unwrap().players.len(), 3);
}

#[tokio::test]
async fn test_game_starts_exactly_once() {
    let (network, alice, _bob, _bob_transport, store) = started_game().await;
    let started_at = alice.game_state().unwrap().start_time;
    assert!(started_at.is_some());

    // A third player does not restart the clock
    let carol = PeerSession::join(peer_transport(&network).await, "Carol", store).unwrap();
    wait_until(|| carol.game_state().is_some_and(|s| s.players.len() == 3)).await;

    let state = alice.game_state().unwrap();
    assert_eq!(state.status, GameStatus::Playing);
    assert_eq!(state.start_time, started_at);
}

#[tokio::test]
async fn test_guess_after_finished_is_noop() {
    let (_network, alice, bob, _bob_transport, _store) = started_game().await;

    bob.submit_guess("HOUSE").unwrap();
    wait_until(|| {
        bob.game_state().is_some_and(|s| {
            s.player(bob.local_player_id())
                .is_some_and(|p| p.status == PlayerStatus::Finished)
        })
    })
    .await;

    let mut alice_rx = alice.subscribe();
    bob.submit_guess("MOUSE").unwrap();
    expect_no_event(&mut alice_rx).await;

    let record = alice
        .game_state()
        .unwrap()
        .player(bob.local_player_id())
        .unwrap()
        .clone();
    assert_eq!(record.guesses.len(), 1);
    assert_eq!(record.status, PlayerStatus::Finished);
}

#[tokio::test]
async fn test_malformed_guess_reported_to_caller_only() {
    let (_network, alice, bob, _bob_transport, _store) = started_game().await;

    // Peers validate locally and send nothing
    assert!(matches!(
        bob.submit_guess("HO"),
        Err(SessionError::Validation(_))
    ));
    // So does the host
    assert!(matches!(
        alice.submit_guess("h0use"),
        Err(SessionError::Validation(_))
    ));
    assert!(
        alice
            .game_state()
            .unwrap()
            .players
            .iter()
            .all(|p| p.guesses.is_empty())
    );
}

#[tokio::test]
async fn test_malformed_remote_guess_gets_directed_error() {
    let (network, alice, _bob, _bob_transport, _store) = started_game().await;

    // A raw peer that skips local validation
    let raw = peer_transport(&network).await;
    let (err_tx, mut err_rx) = mpsc::unbounded_channel::<Envelope>();
    raw.subscribe(
        MessageKind::Error,
        Arc::new(move |envelope| {
            let _ = err_tx.send(envelope);
        }),
    );
    raw.broadcast(MessageBody::JoinRequest {
        player: Player::new(raw.local_peer_id(), "Carol".to_string()),
    })
    .unwrap();
    wait_until(|| alice.game_state().unwrap().players.len() == 3).await;

    raw.broadcast(MessageBody::SubmitGuess {
        player_id: raw.local_peer_id(),
        word: "h0use".to_string(),
    })
    .unwrap();

    let rejection = timeout(Duration::from_secs(2), err_rx.recv())
        .await
        .expect("timed out waiting for rejection")
        .unwrap();
    assert_eq!(rejection.to, Some(raw.local_peer_id()));
    assert!(matches!(
        rejection.body,
        MessageBody::Error {
            reason: ErrorReason::InvalidWord,
            ..
        }
    ));
    // Nothing was recorded
    assert!(
        alice
            .game_state()
            .unwrap()
            .players
            .iter()
            .all(|p| p.guesses.is_empty())
    );
}

#[tokio::test]
async fn test_disconnected_player_excluded_from_completion() {
    let (_network, alice, bob, bob_transport, _store) = started_game().await;

    bob.submit_guess("MOUSE").unwrap();
    wait_until(|| {
        alice
            .game_state()
            .unwrap()
            .player(bob.local_player_id())
            .is_some_and(|p| p.guesses.len() == 1)
    })
    .await;

    // Abrupt loss, no goodbye
    let bob_id = bob.local_player_id();
    bob_transport.shutdown();
    wait_until(|| {
        alice
            .game_state()
            .unwrap()
            .player(bob_id)
            .is_some_and(|p| p.status == PlayerStatus::Disconnected)
    })
    .await;

    // History is retained
    let record = alice.game_state().unwrap().player(bob_id).unwrap().clone();
    assert_eq!(record.guesses.len(), 1);
    assert_eq!(record.guesses[0].word, "MOUSE");

    // Bob no longer counts toward completion
    alice.submit_guess("HOUSE").unwrap();
    assert_eq!(alice.game_state().unwrap().status, GameStatus::Finished);
}

#[tokio::test]
async fn test_reconnect_resumes_player_record() {
    let (network, alice, bob, bob_transport, store) = started_game().await;

    bob.submit_guess("MOUSE").unwrap();
    wait_until(|| {
        alice
            .game_state()
            .unwrap()
            .player(bob.local_player_id())
            .is_some_and(|p| p.guesses.len() == 1)
    })
    .await;

    let old_id = bob.local_player_id();
    bob_transport.shutdown();
    wait_until(|| {
        alice
            .game_state()
            .unwrap()
            .player(old_id)
            .is_some_and(|p| p.status == PlayerStatus::Disconnected)
    })
    .await;

    let rejoined_transport = peer_transport(&network).await;
    let rejoined = PeerSession::reconnect(rejoined_transport, store).unwrap();
    wait_until(|| {
        rejoined.game_state().is_some_and(|s| {
            s.player(rejoined.local_player_id())
                .is_some_and(|p| p.status == PlayerStatus::Playing)
        })
    })
    .await;

    let snapshot = rejoined.game_state().unwrap();
    // Resumed, not duplicated, under the new peer id
    assert_eq!(snapshot.players.len(), 2);
    let me = snapshot.player(rejoined.local_player_id()).unwrap();
    assert_eq!(me.name, "Bob");
    assert_eq!(me.guesses.len(), 1);
    assert!(snapshot.player(old_id).is_none());
}

#[tokio::test]
async fn test_reconnect_without_record_fails() {
    let (network, _alice, _bob, _bob_transport, _store) = started_game().await;

    let fresh_store = Arc::new(MemoryNameStore::new());
    let transport = peer_transport(&network).await;
    assert!(matches!(
        PeerSession::reconnect(transport, fresh_store),
        Err(SessionError::CannotReconnect(_))
    ));
}

#[tokio::test]
async fn test_host_leave_terminates_peers() {
    let (_network, alice, bob, _bob_transport, _store) = started_game().await;

    let mut bob_rx = bob.subscribe();
    alice.leave();

    wait_for(&mut bob_rx, |e| matches!(e, SessionEvent::Terminated)).await;
    assert!(bob.game_state().is_none());
    assert!(matches!(
        bob.submit_guess("MOUSE"),
        Err(SessionError::HostTerminated)
    ));
}

#[tokio::test]
async fn test_peer_leave_forgets_name_and_announces() {
    let (_network, alice, bob, _bob_transport, store) = started_game().await;

    let bob_id = bob.local_player_id();
    let mut alice_rx = alice.subscribe();
    bob.leave();

    wait_for(
        &mut alice_rx,
        |e| matches!(e, SessionEvent::PlayerLeft(id) if *id == bob_id),
    )
    .await;
    assert_eq!(
        alice.game_state().unwrap().player(bob_id).unwrap().status,
        PlayerStatus::Disconnected
    );
    assert_eq!(store.recall(&GAME.to_string()), None);
}

#[tokio::test]
async fn test_client_facade() {
    let network = LocalBusNetwork::new();
    let alice = HostSession::create(host_transport(&network).await, "HOUSE", "Alice").unwrap();

    let client = GameClient::new(alice);
    assert!(client.is_host());
    assert_eq!(client.local_player().unwrap().name, "Alice");
    assert_eq!(client.elapsed_seconds(), 0);

    let payload = ConnectPayload::parse(&client.shareable_connection_data()).unwrap();
    assert_eq!(payload.game_id, GAME);

    client.submit_guess("mouse").unwrap();
    let me = client.local_player().unwrap();
    assert_eq!(me.guesses.len(), 1);
    assert_eq!(me.guesses[0].common_letters, 4);
}
