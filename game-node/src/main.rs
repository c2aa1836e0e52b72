use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

use game_core::new_game_id;
use game_session::{
    FileNameStore, GameClient, HostSession, NameStore, PeerSession, Session, SessionEvent,
};
use game_transport::{SocketTransport, TransportConfig};
use game_types::{ConnectPayload, GameState, GameStatus, PeerId, PlayerStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let config = TransportConfig::new();

    let session: Arc<dyn Session> = match args.get(1).map(String::as_str) {
        Some("host") => {
            let (Some(secret), Some(name)) = (args.get(2), args.get(3)) else {
                usage();
            };
            let transport = Arc::new(SocketTransport::host(new_game_id(), config).await?);
            let session: Arc<dyn Session> = HostSession::create(transport, secret, name)?;
            session
        }
        Some("join") => {
            let (Some(data), Some(name)) = (args.get(2), args.get(3)) else {
                usage();
            };
            let payload = ConnectPayload::parse(data).context("invalid connection data")?;
            let transport = Arc::new(SocketTransport::join(payload, config).await?);
            let session: Arc<dyn Session> = PeerSession::join(transport, name, name_store())?;
            session
        }
        Some("rejoin") => {
            let Some(data) = args.get(2) else {
                usage();
            };
            let payload = ConnectPayload::parse(data).context("invalid connection data")?;
            let transport = Arc::new(SocketTransport::join(payload, config).await?);
            let session: Arc<dyn Session> = PeerSession::reconnect(transport, name_store())?;
            session
        }
        _ => usage(),
    };

    if session.is_host() {
        println!("Hosting game {}", session.game_id());
        println!(
            "Others join with: game-node join '{}' <name>",
            session.connect_payload().encode()
        );
    } else {
        info!(game_id = %session.game_id(), "joined game");
    }
    println!("Type a 5-letter word to guess, or /quit to leave.");

    let mut printer = tokio::spawn(print_events(session.clone(), session.subscribe()));
    let client = GameClient::new(session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let word = line.trim();
                        if word.is_empty() {
                            continue;
                        }
                        if word == "/quit" {
                            break;
                        }
                        if let Err(err) = client.submit_guess(word) {
                            println!("{err}");
                        }
                    }
                    None => break,
                }
            }
            _ = &mut printer => break,
            _ = shutdown_signal() => break,
        }
    }

    info!("shutting down");
    client.leave();
    Ok(())
}

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  game-node host <secret-word> <name>");
    eprintln!("  game-node join <connection-data> <name>");
    eprintln!("  game-node rejoin <connection-data>");
    std::process::exit(2);
}

fn name_store() -> Arc<dyn NameStore> {
    let path = env::var("NAME_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("game-node-names.json"));
    Arc::new(FileNameStore::new(path))
}

async fn print_events(
    session: Arc<dyn Session>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            SessionEvent::StateChanged(state) => {
                if state.status == GameStatus::Finished {
                    println!("Game over!");
                    print_leaderboard(&state);
                }
            }
            SessionEvent::PlayerJoined(player) => println!("{} joined", player.name),
            SessionEvent::PlayerLeft(id) => println!("{} left", name_of(&session, id)),
            SessionEvent::GuessScored { player_id, guess } => println!(
                "{} guessed {} ({} letters in common)",
                name_of(&session, player_id),
                guess.word,
                guess.common_letters
            ),
            SessionEvent::PlayerFinished {
                player_id,
                time_used,
            } => println!(
                "{} found the word in {}s",
                name_of(&session, player_id),
                time_used
            ),
            SessionEvent::Rejected(message) => println!("Rejected: {message}"),
            SessionEvent::Terminated => {
                println!("Session ended.");
                break;
            }
        }
    }
}

fn name_of(session: &Arc<dyn Session>, id: PeerId) -> String {
    session
        .game_state()
        .and_then(|s| s.player(id).map(|p| p.name.clone()))
        .unwrap_or_else(|| id.to_string())
}

fn print_leaderboard(state: &GameState) {
    let mut players: Vec<_> = state.players.iter().collect();
    players.sort_by_key(|p| (p.status != PlayerStatus::Finished, p.time_used));
    for (place, player) in players.iter().enumerate() {
        println!(
            "  {}. {} - {} guesses, {}s",
            place + 1,
            player.name,
            player.guesses.len(),
            player.time_used
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).unwrap();
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
