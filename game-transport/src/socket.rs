//! Direct peer channel over WebSocket, star topology.
//!
//! The hosting process listens on a TCP port and answers incoming
//! connection offers; every other peer dials the host address embedded in
//! the connect payload. The host relays peer broadcasts so any message
//! reaches every member, preserving the original sender id. Per-peer
//! addressing is native: the host routes a directed envelope to its
//! target connection only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async};
use tracing::{debug, info, warn};

use game_types::{ConnectPayload, Envelope, GameId, MessageBody, MessageKind, PeerId};

use crate::{
    MessageHandler, PeerLeftHandler, SubscriptionToken, Subscriptions, Transport, TransportConfig,
    TransportError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum SocketFrame {
    /// Peer -> host, first frame on a new connection.
    Hello { game_id: GameId, peer: PeerId },
    /// Host -> peer, accepting the connection.
    HelloAck { host: PeerId },
    /// Host -> peer, rejecting the connection.
    Refused { message: String },
    Wire(Envelope),
}

impl SocketFrame {
    fn to_message(&self) -> Result<Message, TransportError> {
        Ok(Message::text(serde_json::to_string(self)?))
    }

    fn from_message(msg: &Message) -> Option<SocketFrame> {
        let text = msg.to_text().ok()?;
        serde_json::from_str(text).ok()
    }
}

type PeerSinks = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<Message>>>>;

enum RoleState {
    Host { peers: PeerSinks },
    Peer {
        outbox: Mutex<Option<mpsc::UnboundedSender<Message>>>,
        host_id: PeerId,
    },
}

pub struct SocketTransport {
    game_id: GameId,
    local: PeerId,
    offer: String,
    subs: Arc<Subscriptions>,
    closed: Arc<AtomicBool>,
    role: RoleState,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SocketTransport {
    /// Bind a listener and establish this process as session host.
    pub async fn host(game_id: GameId, config: TransportConfig) -> Result<Self, TransportError> {
        let local = PeerId::new();
        let listener = TcpListener::bind(&config.listen_addr).await?;
        let addr = listener.local_addr()?;
        let offer = format!("ws://{addr}");
        info!("hosting session {game_id} on {offer}");

        let subs = Arc::new(Subscriptions::new());
        let peers: PeerSinks = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let accept_loop = {
            let subs = subs.clone();
            let peers = peers.clone();
            let closed = closed.clone();
            let game_id = game_id.clone();
            tokio::spawn(async move {
                while let Ok((stream, remote)) = listener.accept().await {
                    debug!("incoming connection from {remote}");
                    let subs = subs.clone();
                    let peers = peers.clone();
                    let closed = closed.clone();
                    let game_id = game_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            host_connection(stream, game_id, local, subs, peers, closed).await
                        {
                            warn!("connection from {remote} ended with error: {e}");
                        }
                    });
                }
            })
        };

        Ok(Self {
            game_id,
            local,
            offer,
            subs,
            closed,
            role: RoleState::Host { peers },
            tasks: Mutex::new(vec![accept_loop]),
        })
    }

    /// Dial the host offer in the connect payload and join its session.
    pub async fn join(
        payload: ConnectPayload,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let offer = payload.offer.clone().ok_or_else(|| {
            TransportError::Handshake("connect payload carries no host offer".to_string())
        })?;
        let local = PeerId::new();

        let (mut ws, _) = connect_async(&offer)
            .await
            .map_err(|_| TransportError::SessionNotFound(payload.game_id.clone()))?;

        ws.send(
            SocketFrame::Hello {
                game_id: payload.game_id.clone(),
                peer: local,
            }
            .to_message()?,
        )
        .await?;

        // The host either acks or refuses; anything else means no live
        // host serves this game id
        let host_id = match timeout(config.join_timeout, ws.next()).await {
            Ok(Some(Ok(msg))) => match SocketFrame::from_message(&msg) {
                Some(SocketFrame::HelloAck { host }) => host,
                Some(SocketFrame::Refused { message }) => {
                    return Err(TransportError::Handshake(message));
                }
                _ => return Err(TransportError::SessionNotFound(payload.game_id)),
            },
            _ => return Err(TransportError::SessionNotFound(payload.game_id)),
        };

        let subs = Arc::new(Subscriptions::new());
        let closed = Arc::new(AtomicBool::new(false));
        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Message>();
        let (mut ws_sink, mut ws_stream) = ws.split();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbox_rx.recv().await {
                if ws_sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        let reader = {
            let subs = subs.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                while let Some(Ok(msg)) = ws_stream.next().await {
                    if let Some(SocketFrame::Wire(envelope)) = SocketFrame::from_message(&msg) {
                        if envelope.is_for(local) {
                            subs.dispatch(&envelope);
                        }
                    }
                }
                // The channel to the host is gone; unless we closed it
                // ourselves that is a host loss
                if !closed.load(Ordering::SeqCst) {
                    subs.dispatch_peer_left(host_id);
                }
            })
        };

        Ok(Self {
            game_id: payload.game_id,
            local,
            offer,
            subs,
            closed,
            role: RoleState::Peer {
                outbox: Mutex::new(Some(outbox_tx)),
                host_id,
            },
            tasks: Mutex::new(vec![writer, reader]),
        })
    }

    fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let msg = SocketFrame::Wire(envelope.clone()).to_message()?;
        match &self.role {
            RoleState::Host { peers } => {
                let peers = peers.lock().unwrap();
                match envelope.to {
                    Some(target) => {
                        if let Some(sink) = peers.get(&target) {
                            let _ = sink.send(msg);
                        }
                    }
                    None => {
                        for sink in peers.values() {
                            let _ = sink.send(msg.clone());
                        }
                    }
                }
            }
            RoleState::Peer { outbox, .. } => {
                // Everything goes through the host, which relays
                if let Some(out) = outbox.lock().unwrap().as_ref() {
                    let _ = out.send(msg);
                }
            }
        }
        Ok(())
    }
}

/// One accepted connection on the host side: handshake, then relay.
async fn host_connection(
    stream: TcpStream,
    game_id: GameId,
    host_id: PeerId,
    subs: Arc<Subscriptions>,
    peers: PeerSinks,
    closed: Arc<AtomicBool>,
) -> Result<(), TransportError> {
    let mut ws = accept_async(stream).await?;

    let peer_id = match ws.next().await {
        Some(Ok(msg)) => match SocketFrame::from_message(&msg) {
            Some(SocketFrame::Hello { game_id: offered, peer }) if offered == game_id => peer,
            _ => {
                let _ = ws
                    .send(
                        SocketFrame::Refused {
                            message: "unknown session".to_string(),
                        }
                        .to_message()?,
                    )
                    .await;
                return Ok(());
            }
        },
        _ => return Ok(()),
    };

    if closed.load(Ordering::SeqCst) {
        return Ok(());
    }

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Message>();
    peers.lock().unwrap().insert(peer_id, outbox_tx);
    ws.send(SocketFrame::HelloAck { host: host_id }.to_message()?)
        .await?;
    info!("peer {peer_id} connected to session {game_id}");

    let (mut ws_sink, mut ws_stream) = ws.split();

    let writer = async {
        while let Some(msg) = outbox_rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    };

    let reader = async {
        while let Some(Ok(msg)) = ws_stream.next().await {
            let Some(SocketFrame::Wire(envelope)) = SocketFrame::from_message(&msg) else {
                continue;
            };
            if envelope.is_for(host_id) {
                subs.dispatch(&envelope);
            }
            // Relay so a peer's broadcast reaches every other peer
            let relay = match envelope.to {
                None => SocketFrame::Wire(envelope.clone()).to_message().ok(),
                Some(target) if target != host_id => {
                    SocketFrame::Wire(envelope.clone()).to_message().ok()
                }
                Some(_) => None,
            };
            if let Some(relay_msg) = relay {
                let sinks = peers.lock().unwrap();
                match envelope.to {
                    None => {
                        for (id, sink) in sinks.iter() {
                            if *id != envelope.sender {
                                let _ = sink.send(relay_msg.clone());
                            }
                        }
                    }
                    Some(target) => {
                        if let Some(sink) = sinks.get(&target) {
                            let _ = sink.send(relay_msg);
                        }
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    // Surface the departure exactly once: only the task that actually
    // removes the sink reports it
    let was_present = peers.lock().unwrap().remove(&peer_id).is_some();
    if was_present && !closed.load(Ordering::SeqCst) {
        info!("peer {peer_id} disconnected");
        subs.dispatch_peer_left(peer_id);
    }
    Ok(())
}

impl Transport for SocketTransport {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    fn game_id(&self) -> GameId {
        self.game_id.clone()
    }

    fn is_host(&self) -> bool {
        matches!(self.role, RoleState::Host { .. })
    }

    fn broadcast(&self, body: MessageBody) -> Result<(), TransportError> {
        self.send_envelope(Envelope::new(self.local, None, body))
    }

    fn send_to(&self, to: PeerId, body: MessageBody) -> Result<(), TransportError> {
        self.send_envelope(Envelope::new(self.local, Some(to), body))
    }

    fn subscribe(&self, kind: MessageKind, handler: MessageHandler) -> SubscriptionToken {
        self.subs.subscribe(kind, handler)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.subs.unsubscribe(token);
    }

    fn on_peer_left(&self, handler: PeerLeftHandler) -> SubscriptionToken {
        self.subs.on_peer_left(handler)
    }

    fn connect_payload(&self) -> ConnectPayload {
        ConnectPayload::with_offer(self.game_id.clone(), self.offer.clone())
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.role {
            RoleState::Host { peers } => {
                // Queue a best-effort Terminated on every connection, then
                // drop the sinks so writers drain and close
                let terminated = SocketFrame::Wire(Envelope::new(
                    self.local,
                    None,
                    MessageBody::Terminated,
                ))
                .to_message();
                let mut peers = peers.lock().unwrap();
                if let Ok(msg) = terminated {
                    for sink in peers.values() {
                        let _ = sink.send(msg.clone());
                    }
                }
                peers.clear();
            }
            RoleState::Peer { outbox, .. } => {
                // Dropping the outbox lets the writer drain, close the
                // socket, and the host observe a peer-left
                outbox.lock().unwrap().take();
            }
        }
        if self.is_host() {
            // The accept loop never exits on its own; reader/writer tasks
            // end when their streams close
            for task in self.tasks.lock().unwrap().drain(..) {
                task.abort();
            }
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
