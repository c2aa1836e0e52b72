//! Shared in-process broadcast bus, one channel per game id.
//!
//! The bus pairs the message channel with an advertisement record used
//! only to answer "does this session still have a live host": the host
//! refreshes it on a heartbeat, joiners reject advertisements older than
//! the expiry window. Graceful shutdown removes the advertisement
//! outright, so a crashed host is observed as stale within one window.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use game_types::{ConnectPayload, Envelope, GameId, MessageBody, MessageKind, PeerId};

use crate::{
    MessageHandler, PeerLeftHandler, SubscriptionToken, Subscriptions, Transport, TransportConfig,
    TransportError,
};

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum BusFrame {
    Wire(Envelope),
    PeerGone(PeerId),
}

struct BusSession {
    host: PeerId,
    tx: broadcast::Sender<BusFrame>,
    peers: HashSet<PeerId>,
    advert_refreshed: Instant,
}

/// The process-visible namespace that bus transports share. Transports
/// built from different networks cannot reach each other; this is the
/// medium's reachability boundary.
#[derive(Clone, Default)]
pub struct LocalBusNetwork {
    sessions: Arc<Mutex<HashMap<GameId, BusSession>>>,
}

impl LocalBusNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, game_id: &GameId, host: PeerId) -> Result<broadcast::Sender<BusFrame>, TransportError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(game_id) {
            return Err(TransportError::SessionExists(game_id.clone()));
        }
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        sessions.insert(
            game_id.clone(),
            BusSession {
                host,
                tx: tx.clone(),
                peers: HashSet::from([host]),
                advert_refreshed: Instant::now(),
            },
        );
        Ok(tx)
    }

    fn join(
        &self,
        game_id: &GameId,
        peer: PeerId,
        config: &TransportConfig,
    ) -> Result<broadcast::Sender<BusFrame>, TransportError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(game_id)
            .ok_or_else(|| TransportError::SessionNotFound(game_id.clone()))?;
        if session.advert_refreshed.elapsed() > config.advert_expiry {
            // Stale advertisement: the host went away without cleanup
            return Err(TransportError::SessionNotFound(game_id.clone()));
        }
        session.peers.insert(peer);
        Ok(session.tx.clone())
    }

    fn refresh_advert(&self, game_id: &GameId) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(game_id) {
            session.advert_refreshed = Instant::now();
        }
    }

    /// Removes the peer and announces its departure, exactly once.
    fn leave(&self, game_id: &GameId, peer: PeerId) {
        let tx = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions
                .get_mut(game_id)
                .and_then(|session| session.peers.remove(&peer).then(|| session.tx.clone()))
        };
        if let Some(tx) = tx {
            let _ = tx.send(BusFrame::PeerGone(peer));
        }
    }

    fn remove_session(&self, game_id: &GameId) {
        self.sessions.lock().unwrap().remove(game_id);
    }

    /// Whether a live host still advertises this game id.
    pub fn host_alive(&self, game_id: &GameId, config: &TransportConfig) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(game_id)
            .is_some_and(|s| s.advert_refreshed.elapsed() <= config.advert_expiry)
    }
}

pub struct LocalBusTransport {
    network: LocalBusNetwork,
    game_id: GameId,
    local: PeerId,
    host: bool,
    subs: Arc<Subscriptions>,
    tx: broadcast::Sender<BusFrame>,
    closed: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalBusTransport {
    /// Establish this process as host of a new session on the bus.
    pub async fn host(
        network: LocalBusNetwork,
        game_id: GameId,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let local = PeerId::new();
        let tx = network.create(&game_id, local)?;
        let transport = Self::build(network.clone(), game_id.clone(), local, true, tx);

        // Heartbeat-refresh the advertisement until shutdown
        let heartbeat = {
            let network = network.clone();
            let game_id = game_id.clone();
            let closed = transport.closed.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.advert_heartbeat);
                loop {
                    interval.tick().await;
                    if closed.load(Ordering::SeqCst) {
                        break;
                    }
                    network.refresh_advert(&game_id);
                }
            })
        };
        transport.tasks.lock().unwrap().push(heartbeat);
        Ok(transport)
    }

    /// Join an existing session. Fails with `SessionNotFound` when no
    /// live host advertises the game id.
    pub async fn join(
        network: LocalBusNetwork,
        game_id: GameId,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let local = PeerId::new();
        let tx = network.join(&game_id, local, &config)?;
        Ok(Self::build(network, game_id, local, false, tx))
    }

    fn build(
        network: LocalBusNetwork,
        game_id: GameId,
        local: PeerId,
        host: bool,
        tx: broadcast::Sender<BusFrame>,
    ) -> Self {
        let subs = Arc::new(Subscriptions::new());
        let transport = Self {
            network,
            game_id,
            local,
            host,
            subs: subs.clone(),
            tx: tx.clone(),
            closed: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        };

        let mut rx = tx.subscribe();
        let reader = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(BusFrame::Wire(envelope)) => {
                        if envelope.is_for(local) {
                            subs.dispatch(&envelope);
                        }
                    }
                    Ok(BusFrame::PeerGone(peer)) => {
                        if peer != local {
                            subs.dispatch_peer_left(peer);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("bus: peer {local} lagged, dropped {n} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("bus: reader for {local} stopped");
        });
        transport.tasks.lock().unwrap().push(reader);
        transport
    }

    fn send_frame(&self, to: Option<PeerId>, body: MessageBody) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let envelope = Envelope::new(self.local, to, body);
        // A send error only means nobody is listening; best effort
        let _ = self.tx.send(BusFrame::Wire(envelope));
        Ok(())
    }

    /// Tear down without any cleanup, as if the process had crashed.
    /// The advertisement record is left behind to go stale.
    pub fn abandon(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Transport for LocalBusTransport {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    fn game_id(&self) -> GameId {
        self.game_id.clone()
    }

    fn is_host(&self) -> bool {
        self.host
    }

    fn broadcast(&self, body: MessageBody) -> Result<(), TransportError> {
        self.send_frame(None, body)
    }

    fn send_to(&self, to: PeerId, body: MessageBody) -> Result<(), TransportError> {
        // No per-peer addressing on a broadcast bus: annotate the intended
        // recipient and let ingress filtering drop it elsewhere
        self.send_frame(Some(to), body)
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
        ConnectPayload::new(self.game_id.clone())
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.host {
            let _ = self
                .tx
                .send(BusFrame::Wire(Envelope::new(self.local, None, MessageBody::Terminated)));
            self.network.remove_session(&self.game_id);
        } else {
            self.network.leave(&self.game_id, self.local);
        }
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Drop for LocalBusTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
