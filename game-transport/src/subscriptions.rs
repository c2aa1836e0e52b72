use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use game_types::{Envelope, MessageKind, PeerId};

use crate::{MessageHandler, PeerLeftHandler};

/// Opaque handle returned by `subscribe`, used to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Handler registry shared by both media. Media feed inbound envelopes
/// through [`Subscriptions::dispatch`] after filtering self-echo and
/// unintended recipients; handlers run on the medium's dispatch task,
/// one at a time, in arrival order.
#[derive(Default)]
pub struct Subscriptions {
    next_token: AtomicU64,
    handlers: Mutex<HashMap<MessageKind, Vec<(SubscriptionToken, MessageHandler)>>>,
    peer_left: Mutex<Vec<(SubscriptionToken, PeerLeftHandler)>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> SubscriptionToken {
        SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe(&self, kind: MessageKind, handler: MessageHandler) -> SubscriptionToken {
        let token = self.next();
        let mut handlers = self.handlers.lock().unwrap();
        handlers.entry(kind).or_default().push((token, handler));
        token
    }

    pub fn on_peer_left(&self, handler: PeerLeftHandler) -> SubscriptionToken {
        let token = self.next();
        self.peer_left.lock().unwrap().push((token, handler));
        token
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut handlers = self.handlers.lock().unwrap();
        for list in handlers.values_mut() {
            list.retain(|(t, _)| *t != token);
        }
        drop(handlers);
        self.peer_left.lock().unwrap().retain(|(t, _)| *t != token);
    }

    /// Invoke every handler registered for the envelope's kind. Handlers
    /// are cloned out of the lock first so one may subscribe/unsubscribe
    /// without deadlocking.
    pub fn dispatch(&self, envelope: &Envelope) {
        let handlers: Vec<MessageHandler> = {
            let map = self.handlers.lock().unwrap();
            map.get(&envelope.kind())
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(envelope.clone());
        }
    }

    pub fn dispatch_peer_left(&self, peer: PeerId) {
        let handlers: Vec<PeerLeftHandler> = {
            let list = self.peer_left.lock().unwrap();
            list.iter().map(|(_, h)| h.clone()).collect()
        };
        for handler in handlers {
            handler(peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_types::MessageBody;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn terminated_envelope() -> Envelope {
        Envelope::new(PeerId::new(), None, MessageBody::Terminated)
    }

    #[test]
    fn test_dispatch_by_kind() {
        let subs = Subscriptions::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        subs.subscribe(
            MessageKind::Terminated,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        subs.subscribe(MessageKind::State, Arc::new(|_| panic!("wrong kind")));

        subs.dispatch(&terminated_envelope());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_handler() {
        let subs = Subscriptions::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let token = subs.subscribe(
            MessageKind::Terminated,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        subs.dispatch(&terminated_envelope());
        subs.unsubscribe(token);
        subs.dispatch(&terminated_envelope());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_peer_left_tokens_are_independent() {
        let subs = Subscriptions::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let token = subs.on_peer_left(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        subs.dispatch_peer_left(PeerId::new());
        subs.unsubscribe(token);
        subs.dispatch_peer_left(PeerId::new());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
