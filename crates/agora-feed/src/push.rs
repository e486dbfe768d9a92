//! Live event delivery.
//!
//! A [`PushChannel`] hands events for a scope to whoever subscribed to it.
//! [`PushHub`] is the in-process implementation: the server publishes into
//! it after each store write, and both feed sessions and WebSocket clients
//! subscribe to it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use agora_shared::{FeedEvent, FeedScope};

/// Where a subscriber receives its events.
pub type EventSink = mpsc::UnboundedSender<FeedEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

pub trait PushChannel: Send + Sync {
    fn subscribe(&self, scope: &FeedScope, sink: EventSink) -> SubscriptionToken;

    /// Once this returns, nothing more is sent to the subscription's sink.
    fn unsubscribe(&self, token: SubscriptionToken);
}

#[derive(Default)]
struct Registry {
    next_token: u64,
    by_scope: HashMap<FeedScope, Vec<(SubscriptionToken, EventSink)>>,
    scopes: HashMap<SubscriptionToken, FeedScope>,
}

#[derive(Default)]
pub struct PushHub {
    registry: Mutex<Registry>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every subscriber of its scope. Returns how many
    /// sinks took it; sinks whose receiver is gone are dropped.
    pub fn publish(&self, event: &FeedEvent) -> usize {
        let mut registry = self.lock();
        let Registry {
            by_scope, scopes, ..
        } = &mut *registry;

        let Some(subscribers) = by_scope.get_mut(event.scope()) else {
            trace!(scope = %event.scope(), event = event.name(), "no subscribers");
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|(token, sink)| {
            if sink.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                scopes.remove(token);
                false
            }
        });
        if subscribers.is_empty() {
            by_scope.remove(event.scope());
        }

        debug!(scope = %event.scope(), event = event.name(), delivered, "event published");
        delivered
    }

    pub fn subscriber_count(&self, scope: &FeedScope) -> usize {
        self.lock().by_scope.get(scope).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // The registry stays consistent even if a holder panicked.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PushChannel for PushHub {
    fn subscribe(&self, scope: &FeedScope, sink: EventSink) -> SubscriptionToken {
        let mut registry = self.lock();
        registry.next_token += 1;
        let token = SubscriptionToken(registry.next_token);
        registry
            .by_scope
            .entry(scope.clone())
            .or_default()
            .push((token, sink));
        registry.scopes.insert(token, scope.clone());
        trace!(%scope, ?token, "subscribed");
        token
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let mut registry = self.lock();
        let Some(scope) = registry.scopes.remove(&token) else {
            return;
        };
        if let Some(subscribers) = registry.by_scope.get_mut(&scope) {
            subscribers.retain(|(t, _)| *t != token);
            if subscribers.is_empty() {
                registry.by_scope.remove(&scope);
            }
        }
        trace!(%scope, ?token, "unsubscribed");
    }
}
