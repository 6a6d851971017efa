//! Process-wide publish/subscribe hub.
//!
//! Widgets receive the hub in their initializer and use it to talk to each
//! other. The runtime itself publishes lifecycle notifications on the
//! `widget:*` topics below.
//!
//! Handlers run synchronously inside [`EventHub::trigger`], after the
//! subscriber list has been snapshotted, so a handler may freely subscribe,
//! unsubscribe or trigger again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A widget definition was registered. Payload: `{"name": ..}`.
pub const DEFINED: &str = "widget:defined";
/// A widget name was requested. Payload: `{"name": ..}`.
pub const NEEDED: &str = "widget:needed";
/// A widget subtree was bound and spliced in. Payload: `{"name": .., "widget": id}`.
pub const ATTACHED: &str = "widget:attached";
/// A widget subtree was detached. Payload: `{"name": .., "widget": id}`.
pub const DETACHED: &str = "widget:detached";
/// A non-fatal failure was reported. Payload: `{"widget": .., "kind": .., "message": ..}`.
pub const ERROR: &str = "widget:error";

/// Event handler.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Subscription handle returned by [`EventHub::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct HubInner {
    topics: FxHashMap<String, Vec<Subscriber>>,
}

/// Shared event hub (cheap to clone).
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<RwLock<HubInner>>,
    next_id: Arc<AtomicU64>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic.
    pub fn on(&self, topic: &str, handler: impl Fn(&Value) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribe(topic, false, Arc::new(handler))
    }

    /// Subscribe for the next event on a topic only.
    pub fn once(
        &self,
        topic: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(topic, true, Arc::new(handler))
    }

    fn subscribe(&self, topic: &str, once: bool, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .write()
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber { id, once, handler });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        let mut removed = false;
        for subscribers in inner.topics.values_mut() {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            removed |= subscribers.len() != before;
        }
        inner.topics.retain(|_, subs| !subs.is_empty());
        removed
    }

    /// Publish an event to every subscriber of `topic`, in subscription order.
    pub fn trigger(&self, topic: &str, payload: &Value) {
        let handlers: Vec<Handler> = {
            let mut inner = self.inner.write();
            let Some(subscribers) = inner.topics.get_mut(topic) else {
                return;
            };
            let handlers = subscribers.iter().map(|s| s.handler.clone()).collect();
            subscribers.retain(|s| !s.once);
            if subscribers.is_empty() {
                inner.topics.remove(topic);
            }
            handlers
        };

        for handler in handlers {
            handler(payload);
        }
    }

    /// Number of live subscriptions on a topic.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner.read().topics.get(topic).map_or(0, Vec::len)
    }
}
