//! Name → factory registry.
//!
//! `define` announces a definition on [`hub::DEFINED`](crate::hub::DEFINED),
//! `request` announces the lookup on [`hub::NEEDED`](crate::hub::NEEDED) and
//! answers it from the store. Hits are answered synchronously. Misses fail
//! with [`WidgetError::UnknownWidget`] unless `registry.queue_unresolved` is
//! set, in which case the callback waits for the next matching `define`.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::json;

use crate::error::WidgetError;
use crate::hub::{self, EventHub};
use crate::runtime::RuntimeContext;
use crate::widget::Widget;

/// Per-definition initializer. Receives the fresh widget and the hub.
pub type Initializer = Arc<dyn Fn(&Widget, &EventHub) + Send + Sync>;

/// Creates fresh widget instances for one definition.
#[derive(Clone)]
pub struct WidgetFactory {
    name: Option<Arc<str>>,
    init: Initializer,
}

impl WidgetFactory {
    pub(crate) fn new(name: Option<&str>, init: Initializer) -> Self {
        Self {
            name: name.map(Arc::from),
            init,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Build and initialize a new instance. Instances are never shared.
    pub fn create(&self, ctx: &RuntimeContext) -> Widget {
        let widget = Widget::new(ctx.clone(), self.name.as_deref().map(str::to_string));
        (self.init)(&widget, ctx.hub());
        widget
    }
}

impl fmt::Debug for WidgetFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A resolved definition.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub factory: WidgetFactory,
}

/// Callback answering a request.
pub type Resolver = Box<dyn FnOnce(RegistryEntry) + Send>;

/// How a successful request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The callback already ran.
    Resolved,
    /// The callback runs on the next matching `define`.
    Queued,
}

/// Shared registry (cheap to clone).
#[derive(Clone)]
pub struct WidgetRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    entries: DashMap<String, WidgetFactory>,
    pending: Mutex<FxHashMap<String, Vec<Resolver>>>,
    queue_unresolved: bool,
    hub: EventHub,
}

impl WidgetRegistry {
    pub fn new(hub: EventHub, queue_unresolved: bool) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                pending: Mutex::new(FxHashMap::default()),
                queue_unresolved,
                hub,
            }),
        }
    }

    /// Register a definition. The last registration for a name wins.
    pub fn define(&self, name: &str, factory: WidgetFactory) {
        let replaced = self
            .inner
            .entries
            .insert(name.to_string(), factory.clone())
            .is_some();
        if replaced {
            crate::debug!("registry"; "redefined `{}`", name);
        } else {
            crate::debug!("registry"; "defined `{}`", name);
        }
        self.inner.hub.trigger(hub::DEFINED, &json!({ "name": name }));

        let waiting = self.inner.pending.lock().remove(name).unwrap_or_default();
        for resolve in waiting {
            resolve(RegistryEntry {
                name: name.to_string(),
                factory: factory.clone(),
            });
        }
    }

    /// Resolve `name`, calling `on_resolved` synchronously when it is defined.
    ///
    /// On a miss the callback is either dropped (the default) or queued.
    pub fn request(
        &self,
        name: &str,
        on_resolved: impl FnOnce(RegistryEntry) + Send + 'static,
    ) -> Result<Resolution, WidgetError> {
        self.inner.hub.trigger(hub::NEEDED, &json!({ "name": name }));

        // Guard dropped before the callback runs; it may define or request again
        let hit = self.lookup(name);
        if let Some(factory) = hit {
            on_resolved(RegistryEntry {
                name: name.to_string(),
                factory,
            });
            return Ok(Resolution::Resolved);
        }

        if self.inner.queue_unresolved {
            crate::debug!("registry"; "queued request for `{}`", name);
            self.inner
                .pending
                .lock()
                .entry(name.to_string())
                .or_default()
                .push(Box::new(on_resolved));
            return Ok(Resolution::Queued);
        }

        Err(WidgetError::UnknownWidget(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<WidgetFactory> {
        self.inner.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Requests waiting for a definition.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().values().map(Vec::len).sum()
    }
}
