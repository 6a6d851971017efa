//! The explicitly constructed runtime context.
//!
//! One [`RuntimeContext`] is built at application start and passed to every
//! controller and widget factory. It owns the registry, the event hub and
//! the external collaborators (markup fetcher, asset loader, reactive binder).

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::assets::{AssetLoader, NoopAssetLoader};
use crate::binder::{PresentationBinder, ReactiveBinder};
use crate::config::RuntimeConfig;
use crate::error::WidgetError;
use crate::fetch::{Fetcher, StaticFetcher};
use crate::hub::{self, EventHub};
use crate::registry::{WidgetFactory, WidgetRegistry};
use crate::widget::{Widget, WidgetId};

/// Shared runtime handle (cheap to clone).
#[derive(Clone)]
pub struct RuntimeContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: RuntimeConfig,
    hub: EventHub,
    registry: WidgetRegistry,
    fetcher: Arc<dyn Fetcher>,
    assets: Arc<dyn AssetLoader>,
    binder: Arc<dyn ReactiveBinder>,
}

impl RuntimeContext {
    /// Context with the default collaborators.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn hub(&self) -> &EventHub {
        &self.inner.hub
    }

    pub fn registry(&self) -> &WidgetRegistry {
        &self.inner.registry
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.inner.fetcher.clone()
    }

    pub fn asset_loader(&self) -> Arc<dyn AssetLoader> {
        self.inner.assets.clone()
    }

    pub fn binder(&self) -> Arc<dyn ReactiveBinder> {
        self.inner.binder.clone()
    }

    /// Define and register a named widget.
    pub fn define<F>(&self, name: &str, init: F) -> WidgetFactory
    where
        F: Fn(&Widget, &EventHub) + Send + Sync + 'static,
    {
        let factory = WidgetFactory::new(Some(name), Arc::new(init));
        self.inner.registry.define(name, factory.clone());
        factory
    }

    /// Define a widget without a registry entry; the caller keeps the factory.
    pub fn define_anonymous<F>(&self, init: F) -> WidgetFactory
    where
        F: Fn(&Widget, &EventHub) + Send + Sync + 'static,
    {
        WidgetFactory::new(None, Arc::new(init))
    }

    /// Report a non-fatal failure: log it and publish it on the hub.
    pub fn report(&self, widget: Option<WidgetId>, err: &WidgetError) {
        match widget {
            Some(id) => crate::log!("error"; "widget {}: {}", id, error_chain(err)),
            None => crate::log!("error"; "{}", error_chain(err)),
        }
        let payload = json!({
            "widget": widget.map_or(Value::Null, |id| Value::from(id.get())),
            "kind": err.kind(),
            "message": error_chain(err),
        });
        self.inner.hub.trigger(hub::ERROR, &payload);
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`RuntimeContext`].
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    hub: EventHub,
    fetcher: Arc<dyn Fetcher>,
    assets: Arc<dyn AssetLoader>,
    binder: Arc<dyn ReactiveBinder>,
}

impl RuntimeBuilder {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            hub: EventHub::new(),
            fetcher: Arc::new(StaticFetcher::new()),
            assets: Arc::new(NoopAssetLoader),
            binder: Arc::new(PresentationBinder::new()),
        }
    }

    /// Share an existing hub.
    pub fn with_hub(mut self, hub: EventHub) -> Self {
        self.hub = hub;
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn with_assets(mut self, loader: impl AssetLoader + 'static) -> Self {
        self.assets = Arc::new(loader);
        self
    }

    pub fn with_binder(mut self, binder: impl ReactiveBinder + 'static) -> Self {
        self.binder = Arc::new(binder);
        self
    }

    pub fn build(self) -> RuntimeContext {
        let registry = WidgetRegistry::new(self.hub.clone(), self.config.registry.queue_unresolved);
        RuntimeContext {
            inner: Arc::new(ContextInner {
                config: self.config,
                hub: self.hub,
                registry,
                fetcher: self.fetcher,
                assets: self.assets,
                binder: self.binder,
            }),
        }
    }
}

/// Spawn fire-and-forget work on the ambient runtime.
///
/// Without a runtime the work is logged and dropped.
pub(crate) fn spawn_detached<F>(label: &str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(_) => crate::log!("error"; "no async runtime, {} skipped", label),
    }
}
