//! The observable widget record.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;

use super::change::{Change, Listener, ListenerId, Listeners};
use super::{Lifecycle, WidgetId};
use crate::assets::{AssetReport, load_all};
use crate::content::{ContentCache, Ensure};
use crate::dom::{ElementRef, Fragment, NodeId};
use crate::error::WidgetError;
use crate::runtime::{RuntimeContext, spawn_detached};

/// Shared handle to one widget instance.
#[derive(Clone)]
pub struct Widget {
    inner: Arc<WidgetInner>,
}

struct WidgetInner {
    id: WidgetId,
    name: Option<String>,
    ctx: RuntimeContext,
    props: Mutex<Props>,
    listeners: Mutex<Listeners>,
    running_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Props {
    installed: bool,
    has_run: bool,
    content: Option<String>,
    cache: ContentCache,
    running: bool,
    visible: bool,
    loading: bool,
    /// Background loads in flight; `loading` clears when this drops to zero.
    loads: usize,
    disabled: bool,
    host: Option<ElementRef>,
    /// Stylesheets the widget asked for; materialized while installed.
    styles: Vec<String>,
    owned_styles: Vec<NodeId>,
    attributes: FxHashMap<String, Value>,
}

impl Widget {
    pub(crate) fn new(ctx: RuntimeContext, name: Option<String>) -> Self {
        let (running_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(WidgetInner {
                id: WidgetId::next(),
                name,
                ctx,
                props: Mutex::new(Props::default()),
                listeners: Mutex::new(Listeners::default()),
                running_tx,
            }),
        }
    }

    pub fn id(&self) -> WidgetId {
        self.inner.id
    }

    /// Definition name; `None` for anonymous definitions.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.inner.ctx
    }

    pub fn ptr_eq(&self, other: &Widget) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// Observation
// =============================================================================

impl Widget {
    /// Listen to every change of this widget, in the order they happen.
    pub fn subscribe(&self, listener: impl Fn(&Widget, &Change) + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.lock().add(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Receiver tracking the `running` flag.
    pub fn watch_running(&self) -> watch::Receiver<bool> {
        self.inner.running_tx.subscribe()
    }

    /// Apply a mutation and notify listeners about what it changed.
    ///
    /// Listeners run after the lock is released.
    fn update(&self, mutate: impl FnOnce(&mut Props) -> Vec<Change>) {
        let changes = {
            let mut props = self.inner.props.lock();
            mutate(&mut props)
        };
        self.emit(&changes);
    }

    fn emit(&self, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }
        for change in changes {
            if let Change::Running(running) = change {
                self.inner.running_tx.send_replace(*running);
            }
            let listeners: Vec<Listener> = self.inner.listeners.lock().snapshot();
            for listener in listeners {
                listener(self, change);
            }
        }
    }
}

// =============================================================================
// Flags
// =============================================================================

macro_rules! flag_setter {
    ($(#[$doc:meta])* $name:ident, $field:ident, $variant:ident, $value:expr) => {
        $(#[$doc])*
        pub fn $name(&self) -> &Self {
            self.update(|p| {
                if p.$field == $value {
                    return Vec::new();
                }
                p.$field = $value;
                vec![Change::$variant($value)]
            });
            self
        }
    };
}

impl Widget {
    /// Set `running` then `visible`. Listeners observe both, in that order.
    pub fn start(&self) -> &Self {
        self.update(|p| {
            if p.running {
                return Vec::new();
            }
            p.running = true;
            p.has_run = true;
            vec![Change::Running(true)]
        });
        self.show()
    }

    /// Clear `running` then `visible`.
    pub fn stop(&self) -> &Self {
        self.update(|p| {
            if !p.running {
                return Vec::new();
            }
            p.running = false;
            vec![Change::Running(false)]
        });
        self.hide()
    }

    flag_setter!(show, visible, Visible, true);
    flag_setter!(hide, visible, Visible, false);
    flag_setter!(enable, disabled, Disabled, false);
    flag_setter!(disable, disabled, Disabled, true);
    flag_setter!(
        /// Mark an in-flight fetch or load.
        loading, loading, Loading, true
    );
    flag_setter!(loaded, loading, Loading, false);

    pub fn is_running(&self) -> bool {
        self.inner.props.lock().running
    }

    pub fn is_visible(&self) -> bool {
        self.inner.props.lock().visible
    }

    pub fn is_loading(&self) -> bool {
        self.inner.props.lock().loading
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.props.lock().disabled
    }

    pub fn is_installed(&self) -> bool {
        self.inner.props.lock().installed
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let props = self.inner.props.lock();
        match (props.installed, props.running, props.has_run) {
            (false, _, _) => Lifecycle::Uninstalled,
            (true, true, _) => Lifecycle::Running,
            (true, false, true) => Lifecycle::Stopped,
            (true, false, false) => Lifecycle::Installed,
        }
    }
}

// =============================================================================
// Model attributes
// =============================================================================

impl Widget {
    /// Set a model attribute. Equal values are not a change.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> &Self {
        let value = value.into();
        self.update(|p| {
            if p.attributes.get(key) == Some(&value) {
                return Vec::new();
            }
            p.attributes.insert(key.to_string(), value);
            vec![Change::Attribute(key.to_string())]
        });
        self
    }

    /// Read a property by binding key: lifecycle flags, `content`, or a model attribute.
    pub fn get(&self, key: &str) -> Option<Value> {
        let props = self.inner.props.lock();
        match key {
            "running" => Some(Value::Bool(props.running)),
            "visible" => Some(Value::Bool(props.visible)),
            "loading" => Some(Value::Bool(props.loading)),
            "disabled" => Some(Value::Bool(props.disabled)),
            "content" => props.content.clone().map(Value::String),
            _ => props.attributes.get(key).cloned(),
        }
    }
}

// =============================================================================
// Content
// =============================================================================

impl Widget {
    pub fn content(&self) -> Option<String> {
        self.inner.props.lock().content.clone()
    }

    /// The fragment derived from the current content, if any.
    pub fn fragment(&self) -> Option<Arc<Fragment>> {
        self.inner.props.lock().cache.fragment()
    }

    /// Replace the content; the fragment is re-derived once, right away.
    pub fn set_content(&self, html: impl Into<String>) -> &Self {
        let html = html.into();
        self.update(|p| {
            if p.content.as_deref() == Some(html.as_str()) {
                return Vec::new();
            }
            p.cache.invalidate();
            p.cache.derive(&html);
            p.content = Some(html);
            vec![Change::Content, Change::Fragment]
        });
        self
    }

    /// Wait until a fragment exists for the current content.
    ///
    /// Resolves immediately when one is cached. Returns `None` only if the
    /// widget is dropped while waiting.
    pub async fn ensure_fragment(&self) -> Option<Arc<Fragment>> {
        let pending = self.inner.props.lock().cache.ensure();
        match pending {
            Ensure::Ready(fragment) => Some(fragment),
            Ensure::Pending(rx) => rx.await.ok(),
        }
    }

    /// Waiters still registered for the first fragment.
    pub fn pending_fragment_waiters(&self) -> usize {
        self.inner.props.lock().cache.pending_waiters()
    }

    /// How often content was parsed into a fragment.
    pub fn parse_count(&self) -> usize {
        self.inner.props.lock().cache.parse_count()
    }

    /// Fetch markup from `source` in the background and make it the content.
    ///
    /// Overlapping calls are not cancelled: whichever fetch completes last
    /// wins.
    pub fn template(&self, source: &str) -> &Self {
        let widget = self.clone();
        let source = source.to_string();
        spawn_detached("template", async move {
            // Failures are already reported
            let _ = widget.fetch_template(&source).await;
        });
        self
    }

    /// Awaitable form of [`template`](Self::template).
    pub async fn fetch_template(&self, source: &str) -> Result<(), WidgetError> {
        let fetch = self.inner.ctx.fetcher().get(source);
        match fetch.await {
            Ok(html) => {
                self.set_content(html);
                Ok(())
            }
            Err(source_err) => {
                let err = WidgetError::Fetch {
                    url: source.to_string(),
                    source: source_err,
                };
                self.inner.ctx.report(Some(self.id()), &err);
                Err(err)
            }
        }
    }
}

/// Ends one tracked load when dropped.
pub(crate) struct LoadGuard {
    widget: Widget,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let last = {
            let mut props = self.widget.inner.props.lock();
            props.loads = props.loads.saturating_sub(1);
            props.loads == 0
        };
        if last {
            self.widget.loaded();
        }
    }
}

// =============================================================================
// Assets and styles
// =============================================================================

impl Widget {
    /// Load assets in the background, then call `on_ready` with the report.
    pub fn assets<F>(&self, ids: &[&str], on_ready: F) -> &Self
    where
        F: FnOnce(AssetReport) + Send + 'static,
    {
        let widget = self.clone();
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        spawn_detached("assets", async move {
            let report = widget.load_assets(&ids).await;
            on_ready(report);
        });
        self
    }

    /// Load assets concurrently. `loading` is set for the duration and
    /// cleared whatever the outcome; each failure is reported.
    pub async fn load_assets(&self, ids: &[String]) -> AssetReport {
        let _load = self.track_load();
        let loader = self.inner.ctx.asset_loader();
        let report = load_all(loader.as_ref(), ids).await;
        for (id, reason) in &report.failed {
            let err = WidgetError::Asset {
                id: id.clone(),
                reason: reason.clone(),
            };
            self.inner.ctx.report(Some(self.id()), &err);
        }
        report
    }

    /// Count one background load. The first sets `loading`; dropping the
    /// last guard clears it.
    pub(crate) fn track_load(&self) -> LoadGuard {
        let first = {
            let mut props = self.inner.props.lock();
            props.loads += 1;
            props.loads == 1
        };
        if first {
            self.loading();
        }
        LoadGuard {
            widget: self.clone(),
        }
    }

    /// Own a stylesheet. It lives in the document head while installed.
    pub fn style(&self, css: &str) -> &Self {
        let host = {
            let mut props = self.inner.props.lock();
            props.styles.push(css.to_string());
            props.host.clone().filter(|_| props.installed)
        };
        if let Some(host) = host {
            let node = inject_style(&host, css);
            self.inner.props.lock().owned_styles.push(node);
        }
        self
    }

    /// Style nodes currently owned by this widget.
    pub fn owned_style_nodes(&self) -> Vec<NodeId> {
        self.inner.props.lock().owned_styles.clone()
    }

    fn materialize_styles(&self, host: &ElementRef) {
        let styles = self.inner.props.lock().styles.clone();
        let nodes: Vec<NodeId> = styles.iter().map(|css| inject_style(host, css)).collect();
        self.inner.props.lock().owned_styles.extend(nodes);
    }
}

fn inject_style(host: &ElementRef, css: &str) -> NodeId {
    let doc = host.document();
    let node = doc.create_element("style");
    doc.set_text(node, css);
    doc.append_child(doc.head(), node);
    node
}

// =============================================================================
// Install / uninstall
// =============================================================================

impl Widget {
    pub fn host(&self) -> Option<ElementRef> {
        self.inner.props.lock().host.clone()
    }

    /// Attach to a host element. Existing child markup seeds the content.
    pub fn install(&self, element: ElementRef) -> &Self {
        let seed = element.has_children().then(|| element.inner_html());
        self.inner.props.lock().host = Some(element.clone());
        if let Some(html) = seed {
            self.set_content(html);
        }
        self.mark_installed(&element);
        self
    }

    /// Install again for a new bind cycle, without re-reading the host's markup.
    pub(crate) fn rehost(&self, element: ElementRef) -> &Self {
        self.inner.props.lock().host = Some(element.clone());
        self.mark_installed(&element);
        self
    }

    fn mark_installed(&self, element: &ElementRef) {
        let was_installed = std::mem::replace(&mut self.inner.props.lock().installed, true);
        if was_installed {
            crate::debug!("widget"; "widget {} installed twice, host replaced", self.id());
            return;
        }
        self.materialize_styles(element);
        self.emit(&[Change::Installed]);
    }

    /// Release owned style nodes and the host element.
    ///
    /// Valid once per install; a second call is a caller error.
    pub fn uninstall(&self) -> Result<&Self, WidgetError> {
        let (host, nodes) = {
            let mut props = self.inner.props.lock();
            if !props.installed {
                return Err(WidgetError::AlreadyUninstalled(self.id()));
            }
            props.installed = false;
            (props.host.take(), std::mem::take(&mut props.owned_styles))
        };
        if let Some(host) = host {
            for node in nodes {
                host.document().remove(node);
            }
        }
        self.emit(&[Change::Uninstalled]);
        Ok(self)
    }
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props = self.inner.props.lock();
        f.debug_struct("Widget")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("installed", &props.installed)
            .field("running", &props.running)
            .field("visible", &props.visible)
            .field("loading", &props.loading)
            .field("disabled", &props.disabled)
            .finish()
    }
}
