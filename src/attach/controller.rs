//! Per-element attachment controller.
//!
//! # Protocol
//!
//! ```text
//! bind ──► marker + presentation attrs ──► registry.request(name)
//!                                               │ (first resolution wins)
//!                                               ▼
//!                                  create ─► install ─► watch `running`
//!
//! running=true  ──► attach sequence:
//!     wait fragment ─► clone into element ─► fetch partials (fan-in)
//!         ─► finish: bind view, splice after marker, scan nested widgets
//!
//! running=false ──► unbind element: detach, unbind view, uninstall
//! ```
//!
//! A sequence still waiting for its fragment when the widget stops, or when
//! the controller is destroyed, is abandoned. Overlapping sequences follow
//! [`AttachPolicy`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, watch};

use super::declaration::Declaration;
use super::latch::CountDownLatch;
use super::scan::scan_within;
use crate::binder::{BindingHandle, ViewContext};
use crate::config::AttachPolicy;
use crate::dom::{ElementRef, Fragment, NodeId};
use crate::error::WidgetError;
use crate::hub;
use crate::registry::RegistryEntry;
use crate::runtime::{RuntimeContext, spawn_detached};
use crate::widget::{Change, ListenerId, Widget};

/// Binds one widget instance to one declaring element.
#[derive(Clone)]
pub struct AttachmentController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    ctx: RuntimeContext,
    element: ElementRef,
    name: String,
    view: ViewContext,
    policy: AttachPolicy,
    state: Mutex<ControllerState>,
    /// Flips to true once, on destroy.
    cancelled: watch::Sender<bool>,
    sequences: AtomicUsize,
    finishes: AtomicUsize,
}

#[derive(Default)]
struct ControllerState {
    marker: Option<NodeId>,
    widget: Option<Widget>,
    listener: Option<ListenerId>,
    bound_view: Option<Box<dyn BindingHandle>>,
    children: Vec<AttachmentController>,
    /// Start queue of the serializing driver.
    queue: Option<mpsc::UnboundedSender<()>>,
    destroyed: bool,
}

impl AttachmentController {
    /// Take over a declaring element and request its widget.
    ///
    /// An empty name leaves the controller inert.
    pub fn bind(ctx: &RuntimeContext, element: ElementRef, decl: Declaration, view: ViewContext) -> Self {
        let controller = Self {
            inner: Arc::new(ControllerInner {
                ctx: ctx.clone(),
                element,
                name: decl.name,
                view,
                policy: ctx.config().attach.policy,
                state: Mutex::new(ControllerState::default()),
                cancelled: watch::Sender::new(false),
                sequences: AtomicUsize::new(0),
                finishes: AtomicUsize::new(0),
            }),
        };
        if controller.inner.name.is_empty() {
            crate::debug!("attach"; "empty widget name on {:?}, ignored", controller.inner.element);
            return controller;
        }

        controller.place_marker(&decl.attribute);
        controller.request();
        controller
    }

    fn place_marker(&self, declaration: &str) {
        let inner = &self.inner;
        let doc = inner.element.document();
        let el = inner.element.id();
        let markup = &inner.ctx.config().markup;

        if doc.parent(el).is_some() {
            let marker = doc.create_comment(&markup.marker);
            doc.insert_before(el, marker);
            inner.state.lock().marker = Some(marker);
        } else {
            crate::debug!("attach"; "`{}` declared on a detached element, no marker", inner.name);
        }

        doc.remove_attr(el, declaration);
        doc.set_attr(el, &markup.attr("show"), "widget:visible");
        doc.set_attr(el, &markup.attr("class-loading"), "widget:loading");
        doc.set_attr(el, &markup.attr("class-disabled"), "widget:disabled");
    }

    fn request(&self) {
        let weak = Arc::downgrade(&self.inner);
        let outcome = self.inner.ctx.registry().request(&self.inner.name, move |entry| {
            if let Some(inner) = weak.upgrade() {
                AttachmentController { inner }.resolve(entry);
            }
        });
        if let Err(err) = outcome {
            self.inner.ctx.report(None, &err);
        }
    }

    /// Registry answer. Only the first one creates a widget.
    pub fn resolve(&self, entry: RegistryEntry) {
        {
            let state = self.inner.state.lock();
            if state.widget.is_some() || state.destroyed {
                crate::debug!("attach"; "`{}` already resolved, ignoring", entry.name);
                return;
            }
        }

        let widget = entry.factory.create(&self.inner.ctx);
        {
            let mut state = self.inner.state.lock();
            if state.widget.is_some() || state.destroyed {
                return;
            }
            state.widget = Some(widget.clone());
            if self.inner.policy == AttachPolicy::Serialize {
                state.queue = Some(self.spawn_driver());
            }
        }

        widget.install(self.inner.element.clone());

        let weak = Arc::downgrade(&self.inner);
        let listener = widget.subscribe(move |widget, change| {
            let Change::Running(running) = change else {
                return;
            };
            if let Some(inner) = weak.upgrade() {
                AttachmentController { inner }.on_running(widget, *running);
            }
        });
        self.inner.state.lock().listener = Some(listener);
        crate::debug!("attach"; "`{}` resolved to widget {}", entry.name, widget.id());

        if widget.is_running() {
            self.on_running(&widget, true);
        }
    }

    fn on_running(&self, widget: &Widget, running: bool) {
        if !running {
            self.unbind_element();
            return;
        }
        if !widget.is_installed() {
            widget.rehost(self.inner.element.clone());
        }
        match self.inner.policy {
            AttachPolicy::Race => {
                let controller = self.clone();
                spawn_detached("attach sequence", async move {
                    controller.attach_sequence().await;
                });
            }
            AttachPolicy::Serialize => {
                let queue = self.inner.state.lock().queue.clone();
                if let Some(queue) = queue {
                    let _ = queue.send(());
                }
            }
        }
    }

    /// Driver running queued attach sequences one at a time.
    fn spawn_driver(&self) -> mpsc::UnboundedSender<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
        spawn_detached("attach driver", async move {
            while rx.recv().await.is_some() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                AttachmentController { inner }.attach_sequence().await;
            }
        });
        tx
    }

    // =========================================================================
    // Attach sequence
    // =========================================================================

    async fn attach_sequence(&self) {
        let Some(widget) = self.widget() else {
            return;
        };
        let seq = self.inner.sequences.fetch_add(1, Ordering::Relaxed) + 1;
        let mut running = widget.watch_running();
        let mut cancelled = self.inner.cancelled.subscribe();

        let fragment = tokio::select! {
            biased;
            _ = cancelled.wait_for(|cancelled| *cancelled) => {
                crate::debug!("attach"; "`{}` destroyed, sequence {} abandoned", self.inner.name, seq);
                return;
            }
            _ = stopped(&mut running) => {
                crate::debug!("attach"; "widget {} stopped before its fragment, sequence {} abandoned", widget.id(), seq);
                return;
            }
            fragment = widget.ensure_fragment() => fragment,
        };
        let Some(fragment) = fragment else {
            return;
        };
        if self.is_destroyed() {
            return;
        }

        let doc = self.inner.element.document();
        let el = self.inner.element.id();
        doc.clear_children(el);
        doc.append_fragment(el, &fragment);

        let view = self.inner.view.merged_for(&widget);
        self.resolve_partials(&widget).await;

        if self.is_destroyed() {
            return;
        }
        if self.inner.policy == AttachPolicy::Serialize && !widget.is_running() {
            crate::debug!("attach"; "widget {} stopped during sequence {}, not spliced", widget.id(), seq);
            return;
        }
        self.finish(&widget, view);
    }

    /// Replace every partial placeholder present now with its fetched body.
    async fn resolve_partials(&self, widget: &Widget) {
        let attribute = &self.inner.ctx.config().markup.partial_attribute;
        let doc = self.inner.element.document();
        let placeholders = doc.query_attr(self.inner.element.id(), attribute);
        if placeholders.is_empty() {
            return;
        }

        let _load = widget.track_load();
        let latch = CountDownLatch::new(placeholders.len());
        for node in placeholders {
            let url = doc.attr(node, attribute).unwrap_or_default();
            let fetch = self.inner.ctx.fetcher().get(&url);
            let doc = doc.clone();
            let ctx = self.inner.ctx.clone();
            let latch = latch.clone();
            let id = widget.id();
            let attribute = attribute.clone();
            tokio::spawn(async move {
                match fetch.await {
                    Ok(html) => {
                        doc.replace_with_fragment(node, &Fragment::parse(&html).into_body());
                    }
                    Err(source) => {
                        doc.remove_attr(node, &attribute);
                        ctx.report(Some(id), &WidgetError::Fetch { url, source });
                    }
                }
                latch.count_down();
            });
        }
        latch.wait().await;
    }

    fn finish(&self, widget: &Widget, view: ViewContext) {
        let element = &self.inner.element;
        let handle = self
            .inner
            .ctx
            .binder()
            .bind(element, &view.models, &view.options);

        let (previous, old_children, marker) = {
            let mut state = self.inner.state.lock();
            (
                state.bound_view.replace(handle),
                std::mem::take(&mut state.children),
                state.marker,
            )
        };
        if let Some(mut previous) = previous {
            previous.unbind();
        }
        for child in old_children {
            child.destroy();
        }

        if let Some(marker) = marker {
            element.document().insert_after(marker, element.id());
        }
        crate::debug_do! {
            let html = element.outer_html();
            crate::debug!("attach"; "spliced {}", html);
        }

        let children = scan_within(&self.inner.ctx, element, &view);
        self.inner.state.lock().children.extend(children);

        let count = self.inner.finishes.fetch_add(1, Ordering::Relaxed) + 1;
        crate::debug!("attach"; "`{}` attached (widget {}, finish {})", self.inner.name, widget.id(), count);
        self.inner.ctx.hub().trigger(
            hub::ATTACHED,
            &json!({ "name": self.inner.name, "widget": widget.id().get() }),
        );
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Detach the element and release everything bound to it for this cycle.
    fn unbind_element(&self) {
        let (handle, children, widget) = {
            let mut state = self.inner.state.lock();
            (
                state.bound_view.take(),
                std::mem::take(&mut state.children),
                state.widget.clone(),
            )
        };

        self.inner.element.document().detach(self.inner.element.id());
        if let Some(mut handle) = handle {
            handle.unbind();
        }
        for child in children {
            child.destroy();
        }

        let Some(widget) = widget else {
            return;
        };
        if widget.is_installed()
            && let Err(err) = widget.uninstall()
        {
            self.inner.ctx.report(Some(widget.id()), &err);
        }
        crate::debug!("attach"; "`{}` detached (widget {})", self.inner.name, widget.id());
        self.inner.ctx.hub().trigger(
            hub::DETACHED,
            &json!({ "name": self.inner.name, "widget": widget.id().get() }),
        );
    }

    /// Permanently release the controller: its widget, view, nested
    /// controllers and marker. The element leaves the document.
    pub fn destroy(&self) {
        let state = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            let taken = std::mem::take(&mut *state);
            state.destroyed = true;
            taken
        };
        self.inner.cancelled.send_replace(true);

        self.inner.element.document().detach(self.inner.element.id());
        if let Some(mut handle) = state.bound_view {
            handle.unbind();
        }
        for child in state.children {
            child.destroy();
        }
        if let Some(widget) = state.widget {
            if let Some(listener) = state.listener {
                widget.unsubscribe(listener);
            }
            if widget.is_installed() {
                if let Err(err) = widget.uninstall() {
                    self.inner.ctx.report(Some(widget.id()), &err);
                }
                self.inner.ctx.hub().trigger(
                    hub::DETACHED,
                    &json!({ "name": self.inner.name, "widget": widget.id().get() }),
                );
            }
            crate::debug!("attach"; "`{}` destroyed (widget {})", self.inner.name, widget.id());
        }
        if let Some(marker) = state.marker {
            self.inner.element.document().remove(marker);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn element(&self) -> &ElementRef {
        &self.inner.element
    }

    pub fn widget(&self) -> Option<Widget> {
        self.inner.state.lock().widget.clone()
    }

    pub fn marker(&self) -> Option<NodeId> {
        self.inner.state.lock().marker
    }

    /// Whether a reactive view is currently bound.
    pub fn is_bound(&self) -> bool {
        self.inner.state.lock().bound_view.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Controllers of widgets nested in the attached content.
    pub fn children(&self) -> Vec<AttachmentController> {
        self.inner.state.lock().children.clone()
    }

    /// Attach sequences started so far.
    pub fn sequence_count(&self) -> usize {
        self.inner.sequences.load(Ordering::Relaxed)
    }

    /// Completed `finish` steps so far.
    pub fn finish_count(&self) -> usize {
        self.inner.finishes.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AttachmentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentController")
            .field("name", &self.inner.name)
            .field("element", &self.inner.element)
            .field("widget", &self.widget().map(|w| w.id()))
            .finish()
    }
}

/// Resolves once the watched flag is false.
async fn stopped(running: &mut watch::Receiver<bool>) {
    // A closed channel means the widget is gone, which also ends the wait
    let _ = running.wait_for(|running| !*running).await;
}
