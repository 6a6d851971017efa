use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::time::sleep;

use super::*;
use crate::binder::ViewContext;
use crate::config::{AttachPolicy, RuntimeConfig};
use crate::dom::{Document, ElementRef, NodeKind};
use crate::error::FetchError;
use crate::fetch::{FetchFuture, Fetcher};
use crate::hub;
use crate::runtime::RuntimeContext;

/// Serves pages after a fixed per-url delay.
#[derive(Default)]
struct DelayedPages(FxHashMap<String, (u64, String)>);

impl DelayedPages {
    fn page(mut self, url: &str, ms: u64, html: &str) -> Self {
        self.0.insert(url.to_string(), (ms, html.to_string()));
        self
    }
}

impl Fetcher for DelayedPages {
    fn get(&self, url: &str) -> FetchFuture {
        let page = self.0.get(url).cloned();
        let url = url.to_string();
        Box::pin(async move {
            match page {
                Some((ms, html)) => {
                    sleep(Duration::from_millis(ms)).await;
                    Ok(html)
                }
                None => Err(FetchError::NotFound(url)),
            }
        })
    }
}

fn runtime(policy: AttachPolicy, pages: DelayedPages) -> RuntimeContext {
    let mut config = RuntimeConfig::default();
    config.attach.policy = policy;
    RuntimeContext::builder(config).with_fetcher(pages).build()
}

fn mount(ctx: &RuntimeContext, body: &str) -> (Document, ElementRef, Vec<AttachmentController>) {
    let doc = Document::from_body_html(body);
    let root = ElementRef::new(doc.clone(), doc.body());
    let view = ViewContext::from_config(&ctx.config().markup);
    let controllers = scan(ctx, &root, &view);
    let host = ElementRef::new(doc.clone(), doc.element_by_id("host").unwrap_or(doc.body()));
    (doc, host, controllers)
}

async fn settle(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

const THREE_PARTIALS: &str = r#"<div class="card"><section data-partial="/a"></section><section data-partial="/b"></section><section data-partial="/c"></section></div>"#;

fn three_partials() -> DelayedPages {
    DelayedPages::default()
        .page("/a", 30, "<p>a</p>")
        .page("/b", 10, "<p>b</p>")
        .page("/c", 20, "<html><body><p>c</p></body></html>")
}

#[tokio::test(start_paused = true)]
async fn test_finish_waits_for_all_partials() {
    let ctx = runtime(AttachPolicy::Race, three_partials());
    ctx.define("card", |w, _| {
        w.set_content(THREE_PARTIALS);
    });
    let (doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-card=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    widget.start();
    settle(25).await;
    assert_eq!(controller.finish_count(), 0);
    assert!(widget.is_loading());

    settle(10).await;
    assert_eq!(controller.finish_count(), 1);
    assert!(!widget.is_loading());
    assert_eq!(
        doc.inner_html(host.id()),
        r#"<div class="card"><p>a</p><p>b</p><p>c</p></div>"#
    );

    settle(100).await;
    assert_eq!(controller.finish_count(), 1);
    assert!(controller.is_bound());
}

#[tokio::test(start_paused = true)]
async fn test_start_then_stop_before_fragment() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("empty", |_, _| {});
    let (_doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-empty=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    widget.start().stop();
    settle(1).await;

    assert!(!widget.is_running());
    assert!(!widget.is_visible());
    assert_eq!(widget.pending_fragment_waiters(), 0);
    assert_eq!(controller.finish_count(), 0);
    assert!(!host.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_waiting_sequence() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("empty", |_, _| {});
    let (_doc, _host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-empty=""></div>"#);
    let widget = controllers[0].widget().unwrap();

    widget.start();
    settle(1).await;
    assert_eq!(widget.pending_fragment_waiters(), 1);

    widget.stop();
    settle(1).await;
    assert_eq!(widget.pending_fragment_waiters(), 0);

    // Content arriving later has no visible effect while stopped
    widget.set_content("<p>late</p>");
    settle(1).await;
    assert_eq!(controllers[0].finish_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bootstrapped_markup_round_trip() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("hello", |_, _| {});
    let (doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-hello=""><p>hi</p></div>"#);
    let widget = controllers[0].widget().unwrap();

    assert_eq!(widget.content().as_deref(), Some("<p>hi</p>"));
    assert_eq!(widget.fragment().unwrap().to_html(), "<p>hi</p>");

    widget.start();
    settle(1).await;
    assert_eq!(doc.inner_html(host.id()), "<p>hi</p>");
    assert_eq!(widget.parse_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bind_places_marker_and_presentation_attrs() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("clock", |_, _| {});
    let (doc, host, controllers) =
        mount(&ctx, r#"<p>before</p><div id="host" data-widget-name="clock"></div>"#);
    let controller = &controllers[0];

    assert_eq!(controller.name(), "clock");
    assert_eq!(host.attr("data-widget-name"), None);
    assert_eq!(host.attr("rv-show").as_deref(), Some("widget:visible"));
    assert_eq!(host.attr("rv-class-loading").as_deref(), Some("widget:loading"));
    assert_eq!(host.attr("rv-class-disabled").as_deref(), Some("widget:disabled"));

    let body = doc.children(doc.body());
    let marker = controller.marker().unwrap();
    assert_eq!(body[1], marker);
    assert_eq!(doc.kind(marker), Some(NodeKind::Comment("widget".to_string())));
    assert_eq!(body[2], host.id());
}

#[tokio::test(start_paused = true)]
async fn test_restart_splices_after_marker() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("clock", |w, _| {
        w.set_content("<span>tick</span>");
    });
    let (doc, host, controllers) =
        mount(&ctx, r#"<div id="host" rv-widget-clock=""></div><p>after</p>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    widget.start();
    settle(1).await;
    widget.stop();
    assert!(!host.is_connected());
    assert!(!controller.is_bound());

    widget.start();
    settle(1).await;
    let body = doc.children(doc.body());
    assert_eq!(body, vec![controller.marker().unwrap(), host.id(), body[2]]);
    assert_eq!(doc.outer_html(body[2]), "<p>after</p>");
    assert_eq!(host.attr("hidden"), None);
    assert_eq!(controller.finish_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_owned_styles_follow_bind_cycles() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("styled", |w, _| {
        w.set_content("<b>x</b>").style(".styled { color: red }");
    });
    let (doc, _host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-styled=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    let installed = widget.owned_style_nodes();
    assert_eq!(doc.children(doc.head()), installed);

    widget.start();
    settle(1).await;
    widget.stop();
    assert!(installed.iter().all(|node| !doc.exists(*node)));
    assert!(doc.children(doc.head()).is_empty());

    widget.start();
    settle(1).await;
    assert_eq!(doc.children(doc.head()).len(), 1);

    let marker = controller.marker().unwrap();
    controller.destroy();
    assert!(doc.children(doc.head()).is_empty());
    assert!(!doc.exists(marker));
    assert!(controller.is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_flags_independent() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("flags", |w, _| {
        w.set_content("<i>f</i>");
    });
    let (doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-flags=""></div>"#);
    let widget = controllers[0].widget().unwrap();

    widget.start();
    settle(1).await;
    widget.disable();
    assert!(doc.has_class(host.id(), "disabled"));
    assert!(widget.is_running() && widget.is_visible());

    widget.hide();
    assert_eq!(host.attr("hidden").as_deref(), Some(""));
    assert!(widget.is_running());
    assert!(widget.is_disabled());
}

#[tokio::test(start_paused = true)]
async fn test_race_lets_stale_sequence_splice() {
    let pages = DelayedPages::default().page("/slow", 30, "<p>slow</p>");
    let ctx = runtime(AttachPolicy::Race, pages);
    ctx.define("slow", |w, _| {
        w.set_content(r#"<div data-partial="/slow"></div>"#);
    });
    let (_doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-slow=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    widget.start();
    settle(5).await;
    widget.stop();
    settle(40).await;

    // The sequence was past its fragment wait, so it still finishes
    assert_eq!(controller.finish_count(), 1);
    assert!(host.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_serialize_skips_splice_after_stop() {
    let pages = DelayedPages::default().page("/slow", 30, "<p>slow</p>");
    let ctx = runtime(AttachPolicy::Serialize, pages);
    ctx.define("slow", |w, _| {
        w.set_content(r#"<div data-partial="/slow"></div>"#);
    });
    let (_doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-slow=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    widget.start();
    settle(5).await;
    widget.stop();
    settle(40).await;

    assert_eq!(controller.sequence_count(), 1);
    assert_eq!(controller.finish_count(), 0);
    assert!(!host.is_connected());
    assert!(!controller.is_bound());
}

#[tokio::test(start_paused = true)]
async fn test_serialize_runs_sequences_in_order() {
    let pages = DelayedPages::default().page("/slow", 30, "<p>slow</p>");
    let ctx = runtime(AttachPolicy::Serialize, pages);
    ctx.define("slow", |w, _| {
        w.set_content(r#"<div data-partial="/slow"></div>"#);
    });
    let (_doc, _host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-slow=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    widget.start();
    settle(5).await;
    widget.stop();
    widget.start();
    settle(30).await;

    // The second sequence waits for the first one
    assert_eq!(controller.sequence_count(), 2);
    assert_eq!(controller.finish_count(), 1);

    settle(30).await;
    assert_eq!(controller.finish_count(), 2);
    assert!(controller.is_bound());
}

#[tokio::test(start_paused = true)]
async fn test_second_resolution_is_ignored() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    let first = ctx.define("card", |_, _| {});
    let (_doc, _host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-card=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();
    let other = ctx.define("card", |w, _| {
        w.set("other", true);
    });

    controller.resolve(crate::registry::RegistryEntry {
        name: "card".into(),
        factory: other,
    });
    assert!(controller.widget().unwrap().ptr_eq(&widget));
    assert_eq!(first.name(), Some("card"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_widget_is_reported_and_inert() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let k = kinds.clone();
    ctx.hub().on(hub::ERROR, move |v| k.lock().push(v["kind"].clone()));

    let (_doc, _host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-ghost=""></div>"#);
    assert!(controllers[0].widget().is_none());
    assert_eq!(*kinds.lock(), vec![Value::from("unknown-widget")]);

    // Without queueing, a later definition does not reach the controller
    ctx.define("ghost", |_, _| {});
    assert!(controllers[0].widget().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_attaches_on_define() {
    let mut config = RuntimeConfig::default();
    config.registry.queue_unresolved = true;
    let ctx = RuntimeContext::new(config);

    let (_doc, _host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-late=""></div>"#);
    assert!(controllers[0].widget().is_none());

    ctx.define("late", |_, _| {});
    assert!(controllers[0].widget().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_empty_name_stays_inert() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    let (_doc, host, controllers) = mount(&ctx, r#"<div id="host" data-widget-name=""></div>"#);
    assert_eq!(controllers.len(), 1);
    assert!(controllers[0].widget().is_none());
    assert!(controllers[0].marker().is_none());
    assert_eq!(host.attr("rv-show"), None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_partial_is_reported_and_still_finishes() {
    let pages = DelayedPages::default().page("/ok", 5, "<p>ok</p>");
    let ctx = runtime(AttachPolicy::Race, pages);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = errors.clone();
    ctx.hub().on(hub::ERROR, move |v| e.lock().push(v["message"].clone()));
    ctx.define("mixed", |w, _| {
        w.set_content(r#"<div data-partial="/ok"></div><div data-partial="/gone"></div>"#);
    });
    let (doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-mixed=""></div>"#);
    let widget = controllers[0].widget().unwrap();

    widget.start();
    settle(10).await;
    assert_eq!(controllers[0].finish_count(), 1);
    assert!(!widget.is_loading());
    assert_eq!(doc.inner_html(host.id()), "<p>ok</p><div></div>");
    assert_eq!(errors.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nested_widgets_share_vocabulary_and_cycle() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("outer", |w, _| {
        w.set_content(r#"<h1 rv-text="widget:title"></h1><div rv-widget-inner=""></div>"#)
            .set("title", "Outer");
    });
    ctx.define("inner", |w, _| {
        w.set_content(r#"<b rv-text="widget:title"></b>"#)
            .set("title", "Inner")
            .start();
    });
    let (doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-outer=""></div>"#);
    let outer = controllers[0].widget().unwrap();

    outer.start();
    settle(1).await;
    let children = controllers[0].children();
    assert_eq!(children.len(), 1);
    let inner = children[0].widget().unwrap();
    assert!(inner.is_installed());

    settle(1).await;
    assert_eq!(children[0].finish_count(), 1);
    let html = doc.inner_html(host.id());
    assert!(html.contains(">Outer</h1><!--widget--><div"), "{html}");
    assert!(html.contains(">Inner</b>"), "{html}");

    outer.stop();
    assert!(children[0].is_destroyed());
    assert!(!inner.is_installed());
    assert!(controllers[0].children().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hub_sees_attach_and_detach() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    for topic in [hub::ATTACHED, hub::DETACHED] {
        let s = seen.clone();
        ctx.hub().on(topic, move |v| {
            s.lock().push(format!("{topic} {}", v["name"].as_str().unwrap_or("")))
        });
    }
    ctx.define("clock", |w, _| {
        w.set_content("<i>t</i>");
    });
    let (_doc, _host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-clock=""></div>"#);
    let widget = controllers[0].widget().unwrap();

    widget.start();
    settle(1).await;
    widget.stop();
    assert_eq!(
        *seen.lock(),
        vec!["widget:attached clock", "widget:detached clock"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_template_fetch_feeds_waiting_sequence() {
    let pages = DelayedPages::default().page("/clock.html", 15, "<time>12:00</time>");
    let ctx = runtime(AttachPolicy::Race, pages);
    ctx.define("clock", |w, _| {
        w.template("/clock.html").start();
    });
    let (doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-clock=""></div>"#);

    settle(10).await;
    assert_eq!(controllers[0].finish_count(), 0);
    settle(10).await;
    assert_eq!(controllers[0].finish_count(), 1);
    assert_eq!(doc.inner_html(host.id()), "<time>12:00</time>");
}

#[tokio::test(start_paused = true)]
async fn test_destroy_takes_element_out_of_page() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    ctx.hub().on(hub::DETACHED, move |v| {
        s.lock().push(v["name"].as_str().unwrap_or("").to_string())
    });
    ctx.define("clock", |w, _| {
        w.set_content("<i>t</i>");
    });
    let (doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-clock=""></div>"#);
    let widget = controllers[0].widget().unwrap();

    widget.start();
    settle(1).await;
    assert!(host.is_connected());

    controllers[0].destroy();
    assert!(!host.is_connected());
    assert!(!widget.is_installed());
    assert!(!controllers[0].is_bound());
    assert_eq!(doc.inner_html(doc.body()), "");
    assert_eq!(*seen.lock(), vec!["clock"]);

    controllers[0].destroy();
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_abandons_sequence_waiting_for_fragment() {
    let ctx = runtime(AttachPolicy::Race, DelayedPages::default());
    ctx.define("late", |_, _| {});
    let (_doc, host, controllers) = mount(&ctx, r#"<div id="host" rv-widget-late=""></div>"#);
    let controller = &controllers[0];
    let widget = controller.widget().unwrap();

    widget.start();
    settle(1).await;
    assert_eq!(widget.pending_fragment_waiters(), 1);

    controller.destroy();
    settle(1).await;
    assert_eq!(widget.pending_fragment_waiters(), 0);

    widget.set_content("<p>late</p>");
    settle(1).await;
    assert_eq!(host.inner_html(), "");
    assert_eq!(controller.finish_count(), 0);
}
