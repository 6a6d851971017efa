//! Built-in binder for the presentation attributes the controller writes.
//!
//! | Attribute                   | Effect                                  |
//! |-----------------------------|-----------------------------------------|
//! | `<prefix>-show="m:key"`     | `hidden` attribute while the value is falsy |
//! | `<prefix>-class-<c>="m:key"`| class `c` while the value is truthy     |
//! | `<prefix>-text="m:key"`     | text content                            |
//! | `<prefix>-<routine>="m:key"`| custom routine from [`BindOptions::binders`] |
//!
//! A keypath is `model<sep>key` with `:` or `.` (or an adapter's separator),
//! optionally followed by `| formatter` stages. Elements declaring a nested
//! widget are skipped together with their subtree: they get their own view.

use std::sync::Arc;

use serde_json::Value;

use super::{BindOptions, BindingHandle, Formatter, Model, ModelSet, ReactiveBinder, Routine};
use crate::dom::{Document, ElementRef, NodeId, NodeKind};
use crate::widget::{Change, ListenerId, Widget};

/// Default [`ReactiveBinder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PresentationBinder;

impl PresentationBinder {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone)]
enum Directive {
    Show,
    Class(String),
    Text,
    Routine(Routine),
}

#[derive(Clone)]
struct Binding {
    element: ElementRef,
    directive: Directive,
    model: String,
    separator: Option<char>,
    key: String,
    formatters: Vec<Formatter>,
}

impl Binding {
    fn apply(&self, value: Option<Value>) {
        let value = self
            .formatters
            .iter()
            .fold(value.unwrap_or(Value::Null), |v, f| f(&v));
        let doc = self.element.document();
        let id = self.element.id();
        match &self.directive {
            Directive::Show => {
                if truthy(&value) {
                    doc.remove_attr(id, "hidden");
                } else {
                    doc.set_attr(id, "hidden", "");
                }
            }
            Directive::Class(class) => doc.toggle_class(id, class, truthy(&value)),
            Directive::Text => doc.set_text(id, &display(&value)),
            Directive::Routine(routine) => routine(&self.element, &value),
        }
    }
}

impl ReactiveBinder for PresentationBinder {
    fn bind(
        &self,
        element: &ElementRef,
        models: &ModelSet,
        options: &BindOptions,
    ) -> Box<dyn BindingHandle> {
        let mut bindings = Vec::new();
        collect(element.document(), element.id(), true, options, &mut bindings);

        for binding in &bindings {
            binding.apply(read(models, options, binding));
        }

        // One listener per widget model, covering all of its bindings
        let mut subscriptions = Vec::new();
        for (name, model) in models {
            let Model::Widget(widget) = model else {
                continue;
            };
            let watched: Vec<Binding> = bindings.iter().filter(|b| &b.model == name).cloned().collect();
            if watched.is_empty() {
                continue;
            }
            let watched = Arc::new(watched);
            let id = widget.subscribe(move |widget, change| follow(&watched, widget, change));
            subscriptions.push((widget.clone(), id));
        }

        crate::debug!("bind"; "{} bindings on {:?}", bindings.len(), element);
        Box::new(PresentationHandle { subscriptions })
    }
}

fn follow(bindings: &[Binding], widget: &Widget, change: &Change) {
    let key = change.key();
    for binding in bindings.iter().filter(|b| b.key == key) {
        binding.apply(widget.get(key));
    }
}

/// Handle releasing the widget subscriptions of one bind call.
struct PresentationHandle {
    subscriptions: Vec<(Widget, ListenerId)>,
}

impl BindingHandle for PresentationHandle {
    fn unbind(&mut self) {
        for (widget, id) in self.subscriptions.drain(..) {
            widget.unsubscribe(id);
        }
    }
}

impl Drop for PresentationHandle {
    fn drop(&mut self) {
        self.unbind();
    }
}

// =============================================================================
// Discovery
// =============================================================================

fn collect(doc: &Document, node: NodeId, is_root: bool, options: &BindOptions, out: &mut Vec<Binding>) {
    let Some(NodeKind::Element { attrs, .. }) = doc.kind(node) else {
        return;
    };
    if !is_root && attrs.iter().any(|(name, _)| options.config.is_declaration(name)) {
        return;
    }

    let element = ElementRef::new(doc.clone(), node);
    for (name, value) in &attrs {
        if let Some(binding) = parse_binding(&element, name, value, options) {
            out.push(binding);
        }
    }
    for child in doc.children(node) {
        collect(doc, child, false, options, out);
    }
}

fn parse_binding(element: &ElementRef, attr: &str, value: &str, options: &BindOptions) -> Option<Binding> {
    let suffix = attr
        .strip_prefix(options.config.prefix.as_str())?
        .strip_prefix('-')?;
    let directive = match suffix {
        "show" => Directive::Show,
        "text" => Directive::Text,
        _ => match suffix.strip_prefix("class-") {
            Some(class) if !class.is_empty() => Directive::Class(class.to_string()),
            _ => Directive::Routine(options.binders.get(suffix)?.clone()),
        },
    };

    let mut stages = value.split('|').map(str::trim);
    let keypath = stages.next().unwrap_or_default();
    let (model, separator, key) = split_keypath(keypath, options);
    let formatters = stages
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let formatter = options.formatters.get(name).cloned();
            if formatter.is_none() {
                crate::debug!("bind"; "unknown formatter `{}` in {}", name, attr);
            }
            formatter
        })
        .collect();

    Some(Binding {
        element: element.clone(),
        directive,
        model: model.to_string(),
        separator,
        key: key.to_string(),
        formatters,
    })
}

/// Split `model<sep>key` at the first separator. A bare name has an empty key.
fn split_keypath<'a>(keypath: &'a str, options: &BindOptions) -> (&'a str, Option<char>, &'a str) {
    let is_separator = |c: char| {
        c == ':' || c == '.' || options.adapters.contains_key(c.to_string().as_str())
    };
    match keypath.char_indices().find(|(_, c)| is_separator(*c)) {
        Some((i, c)) => (&keypath[..i], Some(c), &keypath[i + c.len_utf8()..]),
        None => (keypath, None, ""),
    }
}

fn read(models: &ModelSet, options: &BindOptions, binding: &Binding) -> Option<Value> {
    let model = models.get(&binding.model)?;
    let Model::Value(value) = model else {
        return model.get(&binding.key);
    };
    if binding.key.is_empty() {
        return Some(value.clone());
    }
    let adapter = binding
        .separator
        .and_then(|sep| options.adapters.get(sep.to_string().as_str()));
    match adapter {
        Some(adapter) => adapter(value, &binding.key),
        None => model.get(&binding.key),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::ViewContext;
    use crate::config::RuntimeConfig;
    use crate::runtime::RuntimeContext;
    use serde_json::json;

    fn setup(body: &str) -> (RuntimeContext, Document, ElementRef, Widget) {
        let ctx = RuntimeContext::new(RuntimeConfig::default());
        let doc = Document::from_body_html(body);
        let host = ElementRef::new(doc.clone(), doc.element_by_id("host").unwrap_or(doc.body()));
        let widget = ctx.define_anonymous(|_, _| {}).create(&ctx);
        (ctx, doc, host, widget)
    }

    #[test]
    fn test_presentation_attributes_follow_widget() {
        let (ctx, doc, host, widget) = setup(
            r#"<div id="host" rv-show="widget:visible" rv-class-loading="widget:loading" rv-class-disabled="widget:disabled"></div>"#,
        );
        let view = ViewContext::from_config(&ctx.config().markup).merged_for(&widget);
        let mut handle = PresentationBinder.bind(&host, &view.models, &view.options);

        assert_eq!(host.attr("hidden").as_deref(), Some(""));
        widget.start().loading().disable();
        assert_eq!(host.attr("hidden"), None);
        assert!(doc.has_class(host.id(), "loading"));
        assert!(doc.has_class(host.id(), "disabled"));

        widget.loaded();
        assert!(!doc.has_class(host.id(), "loading"));

        handle.unbind();
        assert_eq!(widget.listener_count(), 0);
        widget.stop();
        assert_eq!(host.attr("hidden"), None);
    }

    #[test]
    fn test_text_binding_with_formatter_and_value_model() {
        let (ctx, doc, host, widget) = setup(
            r#"<div id="host"><h1 rv-text="widget:title | upper"></h1><p rv-text="page.name"></p></div>"#,
        );
        let mut view = ViewContext::from_config(&ctx.config().markup)
            .with_model("page", Model::Value(json!({"name": "Home"})))
            .merged_for(&widget);
        view.options = view.options.with_formatter("upper", |v| {
            Value::from(display(v).to_uppercase())
        });

        widget.set("title", "clock");
        let _handle = PresentationBinder.bind(&host, &view.models, &view.options);
        assert_eq!(
            doc.inner_html(host.id()),
            r#"<h1 rv-text="widget:title | upper">CLOCK</h1><p rv-text="page.name">Home</p>"#
        );

        widget.set("title", "timer");
        assert_eq!(doc.text_content(host.id()), "TIMERHome");
    }

    #[test]
    fn test_nested_declarations_are_skipped() {
        let (ctx, doc, host, widget) = setup(
            r#"<div id="host"><span rv-text="widget:title"></span><div rv-widget-inner=""><i rv-text="widget:title"></i></div></div>"#,
        );
        let view = ViewContext::from_config(&ctx.config().markup).merged_for(&widget);
        widget.set("title", "outer");
        let _handle = PresentationBinder.bind(&host, &view.models, &view.options);

        assert_eq!(
            doc.inner_html(host.id()),
            r#"<span rv-text="widget:title">outer</span><div rv-widget-inner=""><i rv-text="widget:title"></i></div>"#
        );
    }

    #[test]
    fn test_custom_routine() {
        let (ctx, _doc, host, widget) = setup(r#"<div id="host" rv-title="widget:title"></div>"#);
        let mut view = ViewContext::from_config(&ctx.config().markup).merged_for(&widget);
        view.options = view
            .options
            .with_binder("title", |el, v| el.set_attr("title", &display(v)));

        let _handle = PresentationBinder.bind(&host, &view.models, &view.options);
        widget.set("title", "hello");
        assert_eq!(host.attr("title").as_deref(), Some("hello"));
    }

    #[test]
    fn test_dropping_handle_unsubscribes() {
        let (ctx, _doc, host, widget) = setup(r#"<div id="host" rv-show="widget:visible"></div>"#);
        let view = ViewContext::from_config(&ctx.config().markup).merged_for(&widget);
        let handle = PresentationBinder.bind(&host, &view.models, &view.options);
        assert_eq!(widget.listener_count(), 1);
        drop(handle);
        assert_eq!(widget.listener_count(), 0);
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!([])));
    }
}
