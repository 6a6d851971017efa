//! Reactive binding seam.
//!
//! The runtime never renders anything itself. It hands an element, a model
//! set and the enclosing view's options to a [`ReactiveBinder`] and keeps the
//! returned [`BindingHandle`] until the widget stops.

mod presentation;

pub use presentation::PresentationBinder;

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::config::MarkupConfig;
use crate::dom::ElementRef;
use crate::widget::Widget;

/// One named model of a view.
#[derive(Clone)]
pub enum Model {
    Widget(Widget),
    Value(Value),
}

impl Model {
    /// Read a property of the model.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Widget(widget) => widget.get(key),
            Self::Value(value) => value.get(key).cloned(),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Widget(widget) => write!(f, "Widget({})", widget.id()),
            Self::Value(value) => write!(f, "Value({value})"),
        }
    }
}

pub type ModelSet = FxHashMap<String, Model>;

/// Value formatter, applied with `key | name` in a binding.
pub type Formatter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Custom binder routine for `<prefix>-<name>` attributes.
pub type Routine = Arc<dyn Fn(&ElementRef, &Value) + Send + Sync>;

/// Keypath adapter for plain-value models, keyed by its separator.
pub type Adapter = Arc<dyn Fn(&Value, &str) -> Option<Value> + Send + Sync>;

/// Binder configuration shared with every nested view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    pub prefix: String,
    /// Elements carrying this attribute host their own view.
    pub name_attribute: String,
}

impl BinderConfig {
    pub fn from_markup(markup: &MarkupConfig) -> Self {
        Self {
            prefix: markup.prefix.clone(),
            name_attribute: markup.name_attribute.clone(),
        }
    }

    /// Whether the attribute declares a widget (either revision).
    pub fn is_declaration(&self, attr: &str) -> bool {
        attr == self.name_attribute
            || attr
                .strip_prefix(&self.prefix)
                .and_then(|rest| rest.strip_prefix("-widget-"))
                .is_some()
    }
}

/// Vocabulary a view binds with. Nested views inherit it unchanged.
#[derive(Clone)]
pub struct BindOptions {
    pub binders: FxHashMap<String, Routine>,
    pub formatters: FxHashMap<String, Formatter>,
    pub adapters: FxHashMap<String, Adapter>,
    pub config: BinderConfig,
}

impl BindOptions {
    pub fn new(config: BinderConfig) -> Self {
        Self {
            binders: FxHashMap::default(),
            formatters: FxHashMap::default(),
            adapters: FxHashMap::default(),
            config,
        }
    }

    pub fn with_binder(
        mut self,
        name: &str,
        routine: impl Fn(&ElementRef, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.binders.insert(name.to_string(), Arc::new(routine));
        self
    }

    pub fn with_formatter(
        mut self,
        name: &str,
        formatter: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.formatters.insert(name.to_string(), Arc::new(formatter));
        self
    }

    pub fn with_adapter(
        mut self,
        separator: &str,
        adapter: impl Fn(&Value, &str) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.adapters.insert(separator.to_string(), Arc::new(adapter));
        self
    }
}

impl fmt::Debug for BindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindOptions")
            .field("binders", &self.binders.keys().collect::<Vec<_>>())
            .field("formatters", &self.formatters.keys().collect::<Vec<_>>())
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

/// The enclosing reactive view: its models and its options.
#[derive(Debug, Clone)]
pub struct ViewContext {
    pub models: ModelSet,
    pub options: BindOptions,
}

impl ViewContext {
    pub fn new(options: BindOptions) -> Self {
        Self {
            models: ModelSet::default(),
            options,
        }
    }

    /// Empty view using the configured attribute vocabulary.
    pub fn from_config(markup: &MarkupConfig) -> Self {
        Self::new(BindOptions::new(BinderConfig::from_markup(markup)))
    }

    pub fn with_model(mut self, name: &str, model: Model) -> Self {
        self.models.insert(name.to_string(), model);
        self
    }

    /// The view a widget's own subtree is bound with: the enclosing models
    /// plus `widget`, and the same options.
    pub fn merged_for(&self, widget: &Widget) -> Self {
        let mut models = self.models.clone();
        models.insert("widget".to_string(), Model::Widget(widget.clone()));
        Self {
            models,
            options: self.options.clone(),
        }
    }
}

/// External reactive binder: `bind(element, models, options) -> handle`.
pub trait ReactiveBinder: Send + Sync {
    fn bind(
        &self,
        element: &ElementRef,
        models: &ModelSet,
        options: &BindOptions,
    ) -> Box<dyn BindingHandle>;
}

/// A live binding. `unbind` releases every watcher it installed.
pub trait BindingHandle: Send {
    fn unbind(&mut self);
}
