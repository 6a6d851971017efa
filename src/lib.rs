//! Widgetry - declarative widget attachment for reactively bound pages.
//!
//! Markup declares that an element hosts a widget; the runtime resolves the
//! widget's factory from a registry, attaches a lifecycle-managed instance to
//! the element and keeps the rendered subtree in sync with its `running`
//! flag.
//!
//! # Module Structure
//!
//! ```text
//! src/
//! ├── attach/     # AttachmentController, declaration scanning
//! ├── binder/     # ReactiveBinder seam + PresentationBinder
//! ├── config/     # RuntimeConfig (`widgets.toml`)
//! ├── content/    # ContentCache, content keys
//! ├── dom/        # In-memory document, fragments
//! ├── widget/     # Widget lifecycle model
//! ├── assets.rs   # AssetLoader
//! ├── error.rs    # WidgetError, FetchError
//! ├── fetch.rs    # Fetcher (HTTP GET capability)
//! ├── hub.rs      # EventHub
//! ├── logger.rs   # log!/debug! macros
//! ├── registry.rs # WidgetRegistry
//! └── runtime.rs  # RuntimeContext
//! ```
//!
//! # Example
//!
//! ```ignore
//! let ctx = RuntimeContext::new(RuntimeConfig::default());
//! ctx.define("clock", |widget, _hub| {
//!     widget.template("#clock").start();
//! });
//!
//! let view = ViewContext::from_config(&ctx.config().markup);
//! let controllers = scan(&ctx, &ElementRef::new(doc.clone(), doc.body()), &view);
//! ```

pub mod logger;

pub mod assets;
pub mod attach;
pub mod binder;
pub mod config;
pub mod content;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod hub;
pub mod registry;
pub mod runtime;
pub mod widget;

mod utils;

pub use assets::{AssetLoader, AssetReport, NoopAssetLoader};
pub use attach::{AttachmentController, Declaration, scan};
pub use binder::{
    BindOptions, BinderConfig, BindingHandle, Model, ModelSet, PresentationBinder, ReactiveBinder,
    ViewContext,
};
pub use config::{AttachPolicy, ConfigError, RuntimeConfig};
pub use dom::{Document, ElementRef, Fragment, NodeId};
pub use error::{FetchError, WidgetError};
pub use fetch::{DocumentTemplates, Fetcher, StaticFetcher};
pub use hub::EventHub;
pub use registry::{RegistryEntry, Resolution, WidgetFactory, WidgetRegistry};
pub use runtime::{RuntimeBuilder, RuntimeContext};
pub use widget::{Change, Lifecycle, Widget, WidgetId};
