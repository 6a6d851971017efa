//! Runtime error types.
//!
//! All of these are local to one widget or controller. None of them is
//! fatal to the registry, the hub, or sibling widgets.

use thiserror::Error;

use crate::widget::WidgetId;

/// Failure of the HTTP GET capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("no resource at `{0}`")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Widget lifecycle and attachment errors.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// A requested widget name has no registered factory.
    #[error("unknown widget `{0}`")]
    UnknownWidget(String),

    /// Template or partial markup could not be fetched.
    #[error("failed to fetch `{url}`")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// An external asset failed to load.
    #[error("failed to load asset `{id}`: {reason}")]
    Asset { id: String, reason: String },

    /// Teardown was requested for a widget that is not installed.
    #[error("widget {0} is already uninstalled")]
    AlreadyUninstalled(WidgetId),
}

impl WidgetError {
    /// Short machine-readable kind, used in hub payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownWidget(_) => "unknown-widget",
            Self::Fetch { .. } => "fetch",
            Self::Asset { .. } => "asset",
            Self::AlreadyUninstalled(_) => "already-uninstalled",
        }
    }
}
