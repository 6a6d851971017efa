//! Widget lifecycle model.
//!
//! ```text
//! Uninstalled --install--> Installed --start--> Running <--stop/start--> Stopped
//!      ^                                           |                       |
//!      +------------------- uninstall -------------+-----------------------+
//! ```
//!
//! A widget is a fixed [`Widget`] record plus the per-definition initializer
//! that configured it. All mutators return `&Self` so calls chain:
//! `widget.disable().hide()`.

mod change;
mod state;

pub use change::{Change, Listener, ListenerId};
pub use state::Widget;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique widget instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(u64);

impl WidgetId {
    pub(crate) fn next() -> Self {
        Self(NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state, derived from the install phase and the running flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninstalled,
    Installed,
    Running,
    Stopped,
}
