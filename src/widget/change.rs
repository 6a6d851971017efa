//! Observable widget changes.

use std::sync::Arc;

use super::Widget;

/// One observable change of a widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Running(bool),
    Visible(bool),
    Loading(bool),
    Disabled(bool),
    /// `content` was replaced.
    Content,
    /// A fragment was derived for the new content.
    Fragment,
    /// A model attribute set through [`Widget::set`].
    Attribute(String),
    Installed,
    Uninstalled,
}

impl Change {
    /// Property name this change belongs to, as used in binding keypaths.
    pub fn key(&self) -> &str {
        match self {
            Self::Running(_) => "running",
            Self::Visible(_) => "visible",
            Self::Loading(_) => "loading",
            Self::Disabled(_) => "disabled",
            Self::Content => "content",
            Self::Fragment => "fragment",
            Self::Attribute(key) => key,
            Self::Installed => "installed",
            Self::Uninstalled => "uninstalled",
        }
    }
}

/// Change listener. Receives the widget so it never needs to own it.
pub type Listener = Arc<dyn Fn(&Widget, &Change) + Send + Sync>;

/// Listener handle returned by [`Widget::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered listener list.
#[derive(Default)]
pub(super) struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(lid, _)| *lid != id);
        self.entries.len() != before
    }

    pub fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
