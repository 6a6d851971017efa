//! Memoized conversion of content text into detached fragments.
//!
//! One cache belongs to one widget. The cached fragment always matches the
//! widget's current content; consumers clone it into the document and never
//! touch the original.

mod key;

pub use key::ContentKey;

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::dom::Fragment;

/// Outcome of asking for the fragment.
#[derive(Debug)]
pub enum Ensure {
    /// The fragment exists right now.
    Ready(Arc<Fragment>),
    /// Resolves the first time a fragment is derived.
    Pending(oneshot::Receiver<Arc<Fragment>>),
}

/// Single-entry fragment cache keyed by content identity.
#[derive(Debug, Default)]
pub struct ContentCache {
    key: Option<ContentKey>,
    fragment: Option<Arc<Fragment>>,
    waiters: Vec<oneshot::Sender<Arc<Fragment>>>,
    parses: usize,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached fragment, if one has been derived for the current content.
    pub fn fragment(&self) -> Option<Arc<Fragment>> {
        self.fragment.clone()
    }

    /// Key of the content the cached fragment was derived from.
    pub fn key(&self) -> Option<ContentKey> {
        self.key
    }

    /// Drop the cached fragment. Pending waiters stay registered.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.fragment = None;
    }

    /// Derive the fragment for `content`, parsing only if the content changed.
    ///
    /// Waiters registered through [`ensure`](Self::ensure) are resolved with
    /// the new fragment.
    pub fn derive(&mut self, content: &str) -> Arc<Fragment> {
        let key = ContentKey::of(content);
        if let (Some(cached), Some(fragment)) = (self.key, &self.fragment)
            && cached == key
        {
            return fragment.clone();
        }

        let fragment = Arc::new(Fragment::parse(content));
        self.parses += 1;
        self.key = Some(key);
        self.fragment = Some(fragment.clone());
        crate::debug!("content"; "derived fragment {}", key);

        for waiter in self.waiters.drain(..) {
            // A dropped receiver means its attach sequence was abandoned
            let _ = waiter.send(fragment.clone());
        }
        fragment
    }

    /// Get the fragment now, or a one-shot receiver for when it exists.
    pub fn ensure(&mut self) -> Ensure {
        if let Some(fragment) = &self.fragment {
            return Ensure::Ready(fragment.clone());
        }
        self.waiters.retain(|w| !w.is_closed());
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Ensure::Pending(rx)
    }

    /// Number of live (not abandoned) waiters.
    pub fn pending_waiters(&self) -> usize {
        self.waiters.iter().filter(|w| !w.is_closed()).count()
    }

    /// How many times content was actually parsed.
    pub fn parse_count(&self) -> usize {
        self.parses
    }
}
