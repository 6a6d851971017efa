//! Element handle: a document plus a node id.

use std::fmt;

use super::document::{Document, NodeId};

/// Reference to one element of a shared document.
#[derive(Clone, PartialEq, Eq)]
pub struct ElementRef {
    doc: Document,
    id: NodeId,
}

impl ElementRef {
    pub fn new(doc: Document, id: NodeId) -> Self {
        Self { doc, id }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> Option<String> {
        self.doc.tag(self.id)
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.doc.attr(self.id, name)
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        self.doc.set_attr(self.id, name, value);
    }

    pub fn remove_attr(&self, name: &str) -> Option<String> {
        self.doc.remove_attr(self.id, name)
    }

    pub fn has_children(&self) -> bool {
        self.doc.has_children(self.id)
    }

    pub fn inner_html(&self) -> String {
        self.doc.inner_html(self.id)
    }

    pub fn outer_html(&self) -> String {
        self.doc.outer_html(self.id)
    }

    pub fn is_connected(&self) -> bool {
        self.doc.is_connected(self.id)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.doc.parent(self.id)
    }

    /// Another node of the same document.
    pub fn sibling_ref(&self, id: NodeId) -> Self {
        Self::new(self.doc.clone(), id)
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Some(tag) => write!(f, "<{}>#{:?}", tag, self.id),
            None => write!(f, "(removed)#{:?}", self.id),
        }
    }
}
