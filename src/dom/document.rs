//! Arena-backed document tree.
//!
//! A `Document` is a cheap, clonable handle to one shared tree. Nodes are
//! addressed by [`NodeId`]. Freed slots are reused, and each id carries the
//! generation of its slot so a stale id never aliases a newer node. Every
//! operation takes the lock for its own duration only.

use std::sync::Arc;

use parking_lot::RwLock;

use super::fragment::{Fragment, FragmentElement, FragmentNode, write_close_tag, write_node, write_open_tag};
use crate::utils::html::{is_raw_text_element, is_void_element};

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    const PLACEHOLDER: Self = Self { index: 0, generation: 0 };
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Slot>,
    /// Indices of vacant slots, reused before the arena grows.
    vacant: Vec<u32>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
}

/// Shared document handle.
#[derive(Debug, Clone)]
pub struct Document {
    tree: Arc<RwLock<Tree>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree)
    }
}

impl Eq for Document {}

// =============================================================================
// Construction
// =============================================================================

impl Document {
    /// Create an empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            vacant: Vec::new(),
            root: NodeId::PLACEHOLDER,
            head: NodeId::PLACEHOLDER,
            body: NodeId::PLACEHOLDER,
        };
        let root = tree.alloc(NodeKind::element("html"));
        let head = tree.alloc(NodeKind::element("head"));
        let body = tree.alloc(NodeKind::element("body"));
        tree.append(root, head);
        tree.append(root, body);
        tree.root = root;
        tree.head = head;
        tree.body = body;

        Self {
            tree: Arc::new(RwLock::new(tree)),
        }
    }

    /// Create a document whose body holds the given markup.
    pub fn from_body_html(html: &str) -> Self {
        let doc = Self::new();
        doc.set_inner_html(doc.body(), html);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.tree.read().root
    }

    pub fn head(&self) -> NodeId {
        self.tree.read().head
    }

    pub fn body(&self) -> NodeId {
        self.tree.read().body
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.write().alloc(NodeKind::element(tag))
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.tree.write().alloc(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.tree.write().alloc(NodeKind::Comment(text.to_string()))
    }
}

// =============================================================================
// Inspection
// =============================================================================

impl Document {
    /// Whether the node exists (has not been removed).
    pub fn exists(&self, id: NodeId) -> bool {
        self.tree.read().get(id).is_some()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.tree.read().get(id).map(|n| n.kind.clone())
    }

    pub fn tag(&self, id: NodeId) -> Option<String> {
        match self.tree.read().get(id)?.kind {
            NodeKind::Element { ref tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.read().get(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .read()
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.tree.read().get(id).is_some_and(|n| !n.children.is_empty())
    }

    /// Whether the node is reachable from the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let tree = self.tree.read();
        let mut current = Some(id);
        while let Some(node) = current {
            if node == tree.root {
                return true;
            }
            current = tree.get(node).and_then(|n| n.parent);
        }
        false
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        match &self.tree.read().get(id)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> Vec<(String, String)> {
        match self.tree.read().get(id).map(|n| &n.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs.clone(),
            _ => Vec::new(),
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|list| list.split_whitespace().any(|c| c == class))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let tree = self.tree.read();
        let mut out = String::new();
        tree.collect_text(id, &mut out);
        out
    }

    /// Serialized children of a node.
    pub fn inner_html(&self, id: NodeId) -> String {
        let tree = self.tree.read();
        let mut out = String::new();
        let raw = tree.is_raw_text(id);
        if let Some(node) = tree.get(id) {
            for child in &node.children {
                tree.write_html(*child, raw, &mut out);
            }
        }
        out
    }

    /// Serialized node including itself.
    pub fn outer_html(&self, id: NodeId) -> String {
        let tree = self.tree.read();
        let mut out = String::new();
        let raw = tree.get(id).and_then(|n| n.parent).is_some_and(|p| tree.is_raw_text(p));
        tree.write_html(id, raw, &mut out);
        out
    }

    /// Descendants (excluding `root`) carrying the attribute, in document order.
    pub fn query_attr(&self, root: NodeId, name: &str) -> Vec<NodeId> {
        let tree = self.tree.read();
        let mut out = Vec::new();
        if let Some(node) = tree.get(root) {
            for child in &node.children {
                tree.collect_with_attr(*child, name, &mut out);
            }
        }
        out
    }

    /// The node and all of its descendants, in document order.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let tree = self.tree.read();
        let mut out = Vec::new();
        tree.collect_subtree(root, &mut out);
        out
    }

    /// Find a connected element by its `id` attribute.
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        let root = self.root();
        self.subtree(root)
            .into_iter()
            .find(|node| self.attr(*node, "id").as_deref() == Some(value))
    }
}

// =============================================================================
// Mutation
// =============================================================================

impl Document {
    pub fn set_attr(&self, id: NodeId, name: &str, value: &str) {
        let mut tree = self.tree.write();
        if let Some(NodeKind::Element { attrs, .. }) = tree.get_mut(id).map(|n| &mut n.kind) {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&self, id: NodeId, name: &str) -> Option<String> {
        let mut tree = self.tree.write();
        let NodeKind::Element { attrs, .. } = &mut tree.get_mut(id)?.kind else {
            return None;
        };
        let pos = attrs.iter().position(|(k, _)| k == name)?;
        Some(attrs.remove(pos).1)
    }

    /// Add or remove one class from the `class` attribute.
    pub fn toggle_class(&self, id: NodeId, class: &str, on: bool) {
        let current = self.attr(id, "class").unwrap_or_default();
        let mut classes: Vec<&str> = current.split_whitespace().filter(|c| *c != class).collect();
        if on {
            classes.push(class);
        }
        if classes.is_empty() {
            self.remove_attr(id, "class");
        } else {
            self.set_attr(id, "class", &classes.join(" "));
        }
    }

    /// Append `child` as the last child of `parent`, moving it if attached.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut tree = self.tree.write();
        if !tree.can_adopt(parent, child) {
            return;
        }
        tree.unlink(child);
        tree.append(parent, child);
    }

    /// Insert `node` right before `reference` in the reference's parent.
    pub fn insert_before(&self, reference: NodeId, node: NodeId) {
        self.insert_relative(reference, node, 0);
    }

    /// Insert `node` right after `reference` in the reference's parent.
    pub fn insert_after(&self, reference: NodeId, node: NodeId) {
        self.insert_relative(reference, node, 1);
    }

    fn insert_relative(&self, reference: NodeId, node: NodeId, offset: usize) {
        let mut tree = self.tree.write();
        if reference == node {
            return;
        }
        let Some(parent) = tree.get(reference).and_then(|n| n.parent) else {
            return;
        };
        if !tree.can_adopt(parent, node) {
            return;
        }
        tree.unlink(node);
        let Some(pos) = tree.index_in_parent(parent, reference) else {
            return;
        };
        if let Some(p) = tree.get_mut(parent) {
            p.children.insert(pos + offset, node);
        }
        if let Some(n) = tree.get_mut(node) {
            n.parent = Some(parent);
        }
    }

    /// Detach a node from its parent, keeping it (and its subtree) alive.
    pub fn detach(&self, id: NodeId) {
        self.tree.write().unlink(id);
    }

    /// Detach and destroy a node with its whole subtree.
    pub fn remove(&self, id: NodeId) {
        let mut tree = self.tree.write();
        tree.unlink(id);
        tree.free(id);
    }

    /// Destroy all children of a node.
    pub fn clear_children(&self, id: NodeId) {
        let mut tree = self.tree.write();
        let children = match tree.get_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            tree.free(child);
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&self, id: NodeId, text: &str) {
        self.clear_children(id);
        let node = self.create_text(text);
        self.append_child(id, node);
    }

    /// Replace all children with parsed markup.
    pub fn set_inner_html(&self, id: NodeId, html: &str) {
        self.clear_children(id);
        self.append_fragment(id, &Fragment::parse(html));
    }

    /// Copy a fragment's nodes into the document as the last children of `parent`.
    pub fn append_fragment(&self, parent: NodeId, fragment: &Fragment) -> Vec<NodeId> {
        let mut tree = self.tree.write();
        if tree.get(parent).is_none() {
            return Vec::new();
        }
        let ids: Vec<NodeId> = fragment.nodes().iter().map(|n| tree.instantiate(n)).collect();
        for id in &ids {
            tree.append(parent, *id);
        }
        ids
    }

    /// Replace a node (outer markup) with a copy of a fragment.
    pub fn replace_with_fragment(&self, node: NodeId, fragment: &Fragment) -> Vec<NodeId> {
        let mut tree = self.tree.write();
        let Some(parent) = tree.get(node).and_then(|n| n.parent) else {
            return Vec::new();
        };
        let Some(pos) = tree.index_in_parent(parent, node) else {
            return Vec::new();
        };
        let ids: Vec<NodeId> = fragment.nodes().iter().map(|n| tree.instantiate(n)).collect();
        tree.unlink(node);
        tree.free(node);
        if let Some(p) = tree.get_mut(parent) {
            for (i, id) in ids.iter().enumerate() {
                p.children.insert(pos + i, *id);
            }
        }
        for id in &ids {
            if let Some(n) = tree.get_mut(*id) {
                n.parent = Some(parent);
            }
        }
        ids
    }
}

// =============================================================================
// Tree internals
// =============================================================================

impl NodeKind {
    fn element(tag: &str) -> Self {
        Self::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }
}

impl Tree {
    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let data = NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        };
        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.nodes.push(Slot::default());
                (self.nodes.len() - 1) as u32
            }
        };
        let slot = &mut self.nodes[index as usize];
        slot.data = Some(data);
        NodeId {
            index,
            generation: slot.generation,
        }
    }

    fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
    }

    fn is_raw_text(&self, id: NodeId) -> bool {
        matches!(self.get(id).map(|n| &n.kind), Some(NodeKind::Element { tag, .. }) if is_raw_text_element(tag))
    }

    /// `parent` may take `child` unless `child` is `parent` or one of its ancestors.
    fn can_adopt(&self, parent: NodeId, child: NodeId) -> bool {
        if self.get(parent).is_none() || self.get(child).is_none() {
            return false;
        }
        let mut current = Some(parent);
        while let Some(node) = current {
            if node == child {
                return false;
            }
            current = self.get(node).and_then(|n| n.parent);
        }
        true
    }

    fn index_in_parent(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.get(parent)?.children.iter().position(|c| *c == child)
    }

    fn append(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p) = self.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
    }

    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.get_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|c| *c != id);
        }
    }

    fn free(&mut self, id: NodeId) {
        let Some(slot) = self
            .nodes
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(node) = slot.data.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);
        for child in node.children {
            self.free(child);
        }
    }

    fn instantiate(&mut self, node: &FragmentNode) -> NodeId {
        match node {
            FragmentNode::Text(text) => self.alloc(NodeKind::Text(text.clone())),
            FragmentNode::Comment(text) => self.alloc(NodeKind::Comment(text.clone())),
            FragmentNode::Element(FragmentElement {
                tag,
                attrs,
                children,
            }) => {
                let id = self.alloc(NodeKind::Element {
                    tag: tag.clone(),
                    attrs: attrs.clone(),
                });
                for child in children {
                    let child_id = self.instantiate(child);
                    self.append(id, child_id);
                }
                id
            }
        }
    }

    fn write_html(&self, id: NodeId, raw_text: bool, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => write_node(out, &FragmentNode::Text(text.clone()), raw_text),
            NodeKind::Comment(text) => write_node(out, &FragmentNode::Comment(text.clone()), false),
            NodeKind::Element { tag, attrs } => {
                write_open_tag(out, tag, attrs);
                if is_void_element(tag) {
                    return;
                }
                let raw = is_raw_text_element(tag);
                for child in &node.children {
                    self.write_html(*child, raw, out);
                }
                write_close_tag(out, tag);
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        if let NodeKind::Text(text) = &node.kind {
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    fn collect_with_attr(&self, id: NodeId, name: &str, out: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else {
            return;
        };
        if let NodeKind::Element { attrs, .. } = &node.kind
            && attrs.iter().any(|(k, _)| k == name)
        {
            out.push(id);
        }
        for child in &node.children {
            self.collect_with_attr(*child, name, out);
        }
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else {
            return;
        };
        out.push(id);
        for child in &node.children {
            self.collect_subtree(*child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_shape() {
        let doc = Document::new();
        assert_eq!(doc.children(doc.root()), vec![doc.head(), doc.body()]);
        assert_eq!(doc.outer_html(doc.root()), "<html><head></head><body></body></html>");
    }

    #[test]
    fn test_from_body_html() {
        let doc = Document::from_body_html("<div id=\"app\"><p>hi</p></div>");
        let app = doc.element_by_id("app").unwrap();
        assert_eq!(doc.inner_html(app), "<p>hi</p>");
        assert!(doc.is_connected(app));
    }

    #[test]
    fn test_insert_before_and_after() {
        let doc = Document::from_body_html("<i>a</i>");
        let body = doc.body();
        let a = doc.children(body)[0];

        let before = doc.create_comment("m");
        doc.insert_before(a, before);
        let after = doc.create_element("b");
        doc.insert_after(a, after);

        assert_eq!(doc.inner_html(body), "<!--m--><i>a</i><b></b>");
    }

    #[test]
    fn test_detach_keeps_subtree_alive() {
        let doc = Document::from_body_html("<div id=\"w\"><p>x</p></div>");
        let w = doc.element_by_id("w").unwrap();
        doc.detach(w);

        assert!(!doc.is_connected(w));
        assert!(doc.exists(w));
        assert_eq!(doc.inner_html(w), "<p>x</p>");
        assert_eq!(doc.inner_html(doc.body()), "");
    }

    #[test]
    fn test_remove_destroys_subtree() {
        let doc = Document::from_body_html("<div id=\"w\"><p>x</p></div>");
        let w = doc.element_by_id("w").unwrap();
        let p = doc.children(w)[0];
        doc.remove(w);

        assert!(!doc.exists(w));
        assert!(!doc.exists(p));
    }

    #[test]
    fn test_moving_attached_node() {
        let doc = Document::from_body_html("<a></a><b></b><c></c>");
        let kids = doc.children(doc.body());
        doc.insert_after(kids[2], kids[0]);
        assert_eq!(doc.inner_html(doc.body()), "<b></b><c></c><a></a>");
    }

    #[test]
    fn test_cannot_insert_into_own_subtree() {
        let doc = Document::from_body_html("<div id=\"outer\"><p id=\"inner\"></p></div>");
        let outer = doc.element_by_id("outer").unwrap();
        let inner = doc.element_by_id("inner").unwrap();
        doc.append_child(inner, outer);
        assert_eq!(doc.parent(inner), Some(outer));
        assert!(doc.is_connected(outer));
    }

    #[test]
    fn test_append_fragment_copies() {
        let doc = Document::new();
        let frag = Fragment::parse("<p>hi</p>");
        let first = doc.append_fragment(doc.body(), &frag);
        let second = doc.append_fragment(doc.body(), &frag);

        assert_ne!(first, second);
        assert_eq!(doc.inner_html(doc.body()), "<p>hi</p><p>hi</p>");
        assert_eq!(frag.to_html(), "<p>hi</p>");
    }

    #[test]
    fn test_replace_with_fragment() {
        let doc = Document::from_body_html("<ul><li data-partial=\"/x\">old</li><li>keep</li></ul>");
        let placeholder = doc.query_attr(doc.body(), "data-partial")[0];
        doc.replace_with_fragment(placeholder, &Fragment::parse("<li>new</li><li>two</li>"));

        assert!(!doc.exists(placeholder));
        assert_eq!(
            doc.inner_html(doc.body()),
            "<ul><li>new</li><li>two</li><li>keep</li></ul>"
        );
    }

    #[test]
    fn test_query_attr_excludes_root() {
        let doc = Document::from_body_html(
            "<div id=\"root\" data-partial=\"/a\"><p data-partial=\"/b\"></p><p></p></div>",
        );
        let root = doc.element_by_id("root").unwrap();
        let found = doc.query_attr(root, "data-partial");
        assert_eq!(found.len(), 1);
        assert_eq!(doc.attr(found[0], "data-partial").as_deref(), Some("/b"));
    }

    #[test]
    fn test_attributes_and_classes() {
        let doc = Document::new();
        let el = doc.create_element("div");
        doc.set_attr(el, "class", "a b");
        doc.toggle_class(el, "loading", true);
        assert!(doc.has_class(el, "loading"));
        doc.toggle_class(el, "a", false);
        assert_eq!(doc.attr(el, "class").as_deref(), Some("b loading"));
        doc.toggle_class(el, "b", false);
        doc.toggle_class(el, "loading", false);
        assert_eq!(doc.attr(el, "class"), None);
        assert_eq!(doc.remove_attr(el, "missing"), None);
    }

    #[test]
    fn test_slots_reused_across_replacements() {
        let doc = Document::from_body_html("<div id=\"host\"></div>");
        let host = doc.element_by_id("host").unwrap();
        let frag = Fragment::parse("<p>a<b>b</b></p>");

        doc.append_fragment(host, &frag);
        let slots = doc.tree.read().nodes.len();
        for _ in 0..1000 {
            doc.clear_children(host);
            doc.append_fragment(host, &frag);
        }

        assert_eq!(doc.tree.read().nodes.len(), slots);
        assert_eq!(doc.inner_html(host), "<p>a<b>b</b></p>");
    }

    #[test]
    fn test_stale_id_does_not_alias_reused_slot() {
        let doc = Document::new();
        let old = doc.create_element("p");
        doc.remove(old);
        let new = doc.create_element("span");

        assert_ne!(old, new);
        assert!(!doc.exists(old));
        assert_eq!(doc.tag(old), None);
        doc.set_attr(old, "id", "ghost");
        assert_eq!(doc.attr(new, "id"), None);
        assert_eq!(doc.tag(new).as_deref(), Some("span"));
    }

    #[test]
    fn test_text_content_and_set_text() {
        let doc = Document::from_body_html("<p>a<b>b</b>c</p>");
        let p = doc.children(doc.body())[0];
        assert_eq!(doc.text_content(p), "abc");
        doc.set_text(p, "<x>");
        assert_eq!(doc.inner_html(p), "&lt;x&gt;");
    }
}
