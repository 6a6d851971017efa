//! Discovery of widget declarations in a subtree.

use super::controller::AttachmentController;
use super::declaration::Declaration;
use crate::binder::ViewContext;
use crate::config::MarkupConfig;
use crate::dom::{Document, ElementRef, NodeId};
use crate::runtime::RuntimeContext;

/// Create one controller per element in `root`'s subtree (root included)
/// that declares a widget.
///
/// Declaring elements are not descended into: their content belongs to the
/// widget and is scanned when that widget attaches.
pub fn scan(ctx: &RuntimeContext, root: &ElementRef, view: &ViewContext) -> Vec<AttachmentController> {
    bind_all(ctx, root, true, view)
}

/// Like [`scan`], excluding `root` itself.
pub(crate) fn scan_within(
    ctx: &RuntimeContext,
    root: &ElementRef,
    view: &ViewContext,
) -> Vec<AttachmentController> {
    bind_all(ctx, root, false, view)
}

fn bind_all(
    ctx: &RuntimeContext,
    root: &ElementRef,
    include_root: bool,
    view: &ViewContext,
) -> Vec<AttachmentController> {
    let mut found = Vec::new();
    let doc = root.document();
    if include_root {
        collect(doc, root.id(), &ctx.config().markup, &mut found);
    } else {
        for child in doc.children(root.id()) {
            collect(doc, child, &ctx.config().markup, &mut found);
        }
    }

    // Binding inserts markers, so the tree is walked first
    found
        .into_iter()
        .map(|(node, decl)| AttachmentController::bind(ctx, root.sibling_ref(node), decl, view.clone()))
        .collect()
}

fn collect(doc: &Document, node: NodeId, markup: &MarkupConfig, out: &mut Vec<(NodeId, Declaration)>) {
    if doc.tag(node).is_none() {
        return;
    }
    if let Some(decl) = Declaration::find(doc, node, markup) {
        out.push((node, decl));
        return;
    }
    for child in doc.children(node) {
        collect(doc, child, markup, out);
    }
}
