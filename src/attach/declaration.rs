//! Widget declarations in markup.
//!
//! Two forms are recognized: `<prefix>-widget-<name>` (value ignored) and
//! `<name_attribute>="<name>"`.

use crate::config::MarkupConfig;
use crate::dom::{Document, NodeId, NodeKind};

/// A widget declared on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// The declaring attribute, removed when the controller binds.
    pub attribute: String,
    /// Widget name. Empty means the element stays inert.
    pub name: String,
}

impl Declaration {
    /// The first declaration found on an element.
    pub fn find(doc: &Document, node: NodeId, markup: &MarkupConfig) -> Option<Self> {
        let Some(NodeKind::Element { attrs, .. }) = doc.kind(node) else {
            return None;
        };
        let prefix = markup.declaration_prefix();
        attrs.into_iter().find_map(|(attr, value)| {
            if let Some(name) = attr.strip_prefix(prefix.as_str()) {
                let name = name.to_string();
                return Some(Self { attribute: attr, name });
            }
            (attr == markup.name_attribute).then(|| Self {
                name: value.trim().to_string(),
                attribute: attr,
            })
        })
    }
}
