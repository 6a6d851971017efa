//! Detached, immutable node trees parsed from markup text.
//!
//! Parsing is lenient: anything `tl` accepts becomes nodes, and input it
//! rejects outright degrades to a single text node. No error is raised.

use crate::utils::html::{escape, escape_attr, is_raw_text_element, is_void_element, unescape};

/// A node of a detached fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentNode {
    Element(FragmentElement),
    Text(String),
    Comment(String),
}

/// An element of a detached fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<FragmentNode>,
}

impl FragmentElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A detached tree derived once from content text.
///
/// Consumers copy it into a document; the fragment itself is never
/// mutated after parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    nodes: Vec<FragmentNode>,
}

impl Fragment {
    pub fn new(nodes: Vec<FragmentNode>) -> Self {
        Self { nodes }
    }

    /// Parse markup into a fragment.
    pub fn parse(html: &str) -> Self {
        let Ok(dom) = tl::parse(html, tl::ParserOptions::default()) else {
            return Self::new(vec![FragmentNode::Text(html.to_string())]);
        };

        let parser = dom.parser();
        let nodes = dom
            .children()
            .iter()
            .filter_map(|handle| convert(*handle, parser, false))
            .collect();
        Self { nodes }
    }

    pub fn nodes(&self) -> &[FragmentNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Keep only the `<body>` children when the markup is a full document.
    ///
    /// Partial responses are often complete pages; only their body replaces
    /// the placeholder.
    pub fn into_body(self) -> Self {
        match find_body(&self.nodes) {
            Some(body) => Self::new(body.children.clone()),
            None => self,
        }
    }

    /// Serialize back to markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            write_node(&mut out, node, false);
        }
        out
    }
}

fn find_body(nodes: &[FragmentNode]) -> Option<&FragmentElement> {
    nodes.iter().find_map(|node| match node {
        FragmentNode::Element(el) if el.tag == "body" => Some(el),
        FragmentNode::Element(el) if el.tag == "html" => find_body(&el.children),
        _ => None,
    })
}

/// Convert a tl node handle into a fragment node.
fn convert(handle: tl::NodeHandle, parser: &tl::Parser, raw_text: bool) -> Option<FragmentNode> {
    match handle.get(parser)? {
        tl::Node::Tag(tag) => {
            let name = tag.name().as_utf8_str().to_ascii_lowercase();
            let attributes = tag.attributes();

            let mut attrs: Vec<(String, String)> = Vec::new();
            for (key, value) in attributes.iter() {
                let key = key.to_ascii_lowercase();
                if attrs.iter().any(|(k, _)| *k == key) {
                    continue;
                }
                let value = value.map(|v| unescape(&v).into_owned()).unwrap_or_default();
                attrs.push((key, value));
            }
            // tl keeps id/class outside the generic attribute map
            for key in ["id", "class"] {
                if attrs.iter().any(|(k, _)| k == key) {
                    continue;
                }
                if let Some(Some(value)) = attributes.get(key) {
                    attrs.push((key.to_string(), unescape(&value.as_utf8_str()).into_owned()));
                }
            }

            let child_raw = is_raw_text_element(&name);
            let children = tag
                .children()
                .top()
                .iter()
                .filter_map(|child| convert(*child, parser, child_raw))
                .collect();

            Some(FragmentNode::Element(FragmentElement {
                tag: name,
                attrs,
                children,
            }))
        }
        tl::Node::Raw(bytes) => {
            let text = bytes.as_utf8_str();
            let text = if raw_text {
                text.into_owned()
            } else {
                unescape(&text).into_owned()
            };
            Some(FragmentNode::Text(text))
        }
        tl::Node::Comment(bytes) => {
            let text = bytes.as_utf8_str();
            let text = text.trim_start_matches("<!--").trim_end_matches("-->");
            Some(FragmentNode::Comment(text.to_string()))
        }
    }
}

/// Serialize one node. `raw_text` marks children of `script`/`style`.
pub(crate) fn write_node(out: &mut String, node: &FragmentNode, raw_text: bool) {
    match node {
        FragmentNode::Text(text) if raw_text => out.push_str(text),
        FragmentNode::Text(text) => out.push_str(&escape(text)),
        FragmentNode::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        FragmentNode::Element(el) => {
            write_open_tag(out, &el.tag, &el.attrs);
            if is_void_element(&el.tag) {
                return;
            }
            let raw = is_raw_text_element(&el.tag);
            for child in &el.children {
                write_node(out, child, raw);
            }
            write_close_tag(out, &el.tag);
        }
    }
}

pub(crate) fn write_open_tag(out: &mut String, tag: &str, attrs: &[(String, String)]) {
    out.push('<');
    out.push_str(tag);
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
}

pub(crate) fn write_close_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}
