//! Configuration sections.
//!
//! # Example
//!
//! ```toml
//! [markup]
//! prefix = "rv"                       # Binder attribute prefix
//! name_attribute = "data-widget-name" # Alternate declaration form
//! partial_attribute = "data-partial"  # Partial placeholder attribute
//! marker = "widget"                   # Text of the anchor comment
//!
//! [registry]
//! queue_unresolved = false            # Queue requests for undefined names
//!
//! [attach]
//! policy = "race"                     # race | serialize
//! ```

use serde::{Deserialize, Serialize};

// ============================================================================
// [markup]
// ============================================================================

/// Attribute names the runtime reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupConfig {
    /// Binder attribute prefix: `<prefix>-widget-<name>`, `<prefix>-show`, ...
    pub prefix: String,

    /// Declares a widget by value: `data-widget-name="clock"`.
    pub name_attribute: String,

    /// Marks a partial placeholder; the value is the source to fetch.
    pub partial_attribute: String,

    /// Text of the comment left where a widget element lives.
    pub marker: String,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            prefix: "rv".to_string(),
            name_attribute: "data-widget-name".to_string(),
            partial_attribute: "data-partial".to_string(),
            marker: "widget".to_string(),
        }
    }
}

impl MarkupConfig {
    /// `<prefix>-widget-`
    pub fn declaration_prefix(&self) -> String {
        format!("{}-widget-", self.prefix)
    }

    /// `<prefix>-<suffix>`
    pub fn attr(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix, suffix)
    }
}

// ============================================================================
// [registry]
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Queue requests for names that are not defined yet instead of failing.
    pub queue_unresolved: bool,
}

// ============================================================================
// [attach]
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachConfig {
    pub policy: AttachPolicy,
}

/// How overlapping running transitions of one controller are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachPolicy {
    /// Every start spawns its own attach sequence; the last finish wins.
    #[default]
    Race,
    /// One sequence at a time, in transition order. A sequence whose widget
    /// stopped meanwhile skips the splice.
    Serialize,
}
