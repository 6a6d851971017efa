//! Minimal host document model.
//!
//! ```text
//! dom/
//! ├── document   # Arena tree behind a shared handle
//! ├── element    # ElementRef = (Document, NodeId)
//! └── fragment   # Detached, immutable trees parsed from markup
//! ```

mod document;
mod element;
mod fragment;

pub use document::{Document, NodeId, NodeKind};
pub use element::ElementRef;
pub use fragment::{Fragment, FragmentElement, FragmentNode};
