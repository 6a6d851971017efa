//! Attachment of widgets to declaring elements.
//!
//! ```text
//! attach/
//! ├── controller   # AttachmentController: bind, attach sequence, teardown
//! ├── declaration  # `<prefix>-widget-<name>` / name attribute parsing
//! ├── latch        # Fan-in over partial fetches
//! └── scan         # Subtree discovery
//! ```

mod controller;
mod declaration;
mod latch;
mod scan;

#[cfg(test)]
mod tests;

pub use controller::AttachmentController;
pub use declaration::Declaration;
pub use scan::scan;
