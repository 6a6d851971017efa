//! Markup sources: the HTTP GET capability used for templates and partials.

use std::future::Future;
use std::pin::Pin;

use dashmap::DashMap;

use crate::dom::Document;
use crate::error::FetchError;

/// Future returned by [`Fetcher::get`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send>>;

/// Fetches markup text by URL.
pub trait Fetcher: Send + Sync {
    fn get(&self, url: &str) -> FetchFuture;
}

// =============================================================================
// StaticFetcher
// =============================================================================

/// In-memory url → markup map.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: DashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a page (builder form).
    pub fn with(self, url: &str, html: &str) -> Self {
        self.insert(url, html);
        self
    }

    pub fn insert(&self, url: &str, html: &str) {
        self.pages.insert(url.to_string(), html.to_string());
    }
}

impl Fetcher for StaticFetcher {
    fn get(&self, url: &str) -> FetchFuture {
        let result = self
            .pages
            .get(url)
            .map(|page| page.value().clone())
            .ok_or_else(|| FetchError::NotFound(url.to_string()));
        Box::pin(async move { result })
    }
}

// =============================================================================
// DocumentTemplates
// =============================================================================

/// Resolves sources against template elements embedded in a document.
///
/// `"#card"` and `"card"` both name the element with `id="card"`; its inner
/// markup is the result, as with `<script type="text/template" id="card">`.
#[derive(Debug, Clone)]
pub struct DocumentTemplates {
    doc: Document,
}

impl DocumentTemplates {
    pub fn new(doc: Document) -> Self {
        Self { doc }
    }

    fn lookup(&self, source: &str) -> Result<String, FetchError> {
        let id = source.strip_prefix('#').unwrap_or(source);
        self.doc
            .element_by_id(id)
            .map(|node| self.doc.inner_html(node))
            .ok_or_else(|| FetchError::NotFound(source.to_string()))
    }
}

impl Fetcher for DocumentTemplates {
    fn get(&self, url: &str) -> FetchFuture {
        let result = self.lookup(url);
        Box::pin(async move { result })
    }
}
