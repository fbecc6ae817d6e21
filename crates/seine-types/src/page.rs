//! Crawled page model.
//!
//! A [`Page`] is created by the extraction stage, handed to processing, and
//! finally to output. The resource manager caches snapshot copies; the spill
//! encoding must round-trip every field, which is why the whole model derives
//! `Serialize`/`Deserialize`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A fully extracted page moving through the pipeline.
///
/// Immutable once stored in the cache, except for `processed_at`, which the
/// processing stage writes exactly once on its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Parsed source URL
    pub url: Url,
    /// Document title
    pub title: String,
    /// Raw HTML as fetched
    pub content: String,
    /// Extracted plain text
    pub text: String,
    /// Markdown rendition (filled by the processing collaborator)
    pub markdown: String,
    /// Outgoing links, absolutized and deduplicated
    pub links: Vec<String>,
    /// Image sources, absolutized and deduplicated
    pub images: Vec<String>,
    /// Document metadata
    pub metadata: PageMetadata,
    /// When the fetch completed
    pub crawled_at: DateTime<Utc>,
    /// When processing completed; written once
    pub processed_at: Option<DateTime<Utc>>,
}

impl Page {
    /// Create an empty page for the given URL, stamped with the current time.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: String::new(),
            content: String::new(),
            text: String::new(),
            markdown: String::new(),
            links: Vec::new(),
            images: Vec::new(),
            metadata: PageMetadata::default(),
            crawled_at: Utc::now(),
            processed_at: None,
        }
    }

    /// The host this page was fetched from, or an empty string for
    /// host-less URLs.
    pub fn domain(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// Metadata extracted from document head and open-graph tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub description: String,
    pub keywords: Vec<String>,
    pub author: String,
    pub word_count: usize,
    pub og_title: String,
    pub og_description: String,
    pub og_image: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extracts_host() {
        let page = Page::new(Url::parse("https://example.com/a/b").unwrap());
        assert_eq!(page.domain(), "example.com");
    }

    #[test]
    fn page_round_trips_through_json() {
        let mut page = Page::new(Url::parse("https://example.com/a").unwrap());
        page.title = "Title".to_string();
        page.links = vec!["https://example.com/b".to_string()];
        page.metadata.word_count = 42;
        page.processed_at = Some(Utc::now());

        let encoded = serde_json::to_string(&page).unwrap();
        let decoded: Page = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.url, page.url);
        assert_eq!(decoded.title, page.title);
        assert_eq!(decoded.links, page.links);
        assert_eq!(decoded.metadata.word_count, 42);
        assert_eq!(decoded.processed_at, page.processed_at);
    }
}
