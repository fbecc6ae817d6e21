//! Default page processor.

use async_trait::async_trait;
use seine_types::errors::Result;
use seine_types::{Page, PageProcessor};

/// Processor that passes pages through untouched.
///
/// The processing stage still stamps `processed_at`; use a real processor
/// collaborator for markdown conversion or enrichment.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProcessor;

#[async_trait]
impl PageProcessor for PassthroughProcessor {
    async fn process(&self, page: Page) -> Result<Page> {
        Ok(page)
    }
}
