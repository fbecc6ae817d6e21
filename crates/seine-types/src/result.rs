//! Stage tags, extraction tasks, and terminal crawl results.

use crate::errors::CrawlError;
use crate::page::Page;
use serde::{Deserialize, Serialize};

/// Pipeline stage that produced a result or metric sample.
///
/// `Cache` is not a worker pool: it tags results and metrics for pages that
/// were recalled from the page cache instead of being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovery,
    Extraction,
    Processing,
    Cache,
    Output,
}

impl Stage {
    /// Lowercase tag used in results and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Extraction => "extraction",
            Stage::Processing => "processing",
            Stage::Cache => "cache",
            Stage::Output => "output",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of extraction work: a URL plus how many times it has been tried.
#[derive(Debug, Clone)]
pub struct ExtractionTask {
    pub url: String,
    pub attempt: u32,
}

impl ExtractionTask {
    /// First attempt for a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempt: 0,
        }
    }

    /// The follow-up task scheduled after a retryable failure.
    pub fn next_attempt(&self) -> Self {
        Self {
            url: self.url.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// Terminal outcome for one submitted URL.
///
/// Exactly one of these reaches the caller's result channel per URL that
/// attains a terminal state.
#[derive(Debug)]
pub struct CrawlResult {
    /// The submitted URL this result answers for.
    pub url: String,
    /// The page, when the crawl succeeded.
    pub page: Option<Page>,
    /// Whether the URL was crawled and processed successfully.
    pub success: bool,
    /// The error that stopped the URL, when `success` is false.
    pub error: Option<CrawlError>,
    /// Stage that produced this result.
    pub stage: Stage,
    /// Whether the failure could have been retried (false once the retry
    /// budget is exhausted or the error kind is terminal).
    pub retryable: bool,
}

impl CrawlResult {
    /// Successful result carrying the finished page.
    pub fn success(page: Page, stage: Stage) -> Self {
        Self {
            url: page.url.to_string(),
            page: Some(page),
            success: true,
            error: None,
            stage,
            retryable: false,
        }
    }

    /// Terminal failure at the given stage.
    pub fn failure(url: impl Into<String>, error: CrawlError, stage: Stage, retryable: bool) -> Self {
        Self {
            url: url.into(),
            page: None,
            success: false,
            error: Some(error),
            stage,
            retryable,
        }
    }

    /// Re-tag a result as it passes through a later stage.
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}
