//! # Seine Types
//!
//! Shared types and traits for the Seine crawl engine.
//! This crate provides the data model carried between pipeline stages, the
//! error types surfaced to callers, and the port traits the engine is
//! generic over, so that the pipeline, limiter, and resource crates never
//! depend on each other directly.
//!
//! ## Organization
//!
//! - `page`: the crawled page model and its metadata
//! - `result`: stage tags, extraction tasks, and terminal crawl results
//! - `errors`: error types and result aliases
//! - `ports`: collaborator traits (fetcher, processor, sink, rate limit)

pub mod errors;
pub mod page;
pub mod ports;
pub mod result;

// Re-export commonly used types
pub use errors::CrawlError;
pub use page::{Page, PageMetadata};
pub use ports::{
    Feedback, FetchedPage, Fetcher, OutputSink, PageProcessor, Permit, RateLimit,
    UnlimitedRateLimit,
};
pub use result::{CrawlResult, ExtractionTask, Stage};
