//! # Seine Pipeline
//!
//! The staged crawl engine: discovery -> extraction -> processing ->
//! output, executed by configurable worker pools connected by bounded
//! channels.
//!
//! Backpressure flows upstream through channel capacity; a single
//! cancellation token reaches every worker; and the result aggregator
//! guarantees the caller exactly one terminal [`CrawlResult`] per submitted
//! URL before its channel closes.
//!
//! ```no_run
//! use seine_pipeline::{CrawlPipeline, PipelineConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (pipeline, mut results) = CrawlPipeline::builder(PipelineConfig::default())
//!     .start()
//!     .await?;
//! pipeline.submit(vec!["https://example.com".to_string()])?;
//!
//! while let Some(result) = results.recv().await {
//!     println!("{}: success={}", result.url, result.success);
//! }
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod processor;
mod retry;
mod stages;

pub use config::PipelineConfig;
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot, StageMetrics, StageSnapshot};
pub use pipeline::{CrawlPipeline, PipelineBuilder};
pub use processor::PassthroughProcessor;

// Re-export the result type callers drain from the pipeline.
pub use seine_types::{CrawlError, CrawlResult, Stage};
