//! Stage worker loops.
//!
//! Each stage is a pool of identical workers draining a shared receiver.
//! Workers race every blocking step against the pipeline's cancellation
//! token and convert internal failures into terminal [`CrawlResult`]s;
//! nothing here panics across a stage boundary.

use crate::config::PipelineConfig;
use crate::metrics::PipelineMetrics;
use crate::retry;
use chrono::Utc;
use seine_resources::ResourceManager;
use seine_types::{
    CrawlError, CrawlResult, ExtractionTask, Feedback, FetchedPage, Fetcher, OutputSink, Page,
    PageProcessor, RateLimit, Stage,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use url::Url;

/// Synthetic status reported to the limiter when a fetch yields no page and
/// no usable status.
const SYNTHETIC_FETCH_ERROR_STATUS: u16 = 599;

/// Everything a stage worker needs, shared across all pools.
pub(crate) struct StageContext {
    pub config: PipelineConfig,
    pub cancel: CancellationToken,
    pub metrics: Arc<PipelineMetrics>,
    pub limiter: Arc<dyn RateLimit>,
    pub resources: Arc<ResourceManager>,
    pub fetcher: Arc<dyn Fetcher>,
    pub processor: Arc<dyn PageProcessor>,
    pub sink: Option<Arc<dyn OutputSink>>,
    pub extract_tx: mpsc::Sender<ExtractionTask>,
    pub process_tx: mpsc::Sender<Page>,
    /// Terminal results from every stage funnel through output, so the sink
    /// sees each delivered result exactly once.
    pub output_tx: mpsc::Sender<CrawlResult>,
    /// Only the output stage sends here; the aggregator consumes it.
    pub results_tx: mpsc::Sender<CrawlResult>,
    /// Retry sleepers register here so shutdown can wait them out.
    pub retry_tasks: TaskTracker,
}

/// Shared multi-consumer end of a stage's input channel.
pub(crate) type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Pull the next item, or `None` on cancellation or a drained input.
async fn next_item<T>(rx: &SharedReceiver<T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        item = async { rx.lock().await.recv().await } => item,
    }
}

/// Send that gives up on cancellation. Returns false if the item was not
/// delivered.
async fn send_or_cancel<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Discovery: normalize and validate seed URLs, reject malformed ones.
pub(crate) async fn discovery_worker(ctx: Arc<StageContext>, rx: SharedReceiver<String>) {
    while let Some(raw) = next_item(&rx, &ctx.cancel).await {
        match normalize_url(&raw) {
            Ok(normalized) => {
                ctx.metrics.discovery.record_processed();
                if !send_or_cancel(
                    &ctx.extract_tx,
                    ExtractionTask::new(normalized),
                    &ctx.cancel,
                )
                .await
                {
                    break;
                }
            }
            Err(error) => {
                ctx.metrics.discovery.record_failed();
                debug!(url = %raw, %error, "Rejected seed URL");
                let result = CrawlResult::failure(raw, error, Stage::Discovery, false);
                if !send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await {
                    break;
                }
            }
        }
    }
}

/// Validate a seed URL: absolute http(s) with a host.
pub(crate) fn normalize_url(raw: &str) -> Result<String, CrawlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::invalid_url(raw, "empty"));
    }
    let parsed =
        Url::parse(trimmed).map_err(|e| CrawlError::invalid_url(trimmed, e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CrawlError::invalid_url(
            trimmed,
            format!("unsupported scheme {:?}", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(CrawlError::invalid_url(trimmed, "missing host"));
    }
    Ok(parsed.to_string())
}

/// Extraction: cache lookup, then permit + admission slot + fetch, with
/// retry scheduling on retryable failures.
pub(crate) async fn extraction_worker(ctx: Arc<StageContext>, rx: SharedReceiver<ExtractionTask>) {
    while let Some(task) = next_item(&rx, &ctx.cancel).await {
        extract_one(&ctx, task).await;
    }
}

async fn extract_one(ctx: &Arc<StageContext>, task: ExtractionTask) {
    // Cache first: a hit bypasses the fetch path entirely.
    match ctx.resources.get_page(&task.url).await {
        Ok(Some(page)) => {
            ctx.metrics.cache.record_processed();
            send_or_cancel(&ctx.process_tx, page, &ctx.cancel).await;
            return;
        }
        Ok(None) => {}
        Err(error) => {
            // Cache I/O failures surface as terminal results, never retries.
            ctx.metrics.extraction.record_failed();
            let result = CrawlResult::failure(task.url, error, Stage::Extraction, false);
            send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await;
            return;
        }
    }

    let parsed = match Url::parse(&task.url) {
        Ok(url) => url,
        Err(e) => {
            ctx.metrics.extraction.record_failed();
            let error = CrawlError::invalid_url(&task.url, e.to_string());
            let result = CrawlResult::failure(task.url, error, Stage::Extraction, false);
            send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await;
            return;
        }
    };
    let domain = parsed.host_str().unwrap_or_default().to_string();

    let mut permit = {
        let acquired = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            acquired = ctx.limiter.acquire(&domain) => acquired,
        };
        match acquired {
            Ok(permit) => permit,
            Err(error @ CrawlError::CircuitOpen { .. }) => {
                retry_or_fail(ctx, task, error).await;
                return;
            }
            Err(error) => {
                ctx.metrics.extraction.record_failed();
                let result = CrawlResult::failure(task.url, error, Stage::Extraction, false);
                send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await;
                return;
            }
        }
    };

    // The slot is an RAII guard: every return path below releases it.
    let _slot = {
        let acquired = tokio::select! {
            _ = ctx.cancel.cancelled() => { permit.release(); return; }
            acquired = ctx.resources.acquire_slot() => acquired,
        };
        match acquired {
            Ok(slot) => slot,
            Err(error) => {
                permit.release();
                ctx.metrics.extraction.record_failed();
                let result = CrawlResult::failure(task.url, error, Stage::Extraction, false);
                send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await;
                return;
            }
        }
    };

    let started = Instant::now();
    let outcome = tokio::select! {
        _ = ctx.cancel.cancelled() => { permit.release(); return; }
        outcome = ctx.fetcher.fetch(&parsed) => outcome,
    };
    let latency = started.elapsed();

    match outcome {
        Ok(FetchedPage {
            status,
            page: Some(page),
        }) => {
            ctx.limiter.feedback(&domain, Feedback::ok(status, latency));
            permit.release();

            if let Err(error) = ctx.resources.store_page(&task.url, &page).await {
                ctx.metrics.extraction.record_failed();
                let result = CrawlResult::failure(task.url, error, Stage::Extraction, false);
                send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await;
                return;
            }
            ctx.metrics.extraction.record_processed();
            send_or_cancel(&ctx.process_tx, page, &ctx.cancel).await;
        }
        Ok(FetchedPage { status, page: None }) => {
            let status = if status == 0 {
                SYNTHETIC_FETCH_ERROR_STATUS
            } else {
                status
            };
            ctx.limiter.feedback(
                &domain,
                Feedback {
                    status,
                    latency,
                    error: Some("fetch returned no page".to_string()),
                },
            );
            permit.release();
            let error = CrawlError::fetch_failed(&task.url, format!("no page (status {status})"));
            retry_or_fail(ctx, task, error).await;
        }
        Err(error) => {
            ctx.limiter
                .feedback(&domain, Feedback::error(latency, error.to_string()));
            permit.release();
            retry_or_fail(ctx, task, error).await;
        }
    }
}

/// Schedule a delayed re-enqueue while budget remains, else emit the
/// terminal failure.
async fn retry_or_fail(ctx: &Arc<StageContext>, task: ExtractionTask, error: CrawlError) {
    if retry::budget_remains(&ctx.config, task.attempt) {
        let delay = retry::backoff_delay(&ctx.config, task.attempt);
        debug!(
            url = %task.url,
            attempt = task.attempt,
            delay_ms = delay.as_millis() as u64,
            %error,
            "Scheduling extraction retry"
        );
        let cancel = ctx.cancel.clone();
        let extract_tx = ctx.extract_tx.clone();
        let retry_task = task.next_attempt();
        ctx.retry_tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    send_or_cancel(&extract_tx, retry_task, &cancel).await;
                }
            }
        });
    } else {
        ctx.metrics.extraction.record_failed();
        let result = CrawlResult::failure(task.url, error, Stage::Extraction, false);
        send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await;
    }
}

/// Processing: run the processor collaborator and stamp the completion time.
pub(crate) async fn processing_worker(ctx: Arc<StageContext>, rx: SharedReceiver<Page>) {
    while let Some(page) = next_item(&rx, &ctx.cancel).await {
        let url = page.url.to_string();
        let result = match ctx.processor.process(page).await {
            Ok(mut processed) => {
                if processed.processed_at.is_none() {
                    processed.processed_at = Some(Utc::now());
                }
                ctx.metrics.processing.record_processed();
                CrawlResult::success(processed, Stage::Processing)
            }
            Err(error) => {
                ctx.metrics.processing.record_failed();
                CrawlResult::failure(url, error, Stage::Processing, false)
            }
        };
        if !send_or_cancel(&ctx.output_tx, result, &ctx.cancel).await {
            break;
        }
    }
}

/// Output: forward to the caller, write to the sink, checkpoint successes.
pub(crate) async fn output_worker(ctx: Arc<StageContext>, rx: SharedReceiver<CrawlResult>) {
    while let Some(result) = next_item(&rx, &ctx.cancel).await {
        let result = if result.success {
            ctx.resources.checkpoint(&result.url);
            result.at_stage(Stage::Output)
        } else {
            result
        };

        if let Some(sink) = ctx.sink.as_ref() {
            if let Err(error) = sink.write(&result).await {
                warn!(sink = sink.name(), url = %result.url, %error, "Sink write failed");
            }
        }

        ctx.metrics.output.record_processed();
        if !send_or_cancel(&ctx.results_tx, result, &ctx.cancel).await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_http_and_https() {
        assert!(normalize_url("https://example.com/a").is_ok());
        assert!(normalize_url("http://example.com").is_ok());
        assert!(normalize_url("  https://example.com/padded  ").is_ok());
    }

    #[test]
    fn normalize_rejects_malformed_urls() {
        for bad in ["", "   ", "not a url", "ftp://example.com", "https://"] {
            let err = normalize_url(bad).unwrap_err();
            assert!(
                matches!(err, CrawlError::InvalidUrl { .. }),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_url("https://example.com/a").unwrap();
        let twice = normalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }
}
