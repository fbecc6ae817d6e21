//! The staged crawl pipeline.
//!
//! Construction wires four worker pools (discovery, extraction, processing,
//! output) together with bounded channels and starts a result aggregator.
//! Submission feeds seed URLs in from a detached task; the aggregator
//! forwards terminal results to the caller, and once every submitted URL
//! has produced one it cancels the pipeline and closes the caller's
//! channel. Shutdown cascades leaf-to-root: cancel, join workers, close the
//! sink, close the resource manager, stop the limiter.

use crate::config::PipelineConfig;
use crate::metrics::{PipelineMetrics, PipelineMetricsSnapshot};
use crate::processor::PassthroughProcessor;
use crate::stages::{self, SharedReceiver, StageContext};
use anyhow::{bail, Context};
use futures::future::join_all;
use seine_fetch::{FetchConfig, HttpFetcher};
use seine_limiter::{AdaptiveRateLimiter, RateLimitConfig};
use seine_resources::{ResourceConfig, ResourceManager};
use seine_types::{CrawlResult, Fetcher, OutputSink, PageProcessor, RateLimit};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Sentinel until `submit` publishes the real expected-result count.
const EXPECTED_UNSET: usize = usize::MAX;

/// Builder for a [`CrawlPipeline`].
///
/// Collaborators left unset get production defaults: an HTTP fetcher, a
/// passthrough processor, an adaptive rate limiter, and a resource manager
/// with default limits. Tests inject fakes at the same seams.
pub struct PipelineBuilder {
    config: PipelineConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    processor: Option<Arc<dyn PageProcessor>>,
    limiter: Option<Arc<dyn RateLimit>>,
    resources: Option<Arc<ResourceManager>>,
    sink: Option<Arc<dyn OutputSink>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fetcher: None,
            processor: None,
            limiter: None,
            resources: None,
            sink: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn PageProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn limiter(mut self, limiter: Arc<dyn RateLimit>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn resources(mut self, resources: Arc<ResourceManager>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build channels, start every worker pool and the aggregator, and
    /// return the pipeline handle plus the caller's result channel.
    pub async fn start(self) -> anyhow::Result<(CrawlPipeline, mpsc::Receiver<CrawlResult>)> {
        let config = self.config.validate();
        let buffer = config.buffer_size;

        let resources = match self.resources {
            Some(resources) => resources,
            None => Arc::new(
                ResourceManager::new(ResourceConfig::default())
                    .await
                    .context("building default resource manager")?,
            ),
        };

        let mut owned_limiter = None;
        let limiter: Arc<dyn RateLimit> = match self.limiter {
            Some(limiter) => limiter,
            None => {
                let adaptive = AdaptiveRateLimiter::new(RateLimitConfig::default());
                adaptive.start_reaper();
                owned_limiter = Some(adaptive.clone());
                adaptive
            }
        };

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                HttpFetcher::new(FetchConfig::default()).context("building default fetcher")?,
            ),
        };
        let processor: Arc<dyn PageProcessor> = self
            .processor
            .unwrap_or_else(|| Arc::new(PassthroughProcessor));

        let cancel = CancellationToken::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let expected = Arc::new(AtomicUsize::new(EXPECTED_UNSET));
        let retry_tasks = TaskTracker::new();

        let (seed_tx, seed_rx) = mpsc::channel::<String>(buffer);
        let (extract_tx, extract_rx) = mpsc::channel(buffer);
        let (process_tx, process_rx) = mpsc::channel(buffer);
        let (output_tx, output_rx) = mpsc::channel(buffer);
        let (results_tx, results_rx) = mpsc::channel::<CrawlResult>(buffer);
        let (caller_tx, caller_rx) = mpsc::channel::<CrawlResult>(buffer);

        let ctx = Arc::new(StageContext {
            config: config.clone(),
            cancel: cancel.clone(),
            metrics: metrics.clone(),
            limiter,
            resources: resources.clone(),
            fetcher,
            processor,
            sink: self.sink.clone(),
            extract_tx,
            process_tx,
            output_tx,
            results_tx,
            retry_tasks: retry_tasks.clone(),
        });

        let mut workers = Vec::new();
        spawn_pool(
            &mut workers,
            config.discovery_workers,
            seed_rx,
            &ctx,
            stages::discovery_worker,
        );
        spawn_pool(
            &mut workers,
            config.extraction_workers,
            extract_rx,
            &ctx,
            stages::extraction_worker,
        );
        spawn_pool(
            &mut workers,
            config.processing_workers,
            process_rx,
            &ctx,
            stages::processing_worker,
        );
        spawn_pool(
            &mut workers,
            config.output_workers,
            output_rx,
            &ctx,
            stages::output_worker,
        );

        workers.push(tokio::spawn(aggregator(
            results_rx,
            caller_tx,
            expected.clone(),
            cancel.clone(),
        )));

        // The context's stage senders must die with the workers, not with
        // the pipeline handle, so the handle keeps none of them.
        drop(ctx);

        info!(
            discovery = config.discovery_workers,
            extraction = config.extraction_workers,
            processing = config.processing_workers,
            output = config.output_workers,
            buffer,
            "Crawl pipeline started"
        );

        let pipeline = CrawlPipeline {
            cancel,
            metrics,
            resources,
            owned_limiter,
            sink: self.sink,
            seed_tx: parking_lot::Mutex::new(Some(seed_tx)),
            expected,
            workers: Mutex::new(workers),
            retry_tasks,
            shutdown_started: AtomicBool::new(false),
        };
        Ok((pipeline, caller_rx))
    }
}

fn spawn_pool<T, F, Fut>(
    workers: &mut Vec<JoinHandle<()>>,
    count: usize,
    rx: mpsc::Receiver<T>,
    ctx: &Arc<StageContext>,
    run: F,
) where
    T: Send + 'static,
    F: Fn(Arc<StageContext>, SharedReceiver<T>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let shared: SharedReceiver<T> = Arc::new(Mutex::new(rx));
    for _ in 0..count {
        workers.push(tokio::spawn(run(ctx.clone(), shared.clone())));
    }
}

/// Merge worker results into the caller channel, counting deliveries and
/// cancelling the pipeline once every submitted URL has answered. The
/// caller channel closes exactly once, when this task drops its sender.
async fn aggregator(
    mut results_rx: mpsc::Receiver<CrawlResult>,
    caller_tx: mpsc::Sender<CrawlResult>,
    expected: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    let mut delivered = 0usize;
    loop {
        let result = tokio::select! {
            // Shutdown-initiated cancellation: pending results are dropped.
            _ = cancel.cancelled() => break,
            maybe = results_rx.recv() => match maybe {
                Some(result) => result,
                None => break,
            },
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = caller_tx.send(result) => sent,
        };
        if sent.is_err() {
            // Caller dropped the receiver: nothing left to deliver to.
            cancel.cancel();
            break;
        }
        delivered += 1;
        let target = expected.load(Ordering::Acquire);
        if target != EXPECTED_UNSET && delivered >= target {
            debug!(delivered, "All expected results delivered");
            cancel.cancel();
            break;
        }
    }
}

/// Handle to a running crawl pipeline.
///
/// One submission per pipeline: [`submit`](CrawlPipeline::submit) feeds the
/// seed URLs, the receiver returned by [`PipelineBuilder::start`] yields
/// exactly one terminal result per URL and then closes, and
/// [`shutdown`](CrawlPipeline::shutdown) tears everything down.
pub struct CrawlPipeline {
    cancel: CancellationToken,
    metrics: Arc<PipelineMetrics>,
    resources: Arc<ResourceManager>,
    owned_limiter: Option<Arc<AdaptiveRateLimiter>>,
    sink: Option<Arc<dyn OutputSink>>,
    seed_tx: parking_lot::Mutex<Option<mpsc::Sender<String>>>,
    expected: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    retry_tasks: TaskTracker,
    shutdown_started: AtomicBool,
}

impl CrawlPipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Submit the seed URLs. Non-blocking: a detached task feeds them into
    /// discovery and closes the seed channel when done. Exactly one
    /// submission is accepted per pipeline.
    pub fn submit(&self, urls: Vec<String>) -> anyhow::Result<()> {
        let Some(seed_tx) = self.seed_tx.lock().take() else {
            bail!("pipeline already has a submission");
        };

        self.expected.store(urls.len(), Ordering::Release);
        info!(count = urls.len(), "Submitting seed URLs");

        if urls.is_empty() {
            // Nothing will ever be delivered; close out immediately.
            self.cancel.cancel();
            return Ok(());
        }

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            for url in urls {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = seed_tx.send(url) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            // seed_tx drops here, closing the discovery input.
        });
        Ok(())
    }

    /// Current per-stage counters.
    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Ask the sink to flush anything it has buffered.
    pub async fn flush(&self) -> anyhow::Result<()> {
        if let Some(sink) = self.sink.as_ref() {
            sink.flush().await?;
        }
        Ok(())
    }

    /// Whether cancellation has fired (explicitly or because the crawl
    /// completed).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and tear down: workers join, then the sink, resource manager,
    /// and owned limiter close, in that order. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.workers.lock().await);
        join_all(handles).await;
        self.retry_tasks.close();
        self.retry_tasks.wait().await;

        if let Some(sink) = self.sink.as_ref() {
            if let Err(error) = sink.close().await {
                tracing::warn!(sink = sink.name(), %error, "Sink close failed");
            }
        }
        self.resources.close().await;
        if let Some(limiter) = self.owned_limiter.as_ref() {
            limiter.shutdown();
        }
        info!("Crawl pipeline shut down");
    }
}
