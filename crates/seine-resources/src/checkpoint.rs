//! Append-only checkpoint log of completed URLs.
//!
//! `checkpoint()` never blocks: entries go through a bounded in-memory
//! buffer and overflow is dropped (the log is a restart hint; readers
//! tolerate both duplicates and omissions). A background writer flushes on
//! an interval tick or when enough entries accumulate. Lines are the URL
//! verbatim, newline-terminated.

use crate::metrics::ResourceMetrics;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// In-memory buffer capacity; overflow is dropped.
const BUFFER_CAPACITY: usize = 1024;
/// Pending entries that force a flush ahead of the interval.
const FLUSH_THRESHOLD: usize = 128;

/// Durable append-only log of completed URLs.
pub struct CheckpointLog {
    tx: Mutex<Option<mpsc::Sender<String>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<ResourceMetrics>,
}

impl CheckpointLog {
    /// Open (creating parent directories as needed) and start the writer.
    pub(crate) async fn open(
        path: PathBuf,
        interval: Duration,
        metrics: Arc<ResourceMetrics>,
    ) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(BUFFER_CAPACITY);
        let writer = tokio::spawn(write_loop(path, file, rx, interval, metrics.clone()));

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            metrics,
        })
    }

    /// Enqueue a completed URL. Non-blocking; drops on overflow or after
    /// close.
    pub fn checkpoint(&self, url: &str) {
        let dropped = match self.tx.lock().as_ref() {
            Some(tx) => tx.try_send(url.to_string()).is_err(),
            None => true,
        };
        if dropped {
            self.metrics
                .checkpoint_dropped
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drain pending entries, flush, and stop the writer. Idempotent.
    pub(crate) async fn close(&self) {
        // Dropping the sender lets the writer drain and exit.
        drop(self.tx.lock().take());
        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Checkpoint writer task failed");
            }
        }
    }
}

async fn write_loop(
    path: PathBuf,
    file: tokio::fs::File,
    mut rx: mpsc::Receiver<String>,
    interval: Duration,
    metrics: Arc<ResourceMetrics>,
) {
    let mut out = BufWriter::new(file);
    let mut pending: Vec<String> = Vec::new();
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            entry = rx.recv() => match entry {
                Some(url) => {
                    pending.push(url);
                    if pending.len() >= FLUSH_THRESHOLD {
                        flush_pending(&path, &mut out, &mut pending, &metrics).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    flush_pending(&path, &mut out, &mut pending, &metrics).await;
                }
            }
        }
    }

    // Sender gone: drain whatever is left and flush once more.
    while let Ok(url) = rx.try_recv() {
        pending.push(url);
    }
    flush_pending(&path, &mut out, &mut pending, &metrics).await;
    debug!(path = %path.display(), "Checkpoint writer stopped");
}

async fn flush_pending(
    path: &Path,
    out: &mut BufWriter<tokio::fs::File>,
    pending: &mut Vec<String>,
    metrics: &ResourceMetrics,
) {
    let count = pending.len() as u64;
    for url in pending.drain(..) {
        if let Err(e) = out.write_all(url.as_bytes()).await {
            error!(path = %path.display(), error = %e, "Checkpoint write failed");
            return;
        }
        if let Err(e) = out.write_all(b"\n").await {
            error!(path = %path.display(), error = %e, "Checkpoint write failed");
            return;
        }
    }
    if let Err(e) = out.flush().await {
        error!(path = %path.display(), error = %e, "Checkpoint flush failed");
        return;
    }
    metrics.checkpoint_written.fetch_add(count, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_lines(path: &Path) -> Vec<String> {
        let contents = tokio::fs::read_to_string(path).await.unwrap_or_default();
        contents.lines().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn close_drains_and_persists_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.log");
        let log = CheckpointLog::open(
            path.clone(),
            Duration::from_secs(60),
            Arc::new(ResourceMetrics::new()),
        )
        .await
        .unwrap();

        log.checkpoint("https://example.com/a");
        log.checkpoint("https://example.com/b");
        log.close().await;

        let lines = read_lines(&path).await;
        assert_eq!(
            lines,
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[tokio::test]
    async fn interval_flush_persists_without_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.log");
        let log = CheckpointLog::open(
            path.clone(),
            Duration::from_millis(1),
            Arc::new(ResourceMetrics::new()),
        )
        .await
        .unwrap();

        log.checkpoint("https://example.com/a");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let lines = read_lines(&path).await;
        assert_eq!(lines, vec!["https://example.com/a"]);
        log.close().await;
    }

    #[tokio::test]
    async fn checkpoint_after_close_drops_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.log");
        let metrics = Arc::new(ResourceMetrics::new());
        let log = CheckpointLog::open(path.clone(), Duration::from_secs(60), metrics.clone())
            .await
            .unwrap();

        log.close().await;
        log.checkpoint("https://example.com/late");

        assert_eq!(metrics.checkpoint_dropped.load(Ordering::Relaxed), 1);
        assert!(read_lines(&path).await.is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.log");
        let log = CheckpointLog::open(
            path,
            Duration::from_secs(60),
            Arc::new(ResourceMetrics::new()),
        )
        .await
        .unwrap();
        log.close().await;
        log.close().await;
    }

    #[tokio::test]
    async fn appends_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.log");
        for url in ["https://example.com/1", "https://example.com/2"] {
            let log = CheckpointLog::open(
                path.clone(),
                Duration::from_secs(60),
                Arc::new(ResourceMetrics::new()),
            )
            .await
            .unwrap();
            log.checkpoint(url);
            log.close().await;
        }
        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), 2);
    }
}
