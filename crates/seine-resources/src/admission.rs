//! Admission control: the global in-flight extraction budget.
//!
//! A semaphore bounds how many workers fetch concurrently. Slots are RAII
//! guards, so every early return on the extraction path releases exactly
//! once.

use crate::metrics::ResourceMetrics;
use seine_types::errors::Result;
use seine_types::CrawlError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Bounded admission to the fetch path. Disabled when `max_in_flight` is 0.
pub struct Admission {
    semaphore: Option<Arc<Semaphore>>,
    max_in_flight: usize,
    metrics: Arc<ResourceMetrics>,
}

impl Admission {
    pub(crate) fn new(max_in_flight: usize, metrics: Arc<ResourceMetrics>) -> Self {
        let semaphore = (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight)));
        Self {
            semaphore,
            max_in_flight,
            metrics,
        }
    }

    /// Wait for a free slot. Returns immediately when admission is disabled.
    /// Fails with `ShutdownClosed` once the manager has been closed; callers
    /// cancel by dropping the future.
    pub async fn acquire(&self) -> Result<AdmissionSlot> {
        let Some(semaphore) = self.semaphore.as_ref() else {
            return Ok(AdmissionSlot {
                _permit: None,
                metrics: None,
            });
        };

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CrawlError::ShutdownClosed)?;

        let active = self.metrics.admission_active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(active, max = self.max_in_flight, "Acquired admission slot");

        Ok(AdmissionSlot {
            _permit: Some(permit),
            metrics: Some(self.metrics.clone()),
        })
    }

    /// Close the budget: pending and future acquires fail.
    pub(crate) fn close(&self) {
        if let Some(semaphore) = self.semaphore.as_ref() {
            semaphore.close();
        }
    }

    /// Free slots right now; `max_in_flight` when disabled.
    pub fn available(&self) -> usize {
        self.semaphore
            .as_ref()
            .map_or(self.max_in_flight, |s| s.available_permits())
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}

/// RAII admission slot; dropping it returns the slot to the budget.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: Option<OwnedSemaphorePermit>,
    metrics: Option<Arc<ResourceMetrics>>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        if let Some(metrics) = self.metrics.take() {
            metrics.admission_active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn admission(max: usize) -> Admission {
        Admission::new(max, Arc::new(ResourceMetrics::new()))
    }

    #[tokio::test]
    async fn slots_are_bounded_and_returned_on_drop() {
        let admission = admission(2);
        let slot1 = admission.acquire().await.unwrap();
        let slot2 = admission.acquire().await.unwrap();
        assert_eq!(admission.available(), 0);

        drop(slot1);
        assert_eq!(admission.available(), 1);
        drop(slot2);
        assert_eq!(admission.available(), 2);
    }

    #[tokio::test]
    async fn acquire_blocks_at_capacity() {
        let admission = Arc::new(admission(1));
        let _held = admission.acquire().await.unwrap();

        let contender = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());
        contender.abort();
    }

    #[tokio::test]
    async fn zero_budget_disables_admission() {
        let admission = admission(0);
        for _ in 0..100 {
            let _slot = admission.acquire().await.unwrap();
        }
        assert_eq!(admission.available(), 0);
    }

    #[tokio::test]
    async fn close_fails_pending_and_future_acquires() {
        let admission = Arc::new(admission(1));
        let held = admission.acquire().await.unwrap();

        let pending = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        admission.close();
        assert!(matches!(
            pending.await.unwrap(),
            Err(CrawlError::ShutdownClosed)
        ));
        assert!(matches!(
            admission.acquire().await,
            Err(CrawlError::ShutdownClosed)
        ));
        drop(held);
    }

    #[tokio::test]
    async fn active_count_tracks_outstanding_slots() {
        let metrics = Arc::new(ResourceMetrics::new());
        let admission = Admission::new(4, metrics.clone());

        let a = admission.acquire().await.unwrap();
        let b = admission.acquire().await.unwrap();
        assert_eq!(metrics.admission_active.load(Ordering::SeqCst), 2);

        drop(a);
        drop(b);
        assert_eq!(metrics.admission_active.load(Ordering::SeqCst), 0);
    }
}
