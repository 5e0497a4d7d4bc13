//! Time-series delivery (§4.5): everything that is *not* current state —
//! ping RTT/loss samples and interface counters — is shipped out-of-band to
//! an external store. Per §7/§8 scenario F, an outage in that store must
//! never block a sweep: samples queue in a bounded in-memory buffer and the
//! oldest entries are dropped once it fills, rather than back-pressuring the
//! worker loop or growing without bound.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// One data point bound for the time-series store. `metric` is one of the
/// names listed in §6 (`device_ping_rtt_ms`, `interface_in_octets`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub metric: &'static str,
    pub device_id: String,
    pub interface_id: Option<String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    #[must_use]
    pub fn device(metric: &'static str, device_id: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric,
            device_id: device_id.into(),
            interface_id: None,
            value,
            timestamp,
        }
    }

    #[must_use]
    pub fn interface(
        metric: &'static str,
        device_id: impl Into<String>,
        interface_id: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            metric,
            device_id: device_id.into(),
            interface_id: Some(interface_id.into()),
            value,
            timestamp,
        }
    }
}

/// Delivery backend for batches of [`Sample`]s. Implemented by the HTTP
/// client below and by an in-memory fake for tests.
#[async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    async fn write_batch(&self, samples: &[Sample]) -> Result<()>;
}

/// Pushes batches to a remote time-series ingest endpoint (e.g. a
/// Prometheus remote-write-compatible or InfluxDB-line-protocol gateway,
/// selected by deployment — this client speaks plain JSON to whatever
/// shim fronts it).
pub struct HttpTimeSeriesBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTimeSeriesBackend {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TimeSeriesBackend for HttpTimeSeriesBackend {
    async fn write_batch(&self, samples: &[Sample]) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(samples)
            .send()
            .await
            .map_err(|e| Error::transient("timeseries_write", e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::transient(
                "timeseries_write",
                format!("store responded with {}", response.status()),
            ))
        }
    }
}

/// Buffers samples in memory and flushes them in batches. A full buffer
/// drops the oldest entries first — recent state matters more than
/// complete history during an outage, and current-state reads never go
/// through this path at all (§4.5).
pub struct TimeSeriesBuffer {
    backend: Box<dyn TimeSeriesBackend>,
    queue: Mutex<VecDeque<Sample>>,
    capacity: usize,
    batch_size: usize,
}

impl TimeSeriesBuffer {
    #[must_use]
    pub fn new(backend: Box<dyn TimeSeriesBackend>, capacity: usize, batch_size: usize) -> Self {
        Self {
            backend,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            batch_size,
        }
    }

    /// Enqueues a sample. Returns `true` if an older sample was dropped to
    /// make room — callers should increment a dropped-samples counter.
    pub fn enqueue(&self, sample: Sample) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let dropped = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(sample);
        dropped
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Drains up to one batch and attempts delivery. On failure the batch is
    /// pushed back to the front of the queue so the next flush retries it,
    /// unless that would itself overflow the buffer, in which case it is
    /// dropped and the caller is told how many samples were lost.
    pub async fn flush_one_batch(&self) -> Result<FlushOutcome> {
        let batch: Vec<Sample> = {
            let mut queue = self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let n = self.batch_size.min(queue.len());
            queue.drain(..n).collect()
        };
        if batch.is_empty() {
            return Ok(FlushOutcome {
                delivered: 0,
                dropped: 0,
            });
        }

        match self.backend.write_batch(&batch).await {
            Ok(()) => {
                debug!(count = batch.len(), "flushed time-series batch");
                Ok(FlushOutcome {
                    delivered: batch.len(),
                    dropped: 0,
                })
            }
            Err(e) => {
                warn!(error = %e, count = batch.len(), "time-series write failed, requeuing batch");
                let mut queue = self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let mut dropped = 0;
                for sample in batch.into_iter().rev() {
                    if queue.len() >= self.capacity {
                        dropped += 1;
                    } else {
                        queue.push_front(sample);
                    }
                }
                Ok(FlushOutcome {
                    delivered: 0,
                    dropped,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlushOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingBackend;

    #[async_trait]
    impl TimeSeriesBackend for FailingBackend {
        async fn write_batch(&self, _samples: &[Sample]) -> Result<()> {
            Err(Error::transient("timeseries_write", "store unreachable"))
        }
    }

    struct CountingBackend {
        received: AtomicUsize,
    }

    #[async_trait]
    impl TimeSeriesBackend for CountingBackend {
        async fn write_batch(&self, samples: &[Sample]) -> Result<()> {
            self.received.fetch_add(samples.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample(n: i32) -> Sample {
        Sample::device("device_ping_rtt_ms", format!("dev-{n}"), f64::from(n), Utc::now())
    }

    #[test]
    fn enqueue_drops_oldest_once_full() {
        let buffer = TimeSeriesBuffer::new(Box::new(FailingBackend), 2, 10);
        assert!(!buffer.enqueue(sample(1)));
        assert!(!buffer.enqueue(sample(2)));
        assert!(buffer.enqueue(sample(3)));
        assert_eq!(buffer.depth(), 2);
    }

    #[tokio::test]
    async fn failed_flush_requeues_without_losing_samples_under_capacity() {
        let buffer = TimeSeriesBuffer::new(Box::new(FailingBackend), 10, 10);
        buffer.enqueue(sample(1));
        buffer.enqueue(sample(2));
        let outcome = buffer.flush_one_batch().await.unwrap();
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.dropped, 0);
        assert_eq!(buffer.depth(), 2);
    }

    #[tokio::test]
    async fn successful_flush_drains_batch_size_samples() {
        let backend = CountingBackend {
            received: AtomicUsize::new(0),
        };
        let buffer = TimeSeriesBuffer::new(Box::new(backend), 100, 2);
        for i in 0..5 {
            buffer.enqueue(sample(i));
        }
        let outcome = buffer.flush_one_batch().await.unwrap();
        assert_eq!(outcome.delivered, 2);
        assert_eq!(buffer.depth(), 3);
    }
}
