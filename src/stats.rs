//! Throughput accounting.
//!
//! [`ThroughputCounters`] is created once per process and shared (via `Arc`)
//! between the task loop, which records each successfully reported document,
//! and the [`ThroughputMonitor`], which only reads. Both counters live
//! behind one lock so a reader always sees a document and its pages
//! together.

use crate::shutdown::Shutdown;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    documents: u64,
    pages: u64,
}

/// Cumulative documents and pages completed since process start.
#[derive(Debug)]
pub struct ThroughputCounters {
    totals: Mutex<Totals>,
    started: Instant,
}

impl Default for ThroughputCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputCounters {
    pub fn new() -> Self {
        Self {
            totals: Mutex::new(Totals::default()),
            started: Instant::now(),
        }
    }

    /// Record one fully reported document of `pages` pages.
    pub fn record_document(&self, pages: usize) {
        let mut t = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        t.documents += 1;
        t.pages += pages as u64;
    }

    /// Consistent point-in-time view of both counters.
    pub fn snapshot(&self) -> ThroughputSnapshot {
        let t = *self.totals.lock().unwrap_or_else(|e| e.into_inner());
        ThroughputSnapshot {
            documents: t.documents,
            pages: t.pages,
            elapsed: self.started.elapsed(),
        }
    }
}

/// One sample of the counters plus derived rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSnapshot {
    pub documents: u64,
    pub pages: u64,
    pub elapsed: Duration,
}

impl ThroughputSnapshot {
    pub fn documents_per_sec(&self) -> f64 {
        rate(self.documents, self.elapsed.as_secs_f64())
    }

    pub fn documents_per_min(&self) -> f64 {
        rate(self.documents, self.elapsed.as_secs_f64() / 60.0)
    }

    pub fn pages_per_sec(&self) -> f64 {
        rate(self.pages, self.elapsed.as_secs_f64())
    }

    pub fn pages_per_min(&self) -> f64 {
        rate(self.pages, self.elapsed.as_secs_f64() / 60.0)
    }
}

fn rate(count: u64, span: f64) -> f64 {
    if span > 0.0 {
        count as f64 / span
    } else {
        0.0
    }
}

/// Periodically logs throughput until shutdown.
pub struct ThroughputMonitor {
    counters: Arc<ThroughputCounters>,
    interval: Duration,
}

impl ThroughputMonitor {
    pub fn new(counters: Arc<ThroughputCounters>, interval: Duration) -> Self {
        Self { counters, interval }
    }

    /// Take one sample without logging.
    pub fn sample(&self) -> ThroughputSnapshot {
        self.counters.snapshot()
    }

    /// Log one line per interval; returns when `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip the all-zero line.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => log_snapshot(&self.sample()),
                _ = shutdown.cancelled() => break,
            }
        }
        log_snapshot(&self.sample());
    }
}

fn log_snapshot(s: &ThroughputSnapshot) {
    info!(
        "Throughput: {} files ({:.3}/s, {:.2}/min), {} pages ({:.3}/s, {:.2}/min) over {:.1}s",
        s.documents,
        s.documents_per_sec(),
        s.documents_per_min(),
        s.pages,
        s.pages_per_sec(),
        s.pages_per_min(),
        s.elapsed.as_secs_f64()
    );
}
