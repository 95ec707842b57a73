//! Nonce searchers
//!
//! A searcher walks the nonce space of one block descriptor until it finds
//! the smallest nonce whose digest meets the block's difficulty, or until it
//! is stopped. Two implementations share the same contract: a sequential
//! reference searcher and a multi-threaded CPU searcher.

use crate::encoding::CandidateEncoding;
use crate::types::{BlockDescriptor, Difficulty, MiningResult, Nonce, SearchStats};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

pub mod cpu;
pub mod sequential;

pub use cpu::CpuSearcher;
pub use sequential::SequentialSearcher;

/// Default interval between progress events
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Hashes a worker computes between checks of the clock and between
/// updates of the shared hash counter
pub(crate) const HASH_BATCH: u64 = 4096;

/// Progress snapshot for a running search
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MiningStats {
    /// Total hashes computed so far
    pub hashes: u64,
    /// Time spent searching
    pub elapsed: Duration,
    /// Average hash rate (hashes per second)
    pub hash_rate: f64,
}

impl MiningStats {
    pub fn new(hashes: u64, elapsed: Duration) -> Self {
        Self {
            hashes,
            elapsed,
            hash_rate: compute_hash_rate(hashes, elapsed),
        }
    }
}

/// Why a search ended without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    Cancelled,
    TimedOut,
    NonceExhausted,
    Failed,
}

impl StopReason {
    /// The error reported to the caller for this stop
    pub fn into_error(self, stats: SearchStats, max_nonce: Nonce) -> Error {
        match self {
            StopReason::Cancelled => Error::Cancelled { stats },
            StopReason::TimedOut => Error::TimedOut { stats },
            StopReason::NonceExhausted => Error::NonceExhausted {
                limit: max_nonce.value(),
                stats,
            },
            StopReason::Failed => Error::worker("search failed"),
        }
    }
}

/// Notifications for an external reporter
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// The search is about to start hashing
    Started { difficulty: Difficulty, workers: usize },
    /// Periodic progress
    Progress(MiningStats),
    /// A qualifying nonce was found and confirmed minimal
    Found(MiningResult),
    /// The search ended without a result
    Stopped { reason: StopReason, stats: SearchStats },
}

/// Tuning knobs for a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Worker threads; 0 means one per CPU
    pub workers: usize,
    /// Give up after this long if nothing was found
    pub timeout: Option<Duration>,
    /// Interval between progress events
    pub progress_interval: Duration,
    /// Largest nonce that may be tried
    pub max_nonce: Nonce,
    /// Candidate byte layout
    pub encoding: CandidateEncoding,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            timeout: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_nonce: Nonce::MAX,
            encoding: CandidateEncoding::default(),
        }
    }
}

impl SearchOptions {
    /// Worker count with 0 resolved to the number of CPUs
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = Nonce::new(max_nonce);
        self
    }

    pub fn with_encoding(mut self, encoding: CandidateEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Caller-side handles for a running search: the abort signal and an
/// optional event sink
#[derive(Debug, Clone, Default)]
pub struct SearchControl {
    cancellation: CancellationToken,
    events: Option<mpsc::UnboundedSender<SearchEvent>>,
}

impl SearchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the search when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Send progress and result events to `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SearchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Deliver an event; a dropped receiver is ignored
    pub fn emit(&self, event: SearchEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Nonce searcher trait
///
/// Implementations must return the smallest qualifying nonce, so every
/// searcher agrees with a plain walk over 0, 1, 2, ...
pub trait NonceSearcher: Send + Sync {
    /// Searcher name for logging
    fn searcher_type(&self) -> &'static str;

    /// Search `block` until a result, a stop signal or nonce exhaustion
    fn search(&self, block: &BlockDescriptor, control: &SearchControl) -> Result<MiningResult>;
}

/// Compute hash rate over a time period
pub fn compute_hash_rate(hashes: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        hashes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Create a tracing span for mining operations
pub fn mining_span(searcher_type: &str, block: &BlockDescriptor) -> Span {
    tracing::info_span!(
        "mining",
        searcher = searcher_type,
        block_number = block.block_number(),
        difficulty = block.difficulty().zeros(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_rate() {
        assert_eq!(compute_hash_rate(1000, Duration::from_secs(10)), 100.0);
        assert_eq!(compute_hash_rate(0, Duration::from_secs(10)), 0.0);
        assert_eq!(compute_hash_rate(1000, Duration::from_secs(0)), 0.0);
    }

    #[test]
    fn test_mining_stats() {
        let stats = MiningStats::new(500, Duration::from_secs(5));
        assert_eq!(stats.hashes, 500);
        assert_eq!(stats.hash_rate, 100.0);
    }

    #[test]
    fn test_search_options_defaults() {
        let options = SearchOptions::default();
        assert_eq!(options.workers, 0);
        assert!(options.effective_workers() >= 1);
        assert_eq!(options.max_nonce, Nonce::MAX);
        assert_eq!(options.timeout, None);
        assert_eq!(options.encoding, CandidateEncoding::Concatenated);

        let options = options.with_workers(3).with_max_nonce(99);
        assert_eq!(options.effective_workers(), 3);
        assert_eq!(options.max_nonce, Nonce::new(99));
    }

    #[test]
    fn test_emit_without_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = SearchControl::new().with_events(tx);
        drop(rx);
        // Must not panic once the reporter has gone away.
        control.emit(SearchEvent::Progress(MiningStats::default()));
        SearchControl::new().emit(SearchEvent::Progress(MiningStats::default()));
    }
}
