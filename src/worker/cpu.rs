//! CPU searcher implementation
//!
//! Multi-threaded nonce search. Worker `k` of `W` tests the residue class
//! `k, k + W, k + 2W, ...`. The first worker to find a qualifying nonce
//! raises the `found` flag and records its nonce with an atomic minimum;
//! every worker keeps going until its next nonce is above the best one seen,
//! so all smaller nonces are still tested and the result is the same one a
//! sequential walk would find.

use super::{
    mining_span, MiningStats, NonceSearcher, SearchControl, SearchEvent, SearchOptions,
    StopReason, HASH_BATCH,
};
use crate::crypto::hash_meets_difficulty;
use crate::encoding::CandidateEncoder;
use crate::types::{BlockDescriptor, MiningResult, Nonce, SearchStats};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the coordinating thread checks the deadline and the abort
/// signal when no worker wakes it earlier
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// CPU searcher using multiple threads
#[derive(Debug, Clone, Default)]
pub struct CpuSearcher {
    options: SearchOptions,
}

/// State shared by all workers of one search
#[derive(Debug)]
struct SharedSearch {
    found: AtomicBool,
    best_nonce: AtomicU64,
    stop: AtomicU8,
    hashes: AtomicU64,
}

const STOP_NONE: u8 = 0;
const STOP_CANCELLED: u8 = 1;
const STOP_TIMED_OUT: u8 = 2;
const STOP_FAILED: u8 = 3;

impl SharedSearch {
    fn new() -> Self {
        Self {
            found: AtomicBool::new(false),
            best_nonce: AtomicU64::new(u64::MAX),
            stop: AtomicU8::new(STOP_NONE),
            hashes: AtomicU64::new(0),
        }
    }

    #[inline]
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed) != STOP_NONE
    }

    /// Raise the stop flag; only the first reason is kept
    fn request_stop(&self, reason: u8) {
        let _ = self
            .stop
            .compare_exchange(STOP_NONE, reason, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn stop_reason(&self) -> Option<StopReason> {
        match self.stop.load(Ordering::SeqCst) {
            STOP_CANCELLED => Some(StopReason::Cancelled),
            STOP_TIMED_OUT => Some(StopReason::TimedOut),
            STOP_FAILED => Some(StopReason::Failed),
            _ => None,
        }
    }

    /// Keep the smallest qualifying nonce seen so far
    fn record_found(&self, nonce: u64) {
        self.best_nonce.fetch_min(nonce, Ordering::SeqCst);
        self.found.store(true, Ordering::SeqCst);
    }

    fn best(&self) -> Option<Nonce> {
        if self.found.load(Ordering::SeqCst) {
            Some(Nonce::new(self.best_nonce.load(Ordering::SeqCst)))
        } else {
            None
        }
    }

    /// Whether a nonce at or above `nonce` can no longer win
    #[inline]
    fn is_beaten(&self, nonce: u64) -> bool {
        self.found.load(Ordering::Acquire) && nonce > self.best_nonce.load(Ordering::Acquire)
    }

    /// Turn the abort signal and the deadline into a stop request.
    ///
    /// Cancellation always stops the search. The deadline only applies
    /// while no winner is recorded.
    fn apply_signals(&self, cancelled: bool, deadline: Option<Instant>, now: Instant) {
        if cancelled {
            self.request_stop(STOP_CANCELLED);
        }
        if !self.found.load(Ordering::SeqCst) && deadline.is_some_and(|d| now >= d) {
            self.request_stop(STOP_TIMED_OUT);
        }
    }

    fn stats(&self, start: Instant) -> SearchStats {
        SearchStats {
            hashes: self.hashes.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// How a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// Found a qualifying nonce or was overtaken by a smaller one
    Settled,
    /// Ran past `max_nonce`
    Exhausted,
    /// Stop flag raised
    Stopped,
}

impl CpuSearcher {
    /// Create a new CPU searcher
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    /// Number of worker threads this searcher runs
    pub fn worker_count(&self) -> usize {
        self.options.effective_workers()
    }

    /// Search one residue class of the nonce space
    fn worker_loop(
        worker_id: usize,
        stride: u64,
        encoder: &CandidateEncoder,
        zeros: u32,
        max_nonce: u64,
        shared: &SharedSearch,
    ) -> WorkerExit {
        debug!("Starting worker {}", worker_id);

        let mut nonce = worker_id as u64;
        let mut pending = 0u64;
        let exit = if nonce > max_nonce {
            WorkerExit::Exhausted
        } else {
            loop {
                if shared.should_stop() {
                    break WorkerExit::Stopped;
                }
                if shared.is_beaten(nonce) {
                    break WorkerExit::Settled;
                }

                let hash = encoder.hash(Nonce::new(nonce));
                pending += 1;
                if pending == HASH_BATCH {
                    shared.hashes.fetch_add(pending, Ordering::Relaxed);
                    pending = 0;
                }

                if hash_meets_difficulty(&hash, zeros) {
                    info!("Worker {} found qualifying nonce {}", worker_id, nonce);
                    shared.record_found(nonce);
                    break WorkerExit::Settled;
                }

                match nonce.checked_add(stride) {
                    Some(next) if next <= max_nonce => nonce = next,
                    _ => break WorkerExit::Exhausted,
                }
            }
        };

        shared.hashes.fetch_add(pending, Ordering::Relaxed);
        debug!("Worker {} finished: {:?}", worker_id, exit);
        exit
    }

    /// Watch the deadline and the abort signal until every worker is done
    fn supervise(
        &self,
        handles: &[thread::ScopedJoinHandle<'_, WorkerExit>],
        shared: &SharedSearch,
        control: &SearchControl,
        start: Instant,
    ) {
        let deadline = self.options.timeout.map(|timeout| start + timeout);
        let mut last_progress = start;

        while !handles.iter().all(|handle| handle.is_finished()) {
            shared.apply_signals(control.is_cancelled(), deadline, Instant::now());
            if last_progress.elapsed() >= self.options.progress_interval {
                let stats = shared.stats(start);
                let progress = MiningStats::new(stats.hashes, stats.elapsed);
                control.emit(SearchEvent::Progress(progress));
                last_progress = Instant::now();
            }
            thread::park_timeout(POLL_INTERVAL);
        }
    }
}

impl NonceSearcher for CpuSearcher {
    fn searcher_type(&self) -> &'static str {
        "cpu"
    }

    fn search(&self, block: &BlockDescriptor, control: &SearchControl) -> Result<MiningResult> {
        let span = mining_span(self.searcher_type(), block);
        let _enter = span.enter();

        let encoder = CandidateEncoder::new(block, self.options.encoding)?;
        let workers = self.worker_count();
        let zeros = block.difficulty().zeros();
        let max_nonce = self.options.max_nonce;
        let shared = SharedSearch::new();
        let start = Instant::now();

        info!(
            "Starting CPU search with {} workers (difficulty: {}, encoding: {})",
            workers,
            block.difficulty(),
            encoder.encoding()
        );
        debug!("Expected attempts: {:.0}", block.difficulty().expected_attempts());
        control.emit(SearchEvent::Started {
            difficulty: block.difficulty(),
            workers,
        });

        let exits = thread::scope(|scope| -> Result<Vec<WorkerExit>> {
            let coordinator = thread::current();
            let mut handles = Vec::with_capacity(workers);

            for worker_id in 0..workers {
                let encoder = &encoder;
                let shared = &shared;
                let coordinator = coordinator.clone();
                let spawned = thread::Builder::new()
                    .name(format!("pow-worker-{}", worker_id))
                    .spawn_scoped(scope, move || {
                        let exit = Self::worker_loop(
                            worker_id,
                            workers as u64,
                            encoder,
                            zeros,
                            max_nonce.value(),
                            shared,
                        );
                        coordinator.unpark();
                        exit
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        shared.request_stop(STOP_FAILED);
                        return Err(Error::worker(format!(
                            "failed to spawn worker {}: {}",
                            worker_id, e
                        )));
                    }
                }
            }

            self.supervise(&handles, &shared, control, start);

            handles
                .into_iter()
                .enumerate()
                .map(|(worker_id, handle)| {
                    handle
                        .join()
                        .map_err(|_| Error::worker(format!("worker {} panicked", worker_id)))
                })
                .collect()
        });

        let exits = match exits {
            Ok(exits) => exits,
            Err(e) => {
                warn!("CPU search failed: {}", e);
                control.emit(SearchEvent::Stopped {
                    reason: StopReason::Failed,
                    stats: shared.stats(start),
                });
                return Err(e);
            }
        };

        let stats = shared.stats(start);
        let reason = match resolve(&shared, &exits) {
            Ok(nonce) => {
                let digest = encoder.digest(nonce);
                let result =
                    MiningResult::new(digest, nonce, stats.elapsed, stats.hashes, workers);
                info!(
                    "CPU search found nonce {} after {} hashes ({:.2} H/s)",
                    nonce,
                    stats.hashes,
                    result.hash_rate()
                );
                control.emit(SearchEvent::Found(result.clone()));
                return Ok(result);
            }
            Err(reason) => reason,
        };
        info!("CPU search stopped ({:?}) after {} hashes", reason, stats.hashes);
        control.emit(SearchEvent::Stopped { reason, stats });
        Err(reason.into_error(stats, max_nonce))
    }
}

/// Decide the outcome once every worker has exited.
///
/// A stop raised before every worker settled leaves smaller nonces
/// untested, so a recorded winner only counts when no stop was raised.
fn resolve(
    shared: &SharedSearch,
    exits: &[WorkerExit],
) -> std::result::Result<Nonce, StopReason> {
    let reason = shared.stop_reason();
    if let (Some(nonce), None) = (shared.best(), reason) {
        return Ok(nonce);
    }
    if exits.iter().all(|exit| *exit == WorkerExit::Exhausted) {
        return Err(StopReason::NonceExhausted);
    }
    Err(reason.unwrap_or(StopReason::Failed))
}
