//! Sequential reference searcher
//!
//! Walks 0, 1, 2, ... on the calling thread. Minimality follows from the
//! walk order; the parallel searcher is checked against this one.

use super::{
    mining_span, MiningStats, NonceSearcher, SearchControl, SearchEvent, SearchOptions,
    StopReason, HASH_BATCH,
};
use crate::crypto::hash_meets_difficulty;
use crate::encoding::CandidateEncoder;
use crate::types::{BlockDescriptor, MiningResult, Nonce, SearchStats};
use crate::{Error, Result};
use std::time::Instant;
use tracing::{debug, info};

/// Single-threaded nonce searcher
#[derive(Debug, Clone, Default)]
pub struct SequentialSearcher {
    options: SearchOptions,
}

impl SequentialSearcher {
    /// Create a sequential searcher; `options.workers` is ignored
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }
}

impl NonceSearcher for SequentialSearcher {
    fn searcher_type(&self) -> &'static str {
        "sequential"
    }

    fn search(&self, block: &BlockDescriptor, control: &SearchControl) -> Result<MiningResult> {
        let span = mining_span(self.searcher_type(), block);
        let _enter = span.enter();

        let encoder = CandidateEncoder::new(block, self.options.encoding)?;
        let zeros = block.difficulty().zeros();
        let max_nonce = self.options.max_nonce;
        let start = Instant::now();
        let deadline = self.options.timeout.map(|timeout| start + timeout);
        let mut last_progress = start;

        control.emit(SearchEvent::Started {
            difficulty: block.difficulty(),
            workers: 1,
        });
        debug!(
            "Starting sequential search up to nonce {} ({} encoding)",
            max_nonce,
            encoder.encoding()
        );

        let mut nonce = Nonce::new(0);
        let mut hashes = 0u64;
        loop {
            if hashes % HASH_BATCH == 0 {
                let stop = if control.is_cancelled() {
                    Some(StopReason::Cancelled)
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    Some(StopReason::TimedOut)
                } else {
                    None
                };
                if let Some(reason) = stop {
                    return Err(stopped(control, reason, hashes, start, max_nonce));
                }
                if last_progress.elapsed() >= self.options.progress_interval {
                    control.emit(SearchEvent::Progress(MiningStats::new(hashes, start.elapsed())));
                    last_progress = Instant::now();
                }
            }

            let hash = encoder.hash(nonce);
            hashes += 1;
            if hash_meets_difficulty(&hash, zeros) {
                let digest = encoder.digest(nonce);
                let result = MiningResult::new(digest, nonce, start.elapsed(), hashes, 1);
                info!("Found nonce {} after {} hashes", nonce, hashes);
                control.emit(SearchEvent::Found(result.clone()));
                return Ok(result);
            }

            nonce = match nonce.checked_increment() {
                Some(next) if next <= max_nonce => next,
                _ => {
                    let reason = StopReason::NonceExhausted;
                    return Err(stopped(control, reason, hashes, start, max_nonce));
                }
            };
        }
    }
}

fn stopped(
    control: &SearchControl,
    reason: StopReason,
    hashes: u64,
    start: Instant,
    max_nonce: Nonce,
) -> Error {
    let stats = SearchStats {
        hashes,
        elapsed: start.elapsed(),
    };
    info!("Sequential search stopped ({:?}) after {} hashes", reason, hashes);
    control.emit(SearchEvent::Stopped { reason, stats });
    reason.into_error(stats, max_nonce)
}
