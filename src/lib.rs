//! Proof-of-work miner
//!
//! Searches for the smallest nonce whose SHA-256 digest, taken over a block
//! descriptor and the nonce, starts with a required number of zero hex
//! digits:
//! - Sequential reference search and a multi-threaded CPU search that
//!   returns the same nonce for any worker count
//! - Cancellation through a token, optional deadline and nonce bound
//! - Progress events for an external reporter

pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;
pub mod worker;

pub use config::Config;
pub use encoding::{CandidateEncoder, CandidateEncoding};
pub use error::{Error, Result};
pub use types::*;
pub use worker::{
    CpuSearcher, MiningStats, NonceSearcher, SearchControl, SearchEvent, SearchOptions,
    SequentialSearcher, StopReason,
};

use tokio_util::sync::CancellationToken;

/// Application information
pub const APP_NAME: &str = "pow-miner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Mine a block with default options, using every CPU core.
///
/// The difficulty is validated before any hashing. When `cancellation`
/// fires before a qualifying nonce is confirmed, the call returns
/// [`Error::Cancelled`] with the statistics collected so far.
pub fn mine(
    block_number: u64,
    transactions: &str,
    previous_hash: &str,
    difficulty: u64,
    cancellation: Option<CancellationToken>,
) -> Result<MiningResult> {
    let block = BlockDescriptor::new(block_number, transactions, previous_hash, difficulty)?;
    let mut control = SearchControl::new();
    if let Some(token) = cancellation {
        control = control.with_cancellation(token);
    }
    mine_with(&block, &SearchOptions::default(), control)
}

/// Mine `block` with explicit options and caller-side control
pub fn mine_with(
    block: &BlockDescriptor,
    options: &SearchOptions,
    control: SearchControl,
) -> Result<MiningResult> {
    CpuSearcher::new(options.clone()).search(block, &control)
}

/// Run [`mine_with`] on tokio's blocking pool.
///
/// Dropping the returned future cancels the search, so a caller that gives
/// up through `select!` or `tokio::time::timeout` does not leave workers
/// running. The caller's own token is never cancelled by this.
pub async fn mine_async(
    block: BlockDescriptor,
    options: SearchOptions,
    control: SearchControl,
) -> Result<MiningResult> {
    let search_token = control.cancellation().child_token();
    let _guard = search_token.clone().drop_guard();
    let control = control.with_cancellation(search_token);

    tokio::task::spawn_blocking(move || mine_with(&block, &options, control))
        .await
        .map_err(|e| Error::worker(format!("mining task failed: {}", e)))?
}
