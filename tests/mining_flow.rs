//! Integration tests for the complete mining flow

use assert_matches::assert_matches;
use pow_miner::{
    crypto::meets_difficulty, mine, mine_async, mine_with, BlockDescriptor, CandidateEncoding,
    Error, NonceSearcher, SearchControl, SearchEvent, SearchOptions, SequentialSearcher,
    StopReason,
};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

fn block(difficulty: u64) -> BlockDescriptor {
    BlockDescriptor::new(1, "A->B:1", ZERO_HASH, difficulty).unwrap()
}

#[test]
fn test_reference_block() {
    let result = mine(1, "A->B:1", ZERO_HASH, 1, None).unwrap();

    assert_eq!(result.nonce().value(), 16);
    assert_eq!(
        result.digest().to_hex(),
        "08e52546ed9090dd6b81b082b835e483593ef9875fdd0f80283798307d4b7ebe"
    );
    assert_eq!(result.attempts(), 17);
}

#[test]
fn test_known_vectors() {
    let cases = [
        (0, 0, "f3d14c96ecadf2cddbf3cf2bbca63b948cd5595312d58fce72f5f58a36743029"),
        (2, 584, "00bed818d541486ab85fab0a80dd97ede228c1d047afc620f74c10e2101f998a"),
        (3, 2559, "000dd2c8be97057f943987e4e5ed7100967878814254f0c92b3cabb5782238ad"),
    ];

    for (difficulty, nonce, digest) in cases {
        let result = mine(1, "A->B:1", ZERO_HASH, difficulty, None).unwrap();
        assert_eq!(result.nonce().value(), nonce, "difficulty {}", difficulty);
        assert_eq!(result.digest().to_hex(), digest);
    }
}

#[test]
fn test_legacy_dummy_block() {
    let result = mine(
        849001,
        "Alice mengirim 1 BTC ke Bob, Charlie mengirim 0.5 BTC ke David",
        "00000000000000000002a7b450b73f8a0c24a64e1b0f69f0b1f1d1e2e3d4f5g6",
        2,
        None,
    )
    .unwrap();

    assert_eq!(result.nonce().value(), 369);
    assert_eq!(
        result.digest().to_hex(),
        "00374cb01cf1adb662c23157e7f242cd900991d3cdce7952c785b2d616b0e6e4"
    );
}

#[test]
fn test_determinism() {
    let first = mine(7, "tx-list", "prev", 2, None).unwrap();
    let second = mine(7, "tx-list", "prev", 2, None).unwrap();

    assert_eq!(first.nonce(), second.nonce());
    assert_eq!(first.digest(), second.digest());
}

#[test]
fn test_result_is_minimal() {
    let block = block(2);
    let options = SearchOptions::default().with_workers(4);
    let result = mine_with(&block, &options, SearchControl::new()).unwrap();

    assert!(meets_difficulty(&result.digest().to_hex(), 2));
    assert!(block
        .verify(result.nonce(), result.digest(), CandidateEncoding::Concatenated)
        .unwrap());

    for nonce in 0..result.nonce().value() {
        let digest = block
            .digest_for(nonce.into(), CandidateEncoding::Concatenated)
            .unwrap();
        assert!(!meets_difficulty(&digest.to_hex(), 2), "nonce {} also qualifies", nonce);
    }
}

#[test]
fn test_worker_count_does_not_change_result() {
    for difficulty in 1..=3 {
        let block = block(difficulty);
        let baseline = SequentialSearcher::default()
            .search(&block, &SearchControl::new())
            .unwrap();

        for workers in [1, 2, 3, 4, 8] {
            let options = SearchOptions::default().with_workers(workers);
            let result = mine_with(&block, &options, SearchControl::new()).unwrap();
            assert_eq!(
                result.nonce(),
                baseline.nonce(),
                "difficulty {} with {} workers",
                difficulty,
                workers
            );
            assert_eq!(result.digest(), baseline.digest());
            assert_eq!(result.workers(), workers);
        }
    }
}

#[test]
fn test_difficulty_above_digest_length_is_rejected() {
    let err = mine(1, "A->B:1", ZERO_HASH, 65, None).unwrap_err();
    assert_matches!(err, Error::InvalidDifficulty { difficulty: 65, max: 64 });
    assert!(err.stats().is_none());

    assert!(BlockDescriptor::new(1, "x", "y", 64).is_ok());
}

#[test]
fn test_deadline_bounds_hard_search() {
    let options = SearchOptions::default()
        .with_workers(2)
        .with_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let err = mine_with(&block(64), &options, SearchControl::new()).unwrap_err();

    assert_matches!(err, Error::TimedOut { stats } if stats.hashes > 0);
    assert!(!err.is_fatal());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_cancellation_from_another_thread() {
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };

    let started = Instant::now();
    let err = mine(1, "A->B:1", ZERO_HASH, 64, Some(token)).unwrap_err();
    canceller.join().unwrap();

    assert_matches!(err, Error::Cancelled { .. });
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_nonce_bound_exhaustion() {
    let options = SearchOptions::default().with_workers(4).with_max_nonce(500);
    let err = mine_with(&block(2), &options, SearchControl::new()).unwrap_err();

    assert_matches!(err, Error::NonceExhausted { limit: 500, stats } if stats.hashes == 501);
}

#[test]
fn test_length_prefixed_encoding() {
    let block = block(2);
    let options = SearchOptions::default()
        .with_workers(3)
        .with_encoding(CandidateEncoding::LengthPrefixed);

    let result = mine_with(&block, &options, SearchControl::new()).unwrap();
    let baseline = SequentialSearcher::new(options.clone())
        .search(&block, &SearchControl::new())
        .unwrap();

    assert_eq!(result.nonce(), baseline.nonce());
    assert!(block
        .verify(result.nonce(), result.digest(), CandidateEncoding::LengthPrefixed)
        .unwrap());
}

#[tokio::test]
async fn test_mine_async_reports_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let control = SearchControl::new().with_events(tx);
    let options = SearchOptions::default().with_workers(2);

    let result = mine_async(block(2), options, control).await.unwrap();
    assert_eq!(result.nonce().value(), 584);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_matches!(events.first(), Some(SearchEvent::Started { workers: 2, .. }));
    assert_matches!(
        events.last(),
        Some(SearchEvent::Found(found)) if found.nonce() == result.nonce()
    );
}

#[tokio::test]
async fn test_dropping_mine_async_stops_search() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let caller_token = CancellationToken::new();
    let control = SearchControl::new()
        .with_cancellation(caller_token.clone())
        .with_events(tx);
    let options = SearchOptions::default()
        .with_workers(2)
        .with_progress_interval(Duration::from_millis(10));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), mine_async(block(64), options, control))
            .await;
    assert!(abandoned.is_err());

    // The search sees the dropped future as a cancel and shuts down.
    let stopped = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = rx.recv().await {
            if let SearchEvent::Stopped { reason, .. } = event {
                return Some(reason);
            }
        }
        None
    })
    .await
    .expect("search kept running after its future was dropped");

    assert_eq!(stopped, Some(StopReason::Cancelled));
    assert!(!caller_token.is_cancelled());
}

#[tokio::test]
async fn test_mine_async_leaves_caller_token_alone() {
    let token = CancellationToken::new();
    let control = SearchControl::new().with_cancellation(token.clone());

    let result = mine_async(block(1), SearchOptions::default(), control).await.unwrap();
    assert_eq!(result.nonce().value(), 16);
    assert!(!token.is_cancelled());
}

#[tokio::test]
async fn test_mine_async_cancellation() {
    let token = CancellationToken::new();
    let control = SearchControl::new().with_cancellation(token.clone());
    let options = SearchOptions::default().with_workers(2);
    let search = tokio::spawn(mine_async(block(64), options, control));

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), search)
        .await
        .expect("search did not stop")
        .unwrap();
    assert_matches!(outcome, Err(Error::Cancelled { .. }));
}
