//! Tests for chunk collection and reassembly.
//!
//! These tests drive the collector the way concurrent HTTP requests would:
//! out of order, duplicated, interleaved across transfers and racing on the
//! final chunk.

mod common;

use std::sync::Arc;

use tokio::task::JoinSet;

use stitch_core::error::Error;
use stitch_core::sink::FsSink;
use stitch_core::transfer::{Collector, IncomingChunk, TransferStatus};

#[tokio::test]
async fn test_ten_bytes_delivered_out_of_order() {
    let (collector, sink) = common::memory_collector();
    let data = b"0123456789";
    let chunks = common::split("ten.bin", data, 4);
    assert_eq!(
        chunks.iter().map(|c| c.payload.len()).collect::<Vec<_>>(),
        vec![4, 4, 2]
    );

    for index in [2usize, 0, 1] {
        collector.ingest(chunks[index].clone()).await.unwrap();
    }

    assert_eq!(sink.get("ten.bin").unwrap(), data);
    assert_eq!(sink.write_count(), 1);
}

#[tokio::test]
async fn test_order_independence() {
    let data = common::random_bytes(100_000);

    for round in 0..5 {
        let (collector, sink) = common::memory_collector();
        let name = format!("random-{round}.bin");
        let chunks = common::split_shuffled(&name, &data, 7_000);
        assert_eq!(chunks.len(), 15);

        let mut reports = Vec::new();
        for chunk in chunks {
            reports.push(collector.ingest(chunk).await.unwrap());
        }

        assert_eq!(reports.iter().filter(|r| r.is_complete()).count(), 1);
        assert!(reports.last().unwrap().is_complete());
        assert_eq!(sink.get(&name).unwrap(), data);
    }
}

#[tokio::test]
async fn test_zero_length_file() {
    let (collector, sink) = common::memory_collector();
    let chunks = common::split("empty.txt", b"", 1024);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].total_chunks, 1);

    let report = collector.ingest(chunks[0].clone()).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.artifact.unwrap().size, 0);
    assert_eq!(sink.get("empty.txt").unwrap(), Vec::<u8>::new());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_racing_final_chunks_assemble_once() {
    let (collector, sink) = common::memory_collector();
    let data = common::random_bytes(4_000);
    let chunks = common::split("race.bin", &data, 1_000);

    for chunk in &chunks[1..] {
        collector.ingest(chunk.clone()).await.unwrap();
    }

    let mut tasks = JoinSet::new();
    for _ in 0..32 {
        let collector = Arc::clone(&collector);
        let last = chunks[0].clone();
        tasks.spawn(async move { collector.ingest(last).await });
    }

    let mut completed = 0;
    while let Some(result) = tasks.join_next().await {
        match result.expect("task panicked") {
            Ok(report) if report.is_complete() => completed += 1,
            Ok(report) => assert!(report.outcome.duplicate),
            Err(Error::LateChunk { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(sink.write_count(), 1);
    assert_eq!(sink.get("race.bin").unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_all_chunks_concurrently() {
    let (collector, sink) = common::memory_collector();
    let data = common::random_bytes(64 * 1024);
    let chunks = common::split_shuffled("parallel.bin", &data, 1_024);

    let mut tasks = JoinSet::new();
    for chunk in chunks {
        let collector = Arc::clone(&collector);
        tasks.spawn(async move { collector.ingest(chunk).await });
    }

    let mut completed = 0;
    while let Some(result) = tasks.join_next().await {
        if result.expect("task panicked").unwrap().is_complete() {
            completed += 1;
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(sink.write_count(), 1);
    assert_eq!(sink.get("parallel.bin").unwrap(), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_interleaved_transfers_are_isolated() {
    let (collector, sink) = common::memory_collector();

    let files: Vec<(String, Vec<u8>)> = (0..20)
        .map(|i| (format!("file-{i}.bin"), common::random_bytes(5_000 + i * 313)))
        .collect();

    let mut all_chunks: Vec<IncomingChunk> = files
        .iter()
        .flat_map(|(name, data)| common::split(name, data, 999))
        .collect();
    {
        use rand::seq::SliceRandom;
        all_chunks.shuffle(&mut rand::thread_rng());
    }

    let mut tasks = JoinSet::new();
    for chunk in all_chunks {
        let collector = Arc::clone(&collector);
        tasks.spawn(async move { collector.ingest(chunk).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task panicked").unwrap();
    }

    assert_eq!(sink.write_count(), files.len());
    for (name, data) in &files {
        assert_eq!(&sink.get(name).unwrap(), data, "{name} differs");
    }
    assert_eq!(collector.registry().active_count().await, 0);
}

#[tokio::test]
async fn test_same_file_name_with_distinct_transfer_ids() {
    let (collector, sink) = common::memory_collector();

    let first = common::split("shared.txt", b"first version", 4);
    let second = common::split("shared.txt", b"second version!", 4);

    for (a, b) in first.iter().zip(&second) {
        collector
            .ingest(a.clone().with_transfer_id("one"))
            .await
            .unwrap();
        collector
            .ingest(b.clone().with_transfer_id("two"))
            .await
            .unwrap();
    }

    assert_eq!(sink.write_count(), 2);
    assert_eq!(
        collector.summary("one").await.unwrap().status,
        TransferStatus::Complete
    );
    assert_eq!(
        collector.summary("two").await.unwrap().status,
        TransferStatus::Complete
    );
    // both wrote the same artifact name; the later write wins
    assert_eq!(sink.get("shared.txt").unwrap(), b"second version!");
}

#[tokio::test]
async fn test_duplicates_are_tolerated() {
    let (collector, sink) = common::memory_collector();
    let data = common::random_bytes(10_000);
    let chunks = common::split("dup.bin", &data, 3_000);

    for chunk in &chunks[..3] {
        collector.ingest(chunk.clone()).await.unwrap();
        let again = collector.ingest(chunk.clone()).await.unwrap();
        assert!(again.outcome.duplicate);
    }

    let summary = collector.summary("dup.bin").await.unwrap();
    assert_eq!(summary.received_chunks, 3);
    assert_eq!(summary.received_bytes, 9_000);

    let last = collector.ingest(chunks[3].clone()).await.unwrap();
    assert!(last.is_complete());
    assert_eq!(sink.get("dup.bin").unwrap(), data);

    let late = collector.ingest(chunks[0].clone()).await.unwrap_err();
    assert!(matches!(
        late,
        Error::LateChunk {
            status: TransferStatus::Complete,
            ..
        }
    ));
    assert_eq!(sink.write_count(), 1);
}

#[tokio::test]
async fn test_conflicting_duplicate_keeps_original() {
    let (collector, sink) = common::memory_collector();

    collector
        .ingest(IncomingChunk::new("c.txt", 0, 2, b"good".to_vec()))
        .await
        .unwrap();
    let err = collector
        .ingest(IncomingChunk::new("c.txt", 0, 2, b"evil".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateMismatch { index: 0, .. }));

    collector
        .ingest(IncomingChunk::new("c.txt", 1, 2, b"!".to_vec()))
        .await
        .unwrap();
    assert_eq!(sink.get("c.txt").unwrap(), b"good!");
}

#[tokio::test]
async fn test_total_mismatch_fails_only_that_transfer() {
    let (collector, sink) = common::memory_collector();

    collector
        .ingest(IncomingChunk::new("bad.bin", 0, 3, b"aa".to_vec()))
        .await
        .unwrap();
    collector
        .ingest(IncomingChunk::new("good.bin", 0, 2, b"gg".to_vec()))
        .await
        .unwrap();

    let err = collector
        .ingest(IncomingChunk::new("bad.bin", 1, 4, b"bb".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolMismatch { .. }));

    let bad = collector.summary("bad.bin").await.unwrap();
    assert_eq!(bad.status, TransferStatus::Failed);
    assert_eq!(bad.received_chunks, 1);

    collector
        .ingest(IncomingChunk::new("good.bin", 1, 2, b"!!".to_vec()))
        .await
        .unwrap();
    assert_eq!(sink.get("good.bin").unwrap(), b"gg!!");
    assert!(sink.get("bad.bin").is_none());
    assert_eq!(sink.write_count(), 1);
}

#[tokio::test]
async fn test_sink_failure_is_retryable() {
    let (collector, sink) = common::memory_collector();
    sink.fail_next_writes(2);
    let chunks = common::split("retry.bin", b"retry me please", 5);

    for chunk in &chunks[..2] {
        collector.ingest(chunk.clone()).await.unwrap();
    }
    let err = collector.ingest(chunks[2].clone()).await.unwrap_err();
    assert!(matches!(err, Error::SinkWriteFailed { .. }));
    assert!(err.is_recoverable());

    // the transfer is closed to further chunks while it waits for a retry
    let late = collector.ingest(chunks[0].clone()).await.unwrap_err();
    assert!(matches!(
        late,
        Error::LateChunk {
            status: TransferStatus::Assembling,
            ..
        }
    ));

    assert!(collector.retry_assembly("retry.bin").await.is_err());
    let artifact = collector.retry_assembly("retry.bin").await.unwrap();
    assert_eq!(artifact.size, 15);
    assert_eq!(sink.get("retry.bin").unwrap(), b"retry me please");
    assert_eq!(sink.write_count(), 1);
}

#[tokio::test]
async fn test_active_transfer_limit() {
    let (collector, _sink) = common::memory_collector_with(stitch_core::config::TransferConfig {
        max_active_transfers: 2,
        ..Default::default()
    });

    for name in ["a", "b"] {
        collector
            .ingest(IncomingChunk::new(name, 0, 2, b"x".to_vec()))
            .await
            .unwrap();
    }
    let err = collector
        .ingest(IncomingChunk::new("c", 0, 2, b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TooManyTransfers(2)));

    // finishing one frees a slot
    collector
        .ingest(IncomingChunk::new("a", 1, 2, b"y".to_vec()))
        .await
        .unwrap();
    collector
        .ingest(IncomingChunk::new("c", 0, 2, b"x".to_vec()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_assembles_to_filesystem() {
    let temp_dir = common::create_temp_dir();
    let output = temp_dir.path().join("assemble");
    let collector = Collector::new(
        Arc::new(FsSink::new(&output)),
        stitch_core::config::TransferConfig::default(),
    );

    let data = common::random_bytes(50_000);
    let source = common::create_test_file(temp_dir.path(), "source.bin", &data);

    for chunk in common::split_shuffled("source.bin", &data, 4_096) {
        collector.ingest(chunk).await.unwrap();
    }

    common::assert_files_equal(&source, &output.join("source.bin"));
}

#[tokio::test]
async fn test_longest_name_assembles_to_filesystem() {
    let temp_dir = common::create_temp_dir();
    let output = temp_dir.path().join("assemble");
    let collector = Collector::new(
        Arc::new(FsSink::new(&output)),
        stitch_core::config::TransferConfig::default(),
    );
    let name = "n".repeat(stitch_core::file::MAX_NAME_LEN);

    let report = collector
        .ingest(IncomingChunk::new(name.as_str(), 0, 1, b"x".to_vec()))
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(std::fs::read(output.join(&name)).unwrap(), b"x");
    assert_eq!(
        collector.summary(&name).await.unwrap().status,
        TransferStatus::Complete
    );
}
