//! Transaction buffer spillover tests.

use ntest::timeout;
use serde_json::json;
use tempfile::tempdir;

use changefeed_core::config::DEFAULT_SPILL_THRESHOLD;
use changefeed_core::{Attributes, ChangeRecord, Operation, TransactionBuffer};

fn record(i: usize) -> ChangeRecord {
    let mut identity = Attributes::new();
    identity.insert("id".to_string(), json!(i));
    let mut columns = Attributes::new();
    columns.insert("seq".to_string(), json!(i));
    columns.insert("payload".to_string(), json!({ "n": i, "tags": ["a", "b"] }));
    ChangeRecord::new(Operation::Update, "events", identity, columns)
}

fn drain_all(buffer: TransactionBuffer) -> Vec<ChangeRecord> {
    buffer
        .drain()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// Crossing the threshold must not change what a drain yields.
#[timeout(20000)]
#[test]
fn test_spillover_is_transparent() {
    let dir = tempdir().unwrap();
    let count = DEFAULT_SPILL_THRESHOLD * 2 + 123;

    let mut spilled = TransactionBuffer::new(1, dir.path().join("p.1"), DEFAULT_SPILL_THRESHOLD);
    let mut resident = TransactionBuffer::new(2, dir.path().join("p.2"), usize::MAX);
    for i in 0..count {
        spilled.push(record(i));
        resident.push(record(i));
    }

    assert!(spilled.is_spilled());
    assert_eq!(spilled.memory_len(), 123);
    assert!(!resident.is_spilled());
    assert_eq!(spilled.len(), resident.len());

    let from_disk = drain_all(spilled);
    let from_memory = drain_all(resident);
    assert_eq!(from_disk.len(), count);
    assert_eq!(from_disk, from_memory);
    assert!(!dir.path().join("p.1").exists());
}

#[timeout(20000)]
#[test]
fn test_spillover_batches_cover_every_record_once() {
    let dir = tempdir().unwrap();
    let mut buffer = TransactionBuffer::new(3, dir.path().join("p.3"), DEFAULT_SPILL_THRESHOLD);
    for i in 0..(DEFAULT_SPILL_THRESHOLD + 1) {
        buffer.push(record(i));
    }

    let mut seen = Vec::new();
    let mut sizes = Vec::new();
    for batch in buffer.drain_batches(1000).unwrap() {
        let batch = batch.unwrap();
        sizes.push(batch.len());
        seen.extend(batch.into_iter().map(|r| r.columns["seq"].as_u64().unwrap()));
    }

    assert_eq!(sizes, vec![1000, 1000, 1000, 1000, 1000, 1]);
    assert_eq!(seen, (0..=DEFAULT_SPILL_THRESHOLD as u64).collect::<Vec<_>>());
}

#[timeout(5000)]
#[test]
fn test_abrupt_drop_removes_backing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("p.4");
    let mut buffer = TransactionBuffer::new(4, path.clone(), 10);
    for i in 0..25 {
        buffer.push(record(i));
    }
    assert!(path.exists());

    let mut batches = buffer.drain_batches(7).unwrap();
    assert_eq!(batches.next().unwrap().unwrap().len(), 7);
    drop(batches);

    assert!(!path.exists());
}

/// Full-precision floats must survive a trip through the spill file.
#[timeout(20000)]
#[test]
fn test_spilled_floats_keep_their_value() {
    let dir = tempdir().unwrap();
    let mut buffer = TransactionBuffer::new(4, dir.path().join("p.4"), 1);

    let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut expected = Vec::new();
    for i in 0..20_000 {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let digits = format!("0.{:017}", seed % 100_000_000_000_000_000);
        let value: serde_json::Value = serde_json::from_str(&digits).unwrap();

        let mut columns = Attributes::new();
        columns.insert("id".to_string(), json!(i));
        columns.insert("ratio".to_string(), value);
        let record =
            ChangeRecord::new(Operation::Insert, "measurements", Attributes::new(), columns);
        buffer.push(record.clone());
        expected.push(record);
    }

    assert!(buffer.is_spilled());
    assert_eq!(buffer.memory_len(), 0);
    assert_eq!(drain_all(buffer), expected);
}
