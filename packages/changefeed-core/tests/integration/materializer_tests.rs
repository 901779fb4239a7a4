//! Materializer replay tests.

use ntest::timeout;
use serde_json::json;
use tempfile::tempdir;

use changefeed_core::Operation;

use super::helpers::*;

#[timeout(2000)]
#[test]
fn test_replay_order_preserved() {
    let dir = tempdir().unwrap();
    let mut m = materializer(&config(dir.path()));

    feed(
        &mut m,
        &[
            begin(1),
            insert(1, "users", 1, "ann"),
            update(1, "users", 1, "ann", "anne"),
            insert(1, "orders", 7, "o-7"),
            delete(1, "users", 1),
            commit(1),
        ],
    );

    assert_eq!(
        dispatched(&m),
        vec![
            ("I", "users".to_string(), 1),
            ("U", "users".to_string(), 1),
            ("I", "orders".to_string(), 7),
            ("D", "users".to_string(), 1),
        ]
    );
}

#[timeout(2000)]
#[test]
fn test_update_snapshot_before_and_after() {
    let dir = tempdir().unwrap();
    let mut m = materializer(&config(dir.path()));

    feed(&mut m, &[begin(2), update(2, "users", 1, "a", "b"), commit(2)]);

    let groups = m.dispatcher();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].operation, Operation::Update);
    let entity = &groups[0].entities[0];
    assert_eq!(entity.original()["id"], json!(1));
    assert_eq!(entity.original()["name"], json!("a"));
    assert_eq!(entity.attributes()["id"], json!(1));
    assert_eq!(entity.attributes()["name"], json!("b"));
    assert_eq!(entity.changes().len(), 1);
}

#[timeout(2000)]
#[test]
fn test_delete_snapshot_is_identity() {
    let dir = tempdir().unwrap();
    let mut m = materializer(&config(dir.path()));

    feed(&mut m, &[begin(3), delete(3, "orders", 3), commit(3)]);

    let entity = &m.dispatcher()[0].entities[0];
    assert_eq!(entity.original(), entity.attributes());
    assert_eq!(entity.attributes().len(), 1);
    assert_eq!(entity.attributes()["id"], json!(3));
}

#[timeout(2000)]
#[test]
fn test_malformed_record_between_valid_records() {
    let dir = tempdir().unwrap();
    let mut m = materializer(&config(dir.path()));

    feed(
        &mut m,
        &[
            begin(5),
            insert(5, "users", 1, "a"),
            "{\"action\":\"I\",\"xid\":5,".to_string(),
            "[]".to_string(),
            r#"{"action":"I","xid":"5","table":"users"}"#.to_string(),
            insert(5, "users", 2, "b"),
            commit(5),
        ],
    );

    assert_eq!(
        dispatched(&m),
        vec![("I", "users".to_string(), 1), ("I", "users".to_string(), 2)]
    );
    assert_eq!(m.stats().records_dropped, 3);
}

#[timeout(2000)]
#[test]
fn test_interleaved_transactions_dispatch_on_own_commit() {
    let dir = tempdir().unwrap();
    let mut m = materializer(&config(dir.path()));

    feed(
        &mut m,
        &[
            begin(10),
            begin(20),
            insert(10, "users", 101, "a"),
            insert(20, "users", 201, "b"),
            insert(10, "users", 102, "c"),
        ],
    );
    assert!(m.dispatcher().is_empty());

    feed(&mut m, &[insert(20, "users", 202, "d"), commit(20)]);
    assert_eq!(m.dispatcher().len(), 1);
    assert_eq!(
        dispatched(&m),
        vec![("I", "users".to_string(), 201), ("I", "users".to_string(), 202)]
    );
    assert!(m.is_live(10));

    feed(&mut m, &[commit(10)]);
    let groups = m.dispatcher();
    assert_eq!(groups.len(), 2);
    let second: Vec<_> = groups[1]
        .entities
        .iter()
        .map(|e| e.get("id").cloned().unwrap())
        .collect();
    assert_eq!(second, vec![json!(101), json!(102)]);
    assert_eq!(m.live_transactions(), 0);
}

#[timeout(2000)]
#[test]
fn test_groups_are_not_merged_across_transactions() {
    let dir = tempdir().unwrap();
    let mut m = materializer(&config(dir.path()));

    feed(
        &mut m,
        &[
            begin(1),
            insert(1, "users", 1, "a"),
            commit(1),
            begin(2),
            insert(2, "users", 2, "b"),
            commit(2),
        ],
    );

    let groups = m.dispatcher();
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.len() == 1));
}

#[timeout(2000)]
#[test]
fn test_xid_reusable_after_commit() {
    let dir = tempdir().unwrap();
    let mut m = materializer(&config(dir.path()));

    feed(&mut m, &[begin(8), commit(8), begin(8), insert(8, "users", 1, "a"), commit(8)]);

    assert_eq!(dispatched(&m), vec![("I", "users".to_string(), 1)]);
    assert_eq!(m.stats().transactions_committed, 2);
}

#[timeout(20000)]
#[test]
fn test_large_transaction_spills_and_dispatches_in_batches() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    config.spill_threshold = 100;
    config.batch_size = 64;
    let mut m = materializer(&config);

    let mut lines = vec![begin(42)];
    lines.extend((0..1000).map(|id| insert(42, "users", id, "n")));
    feed(&mut m, &lines);
    assert!(dir.path().join("primary.42").exists());

    feed(&mut m, &[commit(42)]);

    assert!(!dir.path().join("primary.42").exists());
    let groups = m.dispatcher();
    assert_eq!(groups.len(), 16);
    assert!(groups[..15].iter().all(|g| g.len() == 64));
    assert_eq!(groups[15].len(), 1000 - 15 * 64);
    let ids: Vec<i64> = dispatched(&m).into_iter().map(|(_, _, id)| id).collect();
    assert_eq!(ids, (0..1000).collect::<Vec<_>>());
}

#[timeout(5000)]
#[test]
fn test_open_buffers_cleaned_on_drop_and_on_prepare() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    config.spill_threshold = 2;

    {
        let mut m = materializer(&config);
        m.prepare().unwrap();
        feed(
            &mut m,
            &[begin(1), insert(1, "users", 1, "a"), insert(1, "users", 2, "b")],
        );
        assert!(dir.path().join("primary.1").exists());
    }
    assert!(!dir.path().join("primary.1").exists());

    std::fs::write(dir.path().join("primary.77"), "{}\n").unwrap();
    let m = materializer(&config);
    assert_eq!(m.prepare().unwrap(), 1);
    assert!(!dir.path().join("primary.77").exists());
}
