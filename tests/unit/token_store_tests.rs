//! One behavioural contract, run against every `TokenStore`.
use autologin_common::UserId;
use autologin_lib::{Clock, FileTokenStore, ManualClock, MemoryTokenStore, TokenStore};
use chrono::Duration;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Barrier;

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);

async fn contract(store: &dyn TokenStore, clock: &ManualClock) {
    // insert / exists
    store.insert(ALICE, "a1").await.unwrap();
    store.insert(ALICE, "a2").await.unwrap();
    store.insert(BOB, "b1").await.unwrap();
    assert!(store.exists(ALICE, "a1").await.unwrap());
    assert!(!store.exists(BOB, "a1").await.unwrap());

    // update is conditional and never creates rows
    assert!(store.update(ALICE, "a1", "a3").await.unwrap());
    assert!(!store.exists(ALICE, "a1").await.unwrap());
    assert!(!store.update(ALICE, "a1", "a4").await.unwrap());
    assert!(!store.exists(ALICE, "a4").await.unwrap());
    assert!(!store.update(BOB, "a3", "a5").await.unwrap());
    assert!(!store.exists(BOB, "a5").await.unwrap());

    // delete is exact and idempotent
    store.delete(ALICE, "a2").await.unwrap();
    store.delete(ALICE, "a2").await.unwrap();
    store.delete(BOB, "a3").await.unwrap();
    assert!(!store.exists(ALICE, "a2").await.unwrap());
    assert!(store.exists(ALICE, "a3").await.unwrap());

    // clean keeps rows at or after the cutoff
    clock.advance(Duration::hours(1));
    let cutoff = clock.now();
    store.insert(BOB, "b2").await.unwrap();
    assert_eq!(store.clean(cutoff).await.unwrap(), 2);
    assert_eq!(store.clean(cutoff).await.unwrap(), 0);
    assert!(!store.exists(ALICE, "a3").await.unwrap());
    assert!(!store.exists(BOB, "b1").await.unwrap());
    assert!(store.exists(BOB, "b2").await.unwrap());

    // purge is per user and idempotent
    store.insert(ALICE, "a6").await.unwrap();
    store.purge(ALICE).await.unwrap();
    store.purge(ALICE).await.unwrap();
    assert!(!store.exists(ALICE, "a6").await.unwrap());
    assert!(store.exists(BOB, "b2").await.unwrap());
}

#[tokio::test]
async fn test_memory_store_contract() {
    let clock = Arc::new(ManualClock::default());
    let store = MemoryTokenStore::with_clock(clock.clone());
    contract(&store, &clock).await;
}

#[tokio::test]
async fn test_file_store_contract() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());
    let store = FileTokenStore::open_with_clock(temp_dir.path().join("tokens.json"), clock.clone())
        .await
        .unwrap();
    contract(&store, &clock).await;
}

const CONTENDERS: usize = 16;

/// Release every rotation of the same row at once; returns how many won
async fn race_updates(store: Arc<dyn TokenStore>) -> usize {
    store.insert(ALICE, "old").await.unwrap();
    let start = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let store = store.clone();
            let start = start.clone();
            tokio::spawn(async move {
                start.wait().await;
                store.update(ALICE, "old", &format!("new-{i}")).await.unwrap()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert!(!store.exists(ALICE, "old").await.unwrap());
    let mut live = 0;
    for i in 0..CONTENDERS {
        if store.exists(ALICE, &format!("new-{i}")).await.unwrap() {
            live += 1;
        }
    }
    assert_eq!(live, 1);
    winners
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_concurrent_updates_have_one_winner() {
    let store = MemoryTokenStore::new();
    assert_eq!(race_updates(Arc::new(store.clone())).await, 1);
    assert_eq!(store.count_for(ALICE), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_store_concurrent_updates_have_one_winner() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tokens.json");
    let store = FileTokenStore::open(&path).await.unwrap();
    assert_eq!(race_updates(Arc::new(store)).await, 1);

    // What reached disk agrees with memory
    let reopened = FileTokenStore::open(&path).await.unwrap();
    assert_eq!(reopened.records().await.len(), 1);
}
