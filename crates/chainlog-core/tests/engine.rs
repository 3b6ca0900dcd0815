//! Engine integration tests against the in-memory backend.
//!
//! Each test builds a small chain of ERC-20 style logs, then drives the
//! public fetch/watch/receipt operations end to end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use chainlog_core::{
    memory::MemoryBackend, Contract, EventDescriptor, EventError, FilterArg, IndexedArgs,
    LogEngine, LogError, LogValue, RawLog,
};
use tokio::sync::mpsc;

// ─── Helpers ──────────────────────────────────────────────────────────────────

const TOKEN: Address = Address::new([0x70; 20]);
const ALICE: Address = Address::new([0xa1; 20]);
const BOB: Address = Address::new([0xb0; 20]);
const CAROL: Address = Address::new([0xc4; 20]);

fn token() -> Contract {
    Contract::new(
        TOKEN,
        vec![
            EventDescriptor::parse(
                "Transfer(address indexed from, address indexed to, uint256 value)",
            )
            .unwrap(),
            EventDescriptor::parse(
                "Approval(address indexed owner, address indexed spender, uint256 value)",
            )
            .unwrap(),
        ],
    )
}

fn event_log(event: &str, a: Address, b: Address, value: u64, tx: u8, index: u64) -> RawLog {
    let descriptor = token().event(event).unwrap().clone();
    RawLog {
        address: TOKEN,
        topics: vec![descriptor.signature_topic(), a.into_word(), b.into_word()],
        data: Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec()),
        block_number: None,
        block_hash: None,
        transaction_index: Some(0),
        transaction_hash: Some(B256::repeat_byte(tx)),
        log_index: Some(index),
        removed: false,
    }
}

fn transfer(from: Address, to: Address, value: u64, tx: u8, index: u64) -> RawLog {
    event_log("Transfer", from, to, value, tx, index)
}

fn chain() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.push_block(1, vec![transfer(ALICE, BOB, 100, 1, 0)]);
    backend.push_block(
        2,
        vec![
            transfer(BOB, CAROL, 40, 2, 0),
            event_log("Approval", ALICE, CAROL, 5, 2, 1),
        ],
    );
    backend.push_block(3, vec![transfer(ALICE, CAROL, 7, 3, 0)]);
    backend
}

fn values(logs: &[chainlog_core::NormalizedLog<RawLog>]) -> Vec<u64> {
    logs.iter()
        .map(|l| l.args["value"].as_uint().unwrap().to::<u64>())
        .collect()
}

async fn recv_n(rx: &mut mpsc::UnboundedReceiver<u64>, n: usize) -> Vec<u64> {
    let mut out = Vec::new();
    for _ in 0..n {
        let v = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for callback")
            .expect("callback channel closed");
        out.push(v);
    }
    out
}

// ─── Fetch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_all_transfers_in_backend_order() {
    let engine = LogEngine::new(chain());
    let logs = engine
        .fetch_logs(&token(), "Transfer", None, None, IndexedArgs::None)
        .await
        .unwrap();

    assert_eq!(values(&logs), [100, 40, 7]);
    let first = &logs[0];
    assert_eq!(first.name, "Transfer");
    assert_eq!(first.signature, "Transfer(address,address,uint256)");
    assert_eq!(first.address, TOKEN);
    assert_eq!(first.block_number, Some(1));
    assert_eq!(first.args[0], first.args["from"]);
    assert_eq!(first.args["from"].as_address(), Some(ALICE));
    assert_eq!(first.args[1].as_address(), Some(BOB));
    assert_eq!(first.native.transaction_hash, Some(B256::repeat_byte(1)));
}

#[tokio::test]
async fn fetch_respects_block_range() {
    let engine = LogEngine::new(chain());
    let logs = engine
        .fetch_logs(&token(), "Transfer", Some(2), Some(2), IndexedArgs::None)
        .await
        .unwrap();
    assert_eq!(values(&logs), [40]);

    let logs = engine
        .fetch_logs(&token(), "Transfer", Some(2), None, IndexedArgs::None)
        .await
        .unwrap();
    assert_eq!(values(&logs), [40, 7]);
}

#[tokio::test]
async fn positional_and_named_filters_match_the_same_logs() {
    let engine = LogEngine::new(chain());
    let positional = engine
        .fetch_logs(
            &token(),
            "Transfer",
            None,
            None,
            IndexedArgs::positional([FilterArg::from(ALICE)]),
        )
        .await
        .unwrap();
    let named = engine
        .fetch_logs(
            &token(),
            "Transfer",
            None,
            None,
            IndexedArgs::named([("from", ALICE)]),
        )
        .await
        .unwrap();
    assert_eq!(values(&positional), [100, 7]);
    assert_eq!(values(&positional), values(&named));
}

#[tokio::test]
async fn any_of_filters_or_within_a_slot() {
    let engine = LogEngine::new(chain());
    let logs = engine
        .fetch_logs(
            &token(),
            "Transfer",
            None,
            None,
            IndexedArgs::named([("to", vec![BOB, CAROL])]),
        )
        .await
        .unwrap();
    assert_eq!(values(&logs), [100, 40, 7]);

    let logs = engine
        .fetch_logs(
            &token(),
            "Transfer",
            None,
            None,
            IndexedArgs::positional([FilterArg::from(ALICE), FilterArg::from(vec![CAROL])]),
        )
        .await
        .unwrap();
    assert_eq!(values(&logs), [7]);
}

#[tokio::test]
async fn encoder_errors_surface_before_the_backend() {
    let engine = LogEngine::new(chain());
    let err = engine
        .fetch_logs(
            &token(),
            "Transfer",
            None,
            None,
            IndexedArgs::positional([ALICE, BOB, CAROL]),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LogError::Event(EventError::TooManyArguments { expected: 2, got: 3 })
    ));

    let err = engine
        .fetch_logs(&token(), "Mint", None, None, IndexedArgs::None)
        .await
        .unwrap_err();
    assert!(matches!(err, LogError::Event(EventError::NotFound { .. })));
}

// ─── Transaction logs ─────────────────────────────────────────────────────────

#[tokio::test]
async fn transaction_logs_drop_undecodable_entries() {
    let backend = chain();
    let foreign = RawLog {
        address: Address::ZERO,
        topics: vec![B256::repeat_byte(0xee)],
        data: Bytes::new(),
        block_number: Some(4),
        block_hash: None,
        transaction_index: Some(0),
        transaction_hash: Some(B256::repeat_byte(4)),
        log_index: Some(1),
        removed: false,
    };
    backend.add_receipt(
        B256::repeat_byte(4),
        vec![
            transfer(ALICE, BOB, 1, 4, 0),
            foreign,
            event_log("Approval", ALICE, BOB, 9, 4, 2),
            transfer(BOB, ALICE, 2, 4, 3),
        ],
    );
    let engine = LogEngine::new(backend);

    let logs = engine
        .fetch_transaction_logs(&token(), B256::repeat_byte(4), "Transfer")
        .await
        .unwrap();
    assert_eq!(values(&logs), [1, 2]);
    assert_eq!(
        logs.iter().map(|l| l.log_index).collect::<Vec<_>>(),
        [Some(0), Some(3)]
    );

    let approvals = engine
        .fetch_transaction_logs(&token(), B256::repeat_byte(2), "Approval")
        .await
        .unwrap();
    assert_eq!(values(&approvals), [5]);
}

#[tokio::test]
async fn missing_receipt_is_transaction_not_found() {
    let engine = LogEngine::new(chain());
    let err = engine
        .fetch_transaction_logs(&token(), B256::repeat_byte(0x99), "Transfer")
        .await
        .unwrap_err();
    assert!(matches!(err, LogError::TransactionNotFound { hash } if hash == B256::repeat_byte(0x99)));
}

// ─── Watch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn watch_delivers_each_log_in_order() {
    let backend = MemoryBackend::new();
    let engine = LogEngine::new(backend.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = engine
        .watch_logs(&token(), "Transfer", move |log| {
            tx.send(log.args["value"].as_uint().unwrap().to::<u64>())?;
            Ok(())
        })
        .await
        .unwrap();

    backend.push_block(
        10,
        vec![transfer(ALICE, BOB, 1, 10, 0), transfer(ALICE, BOB, 2, 10, 1)],
    );
    backend.push_block(11, vec![event_log("Approval", ALICE, BOB, 99, 11, 0)]);
    backend.push_block(12, vec![transfer(BOB, ALICE, 3, 12, 0)]);

    assert_eq!(recv_n(&mut rx, 3).await, [1, 2, 3]);
    assert!(handle.is_active());
}

#[tokio::test]
async fn watch_with_args_filters_live_logs() {
    let backend = MemoryBackend::new();
    let engine = LogEngine::new(backend.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _handle = engine
        .watch_logs_with(
            &token(),
            "Transfer",
            IndexedArgs::named([("to", CAROL)]),
            move |log| {
                tx.send(log.args["value"].as_uint().unwrap().to::<u64>())?;
                Ok(())
            },
        )
        .await
        .unwrap();

    backend.push_block(
        1,
        vec![transfer(ALICE, BOB, 1, 1, 0), transfer(ALICE, CAROL, 2, 1, 1)],
    );
    backend.push_block(2, vec![transfer(BOB, CAROL, 3, 2, 0)]);
    assert_eq!(recv_n(&mut rx, 2).await, [2, 3]);
}

#[tokio::test]
async fn failing_or_panicking_callback_does_not_stop_delivery() {
    for panic in [false, true] {
        let backend = MemoryBackend::new();
        let engine = LogEngine::new(backend.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _handle = engine
            .watch_logs(&token(), "Transfer", move |log| {
                let value = log.args["value"].as_uint().unwrap().to::<u64>();
                tx.send(value)?;
                if value == 2 {
                    if panic {
                        panic!("callback blew up on log 2");
                    }
                    return Err("callback failed on log 2".into());
                }
                Ok(())
            })
            .await
            .unwrap();

        backend.push_block(
            1,
            vec![
                transfer(ALICE, BOB, 1, 1, 0),
                transfer(ALICE, BOB, 2, 1, 1),
                transfer(ALICE, BOB, 3, 1, 2),
            ],
        );
        assert_eq!(recv_n(&mut rx, 3).await, [1, 2, 3], "panic = {panic}");
    }
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_stops_callbacks() {
    let backend = MemoryBackend::new();
    let engine = LogEngine::new(backend.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let sink = Arc::clone(&seen);
    let handle = engine
        .watch_logs(&token(), "Transfer", move |log| {
            let value = log.args["value"].as_uint().unwrap().to::<u64>();
            sink.lock().unwrap().push(value);
            tx.send(value)?;
            Ok(())
        })
        .await
        .unwrap();

    backend.push_block(1, vec![transfer(ALICE, BOB, 1, 1, 0)]);
    assert_eq!(recv_n(&mut rx, 1).await, [1]);

    handle.unsubscribe();
    handle.unsubscribe();
    assert!(!handle.is_active());
    assert_eq!(backend.subscriber_count(), 0);

    backend.push_block(2, vec![transfer(ALICE, BOB, 2, 2, 0)]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock().unwrap(), [1]);

    drop(handle);
    assert_eq!(backend.subscriber_count(), 0);
}

#[tokio::test]
async fn dropping_the_handle_unsubscribes() {
    let backend = MemoryBackend::new();
    let engine = LogEngine::new(backend.clone());
    let handle = engine
        .watch_logs(&token(), "Transfer", |_| Ok(()))
        .await
        .unwrap();
    assert_eq!(backend.subscriber_count(), 1);
    drop(handle);
    assert_eq!(backend.subscriber_count(), 0);
}

#[tokio::test]
async fn removed_logs_are_skipped_by_watch() {
    let backend = MemoryBackend::new();
    let engine = LogEngine::new(backend.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = engine
        .watch_logs(&token(), "Transfer", move |log| {
            tx.send(log.args["value"].as_uint().unwrap().to::<u64>())?;
            Ok(())
        })
        .await
        .unwrap();

    let mut reorged = transfer(ALICE, BOB, 1, 1, 0);
    reorged.removed = true;
    backend.push_block(1, vec![reorged, transfer(ALICE, BOB, 2, 1, 1)]);
    assert_eq!(recv_n(&mut rx, 1).await, [2]);
}

#[tokio::test]
async fn args_values_are_typed() {
    let engine = LogEngine::new(chain());
    let logs = engine
        .fetch_logs(&token(), "Approval", None, None, IndexedArgs::None)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].args["spender"], LogValue::Address(CAROL));
    assert_eq!(logs[0].args[2], LogValue::Uint(U256::from(5)));
}

#[tokio::test]
async fn unsubscribing_mid_batch_skips_the_rest_of_the_batch() {
    let backend = MemoryBackend::new();
    let engine = LogEngine::new(backend.clone());
    let handle = Arc::new(std::sync::OnceLock::<chainlog_core::WatchHandle>::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (slot, sink) = (Arc::clone(&handle), Arc::clone(&seen));
    let watch = engine
        .watch_logs(&token(), "Transfer", move |log| {
            sink.lock().unwrap().push(log.args["value"].as_uint().unwrap().to::<u64>());
            if let Some(h) = slot.get() {
                h.unsubscribe();
            }
            Ok(())
        })
        .await
        .unwrap();
    handle.set(watch).unwrap();

    backend.push_block(
        1,
        vec![
            transfer(ALICE, BOB, 1, 1, 0),
            transfer(ALICE, BOB, 2, 1, 1),
            transfer(ALICE, BOB, 3, 1, 2),
        ],
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*seen.lock().unwrap(), [1]);
    assert!(!handle.get().unwrap().is_active());
    assert_eq!(backend.subscriber_count(), 0);
}
