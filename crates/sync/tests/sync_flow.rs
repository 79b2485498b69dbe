//! End-to-end sync flows against a mock RPC and a temp database.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, B256, LogData, U256};
use alloy::rpc::types::{Log, TransactionReceipt};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use tokio::sync::watch;

use carechain_core::ChainStatus;
use carechain_sync::config::SyncConfig;
use carechain_sync::error::Result;
use carechain_sync::listener::events::{HistoryLogged, InventoryAdded, StaffRoleGranted};
use carechain_sync::listener::{BackfillDriver, LedgerRpc, Poller, TickOutcome};
use carechain_sync::storage::Storage;
use carechain_sync::supervisor::SyncHealth;

/// In-memory chain: a head height and a preloaded set of logs.
struct MockRpc {
    head: AtomicU64,
    logs: Vec<Log>,
}

impl MockRpc {
    fn new(head: u64, logs: Vec<Log>) -> Self {
        Self {
            head: AtomicU64::new(head),
            logs,
        }
    }
}

#[async_trait]
impl LedgerRpc for MockRpc {
    async fn head_block(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<Log>> {
        Ok(self
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or(0);
                block >= from && block <= to
            })
            .cloned()
            .collect())
    }

    async fn tx_receipt(&self, _tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        Ok(None)
    }
}

const CONTRACT: Address = Address::repeat_byte(0x11);

fn wrap(data: LogData, block: u64, log_index: u64, tx_hash: B256) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: CONTRACT,
            data,
        },
        block_hash: None,
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(tx_hash),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

fn inventory_log(index: u64, block: u64, log_index: u64, tx_hash: B256) -> Log {
    let ev = InventoryAdded {
        itemIndex: U256::from(index),
        name: "Amoxicillin".to_string(),
        batchNumber: "B-2031".to_string(),
        notes: "500mg capsules".to_string(),
        quantity: U256::from(100u64),
        expirationDate: U256::from(1_790_000_000u64),
        location: "Shelf A3".to_string(),
        timestamp: U256::from(1_758_000_000u64),
    };
    wrap(ev.encode_log_data(), block, log_index, tx_hash)
}

fn history_log(record_id: u64, block: u64, log_index: u64, tx_hash: B256) -> Log {
    let ev = HistoryLogged {
        recordId: U256::from(record_id),
        action: "UPDATE".to_string(),
        fieldChanged: "quantity".to_string(),
        oldValue: "100".to_string(),
        newValue: "88".to_string(),
        description: "dispensed 12 units".to_string(),
        timestamp: U256::from(1_758_000_100u64),
    };
    wrap(ev.encode_log_data(), block, log_index, tx_hash)
}

fn grant_log(staff: Address, admin: Address, block: u64, log_index: u64, tx_hash: B256) -> Log {
    let ev = StaffRoleGranted { staff, admin };
    wrap(ev.encode_log_data(), block, log_index, tx_hash)
}

fn unknown_log(block: u64, log_index: u64, tx_hash: B256) -> Log {
    let data = LogData::new_unchecked(vec![B256::repeat_byte(0xf0)], Default::default());
    wrap(data, block, log_index, tx_hash)
}

async fn setup_storage() -> (Storage, tempfile::NamedTempFile) {
    let temp_db = tempfile::NamedTempFile::new().unwrap();
    let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
    storage.run_migrations().await.unwrap();
    (storage, temp_db)
}

fn test_config() -> SyncConfig {
    SyncConfig {
        poll_interval_ms: 50,
        max_window_blocks: 2_000,
        ..SyncConfig::default()
    }
}

fn poller(rpc: Arc<MockRpc>, storage: Storage, config: SyncConfig) -> Poller<MockRpc> {
    let (_tx, rx) = watch::channel(false);
    Poller::new(rpc, storage, config, Arc::new(SyncHealth::default()), rx)
}

#[tokio::test]
async fn cold_start_single_event() {
    let (storage, _temp_db) = setup_storage().await;

    let tx_hash = B256::repeat_byte(0xaa);
    let rpc = Arc::new(MockRpc::new(5, vec![inventory_log(1, 3, 0, tx_hash)]));
    let mut poller = poller(rpc, storage.clone(), test_config());

    let outcome = poller.tick().await.unwrap();
    match outcome {
        TickOutcome::Synced(report) => {
            assert_eq!(report.from, 1);
            assert_eq!(report.to, 5);
            assert_eq!(report.applied, 1);
        }
        other => panic!("expected sync, got {:?}", other),
    }

    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 5);

    let item = storage.get_inventory_item(1).await.unwrap().unwrap();
    assert_eq!(item.chain_status, ChainStatus::Confirmed);
    assert_eq!(item.chain_tx_hash, Some(tx_hash));
    assert_eq!(item.name, "Amoxicillin");
    assert_eq!(item.quantity, 100);

    assert_eq!(
        storage
            .count_ledger_records_for_key(tx_hash, 0)
            .await
            .unwrap(),
        1
    );

    storage.close().await;
}

#[tokio::test]
async fn idle_when_caught_up() {
    let (storage, _temp_db) = setup_storage().await;
    storage.advance_cursor(5).await.unwrap();

    let rpc = Arc::new(MockRpc::new(5, vec![]));
    let mut poller = poller(rpc, storage.clone(), test_config());

    assert_eq!(poller.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 5);

    storage.close().await;
}

#[tokio::test]
async fn empty_window_is_a_valid_tick() {
    let (storage, _temp_db) = setup_storage().await;

    let rpc = Arc::new(MockRpc::new(8, vec![]));
    let mut poller = poller(rpc, storage.clone(), test_config());

    match poller.tick().await.unwrap() {
        TickOutcome::Synced(report) => {
            assert_eq!(report.fetched, 0);
            assert_eq!(report.applied, 0);
        }
        other => panic!("expected sync, got {:?}", other),
    }
    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 8);

    storage.close().await;
}

#[tokio::test]
async fn confirmation_depth_holds_back_recent_blocks() {
    let (storage, _temp_db) = setup_storage().await;

    let tx_recent = B256::repeat_byte(0xab);
    let rpc = Arc::new(MockRpc::new(
        10,
        vec![
            inventory_log(1, 3, 0, B256::repeat_byte(0xaa)),
            inventory_log(2, 9, 0, tx_recent),
        ],
    ));
    let config = SyncConfig {
        confirmations: 3,
        ..test_config()
    };
    let mut poller = poller(rpc.clone(), storage.clone(), config);

    poller.tick().await.unwrap();

    // safe head is 7: block 9 is not stable yet
    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 7);
    assert!(storage.get_inventory_item(1).await.unwrap().is_some());
    assert!(storage.get_inventory_item(2).await.unwrap().is_none());

    // once the chain grows, the held-back block is picked up
    rpc.head.store(12, Ordering::SeqCst);
    poller.tick().await.unwrap();
    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 9);
    assert!(storage.get_inventory_item(2).await.unwrap().is_some());

    storage.close().await;
}

#[tokio::test]
async fn window_is_bounded_by_max_window_blocks() {
    let (storage, _temp_db) = setup_storage().await;

    let rpc = Arc::new(MockRpc::new(5_000, vec![]));
    let config = SyncConfig {
        max_window_blocks: 1_000,
        ..test_config()
    };
    let mut poller = poller(rpc, storage.clone(), config);

    match poller.tick().await.unwrap() {
        TickOutcome::Synced(report) => {
            assert_eq!(report.from, 1);
            assert_eq!(report.to, 1_000);
        }
        other => panic!("expected sync, got {:?}", other),
    }
    assert_eq!(
        storage.get_cursor().await.unwrap().last_processed_block,
        1_000
    );

    storage.close().await;
}

#[tokio::test]
async fn multi_event_block_applies_in_log_index_order() {
    let (storage, _temp_db) = setup_storage().await;

    // Two events in block 7 sharing a transaction, distinct log indexes.
    let tx_hash = B256::repeat_byte(0xcd);
    let rpc = Arc::new(MockRpc::new(
        7,
        vec![
            inventory_log(1, 7, 0, tx_hash),
            history_log(1, 7, 1, tx_hash),
        ],
    ));
    let mut poller = poller(rpc, storage.clone(), test_config());

    poller.tick().await.unwrap();

    assert_eq!(
        storage
            .count_ledger_records_for_key(tx_hash, 0)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        storage
            .count_ledger_records_for_key(tx_hash, 1)
            .await
            .unwrap(),
        1
    );
    assert_eq!(storage.list_audit_entries(1).await.unwrap().len(), 1);

    storage.close().await;
}

#[tokio::test]
async fn unknown_topic_is_ignored_and_window_completes() {
    let (storage, _temp_db) = setup_storage().await;

    let tx_hash = B256::repeat_byte(0xaa);
    let rpc = Arc::new(MockRpc::new(
        6,
        vec![
            unknown_log(4, 0, B256::repeat_byte(0x99)),
            inventory_log(1, 5, 0, tx_hash),
        ],
    ));
    let mut poller = poller(rpc, storage.clone(), test_config());

    match poller.tick().await.unwrap() {
        TickOutcome::Synced(report) => {
            assert_eq!(report.fetched, 2);
            assert_eq!(report.applied, 1);
            assert_eq!(report.decode_skipped, 0);
        }
        other => panic!("expected sync, got {:?}", other),
    }

    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 6);
    assert!(storage.get_inventory_item(1).await.unwrap().is_some());

    storage.close().await;
}

#[tokio::test]
async fn role_grant_writes_ledger_record_only() {
    let (storage, _temp_db) = setup_storage().await;

    let staff = Address::repeat_byte(0x0a);
    let admin = Address::repeat_byte(0x0b);
    let rpc = Arc::new(MockRpc::new(
        12,
        vec![grant_log(staff, admin, 12, 0, B256::repeat_byte(0xee))],
    ));
    let mut poller = poller(rpc, storage.clone(), test_config());

    poller.tick().await.unwrap();

    let grant = storage.latest_staff_grant(staff).await.unwrap().unwrap();
    assert_eq!(grant.action_type, "GRANT_STAFF_ROLE");
    assert_eq!(grant.block_number, 12);

    let stats = storage.stats().await.unwrap();
    assert_eq!(stats.inventory_count, 0);
    assert_eq!(stats.ledger_record_count, 1);

    storage.close().await;
}

#[tokio::test]
async fn replaying_the_stream_is_idempotent() {
    let (storage, _temp_db) = setup_storage().await;

    let logs = vec![
        inventory_log(1, 3, 0, B256::repeat_byte(0xaa)),
        history_log(1, 4, 0, B256::repeat_byte(0xab)),
        grant_log(
            Address::repeat_byte(0x0a),
            Address::repeat_byte(0x0b),
            5,
            0,
            B256::repeat_byte(0xac),
        ),
    ];
    let rpc = Arc::new(MockRpc::new(5, logs));

    let mut poller = poller(rpc.clone(), storage.clone(), test_config());
    poller.tick().await.unwrap();

    let stats_once = storage.stats().await.unwrap();

    // Scenario: operator backfills from genesis over already-seen blocks.
    let driver = BackfillDriver::new(rpc, storage.clone(), test_config());
    let report = driver.run(0).await.unwrap();

    assert_eq!(report.applied, 0);
    assert_eq!(report.deduped, 3);

    let stats_twice = storage.stats().await.unwrap();
    assert_eq!(stats_once, stats_twice);
    // Cursor untouched by the historical rescan.
    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 5);

    storage.close().await;
}

#[tokio::test]
async fn backfill_from_gap_catches_up() {
    let (storage, _temp_db) = setup_storage().await;

    let logs = vec![
        inventory_log(1, 10, 0, B256::repeat_byte(0xaa)),
        inventory_log(2, 150, 0, B256::repeat_byte(0xab)),
    ];
    let rpc = Arc::new(MockRpc::new(200, logs));

    let config = SyncConfig {
        max_window_blocks: 100,
        ..test_config()
    };
    let driver = BackfillDriver::new(rpc, storage.clone(), config);
    let report = driver.run(0).await.unwrap();

    assert_eq!(report.windows, 3);
    assert_eq!(report.applied, 2);
    assert!(storage.get_inventory_item(1).await.unwrap().is_some());
    assert!(storage.get_inventory_item(2).await.unwrap().is_some());
    assert_eq!(
        storage.get_cursor().await.unwrap().last_processed_block,
        200
    );

    storage.close().await;
}

#[tokio::test]
async fn crash_resume_equivalence() {
    let (storage, _temp_db) = setup_storage().await;

    // Feed a strict prefix first.
    let prefix = vec![inventory_log(1, 3, 0, B256::repeat_byte(0xaa))];
    let rpc = Arc::new(MockRpc::new(3, prefix.clone()));
    let mut first = poller(rpc, storage.clone(), test_config());
    first.tick().await.unwrap();

    // "Restart": a fresh poller over the full stream picks up the suffix.
    let mut full = prefix;
    full.push(history_log(1, 6, 0, B256::repeat_byte(0xab)));
    let rpc = Arc::new(MockRpc::new(6, full));
    let mut second = poller(rpc, storage.clone(), test_config());
    second.tick().await.unwrap();

    let stats = storage.stats().await.unwrap();
    assert_eq!(stats.ledger_record_count, 2);
    assert_eq!(stats.inventory_count, 1);
    assert_eq!(stats.audit_count, 1);
    assert_eq!(storage.get_cursor().await.unwrap().last_processed_block, 6);

    storage.close().await;
}
