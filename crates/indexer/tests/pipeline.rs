//! End-to-end runs of scraper, orchestrator and collector against a mock chain.

use rollscan_core::{tx_hash, Event};
use rollscan_indexer::node::ValidatorInfo;
use rollscan_indexer::notifier::RecordingNotifier;
use rollscan_indexer::test_utils::{test_config, BlockBuilder, MockChain, MockQuerier};
use rollscan_indexer::{Collector, Config, Orchestrator, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

const CHAIN: &str = "rollup-1";
const ALICE: &str = "init1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5lzv7xu";
const BOB: &str = "init1zg69v7ys40x77y352eufp27daufrg4ncnjqz7f";

async fn setup_storage() -> (Storage, NamedTempFile) {
    let temp_db = NamedTempFile::new().unwrap();
    let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
    storage.run_migrations().await.unwrap();
    (storage, temp_db)
}

fn send(sender: &str, recipient: &str, fee: &str) -> Vec<Event> {
    vec![
        Event::new("tx", [("fee", fee), ("fee_payer", sender)]),
        Event::new("message", [("action", "/cosmos.bank.v1beta1.MsgSend"), ("sender", sender)]),
        Event::new("transfer", [("recipient", recipient), ("sender", sender), ("amount", "10uinit")]),
    ]
}

fn orchestrator(
    config: &Config,
    chain: &Arc<MockChain>,
    storage: &Storage,
    querier: Arc<MockQuerier>,
    notifier: &Arc<RecordingNotifier>,
) -> Orchestrator<MockChain> {
    let collector = Collector::from_config(config, storage.clone(), querier, notifier.clone());
    Orchestrator::new(
        config.chain.chain_id.clone(),
        Arc::clone(chain),
        Arc::new(collector),
        storage.clone(),
        config.scraper.clone(),
        config.orchestrator.clone(),
    )
}

#[tokio::test]
async fn test_blocks_and_txs_commit_in_order() {
    let (storage, _temp_db) = setup_storage().await;
    let config = test_config();
    let chain = Arc::new(MockChain::new(CHAIN, 6));
    chain.insert_block(
        BlockBuilder::new(2)
            .proposer("CONS1")
            .tx_with_gas("AQ==", send(ALICE, BOB, "100uinit"), 200_000, 150_000)
            .build(),
    );
    chain.insert_block(
        BlockBuilder::new(4)
            .proposer("CONS1")
            .tx_with_gas("Ag==", send(BOB, ALICE, "40uinit"), 100_000, 80_000)
            .tx_with_gas("Aw==", send(ALICE, BOB, "60uinit"), 100_000, 70_000)
            .build(),
    );
    chain.delay(2, Duration::from_millis(50));
    chain.fail_times(4, 2);

    let querier = Arc::new(MockQuerier::default());
    querier.set_validators(vec![ValidatorInfo {
        operator_address: "initvaloper1abc".into(),
        moniker: "validator-1".into(),
        consensus_address: "CONS1".into(),
    }]);
    let notifier = Arc::new(RecordingNotifier::default());

    orchestrator(&config, &chain, &storage, querier, &notifier)
        .stop_after(6)
        .run()
        .await
        .unwrap();

    assert_eq!(notifier.heights(), (1..=6).collect::<Vec<_>>());
    assert!(chain.fetch_count(4) >= 3);

    let first = storage.get_block(CHAIN, 1).await.unwrap().unwrap();
    assert_eq!(first.block_time, None);

    let block = storage.get_block(CHAIN, 4).await.unwrap().unwrap();
    assert_eq!(block.tx_count, 2);
    assert_eq!(block.gas_used, 150_000);
    assert_eq!(block.gas_wanted, 200_000);
    assert_eq!(block.block_time, Some(1000));
    assert_eq!(block.proposer, "initvaloper1abc");
    assert_eq!(block.total_fee, r#"[{"denom":"uinit","amount":"100"}]"#);

    let txs = storage.get_txs(CHAIN).await.unwrap();
    let sequences: Vec<_> = txs.iter().map(|t| (t.height, t.sequence)).collect();
    assert_eq!(sequences, vec![(2, 1), (4, 2), (4, 3)]);
    assert_eq!(txs[1].hash, tx_hash("Ag==", 0).unwrap());
    assert_eq!(txs[1].signer.as_deref(), Some(BOB));

    let stats = storage.stats(CHAIN).await.unwrap();
    assert_eq!(stats.block_count, 6);
    assert_eq!(stats.tx_count, 3);
    assert_eq!(stats.account_tx_count, 6);
    assert_eq!(stats.last_height, Some(6));

    let notifications = notifier.notifications();
    assert_eq!(notifications[3].tx_hashes.len(), 2);
    assert!(notifications[0].tx_hashes.is_empty());
}

#[tokio::test]
async fn test_start_height_and_restart() {
    let (storage, _temp_db) = setup_storage().await;
    let mut config = test_config();
    config.scraper.start_height = 100;
    let chain = Arc::new(MockChain::new(CHAIN, 110));
    let querier = Arc::new(MockQuerier::default());

    let first = Arc::new(RecordingNotifier::default());
    orchestrator(&config, &chain, &storage, querier.clone(), &first)
        .stop_after(104)
        .run()
        .await
        .unwrap();
    assert_eq!(first.heights(), vec![100, 101, 102, 103, 104]);
    assert_eq!(
        storage.get_block(CHAIN, 100).await.unwrap().unwrap().block_time,
        None
    );

    let second = Arc::new(RecordingNotifier::default());
    orchestrator(&config, &chain, &storage, querier, &second)
        .stop_after(110)
        .run()
        .await
        .unwrap();
    assert_eq!(second.heights(), (105..=110).collect::<Vec<_>>());
    assert_eq!(
        storage.get_block(CHAIN, 105).await.unwrap().unwrap().block_time,
        Some(1000)
    );
    assert_eq!(
        storage.committed_heights(CHAIN).await.unwrap(),
        (100..=110).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_backpressure_does_not_lose_blocks() {
    let (storage, _temp_db) = setup_storage().await;
    let mut config = test_config();
    config.orchestrator.pause_threshold = 3;
    config.orchestrator.resume_threshold = 1;
    let chain = Arc::new(MockChain::new(CHAIN, 40));
    chain.delay(1, Duration::from_millis(100));
    let notifier = Arc::new(RecordingNotifier::default());

    orchestrator(&config, &chain, &storage, Arc::new(MockQuerier::default()), &notifier)
        .stop_after(40)
        .run()
        .await
        .unwrap();

    assert_eq!(notifier.heights(), (1..=40).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_follows_head_after_catching_up() {
    let (storage, _temp_db) = setup_storage().await;
    let config = test_config();
    let chain = Arc::new(MockChain::new(CHAIN, 3));
    let notifier = Arc::new(RecordingNotifier::default());

    let run = tokio::spawn({
        let orchestrator = orchestrator(
            &config,
            &chain,
            &storage,
            Arc::new(MockQuerier::default()),
            &notifier,
        )
        .stop_after(8);
        async move { orchestrator.run().await }
    });

    while storage.last_committed_height(CHAIN).await.unwrap() != Some(3) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    chain.set_head(8);

    tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(notifier.heights(), (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_undecodable_block_is_fatal() {
    let (storage, _temp_db) = setup_storage().await;
    let config = test_config();
    let chain = Arc::new(MockChain::new(CHAIN, 5));
    chain.corrupt(3);
    let notifier = Arc::new(RecordingNotifier::default());

    let result = orchestrator(&config, &chain, &storage, Arc::new(MockQuerier::default()), &notifier)
        .stop_after(5)
        .run()
        .await;

    assert!(result.is_err());
    assert!(storage.last_committed_height(CHAIN).await.unwrap().unwrap_or(0) < 3);
}

#[tokio::test]
async fn test_fetch_failure_while_paused_stops_the_pipeline() {
    let (storage, _temp_db) = setup_storage().await;
    let mut config = test_config();
    config.orchestrator.pause_threshold = 3;
    config.orchestrator.resume_threshold = 1;
    let chain = Arc::new(MockChain::new(CHAIN, 100_000));
    // Later blocks pile up and pause the scraper before height 2 gives up.
    chain.delay(2, Duration::from_millis(150));
    chain.fail_times(2, 1000);
    let notifier = Arc::new(RecordingNotifier::default());

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator(&config, &chain, &storage, Arc::new(MockQuerier::default()), &notifier)
            .run(),
    )
    .await
    .expect("pipeline hung after a fetch failure");

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("Scraper failed"));
    assert_eq!(storage.committed_heights(CHAIN).await.unwrap(), vec![1]);
    assert_eq!(notifier.heights(), vec![1]);
}
