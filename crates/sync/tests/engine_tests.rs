//! End-to-end engine tests over in-memory collaborators

use ambient_sync::{candle_start_time, Endpoint, LiquidityState, SyncConfig, SyncEngine};
use ambient_test_utils::*;
use ambient_types::{
    PositionId, PositionKind, Receipt, ReceiptStatus, SessionTransaction, SessionUpdate,
    TxIdentity, UpdateStatus, PRE_BURN_TIME,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NOW: i64 = 1_700_000_000;

/// Spot tick of the ETH/USDC fixture sits just above 200_300
const IN_RANGE: (i32, i32) = (200_000, 201_000);
const OUT_OF_RANGE: (i32, i32) = (100, 200);

fn setup(config: SyncConfig) -> Result<(Arc<FakeSource>, Arc<FakeSdk>, SyncEngine)> {
    let source = Arc::new(FakeSource::new());
    let sdk = Arc::new(FakeSdk::mainnet());
    let engine = SyncEngine::new(config, source.clone(), sdk.clone())?;
    Ok((source, sdk, engine))
}

fn user_position_id(ticks: (i32, i32)) -> PositionId {
    PositionId::new(
        address(TEST_USER),
        &eth_usdc_pool(),
        ticks.0,
        ticks.1,
        PositionKind::Concentrated,
    )
}

#[tokio::test]
async fn test_refresh_pool_fills_collections() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    let pool = eth_usdc_pool();

    source.set_positions(
        Endpoint::PoolPositions,
        vec![
            range_position(&pool, TEST_USER, IN_RANGE.0, IN_RANGE.1, NOW - 10),
            ambient_position(&pool, OTHER_USER, NOW - 20),
        ],
    );
    source.set_transactions(Endpoint::PoolTransactions, swaps(&pool, 0, 10, NOW));
    source.set_limit_orders(
        Endpoint::PoolLimitOrders,
        vec![limit_order(&pool, OTHER_USER, 201_500, false, NOW - 5)],
    );
    source.set_liquidity(&pool, liquidity_curve(&pool));

    assert!(engine.select_pool(pool.clone()));
    engine.refresh_pool().await;

    let state = engine.snapshot();
    assert_eq!(state.positions_by_pool.len(), 2);
    assert!(state.positions_by_pool.data_received);
    assert_eq!(state.transactions_by_pool.len(), 10);
    assert_eq!(state.transaction_history.len(), 10);
    assert_eq!(state.limit_orders_by_pool.len(), 1);
    assert_eq!(state.limit_order_history.len(), 1);
    // Nothing served for the leaderboard: confirmed empty, not loading
    assert!(state.leaderboard_by_pool.data_received);
    assert!(state.leaderboard_by_pool.is_empty());
    assert!(matches!(&state.liquidity, LiquidityState::Ready(curve) if curve.pool == pool));

    let swap = &state.transactions_by_pool.records[0];
    // One ETH against 2000 USDC, counted once
    assert!((swap.value_usd - 2000.0).abs() < 1e-6);

    let in_range = state
        .positions_by_pool
        .records
        .iter()
        .find(|p| p.kind == PositionKind::Concentrated)
        .expect("range position");
    assert!(in_range.is_position_in_range);
    assert!(in_range.total_value_usd > 0.0);

    Ok(())
}

#[tokio::test]
async fn test_leaderboard_keeps_top_in_range_earners() -> Result<()> {
    let mut config = SyncConfig::default();
    config.pages.leaderboard_top = 2;
    let (source, _sdk, engine) = setup(config)?;
    let pool = eth_usdc_pool();

    let earning = |user: &str, ticks: (i32, i32), apr: f64| {
        let mut position = range_position(&pool, user, ticks.0, ticks.1, NOW);
        position.apr_est = apr;
        position
    };
    source.set_positions(
        Endpoint::PoolPositionApyLeaders,
        vec![
            earning(OTHER_USER, OUT_OF_RANGE, 0.9),
            earning(TEST_USER, IN_RANGE, 0.5),
            earning(OTHER_USER, (IN_RANGE.0 - 10, IN_RANGE.1), 0.0),
            earning(OTHER_USER, (IN_RANGE.0 - 20, IN_RANGE.1), 0.3),
            earning(OTHER_USER, (IN_RANGE.0 - 30, IN_RANGE.1), 0.1),
        ],
    );

    engine.select_pool(pool);
    engine.refresh_pool().await;

    let leaders = &engine.snapshot().leaderboard_by_pool.records;
    assert_eq!(leaders.len(), 2);
    assert!(leaders.iter().all(|p| p.is_position_in_range && p.apy != 0.0));
    assert!((leaders[0].apy - 50.0).abs() < 1e-9);

    Ok(())
}

#[tokio::test]
async fn test_foreign_pool_records_never_land() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    source.set_transactions(
        Endpoint::PoolTransactions,
        swaps(&wbtc_usdc_pool(), 0, 5, NOW),
    );

    engine.select_pool(eth_usdc_pool());
    engine.refresh_pool().await;

    let state = engine.snapshot();
    assert!(state.transactions_by_pool.is_empty());
    assert!(state.transactions_by_pool.is_loading());

    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_never_marks_received() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    source.fail(Endpoint::PoolPositions);

    engine.select_pool(eth_usdc_pool());
    engine.refresh_pool().await;
    assert!(engine.snapshot().positions_by_pool.is_loading());

    source.recover(Endpoint::PoolPositions);
    engine.refresh_pool().await;
    let state = engine.snapshot();
    assert!(state.positions_by_pool.data_received);
    assert!(state.positions_by_pool.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_decoration_failure_drops_single_record() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    let pool = eth_usdc_pool();
    source.set_positions(
        Endpoint::PoolPositions,
        vec![
            range_position(&pool, TEST_USER, IN_RANGE.0, IN_RANGE.1, NOW),
            range_position(&pool, "not-an-address", IN_RANGE.0, IN_RANGE.1, NOW - 1),
        ],
    );

    engine.select_pool(pool);
    engine.refresh_pool().await;

    let positions = &engine.snapshot().positions_by_pool.records;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].user, address(TEST_USER));

    Ok(())
}

#[tokio::test]
async fn test_user_pool_positions_read_onchain_liquidity() -> Result<()> {
    let (source, sdk, engine) = setup(SyncConfig::default())?;
    let pool = eth_usdc_pool();
    source.set_positions(
        Endpoint::UserPoolPositions,
        vec![range_position(&pool, TEST_USER, IN_RANGE.0, IN_RANGE.1, NOW)],
    );
    sdk.set_position_liquidity(user_position_id(IN_RANGE), 42.0);

    engine.select_pool(pool);
    engine.select_user(Some(test_user()));
    engine.refresh_pool().await;

    let positions = &engine.snapshot().user_positions_by_pool.records;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].position_liq, 42.0);

    Ok(())
}

#[tokio::test]
async fn test_indexed_update_retires() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    let pool = eth_usdc_pool();
    engine.select_user(Some(test_user()));

    let hash = TxIdentity::from_hash("0xfeed01");
    engine.record_position_update(SessionUpdate::new(user_position_id(IN_RANGE), hash, 1_000));

    let view = engine.reconciled();
    assert_eq!(view.position_updates.len(), 1);
    assert!(view.transitions.is_empty());

    // Indexed ten seconds after submission, exactly the tolerance
    source.set_positions(
        Endpoint::UserPositions,
        vec![range_position(&pool, TEST_USER, IN_RANGE.0, IN_RANGE.1, 1_010)],
    );
    engine.refresh_user().await;

    let view = engine.reconciled();
    assert!(view.position_updates.is_empty());
    assert_eq!(view.transitions.len(), 1);
    assert_eq!(view.transitions[0].1, UpdateStatus::Indexed);

    // Terminal: a second pass reports no new transition
    assert!(engine.reconciled().transitions.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_receipt_retires_update() -> Result<()> {
    let (_source, _sdk, engine) = setup(SyncConfig::default())?;
    engine.select_user(Some(test_user()));

    let hash = TxIdentity::from_hash("0xfeed02");
    engine.record_position_update(SessionUpdate::new(
        user_position_id(IN_RANGE),
        hash.clone(),
        1_000,
    ));
    engine.record_receipt(Receipt {
        tx_hash: hash,
        status: ReceiptStatus::Failed,
        unix_time: 1_005,
    });

    let view = engine.reconciled();
    assert!(view.position_updates.is_empty());
    assert_eq!(view.transitions[0].1, UpdateStatus::Failed);

    Ok(())
}

#[tokio::test]
async fn test_session_transaction_retires_once_indexed() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    let pool = eth_usdc_pool();
    engine.select_user(Some(test_user()));

    let indexed = swap(&pool, 7, NOW);
    engine.record_submission(SessionTransaction {
        tx_hash: TxIdentity::from_hash(&indexed.tx_hash),
        pool: Some(pool.clone()),
        unix_time_added: NOW - 5,
    });
    engine.record_submission(SessionTransaction {
        tx_hash: TxIdentity::from_hash("0xnotyet"),
        pool: Some(pool.clone()),
        unix_time_added: NOW - 1,
    });
    assert_eq!(engine.reconciled().transactions.len(), 2);

    source.set_transactions(Endpoint::UserTransactions, vec![indexed]);
    engine.refresh_user().await;

    let view = engine.reconciled();
    assert_eq!(view.transaction_hashes(), vec![TxIdentity::from_hash("0xnotyet")]);
    assert_eq!(view.transactions_for_pool(&pool).len(), 1);
    assert!(view.transactions_for_pool(&wbtc_usdc_pool()).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_switching_account_forgets_session() -> Result<()> {
    let (_source, _sdk, engine) = setup(SyncConfig::default())?;
    engine.select_user(Some(test_user()));
    engine.record_submission(SessionTransaction {
        tx_hash: TxIdentity::from_hash("0xabc"),
        pool: None,
        unix_time_added: NOW,
    });
    assert_eq!(engine.reconciled().transactions.len(), 1);

    assert!(engine.select_user(Some(other_user())));
    assert!(engine.reconciled().transactions.is_empty());
    assert!(engine.snapshot().positions_by_user.is_loading());

    Ok(())
}

#[tokio::test]
async fn test_pool_switch_resets_pool_collections() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    let eth = eth_usdc_pool();
    source.set_transactions(Endpoint::PoolTransactions, swaps(&eth, 0, 3, NOW));

    engine.select_pool(eth.clone());
    engine.refresh_pool().await;
    assert_eq!(engine.snapshot().transactions_by_pool.len(), 3);

    assert!(!engine.select_pool(eth));
    assert!(engine.select_pool(wbtc_usdc_pool()));
    let state = engine.snapshot();
    assert!(state.transactions_by_pool.is_loading());
    assert!(state.transaction_history.is_loading());

    Ok(())
}

#[tokio::test]
async fn test_poll_once_follows_cadence() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    engine.select_pool(eth_usdc_pool());
    engine.select_user(Some(test_user()));

    let now_ms = chrono::Utc::now().timestamp_millis();
    engine.poll_once(now_ms).await;
    assert_eq!(source.requests_to(Endpoint::PoolPositions).len(), 1);
    assert_eq!(source.requests_to(Endpoint::UserPositions).len(), 1);

    // Same bucket, nothing fires
    engine.poll_once(now_ms).await;
    assert_eq!(source.requests_to(Endpoint::PoolPositions).len(), 1);

    // Next pool bucket
    engine.poll_once(now_ms + 10_000).await;
    assert_eq!(source.requests_to(Endpoint::PoolPositions).len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_run_stops_on_cancel() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    engine.select_pool(eth_usdc_pool());
    let engine = Arc::new(engine);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let engine = engine.clone();
        let cancel = cancel.clone();
        async move { engine.run(cancel).await }
    });

    while source.requests_to(Endpoint::PoolPositions).is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await??;

    Ok(())
}

#[tokio::test]
async fn test_candles_for_active_pool() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    let newest = PRE_BURN_TIME + 600;
    source.set_candles(vec![
        candle(newest, 300),
        candle(newest - 300, 300),
        candle(PRE_BURN_TIME, 300),
    ]);
    engine.select_pool(eth_usdc_pool());

    let cancel = CancellationToken::new();
    let series = engine
        .candles(300, newest, 10, &cancel)
        .await
        .expect("candle series");
    let times: Vec<i64> = series.candles.iter().map(|c| c.time).collect();
    assert_eq!(times, vec![newest - 300, newest]);
    assert!((series.candles[0].price_open_inverted - 2000.0).abs() < 1e-6);

    let request = &source.requests_to(Endpoint::PoolCandles)[0];
    assert_eq!(request.limit, Some(11));
    assert_eq!(request.period, Some(300));
    assert_eq!(request.cursor, Some(candle_start_time(newest, 10, 300)));

    Ok(())
}

#[tokio::test]
async fn test_candle_request_cancels() -> Result<()> {
    let (source, _sdk, engine) = setup(SyncConfig::default())?;
    source.stall_candles();
    engine.select_pool(eth_usdc_pool());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let series = tokio::time::timeout(
        Duration::from_secs(5),
        engine.candles(300, 0, 100, &cancel),
    )
    .await?;
    assert!(series.is_none());

    Ok(())
}
