//! Sync engine wiring fetcher, decorator, store and reconciler together

use crate::backfill::{gather_until, Backfill};
use crate::candles::{fetch_candle_series, CandleRequest, CandleSeries};
use crate::config::SyncConfig;
use crate::decorator::{BatchOutcome, Decorator};
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{
    fetch_page, try_fetch_page, Endpoint, IndexerClient, PageRequest, RawPage, RecordSource,
};
use crate::reconciler::{reconcile, ReconcileInputs, ReconciledView};
use crate::scheduler::{ActivityMonitor, Cadence, PollSchedule};
use crate::sdk::ChainSdk;
use crate::session::{SessionLedger, SessionPersistence};
use crate::store::{
    ApplyOutcome, Batch, GraphState, GraphStore, LimitOrderSlot, LiquidityState, MergePolicy,
    PositionSlot, TransactionSlot,
};
use ambient_types::math::price_to_tick;
use ambient_types::{
    LimitOrder, PoolKey, Position, Receipt, Record, ScopeKey, SessionTransaction,
    SessionUpdate, Transaction, UserKey,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A page of another record family than the caller asked for
fn mismatched_page<T>(request: &PageRequest, page: &RawPage) -> Option<T> {
    warn!(
        endpoint = %request.endpoint,
        records = page.len(),
        "Endpoint served an unexpected record family"
    );
    None
}

/// Inputs that trigger a liquidity curve refresh when they change
#[derive(Debug, Clone, PartialEq)]
struct LiquidityMarker {
    pool: PoolKey,
    spot_tick: Option<i32>,
    total_liquidity: f64,
}

/// Keeps the record collections of the active pool and user fresh
pub struct SyncEngine {
    config: SyncConfig,
    source: Arc<dyn RecordSource>,
    decorator: Decorator,
    store: GraphStore,
    ledger: Mutex<SessionLedger>,
    persistence: Option<SessionPersistence>,
    activity: ActivityMonitor,
    pool_schedule: Mutex<PollSchedule>,
    account_schedule: Mutex<PollSchedule>,
    transaction_backfill: Mutex<Backfill>,
    limit_order_backfill: Mutex<Backfill>,
    liquidity_marker: Mutex<Option<LiquidityMarker>>,
}

impl SyncEngine {
    /// Build an engine, restoring the session ledger when a persist directory is set
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn RecordSource>,
        sdk: Arc<dyn ChainSdk>,
    ) -> SyncResult<Self> {
        config.validate_all()?;

        let persistence = config
            .session
            .persist_dir
            .as_ref()
            .map(SessionPersistence::new);
        let ledger = match &persistence {
            Some(persistence) => persistence.load(now_secs())?,
            None => SessionLedger::new(),
        };
        if !ledger.transactions().is_empty() || !ledger.updates().is_empty() {
            info!(
                transactions = ledger.transactions().len(),
                updates = ledger.updates().len(),
                "Restored session ledger"
            );
        }

        let max_empty_scans = config.backfill.max_empty_scans;
        Ok(Self {
            decorator: Decorator::new(sdk, &config.decoration),
            store: GraphStore::new(),
            ledger: Mutex::new(ledger),
            persistence,
            activity: ActivityMonitor::new(
                Duration::from_secs(config.polling.idle_after_secs),
                now_millis(),
            ),
            pool_schedule: Mutex::new(PollSchedule::new(Cadence::pool(&config.polling))),
            account_schedule: Mutex::new(PollSchedule::new(Cadence::account(&config.polling))),
            transaction_backfill: Mutex::new(Backfill::new(max_empty_scans)),
            limit_order_backfill: Mutex::new(Backfill::new(max_empty_scans)),
            liquidity_marker: Mutex::new(None),
            source,
            config,
        })
    }

    /// Build an engine reading from the HTTP indexer named in the config
    pub fn with_indexer(config: SyncConfig, sdk: Arc<dyn ChainSdk>) -> SyncResult<Self> {
        let client = IndexerClient::new(&config.indexer)?;
        info!(url = %client.base_url(), "Using graph cache indexer");
        Self::new(config, Arc::new(client), sdk)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<GraphState> {
        self.store.snapshot()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Make `pool` the active pool; returns false when it already was
    pub fn select_pool(&self, pool: PoolKey) -> bool {
        self.record_activity();
        if !self.store.select_pool(pool) {
            return false;
        }
        self.transaction_backfill.lock().reset();
        self.limit_order_backfill.lock().reset();
        self.pool_schedule.lock().reset();
        *self.liquidity_marker.lock() = None;
        true
    }

    /// Make `user` the active account
    ///
    /// Switching away from a connected account forgets its session ledger.
    pub fn select_user(&self, user: Option<UserKey>) -> bool {
        self.record_activity();
        let previous = self.store.snapshot().user.clone();
        if !self.store.select_user(user) {
            return false;
        }
        if previous.is_some() {
            let mut ledger = self.ledger.lock();
            ledger.clear();
            self.persist(&ledger);
        }
        self.account_schedule.lock().reset();
        self.pool_schedule.lock().reset();
        true
    }

    pub fn record_activity(&self) {
        self.activity.record_activity(now_millis());
    }

    // ========================================================================
    // Fetch and Decorate
    // ========================================================================

    async fn load_positions(
        &self,
        request: &PageRequest,
        now: i64,
        force_onchain_liq: bool,
    ) -> Option<(usize, BatchOutcome<Position>)> {
        let raws = match fetch_page(self.source.as_ref(), request).await? {
            RawPage::Positions(raws) => raws,
            page => return mismatched_page(request, &page),
        };
        let fetched = raws.len();
        let outcome = self
            .decorator
            .decorate_positions(raws, now, force_onchain_liq)
            .await;
        Some((fetched, outcome))
    }

    async fn load_limit_orders(
        &self,
        request: &PageRequest,
        now: i64,
    ) -> Option<(usize, BatchOutcome<LimitOrder>)> {
        let raws = match fetch_page(self.source.as_ref(), request).await? {
            RawPage::LimitOrders(raws) => raws,
            page => return mismatched_page(request, &page),
        };
        let fetched = raws.len();
        Some((fetched, self.decorator.decorate_limit_orders(raws, now).await))
    }

    async fn load_transactions(
        &self,
        request: &PageRequest,
        now: i64,
    ) -> Option<(usize, BatchOutcome<Transaction>)> {
        let raws = match fetch_page(self.source.as_ref(), request).await? {
            RawPage::Transactions(raws) => raws,
            page => return mismatched_page(request, &page),
        };
        let fetched = raws.len();
        Some((fetched, self.decorator.decorate_transactions(raws, now).await))
    }

    async fn sync_positions(
        &self,
        slot: PositionSlot,
        request: PageRequest,
        now: i64,
        force_onchain_liq: bool,
    ) -> ApplyOutcome {
        match self.load_positions(&request, now, force_onchain_liq).await {
            Some((fetched, outcome)) => self.store.apply(
                slot,
                Batch::new(request.scope, fetched, outcome.decorated),
                MergePolicy::Replace,
            ),
            None => ApplyOutcome::Unchanged,
        }
    }

    async fn sync_leaderboard(&self, pool: &PoolKey, now: i64) -> ApplyOutcome {
        let request = PageRequest::new(
            Endpoint::PoolPositionApyLeaders,
            ScopeKey::Pool(pool.clone()),
        )
        .with_limit(self.config.pages.pool_leaderboard);

        let Some((fetched, outcome)) = self.load_positions(&request, now, false).await else {
            return ApplyOutcome::Unchanged;
        };
        let complete = outcome.is_complete();
        let leaders: Vec<Position> = outcome
            .decorated
            .into_iter()
            .filter(|p| p.is_position_in_range && p.apy != 0.0)
            .take(self.config.pages.leaderboard_top)
            .collect();

        // A fully decorated page filtered down to nothing means no eligible leaders
        let fetched = if complete { leaders.len() } else { fetched };
        self.store.apply(
            PositionSlot::Leaderboard,
            Batch::new(request.scope, fetched, leaders),
            MergePolicy::Replace,
        )
    }

    async fn sync_pool_transactions(&self, pool: &PoolKey, now: i64) -> ApplyOutcome {
        let request = PageRequest::new(Endpoint::PoolTransactions, ScopeKey::Pool(pool.clone()))
            .with_limit(self.config.pages.pool_transactions);
        let Some((fetched, outcome)) = self.load_transactions(&request, now).await else {
            return ApplyOutcome::Unchanged;
        };

        let batch = Batch::new(request.scope, fetched, outcome.decorated);
        self.store
            .apply(TransactionSlot::History, batch.clone(), MergePolicy::Unique);
        self.store.apply(
            TransactionSlot::Pool,
            batch,
            MergePolicy::SlidingWindow {
                window: self.config.store.transaction_window,
            },
        )
    }

    async fn sync_pool_limit_orders(&self, pool: &PoolKey, now: i64) -> ApplyOutcome {
        let request = PageRequest::new(Endpoint::PoolLimitOrders, ScopeKey::Pool(pool.clone()))
            .with_limit(self.config.pages.pool_limit_orders);
        let Some((fetched, outcome)) = self.load_limit_orders(&request, now).await else {
            return ApplyOutcome::Unchanged;
        };

        let batch = Batch::new(request.scope, fetched, outcome.decorated);
        self.store
            .apply(LimitOrderSlot::History, batch.clone(), MergePolicy::Unique);
        self.store
            .apply(LimitOrderSlot::Pool, batch, MergePolicy::Replace)
    }

    async fn sync_limit_orders(
        &self,
        slot: LimitOrderSlot,
        request: PageRequest,
        now: i64,
    ) -> ApplyOutcome {
        match self.load_limit_orders(&request, now).await {
            Some((fetched, outcome)) => self.store.apply(
                slot,
                Batch::new(request.scope, fetched, outcome.decorated),
                MergePolicy::Replace,
            ),
            None => ApplyOutcome::Unchanged,
        }
    }

    async fn sync_transactions(
        &self,
        slot: TransactionSlot,
        request: PageRequest,
        now: i64,
    ) -> ApplyOutcome {
        match self.load_transactions(&request, now).await {
            Some((fetched, outcome)) => self.store.apply(
                slot,
                Batch::new(request.scope, fetched, outcome.decorated),
                MergePolicy::Replace,
            ),
            None => ApplyOutcome::Unchanged,
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Refresh every pool collection and, with an account connected, the
    /// account's records in the pool
    pub async fn refresh_pool(&self) {
        let state = self.store.snapshot();
        let Some(pool) = state.pool.clone() else {
            return;
        };
        let now = now_secs();
        let pages = &self.config.pages;
        let pool_scope = ScopeKey::Pool(pool.clone());

        let pool_collections = async {
            tokio::join!(
                self.sync_positions(
                    PositionSlot::Pool,
                    PageRequest::new(Endpoint::PoolPositions, pool_scope.clone())
                        .with_limit(pages.pool_positions),
                    now,
                    false,
                ),
                self.sync_leaderboard(&pool, now),
                self.sync_pool_transactions(&pool, now),
                self.sync_pool_limit_orders(&pool, now),
            )
        };

        let user_pool_collections = async {
            let Some(user) = state.user.clone() else {
                return;
            };
            let scope = ScopeKey::UserPool {
                user: user.user,
                pool: pool.clone(),
            };
            tokio::join!(
                self.sync_positions(
                    PositionSlot::UserPool,
                    PageRequest::new(Endpoint::UserPoolPositions, scope.clone()),
                    now,
                    true,
                ),
                self.sync_limit_orders(
                    LimitOrderSlot::UserPool,
                    PageRequest::new(Endpoint::UserPoolLimitOrders, scope.clone()),
                    now,
                ),
                self.sync_transactions(
                    TransactionSlot::UserPool,
                    PageRequest::new(Endpoint::UserPoolTransactions, scope)
                        .with_limit(pages.user_pool_transactions),
                    now,
                ),
            );
        };

        let ((positions, leaderboard, transactions, limit_orders), ()) =
            tokio::join!(pool_collections, user_pool_collections);
        debug!(
            pool = %pool,
            positions = ?positions,
            leaderboard = ?leaderboard,
            transactions = ?transactions,
            limit_orders = ?limit_orders,
            "Pool refresh complete"
        );

        if self.liquidity_inputs_changed(&pool, now).await {
            self.refresh_liquidity().await;
        }
    }

    /// True when the spot tick or summed pool liquidity moved since the last curve
    async fn liquidity_inputs_changed(&self, pool: &PoolKey, now: i64) -> bool {
        let spot_tick = match self.decorator.pool_pricing(pool, now).await {
            Ok(pricing) => price_to_tick(pricing.spot_price),
            Err(e) => {
                warn!(pool = %pool, error = %e, "Spot price unavailable");
                None
            }
        };
        let state = self.store.snapshot();
        let marker = LiquidityMarker {
            pool: pool.clone(),
            spot_tick,
            total_liquidity: state.total_pool_liquidity(),
        };

        let ready = matches!(&state.liquidity, LiquidityState::Ready(curve) if &curve.pool == pool);
        let mut last = self.liquidity_marker.lock();
        if ready && last.as_ref() == Some(&marker) {
            return false;
        }
        *last = Some(marker);
        true
    }

    /// Refresh the connected account's records across all pools
    pub async fn refresh_user(&self) {
        let Some(user) = self.store.snapshot().user.clone() else {
            return;
        };
        let now = now_secs();
        let scope = ScopeKey::User(user.clone());

        let (positions, limit_orders, transactions) = tokio::join!(
            self.sync_positions(
                PositionSlot::User,
                PageRequest::new(Endpoint::UserPositions, scope.clone()),
                now,
                false,
            ),
            self.sync_limit_orders(
                LimitOrderSlot::User,
                PageRequest::new(Endpoint::UserLimitOrders, scope.clone()),
                now,
            ),
            self.sync_transactions(
                TransactionSlot::User,
                PageRequest::new(Endpoint::UserTransactions, scope)
                    .with_limit(self.config.pages.user_transactions),
                now,
            ),
        );
        debug!(
            user = %user,
            positions = ?positions,
            limit_orders = ?limit_orders,
            transactions = ?transactions,
            "Account refresh complete"
        );
    }

    /// Fetch the active pool's liquidity curve; false when nothing was accepted
    pub async fn refresh_liquidity(&self) -> bool {
        let state = self.store.snapshot();
        let Some(pool) = state.pool.clone() else {
            return false;
        };
        if !matches!(&state.liquidity, LiquidityState::Ready(curve) if curve.pool == pool) {
            self.store.set_liquidity_pending(&pool);
        }

        let raw = match self.source.fetch_liquidity(&pool).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(pool = %pool, "No liquidity curve for pool");
                return false;
            }
            Err(e) => {
                warn!(pool = %pool, error = %e, "Liquidity fetch failed");
                return false;
            }
        };

        match self.decorator.decorate_liquidity(raw, now_secs()).await {
            Ok(curve) => self.store.set_liquidity(curve, &pool),
            Err(e) => {
                warn!(pool = %pool, error = %e, "Liquidity decoration failed");
                false
            }
        }
    }

    // ========================================================================
    // Load More
    // ========================================================================

    pub fn more_pool_transactions(&self) -> bool {
        self.transaction_backfill.lock().more_data_available()
    }

    pub fn more_pool_limit_orders(&self) -> bool {
        self.limit_order_backfill.lock().more_data_available()
    }

    /// Fetch one page of pool transactions older than the history; returns new records
    pub async fn load_more_pool_transactions(&self) -> usize {
        self.record_activity();
        if !self.more_pool_transactions() {
            return 0;
        }
        let state = self.store.snapshot();
        let Some(pool) = state.pool.clone() else {
            return 0;
        };
        let now = now_secs();
        let request = PageRequest::new(Endpoint::PoolTransactions, ScopeKey::Pool(pool))
            .with_limit(self.config.pages.backfill_page)
            .before(Backfill::cursor(&state.transaction_history, now));

        let Some((fetched, outcome)) = self.load_transactions(&request, now).await else {
            return 0;
        };
        let applied = self.store.apply(
            TransactionSlot::History,
            Batch::new(request.scope, fetched, outcome.decorated),
            MergePolicy::Unique,
        );
        self.finish_scan(&self.transaction_backfill, applied)
    }

    /// Page pool limit orders backwards until enough new ones turn up; returns new records
    pub async fn load_more_pool_limit_orders(&self) -> usize {
        self.record_activity();
        if !self.more_pool_limit_orders() {
            return 0;
        }
        let state = self.store.snapshot();
        let Some(pool) = state.pool.clone() else {
            return 0;
        };
        let now = now_secs();
        let scope = ScopeKey::Pool(pool);
        let history = &state.limit_order_history;
        let seen: HashSet<_> = history.records.iter().map(Record::identity).collect();

        let gathered = gather_until(
            Backfill::cursor(history, now),
            self.config.pages.limit_backfill_target,
            seen,
            |cursor| {
                let request = PageRequest::new(Endpoint::PoolLimitOrders, scope.clone())
                    .with_limit(self.config.pages.backfill_page)
                    .before(cursor);
                async move {
                    let RawPage::LimitOrders(raws) =
                        try_fetch_page(self.source.as_ref(), &request).await?
                    else {
                        return Err(SyncError::InvalidRequest(format!(
                            "{} does not serve limit orders",
                            request.endpoint
                        )));
                    };
                    Ok(self.decorator.decorate_limit_orders(raws, now).await.decorated)
                }
            },
        )
        .await;
        debug!(pages = gathered.pages, found = gathered.records.len(), "Limit order backfill");
        // A failed fetch is no data this cycle, not an empty scan
        if gathered.failed && gathered.records.is_empty() {
            return 0;
        }

        let fetched = gathered.records.len();
        let applied = self.store.apply(
            LimitOrderSlot::History,
            Batch::new(scope, fetched, gathered.records),
            MergePolicy::Unique,
        );
        self.finish_scan(&self.limit_order_backfill, applied)
    }

    fn finish_scan(&self, backfill: &Mutex<Backfill>, applied: ApplyOutcome) -> usize {
        if applied == ApplyOutcome::Stale {
            return 0;
        }
        let added = applied.added();
        backfill.lock().record_scan(added);
        added
    }

    // ========================================================================
    // Candles
    // ========================================================================

    /// Candle series for the active pool; `None` on failure or cancellation
    pub async fn candles(
        &self,
        period: u64,
        end_time: i64,
        count: u32,
        cancel: &CancellationToken,
    ) -> Option<CandleSeries> {
        let pool = self.store.snapshot().pool.clone()?;
        let request = CandleRequest {
            pool,
            period,
            end_time,
            count,
        };
        fetch_candle_series(
            self.source.as_ref(),
            &self.decorator,
            &request,
            cancel,
            now_secs(),
        )
        .await
    }

    // ========================================================================
    // Session
    // ========================================================================

    fn persist(&self, ledger: &SessionLedger) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(ledger) {
                warn!(error = %e, "Failed to persist session ledger");
            }
        }
    }

    pub fn record_submission(&self, tx: SessionTransaction) {
        self.record_activity();
        let mut ledger = self.ledger.lock();
        if ledger.record_submission(tx) {
            self.persist(&ledger);
        }
    }

    pub fn record_position_update(&self, update: SessionUpdate) {
        let mut ledger = self.ledger.lock();
        if ledger.record_position_update(update) {
            self.persist(&ledger);
        }
    }

    pub fn record_receipt(&self, receipt: Receipt) {
        let mut ledger = self.ledger.lock();
        ledger.record_receipt(receipt);
        self.persist(&ledger);
    }

    /// Session state the indexer has not yet confirmed
    ///
    /// Terminal transitions found in this pass are committed to the ledger.
    pub fn reconciled(&self) -> ReconciledView {
        let state = self.store.snapshot();
        let positions: Vec<Position> = state
            .positions_by_user
            .records
            .iter()
            .chain(&state.user_positions_by_pool.records)
            .cloned()
            .collect();
        let limit_orders: Vec<LimitOrder> = state
            .limit_orders_by_user
            .records
            .iter()
            .chain(&state.user_limit_orders_by_pool.records)
            .cloned()
            .collect();

        let mut ledger = self.ledger.lock();
        let view = {
            let failed = ledger.failed_hashes();
            reconcile(&ReconcileInputs {
                transactions: ledger.transactions(),
                updates: ledger.updates(),
                failed: &failed,
                terminal: ledger.terminal_statuses(),
                user_positions: &positions,
                user_limit_orders: &limit_orders,
                user_transactions: &state.transactions_by_user.records,
                user_pool_transactions: &state.user_transactions_by_pool.records,
                unix_time_offset: self.config.reconciler.unix_time_offset_secs,
            })
        };
        if ledger.commit_transitions(&view.transitions) > 0 {
            self.persist(&ledger);
        }
        view
    }

    // ========================================================================
    // Polling Loop
    // ========================================================================

    /// Run whichever refreshes are due at `now_ms`
    pub async fn poll_once(&self, now_ms: i64) {
        let idle = self.activity.is_idle(now_ms);
        let pool_due = self.pool_schedule.lock().due(now_ms, idle);
        let account_due = self.account_schedule.lock().due(now_ms, idle);

        tokio::join!(
            async {
                if pool_due {
                    self.refresh_pool().await;
                }
            },
            async {
                if account_due {
                    self.refresh_user().await;
                }
            },
        );
    }

    /// Poll until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = time::interval(Duration::from_millis(self.config.polling.tick_millis));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_millis = self.config.polling.tick_millis, "Sync loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Sync loop stopped");
                    break;
                }
                _ = async {
                    ticker.tick().await;
                    self.poll_once(now_millis()).await;
                } => {}
            }
        }
    }
}
