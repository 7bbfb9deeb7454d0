//! In-memory collaborators for sync engine tests

pub mod constants;
pub mod helpers;

pub use constants::*;
pub use helpers::*;

use ambient_sync::{ChainSdk, Endpoint, PageRequest, RecordSource, SyncError, SyncResult};
use ambient_types::{
    Address, CandleServer, ChainId, LimitOrderServer, LiquidityCurveServer, PoolKey,
    PositionId, PositionServer, TransactionServer,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Newest first, strictly older than the cursor, at most `limit` records
fn page<T: Clone>(records: &[T], time: impl Fn(&T) -> i64, request: &PageRequest) -> Vec<T> {
    let mut page: Vec<T> = records
        .iter()
        .filter(|r| request.cursor.map(|cursor| time(r) < cursor).unwrap_or(true))
        .cloned()
        .collect();
    page.sort_by_key(|r| std::cmp::Reverse(time(r)));
    if let Some(limit) = request.limit {
        page.truncate(limit as usize);
    }
    page
}

/// Scripted indexer serving fixed records per endpoint
#[derive(Default)]
pub struct FakeSource {
    positions: Mutex<HashMap<Endpoint, Vec<PositionServer>>>,
    limit_orders: Mutex<HashMap<Endpoint, Vec<LimitOrderServer>>>,
    transactions: Mutex<HashMap<Endpoint, Vec<TransactionServer>>>,
    curves: Mutex<HashMap<PoolKey, LiquidityCurveServer>>,
    candles: Mutex<Vec<CandleServer>>,
    failing: Mutex<HashSet<Endpoint>>,
    requests: Mutex<Vec<PageRequest>>,
    liquidity_requests: Mutex<Vec<PoolKey>>,
    liquidity_gate: Mutex<Option<Arc<Notify>>>,
    stall_candles: Mutex<bool>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_positions(&self, endpoint: Endpoint, records: Vec<PositionServer>) {
        self.positions.lock().insert(endpoint, records);
    }

    pub fn set_limit_orders(&self, endpoint: Endpoint, records: Vec<LimitOrderServer>) {
        self.limit_orders.lock().insert(endpoint, records);
    }

    pub fn set_transactions(&self, endpoint: Endpoint, records: Vec<TransactionServer>) {
        self.transactions.lock().insert(endpoint, records);
    }

    pub fn set_liquidity(&self, pool: &PoolKey, curve: LiquidityCurveServer) {
        self.curves.lock().insert(pool.clone(), curve);
    }

    pub fn set_candles(&self, candles: Vec<CandleServer>) {
        *self.candles.lock() = candles;
    }

    /// Make every call to `endpoint` fail with a 500
    pub fn fail(&self, endpoint: Endpoint) {
        self.failing.lock().insert(endpoint);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.failing.lock().remove(&endpoint);
    }

    /// Hold liquidity responses until the returned handle is notified
    pub fn gate_liquidity(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.liquidity_gate.lock() = Some(gate.clone());
        gate
    }

    /// Candle requests never complete
    pub fn stall_candles(&self) {
        *self.stall_candles.lock() = true;
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<PageRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    /// Pools whose liquidity curve was requested, in order
    pub fn liquidity_requests(&self) -> Vec<PoolKey> {
        self.liquidity_requests.lock().clone()
    }

    fn begin(&self, request: &PageRequest) -> SyncResult<()> {
        self.requests.lock().push(request.clone());
        if self.failing.lock().contains(&request.endpoint) {
            return Err(SyncError::Status {
                endpoint: request.endpoint.to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSource for FakeSource {
    async fn fetch_positions(&self, request: &PageRequest) -> SyncResult<Vec<PositionServer>> {
        self.begin(request)?;
        let records = self.positions.lock().get(&request.endpoint).cloned().unwrap_or_default();
        Ok(page(&records, |p| p.latest_update_time, request))
    }

    async fn fetch_limit_orders(
        &self,
        request: &PageRequest,
    ) -> SyncResult<Vec<LimitOrderServer>> {
        self.begin(request)?;
        let records = self
            .limit_orders
            .lock()
            .get(&request.endpoint)
            .cloned()
            .unwrap_or_default();
        Ok(page(&records, |o| o.latest_update_time, request))
    }

    async fn fetch_transactions(
        &self,
        request: &PageRequest,
    ) -> SyncResult<Vec<TransactionServer>> {
        self.begin(request)?;
        let records = self
            .transactions
            .lock()
            .get(&request.endpoint)
            .cloned()
            .unwrap_or_default();
        Ok(page(&records, |t| t.tx_time, request))
    }

    async fn fetch_liquidity(&self, pool: &PoolKey) -> SyncResult<Option<LiquidityCurveServer>> {
        self.liquidity_requests.lock().push(pool.clone());
        let gate = self.liquidity_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().contains(&Endpoint::PoolLiquidityCurve) {
            return Err(SyncError::Status {
                endpoint: Endpoint::PoolLiquidityCurve.to_string(),
                status: 500,
            });
        }
        Ok(self.curves.lock().get(pool).cloned())
    }

    async fn fetch_candles(&self, request: &PageRequest) -> SyncResult<Vec<CandleServer>> {
        self.begin(request)?;
        let stalled = *self.stall_candles.lock();
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(self.candles.lock().clone())
    }
}

/// Chain reads answered from tables
#[derive(Default)]
pub struct FakeSdk {
    decimals: Mutex<HashMap<Address, u8>>,
    spot_prices: Mutex<HashMap<(Address, Address), f64>>,
    usd_prices: Mutex<HashMap<Address, f64>>,
    position_liquidity: Mutex<HashMap<PositionId, f64>>,
    names: Mutex<HashMap<Address, String>>,
    spot_calls: AtomicUsize,
}

impl FakeSdk {
    /// ETH, USDC and WBTC with decimals, spot prices and USD feeds
    pub fn mainnet() -> Self {
        let sdk = Self::default();
        sdk.set_token(ETH, ETH_DECIMALS, Some(ETH_USD));
        sdk.set_token(USDC, USDC_DECIMALS, Some(USDC_USD));
        sdk.set_token(WBTC, WBTC_DECIMALS, Some(WBTC_USD));
        sdk.set_spot_price(&eth_usdc_pool(), ETH_USDC_SPOT);
        sdk.set_spot_price(&wbtc_usdc_pool(), WBTC_USDC_SPOT);
        sdk
    }

    pub fn set_token(&self, token: &str, decimals: u8, usd_price: Option<f64>) {
        let token = address(token);
        self.decimals.lock().insert(token.clone(), decimals);
        match usd_price {
            Some(price) => {
                self.usd_prices.lock().insert(token, price);
            }
            None => {
                self.usd_prices.lock().remove(&token);
            }
        }
    }

    pub fn set_spot_price(&self, pool: &PoolKey, price: f64) {
        self.spot_prices
            .lock()
            .insert((pool.base.clone(), pool.quote.clone()), price);
    }

    pub fn set_position_liquidity(&self, position: PositionId, liquidity: f64) {
        self.position_liquidity.lock().insert(position, liquidity);
    }

    pub fn set_name(&self, user: &str, name: &str) {
        self.names.lock().insert(address(user), name.to_string());
    }

    pub fn spot_calls(&self) -> usize {
        self.spot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainSdk for FakeSdk {
    async fn token_decimals(&self, _chain_id: &ChainId, token: &Address) -> SyncResult<u8> {
        self.decimals
            .lock()
            .get(token)
            .copied()
            .ok_or_else(|| SyncError::Sdk(format!("unknown token {token}")))
    }

    async fn spot_price(&self, pool: &PoolKey, _bucket: i64) -> SyncResult<f64> {
        self.spot_calls.fetch_add(1, Ordering::SeqCst);
        self.spot_prices
            .lock()
            .get(&(pool.base.clone(), pool.quote.clone()))
            .copied()
            .ok_or_else(|| SyncError::Sdk(format!("no pool {pool}")))
    }

    async fn token_usd_price(
        &self,
        _chain_id: &ChainId,
        token: &Address,
    ) -> SyncResult<Option<f64>> {
        Ok(self.usd_prices.lock().get(token).copied())
    }

    async fn position_liquidity(
        &self,
        _chain_id: &ChainId,
        position: &PositionId,
    ) -> SyncResult<f64> {
        Ok(self
            .position_liquidity
            .lock()
            .get(position)
            .copied()
            .unwrap_or(ONCHAIN_LIQUIDITY))
    }

    async fn resolve_name(&self, address: &Address) -> SyncResult<Option<String>> {
        Ok(self.names.lock().get(address).cloned())
    }
}
