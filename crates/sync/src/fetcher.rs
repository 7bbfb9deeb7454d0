//! Paginated reads from the graph cache indexer

use crate::config::IndexerConfig;
use crate::error::{SyncError, SyncResult};
use ambient_types::{
    CandleServer, IndexerResponse, LimitOrderServer, LiquidityCurveServer, PoolKey,
    PositionServer, RecordKind, ScopeKey, TransactionServer, MAX_PAGE_SIZE,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Endpoints and Requests
// ============================================================================

/// Indexer routes the engine reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    UserPositions,
    UserLimitOrders,
    UserTransactions,
    PoolPositions,
    PoolPositionApyLeaders,
    PoolTransactions,
    PoolLimitOrders,
    UserPoolPositions,
    UserPoolLimitOrders,
    UserPoolTransactions,
    PoolLiquidityCurve,
    PoolCandles,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::UserPositions => "/user_positions",
            Endpoint::UserLimitOrders => "/user_limit_orders",
            Endpoint::UserTransactions => "/user_txs",
            Endpoint::PoolPositions => "/pool_positions",
            Endpoint::PoolPositionApyLeaders => "/pool_position_apy_leaders",
            Endpoint::PoolTransactions => "/pool_txs",
            Endpoint::PoolLimitOrders => "/pool_limit_orders",
            Endpoint::UserPoolPositions => "/user_pool_positions",
            Endpoint::UserPoolLimitOrders => "/user_pool_limit_orders",
            Endpoint::UserPoolTransactions => "/user_pool_txs",
            Endpoint::PoolLiquidityCurve => "/pool_liq_curve",
            Endpoint::PoolCandles => "/pool_candles",
        }
    }

    /// Record family served, `None` for curve and candle routes
    pub fn record_kind(&self) -> Option<RecordKind> {
        match self {
            Endpoint::UserPositions
            | Endpoint::PoolPositions
            | Endpoint::PoolPositionApyLeaders
            | Endpoint::UserPoolPositions => Some(RecordKind::Position),
            Endpoint::UserLimitOrders
            | Endpoint::PoolLimitOrders
            | Endpoint::UserPoolLimitOrders => Some(RecordKind::LimitOrder),
            Endpoint::UserTransactions
            | Endpoint::PoolTransactions
            | Endpoint::UserPoolTransactions => Some(RecordKind::Transaction),
            Endpoint::PoolLiquidityCurve | Endpoint::PoolCandles => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path().trim_start_matches('/'))
    }
}

/// One page of a scoped query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub endpoint: Endpoint,
    pub scope: ScopeKey,
    /// Only records strictly older than this unix time
    pub cursor: Option<i64>,
    pub limit: Option<u32>,
    /// Candle width in seconds
    pub period: Option<u64>,
}

impl PageRequest {
    pub fn new(endpoint: Endpoint, scope: ScopeKey) -> Self {
        Self {
            endpoint,
            scope,
            cursor: None,
            limit: None,
            period: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn before(mut self, cursor: i64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = Some(period);
        self
    }

    /// Query string pairs, page size capped at `max_page_size`
    pub fn query_params(&self, max_page_size: u32) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(8);

        if let Some(user) = self.scope.user() {
            params.push(("user", user.to_string()));
        }
        if let Some(pool) = self.scope.pool() {
            params.push(("base", pool.base.to_string()));
            params.push(("quote", pool.quote.to_string()));
            params.push(("poolIdx", pool.pool_index.to_string()));
        }
        params.push(("chainId", self.scope.chain_id().to_string()));

        if let Some(limit) = self.limit {
            params.push(("n", limit.clamp(1, max_page_size).to_string()));
        }
        if let Some(period) = self.period {
            params.push(("period", period.to_string()));
        }
        if let Some(cursor) = self.cursor {
            let name = match self.endpoint {
                Endpoint::PoolCandles => "time",
                _ => "timeBefore",
            };
            params.push((name, cursor.to_string()));
        }

        params
    }
}

// ============================================================================
// Record Source
// ============================================================================

/// Read side of the indexer
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_positions(&self, request: &PageRequest) -> SyncResult<Vec<PositionServer>>;

    async fn fetch_limit_orders(&self, request: &PageRequest)
        -> SyncResult<Vec<LimitOrderServer>>;

    async fn fetch_transactions(
        &self,
        request: &PageRequest,
    ) -> SyncResult<Vec<TransactionServer>>;

    async fn fetch_liquidity(&self, pool: &PoolKey) -> SyncResult<Option<LiquidityCurveServer>>;

    async fn fetch_candles(&self, request: &PageRequest) -> SyncResult<Vec<CandleServer>>;
}

/// A page of raw records of any family
#[derive(Debug, Clone, PartialEq)]
pub enum RawPage {
    Positions(Vec<PositionServer>),
    LimitOrders(Vec<LimitOrderServer>),
    Transactions(Vec<TransactionServer>),
}

impl RawPage {
    pub fn len(&self) -> usize {
        match self {
            RawPage::Positions(records) => records.len(),
            RawPage::LimitOrders(records) => records.len(),
            RawPage::Transactions(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetch a page, surfacing failures to the caller
pub async fn try_fetch_page(
    source: &dyn RecordSource,
    request: &PageRequest,
) -> SyncResult<RawPage> {
    match request.endpoint.record_kind() {
        Some(RecordKind::Position) => source.fetch_positions(request).await.map(RawPage::Positions),
        Some(RecordKind::LimitOrder) => source
            .fetch_limit_orders(request)
            .await
            .map(RawPage::LimitOrders),
        Some(RecordKind::Transaction) => source
            .fetch_transactions(request)
            .await
            .map(RawPage::Transactions),
        None => Err(SyncError::InvalidRequest(format!(
            "{} does not serve records",
            request.endpoint
        ))),
    }
}

/// Fetch a page, logging a failure and returning `None` in its place
///
/// `Some` of an empty page means the indexer has no records for the scope.
/// `None` means nothing is known this cycle.
pub async fn fetch_page(source: &dyn RecordSource, request: &PageRequest) -> Option<RawPage> {
    match try_fetch_page(source, request).await {
        Ok(page) => Some(page),
        Err(e) => {
            warn!(endpoint = %request.endpoint, scope = %request.scope, error = %e, "Fetch failed");
            None
        }
    }
}

// ============================================================================
// HTTP Client
// ============================================================================

#[derive(Debug, Deserialize)]
struct ObjectResponse<T> {
    data: Option<T>,
}

/// reqwest backed graph cache client
#[derive(Debug, Clone)]
pub struct IndexerClient {
    http: Client,
    base_url: String,
    max_page_size: u32,
}

impl IndexerClient {
    pub fn new(config: &IndexerConfig) -> SyncResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_page_size: config.max_page_size.min(MAX_PAGE_SIZE),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        params: &[(&'static str, String)],
    ) -> SyncResult<T> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let response = self.http.get(&url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_list<T: DeserializeOwned>(&self, request: &PageRequest) -> SyncResult<Vec<T>> {
        let params = request.query_params(self.max_page_size);
        let response: IndexerResponse<T> = self.get_json(request.endpoint, &params).await?;
        debug!(
            endpoint = %request.endpoint,
            scope = %request.scope,
            count = response.data.len(),
            "Fetched page"
        );
        Ok(response.data)
    }
}

#[async_trait]
impl RecordSource for IndexerClient {
    async fn fetch_positions(&self, request: &PageRequest) -> SyncResult<Vec<PositionServer>> {
        self.get_list(request).await
    }

    async fn fetch_limit_orders(
        &self,
        request: &PageRequest,
    ) -> SyncResult<Vec<LimitOrderServer>> {
        self.get_list(request).await
    }

    async fn fetch_transactions(
        &self,
        request: &PageRequest,
    ) -> SyncResult<Vec<TransactionServer>> {
        self.get_list(request).await
    }

    async fn fetch_liquidity(&self, pool: &PoolKey) -> SyncResult<Option<LiquidityCurveServer>> {
        let request = PageRequest::new(Endpoint::PoolLiquidityCurve, ScopeKey::Pool(pool.clone()));
        let params = request.query_params(self.max_page_size);
        let response: ObjectResponse<LiquidityCurveServer> =
            self.get_json(Endpoint::PoolLiquidityCurve, &params).await?;
        Ok(response.data)
    }

    async fn fetch_candles(&self, request: &PageRequest) -> SyncResult<Vec<CandleServer>> {
        self.get_list(request).await
    }
}
