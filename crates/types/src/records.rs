/// Indexer record shapes, raw and decorated
///
/// Raw `*Server` structs mirror the graph cache JSON (camelCase, every field
/// optional). Decorated structs carry normalised keys plus the price and
/// liquidity fields derived by the decorator.

use crate::keys::{Address, ChainId, PoolKey, PositionId, PositionKind, TxIdentity};
use crate::RecordResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

// ============================================================================
// Response Envelope
// ============================================================================

/// `{ "data": [...] }` wrapper every list endpoint returns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct IndexerResponse<T> {
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub data: Vec<T>,
}

impl<T> Default for IndexerResponse<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Raw Server Records
// ============================================================================

/// Range or ambient position as served by the indexer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PositionServer {
    pub chain_id: String,
    pub base: String,
    pub quote: String,
    pub pool_idx: u64,
    pub user: String,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_bid: bool,
    pub position_type: String,
    pub time_first_mint: i64,
    pub latest_update_time: i64,
    pub first_mint_tx: String,
    pub last_mint_tx: String,
    pub ambient_liq: f64,
    pub conc_liq: f64,
    pub reward_liq: f64,
    pub liq_refresh_time: i64,
    pub apr_duration: f64,
    pub apr_post_liq: f64,
    pub apr_contributed_liq: f64,
    pub apr_est: f64,
}

/// Knockout liquidity backing a limit order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitOrderServer {
    pub chain_id: String,
    pub base: String,
    pub quote: String,
    pub pool_idx: u64,
    pub user: String,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_bid: bool,
    pub pivot_time: i64,
    pub cross_time: i64,
    pub time_first_mint: i64,
    pub latest_update_time: i64,
    pub conc_liq: f64,
    pub claimable_liq: f64,
}

/// Indexed on-chain change (swap, mint, burn, harvest...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionServer {
    pub chain_id: String,
    pub tx_hash: String,
    pub tx_id: String,
    pub tx_time: i64,
    pub block_num: u64,
    pub user: String,
    pub base: String,
    pub quote: String,
    pub pool_idx: u64,
    pub entity_type: String,
    pub change_type: String,
    pub position_type: String,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_buy: bool,
    pub in_base_qty: bool,
    pub base_flow: f64,
    pub quote_flow: f64,
}

/// Echoed pool parameters of a liquidity curve response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurveStateServer {
    pub chain_id: String,
    pub base: String,
    pub quote: String,
    pub pool_idx: u64,
    pub ambient_liq: f64,
    pub conc_liq: f64,
}

/// One tick band of a liquidity curve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiquidityBandServer {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub active_liq: f64,
}

/// Pool liquidity curve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiquidityCurveServer {
    pub curve_state: CurveStateServer,
    pub ranges: Vec<LiquidityBandServer>,
}

/// OHLC candle in raw (undecimalised) price units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandleServer {
    pub time: i64,
    pub period: u64,
    pub price_open: f64,
    pub price_close: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub volume_base: f64,
    pub volume_quote: f64,
    pub tvl_base: f64,
    pub tvl_quote: f64,
    pub fee_rate_open: f64,
    pub fee_rate_close: f64,
}

fn pool_key_of(chain_id: &str, base: &str, quote: &str, pool_idx: u64) -> RecordResult<PoolKey> {
    Ok(PoolKey::new(
        ChainId::parse(chain_id)?,
        Address::parse(base)?,
        Address::parse(quote)?,
        pool_idx,
    ))
}

impl PositionServer {
    pub fn pool_key(&self) -> RecordResult<PoolKey> {
        pool_key_of(&self.chain_id, &self.base, &self.quote, self.pool_idx)
    }

    pub fn kind(&self) -> RecordResult<PositionKind> {
        self.position_type.parse()
    }

    pub fn position_id(&self) -> RecordResult<PositionId> {
        Ok(PositionId::new(
            Address::parse(&self.user)?,
            &self.pool_key()?,
            self.bid_tick,
            self.ask_tick,
            self.kind()?,
        ))
    }
}

impl LimitOrderServer {
    pub fn pool_key(&self) -> RecordResult<PoolKey> {
        pool_key_of(&self.chain_id, &self.base, &self.quote, self.pool_idx)
    }

    pub fn position_id(&self) -> RecordResult<PositionId> {
        Ok(PositionId::new(
            Address::parse(&self.user)?,
            &self.pool_key()?,
            self.bid_tick,
            self.ask_tick,
            PositionKind::Knockout,
        ))
    }
}

impl TransactionServer {
    pub fn pool_key(&self) -> RecordResult<PoolKey> {
        pool_key_of(&self.chain_id, &self.base, &self.quote, self.pool_idx)
    }

    pub fn identity(&self) -> Option<TxIdentity> {
        TxIdentity::new(&self.tx_hash, &self.tx_id)
    }
}

impl LiquidityCurveServer {
    /// Pool the response claims to describe, with addresses normalised
    pub fn echoed_pool(&self) -> RecordResult<PoolKey> {
        let state = &self.curve_state;
        pool_key_of(&state.chain_id, &state.base, &state.quote, state.pool_idx)
    }
}

// ============================================================================
// Record Trait
// ============================================================================

/// Common view over every collection member
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Key unique within a (chain, pool) scope
    fn identity(&self) -> Self::Id;

    /// `latestUpdateTime` for positions and orders, `txTime` for transactions
    fn record_time(&self) -> i64;

    fn pool(&self) -> &PoolKey;

    /// Liquidity backing the record, `None` for records without liquidity
    fn liquidity(&self) -> Option<f64> {
        None
    }

    /// Zero liquidity records stay queryable but drop out of active views
    fn is_active(&self) -> bool {
        self.liquidity().map(|liq| liq != 0.0).unwrap_or(true)
    }
}

// ============================================================================
// Decorated Records
// ============================================================================

/// Position enriched with prices, token amounts and yield
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub pool: PoolKey,
    pub user: Address,
    pub kind: PositionKind,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub time_first_mint: i64,
    pub latest_update_time: i64,
    pub first_mint_tx: String,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    /// Raw liquidity (ambient plus concentrated)
    pub position_liq: f64,
    /// Token amounts in display units
    pub position_liq_base: f64,
    pub position_liq_quote: f64,
    /// Range bounds in display units, and their inverses
    pub low_price: f64,
    pub high_price: f64,
    pub low_price_inverted: f64,
    pub high_price_inverted: f64,
    pub total_value_usd: f64,
    pub apy: f64,
    pub is_position_in_range: bool,
    pub liq_refresh_time: i64,
    pub ens_name: Option<String>,
}

impl Record for Position {
    type Id = PositionId;

    fn identity(&self) -> Self::Id {
        self.id.clone()
    }

    fn record_time(&self) -> i64 {
        self.latest_update_time
    }

    fn pool(&self) -> &PoolKey {
        &self.pool
    }

    fn liquidity(&self) -> Option<f64> {
        Some(self.position_liq)
    }
}

/// Limit order enriched with its display price and claimable amounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: PositionId,
    pub pool: PoolKey,
    pub user: Address,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_bid: bool,
    pub time_first_mint: i64,
    pub latest_update_time: i64,
    pub cross_time: i64,
    pub position_liq: f64,
    pub claimable_liq: f64,
    pub limit_price: f64,
    pub limit_price_inverted: f64,
    pub total_value_usd: f64,
    pub ens_name: Option<String>,
}

impl Record for LimitOrder {
    type Id = PositionId;

    fn identity(&self) -> Self::Id {
        self.id.clone()
    }

    fn record_time(&self) -> i64 {
        self.latest_update_time
    }

    fn pool(&self) -> &PoolKey {
        &self.pool
    }

    fn liquidity(&self) -> Option<f64> {
        Some(self.position_liq)
    }

    fn is_active(&self) -> bool {
        self.position_liq != 0.0 || self.claimable_liq != 0.0
    }
}

/// Indexed transaction with flows converted to display units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub identity: TxIdentity,
    pub tx_hash: String,
    pub pool: PoolKey,
    pub user: Address,
    pub tx_time: i64,
    pub entity_type: String,
    pub change_type: String,
    pub position_type: String,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_buy: bool,
    pub base_flow: f64,
    pub quote_flow: f64,
    pub value_usd: f64,
    pub ens_name: Option<String>,
}

impl Record for Transaction {
    type Id = TxIdentity;

    fn identity(&self) -> Self::Id {
        self.identity.clone()
    }

    fn record_time(&self) -> i64 {
        self.tx_time
    }

    fn pool(&self) -> &PoolKey {
        &self.pool
    }
}

/// Decorated tick band, bounds in display price units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityBand {
    pub lower_price: f64,
    pub upper_price: f64,
    pub active_liq: f64,
}

/// Liquidity curve of the active pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityCurve {
    pub pool: PoolKey,
    pub ambient_liq: f64,
    pub conc_liq: f64,
    pub bands: Vec<LiquidityBand>,
}

/// Candle with decimal corrected prices and USD volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub period: u64,
    pub price_open: f64,
    pub price_close: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_open_inverted: f64,
    pub price_close_inverted: f64,
    pub min_price_inverted: f64,
    pub max_price_inverted: f64,
    pub volume_usd: f64,
    pub tvl_usd: f64,
    pub fee_rate_open: f64,
    pub fee_rate_close: f64,
}
