use crate::constants::*;
use ambient_types::{
    Address, CandleServer, ChainId, CurveStateServer, LimitOrderServer, LiquidityBandServer,
    LiquidityCurveServer, PoolKey, PositionServer, TransactionServer, UserKey,
};

pub fn address(raw: &str) -> Address {
    Address::parse(raw).expect("valid test address")
}

pub fn chain_id() -> ChainId {
    ChainId::parse(TEST_CHAIN_ID).expect("valid test chain")
}

pub fn eth_usdc_pool() -> PoolKey {
    PoolKey::from_pair(chain_id(), address(ETH), address(USDC), TEST_POOL_INDEX)
}

pub fn wbtc_usdc_pool() -> PoolKey {
    PoolKey::from_pair(chain_id(), address(WBTC), address(USDC), TEST_POOL_INDEX)
}

pub fn test_user() -> UserKey {
    UserKey::new(chain_id(), address(TEST_USER))
}

pub fn other_user() -> UserKey {
    UserKey::new(chain_id(), address(OTHER_USER))
}

/// Concentrated position in `pool` spanning `[bid_tick, ask_tick)`
pub fn range_position(
    pool: &PoolKey,
    user: &str,
    bid_tick: i32,
    ask_tick: i32,
    updated: i64,
) -> PositionServer {
    PositionServer {
        chain_id: pool.chain_id.to_string(),
        base: pool.base.to_string(),
        quote: pool.quote.to_string(),
        pool_idx: pool.pool_index,
        user: user.to_string(),
        bid_tick,
        ask_tick,
        position_type: "concentrated".to_string(),
        time_first_mint: updated,
        latest_update_time: updated,
        first_mint_tx: format!("0xmint{updated:x}"),
        conc_liq: 1e12,
        liq_refresh_time: updated,
        ..Default::default()
    }
}

pub fn ambient_position(pool: &PoolKey, user: &str, updated: i64) -> PositionServer {
    PositionServer {
        bid_tick: 0,
        ask_tick: 0,
        position_type: "ambient".to_string(),
        ambient_liq: 1e12,
        conc_liq: 0.0,
        ..range_position(pool, user, 0, 0, updated)
    }
}

pub fn limit_order(
    pool: &PoolKey,
    user: &str,
    bid_tick: i32,
    is_bid: bool,
    updated: i64,
) -> LimitOrderServer {
    LimitOrderServer {
        chain_id: pool.chain_id.to_string(),
        base: pool.base.to_string(),
        quote: pool.quote.to_string(),
        pool_idx: pool.pool_index,
        user: user.to_string(),
        bid_tick,
        ask_tick: bid_tick + 1,
        is_bid,
        pivot_time: updated,
        time_first_mint: updated,
        latest_update_time: updated,
        conc_liq: 1e9,
        ..Default::default()
    }
}

/// Swap in `pool` with a hash derived from `seq`
pub fn swap(pool: &PoolKey, seq: u64, time: i64) -> TransactionServer {
    TransactionServer {
        chain_id: pool.chain_id.to_string(),
        tx_hash: format!("0x{seq:064x}"),
        tx_time: time,
        block_num: seq,
        user: TEST_USER.to_string(),
        base: pool.base.to_string(),
        quote: pool.quote.to_string(),
        pool_idx: pool.pool_index,
        entity_type: "swap".to_string(),
        change_type: "swap".to_string(),
        is_buy: seq % 2 == 0,
        base_flow: 1e18,
        quote_flow: -2000e6,
        ..Default::default()
    }
}

/// `count` swaps with consecutive hashes, one per second ending at `newest`
pub fn swaps(pool: &PoolKey, first_seq: u64, count: u64, newest: i64) -> Vec<TransactionServer> {
    (0..count)
        .map(|i| swap(pool, first_seq + i, newest - i as i64))
        .collect()
}

pub fn liquidity_curve(pool: &PoolKey) -> LiquidityCurveServer {
    LiquidityCurveServer {
        curve_state: CurveStateServer {
            chain_id: pool.chain_id.to_string(),
            base: pool.base.to_string(),
            quote: pool.quote.to_string(),
            pool_idx: pool.pool_index,
            ambient_liq: 5e15,
            conc_liq: 1e15,
        },
        ranges: vec![
            LiquidityBandServer {
                lower_bound: 195_000.0,
                upper_bound: 200_000.0,
                active_liq: 2e15,
            },
            LiquidityBandServer {
                lower_bound: 200_000.0,
                upper_bound: 205_000.0,
                active_liq: 4e15,
            },
        ],
    }
}

pub fn candle(time: i64, period: u64) -> CandleServer {
    CandleServer {
        time,
        period,
        price_open: ETH_USDC_SPOT,
        price_close: ETH_USDC_SPOT,
        min_price: ETH_USDC_SPOT * 0.9,
        max_price: ETH_USDC_SPOT * 1.1,
        volume_base: 1e18,
        volume_quote: 2000e6,
        tvl_base: 1e20,
        tvl_quote: 2e11,
        fee_rate_open: 0.0005,
        fee_rate_close: 0.0005,
    }
}
