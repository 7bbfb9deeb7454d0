//! Enrichment of raw indexer records with prices, token amounts and yield
//!
//! Decoration never touches the store. Each record is decorated on its own and
//! a failure only drops that record from the batch.

use crate::cache::{time_bucket, CachedData};
use crate::config::DecorationConfig;
use crate::error::{SyncError, SyncResult};
use crate::sdk::ChainSdk;
use ambient_types::math::{
    ambient_amounts, concentrated_amounts, invert, is_tick_in_range, price_to_tick,
    tick_to_price, to_display_price, to_display_qty, TICK_BASE,
};
use ambient_types::{
    Address, LimitOrder, LimitOrderServer, LiquidityBand, LiquidityCurve, LiquidityCurveServer,
    PoolKey, Position, PositionKind, PositionServer, Record, Transaction, TransactionServer,
};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Result of decorating a batch: survivors in input order plus the failures
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub decorated: Vec<T>,
    pub failures: Vec<SyncError>,
}

impl<T> BatchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `decorate` over every item, isolating failures per item
///
/// With `max_concurrency` unset every item is in flight at once.
pub async fn decorate_batch<R, T, F, Fut>(
    items: Vec<R>,
    max_concurrency: Option<usize>,
    decorate: F,
) -> BatchOutcome<T>
where
    F: Fn(R) -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let results: Vec<SyncResult<T>> = match max_concurrency {
        Some(limit) => {
            stream::iter(items.into_iter().map(&decorate))
                .buffered(limit.max(1))
                .collect()
                .await
        }
        None => join_all(items.into_iter().map(&decorate)).await,
    };

    let mut outcome = BatchOutcome {
        decorated: Vec::with_capacity(results.len()),
        failures: Vec::new(),
    };
    for result in results {
        match result {
            Ok(record) => outcome.decorated.push(record),
            Err(e) => {
                warn!(error = %e, "Dropping record that failed decoration");
                outcome.failures.push(e);
            }
        }
    }
    outcome
}

/// Keep one limit order per identity, the most recently updated one
pub fn dedupe_limit_orders(orders: Vec<LimitOrder>) -> Vec<LimitOrder> {
    let mut slots: HashMap<_, usize> = HashMap::with_capacity(orders.len());
    let mut kept: Vec<LimitOrder> = Vec::with_capacity(orders.len());

    for order in orders {
        match slots.get(&order.identity()) {
            Some(&slot) => {
                if order.latest_update_time > kept[slot].latest_update_time {
                    kept[slot] = order;
                }
            }
            None => {
                slots.insert(order.identity(), kept.len());
                kept.push(order);
            }
        }
    }
    kept
}

/// Token decimals, spot price and USD prices of one pool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolPricing {
    pub base_decimals: u8,
    pub quote_decimals: u8,
    /// Raw base-per-quote spot price
    pub spot_price: f64,
    pub base_usd: f64,
    pub quote_usd: f64,
}

impl PoolPricing {
    /// Spot price in display units
    pub fn display_price(&self) -> f64 {
        to_display_price(self.spot_price, self.base_decimals, self.quote_decimals, false)
    }

    pub fn usd_value(&self, base_qty: f64, quote_qty: f64) -> f64 {
        base_qty.abs() * self.base_usd + quote_qty.abs() * self.quote_usd
    }
}

/// Everything decoration reads through
#[derive(Clone)]
pub struct Decorator {
    sdk: Arc<dyn ChainSdk>,
    caches: CachedData,
    price_bucket_secs: u64,
    skip_name_lookup: bool,
    max_concurrency: Option<usize>,
}

impl Decorator {
    pub fn new(sdk: Arc<dyn ChainSdk>, config: &DecorationConfig) -> Self {
        Self {
            sdk,
            caches: CachedData::new(config.price_bucket_secs),
            price_bucket_secs: config.price_bucket_secs,
            skip_name_lookup: config.skip_name_lookup,
            max_concurrency: config.max_concurrency,
        }
    }

    pub fn sdk(&self) -> &dyn ChainSdk {
        self.sdk.as_ref()
    }

    /// Decimals and prices for a pool, with the USD fallbacks derived from the spot price
    pub async fn pool_pricing(&self, pool: &PoolKey, now: i64) -> SyncResult<PoolPricing> {
        let sdk = self.sdk.as_ref();
        let bucket = time_bucket(now, self.price_bucket_secs);

        let (base_decimals, quote_decimals, spot_price, base_usd, quote_usd) = tokio::try_join!(
            self.caches.token_decimals(sdk, &pool.chain_id, &pool.base),
            self.caches.token_decimals(sdk, &pool.chain_id, &pool.quote),
            self.caches.spot_price(sdk, pool, bucket),
            self.caches.token_usd_price(sdk, &pool.chain_id, &pool.base, bucket),
            self.caches.token_usd_price(sdk, &pool.chain_id, &pool.quote, bucket),
        )?;

        let display = to_display_price(spot_price, base_decimals, quote_decimals, false);
        let base = match (base_usd, quote_usd) {
            (Some(price), _) => price,
            (None, Some(quote)) if display > 0.0 => quote / display,
            _ => 0.0,
        };
        let quote = match (quote_usd, base_usd) {
            (Some(price), _) => price,
            (None, Some(base)) => base * display,
            _ => 0.0,
        };

        Ok(PoolPricing {
            base_decimals,
            quote_decimals,
            spot_price,
            base_usd: base,
            quote_usd: quote,
        })
    }

    async fn lookup_name(&self, user: &Address) -> Option<String> {
        if self.skip_name_lookup {
            return None;
        }
        match self.caches.name(self.sdk.as_ref(), user).await {
            Ok(name) => name,
            Err(e) => {
                warn!(user = %user, error = %e, "Name lookup failed");
                None
            }
        }
    }

    // ========================================================================
    // Single Records
    // ========================================================================

    pub async fn decorate_position(
        &self,
        raw: PositionServer,
        now: i64,
        force_onchain_liq: bool,
    ) -> SyncResult<Position> {
        let id = raw.position_id()?;
        let pool = raw.pool_key()?;
        let pricing = self
            .pool_pricing(&pool, now)
            .await
            .map_err(|e| SyncError::decoration(id.to_string(), e.to_string()))?;

        let (position_liq, liq_refresh_time) = if force_onchain_liq {
            let liq = self
                .sdk
                .position_liquidity(&pool.chain_id, &id)
                .await
                .map_err(|e| SyncError::decoration(id.to_string(), e.to_string()))?;
            (liq, now)
        } else {
            (raw.ambient_liq + raw.conc_liq, raw.liq_refresh_time)
        };

        let (base_raw, quote_raw) = match id.kind {
            PositionKind::Ambient => ambient_amounts(position_liq, pricing.spot_price),
            _ => concentrated_amounts(position_liq, pricing.spot_price, id.bid_tick, id.ask_tick),
        };
        let position_liq_base = to_display_qty(base_raw, pricing.base_decimals);
        let position_liq_quote = to_display_qty(quote_raw, pricing.quote_decimals);

        let is_position_in_range = match id.kind {
            PositionKind::Ambient => true,
            _ => price_to_tick(pricing.spot_price)
                .map(|tick| is_tick_in_range(tick, id.bid_tick, id.ask_tick))
                .unwrap_or(false),
        };

        let (low_price, high_price) = match id.kind {
            PositionKind::Ambient => (0.0, f64::INFINITY),
            _ => (
                to_display_price(
                    tick_to_price(id.bid_tick),
                    pricing.base_decimals,
                    pricing.quote_decimals,
                    false,
                ),
                to_display_price(
                    tick_to_price(id.ask_tick),
                    pricing.base_decimals,
                    pricing.quote_decimals,
                    false,
                ),
            ),
        };

        let ens_name = self.lookup_name(&id.user).await;

        Ok(Position {
            pool,
            user: id.user.clone(),
            kind: id.kind,
            bid_tick: id.bid_tick,
            ask_tick: id.ask_tick,
            time_first_mint: raw.time_first_mint,
            latest_update_time: raw.latest_update_time,
            first_mint_tx: raw.first_mint_tx,
            base_decimals: pricing.base_decimals,
            quote_decimals: pricing.quote_decimals,
            position_liq,
            position_liq_base,
            position_liq_quote,
            low_price,
            high_price,
            low_price_inverted: invert(low_price),
            high_price_inverted: invert(high_price),
            total_value_usd: pricing.usd_value(position_liq_base, position_liq_quote),
            apy: raw.apr_est * 100.0,
            is_position_in_range,
            liq_refresh_time,
            ens_name,
            id,
        })
    }

    pub async fn decorate_limit_order(
        &self,
        raw: LimitOrderServer,
        now: i64,
    ) -> SyncResult<LimitOrder> {
        let id = raw.position_id()?;
        let pool = raw.pool_key()?;
        let pricing = self
            .pool_pricing(&pool, now)
            .await
            .map_err(|e| SyncError::decoration(id.to_string(), e.to_string()))?;

        let knockout_tick = if raw.is_bid { raw.bid_tick } else { raw.ask_tick };
        let limit_price = to_display_price(
            tick_to_price(knockout_tick),
            pricing.base_decimals,
            pricing.quote_decimals,
            false,
        );

        let (base_raw, quote_raw) =
            concentrated_amounts(raw.conc_liq, pricing.spot_price, raw.bid_tick, raw.ask_tick);
        // Claimed side sits entirely in the token the order converts into
        let (claim_base, claim_quote) = if raw.is_bid {
            concentrated_amounts(raw.claimable_liq, tick_to_price(raw.bid_tick), raw.bid_tick, raw.ask_tick)
        } else {
            concentrated_amounts(raw.claimable_liq, tick_to_price(raw.ask_tick), raw.bid_tick, raw.ask_tick)
        };
        let base_qty = to_display_qty(base_raw + claim_base, pricing.base_decimals);
        let quote_qty = to_display_qty(quote_raw + claim_quote, pricing.quote_decimals);

        let ens_name = self.lookup_name(&id.user).await;

        Ok(LimitOrder {
            pool,
            user: id.user.clone(),
            bid_tick: raw.bid_tick,
            ask_tick: raw.ask_tick,
            is_bid: raw.is_bid,
            time_first_mint: raw.time_first_mint,
            latest_update_time: raw.latest_update_time,
            cross_time: raw.cross_time,
            position_liq: raw.conc_liq,
            claimable_liq: raw.claimable_liq,
            limit_price,
            limit_price_inverted: invert(limit_price),
            total_value_usd: pricing.usd_value(base_qty, quote_qty),
            ens_name,
            id,
        })
    }

    pub async fn decorate_transaction(
        &self,
        raw: TransactionServer,
        now: i64,
    ) -> SyncResult<Transaction> {
        let identity = raw
            .identity()
            .ok_or_else(|| SyncError::decoration("transaction", "missing hash and id"))?;
        let pool = raw.pool_key()?;
        let user = Address::parse(&raw.user)?;
        let pricing = self
            .pool_pricing(&pool, now)
            .await
            .map_err(|e| SyncError::decoration(identity.to_string(), e.to_string()))?;

        let base_flow = to_display_qty(raw.base_flow, pricing.base_decimals);
        let quote_flow = to_display_qty(raw.quote_flow, pricing.quote_decimals);
        let gross = pricing.usd_value(base_flow, quote_flow);
        // Both legs of a swap carry the same value
        let value_usd = if raw.entity_type.eq_ignore_ascii_case("swap") {
            gross / 2.0
        } else {
            gross
        };

        let ens_name = self.lookup_name(&user).await;

        Ok(Transaction {
            identity,
            tx_hash: raw.tx_hash,
            pool,
            user,
            tx_time: raw.tx_time,
            entity_type: raw.entity_type,
            change_type: raw.change_type,
            position_type: raw.position_type,
            bid_tick: raw.bid_tick,
            ask_tick: raw.ask_tick,
            is_buy: raw.is_buy,
            base_flow,
            quote_flow,
            value_usd,
            ens_name,
        })
    }

    pub async fn decorate_liquidity(
        &self,
        raw: LiquidityCurveServer,
        now: i64,
    ) -> SyncResult<LiquidityCurve> {
        let pool = raw.echoed_pool()?;
        let pricing = self.pool_pricing(&pool, now).await?;

        let to_price = |bound: f64| {
            to_display_price(
                TICK_BASE.powf(bound),
                pricing.base_decimals,
                pricing.quote_decimals,
                false,
            )
        };
        let bands = raw
            .ranges
            .iter()
            .map(|band| LiquidityBand {
                lower_price: to_price(band.lower_bound),
                upper_price: to_price(band.upper_bound),
                active_liq: band.active_liq,
            })
            .collect();

        Ok(LiquidityCurve {
            pool,
            ambient_liq: raw.curve_state.ambient_liq,
            conc_liq: raw.curve_state.conc_liq,
            bands,
        })
    }

    // ========================================================================
    // Batches
    // ========================================================================

    pub async fn decorate_positions(
        &self,
        raws: Vec<PositionServer>,
        now: i64,
        force_onchain_liq: bool,
    ) -> BatchOutcome<Position> {
        decorate_batch(raws, self.max_concurrency, |raw| {
            self.decorate_position(raw, now, force_onchain_liq)
        })
        .await
    }

    /// Decorated limit orders, one per identity
    pub async fn decorate_limit_orders(
        &self,
        raws: Vec<LimitOrderServer>,
        now: i64,
    ) -> BatchOutcome<LimitOrder> {
        let mut outcome = decorate_batch(raws, self.max_concurrency, |raw| {
            self.decorate_limit_order(raw, now)
        })
        .await;
        outcome.decorated = dedupe_limit_orders(outcome.decorated);
        outcome
    }

    pub async fn decorate_transactions(
        &self,
        raws: Vec<TransactionServer>,
        now: i64,
    ) -> BatchOutcome<Transaction> {
        decorate_batch(raws, self.max_concurrency, |raw| {
            self.decorate_transaction(raw, now)
        })
        .await
    }
}
