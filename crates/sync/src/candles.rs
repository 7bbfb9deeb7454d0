//! Pool candle series

use crate::decorator::{Decorator, PoolPricing};
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{Endpoint, PageRequest, RecordSource};
use ambient_types::math::{invert, to_display_price};
use ambient_types::{Candle, CandleServer, PoolKey, ScopeKey, MAX_CANDLE_COUNT, PRE_BURN_TIME};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    pub pool: PoolKey,
    /// Candle width in seconds
    pub period: u64,
    /// Unix time of the newest candle; 0 means now
    pub end_time: i64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    pub pool: PoolKey,
    pub period: u64,
    /// Oldest first
    pub candles: Vec<Candle>,
}

/// Number of candles to ask for: one extra so the last bucket is not cut off
pub fn cap_candle_count(count: u32) -> u32 {
    let requested = count.saturating_add(1).max(1);
    if requested > MAX_CANDLE_COUNT {
        warn!(requested, cap = MAX_CANDLE_COUNT, "Candle count exceeds cap");
        return MAX_CANDLE_COUNT;
    }
    requested
}

/// First candle time, rounded up onto the period grid
///
/// Reaches back at most `MAX_CANDLE_COUNT` periods and clamps to the `i64` range.
pub fn candle_start_time(end_time: i64, count: u32, period: u64) -> i64 {
    let period = i64::try_from(period.max(1)).unwrap_or(i64::MAX);
    let span = i64::from(count.min(MAX_CANDLE_COUNT)).saturating_mul(period);
    let rough = end_time.saturating_sub(span);
    match rough.rem_euclid(period) {
        0 => rough,
        rem => rough.saturating_add(period - rem),
    }
}

/// Candle periods are positive whole seconds that fit a timestamp
fn validate_period(period: u64) -> SyncResult<()> {
    if period == 0 {
        return Err(SyncError::InvalidRequest(
            "candle period must be positive".to_string(),
        ));
    }
    if i64::try_from(period).is_err() {
        return Err(SyncError::InvalidRequest(format!(
            "candle period {period}s is out of range"
        )));
    }
    Ok(())
}

/// Decimal-correct and price a raw candle payload
///
/// Candles before the protocol launch or with a zero open are dropped. The
/// server sends newest first; the result is oldest first.
pub fn decorate_candles(payload: Vec<CandleServer>, pricing: &PoolPricing) -> Vec<Candle> {
    let base_usd_mult = 10f64.powi(-i32::from(pricing.base_decimals)) * pricing.base_usd;
    let quote_usd_mult = 10f64.powi(-i32::from(pricing.quote_decimals)) * pricing.quote_usd;
    let price = |raw: f64| {
        to_display_price(raw, pricing.base_decimals, pricing.quote_decimals, false)
    };

    let mut candles: Vec<Candle> = payload
        .into_iter()
        .filter(|c| c.price_open > 0.0 && c.time > PRE_BURN_TIME)
        .map(|c| {
            let (open, close) = (price(c.price_open), price(c.price_close));
            let (min, max) = (price(c.min_price), price(c.max_price));
            Candle {
                time: c.time,
                period: c.period,
                price_open: open,
                price_close: close,
                min_price: min,
                max_price: max,
                price_open_inverted: invert(open),
                price_close_inverted: invert(close),
                min_price_inverted: invert(min),
                max_price_inverted: invert(max),
                volume_usd: (c.volume_base * base_usd_mult + c.volume_quote * quote_usd_mult) / 2.0,
                tvl_usd: c.tvl_base * base_usd_mult + c.tvl_quote * quote_usd_mult,
                fee_rate_open: c.fee_rate_open,
                fee_rate_close: c.fee_rate_close,
            }
        })
        .collect();
    candles.reverse();
    candles
}

/// Fetch and decorate a candle series, failing with `Cancelled` when `cancel` fires first
pub async fn try_fetch_candle_series(
    source: &dyn RecordSource,
    decorator: &Decorator,
    request: &CandleRequest,
    cancel: &CancellationToken,
    now: i64,
) -> SyncResult<CandleSeries> {
    validate_period(request.period)?;

    let end_time = if request.end_time == 0 { now } else { request.end_time };
    let limit = cap_candle_count(request.count);
    let page = PageRequest::new(Endpoint::PoolCandles, ScopeKey::Pool(request.pool.clone()))
        .with_period(request.period)
        .with_limit(limit)
        .before(candle_start_time(end_time, limit - 1, request.period));

    let work = async {
        let payload = source.fetch_candles(&page).await?;
        let pricing = decorator.pool_pricing(&request.pool, now).await?;
        let candles = decorate_candles(payload, &pricing);
        debug!(pool = %request.pool, period = request.period, count = candles.len(), "Fetched candles");
        Ok(CandleSeries {
            pool: request.pool.clone(),
            period: request.period,
            candles,
        })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled(format!(
            "candles for {} at {}s",
            request.pool, request.period
        ))),
        result = work => result,
    }
}

/// Like `try_fetch_candle_series`, logging any failure and returning `None`
pub async fn fetch_candle_series(
    source: &dyn RecordSource,
    decorator: &Decorator,
    request: &CandleRequest,
    cancel: &CancellationToken,
    now: i64,
) -> Option<CandleSeries> {
    match try_fetch_candle_series(source, decorator, request, cancel, now).await {
        Ok(series) => Some(series),
        Err(SyncError::Cancelled(_)) => {
            warn!(pool = %request.pool, period = request.period, "Candle request cancelled");
            None
        }
        Err(e) => {
            warn!(pool = %request.pool, error = %e, "Candle fetch failed");
            None
        }
    }
}
