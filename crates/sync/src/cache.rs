//! Memoised lookups shared by every decoration batch
//!
//! Concurrent lookups of one key wait on a single SDK call. Failures are not
//! cached, so the next refresh retries them.

use crate::error::{SyncError, SyncResult};
use crate::sdk::ChainSdk;
use ambient_types::{Address, ChainId, PoolKey};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Coarse time bucket used as part of price cache keys
pub fn time_bucket(now_secs: i64, width_secs: u64) -> i64 {
    let width = width_secs.max(1) as i64;
    now_secs.div_euclid(width)
}

#[derive(Clone)]
pub struct CachedData {
    token_prices: Cache<(ChainId, Address, i64), Option<f64>>,
    spot_prices: Cache<(PoolKey, i64), f64>,
    token_decimals: Cache<(ChainId, Address), u8>,
    names: Cache<Address, Option<String>>,
}

impl CachedData {
    /// Price entries outlive a few buckets at most; decimals never change
    pub fn new(bucket_secs: u64) -> Self {
        let price_ttl = Duration::from_secs(bucket_secs.max(1) * 4);
        Self {
            token_prices: Cache::builder()
                .time_to_live(price_ttl)
                .max_capacity(10_000)
                .build(),
            spot_prices: Cache::builder()
                .time_to_live(price_ttl)
                .max_capacity(10_000)
                .build(),
            token_decimals: Cache::builder().max_capacity(10_000).build(),
            names: Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .max_capacity(10_000)
                .build(),
        }
    }

    pub async fn token_decimals(
        &self,
        sdk: &dyn ChainSdk,
        chain_id: &ChainId,
        token: &Address,
    ) -> SyncResult<u8> {
        self.token_decimals
            .try_get_with((chain_id.clone(), token.clone()), sdk.token_decimals(chain_id, token))
            .await
            .map_err(unwrap_shared)
    }

    pub async fn token_usd_price(
        &self,
        sdk: &dyn ChainSdk,
        chain_id: &ChainId,
        token: &Address,
        bucket: i64,
    ) -> SyncResult<Option<f64>> {
        self.token_prices
            .try_get_with(
                (chain_id.clone(), token.clone(), bucket),
                sdk.token_usd_price(chain_id, token),
            )
            .await
            .map_err(unwrap_shared)
    }

    pub async fn spot_price(
        &self,
        sdk: &dyn ChainSdk,
        pool: &PoolKey,
        bucket: i64,
    ) -> SyncResult<f64> {
        self.spot_prices
            .try_get_with((pool.clone(), bucket), sdk.spot_price(pool, bucket))
            .await
            .map_err(unwrap_shared)
    }

    pub async fn name(&self, sdk: &dyn ChainSdk, address: &Address) -> SyncResult<Option<String>> {
        self.names
            .try_get_with(address.clone(), sdk.resolve_name(address))
            .await
            .map_err(unwrap_shared)
    }
}

fn unwrap_shared(err: Arc<SyncError>) -> SyncError {
    (*err).clone()
}
