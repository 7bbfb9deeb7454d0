//! Chain SDK collaborator used during decoration

use crate::error::SyncResult;
use ambient_types::{Address, ChainId, PoolKey, PositionId};
use async_trait::async_trait;

/// On-chain and pricing reads the decorator depends on
#[async_trait]
pub trait ChainSdk: Send + Sync {
    /// ERC20 decimals of a token
    async fn token_decimals(&self, chain_id: &ChainId, token: &Address) -> SyncResult<u8>;

    /// Raw spot price (base per quote) of a pool; `bucket` is the coarse time
    /// bucket the caller memoises under
    async fn spot_price(&self, pool: &PoolKey, bucket: i64) -> SyncResult<f64>;

    /// USD price of a token, `None` when no feed knows the token
    async fn token_usd_price(&self, chain_id: &ChainId, token: &Address)
        -> SyncResult<Option<f64>>;

    /// Live liquidity of a position read straight from the pool contract
    async fn position_liquidity(&self, chain_id: &ChainId, position: &PositionId)
        -> SyncResult<f64>;

    /// Reverse name lookup for an address
    async fn resolve_name(&self, address: &Address) -> SyncResult<Option<String>>;
}
