//! Ambient record sync engine
//!
//! Keeps positions, limit orders and transaction history of the active pool
//! and account fresh:
//! - paged reads from the graph cache indexer (`fetcher`)
//! - enrichment with prices and token amounts (`decorator`, `cache`)
//! - merge and dedup into scoped collections (`store`)
//! - reconciliation of just-submitted transactions (`session`, `reconciler`)
//! - idle-aware polling, backfill and candles (`scheduler`, `backfill`, `candles`)

pub mod backfill;
pub mod cache;
pub mod candles;
pub mod config;
pub mod decorator;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod reconciler;
pub mod scheduler;
pub mod sdk;
pub mod session;
pub mod store;

pub use backfill::{gather_until, Backfill, Gathered};
pub use cache::{time_bucket, CachedData};
pub use candles::{
    cap_candle_count, candle_start_time, decorate_candles, fetch_candle_series,
    try_fetch_candle_series, CandleRequest, CandleSeries,
};
pub use config::{SyncConfig, INDEXER_URL_ENV};
pub use decorator::{decorate_batch, dedupe_limit_orders, BatchOutcome, Decorator, PoolPricing};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use fetcher::{
    fetch_page, try_fetch_page, Endpoint, IndexerClient, PageRequest, RawPage, RecordSource,
};
pub use logging::init_logging;
pub use reconciler::{reconcile, ReconcileInputs, ReconciledView};
pub use scheduler::{ActivityMonitor, Cadence, PollSchedule};
pub use sdk::ChainSdk;
pub use session::{SessionLedger, SessionPersistence, UpdateKey};
pub use store::{
    ApplyOutcome, Batch, Collection, GraphState, GraphStore, LimitOrderSlot, LiquidityState,
    MergePolicy, PositionSlot, TransactionSlot,
};
