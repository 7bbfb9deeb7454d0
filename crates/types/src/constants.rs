/// Constants shared by the indexer client, the store and the reconciler

// ============================================================================
// Indexer Constants
// ============================================================================

/// Default graph cache endpoint
pub const DEFAULT_INDEXER_URL: &str = "https://ambindexer.net";

/// Largest page the indexer will return for any single request
pub const MAX_PAGE_SIZE: u32 = 5000;

// ============================================================================
// Page Sizes
// ============================================================================

/// Pool positions fetched per refresh
pub const POOL_POSITIONS_PAGE: u32 = 200;

/// Candidates requested from the APY leaderboard endpoint
pub const POOL_LEADERBOARD_PAGE: u32 = 50;

/// Leaderboard entries kept after filtering
pub const LEADERBOARD_TOP: usize = 10;

/// Pool transactions fetched per refresh (also the sliding window size)
pub const POOL_TRANSACTIONS_PAGE: u32 = 100;

/// Pool limit orders fetched per refresh
pub const POOL_LIMIT_ORDERS_PAGE: u32 = 100;

/// User-in-pool transactions fetched per refresh
pub const USER_POOL_TRANSACTIONS_PAGE: u32 = 100;

/// User transactions fetched per refresh
pub const USER_TRANSACTIONS_PAGE: u32 = 200;

/// Records fetched per "load more" page
pub const BACKFILL_PAGE: u32 = 50;

/// Unique limit orders a single limit order backfill tries to gather
pub const LIMIT_BACKFILL_TARGET: usize = 30;

// ============================================================================
// Timing Constants
// ============================================================================

/// Tolerance in seconds between a local submission time and the indexed time
pub const UNIX_TIME_OFFSET_SECS: i64 = 10;

/// Pool scoped poll interval while the user is active
pub const POOL_ACTIVE_POLL_SECS: u64 = 10;

/// Pool scoped poll interval while the user is idle
pub const POOL_IDLE_POLL_SECS: u64 = 60;

/// Account scoped poll interval while the user is active
pub const ACCOUNT_ACTIVE_POLL_SECS: u64 = 15;

/// Account scoped poll interval while the user is idle
pub const ACCOUNT_IDLE_POLL_SECS: u64 = 60;

/// Seconds without activity after which the user counts as idle
pub const IDLE_AFTER_SECS: u64 = 120;

/// Candles at or before this time predate the pool launch and are dropped
pub const PRE_BURN_TIME: i64 = 1_686_176_723;

/// Upper bound on candles requested in one series
pub const MAX_CANDLE_COUNT: u32 = 5000;
