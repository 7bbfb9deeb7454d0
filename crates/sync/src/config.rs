//! Configuration for the sync engine

use crate::error::{SyncError, SyncResult};
use ambient_types::constants::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Environment variable overriding `indexer.url`
pub const INDEXER_URL_ENV: &str = "AMBIENT_GRAPHCACHE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SyncConfig {
    #[validate]
    pub indexer: IndexerConfig,
    #[validate]
    pub polling: PollingConfig,
    #[validate]
    pub pages: PageConfig,
    #[validate]
    pub store: StoreConfig,
    #[validate]
    pub reconciler: ReconcilerConfig,
    #[validate]
    pub backfill: BackfillConfig,
    #[validate]
    pub decoration: DecorationConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IndexerConfig {
    #[validate(url)]
    pub url: String,
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
    /// Largest `n` the server honours
    #[validate(range(min = 1, max = 5000))]
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PollingConfig {
    #[validate(range(min = 1, max = 3600))]
    pub pool_active_secs: u64,
    #[validate(range(min = 1, max = 3600))]
    pub pool_idle_secs: u64,
    #[validate(range(min = 1, max = 3600))]
    pub account_active_secs: u64,
    #[validate(range(min = 1, max = 3600))]
    pub account_idle_secs: u64,
    /// Seconds without activity before the user counts as idle
    #[validate(range(min = 1, max = 86400))]
    pub idle_after_secs: u64,
    /// Granularity of the scheduler loop
    #[validate(range(min = 10, max = 60000))]
    pub tick_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PageConfig {
    #[validate(range(min = 1))]
    pub pool_positions: u32,
    #[validate(range(min = 1))]
    pub pool_leaderboard: u32,
    #[validate(range(min = 1, max = 1000))]
    pub leaderboard_top: usize,
    #[validate(range(min = 1))]
    pub pool_transactions: u32,
    #[validate(range(min = 1))]
    pub pool_limit_orders: u32,
    #[validate(range(min = 1))]
    pub user_pool_transactions: u32,
    #[validate(range(min = 1))]
    pub user_transactions: u32,
    #[validate(range(min = 1))]
    pub backfill_page: u32,
    #[validate(range(min = 1, max = 5000))]
    pub limit_backfill_target: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StoreConfig {
    /// Sliding window size of the pool transaction collection
    #[validate(range(min = 1, max = 100000))]
    pub transaction_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Clock skew tolerance between submission and indexed time
    #[validate(range(min = 0, max = 3600))]
    pub unix_time_offset_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BackfillConfig {
    /// Backward scans without a new record before "load more" gives up
    #[validate(range(min = 1, max = 100))]
    pub max_empty_scans: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DecorationConfig {
    /// In-flight decorations per batch; unset means unbounded
    #[validate(range(min = 1, max = 10000))]
    pub max_concurrency: Option<usize>,
    pub skip_name_lookup: bool,
    /// Width of the time bucket spot and token prices are memoised under
    #[validate(range(min = 1, max = 86400))]
    pub price_bucket_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory the session ledger persists into; memory only when unset
    pub persist_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INDEXER_URL.to_string(),
            request_timeout_secs: 30,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            pool_active_secs: POOL_ACTIVE_POLL_SECS,
            pool_idle_secs: POOL_IDLE_POLL_SECS,
            account_active_secs: ACCOUNT_ACTIVE_POLL_SECS,
            account_idle_secs: ACCOUNT_IDLE_POLL_SECS,
            idle_after_secs: IDLE_AFTER_SECS,
            tick_millis: 1000,
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            pool_positions: POOL_POSITIONS_PAGE,
            pool_leaderboard: POOL_LEADERBOARD_PAGE,
            leaderboard_top: LEADERBOARD_TOP,
            pool_transactions: POOL_TRANSACTIONS_PAGE,
            pool_limit_orders: POOL_LIMIT_ORDERS_PAGE,
            user_pool_transactions: USER_POOL_TRANSACTIONS_PAGE,
            user_transactions: USER_TRANSACTIONS_PAGE,
            backfill_page: BACKFILL_PAGE,
            limit_backfill_target: LIMIT_BACKFILL_TARGET,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            transaction_window: POOL_TRANSACTIONS_PAGE as usize,
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            unix_time_offset_secs: UNIX_TIME_OFFSET_SECS,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self { max_empty_scans: 2 }
    }
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            skip_name_lookup: true,
            price_bucket_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file, apply env overrides and validate
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: SyncConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate_all()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(INDEXER_URL_ENV) {
            if !url.trim().is_empty() {
                self.indexer.url = url.trim().trim_end_matches('/').to_string();
            }
        }
    }

    /// Field ranges plus the cross-field rules the derive cannot express
    pub fn validate_all(&self) -> SyncResult<()> {
        self.validate()?;

        let polling = &self.polling;
        if polling.pool_idle_secs < polling.pool_active_secs {
            return Err(SyncError::InvalidConfig(
                "pool idle cadence must not be faster than the active cadence".to_string(),
            ));
        }
        if polling.account_idle_secs < polling.account_active_secs {
            return Err(SyncError::InvalidConfig(
                "account idle cadence must not be faster than the active cadence".to_string(),
            ));
        }

        let cap = self.indexer.max_page_size;
        let pages = [
            ("pool_positions", self.pages.pool_positions),
            ("pool_leaderboard", self.pages.pool_leaderboard),
            ("pool_transactions", self.pages.pool_transactions),
            ("pool_limit_orders", self.pages.pool_limit_orders),
            ("user_pool_transactions", self.pages.user_pool_transactions),
            ("user_transactions", self.pages.user_transactions),
            ("backfill_page", self.pages.backfill_page),
        ];
        for (name, size) in pages {
            if size > cap {
                return Err(SyncError::InvalidConfig(format!(
                    "pages.{name} = {size} exceeds indexer.max_page_size = {cap}"
                )));
            }
        }

        if self.pages.leaderboard_top > self.pages.pool_leaderboard as usize {
            return Err(SyncError::InvalidConfig(
                "leaderboard_top cannot exceed the leaderboard page".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.indexer.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate_all().is_ok());
        assert_eq!(config.indexer.url, "https://ambindexer.net");
        assert_eq!(config.reconciler.unix_time_offset_secs, 10);
        assert_eq!(config.store.transaction_window, 100);
    }

    #[test]
    fn test_idle_faster_than_active_rejected() {
        let mut config = SyncConfig::default();
        config.polling.pool_idle_secs = 5;
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_page_above_server_cap_rejected() {
        let mut config = SyncConfig::default();
        config.indexer.max_page_size = 100;
        config.pages.pool_positions = 100;
        config.pages.user_transactions = 200;
        let err = config.validate_all().unwrap_err();
        assert!(err.to_string().contains("user_transactions"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = SyncConfig::default();
        config.store.transaction_window = 0;
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [indexer]
            url = "http://localhost:8080"

            [store]
            transaction_window = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.indexer.url, "http://localhost:8080");
        assert_eq!(config.indexer.max_page_size, 5000);
        assert_eq!(config.store.transaction_window, 250);
        assert_eq!(config.polling.pool_active_secs, 10);
        assert!(config.validate_all().is_ok());
    }
}
