//! Configuration loading from TOML files and the environment

use ambient_sync::{SyncConfig, SyncError, INDEXER_URL_ENV};
use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_from_file_reads_sections() -> Result<()> {
    let file = write_config(
        r#"
        [polling]
        pool_active_secs = 5
        pool_idle_secs = 30

        [pages]
        pool_transactions = 250
        limit_backfill_target = 75

        [store]
        transaction_window = 250

        [session]
        persist_dir = "/var/lib/ambient/session"
        "#,
    )?;

    let config = SyncConfig::from_file(file.path())?;
    assert_eq!(config.polling.pool_active_secs, 5);
    assert_eq!(config.polling.pool_idle_secs, 30);
    assert_eq!(config.pages.pool_transactions, 250);
    assert_eq!(config.pages.limit_backfill_target, 75);
    assert_eq!(config.store.transaction_window, 250);
    assert_eq!(
        config.session.persist_dir.as_deref(),
        Some(std::path::Path::new("/var/lib/ambient/session"))
    );
    // Untouched sections keep their defaults
    assert_eq!(config.reconciler.unix_time_offset_secs, 10);
    assert_eq!(config.backfill.max_empty_scans, 2);

    Ok(())
}

#[test]
fn test_from_file_rejects_idle_faster_than_active() -> Result<()> {
    let file = write_config(
        r#"
        [polling]
        account_active_secs = 60
        account_idle_secs = 15
        "#,
    )?;

    match SyncConfig::from_file(file.path()) {
        Err(SyncError::InvalidConfig(msg)) => assert!(msg.contains("account")),
        other => panic!("expected invalid config, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_from_file_rejects_oversized_page() -> Result<()> {
    let file = write_config(
        r#"
        [indexer]
        max_page_size = 500

        [pages]
        backfill_page = 1000
        "#,
    )?;

    let err = SyncConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("backfill_page"));
    Ok(())
}

#[test]
fn test_from_file_rejects_malformed_toml() -> Result<()> {
    let file = write_config("[polling\npool_active_secs = ")?;
    assert!(matches!(
        SyncConfig::from_file(file.path()),
        Err(SyncError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    assert!(matches!(
        SyncConfig::from_file("/nonexistent/ambient-sync.toml"),
        Err(SyncError::Io(_))
    ));
}

#[test]
fn test_invalid_url_rejected() {
    let mut config = SyncConfig::default();
    config.indexer.url = "not a url".to_string();
    assert!(config.validate_all().is_err());
}

#[test]
fn test_leaderboard_top_bounded_by_page() {
    let mut config = SyncConfig::default();
    config.pages.pool_leaderboard = 5;
    config.pages.leaderboard_top = 6;
    assert!(config.validate_all().is_err());
}

#[test]
fn test_save_then_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sync.toml");

    let mut config = SyncConfig::default();
    config.polling.tick_millis = 250;
    config.decoration.max_concurrency = Some(8);
    config.logging.json = true;
    config.save(&path)?;

    let loaded = SyncConfig::from_file(&path)?;
    assert_eq!(loaded.polling.tick_millis, 250);
    assert_eq!(loaded.decoration.max_concurrency, Some(8));
    assert!(loaded.logging.json);

    Ok(())
}

#[test]
fn test_env_overrides_indexer_url() {
    std::env::set_var(INDEXER_URL_ENV, " http://localhost:9000/ ");
    let mut config = SyncConfig::default();
    config.apply_env_overrides();
    std::env::remove_var(INDEXER_URL_ENV);

    assert_eq!(config.indexer.url, "http://localhost:9000");
    assert!(config.validate_all().is_ok());
}
