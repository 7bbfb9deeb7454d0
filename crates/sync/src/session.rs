//! Ledger of transactions the current session submitted, and its on-disk form

use crate::error::SyncResult;
use ambient_types::{
    PositionId, Receipt, ReceiptStatus, SessionTransaction, SessionUpdate, TxIdentity,
    UpdateStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Identifies one session update
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpdateKey {
    pub tx_hash: TxIdentity,
    pub position_id: PositionId,
}

impl From<&SessionUpdate> for UpdateKey {
    fn from(update: &SessionUpdate) -> Self {
        Self {
            tx_hash: update.tx_hash.clone(),
            position_id: update.position_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionLedger {
    /// Newest first, one entry per hash
    transactions: Vec<SessionTransaction>,
    updates: Vec<SessionUpdate>,
    receipts: HashMap<TxIdentity, Receipt>,
    terminal: HashMap<UpdateKey, UpdateStatus>,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a submitted transaction; repeats are ignored
    pub fn record_submission(&mut self, tx: SessionTransaction) -> bool {
        if self.transactions.iter().any(|t| t.tx_hash == tx.tx_hash) {
            return false;
        }
        debug!(tx = %tx.tx_hash, "Tracking session transaction");
        self.transactions.insert(0, tx);
        true
    }

    /// Track a position or limit order change; repeats are ignored
    pub fn record_position_update(&mut self, mut update: SessionUpdate) -> bool {
        let key = UpdateKey::from(&update);
        if self.updates.iter().any(|u| UpdateKey::from(u) == key) {
            return false;
        }
        if let Some(receipt) = self.receipts.get(&update.tx_hash) {
            update.unix_time_receipt.get_or_insert(receipt.unix_time);
        }
        self.updates.push(update);
        true
    }

    /// Store a receipt and stamp the receipt time on the updates it belongs to
    pub fn record_receipt(&mut self, receipt: Receipt) {
        for update in self.updates.iter_mut().filter(|u| u.tx_hash == receipt.tx_hash) {
            update.unix_time_receipt.get_or_insert(receipt.unix_time);
        }
        if receipt.status == ReceiptStatus::Failed {
            warn!(tx = %receipt.tx_hash, "Session transaction failed");
        }
        self.receipts.insert(receipt.tx_hash.clone(), receipt);
    }

    pub fn transactions(&self) -> &[SessionTransaction] {
        &self.transactions
    }

    pub fn updates(&self) -> &[SessionUpdate] {
        &self.updates
    }

    /// Hashes whose receipt reported a revert
    pub fn failed_hashes(&self) -> HashSet<TxIdentity> {
        self.receipts
            .values()
            .filter(|r| r.status == ReceiptStatus::Failed)
            .map(|r| r.tx_hash.clone())
            .collect()
    }

    pub fn terminal_statuses(&self) -> &HashMap<UpdateKey, UpdateStatus> {
        &self.terminal
    }

    pub fn status_of(&self, key: &UpdateKey) -> UpdateStatus {
        self.terminal
            .get(key)
            .copied()
            .unwrap_or(UpdateStatus::Pending)
    }

    /// Record terminal transitions; an update that already settled keeps its status
    pub fn commit_transitions(&mut self, transitions: &[(UpdateKey, UpdateStatus)]) -> usize {
        let mut committed = 0;
        for (key, status) in transitions {
            if !status.is_terminal() || self.terminal.contains_key(key) {
                continue;
            }
            debug!(tx = %key.tx_hash, status = ?status, "Session update settled");
            self.terminal.insert(key.clone(), *status);
            committed += 1;
        }
        committed
    }

    /// Updates still waiting on the indexer
    pub fn unsettled_updates(&self) -> impl Iterator<Item = &SessionUpdate> {
        self.updates
            .iter()
            .filter(|u| !self.terminal.contains_key(&UpdateKey::from(*u)))
    }

    /// Forget everything, used when the active account changes
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Key holding newline separated pending transaction hashes
pub const PENDING_TX_KEY: &str = "pendingTxHashes";

/// Key holding one unsettled update per line:
/// `tx_hash,position_id,unix_time_added,full|partial`
pub const UNVERIFIED_POSITIONS_KEY: &str = "unverifiedPositionIds";

/// Keeps in-flight submissions across restarts
#[derive(Debug, Clone)]
pub struct SessionPersistence {
    dir: PathBuf,
}

impl SessionPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    pub fn save(&self, ledger: &SessionLedger) -> SyncResult<()> {
        fs::create_dir_all(&self.dir)?;

        let hashes: Vec<String> = ledger
            .transactions()
            .iter()
            .map(|t| t.tx_hash.to_string())
            .collect();
        write_atomic(&self.path(PENDING_TX_KEY), &hashes.join("\n"))?;

        let updates: Vec<String> = ledger
            .unsettled_updates()
            .map(|u| {
                format!(
                    "{},{},{},{}",
                    u.tx_hash,
                    u.position_id,
                    u.unix_time_added,
                    if u.is_full_removal { "full" } else { "partial" }
                )
            })
            .collect();
        write_atomic(&self.path(UNVERIFIED_POSITIONS_KEY), &updates.join("\n"))?;
        Ok(())
    }

    /// Rebuild a ledger from disk; missing files load as empty and bad lines are skipped
    pub fn load(&self, now: i64) -> SyncResult<SessionLedger> {
        let mut ledger = SessionLedger::new();

        // Stored newest first, so insert oldest first to keep the order
        let hashes = read_lines(&self.path(PENDING_TX_KEY))?;
        for hash in hashes.iter().rev() {
            ledger.record_submission(SessionTransaction {
                tx_hash: TxIdentity::from_hash(hash),
                pool: None,
                unix_time_added: now,
            });
        }

        for line in read_lines(&self.path(UNVERIFIED_POSITIONS_KEY))? {
            match parse_update(&line) {
                Some(update) => {
                    ledger.record_position_update(update);
                }
                None => warn!(line = %line, "Skipping unreadable session update"),
            }
        }

        Ok(ledger)
    }
}

fn parse_update(line: &str) -> Option<SessionUpdate> {
    let mut fields = line.split(',');
    let tx_hash = fields.next()?.trim();
    let position_id: PositionId = fields.next()?.trim().parse().ok()?;
    let added: i64 = fields.next()?.trim().parse().ok()?;
    let full = match fields.next()?.trim() {
        "full" => true,
        "partial" => false,
        _ => return None,
    };
    if tx_hash.is_empty() || fields.next().is_some() {
        return None;
    }

    let update = SessionUpdate::new(position_id, TxIdentity::from_hash(tx_hash), added);
    Some(if full { update.full_removal() } else { update })
}

fn read_lines(path: &Path) -> SyncResult<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, content: &str) -> SyncResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambient_types::{Address, ChainId, PoolKey, PositionKind};

    fn position(bid: i32) -> PositionId {
        let pool = PoolKey::new(
            ChainId::parse("0x1").unwrap(),
            Address::parse("0x01").unwrap(),
            Address::parse("0x02").unwrap(),
            420,
        );
        PositionId::new(Address::parse("0xfeed").unwrap(), &pool, bid, bid + 10, PositionKind::Concentrated)
    }

    fn submission(hash: &str) -> SessionTransaction {
        SessionTransaction {
            tx_hash: TxIdentity::from_hash(hash),
            pool: None,
            unix_time_added: 100,
        }
    }

    #[test]
    fn test_submissions_prepend_without_duplicates() {
        let mut ledger = SessionLedger::new();
        assert!(ledger.record_submission(submission("0x01")));
        assert!(ledger.record_submission(submission("0x02")));
        assert!(!ledger.record_submission(submission("0x01")));

        let hashes: Vec<&str> = ledger.transactions().iter().map(|t| t.tx_hash.as_str()).collect();
        assert_eq!(hashes, ["0x02", "0x01"]);
    }

    #[test]
    fn test_receipt_stamps_updates() {
        let mut ledger = SessionLedger::new();
        ledger.record_position_update(SessionUpdate::new(position(0), TxIdentity::from_hash("0xaa"), 100));
        ledger.record_receipt(Receipt {
            tx_hash: TxIdentity::from_hash("0xaa"),
            status: ReceiptStatus::Failed,
            unix_time: 130,
        });

        assert_eq!(ledger.updates()[0].unix_time_receipt, Some(130));
        assert!(ledger.failed_hashes().contains(&TxIdentity::from_hash("0xaa")));

        // Receipt already known when the update shows up
        ledger.record_position_update(SessionUpdate::new(position(5), TxIdentity::from_hash("0xaa"), 101));
        assert_eq!(ledger.updates()[1].unix_time_receipt, Some(130));
    }

    #[test]
    fn test_terminal_status_never_reverts() {
        let mut ledger = SessionLedger::new();
        let update = SessionUpdate::new(position(0), TxIdentity::from_hash("0xaa"), 100);
        let key = UpdateKey::from(&update);
        ledger.record_position_update(update);

        assert_eq!(ledger.commit_transitions(&[(key.clone(), UpdateStatus::Pending)]), 0);
        assert_eq!(ledger.commit_transitions(&[(key.clone(), UpdateStatus::Indexed)]), 1);
        assert_eq!(ledger.commit_transitions(&[(key.clone(), UpdateStatus::Failed)]), 0);
        assert_eq!(ledger.status_of(&key), UpdateStatus::Indexed);
        assert_eq!(ledger.unsettled_updates().count(), 0);
    }

    #[test]
    fn test_parse_update_rejects_garbage() {
        assert!(parse_update("0xaa,not-an-id,5,full").is_none());
        assert!(parse_update("").is_none());
        let line = format!("0xaa,{},5,partial", position(0));
        let update = parse_update(&line).unwrap();
        assert!(!update.is_full_removal);
        assert_eq!(update.unix_time_added, 5);
    }
}
