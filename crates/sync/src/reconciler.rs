//! Reconciliation of session updates against indexed user records
//!
//! `reconcile` is a pure function of its inputs. Every observer computing it
//! over the same snapshot and ledger sees the same working set.

use crate::session::UpdateKey;
use ambient_types::{
    LimitOrder, PoolKey, Position, PositionId, Record, SessionTransaction, SessionUpdate,
    Transaction, TxIdentity, UpdateStatus,
};
use std::collections::{HashMap, HashSet};

/// Everything `reconcile` reads
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInputs<'a> {
    pub transactions: &'a [SessionTransaction],
    pub updates: &'a [SessionUpdate],
    pub failed: &'a HashSet<TxIdentity>,
    /// Statuses settled by earlier passes
    pub terminal: &'a HashMap<UpdateKey, UpdateStatus>,
    pub user_positions: &'a [Position],
    pub user_limit_orders: &'a [LimitOrder],
    /// User transactions across all pools and in the active pool
    pub user_transactions: &'a [Transaction],
    pub user_pool_transactions: &'a [Transaction],
    pub unix_time_offset: i64,
}

/// Unindexed, non-failed session state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledView {
    pub transactions: Vec<SessionTransaction>,
    pub position_updates: Vec<SessionUpdate>,
    pub limit_order_updates: Vec<SessionUpdate>,
    /// Updates that reached a terminal state in this pass
    pub transitions: Vec<(UpdateKey, UpdateStatus)>,
}

impl ReconciledView {
    pub fn transaction_hashes(&self) -> Vec<TxIdentity> {
        self.transactions.iter().map(|t| t.tx_hash.clone()).collect()
    }

    /// Session transactions touching `pool`, or of unknown pool
    pub fn transactions_for_pool(&self, pool: &PoolKey) -> Vec<&SessionTransaction> {
        self.transactions
            .iter()
            .filter(|t| t.pool.as_ref().map(|p| p.same_pair(pool)).unwrap_or(true))
            .collect()
    }

    pub fn position_updates_for_pool(&self, pool: &PoolKey) -> Vec<&SessionUpdate> {
        filter_updates(&self.position_updates, pool)
    }

    pub fn limit_order_updates_for_pool(&self, pool: &PoolKey) -> Vec<&SessionUpdate> {
        filter_updates(&self.limit_order_updates, pool)
    }
}

fn filter_updates<'a>(updates: &'a [SessionUpdate], pool: &PoolKey) -> Vec<&'a SessionUpdate> {
    updates
        .iter()
        .filter(|u| {
            u.position_id.base == pool.base
                && u.position_id.quote == pool.quote
                && u.position_id.pool_index == pool.pool_index
        })
        .collect()
}

/// Latest indexed time per position identity across the user collections
fn indexed_times(inputs: &ReconcileInputs<'_>) -> HashMap<PositionId, i64> {
    let mut times: HashMap<PositionId, i64> = HashMap::new();
    let records = inputs
        .user_positions
        .iter()
        .map(|p| (p.identity(), p.record_time()))
        .chain(
            inputs
                .user_limit_orders
                .iter()
                .map(|o| (o.identity(), o.record_time())),
        );
    for (id, time) in records {
        let entry = times.entry(id).or_insert(time);
        *entry = (*entry).max(time);
    }
    times
}

/// A different update fully removed the same position after this one was added
fn is_superseded(update: &SessionUpdate, index: usize, updates: &[SessionUpdate]) -> bool {
    updates.iter().enumerate().any(|(other_index, other)| {
        other_index != index
            && other.is_full_removal
            && other.position_id == update.position_id
            && other
                .unix_time_receipt
                .map(|receipt| receipt > update.unix_time_added)
                .unwrap_or(false)
    })
}

/// Status of one update given the current inputs, ignoring earlier passes
pub fn evaluate_update(
    update: &SessionUpdate,
    index: usize,
    inputs: &ReconcileInputs<'_>,
    indexed: &HashMap<PositionId, i64>,
) -> UpdateStatus {
    if inputs.failed.contains(&update.tx_hash) {
        return UpdateStatus::Failed;
    }
    if is_superseded(update, index, inputs.updates) {
        return UpdateStatus::Superseded;
    }
    match indexed.get(&update.position_id) {
        Some(&time) if time >= update.unix_time_added + inputs.unix_time_offset => {
            UpdateStatus::Indexed
        }
        _ => UpdateStatus::Pending,
    }
}

/// Compute the working set of session state the indexer has not yet confirmed
pub fn reconcile(inputs: &ReconcileInputs<'_>) -> ReconciledView {
    let indexed = indexed_times(inputs);
    let mut view = ReconciledView::default();

    for (index, update) in inputs.updates.iter().enumerate() {
        let key = UpdateKey::from(update);
        let status = match inputs.terminal.get(&key) {
            Some(settled) => *settled,
            None => {
                let status = evaluate_update(update, index, inputs, &indexed);
                if status.is_terminal() {
                    view.transitions.push((key, status));
                }
                status
            }
        };

        if status == UpdateStatus::Pending {
            if update.is_limit {
                view.limit_order_updates.push(update.clone());
            } else {
                view.position_updates.push(update.clone());
            }
        }
    }

    let indexed_hashes: HashSet<TxIdentity> = inputs
        .user_transactions
        .iter()
        .chain(inputs.user_pool_transactions.iter())
        .map(Record::identity)
        .collect();
    view.transactions = inputs
        .transactions
        .iter()
        .filter(|t| !indexed_hashes.contains(&t.tx_hash) && !inputs.failed.contains(&t.tx_hash))
        .cloned()
        .collect();

    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambient_types::{Address, ChainId, PositionKind};

    const OFFSET: i64 = 10;

    fn pool() -> PoolKey {
        PoolKey::new(
            ChainId::parse("0x1").unwrap(),
            Address::parse("0x01").unwrap(),
            Address::parse("0x02").unwrap(),
            420,
        )
    }

    fn id() -> PositionId {
        PositionId::new(Address::parse("0xfeed").unwrap(), &pool(), -10, 10, PositionKind::Concentrated)
    }

    fn indexed_position(updated: i64) -> Position {
        let id = id();
        Position {
            pool: pool(),
            user: id.user.clone(),
            kind: id.kind,
            bid_tick: id.bid_tick,
            ask_tick: id.ask_tick,
            time_first_mint: 0,
            latest_update_time: updated,
            first_mint_tx: String::new(),
            base_decimals: 18,
            quote_decimals: 6,
            position_liq: 1.0,
            position_liq_base: 0.0,
            position_liq_quote: 0.0,
            low_price: 0.0,
            high_price: 0.0,
            low_price_inverted: 0.0,
            high_price_inverted: 0.0,
            total_value_usd: 0.0,
            apy: 0.0,
            is_position_in_range: true,
            liq_refresh_time: 0,
            ens_name: None,
            id,
        }
    }

    struct Fixture {
        updates: Vec<SessionUpdate>,
        failed: HashSet<TxIdentity>,
        terminal: HashMap<UpdateKey, UpdateStatus>,
        positions: Vec<Position>,
        transactions: Vec<SessionTransaction>,
        user_txs: Vec<Transaction>,
    }

    impl Fixture {
        fn new(updates: Vec<SessionUpdate>) -> Self {
            Self {
                updates,
                failed: HashSet::new(),
                terminal: HashMap::new(),
                positions: Vec::new(),
                transactions: Vec::new(),
                user_txs: Vec::new(),
            }
        }

        fn run(&self) -> ReconciledView {
            reconcile(&ReconcileInputs {
                transactions: &self.transactions,
                updates: &self.updates,
                failed: &self.failed,
                terminal: &self.terminal,
                user_positions: &self.positions,
                user_limit_orders: &[],
                user_transactions: &self.user_txs,
                user_pool_transactions: &[],
                unix_time_offset: OFFSET,
            })
        }
    }

    fn update(hash: &str, added: i64) -> SessionUpdate {
        SessionUpdate::new(id(), TxIdentity::from_hash(hash), added)
    }

    #[test]
    fn test_retired_at_exact_offset() {
        let t = 1_000;
        let mut fixture = Fixture::new(vec![update("0xaa", t)]);
        fixture.positions = vec![indexed_position(t + OFFSET)];

        let view = fixture.run();
        assert!(view.position_updates.is_empty());
        assert_eq!(view.transitions.len(), 1);
        assert_eq!(view.transitions[0].1, UpdateStatus::Indexed);
    }

    #[test]
    fn test_not_retired_one_second_early() {
        let t = 1_000;
        let mut fixture = Fixture::new(vec![update("0xaa", t)]);
        fixture.positions = vec![indexed_position(t + OFFSET - 1)];

        let view = fixture.run();
        assert_eq!(view.position_updates.len(), 1);
        assert!(view.transitions.is_empty());
    }

    #[test]
    fn test_failed_hash_retires_regardless_of_time() {
        let mut fixture = Fixture::new(vec![update("0xaa", 1_000)]);
        fixture.failed.insert(TxIdentity::from_hash("0xaa"));

        let view = fixture.run();
        assert!(view.position_updates.is_empty());
        assert_eq!(view.transitions[0].1, UpdateStatus::Failed);
    }

    #[test]
    fn test_full_removal_supersedes_earlier_update() {
        let earlier = update("0xaa", 1_000);
        let mut removal = update("0xbb", 1_005).full_removal();
        removal.unix_time_receipt = Some(1_010);

        let view = Fixture::new(vec![earlier, removal]).run();
        // The removal itself is still pending, the earlier update is void
        assert_eq!(view.position_updates.len(), 1);
        assert_eq!(view.position_updates[0].tx_hash.as_str(), "0xbb");
        assert_eq!(view.transitions[0].1, UpdateStatus::Superseded);
    }

    #[test]
    fn test_removal_before_add_does_not_supersede() {
        let mut removal = update("0xbb", 900).full_removal();
        removal.unix_time_receipt = Some(950);
        let later = update("0xaa", 1_000);

        let view = Fixture::new(vec![removal, later]).run();
        assert_eq!(view.position_updates.len(), 2);
    }

    #[test]
    fn test_settled_update_stays_settled() {
        let pending = update("0xaa", 1_000);
        let mut fixture = Fixture::new(vec![pending.clone()]);
        fixture
            .terminal
            .insert(UpdateKey::from(&pending), UpdateStatus::Indexed);

        let view = fixture.run();
        assert!(view.position_updates.is_empty());
        assert!(view.transitions.is_empty());
    }

    #[test]
    fn test_limit_updates_split_out() {
        let limit_id =
            PositionId::new(Address::parse("0xfeed").unwrap(), &pool(), 5, 6, PositionKind::Knockout);
        let limit = SessionUpdate::new(limit_id, TxIdentity::from_hash("0xcc"), 1_000);
        let view = Fixture::new(vec![limit, update("0xaa", 1_000)]).run();
        assert_eq!(view.limit_order_updates.len(), 1);
        assert_eq!(view.position_updates.len(), 1);
        assert_eq!(view.limit_order_updates_for_pool(&pool()).len(), 1);
    }

    #[test]
    fn test_transactions_retire_by_hash() {
        let mut fixture = Fixture::new(Vec::new());
        fixture.transactions = ["0x01", "0x02", "0x03"]
            .iter()
            .map(|h| SessionTransaction {
                tx_hash: TxIdentity::from_hash(h),
                pool: Some(pool()),
                unix_time_added: 1,
            })
            .collect();
        fixture.failed.insert(TxIdentity::from_hash("0x03"));
        fixture.user_txs = vec![Transaction {
            identity: TxIdentity::from_hash("0x01"),
            tx_hash: "0x01".into(),
            pool: pool(),
            user: Address::parse("0xfeed").unwrap(),
            tx_time: 0,
            entity_type: "swap".into(),
            change_type: "swap".into(),
            position_type: String::new(),
            bid_tick: 0,
            ask_tick: 0,
            is_buy: true,
            base_flow: 0.0,
            quote_flow: 0.0,
            value_usd: 0.0,
            ens_name: None,
        }];

        let view = fixture.run();
        assert_eq!(view.transaction_hashes(), vec![TxIdentity::from_hash("0x02")]);
        assert_eq!(view.transactions_for_pool(&pool()).len(), 1);
    }

    #[test]
    fn test_recompute_is_stable() {
        let mut fixture = Fixture::new(vec![update("0xaa", 1_000), update("0xbb", 2_000)]);
        fixture.positions = vec![indexed_position(1_500)];
        assert_eq!(fixture.run(), fixture.run());
    }
}
