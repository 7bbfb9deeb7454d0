//! Merge/dedup store holding every record collection
//!
//! State is replaced wholesale on each write: a writer clones the current
//! snapshot, applies a pure merge, and swaps the result in under the write
//! lock. Readers hold an `Arc` to the last published snapshot and never wait
//! on a fetch.

use ambient_types::{
    LimitOrder, LiquidityCurve, PoolKey, Position, Record, ScopeKey, Transaction, UserKey,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

// ============================================================================
// Collections and Merge Functions
// ============================================================================

/// Records of one kind for one scope
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    /// A fetch for this scope has completed at least once
    pub data_received: bool,
    pub records: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            data_received: false,
            records: Vec::new(),
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Still waiting on the first successful fetch
    pub fn is_loading(&self) -> bool {
        !self.data_received && self.records.is_empty()
    }

    /// Cursor for fetching strictly older records
    pub fn oldest_time(&self) -> Option<i64> {
        self.records.iter().map(Record::record_time).min()
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.records.iter().any(|r| &r.identity() == id)
    }

    /// Records with non-zero liquidity
    pub fn active(&self) -> impl Iterator<Item = &T> {
        self.records.iter().filter(|r| r.is_active())
    }
}

/// Append the records of `incoming` whose identity is not already present
pub fn merge_unique<T: Record>(existing: &[T], incoming: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<T::Id> = existing.iter().map(Record::identity).collect();
    let mut merged = existing.to_vec();
    merged.extend(incoming.into_iter().filter(|r| seen.insert(r.identity())));
    merged
}

/// Merge, then evict the oldest existing records so the result fits `capacity`
///
/// Eviction orders by record time with identity as tie break, so the outcome
/// depends only on the two inputs. New unique records are never evicted.
pub fn merge_evicting<T: Record>(existing: &[T], incoming: Vec<T>, capacity: usize) -> Vec<T> {
    let mut seen: HashSet<T::Id> = existing.iter().map(Record::identity).collect();
    let unique: Vec<T> = incoming
        .into_iter()
        .filter(|r| seen.insert(r.identity()))
        .collect();
    if unique.is_empty() {
        return existing.to_vec();
    }

    let overflow = (existing.len() + unique.len()).saturating_sub(capacity);
    let mut kept = existing.to_vec();
    if overflow > 0 {
        kept.sort_by(|a, b| {
            a.record_time()
                .cmp(&b.record_time())
                .then_with(|| a.identity().cmp(&b.identity()))
        });
        kept.drain(..overflow.min(kept.len()));
    }
    kept.extend(unique);
    kept
}

/// How a fetched batch combines with the current collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The batch becomes the collection
    Replace,
    /// Unique records are appended, nothing is evicted
    Unique,
    /// Unique records are appended and the oldest evicted past `window`
    SlidingWindow { window: usize },
}

impl MergePolicy {
    pub fn merge<T: Record>(&self, existing: &[T], incoming: Vec<T>) -> Vec<T> {
        match self {
            MergePolicy::Replace => merge_unique(&[], incoming),
            MergePolicy::Unique => merge_unique(existing, incoming),
            MergePolicy::SlidingWindow { window } => {
                merge_evicting(existing, incoming, (*window).max(existing.len()))
            }
        }
    }
}

// ============================================================================
// Graph State
// ============================================================================

/// Liquidity curve of the active pool
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LiquidityState {
    #[default]
    Empty,
    /// A fetch for this pool is outstanding
    Pending(PoolKey),
    Ready(LiquidityCurve),
}

/// Every collection the engine maintains
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    pub pool: Option<PoolKey>,
    pub user: Option<UserKey>,

    pub positions_by_pool: Collection<Position>,
    pub leaderboard_by_pool: Collection<Position>,
    pub transactions_by_pool: Collection<Transaction>,
    pub limit_orders_by_pool: Collection<LimitOrder>,

    /// Pool transactions plus every backfilled page
    pub transaction_history: Collection<Transaction>,
    /// Pool limit orders plus every backfilled page
    pub limit_order_history: Collection<LimitOrder>,

    pub positions_by_user: Collection<Position>,
    pub limit_orders_by_user: Collection<LimitOrder>,
    pub transactions_by_user: Collection<Transaction>,

    pub user_positions_by_pool: Collection<Position>,
    pub user_limit_orders_by_pool: Collection<LimitOrder>,
    pub user_transactions_by_pool: Collection<Transaction>,

    pub liquidity: LiquidityState,
}

impl GraphState {
    fn reset_pool_collections(&mut self) {
        self.positions_by_pool = Collection::default();
        self.leaderboard_by_pool = Collection::default();
        self.transactions_by_pool = Collection::default();
        self.limit_orders_by_pool = Collection::default();
        self.transaction_history = Collection::default();
        self.limit_order_history = Collection::default();
    }

    fn reset_user_collections(&mut self) {
        self.positions_by_user = Collection::default();
        self.limit_orders_by_user = Collection::default();
        self.transactions_by_user = Collection::default();
    }

    fn reset_user_pool_collections(&mut self) {
        self.user_positions_by_pool = Collection::default();
        self.user_limit_orders_by_pool = Collection::default();
        self.user_transactions_by_pool = Collection::default();
    }

    /// Scope a batch must carry to be accepted into `slot`
    fn expected_scope(&self, scope: SlotScope) -> Option<ScopeKey> {
        match scope {
            SlotScope::Pool => self.pool.clone().map(ScopeKey::Pool),
            SlotScope::User => self.user.clone().map(ScopeKey::User),
            SlotScope::UserPool => match (&self.user, &self.pool) {
                (Some(user), Some(pool)) => Some(ScopeKey::UserPool {
                    user: user.user.clone(),
                    pool: pool.clone(),
                }),
                _ => None,
            },
        }
    }

    /// Summed liquidity of pool positions and limit orders
    pub fn total_pool_liquidity(&self) -> f64 {
        let positions: f64 = self.positions_by_pool.records.iter().map(|p| p.position_liq).sum();
        let orders: f64 = self
            .limit_orders_by_pool
            .records
            .iter()
            .map(|o| o.position_liq)
            .sum();
        positions + orders
    }
}

// ============================================================================
// Slots
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotScope {
    Pool,
    User,
    UserPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSlot {
    Pool,
    Leaderboard,
    User,
    UserPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOrderSlot {
    Pool,
    History,
    User,
    UserPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSlot {
    Pool,
    History,
    User,
    UserPool,
}

/// Maps a record type's slots onto `GraphState` fields
pub trait Slotted: Record {
    type Slot: Copy + std::fmt::Debug;

    fn scope_of(slot: Self::Slot) -> SlotScope;

    fn collection(state: &mut GraphState, slot: Self::Slot) -> &mut Collection<Self>;
}

impl Slotted for Position {
    type Slot = PositionSlot;

    fn scope_of(slot: Self::Slot) -> SlotScope {
        match slot {
            PositionSlot::Pool | PositionSlot::Leaderboard => SlotScope::Pool,
            PositionSlot::User => SlotScope::User,
            PositionSlot::UserPool => SlotScope::UserPool,
        }
    }

    fn collection(state: &mut GraphState, slot: Self::Slot) -> &mut Collection<Self> {
        match slot {
            PositionSlot::Pool => &mut state.positions_by_pool,
            PositionSlot::Leaderboard => &mut state.leaderboard_by_pool,
            PositionSlot::User => &mut state.positions_by_user,
            PositionSlot::UserPool => &mut state.user_positions_by_pool,
        }
    }
}

impl Slotted for LimitOrder {
    type Slot = LimitOrderSlot;

    fn scope_of(slot: Self::Slot) -> SlotScope {
        match slot {
            LimitOrderSlot::Pool | LimitOrderSlot::History => SlotScope::Pool,
            LimitOrderSlot::User => SlotScope::User,
            LimitOrderSlot::UserPool => SlotScope::UserPool,
        }
    }

    fn collection(state: &mut GraphState, slot: Self::Slot) -> &mut Collection<Self> {
        match slot {
            LimitOrderSlot::Pool => &mut state.limit_orders_by_pool,
            LimitOrderSlot::History => &mut state.limit_order_history,
            LimitOrderSlot::User => &mut state.limit_orders_by_user,
            LimitOrderSlot::UserPool => &mut state.user_limit_orders_by_pool,
        }
    }
}

impl Slotted for Transaction {
    type Slot = TransactionSlot;

    fn scope_of(slot: Self::Slot) -> SlotScope {
        match slot {
            TransactionSlot::Pool | TransactionSlot::History => SlotScope::Pool,
            TransactionSlot::User => SlotScope::User,
            TransactionSlot::UserPool => SlotScope::UserPool,
        }
    }

    fn collection(state: &mut GraphState, slot: Self::Slot) -> &mut Collection<Self> {
        match slot {
            TransactionSlot::Pool => &mut state.transactions_by_pool,
            TransactionSlot::History => &mut state.transaction_history,
            TransactionSlot::User => &mut state.transactions_by_user,
            TransactionSlot::UserPool => &mut state.user_transactions_by_pool,
        }
    }
}

/// Decorated records from one successful fetch
#[derive(Debug, Clone)]
pub struct Batch<T> {
    /// Scope the request was issued for
    pub scope: ScopeKey,
    /// Raw records the server returned, before decoration and filtering
    pub fetched: usize,
    pub records: Vec<T>,
}

impl<T> Batch<T> {
    pub fn new(scope: ScopeKey, fetched: usize, records: Vec<T>) -> Self {
        Self {
            scope,
            fetched,
            records,
        }
    }
}

/// What applying a batch did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Collection updated; `added` identities were not present before
    Applied { added: usize },
    /// Nothing in the batch survived filtering
    Unchanged,
    /// The batch belongs to a scope that is no longer active
    Stale,
}

impl ApplyOutcome {
    pub fn added(&self) -> usize {
        match self {
            ApplyOutcome::Applied { added } => *added,
            _ => 0,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Shared handle to the graph state; cheap to clone
#[derive(Clone)]
pub struct GraphStore {
    state: Arc<RwLock<Arc<GraphState>>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(Arc::new(GraphState::default()))),
            version: Arc::new(version),
        }
    }

    /// Last published state
    pub fn snapshot(&self) -> Arc<GraphState> {
        self.state.read().clone()
    }

    /// Receives a new version number after every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Apply `update` to a copy of the state and publish it if it reports a change
    fn update<R>(&self, update: impl FnOnce(&mut GraphState) -> (bool, R)) -> R {
        let (changed, result) = {
            let mut guard = self.state.write();
            let mut next = GraphState::clone(&guard);
            let (changed, result) = update(&mut next);
            if changed {
                *guard = Arc::new(next);
            }
            (changed, result)
        };
        if changed {
            self.version.send_modify(|v| *v += 1);
        }
        result
    }

    /// Switch the active pool, clearing pool and user-in-pool collections
    pub fn select_pool(&self, pool: PoolKey) -> bool {
        self.update(|state| {
            if state.pool.as_ref() == Some(&pool) {
                return (false, false);
            }
            debug!(pool = %pool, "Switching active pool");
            state.reset_pool_collections();
            state.reset_user_pool_collections();
            state.liquidity = LiquidityState::Pending(pool.clone());
            state.pool = Some(pool);
            (true, true)
        })
    }

    /// Switch the active user, clearing user and user-in-pool collections
    pub fn select_user(&self, user: Option<UserKey>) -> bool {
        self.update(|state| {
            if state.user == user {
                return (false, false);
            }
            state.reset_user_collections();
            state.reset_user_pool_collections();
            state.user = user;
            (true, true)
        })
    }

    /// Merge a batch into `slot` under `policy`
    ///
    /// An empty successful fetch confirms the collection is empty. A non-empty
    /// fetch whose records were all filtered out or failed decoration leaves
    /// the collection untouched.
    pub fn apply<T: Slotted>(&self, slot: T::Slot, batch: Batch<T>, policy: MergePolicy) -> ApplyOutcome {
        self.update(|state| {
            let scope = T::scope_of(slot);
            if state.expected_scope(scope).as_ref() != Some(&batch.scope) {
                warn!(slot = ?slot, scope = %batch.scope, "Discarding batch for inactive scope");
                return (false, ApplyOutcome::Stale);
            }

            let records: Vec<T> = match batch.scope.pool() {
                Some(pool) => batch
                    .records
                    .into_iter()
                    .filter(|r| r.pool().base == pool.base && r.pool().quote == pool.quote)
                    .collect(),
                None => batch.records,
            };

            let collection = T::collection(state, slot);
            if records.is_empty() {
                if batch.fetched > 0 {
                    return (false, ApplyOutcome::Unchanged);
                }
                let cleared = matches!(policy, MergePolicy::Replace) && !collection.records.is_empty();
                if collection.data_received && !cleared {
                    return (false, ApplyOutcome::Unchanged);
                }
                if cleared {
                    collection.records.clear();
                }
                collection.data_received = true;
                return (true, ApplyOutcome::Applied { added: 0 });
            }

            let before: HashSet<T::Id> = collection.records.iter().map(Record::identity).collect();
            let merged = policy.merge(&collection.records, records);
            let added = merged.iter().filter(|r| !before.contains(&r.identity())).count();

            collection.records = merged;
            collection.data_received = true;
            (true, ApplyOutcome::Applied { added })
        })
    }

    /// Mark the active pool's liquidity as awaiting a fetch
    pub fn set_liquidity_pending(&self, pool: &PoolKey) {
        self.update(|state| {
            if state.pool.as_ref() != Some(pool) {
                return (false, ());
            }
            state.liquidity = LiquidityState::Pending(pool.clone());
            (true, ())
        })
    }

    /// Accept a liquidity curve issued for `request`
    ///
    /// The curve must echo the request and the request must still be the
    /// active pool; anything else is discarded.
    pub fn set_liquidity(&self, curve: LiquidityCurve, request: &PoolKey) -> bool {
        self.update(|state| {
            if &curve.pool != request || state.pool.as_ref() != Some(request) {
                warn!(
                    base = %curve.pool.base,
                    quote = %curve.pool.quote,
                    chain = %curve.pool.chain_id,
                    "Discarding mismatched liquidity curve request"
                );
                return (false, false);
            }
            state.liquidity = LiquidityState::Ready(curve);
            (true, true)
        })
    }
}
