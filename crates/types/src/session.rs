/// Locally submitted transactions awaiting indexer confirmation

use crate::keys::{PoolKey, PositionId, TxIdentity};
use serde::{Deserialize, Serialize};

// ============================================================================
// Session Updates
// ============================================================================

/// Position or limit order change the current session just submitted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub position_id: PositionId,
    pub tx_hash: TxIdentity,
    pub is_limit: bool,
    /// Wall clock seconds at submission
    pub unix_time_added: i64,
    /// Wall clock seconds when the receipt arrived
    pub unix_time_receipt: Option<i64>,
    /// The transaction removes all liquidity from the position
    pub is_full_removal: bool,
}

impl SessionUpdate {
    pub fn new(position_id: PositionId, tx_hash: TxIdentity, unix_time_added: i64) -> Self {
        let is_limit = position_id.is_limit();
        Self {
            position_id,
            tx_hash,
            is_limit,
            unix_time_added,
            unix_time_receipt: None,
            is_full_removal: false,
        }
    }

    pub fn full_removal(mut self) -> Self {
        self.is_full_removal = true;
        self
    }
}

/// Any transaction the session submitted, swaps included
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionTransaction {
    pub tx_hash: TxIdentity,
    /// Pool the transaction touched, when known
    pub pool: Option<PoolKey>,
    pub unix_time_added: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// Mined receipt for a session transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxIdentity,
    pub status: ReceiptStatus,
    pub unix_time: i64,
}

// ============================================================================
// Update Lifecycle
// ============================================================================

/// `Pending` moves to exactly one terminal state and never comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateStatus {
    Pending,
    Indexed,
    Failed,
    Superseded,
}

impl UpdateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UpdateStatus::Pending)
    }
}
