/// Composite keys identifying chains, pools, users and positions
///
/// Addresses are normalised on construction (lower case, `0x` prefix) so every
/// comparison downstream is case-insensitive without further work.

use crate::errors::RecordError;
use crate::RecordResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Addresses and Chains
// ============================================================================

/// Normalised hex address of a token or account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> RecordResult<Self> {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        let digits = lower.strip_prefix("0x").unwrap_or(&lower);

        if digits.is_empty() {
            return Err(RecordError::invalid_address(raw, "empty"));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RecordError::invalid_address(raw, "non-hex character"));
        }

        Ok(Self(format!("0x{digits}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an unnormalised address string
    pub fn matches(&self, other: &str) -> bool {
        Address::parse(other).map(|a| a == *self).unwrap_or(false)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// Hex chain identifier as used by the indexer (`"0x1"`, `"0x82750"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn parse(raw: &str) -> RecordResult<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        match lower.strip_prefix("0x") {
            Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()) => {
                Ok(Self(lower))
            }
            _ => Err(RecordError::InvalidChainId {
                value: raw.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChainId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainId::parse(s)
    }
}

impl TryFrom<String> for ChainId {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChainId::parse(&value)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.0
    }
}

// ============================================================================
// Scope Keys
// ============================================================================

/// A single pool: token pair plus pool index on one chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    pub chain_id: ChainId,
    pub base: Address,
    pub quote: Address,
    pub pool_index: u64,
}

impl PoolKey {
    pub fn new(chain_id: ChainId, base: Address, quote: Address, pool_index: u64) -> Self {
        Self {
            chain_id,
            base,
            quote,
            pool_index,
        }
    }

    /// Orders an unordered token pair so the lower address is the base side
    pub fn from_pair(chain_id: ChainId, a: Address, b: Address, pool_index: u64) -> Self {
        let (base, quote) = if a <= b { (a, b) } else { (b, a) };
        Self::new(chain_id, base, quote, pool_index)
    }

    /// True when the raw base/quote strings name this pool's tokens
    pub fn matches_tokens(&self, base: &str, quote: &str) -> bool {
        self.base.matches(base) && self.quote.matches(quote)
    }

    pub fn same_pair(&self, other: &PoolKey) -> bool {
        self.chain_id == other.chain_id && self.base == other.base && self.quote == other.quote
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}#{}",
            self.chain_id, self.base, self.quote, self.pool_index
        )
    }
}

/// An account on one chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserKey {
    pub chain_id: ChainId,
    pub user: Address,
}

impl UserKey {
    pub fn new(chain_id: ChainId, user: Address) -> Self {
        Self { chain_id, user }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.user)
    }
}

/// Scope a fetch is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKey {
    User(UserKey),
    Pool(PoolKey),
    UserPool { user: Address, pool: PoolKey },
}

impl ScopeKey {
    pub fn chain_id(&self) -> &ChainId {
        match self {
            ScopeKey::User(key) => &key.chain_id,
            ScopeKey::Pool(pool) | ScopeKey::UserPool { pool, .. } => &pool.chain_id,
        }
    }

    pub fn pool(&self) -> Option<&PoolKey> {
        match self {
            ScopeKey::User(_) => None,
            ScopeKey::Pool(pool) | ScopeKey::UserPool { pool, .. } => Some(pool),
        }
    }

    pub fn user(&self) -> Option<&Address> {
        match self {
            ScopeKey::User(key) => Some(&key.user),
            ScopeKey::UserPool { user, .. } => Some(user),
            ScopeKey::Pool(_) => None,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::User(key) => write!(f, "user({key})"),
            ScopeKey::Pool(pool) => write!(f, "pool({pool})"),
            ScopeKey::UserPool { user, pool } => write!(f, "user_pool({user}@{pool})"),
        }
    }
}

// ============================================================================
// Record Identity
// ============================================================================

/// Liquidity shape of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionKind {
    /// Full range liquidity, tick bounds are meaningless
    Ambient,
    /// Bounded range liquidity
    Concentrated,
    /// Knockout liquidity backing a limit order
    Knockout,
}

impl PositionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionKind::Ambient => "ambient",
            PositionKind::Concentrated => "concentrated",
            PositionKind::Knockout => "knockout",
        }
    }
}

impl FromStr for PositionKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ambient" => Ok(PositionKind::Ambient),
            "concentrated" | "range" => Ok(PositionKind::Concentrated),
            "knockout" | "limit" => Ok(PositionKind::Knockout),
            other => Err(RecordError::UnknownPositionKind {
                value: other.to_string(),
            }),
        }
    }
}

/// Structural identity of a position or limit order
///
/// Equality and hashing are field-wise, so two ids only collide when every
/// component matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId {
    pub user: Address,
    pub base: Address,
    pub quote: Address,
    pub pool_index: u64,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub kind: PositionKind,
}

impl PositionId {
    pub fn new(
        user: Address,
        pool: &PoolKey,
        bid_tick: i32,
        ask_tick: i32,
        kind: PositionKind,
    ) -> Self {
        let (bid_tick, ask_tick) = match kind {
            PositionKind::Ambient => (0, 0),
            _ => (bid_tick, ask_tick),
        };
        Self {
            user,
            base: pool.base.clone(),
            quote: pool.quote.clone(),
            pool_index: pool.pool_index,
            bid_tick,
            ask_tick,
            kind,
        }
    }

    pub fn is_limit(&self) -> bool {
        self.kind == PositionKind::Knockout
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}",
            self.kind.as_str(),
            self.user,
            self.base,
            self.quote,
            self.pool_index,
            self.bid_tick,
            self.ask_tick
        )
    }
}

impl FromStr for PositionId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 7 {
            return Err(RecordError::invalid_position_id(
                s,
                format!("expected 7 fields, found {}", parts.len()),
            ));
        }

        let number = |field: &str, name: &str| -> RecordResult<i64> {
            field
                .parse::<i64>()
                .map_err(|_| RecordError::invalid_position_id(s, format!("bad {name}")))
        };

        let pool_index = u64::try_from(number(parts[4], "pool index")?)
            .map_err(|_| RecordError::invalid_position_id(s, "negative pool index"))?;
        let bid_tick = i32::try_from(number(parts[5], "bid tick")?)
            .map_err(|_| RecordError::invalid_position_id(s, "bid tick out of range"))?;
        let ask_tick = i32::try_from(number(parts[6], "ask tick")?)
            .map_err(|_| RecordError::invalid_position_id(s, "ask tick out of range"))?;

        Ok(Self {
            kind: parts[0].parse()?,
            user: Address::parse(parts[1])?,
            base: Address::parse(parts[2])?,
            quote: Address::parse(parts[3])?,
            pool_index,
            bid_tick,
            ask_tick,
        })
    }
}

/// Identity of an indexed transaction: its hash, or the server id when the hash is absent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxIdentity(String);

impl TxIdentity {
    pub fn new(tx_hash: &str, tx_id: &str) -> Option<Self> {
        let hash = tx_hash.trim();
        let source = if hash.is_empty() { tx_id.trim() } else { hash };
        if source.is_empty() {
            None
        } else {
            Some(Self(source.to_ascii_lowercase()))
        }
    }

    pub fn from_hash(tx_hash: &str) -> Self {
        Self(tx_hash.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record collection families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Position,
    LimitOrder,
    Transaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> PoolKey {
        PoolKey::new(
            ChainId::parse("0x1").unwrap(),
            Address::parse("0x0000000000000000000000000000000000000000").unwrap(),
            Address::parse("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap(),
            420,
        )
    }

    #[test]
    fn test_address_normalisation() {
        let a = Address::parse("0xABCdef").unwrap();
        let b = Address::parse("abcdef").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef");
        assert!(a.matches("0XABCDEF"));
    }

    #[test]
    fn test_address_rejects_garbage() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("0x").is_err());
        assert!(Address::parse("0xzz12").is_err());
    }

    #[test]
    fn test_chain_id_parse() {
        assert_eq!(ChainId::parse("0X1").unwrap().as_str(), "0x1");
        assert!(ChainId::parse("1").is_err());
    }

    #[test]
    fn test_pool_from_pair_orders_tokens() {
        let chain = ChainId::parse("0x1").unwrap();
        let a = Address::parse("0xbb").unwrap();
        let b = Address::parse("0xaa").unwrap();
        let key = PoolKey::from_pair(chain, a, b, 36000);
        assert_eq!(key.base.as_str(), "0xaa");
        assert_eq!(key.quote.as_str(), "0xbb");
    }

    #[test]
    fn test_pool_matches_tokens_case_insensitive() {
        let key = pool();
        assert!(key.matches_tokens(
            "0x0000000000000000000000000000000000000000",
            "0xa0B86991C6218B36C1D19D4A2E9EB0CE3606EB48"
        ));
        assert!(!key.matches_tokens("0x01", "0x02"));
    }

    #[test]
    fn test_position_id_round_trip() {
        let user = Address::parse("0xfeed").unwrap();
        let id = PositionId::new(user, &pool(), -100, 200, PositionKind::Concentrated);
        let text = id.to_string();
        let parsed: PositionId = text.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ambient_ids_ignore_ticks() {
        let user = Address::parse("0xfeed").unwrap();
        let a = PositionId::new(user.clone(), &pool(), -100, 200, PositionKind::Ambient);
        let b = PositionId::new(user, &pool(), 5, 7, PositionKind::Ambient);
        assert_eq!(a, b);
    }

    #[test]
    fn test_limit_and_range_ids_differ() {
        let user = Address::parse("0xfeed").unwrap();
        let range = PositionId::new(user.clone(), &pool(), 10, 20, PositionKind::Concentrated);
        let limit = PositionId::new(user, &pool(), 10, 20, PositionKind::Knockout);
        assert_ne!(range, limit);
        assert!(limit.is_limit());
    }

    #[test]
    fn test_position_id_rejects_short_input() {
        assert!("ambient:0x1:0x2".parse::<PositionId>().is_err());
    }

    #[test]
    fn test_tx_identity_falls_back_to_id() {
        assert_eq!(TxIdentity::new("0xABC", "id-1").unwrap().as_str(), "0xabc");
        assert_eq!(TxIdentity::new("", "id-1").unwrap().as_str(), "id-1");
        assert!(TxIdentity::new(" ", "").is_none());
    }
}
