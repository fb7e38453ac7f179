//! ============================================================================
//! Core Types for the Gacha Engine
//! ============================================================================
//! Catalog entries, owned inventory, upgrade contracts, ledger records and the
//! typed error taxonomy returned by every resolver operation.
//! Amounts are integer nanoTON to keep payout arithmetic exact.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Number of nanoTON in one TON
pub const NANO_PER_TON: u64 = 1_000_000_000;

/// Convert a display TON amount into nanoTON (rounded to the nearest unit)
pub fn ton_to_nano(ton: f64) -> u64 {
    if !ton.is_finite() || ton <= 0.0 {
        return 0;
    }
    (ton * NANO_PER_TON as f64).round() as u64
}

/// Convert nanoTON into TON for display
pub fn nano_to_ton(nano: u64) -> f64 {
    nano as f64 / NANO_PER_TON as f64
}

// ============================================================================
// Catalog Types
// ============================================================================

/// Rarity tier of a gift. Descriptive only, odds come from reward weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "common" => Some(Self::Common),
            "rare" => Some(Self::Rare),
            "epic" => Some(Self::Epic),
            "legendary" => Some(Self::Legendary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

/// Immutable catalog gift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gift {
    pub id: String,
    pub name: String,
    /// Catalog value in nanoTON
    pub price: u64,
    pub rarity: Rarity,
    /// Media reference (image URL or sticker id)
    #[serde(default)]
    pub media: String,
}

/// One row of a case reward table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReward {
    pub gift_id: String,
    /// Relative weight, normalized at draw time
    pub weight: f64,
}

/// Purchasable (or free) case resolving to one gift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub name: String,
    /// Price in nanoTON, 0 for a free case
    pub price: u64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Ordered reward table
    pub rewards: Vec<CaseReward>,
}

fn default_active() -> bool {
    true
}

impl Case {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }
}

// ============================================================================
// Inventory & Upgrade Types
// ============================================================================

/// Quantity of one gift owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub user_id: String,
    pub gift_id: String,
    pub quantity: u64,
}

/// Inventory entry joined with its catalog gift for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub gift: Gift,
    pub quantity: u64,
}

/// Gift and quantity committed as upgrade input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftQuantity {
    pub gift_id: String,
    pub quantity: u64,
}

impl GiftQuantity {
    pub fn new(gift_id: impl Into<String>, quantity: u64) -> Self {
        Self {
            gift_id: gift_id.into(),
            quantity,
        }
    }
}

/// Upgrade contract lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Pending,
    Success,
    Failed,
}

impl ContractStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Two-phase upgrade bet. Immutable once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeContract {
    pub id: String,
    pub user_id: String,
    pub inputs: Vec<GiftQuantity>,
    /// Total input value in nanoTON, frozen at creation
    pub input_value: u64,
    pub target_gift_id: String,
    /// Success probability, frozen at creation
    pub success_chance: f64,
    pub status: ContractStatus,
    pub result_gift_id: Option<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
    pub proof: Option<DrawProof>,
}

// ============================================================================
// Ledger Types
// ============================================================================

/// Kind of ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    CaseOpen,
    CaseReward,
    UpgradeInput,
    UpgradeReward,
    UpgradeConsolation,
    Sale,
}

/// Append-only audit record of one balance or inventory mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    /// Signed balance change in nanoTON
    pub balance_delta: i64,
    pub gift_id: Option<String>,
    /// Signed inventory change for `gift_id`
    pub quantity_delta: i64,
    /// Case id or contract id that caused the mutation
    pub reference: Option<String>,
    pub created_at: i64,
}

impl TransactionRecord {
    pub fn new(user_id: &str, kind: TransactionKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            balance_delta: 0,
            gift_id: None,
            quantity_delta: 0,
            reference: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn balance(mut self, delta: i64) -> Self {
        self.balance_delta = delta;
        self
    }

    pub fn gift(mut self, gift_id: &str, quantity_delta: i64) -> Self {
        self.gift_id = Some(gift_id.to_string());
        self.quantity_delta = quantity_delta;
        self
    }

    pub fn reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }
}

/// Versioned user balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    /// Balance in nanoTON
    pub amount: u64,
    /// Incremented on every adjustment
    pub version: u64,
}

// ============================================================================
// Fairness Types
// ============================================================================

/// Public data needed to reproduce one draw once the server seed is revealed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawProof {
    /// SHA-256 of the server seed (hex), published before the draw
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

// ============================================================================
// Resolver Outcomes
// ============================================================================

/// Result of opening a case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOpening {
    pub case_id: String,
    pub gift: Gift,
    pub new_balance: u64,
    pub proof: DrawProof,
}

/// Result of creating an upgrade contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractQuote {
    pub contract_id: String,
    pub success_chance: f64,
    pub input_value: u64,
}

/// Result of executing an upgrade contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeOutcome {
    pub contract_id: String,
    pub success: bool,
    /// Target gift on success, consolation gift (if any) on failure
    pub result_gift: Option<Gift>,
    pub proof: DrawProof,
}

/// Seed rotation result: the revealed seed plus the next commitment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedReveal {
    pub revealed_server_seed: String,
    pub revealed_server_seed_hash: String,
    pub client_seed: String,
    /// Nonce the revealed seed had reached (draws used 0..final_nonce)
    pub final_nonce: u64,
    pub next_server_seed_hash: String,
}

/// Reward shown in the public recent wins feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentWin {
    pub user_id: String,
    pub gift: Gift,
    /// `CaseReward` or `UpgradeReward`
    pub kind: TransactionKind,
    /// Case id or contract id
    pub reference: Option<String>,
    pub created_at: i64,
}

/// Outcome recomputed from a revealed server seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReplay {
    pub success: bool,
    pub result_gift_id: Option<String>,
}

/// Check of a resolved contract against a revealed server seed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeVerification {
    pub contract_id: String,
    /// Revealed seed hashes to the commitment in the contract's proof
    pub commitment_valid: bool,
    pub replay: UpgradeReplay,
    /// Replayed outcome equals the recorded one
    pub outcome_matches: bool,
}

// ============================================================================
// Errors
// ============================================================================

/// Error taxonomy for resolver operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum GachaError {
    #[error("Insufficient funds: need {needed} nanoTON, have {available} nanoTON")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Insufficient inventory for gift {gift_id}: need {needed}, have {available}")]
    InsufficientInventory {
        gift_id: String,
        needed: u64,
        available: u64,
    },

    #[error("Case not found: {0}")]
    CaseNotFound(String),

    #[error("Target gift not found: {0}")]
    TargetNotFound(String),

    #[error("Gift not found: {0}")]
    GiftNotFound(String),

    #[error("Upgrade requires at least one input gift")]
    EmptyInputSet,

    #[error("Invalid quantity for gift {0}")]
    InvalidQuantity(String),

    #[error("Invalid amount: {0} nanoTON")]
    InvalidAmount(u64),

    #[error("Client seed must not be empty")]
    InvalidClientSeed,

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Contract already resolved: {0}")]
    ContractAlreadyResolved(String),

    #[error("Contract not resolved yet: {0}")]
    ContractPending(String),

    #[error("No seed chain for user {0}")]
    SeedChainNotFound(String),

    #[error("Free case {case_id} already claimed")]
    FreeCaseAlreadyClaimed { case_id: String },

    #[error("Balance version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Catalog configuration error: {0}")]
    ConfigurationError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GachaError {
    /// Errors caused by the request rather than the system
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::ConfigurationError(_) | Self::Storage(_) | Self::Internal(_)
        )
    }
}

pub type GachaResult<T> = std::result::Result<T, GachaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ton_conversion() {
        assert_eq!(ton_to_nano(1.0), NANO_PER_TON);
        assert_eq!(ton_to_nano(0.1), 100_000_000);
        assert_eq!(ton_to_nano(-3.0), 0);
        assert_eq!(ton_to_nano(f64::NAN), 0);
        assert!((nano_to_ton(2_500_000_000) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_rarity_parsing() {
        assert_eq!(Rarity::from_str("Legendary"), Some(Rarity::Legendary));
        assert_eq!(Rarity::from_str("mythic"), None);
        assert_eq!(Rarity::Epic.as_str(), "epic");
    }

    #[test]
    fn test_transaction_builder() {
        let record = TransactionRecord::new("u1", TransactionKind::CaseOpen)
            .balance(-500)
            .reference("basic");
        assert_eq!(record.balance_delta, -500);
        assert_eq!(record.reference.as_deref(), Some("basic"));
        assert!(record.gift_id.is_none());
    }

    #[test]
    fn test_error_classification() {
        assert!(GachaError::EmptyInputSet.is_user_error());
        assert!(!GachaError::Storage("disk".into()).is_user_error());
        assert!(!GachaError::ConfigurationError("empty".into()).is_user_error());
    }
}
