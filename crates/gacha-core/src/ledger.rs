//! ============================================================================
//! Ledger - Storage collaborator for balances, inventory and contracts
//! ============================================================================
//! A resolver operation is one `Ledger::atomically` call: every precondition
//! check and every mutation happen inside a single serializable transaction
//! that commits only when the closure returns `Ok`. Two concurrent case opens
//! by the same user can therefore never both pass the balance check.
//! ============================================================================

use crate::fairness::SeedState;
use crate::types::{
    Balance, GachaResult, InventoryEntry, TransactionKind, TransactionRecord, UpgradeContract,
};

/// Reads available inside a snapshot or a write transaction
pub trait LedgerView {
    /// Current balance; unknown users have a zero balance at version 0
    fn balance(&self, user_id: &str) -> GachaResult<Balance>;

    fn inventory_quantity(&self, user_id: &str, gift_id: &str) -> GachaResult<u64>;

    /// All non-zero inventory rows of a user
    fn inventory(&self, user_id: &str) -> GachaResult<Vec<InventoryEntry>>;

    /// Most recent transactions first, at most `limit`
    fn transactions(&self, user_id: &str, limit: usize) -> GachaResult<Vec<TransactionRecord>>;

    /// Records of the given kinds across all users, newest first
    fn recent_transactions(
        &self,
        kinds: &[TransactionKind],
        limit: usize,
    ) -> GachaResult<Vec<TransactionRecord>>;

    fn contract(&self, contract_id: &str) -> GachaResult<Option<UpgradeContract>>;

    fn seed_state(&self, user_id: &str) -> GachaResult<Option<SeedState>>;

    fn free_case_claimed(&self, user_id: &str, case_id: &str) -> GachaResult<bool>;
}

/// Mutations available inside `Ledger::atomically`
pub trait LedgerTxn: LedgerView {
    /// Apply a signed delta. Fails with `InsufficientFunds` if the result would
    /// be negative and with `VersionConflict` if `expected_version` is stale.
    fn adjust_balance(
        &mut self,
        user_id: &str,
        delta: i64,
        expected_version: Option<u64>,
    ) -> GachaResult<Balance>;

    /// Apply a signed quantity delta and return the new quantity. Fails with
    /// `InsufficientInventory` if the result would be negative; a zero
    /// quantity removes the row.
    fn adjust_inventory(&mut self, user_id: &str, gift_id: &str, delta: i64) -> GachaResult<u64>;

    fn append_transaction(&mut self, record: &TransactionRecord) -> GachaResult<()>;

    fn put_contract(&mut self, contract: &UpgradeContract) -> GachaResult<()>;

    fn put_seed_state(&mut self, user_id: &str, state: &SeedState) -> GachaResult<()>;

    fn mark_free_case_claimed(&mut self, user_id: &str, case_id: &str) -> GachaResult<()>;
}

/// Transactional ledger handle owned by the caller and injected into resolvers
pub trait Ledger: Send + Sync {
    /// Run `op` against a consistent read snapshot
    fn view<T>(&self, op: impl FnOnce(&dyn LedgerView) -> GachaResult<T>) -> GachaResult<T>;

    /// Run `op` in one atomic write transaction. Nothing is committed if `op`
    /// returns an error.
    fn atomically<T>(&self, op: impl FnOnce(&mut dyn LedgerTxn) -> GachaResult<T>) -> GachaResult<T>;
}
