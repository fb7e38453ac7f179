//! ============================================================================
//! Database Types - Key layout and summary records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate counters for the admin tooling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbStats {
    pub total_users: usize,
    /// Users with a transaction in the last 24 hours
    pub active_users: usize,
    /// Sum of all deposits in nanoTON
    pub total_deposits: u64,
    /// Sum of all balances in nanoTON
    pub total_balance: u64,
    pub total_transactions: usize,
    pub cases_opened: usize,
    /// Contract count keyed by status name
    pub contract_counts: HashMap<String, usize>,
    pub total_gifts: usize,
    pub total_cases: usize,
}

/// Free case claim marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeCaseClaim {
    pub user_id: String,
    pub case_id: String,
    pub claimed_at: i64,
}

pub(crate) fn balance_key(user_id: &str) -> String {
    format!("balances:{}", user_id)
}

/// Length-prefixed id segment. Ids may contain `:`, so composite keys
/// carry each leading id as `{len}:{id}` to stay unambiguous.
fn segment(id: &str) -> String {
    format!("{}:{}", id.len(), id)
}

pub(crate) fn inventory_key(user_id: &str, gift_id: &str) -> String {
    format!("inventory:{}:{}", segment(user_id), gift_id)
}

/// Half-open key range covering one user's inventory rows.
/// `;` is the byte after `:` so the end bound excludes other users.
pub(crate) fn inventory_range(user_id: &str) -> (String, String) {
    (
        format!("inventory:{}:", segment(user_id)),
        format!("inventory:{};", segment(user_id)),
    )
}

pub(crate) fn contract_key(contract_id: &str) -> String {
    format!("contracts:{}", contract_id)
}

pub(crate) fn transaction_key(user_id: &str, seq: u64) -> String {
    format!("transactions:{}:{:020}", segment(user_id), seq)
}

pub(crate) fn transaction_range(user_id: &str) -> (String, String) {
    (
        format!("transactions:{}:", segment(user_id)),
        format!("transactions:{};", segment(user_id)),
    )
}

/// Global sequence number encoded in a transaction key
pub(crate) fn transaction_seq(key: &str) -> Option<u64> {
    key.rsplit_once(':').and_then(|(_, seq)| seq.parse().ok())
}

pub(crate) fn seed_key(user_id: &str) -> String {
    format!("seeds:{}", user_id)
}

pub(crate) fn claim_key(user_id: &str, case_id: &str) -> String {
    format!("claims:{}:{}", segment(user_id), case_id)
}

pub(crate) fn gift_key(gift_id: &str) -> String {
    format!("gifts:{}", gift_id)
}

pub(crate) fn case_key(case_id: &str) -> String {
    format!("cases:{}", case_id)
}

pub(crate) const TX_SEQ_KEY: &str = "meta:tx_seq";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_range_excludes_prefix_collisions() {
        let (start, end) = inventory_range("42");
        let own = inventory_key("42", "cake");
        let other = inventory_key("420", "cake");
        assert!(own.as_str() >= start.as_str() && own.as_str() < end.as_str());
        assert!(!(other.as_str() >= start.as_str() && other.as_str() < end.as_str()));
    }

    #[test]
    fn test_keys_unambiguous_with_separator_in_ids() {
        assert_ne!(inventory_key("alice", "x:cake"), inventory_key("alice:x", "cake"));
        assert_ne!(claim_key("alice", "x:free"), claim_key("alice:x", "free"));

        let (start, end) = inventory_range("alice");
        let other = inventory_key("alice:x", "cake");
        assert!(!(other >= start && other < end));
        let (start, end) = transaction_range("alice");
        let other = transaction_key("alice:x", 1);
        assert!(!(other >= start && other < end));
    }

    #[test]
    fn test_transaction_keys_sort_by_sequence() {
        assert!(transaction_key("u", 9) < transaction_key("u", 10));
        let (start, end) = transaction_range("u");
        let key = transaction_key("u", 1);
        assert!(key >= start && key < end);
        assert_eq!(transaction_seq(&transaction_key("a:b", 42)), Some(42));
    }
}
