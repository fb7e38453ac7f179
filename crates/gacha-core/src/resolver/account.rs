//! Balance movements, inventory and history queries, seed chain management

use tracing::{info, warn};

use super::{log_failure, signed, Resolver};
use crate::catalog::RewardCatalog;
use crate::fairness::{SeedState, DEFAULT_CLIENT_SEED};
use crate::ledger::Ledger;
use crate::types::{
    Balance, Case, DrawProof, GachaError, GachaResult, InventoryItem, RecentWin, SeedReveal,
    TransactionKind, TransactionRecord,
};

impl<L: Ledger, C: RewardCatalog> Resolver<L, C> {
    // ========================================================================
    // Balance Movements
    // ========================================================================

    /// Credit a confirmed deposit
    pub fn deposit(&self, user_id: &str, amount: u64) -> GachaResult<Balance> {
        if amount == 0 {
            return Err(GachaError::InvalidAmount(amount));
        }
        let delta = signed(amount)?;
        let result = self.ledger.atomically(|txn| {
            let balance = txn.adjust_balance(user_id, delta, None)?;
            txn.append_transaction(
                &TransactionRecord::new(user_id, TransactionKind::Deposit).balance(delta),
            )?;
            Ok(balance)
        });
        match &result {
            Ok(balance) => info!("Deposited {} to {} (now {})", amount, user_id, balance.amount),
            Err(e) => log_failure("Deposit", user_id, e),
        }
        result
    }

    /// Debit a withdrawal. Rejected outright when the balance is too low.
    pub fn withdraw(&self, user_id: &str, amount: u64) -> GachaResult<Balance> {
        if amount == 0 {
            return Err(GachaError::InvalidAmount(amount));
        }
        let delta = signed(amount)?;
        let result = self.ledger.atomically(|txn| {
            let balance = txn.adjust_balance(user_id, -delta, None)?;
            txn.append_transaction(
                &TransactionRecord::new(user_id, TransactionKind::Withdrawal).balance(-delta),
            )?;
            Ok(balance)
        });
        match &result {
            Ok(balance) => info!("Withdrew {} from {} (now {})", amount, user_id, balance.amount),
            Err(e) => log_failure("Withdrawal", user_id, e),
        }
        result
    }

    /// Sell gifts back at catalog price
    pub fn sell_gift(&self, user_id: &str, gift_id: &str, quantity: u64) -> GachaResult<Balance> {
        if quantity == 0 {
            return Err(GachaError::InvalidQuantity(gift_id.to_string()));
        }
        let gift = self
            .catalog
            .get_gift(gift_id)?
            .ok_or_else(|| GachaError::GiftNotFound(gift_id.to_string()))?;
        let payout = gift
            .price
            .checked_mul(quantity)
            .ok_or_else(|| GachaError::InvalidQuantity(gift_id.to_string()))?;
        let credit = signed(payout)?;
        let removed = signed(quantity)?;

        let result = self.ledger.atomically(|txn| {
            txn.adjust_inventory(user_id, gift_id, -removed)?;
            let balance = txn.adjust_balance(user_id, credit, None)?;
            txn.append_transaction(
                &TransactionRecord::new(user_id, TransactionKind::Sale)
                    .balance(credit)
                    .gift(gift_id, -removed),
            )?;
            Ok(balance)
        });
        match &result {
            Ok(_) => info!("{} sold {}x {} for {}", user_id, quantity, gift_id, payout),
            Err(e) => log_failure("Sale", user_id, e),
        }
        result
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn balance(&self, user_id: &str) -> GachaResult<Balance> {
        self.ledger.view(|view| view.balance(user_id))
    }

    pub fn inventory_quantity(&self, user_id: &str, gift_id: &str) -> GachaResult<u64> {
        self.ledger.view(|view| view.inventory_quantity(user_id, gift_id))
    }

    /// Owned gifts joined with the catalog, most valuable first
    pub fn inventory(&self, user_id: &str) -> GachaResult<Vec<InventoryItem>> {
        let entries = self.ledger.view(|view| view.inventory(user_id))?;

        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.catalog.get_gift(&entry.gift_id)? {
                Some(gift) => items.push(InventoryItem {
                    gift,
                    quantity: entry.quantity,
                }),
                None => warn!("Inventory of {} holds unknown gift {}", user_id, entry.gift_id),
            }
        }
        items.sort_by(|a, b| {
            b.gift
                .price
                .cmp(&a.gift.price)
                .then_with(|| a.gift.id.cmp(&b.gift.id))
        });
        Ok(items)
    }

    /// Most recent ledger records first, up to the configured limit
    pub fn history(&self, user_id: &str) -> GachaResult<Vec<TransactionRecord>> {
        let limit = self.config.history_limit;
        self.ledger.view(|view| view.transactions(user_id, limit))
    }

    pub fn list_cases(&self) -> GachaResult<Vec<Case>> {
        self.catalog.list_cases()
    }

    /// Latest case and upgrade wins across all users, newest first
    pub fn recent_wins(&self, limit: usize) -> GachaResult<Vec<RecentWin>> {
        let kinds = [TransactionKind::CaseReward, TransactionKind::UpgradeReward];
        let records = self.ledger.view(|view| view.recent_transactions(&kinds, limit))?;

        let mut wins = Vec::with_capacity(records.len());
        for record in records {
            let Some(gift_id) = record.gift_id.as_deref() else {
                continue;
            };
            match self.catalog.get_gift(gift_id)? {
                Some(gift) => wins.push(RecentWin {
                    user_id: record.user_id,
                    gift,
                    kind: record.kind,
                    reference: record.reference,
                    created_at: record.created_at,
                }),
                None => warn!("Recent win {} references unknown gift {}", record.id, gift_id),
            }
        }
        Ok(wins)
    }

    // ========================================================================
    // Seed Chain
    // ========================================================================

    /// Commitment and position of the user's next draw. The chain is created
    /// and stored on first request so the commitment binds.
    pub fn seed_commitment(&self, user_id: &str) -> GachaResult<DrawProof> {
        self.ledger.atomically(|txn| {
            let state = match txn.seed_state(user_id)? {
                Some(state) => state,
                None => {
                    let state = SeedState::generate(DEFAULT_CLIENT_SEED);
                    txn.put_seed_state(user_id, &state)?;
                    state
                }
            };
            Ok(DrawProof {
                server_seed_hash: state.commitment(),
                client_seed: state.client_seed,
                nonce: state.nonce,
            })
        })
    }

    /// Reveal the current server seed and start a new chain. The client seed
    /// carries over unless a new one is given. Users without a chain have
    /// nothing to reveal and get `SeedChainNotFound`.
    pub fn rotate_seed(&self, user_id: &str, client_seed: Option<&str>) -> GachaResult<SeedReveal> {
        if client_seed.map_or(false, |s| s.trim().is_empty()) {
            return Err(GachaError::InvalidClientSeed);
        }
        let result = self.ledger.atomically(|txn| {
            let old = txn
                .seed_state(user_id)?
                .ok_or_else(|| GachaError::SeedChainNotFound(user_id.to_string()))?;
            let next = SeedState::generate(client_seed.unwrap_or(old.client_seed.as_str()));
            txn.put_seed_state(user_id, &next)?;

            Ok(SeedReveal {
                revealed_server_seed_hash: old.commitment(),
                revealed_server_seed: old.server_seed,
                client_seed: old.client_seed,
                final_nonce: old.nonce,
                next_server_seed_hash: next.commitment(),
            })
        });
        match &result {
            Ok(reveal) => info!(
                "Rotated seed for {} after {} draws, next commitment {}",
                user_id, reveal.final_nonce, reveal.next_server_seed_hash
            ),
            Err(e) => log_failure("Seed rotation", user_id, e),
        }
        result
    }
}
