//! Case opening: debit, weighted draw, grant

use tracing::{debug, info};

use super::{log_failure, next_draw, signed, Resolver};
use crate::catalog::RewardCatalog;
use crate::fairness::{derive_rng, validate_weights, weighted_draw};
use crate::ledger::Ledger;
use crate::types::{
    Case, CaseOpening, GachaError, GachaResult, Gift, TransactionKind, TransactionRecord,
};

impl<L: Ledger, C: RewardCatalog> Resolver<L, C> {
    /// Open a case for a user: debit its price, draw one gift from its reward
    /// table and add that gift to the user's inventory.
    pub fn open_case(&self, user_id: &str, case_id: &str) -> GachaResult<CaseOpening> {
        let result = self.open_case_inner(user_id, case_id);
        match &result {
            Ok(opening) => info!(
                "{} opened {} and won {} (nonce {})",
                user_id, case_id, opening.gift.id, opening.proof.nonce
            ),
            Err(e) => log_failure("Case open", user_id, e),
        }
        result
    }

    fn open_case_inner(&self, user_id: &str, case_id: &str) -> GachaResult<CaseOpening> {
        let case = self
            .catalog
            .get_case(case_id)?
            .filter(|c| c.is_active)
            .ok_or_else(|| GachaError::CaseNotFound(case_id.to_string()))?;
        let table = self.reward_table(&case)?;
        let price = signed(case.price)?;
        let once_per_user = case.is_free() && self.config.free_case_once_per_user;

        self.ledger.atomically(|txn| {
            if once_per_user && txn.free_case_claimed(user_id, case_id)? {
                return Err(GachaError::FreeCaseAlreadyClaimed {
                    case_id: case_id.to_string(),
                });
            }

            let balance = txn.balance(user_id)?;
            if balance.amount < case.price {
                return Err(GachaError::InsufficientFunds {
                    needed: case.price,
                    available: balance.amount,
                });
            }
            let new_balance = if case.is_free() {
                balance.amount
            } else {
                txn.adjust_balance(user_id, -price, Some(balance.version))?.amount
            };

            let (mut rng, proof) = next_draw(txn, user_id)?;
            let gift = weighted_draw(&table, &mut rng)?.clone();
            txn.adjust_inventory(user_id, &gift.id, 1)?;

            txn.append_transaction(
                &TransactionRecord::new(user_id, TransactionKind::CaseOpen)
                    .balance(-price)
                    .reference(case_id),
            )?;
            txn.append_transaction(
                &TransactionRecord::new(user_id, TransactionKind::CaseReward)
                    .gift(&gift.id, 1)
                    .reference(case_id),
            )?;
            if once_per_user {
                txn.mark_free_case_claimed(user_id, case_id)?;
            }

            Ok(CaseOpening {
                case_id: case_id.to_string(),
                gift,
                new_balance,
                proof,
            })
        })
    }

    /// Resolve a case's reward table against the catalog, in table order
    fn reward_table(&self, case: &Case) -> GachaResult<Vec<(Gift, f64)>> {
        let mut table = Vec::with_capacity(case.rewards.len());
        for reward in &case.rewards {
            let gift = self.catalog.get_gift(&reward.gift_id)?.ok_or_else(|| {
                GachaError::ConfigurationError(format!(
                    "case {} references unknown gift {}",
                    case.id, reward.gift_id
                ))
            })?;
            table.push((gift, reward.weight));
        }
        let total = validate_weights(&table).map_err(|e| match e {
            GachaError::ConfigurationError(msg) => {
                GachaError::ConfigurationError(format!("case {}: {}", case.id, msg))
            }
            other => other,
        })?;
        debug!("Case {} has {} rewards, total weight {}", case.id, table.len(), total);
        Ok(table)
    }
}

/// Recompute which gift a past case draw produced from its revealed seeds.
///
/// Uses the same reward table order and weights as the live draw, so the
/// result matches as long as the case definition is unchanged.
pub fn replay_case_draw(
    case: &Case,
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
) -> GachaResult<String> {
    let table: Vec<(&str, f64)> = case
        .rewards
        .iter()
        .map(|r| (r.gift_id.as_str(), r.weight))
        .collect();
    let mut rng = derive_rng(server_seed, client_seed, nonce);
    let gift_id = weighted_draw(&table, &mut rng)?;
    Ok(gift_id.to_string())
}
