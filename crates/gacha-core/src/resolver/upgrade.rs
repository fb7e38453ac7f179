//! Upgrade contracts: quote and persist, then resolve exactly once

use rand::Rng;
use tracing::{debug, info};

use super::{log_failure, next_draw, signed, Resolver};
use crate::catalog::RewardCatalog;
use crate::config::{ConsolationPick, ConsolationPolicy};
use crate::fairness::{bernoulli, derive_rng, verify_commitment};
use crate::ledger::Ledger;
use crate::types::{
    ContractQuote, ContractStatus, GachaError, GachaResult, Gift, GiftQuantity, TransactionKind,
    TransactionRecord, UpgradeContract, UpgradeOutcome, UpgradeReplay, UpgradeVerification,
};

const MIN_BASE_CHANCE: f64 = 0.1;
const MAX_BASE_CHANCE: f64 = 0.9;
const CHANCE_FLOOR: f64 = 0.05;
const CHANCE_CAP: f64 = 0.95;
/// Chances are quantized to multiples of 1/20
const CHANCE_STEPS: f64 = 20.0;

/// Success probability for betting `input_value` on a target worth
/// `target_value`. Proportional to the value ratio, clamped to [0.1, 0.9]
/// and rounded to the nearest 0.05. A zero-priced target gets the maximum.
pub fn calculate_success_chance(input_value: u64, target_value: u64) -> f64 {
    if target_value == 0 {
        return MAX_BASE_CHANCE;
    }
    let ratio = input_value as f64 / target_value as f64;
    let base = ratio.clamp(MIN_BASE_CHANCE, MAX_BASE_CHANCE);
    let rounded = (base * CHANCE_STEPS).round() / CHANCE_STEPS;
    rounded.clamp(CHANCE_FLOOR, CHANCE_CAP)
}

/// Merge duplicate gift ids and reject zero quantities
fn normalize_inputs(inputs: &[GiftQuantity]) -> GachaResult<Vec<GiftQuantity>> {
    if inputs.is_empty() {
        return Err(GachaError::EmptyInputSet);
    }
    let mut merged: Vec<GiftQuantity> = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.quantity == 0 {
            return Err(GachaError::InvalidQuantity(input.gift_id.clone()));
        }
        match merged.iter_mut().find(|m| m.gift_id == input.gift_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(input.quantity)
                    .ok_or_else(|| GachaError::InvalidQuantity(input.gift_id.clone()))?;
            }
            None => merged.push(input.clone()),
        }
    }
    Ok(merged)
}

impl<L: Ledger, C: RewardCatalog> Resolver<L, C> {
    /// Quote and persist a pending upgrade contract. Inputs are checked
    /// against the inventory but nothing is consumed until execution.
    pub fn create_upgrade_contract(
        &self,
        user_id: &str,
        inputs: &[GiftQuantity],
        target_gift_id: &str,
    ) -> GachaResult<ContractQuote> {
        let result = self.create_contract_inner(user_id, inputs, target_gift_id);
        match &result {
            Ok(quote) => info!(
                "{} created contract {} for {} (chance {:.2})",
                user_id, quote.contract_id, target_gift_id, quote.success_chance
            ),
            Err(e) => log_failure("Upgrade contract", user_id, e),
        }
        result
    }

    fn create_contract_inner(
        &self,
        user_id: &str,
        inputs: &[GiftQuantity],
        target_gift_id: &str,
    ) -> GachaResult<ContractQuote> {
        let inputs = normalize_inputs(inputs)?;
        let target = self
            .catalog
            .get_gift(target_gift_id)?
            .ok_or_else(|| GachaError::TargetNotFound(target_gift_id.to_string()))?;

        let mut input_value: u64 = 0;
        for input in &inputs {
            let gift = self
                .catalog
                .get_gift(&input.gift_id)?
                .ok_or_else(|| GachaError::GiftNotFound(input.gift_id.clone()))?;
            input_value = gift
                .price
                .checked_mul(input.quantity)
                .and_then(|v| input_value.checked_add(v))
                .ok_or_else(|| GachaError::InvalidQuantity(input.gift_id.clone()))?;
        }

        let success_chance = calculate_success_chance(input_value, target.price);
        let contract = UpgradeContract {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            inputs,
            input_value,
            target_gift_id: target.id.clone(),
            success_chance,
            status: ContractStatus::Pending,
            result_gift_id: None,
            created_at: chrono::Utc::now().timestamp(),
            resolved_at: None,
            proof: None,
        };

        self.ledger.atomically(|txn| {
            for input in &contract.inputs {
                let available = txn.inventory_quantity(user_id, &input.gift_id)?;
                if available < input.quantity {
                    return Err(GachaError::InsufficientInventory {
                        gift_id: input.gift_id.clone(),
                        needed: input.quantity,
                        available,
                    });
                }
            }
            txn.put_contract(&contract)
        })?;

        Ok(ContractQuote {
            contract_id: contract.id,
            success_chance,
            input_value,
        })
    }

    /// Resolve a pending contract: consume the inputs, run one Bernoulli trial
    /// at the frozen success chance and grant the target or a consolation gift.
    pub fn execute_upgrade_contract(&self, contract_id: &str) -> GachaResult<UpgradeOutcome> {
        let result = self.execute_contract_inner(contract_id);
        match &result {
            Ok(outcome) => info!(
                "Contract {} {} -> {}",
                contract_id,
                if outcome.success { "succeeded" } else { "failed" },
                outcome.result_gift.as_ref().map_or("nothing", |g| g.id.as_str())
            ),
            Err(e) => log_failure("Contract execution", contract_id, e),
        }
        result
    }

    fn execute_contract_inner(&self, contract_id: &str) -> GachaResult<UpgradeOutcome> {
        self.ledger.atomically(|txn| {
            let mut contract = txn
                .contract(contract_id)?
                .ok_or_else(|| GachaError::ContractNotFound(contract_id.to_string()))?;
            if contract.status.is_terminal() {
                return Err(GachaError::ContractAlreadyResolved(contract_id.to_string()));
            }
            let user_id = contract.user_id.clone();

            // Inventory may have changed since creation
            for input in &contract.inputs {
                txn.adjust_inventory(&user_id, &input.gift_id, -signed(input.quantity)?)?;
                txn.append_transaction(
                    &TransactionRecord::new(&user_id, TransactionKind::UpgradeInput)
                        .gift(&input.gift_id, -signed(input.quantity)?)
                        .reference(contract_id),
                )?;
            }

            let (mut rng, proof) = next_draw(txn, &user_id)?;
            let success = bernoulli(contract.success_chance, &mut rng);

            let result_gift = if success {
                let target = self
                    .catalog
                    .get_gift(&contract.target_gift_id)?
                    .ok_or_else(|| GachaError::TargetNotFound(contract.target_gift_id.clone()))?;
                Some(target)
            } else {
                let pool = self.consolation_pool(contract.input_value)?;
                pick_consolation(&self.config.consolation, contract.input_value, pool, &mut rng)
            };

            if let Some(gift) = &result_gift {
                let kind = if success {
                    TransactionKind::UpgradeReward
                } else {
                    TransactionKind::UpgradeConsolation
                };
                txn.adjust_inventory(&user_id, &gift.id, 1)?;
                txn.append_transaction(
                    &TransactionRecord::new(&user_id, kind)
                        .gift(&gift.id, 1)
                        .reference(contract_id),
                )?;
            }

            contract.status = if success {
                ContractStatus::Success
            } else {
                ContractStatus::Failed
            };
            contract.result_gift_id = result_gift.as_ref().map(|g| g.id.clone());
            contract.resolved_at = Some(chrono::Utc::now().timestamp());
            contract.proof = Some(proof.clone());
            txn.put_contract(&contract)?;

            Ok(UpgradeOutcome {
                contract_id: contract.id,
                success,
                result_gift,
                proof,
            })
        })
    }

    /// Catalog gifts inside the consolation band, cheapest first
    fn consolation_pool(&self, input_value: u64) -> GachaResult<Vec<Gift>> {
        let (min, max) = self.config.consolation.band(input_value);
        if min > max {
            return Ok(Vec::new());
        }
        self.catalog.gifts_in_range(min, max)
    }

    /// Catalog gifts worth 1.1x to 1.5x the input value, cheapest first
    pub fn upgrade_targets(&self, input_value: u64) -> GachaResult<Vec<Gift>> {
        let (min, max) = self.config.upgrade_targets.band(input_value);
        if min > max {
            return Ok(Vec::new());
        }
        self.catalog.gifts_in_range(min, max)
    }

    pub fn contract(&self, contract_id: &str) -> GachaResult<UpgradeContract> {
        self.ledger
            .view(|view| view.contract(contract_id))?
            .ok_or_else(|| GachaError::ContractNotFound(contract_id.to_string()))
    }

    /// Replay a resolved contract from its revealed server seed against the
    /// current catalog and consolation policy.
    pub fn verify_upgrade(
        &self,
        contract_id: &str,
        server_seed: &str,
    ) -> GachaResult<UpgradeVerification> {
        let contract = self.contract(contract_id)?;
        let proof = contract
            .proof
            .as_ref()
            .ok_or_else(|| GachaError::ContractPending(contract_id.to_string()))?;
        let commitment_valid = verify_commitment(&proof.server_seed_hash, server_seed);

        let pool = self.consolation_pool(contract.input_value)?;
        let replay = replay_upgrade_draw(&contract, server_seed, &pool, &self.config.consolation)?;
        let outcome_matches = replay.success == (contract.status == ContractStatus::Success)
            && replay.result_gift_id == contract.result_gift_id;

        debug!(
            "Verified contract {}: commitment {}, outcome {}",
            contract_id, commitment_valid, outcome_matches
        );
        Ok(UpgradeVerification {
            contract_id: contract.id,
            commitment_valid,
            replay,
            outcome_matches,
        })
    }
}

/// Pick a consolation gift from the band pool (cheapest first).
/// Only the most valuable candidates are considered; None for an empty pool.
fn pick_consolation<R: Rng + ?Sized>(
    policy: &ConsolationPolicy,
    input_value: u64,
    mut candidates: Vec<Gift>,
    rng: &mut R,
) -> Option<Gift> {
    candidates.reverse();
    candidates.truncate(policy.max_candidates.max(1));
    if candidates.is_empty() {
        debug!("No consolation candidates");
        return None;
    }

    let index = match policy.pick {
        ConsolationPick::Uniform => rng.gen_range(0..candidates.len()),
        ConsolationPick::Nearest => {
            let (min, max) = policy.band(input_value);
            let aim = rng.gen_range(min..=max);
            candidates
                .iter()
                .enumerate()
                .min_by_key(|(_, g)| g.price.abs_diff(aim))
                .map_or(0, |(i, _)| i)
        }
    };
    Some(candidates.swap_remove(index))
}

/// Recompute a resolved contract's trial and consolation pick from the
/// revealed server seed. `consolation_pool` must be the band pool the
/// contract was resolved against.
pub fn replay_upgrade_draw(
    contract: &UpgradeContract,
    server_seed: &str,
    consolation_pool: &[Gift],
    policy: &ConsolationPolicy,
) -> GachaResult<UpgradeReplay> {
    let proof = contract
        .proof
        .as_ref()
        .ok_or_else(|| GachaError::ContractPending(contract.id.clone()))?;
    let mut rng = derive_rng(server_seed, &proof.client_seed, proof.nonce);

    let success = bernoulli(contract.success_chance, &mut rng);
    let result_gift_id = if success {
        Some(contract.target_gift_id.clone())
    } else {
        let pool = consolation_pool.to_vec();
        pick_consolation(policy, contract.input_value, pool, &mut rng).map(|g| g.id)
    };
    Ok(UpgradeReplay {
        success,
        result_gift_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_chance_ratio() {
        assert_eq!(calculate_success_chance(5, 10), 0.5);
        assert_eq!(calculate_success_chance(10, 10), 0.9);
        assert_eq!(calculate_success_chance(20, 10), 0.9);
        assert_eq!(calculate_success_chance(1, 10), 0.1);
        assert_eq!(calculate_success_chance(0, 10), 0.1);
    }

    #[test]
    fn test_success_chance_quantized() {
        // 0.33.. rounds to 0.35, 0.26 rounds to 0.25
        assert_eq!(calculate_success_chance(1, 3), 0.35);
        assert_eq!(calculate_success_chance(26, 100), 0.25);
        for input in 0..200u64 {
            let chance = calculate_success_chance(input, 100);
            let steps = chance * 20.0;
            assert!((steps - steps.round()).abs() < 1e-9);
            assert!((0.1..=0.9).contains(&chance));
        }
    }

    #[test]
    fn test_success_chance_free_target() {
        assert_eq!(calculate_success_chance(0, 0), 0.9);
        assert_eq!(calculate_success_chance(100, 0), 0.9);
    }

    #[test]
    fn test_normalize_inputs() {
        assert_eq!(normalize_inputs(&[]), Err(GachaError::EmptyInputSet));
        assert_eq!(
            normalize_inputs(&[GiftQuantity::new("cake", 0)]),
            Err(GachaError::InvalidQuantity("cake".into()))
        );

        let merged = normalize_inputs(&[
            GiftQuantity::new("cake", 1),
            GiftQuantity::new("star", 2),
            GiftQuantity::new("cake", 3),
        ])
        .unwrap();
        assert_eq!(
            merged,
            vec![GiftQuantity::new("cake", 4), GiftQuantity::new("star", 2)]
        );
    }
}
