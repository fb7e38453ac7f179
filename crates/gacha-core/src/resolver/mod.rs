//! ============================================================================
//! Resolver - Case openings, upgrade contracts and account operations
//! ============================================================================
//! Every mutating operation is a single `Ledger::atomically` call:
//! - preconditions are checked against the transaction's own reads
//! - randomness is drawn from the user's seed chain inside the transaction
//! - balance, inventory, audit records and the advanced nonce commit together
//!
//! A rejected operation leaves no trace: no debit, no inventory change, no
//! transaction record and no consumed nonce.
//! ============================================================================

mod account;
mod case;
mod upgrade;


pub use case::replay_case_draw;
pub use upgrade::{calculate_success_chance, replay_upgrade_draw};

use std::sync::Arc;

use rand_chacha::ChaCha20Rng;
use tracing::{info, warn};

use crate::catalog::RewardCatalog;
use crate::config::GachaConfig;
use crate::fairness::{SeedState, DEFAULT_CLIENT_SEED};
use crate::ledger::{Ledger, LedgerTxn};
use crate::types::{DrawProof, GachaError, GachaResult};

/// Reward resolution engine over an injected ledger and catalog
pub struct Resolver<L, C> {
    ledger: Arc<L>,
    catalog: Arc<C>,
    config: GachaConfig,
}

impl<L: Ledger, C: RewardCatalog> Resolver<L, C> {
    pub fn new(ledger: Arc<L>, catalog: Arc<C>, config: GachaConfig) -> Self {
        Self {
            ledger,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &GachaConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }
}

/// Take the next draw of a user's seed chain, creating the chain on first use.
/// The advanced nonce is written through the same transaction as the outcome.
fn next_draw(txn: &mut dyn LedgerTxn, user_id: &str) -> GachaResult<(ChaCha20Rng, DrawProof)> {
    let mut state = match txn.seed_state(user_id)? {
        Some(state) => state,
        None => SeedState::generate(DEFAULT_CLIENT_SEED),
    };
    let draw = state.next_draw();
    txn.put_seed_state(user_id, &state)?;
    Ok(draw)
}

/// Ledger deltas are signed
fn signed(amount: u64) -> GachaResult<i64> {
    i64::try_from(amount)
        .map_err(|_| GachaError::Internal(format!("amount {} exceeds ledger range", amount)))
}

/// Log a rejected or failed operation at a level matching its cause
fn log_failure(operation: &str, subject: &str, error: &GachaError) {
    if error.is_user_error() {
        info!("{} rejected for {}: {}", operation, subject, error);
    } else {
        warn!("{} failed for {}: {}", operation, subject, error);
    }
}
