//! ============================================================================
//! Fairness Module - Server-side randomness for every payout
//! ============================================================================
//! All draws happen here, behind the ledger transaction that records them.
//!
//! ## Pieces
//! - **draw**: weighted selection and Bernoulli trials over any `Rng`
//! - **seed**: per-user commit-reveal seed chain producing `ChaCha20Rng`s
//!
//! ## Usage
//! ```rust,ignore
//! use gacha_core::fairness::{weighted_draw, SeedState};
//!
//! let mut chain = SeedState::generate("client-seed");
//! let (mut rng, proof) = chain.next_draw();
//! let gift = weighted_draw(&table, &mut rng)?;
//! ```
//! ============================================================================

mod draw;
mod seed;

pub use draw::{bernoulli, validate_weights, weighted_draw};
pub use seed::{
    commit_server_seed, derive_rng, verify_commitment, SeedState, DEFAULT_CLIENT_SEED,
    SERVER_SEED_LEN,
};
