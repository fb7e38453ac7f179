//! ============================================================================
//! Seed Chain - Commit-reveal randomness per user
//! ============================================================================
//! The server seed stays secret while its SHA-256 is published. Every draw
//! consumes one nonce:
//!
//! ```text
//! rng_seed[n] = sha256(server_seed || ":" || client_seed || ":" || n)
//! commitment  = sha256(server_seed)
//! ```
//!
//! Rotating reveals the old server seed so past outcomes can be replayed.
//! ============================================================================

use rand::rngs::OsRng;
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::DrawProof;

/// Length of a server seed in bytes
pub const SERVER_SEED_LEN: usize = 32;

/// Client seed assigned when the user has not chosen one
pub const DEFAULT_CLIENT_SEED: &str = "giftbox";

/// Per-user seed chain persisted in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedState {
    /// Hex-encoded secret server seed
    pub server_seed: String,
    pub client_seed: String,
    /// Next nonce to use
    pub nonce: u64,
    pub created_at: i64,
}

impl SeedState {
    /// Fresh chain with a server seed from the OS CSPRNG
    pub fn generate(client_seed: &str) -> Self {
        let mut bytes = [0u8; SERVER_SEED_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self {
            server_seed: hex::encode(bytes),
            client_seed: client_seed.to_string(),
            nonce: 0,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Published commitment for this chain
    pub fn commitment(&self) -> String {
        commit_server_seed(&self.server_seed)
    }

    /// Derive the RNG for the current nonce and advance the chain.
    /// The caller must persist the advanced state with the draw outcome.
    pub fn next_draw(&mut self) -> (ChaCha20Rng, DrawProof) {
        let rng = derive_rng(&self.server_seed, &self.client_seed, self.nonce);
        let proof = DrawProof {
            server_seed_hash: self.commitment(),
            client_seed: self.client_seed.clone(),
            nonce: self.nonce,
        };
        self.nonce += 1;
        (rng, proof)
    }
}

/// SHA-256 of the server seed, hex-encoded
pub fn commit_server_seed(server_seed: &str) -> String {
    hex::encode(Sha256::digest(server_seed.as_bytes()))
}

/// Check a revealed server seed against its earlier commitment
pub fn verify_commitment(server_seed_hash: &str, revealed_server_seed: &str) -> bool {
    commit_server_seed(revealed_server_seed).eq_ignore_ascii_case(server_seed_hash.trim())
}

/// Deterministic RNG for one draw of a seed chain
pub fn derive_rng(server_seed: &str, client_seed: &str, nonce: u64) -> ChaCha20Rng {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hasher.update(b":");
    hasher.update(client_seed.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    ChaCha20Rng::from_seed(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_generated_seeds_are_unique() {
        let a = SeedState::generate(DEFAULT_CLIENT_SEED);
        let b = SeedState::generate(DEFAULT_CLIENT_SEED);
        assert_ne!(a.server_seed, b.server_seed);
        assert_eq!(a.server_seed.len(), SERVER_SEED_LEN * 2);
        assert_eq!(a.nonce, 0);
    }

    #[test]
    fn test_commitment_verifies_reveal() {
        let state = SeedState::generate("alice");
        let commitment = state.commitment();
        assert!(verify_commitment(&commitment, &state.server_seed));
        assert!(verify_commitment(&commitment.to_uppercase(), &state.server_seed));
        assert!(!verify_commitment(&commitment, "not-the-seed"));
    }

    #[test]
    fn test_next_draw_advances_nonce() {
        let mut state = SeedState::generate("alice");
        let (_, first) = state.next_draw();
        let (_, second) = state.next_draw();
        assert_eq!(first.nonce, 0);
        assert_eq!(second.nonce, 1);
        assert_eq!(state.nonce, 2);
        assert_eq!(first.server_seed_hash, state.commitment());
    }

    #[test]
    fn test_rng_is_reproducible_from_reveal() {
        let mut state = SeedState::generate("bob");
        let (mut live, proof) = state.next_draw();
        let mut replay = derive_rng(&state.server_seed, &proof.client_seed, proof.nonce);
        assert_eq!(live.gen::<u64>(), replay.gen::<u64>());

        let mut other_nonce = derive_rng(&state.server_seed, &proof.client_seed, proof.nonce + 1);
        let mut again = derive_rng(&state.server_seed, &proof.client_seed, proof.nonce);
        assert_ne!(other_nonce.gen::<u64>(), again.gen::<u64>());
    }
}
