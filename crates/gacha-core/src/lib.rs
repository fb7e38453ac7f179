//! ============================================================================
//! GACHA-CORE: Reward Resolution Engine
//! ============================================================================
//! Backend logic for a Telegram-gift case platform:
//! - Case openings with weighted draws over a catalog reward table
//! - Two-phase upgrade contracts with a consolation fallback
//! - Commit-reveal seed chains so every draw can be replayed
//! - Atomic balance and inventory ledger on embedded redb storage
//! ============================================================================

pub mod catalog;
pub mod config;
pub mod db;
pub mod fairness;
pub mod ledger;
pub mod resolver;
pub mod service;
pub mod types;

// Re-export main types for convenience
pub use types::*;
pub use catalog::{validate_catalog, CatalogFile, InMemoryCatalog, RewardCatalog};
pub use config::{ConsolationPick, ConsolationPolicy, GachaConfig, UpgradeTargetBand};
pub use db::GachaDb;
pub use ledger::{Ledger, LedgerTxn, LedgerView};
pub use resolver::{calculate_success_chance, replay_case_draw, replay_upgrade_draw, Resolver};
pub use service::GachaService;
