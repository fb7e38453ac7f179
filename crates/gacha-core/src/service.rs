//! ============================================================================
//! Gacha Service - Async facade over the resolver
//! ============================================================================
//! Resolver operations block on embedded storage, so each call runs on the
//! blocking pool. Concurrent requests are serialized by the ledger's write
//! transactions, never by a lock held here.
//! ============================================================================

use std::sync::Arc;

use crate::catalog::RewardCatalog;
use crate::ledger::Ledger;
use crate::resolver::Resolver;
use crate::types::{
    Balance, Case, CaseOpening, ContractQuote, DrawProof, GachaError, GachaResult, Gift,
    GiftQuantity, InventoryItem, RecentWin, SeedReveal, TransactionRecord, UpgradeOutcome,
    UpgradeVerification,
};

/// Cloneable handle shared across request handlers
pub struct GachaService<L, C> {
    resolver: Arc<Resolver<L, C>>,
}

impl<L, C> Clone for GachaService<L, C> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<L, C> GachaService<L, C>
where
    L: Ledger + 'static,
    C: RewardCatalog + 'static,
{
    pub fn new(resolver: Resolver<L, C>) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }

    pub fn resolver(&self) -> &Resolver<L, C> {
        &self.resolver
    }

    async fn run<T, F>(&self, op: F) -> GachaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Resolver<L, C>) -> GachaResult<T> + Send + 'static,
    {
        let resolver = Arc::clone(&self.resolver);
        tokio::task::spawn_blocking(move || op(&*resolver))
            .await
            .map_err(|e| GachaError::Internal(format!("Resolver task failed: {}", e)))?
    }

    pub async fn open_case(&self, user_id: String, case_id: String) -> GachaResult<CaseOpening> {
        self.run(move |r| r.open_case(&user_id, &case_id)).await
    }

    pub async fn create_upgrade_contract(
        &self,
        user_id: String,
        inputs: Vec<GiftQuantity>,
        target_gift_id: String,
    ) -> GachaResult<ContractQuote> {
        self.run(move |r| r.create_upgrade_contract(&user_id, &inputs, &target_gift_id))
            .await
    }

    pub async fn execute_upgrade_contract(&self, contract_id: String) -> GachaResult<UpgradeOutcome> {
        self.run(move |r| r.execute_upgrade_contract(&contract_id)).await
    }

    pub async fn deposit(&self, user_id: String, amount: u64) -> GachaResult<Balance> {
        self.run(move |r| r.deposit(&user_id, amount)).await
    }

    pub async fn withdraw(&self, user_id: String, amount: u64) -> GachaResult<Balance> {
        self.run(move |r| r.withdraw(&user_id, amount)).await
    }

    pub async fn sell_gift(
        &self,
        user_id: String,
        gift_id: String,
        quantity: u64,
    ) -> GachaResult<Balance> {
        self.run(move |r| r.sell_gift(&user_id, &gift_id, quantity)).await
    }

    pub async fn balance(&self, user_id: String) -> GachaResult<Balance> {
        self.run(move |r| r.balance(&user_id)).await
    }

    pub async fn inventory(&self, user_id: String) -> GachaResult<Vec<InventoryItem>> {
        self.run(move |r| r.inventory(&user_id)).await
    }

    pub async fn history(&self, user_id: String) -> GachaResult<Vec<TransactionRecord>> {
        self.run(move |r| r.history(&user_id)).await
    }

    pub async fn list_cases(&self) -> GachaResult<Vec<Case>> {
        self.run(|r| r.list_cases()).await
    }

    pub async fn recent_wins(&self, limit: usize) -> GachaResult<Vec<RecentWin>> {
        self.run(move |r| r.recent_wins(limit)).await
    }

    pub async fn verify_upgrade(
        &self,
        contract_id: String,
        server_seed: String,
    ) -> GachaResult<UpgradeVerification> {
        self.run(move |r| r.verify_upgrade(&contract_id, &server_seed)).await
    }

    pub async fn upgrade_targets(&self, input_value: u64) -> GachaResult<Vec<Gift>> {
        self.run(move |r| r.upgrade_targets(input_value)).await
    }

    pub async fn seed_commitment(&self, user_id: String) -> GachaResult<DrawProof> {
        self.run(move |r| r.seed_commitment(&user_id)).await
    }

    pub async fn rotate_seed(
        &self,
        user_id: String,
        client_seed: Option<String>,
    ) -> GachaResult<SeedReveal> {
        self.run(move |r| r.rotate_seed(&user_id, client_seed.as_deref()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogFile;
    use crate::config::GachaConfig;
    use crate::db::GachaDb;
    use crate::types::{CaseReward, Rarity, NANO_PER_TON};

    fn service() -> GachaService<GachaDb, GachaDb> {
        let db = Arc::new(GachaDb::open_in_memory().unwrap());
        db.import_catalog(&CatalogFile {
            gifts: vec![Gift {
                id: "cake".into(),
                name: "Delicious Cake".into(),
                price: NANO_PER_TON,
                rarity: Rarity::Common,
                media: String::new(),
            }],
            cases: vec![Case {
                id: "basic".into(),
                name: "Basic".into(),
                price: NANO_PER_TON,
                is_active: true,
                rewards: vec![CaseReward {
                    gift_id: "cake".into(),
                    weight: 1.0,
                }],
            }],
        })
        .unwrap();
        GachaService::new(Resolver::new(db.clone(), db, GachaConfig::default()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_opens_never_overdraw() {
        let service = service();
        // Enough for 10 opens plus change
        let funded = 10 * NANO_PER_TON + NANO_PER_TON / 2;
        service.deposit("u1".into(), funded).await.unwrap();

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.open_case("u1".into(), "basic".into()).await })
            })
            .collect();

        let mut opened = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => opened += 1,
                Err(e) => assert!(matches!(e, GachaError::InsufficientFunds { .. }), "{}", e),
            }
        }

        assert_eq!(opened, 10);
        let balance = service.balance("u1".into()).await.unwrap();
        assert_eq!(balance.amount, NANO_PER_TON / 2);
        let inventory = service.inventory("u1".into()).await.unwrap();
        assert_eq!(inventory[0].quantity, 10);
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let service = service();
        service.deposit("u1".into(), NANO_PER_TON).await.unwrap();

        let commitment = service.seed_commitment("u1".into()).await.unwrap();
        let opening = service.open_case("u1".into(), "basic".into()).await.unwrap();
        assert_eq!(opening.gift.id, "cake");
        assert_eq!(opening.proof.server_seed_hash, commitment.server_seed_hash);

        let balance = service.sell_gift("u1".into(), "cake".into(), 1).await.unwrap();
        assert_eq!(balance.amount, NANO_PER_TON);
        assert_eq!(service.history("u1".into()).await.unwrap().len(), 4);
        assert_eq!(service.list_cases().await.unwrap().len(), 1);
        assert_eq!(service.recent_wins(5).await.unwrap()[0].user_id, "u1");
    }
}
