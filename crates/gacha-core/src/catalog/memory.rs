//! ============================================================================
//! In-Memory Catalog - JSON catalog files and validation
//! ============================================================================

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::{sort_by_price, sort_cases, validate_catalog, RewardCatalog};
use crate::types::{Case, GachaResult, Gift};

/// On-disk catalog format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub gifts: Vec<Gift>,
    pub cases: Vec<Case>,
}

impl CatalogFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse catalog JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        Self::from_json(&raw)
    }
}

/// Catalog held in memory, validated on construction
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    gifts: BTreeMap<String, Gift>,
    cases: BTreeMap<String, Case>,
}

impl InMemoryCatalog {
    /// Build from a catalog file, rejecting it if validation finds problems
    pub fn from_file(file: CatalogFile) -> Result<Self> {
        let problems = validate_catalog(&file.gifts, &file.cases);
        if !problems.is_empty() {
            return Err(anyhow!("Invalid catalog:\n  {}", problems.join("\n  ")));
        }

        info!(
            "Loaded catalog with {} gifts and {} cases",
            file.gifts.len(),
            file.cases.len()
        );

        Ok(Self {
            gifts: file.gifts.into_iter().map(|g| (g.id.clone(), g)).collect(),
            cases: file.cases.into_iter().map(|c| (c.id.clone(), c)).collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_file(CatalogFile::load(path)?)
    }

    pub fn gifts(&self) -> impl Iterator<Item = &Gift> {
        self.gifts.values()
    }

    pub fn cases(&self) -> impl Iterator<Item = &Case> {
        self.cases.values()
    }
}

impl RewardCatalog for InMemoryCatalog {
    fn get_case(&self, case_id: &str) -> GachaResult<Option<Case>> {
        Ok(self.cases.get(case_id).cloned())
    }

    fn get_gift(&self, gift_id: &str) -> GachaResult<Option<Gift>> {
        Ok(self.gifts.get(gift_id).cloned())
    }

    fn gifts_in_range(&self, min: u64, max: u64) -> GachaResult<Vec<Gift>> {
        let mut gifts: Vec<Gift> = self
            .gifts
            .values()
            .filter(|g| g.price >= min && g.price <= max)
            .cloned()
            .collect();
        sort_by_price(&mut gifts);
        Ok(gifts)
    }

    fn list_cases(&self) -> GachaResult<Vec<Case>> {
        let mut cases: Vec<Case> = self.cases.values().filter(|c| c.is_active).cloned().collect();
        sort_cases(&mut cases);
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "gifts": [
            {"id": "star", "name": "Green Star", "price": 1500000000, "rarity": "rare"},
            {"id": "cake", "name": "Delicious Cake", "price": 500000000, "rarity": "common"},
            {"id": "premium", "name": "Telegram Premium", "price": 5000000000, "rarity": "legendary"}
        ],
        "cases": [
            {"id": "basic", "name": "Basic", "price": 500000000,
             "rewards": [{"gift_id": "cake", "weight": 90}, {"gift_id": "star", "weight": 10}]},
            {"id": "retired", "name": "Retired", "price": 0, "is_active": false,
             "rewards": [{"gift_id": "cake", "weight": 1}]}
        ]
    }"#;

    #[test]
    fn test_load_and_query() {
        let catalog = InMemoryCatalog::from_file(CatalogFile::from_json(CATALOG).unwrap()).unwrap();

        let basic = catalog.get_case("basic").unwrap().unwrap();
        assert!(basic.is_active);
        assert_eq!(basic.rewards.len(), 2);
        assert!(catalog.get_gift("nope").unwrap().is_none());

        let mid: Vec<String> = catalog
            .gifts_in_range(500_000_000, 1_500_000_000)
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(mid, vec!["cake", "star"]);

        let active: Vec<String> = catalog.list_cases().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(active, vec!["basic"]);
    }

    #[test]
    fn test_invalid_catalog_rejected() {
        let file = CatalogFile::from_json(
            r#"{"gifts": [], "cases": [{"id": "x", "name": "X", "price": 1, "rewards": []}]}"#,
        )
        .unwrap();
        let err = InMemoryCatalog::from_file(file).unwrap_err();
        assert!(err.to_string().contains("Invalid catalog"));
    }

    #[test]
    fn test_shipped_catalog_is_valid() {
        let file = CatalogFile::from_json(include_str!("../../../../data/catalog.json")).unwrap();
        let catalog = InMemoryCatalog::from_file(file).unwrap();

        let ids: Vec<String> = catalog.list_cases().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["demo", "basic", "premium", "luxury"]);
        assert!(catalog.get_case("demo").unwrap().unwrap().is_free());
    }
}
