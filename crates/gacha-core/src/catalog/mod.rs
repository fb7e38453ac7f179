//! ============================================================================
//! Reward Catalog - Read-only gifts and cases consumed by the resolvers
//! ============================================================================
//! Catalog data is written by an operator import and never mutated at
//! resolution time. Two implementations exist:
//! - `InMemoryCatalog`: loaded from a JSON catalog file, used for validation
//! - `GachaDb`: the embedded database (see `crate::db`)
//! ============================================================================

mod memory;

pub use memory::{CatalogFile, InMemoryCatalog};

use std::collections::HashSet;

use crate::fairness::validate_weights;
use crate::types::{Case, GachaResult, Gift};

/// Read-only catalog access
pub trait RewardCatalog: Send + Sync {
    fn get_case(&self, case_id: &str) -> GachaResult<Option<Case>>;

    fn get_gift(&self, gift_id: &str) -> GachaResult<Option<Gift>>;

    /// Gifts with `min <= price <= max`, ascending by price then id
    fn gifts_in_range(&self, min: u64, max: u64) -> GachaResult<Vec<Gift>>;

    /// Active cases, ascending by price then id
    fn list_cases(&self) -> GachaResult<Vec<Case>>;
}

/// Validate a full catalog: unique ids, resolvable rewards, positive weights.
/// Returns every problem found rather than stopping at the first.
pub fn validate_catalog(gifts: &[Gift], cases: &[Case]) -> Vec<String> {
    let mut problems = Vec::new();

    let mut gift_ids = HashSet::new();
    for gift in gifts {
        if gift.id.is_empty() {
            problems.push(format!("gift '{}' has an empty id", gift.name));
        }
        if !gift_ids.insert(gift.id.as_str()) {
            problems.push(format!("duplicate gift id '{}'", gift.id));
        }
    }

    let mut case_ids = HashSet::new();
    for case in cases {
        if !case_ids.insert(case.id.as_str()) {
            problems.push(format!("duplicate case id '{}'", case.id));
        }

        let table: Vec<(&str, f64)> = case
            .rewards
            .iter()
            .map(|r| (r.gift_id.as_str(), r.weight))
            .collect();
        if let Err(e) = validate_weights(&table) {
            problems.push(format!("case '{}': {}", case.id, e));
        }

        for reward in &case.rewards {
            if !gift_ids.contains(reward.gift_id.as_str()) {
                problems.push(format!(
                    "case '{}' references unknown gift '{}'",
                    case.id, reward.gift_id
                ));
            }
        }
    }

    problems
}

/// Sort gifts the way `gifts_in_range` promises
pub(crate) fn sort_by_price(gifts: &mut [Gift]) {
    gifts.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
}

/// Sort cases the way `list_cases` promises
pub(crate) fn sort_cases(cases: &mut [Case]) {
    cases.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CaseReward, Rarity};

    fn gift(id: &str, price: u64) -> Gift {
        Gift {
            id: id.to_string(),
            name: id.to_string(),
            price,
            rarity: Rarity::Common,
            media: String::new(),
        }
    }

    fn case(id: &str, rewards: Vec<(&str, f64)>) -> Case {
        Case {
            id: id.to_string(),
            name: id.to_string(),
            price: 10,
            is_active: true,
            rewards: rewards
                .into_iter()
                .map(|(g, w)| CaseReward {
                    gift_id: g.to_string(),
                    weight: w,
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_catalog_has_no_problems() {
        let gifts = vec![gift("cake", 1), gift("star", 5)];
        let cases = vec![case("basic", vec![("cake", 90.0), ("star", 10.0)])];
        assert!(validate_catalog(&gifts, &cases).is_empty());
    }

    #[test]
    fn test_catalog_problems_are_collected() {
        let gifts = vec![gift("cake", 1), gift("cake", 2)];
        let cases = vec![
            case("empty", vec![]),
            case("ghost", vec![("unicorn", 1.0)]),
            case("zero", vec![("cake", 0.0)]),
        ];
        let problems = validate_catalog(&gifts, &cases);
        assert_eq!(problems.len(), 4, "{:?}", problems);
        assert!(problems.iter().any(|p| p.contains("duplicate gift id 'cake'")));
        assert!(problems.iter().any(|p| p.contains("unknown gift 'unicorn'")));
    }
}
