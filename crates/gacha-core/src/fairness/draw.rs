//! ============================================================================
//! Weighted Draw - Proportional selection over an ordered outcome table
//! ============================================================================

use rand::Rng;

use crate::types::{GachaError, GachaResult};

/// Draw one outcome with probability `weight_i / sum(weights)`.
///
/// Outcomes are scanned in list order and the first one whose cumulative
/// weight reaches the uniform draw wins. If floating point drift leaves the
/// draw past the final cumulative sum, the last outcome is returned.
pub fn weighted_draw<'a, T, R: Rng + ?Sized>(
    outcomes: &'a [(T, f64)],
    rng: &mut R,
) -> GachaResult<&'a T> {
    let total = validate_weights(outcomes)?;

    let r = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    for (outcome, weight) in outcomes {
        cumulative += weight;
        if r <= cumulative {
            return Ok(outcome);
        }
    }

    // Unreachable in exact arithmetic
    let (last, _) = &outcomes[outcomes.len() - 1];
    Ok(last)
}

/// Single Bernoulli trial with success probability `p`
pub fn bernoulli<R: Rng + ?Sized>(p: f64, rng: &mut R) -> bool {
    if !p.is_finite() || p <= 0.0 {
        return false;
    }
    if p >= 1.0 {
        return true;
    }
    rng.gen::<f64>() < p
}

/// Check a reward table and return the sum of its weights
pub fn validate_weights<T>(outcomes: &[(T, f64)]) -> GachaResult<f64> {
    if outcomes.is_empty() {
        return Err(GachaError::ConfigurationError(
            "reward table is empty".to_string(),
        ));
    }
    if let Some(position) = outcomes
        .iter()
        .position(|(_, w)| !w.is_finite() || *w <= 0.0)
    {
        return Err(GachaError::ConfigurationError(format!(
            "reward weight at position {} must be finite and > 0",
            position
        )));
    }

    let total: f64 = outcomes.iter().map(|(_, w)| w).sum();
    if !total.is_finite() {
        return Err(GachaError::ConfigurationError(
            "reward weights overflow".to_string(),
        ));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_empty_table_is_configuration_error() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let table: Vec<(&str, f64)> = vec![];
        assert!(matches!(
            weighted_draw(&table, &mut rng),
            Err(GachaError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_non_positive_weights_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let table = vec![("a", 1.0), ("b", bad)];
            assert!(
                weighted_draw(&table, &mut rng).is_err(),
                "weight {} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_single_outcome_always_wins() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let table = vec![("only", 0.25)];
        for _ in 0..1000 {
            assert_eq!(*weighted_draw(&table, &mut rng).unwrap(), "only");
        }
    }

    #[test]
    fn test_draw_is_deterministic_for_seed() {
        let table = vec![("a", 50.0), ("b", 30.0), ("c", 15.0), ("d", 5.0)];
        let mut first = ChaCha20Rng::seed_from_u64(42);
        let mut second = ChaCha20Rng::seed_from_u64(42);
        for _ in 0..200 {
            assert_eq!(
                weighted_draw(&table, &mut first).unwrap(),
                weighted_draw(&table, &mut second).unwrap()
            );
        }
    }

    #[test]
    fn test_frequencies_match_weights_chi_squared() {
        let table = vec![(0usize, 50.0), (1, 30.0), (2, 15.0), (3, 5.0)];
        let total: f64 = table.iter().map(|(_, w)| w).sum();
        let draws = 100_000;
        let mut counts = [0u64; 4];

        let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);
        for _ in 0..draws {
            counts[*weighted_draw(&table, &mut rng).unwrap()] += 1;
        }

        let chi_squared: f64 = table
            .iter()
            .map(|(i, w)| {
                let expected = draws as f64 * w / total;
                let diff = counts[*i] as f64 - expected;
                diff * diff / expected
            })
            .sum();

        // Critical value for 3 degrees of freedom at p = 0.001
        assert!(
            chi_squared < 16.27,
            "chi-squared {} too large, counts {:?}",
            chi_squared,
            counts
        );
    }

    #[test]
    fn test_bernoulli_bounds() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        assert!(!bernoulli(0.0, &mut rng));
        assert!(!bernoulli(f64::NAN, &mut rng));
        assert!(bernoulli(1.0, &mut rng));

        let hits = (0..20_000).filter(|_| bernoulli(0.25, &mut rng)).count();
        let rate = hits as f64 / 20_000.0;
        assert!((rate - 0.25).abs() < 0.02, "rate {}", rate);
    }
}
