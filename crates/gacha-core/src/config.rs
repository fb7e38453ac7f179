//! ============================================================================
//! Engine Configuration
//! ============================================================================
//! Economic policy knobs that are product decisions rather than laws:
//! consolation band, free case rule, upgrade target band.
//! Loaded from the environment (after `.env`) with defaults for everything.
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default number of transactions returned by history queries
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// How a consolation gift is picked among the candidates in the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolationPick {
    /// Uniformly among the most valuable candidates
    Uniform,
    /// Candidate closest to a value drawn uniformly inside the band
    Nearest,
}

impl ConsolationPick {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "uniform" => Some(Self::Uniform),
            "nearest" => Some(Self::Nearest),
            _ => None,
        }
    }
}

/// Consolation gift policy for failed upgrades
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolationPolicy {
    /// Lower band bound as a fraction of the input value
    pub min_fraction: f64,
    /// Upper band bound as a fraction of the input value
    pub max_fraction: f64,
    /// Only the most valuable N candidates in the band are considered
    pub max_candidates: usize,
    pub pick: ConsolationPick,
}

impl Default for ConsolationPolicy {
    fn default() -> Self {
        Self {
            min_fraction: 0.1,
            max_fraction: 0.3,
            max_candidates: 5,
            pick: ConsolationPick::Uniform,
        }
    }
}

impl ConsolationPolicy {
    /// Inclusive nanoTON band for an input value
    pub fn band(&self, input_value: u64) -> (u64, u64) {
        scaled_band(input_value, self.min_fraction, self.max_fraction)
    }
}

/// Price band, as multiples of the input value, offered as upgrade targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeTargetBand {
    pub min_multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for UpgradeTargetBand {
    fn default() -> Self {
        Self {
            min_multiplier: 1.1,
            max_multiplier: 1.5,
        }
    }
}

impl UpgradeTargetBand {
    pub fn band(&self, input_value: u64) -> (u64, u64) {
        scaled_band(input_value, self.min_multiplier, self.max_multiplier)
    }
}

/// Float products are snapped within this many nanoTON of an integer
const BAND_EPSILON: f64 = 1e-6;

fn scaled_band(value: u64, low: f64, high: f64) -> (u64, u64) {
    let v = value as f64;
    let min = (v * low - BAND_EPSILON).ceil().max(0.0) as u64;
    let max = (v * high + BAND_EPSILON).floor().max(0.0) as u64;
    (min, max)
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GachaConfig {
    /// Database path, None for GACHA_DB_PATH or ~/.gacha/gacha.redb
    pub db_path: Option<String>,
    /// Price-0 cases may be opened once per user
    pub free_case_once_per_user: bool,
    pub consolation: ConsolationPolicy,
    pub upgrade_targets: UpgradeTargetBand,
    pub history_limit: usize,
}

impl Default for GachaConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            free_case_once_per_user: false,
            consolation: ConsolationPolicy::default(),
            upgrade_targets: UpgradeTargetBand::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl GachaConfig {
    /// Defaults overridden by GACHA_* environment variables.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("GACHA_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(path);
        }
        if let Some(v) = parse_var(&lookup, "GACHA_FREE_CASE_ONCE", parse_bool) {
            config.free_case_once_per_user = v;
        }
        if let Some(v) = parse_var(&lookup, "GACHA_CONSOLATION_MIN", parse_fraction) {
            config.consolation.min_fraction = v;
        }
        if let Some(v) = parse_var(&lookup, "GACHA_CONSOLATION_MAX", parse_fraction) {
            config.consolation.max_fraction = v;
        }
        if let Some(v) = parse_var(&lookup, "GACHA_CONSOLATION_CANDIDATES", |s| {
            s.parse::<usize>().ok().filter(|n| *n > 0)
        }) {
            config.consolation.max_candidates = v;
        }
        if let Some(v) = parse_var(&lookup, "GACHA_CONSOLATION_PICK", ConsolationPick::from_str) {
            config.consolation.pick = v;
        }
        if let Some(v) = parse_var(&lookup, "GACHA_HISTORY_LIMIT", |s| {
            s.parse::<usize>().ok().filter(|n| *n > 0)
        }) {
            config.history_limit = v;
        }

        if config.consolation.min_fraction > config.consolation.max_fraction {
            warn!(
                "Consolation band {}..{} is inverted, using defaults",
                config.consolation.min_fraction, config.consolation.max_fraction
            );
            let defaults = ConsolationPolicy::default();
            config.consolation.min_fraction = defaults.min_fraction;
            config.consolation.max_fraction = defaults.max_fraction;
        }

        config
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!("Ignoring invalid {}='{}'", key, raw);
    }
    parsed
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_fraction(s: &str) -> Option<f64> {
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && (0.0..=1.0).contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> GachaConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GachaConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert!(config.db_path.is_none());
        assert!(!config.free_case_once_per_user);
        assert_eq!(config.consolation.max_candidates, 5);
        assert_eq!(config.consolation.pick, ConsolationPick::Uniform);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("GACHA_DB_PATH", "/tmp/g.redb"),
            ("GACHA_FREE_CASE_ONCE", "yes"),
            ("GACHA_CONSOLATION_MIN", "0.2"),
            ("GACHA_CONSOLATION_MAX", "0.4"),
            ("GACHA_CONSOLATION_PICK", "Nearest"),
            ("GACHA_HISTORY_LIMIT", "10"),
        ]);
        assert_eq!(config.db_path.as_deref(), Some("/tmp/g.redb"));
        assert!(config.free_case_once_per_user);
        assert_eq!(config.consolation.min_fraction, 0.2);
        assert_eq!(config.consolation.max_fraction, 0.4);
        assert_eq!(config.consolation.pick, ConsolationPick::Nearest);
        assert_eq!(config.history_limit, 10);
    }

    #[test]
    fn test_invalid_values_ignored() {
        let config = config_from(&[
            ("GACHA_FREE_CASE_ONCE", "maybe"),
            ("GACHA_CONSOLATION_MIN", "1.5"),
            ("GACHA_CONSOLATION_CANDIDATES", "0"),
        ]);
        assert!(!config.free_case_once_per_user);
        assert_eq!(config.consolation.min_fraction, 0.1);
        assert_eq!(config.consolation.max_candidates, 5);
    }

    #[test]
    fn test_inverted_band_reset() {
        let config = config_from(&[
            ("GACHA_CONSOLATION_MIN", "0.5"),
            ("GACHA_CONSOLATION_MAX", "0.2"),
        ]);
        assert_eq!(config.consolation.min_fraction, 0.1);
        assert_eq!(config.consolation.max_fraction, 0.3);
    }

    #[test]
    fn test_bands() {
        let policy = ConsolationPolicy::default();
        assert_eq!(policy.band(5_000_000_000), (500_000_000, 1_500_000_000));

        let targets = UpgradeTargetBand::default();
        assert_eq!(targets.band(10_000_000_000), (11_000_000_000, 15_000_000_000));
    }
}
