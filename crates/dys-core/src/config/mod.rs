//! Process-wide, read-only hyperparameters for the adaptive screening core.
//!
//! There is no on-disk config format here (§1 scopes persistence and
//! delivery concerns out): a `Config` is an immutable value the host
//! application builds once, typically via [`Config::default`], and hands
//! to every session. Nothing in this crate mutates a `Config` after
//! construction.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A screening module identifier, e.g. `"phonemic_awareness"`.
pub type ModuleId = String;

/// Immutable hyperparameters shared by every session.
///
/// Field order mirrors the component design in §4.A: administration order,
/// the latent-ability grid, item-response parameters, RT/fatigue
/// thresholds, stopping thresholds, and risk-aggregation weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Modules administered, in cyclic scan order.
    pub modules: Vec<ModuleId>,

    /// Human-readable label for each module, used only in the explanation
    /// object returned by risk aggregation.
    pub module_labels: BTreeMap<ModuleId, String>,

    /// Discrete latent-ability grid shared by every module's posterior.
    pub theta_grid: Vec<f64>,

    /// Threshold below which `theta` is classified "weak".
    pub theta_weak_threshold: f64,

    /// Per-module item-response discrimination parameter `a`.
    pub item_discrimination: BTreeMap<ModuleId, f64>,

    /// A correct response slower than `slow_rt_factor * max_time_seconds`
    /// is flagged as a slow-correct response.
    pub slow_rt_factor: f64,

    /// An incorrect response faster than `rapid_guess_fraction *
    /// max_time_seconds` is flagged as a rapid guess.
    pub rapid_guess_fraction: f64,

    /// Linear fatigue decay per minute of test time.
    pub fatigue_slope: f64,

    /// Floor below which the fatigue factor never decays.
    pub min_fatigue_factor: f64,

    /// Minimum administered items before a module is eligible to settle.
    pub min_items_per_module: u32,

    /// Global stop condition S1: total administered items across all
    /// modules.
    pub max_items_total: u32,

    /// Global stop condition S2: total elapsed test time, in minutes.
    pub max_test_time_minutes: f64,

    /// Confidence threshold `max(p_weak, p_strong)` a module must clear to
    /// be considered settled.
    pub p_confident: f64,

    /// Entropy threshold (bits) a module's posterior must fall under to be
    /// considered settled.
    pub entropy_threshold: f64,

    /// Minimum (non-fatigue-scaled) information gain an item must offer to
    /// be selectable, and the threshold for global stop condition S4.
    pub min_info_gain: f64,

    /// Modules whose joint settlement triggers global stop condition S3.
    /// Surfaced here rather than hardcoded so the "key modules" decision
    /// is a configuration choice, not a code change.
    pub key_modules: Vec<ModuleId>,

    /// Per-module contribution weight to the global risk score. Weights
    /// need not sum to exactly 1.0; `compute_global_risk` uses them as-is.
    pub module_weights: BTreeMap<ModuleId, f64>,

    /// Global risk score at or above which the category is "high".
    pub risk_score_high: f64,

    /// Global risk score at or above which the category is "moderate"
    /// (below `risk_score_high`, at or above this is "moderate"; below
    /// this is "low").
    pub risk_score_moderate: f64,
}

impl Default for Config {
    /// Default hyperparameters, carried over unchanged from the reference
    /// screening protocol this core replaces.
    fn default() -> Self {
        let modules = vec![
            "phonemic_awareness".to_string(),
            "ran".to_string(),
            "object_recognition".to_string(),
        ];

        let mut module_labels = BTreeMap::new();
        module_labels.insert("phonemic_awareness".to_string(), "Phonemic Awareness".to_string());
        module_labels.insert("ran".to_string(), "Rapid Automatized Naming".to_string());
        module_labels.insert("object_recognition".to_string(), "Object Recognition".to_string());

        let mut item_discrimination = BTreeMap::new();
        item_discrimination.insert("phonemic_awareness".to_string(), 1.2);
        item_discrimination.insert("ran".to_string(), 1.0);
        item_discrimination.insert("object_recognition".to_string(), 1.0);

        let mut module_weights = BTreeMap::new();
        module_weights.insert("phonemic_awareness".to_string(), 0.45);
        module_weights.insert("ran".to_string(), 0.35);
        module_weights.insert("object_recognition".to_string(), 0.20);

        Config {
            modules,
            module_labels,
            theta_grid: vec![-2.0, -1.0, 0.0, 1.0, 2.0],
            theta_weak_threshold: 0.0,
            item_discrimination,
            slow_rt_factor: 1.3,
            rapid_guess_fraction: 0.25,
            fatigue_slope: 0.05,
            min_fatigue_factor: 0.4,
            min_items_per_module: 4,
            max_items_total: 25,
            max_test_time_minutes: 25.0,
            p_confident: 0.75,
            entropy_threshold: 0.6,
            min_info_gain: 0.01,
            key_modules: vec!["phonemic_awareness".to_string(), "ran".to_string()],
            module_weights,
            risk_score_high: 0.7,
            risk_score_moderate: 0.4,
        }
    }
}

impl Config {
    /// Discrimination parameter for `module_id`, defaulting to `1.0` for a
    /// module the config doesn't otherwise know (keeps the item-response
    /// function total, never a hard failure, for unconfigured modules).
    pub fn discrimination_for(&self, module_id: &str) -> f64 {
        self.item_discrimination.get(module_id).copied().unwrap_or(1.0)
    }

    /// Aggregation weight for `module_id`, defaulting to `0.0` so an
    /// unweighted module contributes nothing to the global risk score
    /// rather than panicking.
    pub fn weight_for(&self, module_id: &str) -> f64 {
        self.module_weights.get(module_id).copied().unwrap_or(0.0)
    }

    /// Display label for `module_id`, falling back to the id itself.
    pub fn label_for(&self, module_id: &str) -> String {
        self.module_labels
            .get(module_id)
            .cloned()
            .unwrap_or_else(|| module_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_consistent_module_set() {
        let cfg = Config::default();
        for m in &cfg.modules {
            assert!(cfg.module_labels.contains_key(m));
            assert!(cfg.item_discrimination.contains_key(m));
            assert!(cfg.module_weights.contains_key(m));
        }
    }

    #[test]
    fn default_config_key_modules_are_a_subset() {
        let cfg = Config::default();
        for m in &cfg.key_modules {
            assert!(cfg.modules.contains(m));
        }
    }

    #[test]
    fn unconfigured_module_falls_back_safely() {
        let cfg = Config::default();
        assert_eq!(cfg.discrimination_for("unknown"), 1.0);
        assert_eq!(cfg.weight_for("unknown"), 0.0);
        assert_eq!(cfg.label_for("unknown"), "unknown");
    }

    #[test]
    fn default_config_serde_roundtrip() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, back);
    }
}
