//! Myopic (one-step-lookahead) item selection.
//!
//! Scores each remaining candidate item by the expected reduction in
//! posterior entropy it would buy if administered next, scaled by the
//! current fatigue factor. Fatigue only ever scales this selection score;
//! it never re-enters the posterior or the final risk computation (OQ5).

use dys_math::{binary_entropy, weighted_average};

use crate::bayes::{derive_weak_strong_probs, prob_correct};
use crate::config::Config;
use crate::state::ModuleStats;

/// A not-yet-administered item available for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub id: String,
    pub module_id: String,
    pub difficulty: f64,
    pub max_time_seconds: f64,
}

/// Degenerate-probability threshold used by [`expected_entropy_after_item`]:
/// below this, one outcome branch is so unlikely that only the dominant
/// branch's simulated update is worth computing.
const DEGENERATE_PROB_EPS: f64 = 1e-12;

/// Posterior entropy that would result from observing `outcome_correct` on
/// an item with discrimination `a` and difficulty `b`, without mutating
/// `stats`. Mirrors the update rule in [`crate::bayes::update_theta_posterior_for_item`]
/// but only needs the resulting entropy, so it skips bookkeeping.
fn entropy_after_outcome(
    theta_grid: &[f64],
    posterior: &[f64],
    a: f64,
    b: f64,
    outcome_correct: bool,
    tau: f64,
) -> f64 {
    let mut unnormalized = Vec::with_capacity(theta_grid.len());
    for (theta, prior) in theta_grid.iter().zip(posterior.iter()) {
        let p_c = prob_correct(*theta, a, b);
        let likelihood = if outcome_correct { p_c } else { 1.0 - p_c };
        unnormalized.push(prior * likelihood);
    }
    let total: f64 = unnormalized.iter().sum();
    if total <= 0.0 {
        // Mirrors the uniform-reset recovery path; a uniform posterior has
        // maximum weak/strong entropy.
        return 1.0;
    }
    let normalized: Vec<f64> = unnormalized.iter().map(|u| u / total).collect();
    let (p_weak, p_strong) = derive_weak_strong_probs(theta_grid, &normalized, tau);
    binary_entropy(p_weak, p_strong)
}

/// Expected posterior entropy after hypothetically administering an item
/// of the given `difficulty`, averaged over both possible outcomes
/// weighted by their predictive probability under the current posterior.
///
/// If one outcome is effectively impossible (predictive probability below
/// [`DEGENERATE_PROB_EPS`]), skips the average and returns the entropy of
/// the dominant outcome's simulated posterior directly.
pub fn expected_entropy_after_item(
    config: &Config,
    module_id: &str,
    stats: &ModuleStats,
    difficulty: f64,
) -> f64 {
    let theta_grid = &config.theta_grid;
    let a = config.discrimination_for(module_id);

    let p_correct_predictive: f64 = theta_grid
        .iter()
        .zip(stats.theta_posterior.iter())
        .map(|(theta, prior)| prior * prob_correct(*theta, a, difficulty))
        .sum();
    let p_correct_predictive = p_correct_predictive.clamp(0.0, 1.0);
    let p_incorrect_predictive = 1.0 - p_correct_predictive;

    if p_correct_predictive < DEGENERATE_PROB_EPS || p_incorrect_predictive < DEGENERATE_PROB_EPS {
        // One branch is effectively impossible: simulate the dominant
        // outcome's update and return its entropy directly, rather than
        // averaging over a branch that would never actually occur.
        let dominant_outcome = p_correct_predictive >= p_incorrect_predictive;
        return entropy_after_outcome(
            theta_grid,
            &stats.theta_posterior,
            a,
            difficulty,
            dominant_outcome,
            config.theta_weak_threshold,
        );
    }

    let entropy_if_correct = entropy_after_outcome(
        theta_grid,
        &stats.theta_posterior,
        a,
        difficulty,
        true,
        config.theta_weak_threshold,
    );
    let entropy_if_incorrect = entropy_after_outcome(
        theta_grid,
        &stats.theta_posterior,
        a,
        difficulty,
        false,
        config.theta_weak_threshold,
    );

    weighted_average(p_correct_predictive, entropy_if_correct, entropy_if_incorrect)
}

/// Non-fatigue-scaled information gain: `max(0, current_entropy - expected_entropy)`.
pub fn information_gain_for_item(current_entropy: f64, expected_entropy: f64) -> f64 {
    (current_entropy - expected_entropy).max(0.0)
}

/// Fatigue-scaled gain used to rank candidates. A zero base gain stays
/// zero regardless of fatigue, so a fully fatigued session never appears
/// to gain information it wouldn't otherwise gain.
pub fn adjusted_gain_for_item(base_gain: f64, fatigue_factor: f64) -> f64 {
    if base_gain <= 0.0 {
        0.0
    } else {
        base_gain * fatigue_factor
    }
}

/// Select the highest-(fatigue-adjusted)-gain candidate for `module_id`
/// from `candidates`, restricted to items still in `stats.items_remaining`
/// and clearing `config.min_info_gain`. Ties keep the earlier candidate in
/// iteration order (strict `>` comparison), matching the stability
/// guarantee in §9.
pub fn select_best_item_for_module<'a>(
    config: &Config,
    module_id: &str,
    stats: &ModuleStats,
    candidates: &'a [CandidateItem],
    fatigue_factor: f64,
) -> Option<&'a CandidateItem> {
    let mut best: Option<(&CandidateItem, f64)> = None;
    for candidate in candidates {
        if candidate.module_id != module_id {
            continue;
        }
        if !stats.items_remaining.iter().any(|id| id == &candidate.id) {
            continue;
        }
        let expected = expected_entropy_after_item(config, module_id, stats, candidate.difficulty);
        let base_gain = information_gain_for_item(stats.entropy, expected);
        if base_gain < config.min_info_gain {
            continue;
        }
        let gain = adjusted_gain_for_item(base_gain, fatigue_factor);
        match &best {
            Some((_, best_gain)) if *best_gain >= gain => {}
            _ => best = Some((candidate, gain)),
        }
    }
    best.map(|(c, _)| c)
}
