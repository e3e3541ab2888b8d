//! The Bayesian decision core: item-response likelihood, posterior update,
//! and weak/strong projection.

use dys_math::{binary_entropy, stable_logistic};

use crate::config::Config;
use crate::error::{DysError, DysResult};
use crate::state::ModuleStats;

/// 2PL item-response probability of a correct response, guessing fixed at
/// zero: `P(correct | theta) = sigmoid(a * (theta - b))`.
pub fn prob_correct(theta: f64, a: f64, b: f64) -> f64 {
    stable_logistic(a * (theta - b))
}

/// `(p_weak, p_strong)` under `posterior` given `theta_grid` and `tau`.
///
/// `p_weak = sum(posterior[i] for theta_grid[i] < tau)`.
pub fn derive_weak_strong_probs(theta_grid: &[f64], posterior: &[f64], tau: f64) -> (f64, f64) {
    let p_weak: f64 = theta_grid
        .iter()
        .zip(posterior.iter())
        .filter(|(theta, _)| **theta < tau)
        .map(|(_, p)| *p)
        .sum();
    let p_weak = p_weak.clamp(0.0, 1.0);
    (p_weak, 1.0 - p_weak)
}

/// Posterior update for one administered item, mutating `stats` in place.
///
/// Computes the unnormalized posterior `u_i = prior_i * L_i` where `L_i`
/// is the item-response likelihood of the observed outcome under
/// `theta_grid[i]`. If the normalizer underflows to (near) zero the
/// posterior is reset to uniform and [`DysError::NumericalDegenerate`] is
/// returned alongside the (still-applied) recovery — callers may log it
/// but the session state is already consistent.
///
/// Increments `num_items` and `items_remaining` bookkeeping; deliberately
/// does **not** touch `correct`, which is incremented exactly once, in the
/// response-time update step (see [`crate::rt_fatigue::update_module_rt_stats`]).
pub fn update_theta_posterior_for_item(
    config: &Config,
    module_id: &str,
    stats: &mut ModuleStats,
    item_id: &str,
    difficulty: f64,
    correct: bool,
) -> DysResult<Option<DysError>> {
    let theta_grid = &config.theta_grid;
    if theta_grid.len() != stats.theta_posterior.len() {
        return Err(DysError::InvalidInput(format!(
            "theta_grid/posterior length mismatch for module {module_id}"
        )));
    }
    let a = config.discrimination_for(module_id);

    let mut unnormalized: Vec<f64> = Vec::with_capacity(theta_grid.len());
    for (theta, prior) in theta_grid.iter().zip(stats.theta_posterior.iter()) {
        let p_c = prob_correct(*theta, a, difficulty);
        let likelihood = if correct { p_c } else { 1.0 - p_c };
        unnormalized.push(prior * likelihood);
    }

    let total: f64 = unnormalized.iter().sum();
    let degenerate = if total <= 0.0 {
        let n = theta_grid.len().max(1) as f64;
        stats.theta_posterior = vec![1.0 / n; theta_grid.len()];
        tracing::warn!(module_id, item_id, "posterior normalizer underflowed; reset to uniform");
        Some(DysError::NumericalDegenerate(format!(
            "posterior normalizer underflowed for module {module_id}; reset to uniform"
        )))
    } else {
        stats.theta_posterior = unnormalized.iter().map(|u| u / total).collect();
        None
    };

    let (p_weak, p_strong) = derive_weak_strong_probs(
        theta_grid,
        &stats.theta_posterior,
        config.theta_weak_threshold,
    );
    stats.p_weak = p_weak;
    stats.p_strong = p_strong;
    stats.entropy = binary_entropy(p_weak, p_strong);
    stats.num_items += 1;
    stats.items_remaining.retain(|id| id != item_id);

    Ok(degenerate)
}
