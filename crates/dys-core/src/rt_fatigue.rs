//! Response-time classification and the fatigue factor applied to item
//! selection (never to the posterior or the final risk score — see OQ5).

use crate::config::Config;
use crate::state::ModuleStats;

/// Classify one response time against `max_time_seconds` for the module.
///
/// Returns `(slow_correct, rapid_guess)`. Both are `false` whenever
/// `max_time_seconds <= 0`, since no sensible threshold exists.
pub fn classify_response_time(
    config: &Config,
    correct: bool,
    response_time_seconds: f64,
    max_time_seconds: f64,
) -> (bool, bool) {
    if max_time_seconds <= 0.0 {
        return (false, false);
    }
    let slow_correct = correct && response_time_seconds > config.slow_rt_factor * max_time_seconds;
    let rapid_guess =
        !correct && response_time_seconds < config.rapid_guess_fraction * max_time_seconds;
    (slow_correct, rapid_guess)
}

/// Update RT/outcome bookkeeping for one administered item. This is the
/// single place `correct` is incremented (§4.C, OQ1) — the Bayes posterior
/// update in [`crate::bayes::update_theta_posterior_for_item`] increments
/// `num_items` but never `correct`, so a response is counted exactly once.
pub fn update_module_rt_stats(
    config: &Config,
    stats: &mut ModuleStats,
    correct: bool,
    response_time_seconds: f64,
    max_time_seconds: f64,
) {
    let (slow_correct, rapid_guess) =
        classify_response_time(config, correct, response_time_seconds, max_time_seconds);

    stats.sum_rt += response_time_seconds;
    if correct {
        stats.correct += 1;
    }
    if slow_correct {
        stats.slow_correct += 1;
    }
    if rapid_guess {
        stats.rapid_guess += 1;
    }
}

/// Fatigue multiplier applied to information gain during selection.
///
/// `phi(T) = clamp(1 - fatigue_slope * (T / 60), min_fatigue_factor, 1.0)`,
/// monotone non-increasing in elapsed test time `total_time_seconds`.
pub fn compute_fatigue_factor(config: &Config, total_time_seconds: f64) -> f64 {
    let minutes = total_time_seconds / 60.0;
    let raw = 1.0 - config.fatigue_slope * minutes;
    raw.clamp(config.min_fatigue_factor, 1.0)
}
