//! The orchestrator: session lifecycle and the per-response state
//! transition that ties Bayes updates, RT/fatigue tracking, selection, and
//! stopping together.

use chrono::Duration;
use std::collections::BTreeMap;

use crate::config::{Config, ModuleId};
use crate::error::{DysError, DysResult};
use crate::risk::{compute_global_risk, GlobalRiskResult};
use crate::rt_fatigue::{compute_fatigue_factor, update_module_rt_stats};
use crate::selection::{select_best_item_for_module, CandidateItem};
use crate::state::SessionState;
use crate::stopping::{is_module_settled, should_stop_globally};

/// Result of starting a new test: the freshly initialised session plus the
/// first module/item it chose to administer, if any items are available
/// at all.
#[derive(Debug, Clone)]
pub struct StartTestOutcome {
    pub session: SessionState,
    pub first_module_id: Option<ModuleId>,
    pub first_item_id: Option<String>,
}

/// Result of processing one administered response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResponseOutcome {
    pub stopped: bool,
    pub next_module_id: Option<ModuleId>,
    pub next_item_id: Option<String>,
    /// Present exactly when `stopped` is true.
    pub risk: Option<GlobalRiskResult>,
    /// Set if the Bayes update underflowed and recovered to a uniform
    /// posterior; surfaced so the caller can log the recovery.
    pub degenerate: Option<DysError>,
}

/// Build a fresh session with a uniform prior over every configured
/// module, seeded from `item_pool`.
pub fn initialise_session(config: &Config, item_pool: &BTreeMap<ModuleId, Vec<String>>) -> SessionState {
    SessionState::initialise(config, item_pool)
}

/// Scan modules cyclically from `session.current_module_index`, skipping
/// any that are already settled or have no administrable candidate left,
/// and return the first hit. Advances `session.current_module_index` and,
/// on wraparound, `session.round_number` (OQ2: a round is one full cyclic
/// pass over the module list).
fn choose_next_module(
    config: &Config,
    session: &mut SessionState,
    candidates: &[CandidateItem],
) -> Option<ModuleId> {
    let len = config.modules.len();
    if len == 0 {
        return None;
    }
    for offset in 0..len {
        let idx = (session.current_module_index + offset) % len;
        let module_id = &config.modules[idx];
        let Some(stats) = session.modules.get(module_id) else {
            continue;
        };
        if is_module_settled(config, stats) {
            continue;
        }
        let has_candidate = candidates
            .iter()
            .any(|c| &c.module_id == module_id && stats.items_remaining.iter().any(|id| id == &c.id));
        if !has_candidate {
            continue;
        }
        if idx < session.current_module_index {
            session.round_number += 1;
        }
        session.current_module_index = idx;
        return Some(module_id.clone());
    }
    None
}

/// Start a new test: initialise the session, then pick the first
/// module/item the way [`process_response`] would after any response.
pub fn start_new_test(
    config: &Config,
    item_pool: &BTreeMap<ModuleId, Vec<String>>,
    candidates: &[CandidateItem],
) -> StartTestOutcome {
    let mut session = initialise_session(config, item_pool);
    let first_module_id = choose_next_module(config, &mut session, candidates);
    let first_item_id = first_module_id.as_ref().and_then(|module_id| {
        let stats = session.modules.get(module_id)?;
        let fatigue = compute_fatigue_factor(config, session.total_time_seconds);
        select_best_item_for_module(config, module_id, stats, candidates, fatigue)
            .map(|c| c.id.clone())
    });
    StartTestOutcome {
        session,
        first_module_id,
        first_item_id,
    }
}

/// Process one administered response end-to-end: advance elapsed time,
/// update the Bayes posterior, update RT/fatigue bookkeeping, remove the
/// item from the module's remaining set, then decide whether the session
/// stops or hands back the next module/item.
///
/// Order of operations matches the external contract in §4.G exactly:
/// time first, then the posterior update, then RT stats, then the stop
/// check, then selection. A stopped session rejects this call outright
/// (I6); `correct` is touched only inside the RT step (OQ1).
#[allow(clippy::too_many_arguments)]
pub fn process_response(
    config: &Config,
    session: &mut SessionState,
    candidates: &[CandidateItem],
    module_id: &str,
    item_id: &str,
    correct: bool,
    response_time_seconds: f64,
    elapsed_since_last_update_seconds: f64,
) -> DysResult<ProcessResponseOutcome> {
    session.ensure_running()?;
    if response_time_seconds < 0.0 {
        return Err(DysError::InvalidInput(format!(
            "negative response time for item {item_id}"
        )));
    }

    let candidate = candidates
        .iter()
        .find(|c| c.id == item_id && c.module_id == module_id)
        .ok_or_else(|| {
            DysError::InvalidInput(format!("item {item_id} not found in pool for module {module_id}"))
        })?;

    session.total_time_seconds += elapsed_since_last_update_seconds.max(0.0);
    // Derived from the same clock as total_time_seconds (I5: last_update_at
    // - started_at must equal total_time_seconds), rather than sampled from
    // the real wall clock, which would drift from the caller-supplied deltas.
    session.last_update_at =
        session.started_at + Duration::milliseconds((session.total_time_seconds * 1000.0).round() as i64);

    let stats = session.module_stats_mut(module_id)?;
    let degenerate = crate::bayes::update_theta_posterior_for_item(
        config,
        module_id,
        stats,
        item_id,
        candidate.difficulty,
        correct,
    )?;
    update_module_rt_stats(
        config,
        stats,
        correct,
        response_time_seconds,
        candidate.max_time_seconds,
    );

    if let Some(reason) = should_stop_globally(config, session, candidates) {
        tracing::debug!(?reason, test_id = %session.test_id, "session stopping");
        session.stopped = true;
        let risk = compute_global_risk(config, session)?;
        return Ok(ProcessResponseOutcome {
            stopped: true,
            next_module_id: None,
            next_item_id: None,
            risk: Some(risk),
            degenerate,
        });
    }

    let next_module_id = choose_next_module(config, session, candidates);
    let next_item_id = match &next_module_id {
        Some(next) => {
            let fatigue = compute_fatigue_factor(config, session.total_time_seconds);
            let stats = session.module_stats(next)?;
            select_best_item_for_module(config, next, stats, candidates, fatigue).map(|c| c.id.clone())
        }
        None => None,
    };

    // A module was chosen but had nothing selectable to offer, or no
    // module was left at all: both collapse to a global stop, matching
    // the reference engine's "None propagates to stop" rule.
    if next_module_id.is_none() || next_item_id.is_none() {
        tracing::debug!(test_id = %session.test_id, "no selectable item remains; stopping");
        session.stopped = true;
        let risk = compute_global_risk(config, session)?;
        return Ok(ProcessResponseOutcome {
            stopped: true,
            next_module_id: None,
            next_item_id: None,
            risk: Some(risk),
            degenerate,
        });
    }

    Ok(ProcessResponseOutcome {
        stopped: false,
        next_module_id,
        next_item_id,
        risk: None,
        degenerate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_and_candidates(config: &Config, items_per_module: usize) -> (BTreeMap<ModuleId, Vec<String>>, Vec<CandidateItem>) {
        let mut pool = BTreeMap::new();
        let mut candidates = Vec::new();
        for module_id in &config.modules {
            let mut ids = Vec::new();
            for i in 0..items_per_module {
                let id = format!("{module_id}-item-{i}");
                ids.push(id.clone());
                candidates.push(CandidateItem {
                    id,
                    module_id: module_id.clone(),
                    difficulty: (i as f64) - 1.0,
                    max_time_seconds: 10.0,
                });
            }
            pool.insert(module_id.clone(), ids);
        }
        (pool, candidates)
    }

    #[test]
    fn start_new_test_picks_first_module_and_item() {
        let config = Config::default();
        let (pool, candidates) = pool_and_candidates(&config, 5);
        let outcome = start_new_test(&config, &pool, &candidates);
        assert_eq!(
            outcome.first_module_id.as_deref(),
            Some(config.modules[0].as_str())
        );
        assert!(outcome.first_item_id.is_some());
    }

    #[test]
    fn process_response_rejects_stopped_session() {
        let config = Config::default();
        let (pool, candidates) = pool_and_candidates(&config, 1);
        let mut session = initialise_session(&config, &pool);
        session.stopped = true;
        let result = process_response(
            &config,
            &mut session,
            &candidates,
            &config.modules[0],
            "whatever",
            true,
            1.0,
            1.0,
        );
        assert!(matches!(result, Err(DysError::InvalidInput(_))));
    }

    #[test]
    fn process_response_rejects_negative_rt() {
        let config = Config::default();
        let (pool, candidates) = pool_and_candidates(&config, 1);
        let mut session = initialise_session(&config, &pool);
        let module_id = config.modules[0].clone();
        let item_id = format!("{module_id}-item-0");
        let result = process_response(
            &config,
            &mut session,
            &candidates,
            &module_id,
            &item_id,
            true,
            -1.0,
            1.0,
        );
        assert!(matches!(result, Err(DysError::InvalidInput(_))));
    }

    #[test]
    fn process_response_rejects_unknown_item() {
        let config = Config::default();
        let (pool, candidates) = pool_and_candidates(&config, 1);
        let mut session = initialise_session(&config, &pool);
        let module_id = config.modules[0].clone();
        let result = process_response(
            &config,
            &mut session,
            &candidates,
            &module_id,
            "does-not-exist",
            true,
            1.0,
            1.0,
        );
        assert!(matches!(result, Err(DysError::InvalidInput(_))));
    }

    #[test]
    fn process_response_advances_time_and_stats() {
        let config = Config::default();
        let (pool, candidates) = pool_and_candidates(&config, 10);
        let mut session = initialise_session(&config, &pool);
        let module_id = config.modules[0].clone();
        let item_id = format!("{module_id}-item-0");

        let outcome = process_response(
            &config,
            &mut session,
            &candidates,
            &module_id,
            &item_id,
            true,
            5.0,
            5.0,
        )
        .expect("processes successfully");

        assert_eq!(session.total_time_seconds, 5.0);
        assert_eq!(session.modules.get(&module_id).unwrap().num_items, 1);
        assert_eq!(session.modules.get(&module_id).unwrap().correct, 1);
        assert!(!outcome.stopped || outcome.risk.is_some());
    }

    #[test]
    fn process_response_keeps_last_update_at_consistent_with_total_time_seconds() {
        // I5: total_time_seconds must always equal last_update_at -
        // started_at, clamped at 0. A real wall-clock sample for
        // last_update_at would drift from a caller-supplied elapsed delta.
        let config = Config::default();
        let (pool, candidates) = pool_and_candidates(&config, 10);
        let mut session = initialise_session(&config, &pool);
        let module_id = config.modules[0].clone();
        let item_id = format!("{module_id}-item-0");

        process_response(
            &config,
            &mut session,
            &candidates,
            &module_id,
            &item_id,
            true,
            1.0,
            100.0,
        )
        .expect("processes successfully");

        let observed = (session.last_update_at - session.started_at).num_milliseconds() as f64 / 1000.0;
        assert!(
            (observed - session.total_time_seconds).abs() < 1e-6,
            "last_update_at - started_at ({observed}) must equal total_time_seconds ({})",
            session.total_time_seconds
        );
    }

    #[test]
    fn running_out_of_items_stops_the_session_with_risk() {
        let config = Config::default();
        let (pool, candidates) = pool_and_candidates(&config, 1);
        let mut session = initialise_session(&config, &pool);
        // Only one item per module: after answering it the module (and
        // eventually the session) must run out of candidates.
        for module_id in config.modules.clone() {
            if session.stopped {
                break;
            }
            let item_id = format!("{module_id}-item-0");
            if !session
                .modules
                .get(&module_id)
                .unwrap()
                .items_remaining
                .contains(&item_id)
            {
                continue;
            }
            let outcome = process_response(
                &config,
                &mut session,
                &candidates,
                &module_id,
                &item_id,
                true,
                1.0,
                1.0,
            )
            .expect("processes");
            if outcome.stopped {
                assert!(outcome.risk.is_some());
            }
        }
    }
}
