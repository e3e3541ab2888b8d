//! Multi-criterion stopping policy: a module settles on its own evidence;
//! the whole session stops on any of four global conditions (§4.E).

use crate::config::Config;
use crate::selection::{expected_entropy_after_item, information_gain_for_item, CandidateItem};
use crate::state::SessionState;

/// A module is settled once it has seen enough items, its posterior is
/// tight enough, and it has committed to a weak/strong label with enough
/// confidence.
pub fn is_module_settled(config: &Config, stats: &crate::state::ModuleStats) -> bool {
    stats.num_items >= config.min_items_per_module
        && stats.entropy <= config.entropy_threshold
        && stats.p_weak.max(stats.p_strong) >= config.p_confident
}

/// The best (non-fatigue-scaled) information gain still achievable across
/// every unsettled module's remaining candidates, or `0.0` if every module
/// is settled or has no remaining candidates. Used only to evaluate global
/// stop condition S4 — never to pick the next item (that's
/// [`crate::selection::select_best_item_for_module`]'s job).
pub fn max_possible_gain_across_modules(
    config: &Config,
    session: &SessionState,
    candidates: &[CandidateItem],
) -> f64 {
    let mut best = 0.0f64;
    for (module_id, stats) in &session.modules {
        if is_module_settled(config, stats) {
            continue;
        }
        for candidate in candidates {
            if &candidate.module_id != module_id {
                continue;
            }
            if !stats.items_remaining.iter().any(|id| id == &candidate.id) {
                continue;
            }
            let expected =
                expected_entropy_after_item(config, module_id, stats, candidate.difficulty);
            let gain = information_gain_for_item(stats.entropy, expected);
            if gain > best {
                best = gain;
            }
        }
    }
    best
}

/// The global stop conditions, evaluated independently. The session stops
/// as soon as any one of them holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// S1: total administered items across all modules reached the cap.
    MaxItemsTotal,
    /// S2: total elapsed test time reached the cap.
    MaxTestTime,
    /// S3: every configured key module has settled.
    KeyModulesSettled,
    /// S4: no remaining candidate offers enough information gain to
    /// justify continuing.
    NoInformativeItemsRemain,
}

/// Evaluate every global stop condition, returning the first that holds in
/// S1-S4 order. Returns `None` if the session should continue.
pub fn should_stop_globally(
    config: &Config,
    session: &SessionState,
    candidates: &[CandidateItem],
) -> Option<StopReason> {
    let total_items: u32 = session.modules.values().map(|m| m.num_items).sum();
    if total_items >= config.max_items_total {
        return Some(StopReason::MaxItemsTotal);
    }

    if session.total_time_seconds / 60.0 >= config.max_test_time_minutes {
        return Some(StopReason::MaxTestTime);
    }

    let key_modules_settled = !config.key_modules.is_empty()
        && config.key_modules.iter().all(|module_id| {
            session
                .modules
                .get(module_id)
                .map(|stats| is_module_settled(config, stats))
                .unwrap_or(false)
        });
    if key_modules_settled {
        return Some(StopReason::KeyModulesSettled);
    }

    if max_possible_gain_across_modules(config, session, candidates) < config.min_info_gain {
        return Some(StopReason::NoInformativeItemsRemain);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ModuleStats;
    use std::collections::BTreeMap;

    fn settled_stats(config: &Config) -> ModuleStats {
        let mut stats = ModuleStats::initialise(&config.theta_grid, vec![]);
        stats.num_items = config.min_items_per_module;
        stats.entropy = 0.1;
        stats.p_weak = 0.9;
        stats.p_strong = 0.1;
        stats
    }

    #[test]
    fn module_settled_requires_all_three_criteria() {
        let config = Config::default();
        let mut stats = settled_stats(&config);
        assert!(is_module_settled(&config, &stats));

        stats.num_items = config.min_items_per_module - 1;
        assert!(!is_module_settled(&config, &stats));
    }

    #[test]
    fn s1_stops_on_total_item_cap() {
        let mut config = Config::default();
        config.max_items_total = 2;
        let mut session = SessionState::initialise(&config, &BTreeMap::new());
        session
            .modules
            .get_mut("phonemic_awareness")
            .unwrap()
            .num_items = 2;
        assert_eq!(
            should_stop_globally(&config, &session, &[]),
            Some(StopReason::MaxItemsTotal)
        );
    }

    #[test]
    fn s2_stops_on_time_cap() {
        let mut config = Config::default();
        config.max_test_time_minutes = 1.0;
        let mut session = SessionState::initialise(&config, &BTreeMap::new());
        session.total_time_seconds = 90.0;
        assert_eq!(
            should_stop_globally(&config, &session, &[]),
            Some(StopReason::MaxTestTime)
        );
    }

    #[test]
    fn s3_stops_when_key_modules_settle() {
        let config = Config::default();
        let mut session = SessionState::initialise(&config, &BTreeMap::new());
        for key in &config.key_modules {
            *session.modules.get_mut(key).unwrap() = settled_stats(&config);
        }
        assert_eq!(
            should_stop_globally(&config, &session, &[]),
            Some(StopReason::KeyModulesSettled)
        );
    }

    #[test]
    fn s4_stops_when_no_candidates_remain() {
        let config = Config::default();
        let session = SessionState::initialise(&config, &BTreeMap::new());
        // No item pool was provided, so items_remaining is empty everywhere
        // and no candidate list can offer any gain.
        assert_eq!(
            should_stop_globally(&config, &session, &[]),
            Some(StopReason::NoInformativeItemsRemain)
        );
    }

    #[test]
    fn continues_when_informative_items_remain() {
        let config = Config::default();
        let mut pool = BTreeMap::new();
        pool.insert("phonemic_awareness".to_string(), vec!["item-1".to_string()]);
        let session = SessionState::initialise(&config, &pool);
        let candidates = vec![CandidateItem {
            id: "item-1".to_string(),
            module_id: "phonemic_awareness".to_string(),
            difficulty: 0.0,
            max_time_seconds: 10.0,
        }];
        assert_eq!(should_stop_globally(&config, &session, &candidates), None);
    }
}
