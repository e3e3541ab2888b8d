//! Session and per-module state.
//!
//! `SessionState` is the single piece of mutable data the core owns per
//! test administration. It is not re-entrant: callers must not invoke the
//! core concurrently against the same `SessionState` from more than one
//! thread. Multiple sessions are fully independent; the core holds no
//! shared mutable state of its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, ModuleId};
use crate::error::{DysError, DysResult};

/// Posterior and response-time bookkeeping for a single module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStats {
    /// Posterior weight over `Config::theta_grid`, same length and order.
    pub theta_posterior: Vec<f64>,
    /// `P(theta < theta_weak_threshold)` under the current posterior.
    pub p_weak: f64,
    /// `1.0 - p_weak`.
    pub p_strong: f64,
    /// Binary entropy (bits) of `(p_weak, p_strong)`.
    pub entropy: f64,
    /// Count of items administered in this module so far.
    pub num_items: u32,
    /// Item ids not yet administered in this module.
    pub items_remaining: Vec<String>,
    /// Running sum of response times (seconds) for this module.
    pub sum_rt: f64,
    /// Count of slow-correct responses (§4.C).
    pub slow_correct: u32,
    /// Count of correct responses. Incremented in exactly one place
    /// (the response-time update step, §4.C) so that it never
    /// double-counts a single administered item.
    pub correct: u32,
    /// Count of rapid-guess responses (§4.C).
    pub rapid_guess: u32,
    /// Wall-clock time the module was last (re-)entered, if it has been
    /// started at all.
    pub last_started_at: Option<DateTime<Utc>>,
}

impl ModuleStats {
    /// A fresh module with a uniform posterior over `theta_grid` and the
    /// full `items` set still remaining.
    pub fn initialise(theta_grid: &[f64], items: Vec<String>) -> Self {
        let n = theta_grid.len().max(1) as f64;
        let uniform = vec![1.0 / n; theta_grid.len()];
        ModuleStats {
            theta_posterior: uniform,
            p_weak: 0.5,
            p_strong: 0.5,
            entropy: 1.0,
            num_items: 0,
            items_remaining: items,
            sum_rt: 0.0,
            slow_correct: 0,
            correct: 0,
            rapid_guess: 0,
            last_started_at: None,
        }
    }

    /// Average response time across administered items, or `0.0` if none
    /// have been administered yet.
    pub fn avg_rt(&self) -> f64 {
        if self.num_items == 0 {
            0.0
        } else {
            self.sum_rt / self.num_items as f64
        }
    }

    /// Fraction of *correct* responses that were also slow, `0.0` if none
    /// have been correct yet.
    pub fn slow_correct_ratio(&self) -> f64 {
        if self.correct == 0 {
            0.0
        } else {
            self.slow_correct as f64 / self.correct as f64
        }
    }

    /// Fraction of administered items that were rapid guesses.
    pub fn rapid_guess_ratio(&self) -> f64 {
        if self.num_items == 0 {
            0.0
        } else {
            self.rapid_guess as f64 / self.num_items as f64
        }
    }
}

/// The full mutable state of one test administration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub test_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
    pub total_time_seconds: f64,
    pub round_number: u32,
    pub current_module_index: usize,
    pub stopped: bool,
    pub modules: BTreeMap<ModuleId, ModuleStats>,
}

impl SessionState {
    /// Start a new session with a uniform prior over every configured
    /// module, seeded with each module's item pool.
    pub fn initialise(config: &Config, item_pool: &BTreeMap<ModuleId, Vec<String>>) -> Self {
        let now = Utc::now();
        let mut modules = BTreeMap::new();
        for module_id in &config.modules {
            let items = item_pool.get(module_id).cloned().unwrap_or_default();
            modules.insert(
                module_id.clone(),
                ModuleStats::initialise(&config.theta_grid, items),
            );
        }
        SessionState {
            test_id: Uuid::new_v4(),
            started_at: now,
            last_update_at: now,
            total_time_seconds: 0.0,
            round_number: 0,
            current_module_index: 0,
            stopped: false,
            modules,
        }
    }

    /// Fails loudly (`InvalidInput`) rather than silently mutate a session
    /// that has already reached the absorbing `stopped` state (I6).
    pub fn ensure_running(&self) -> DysResult<()> {
        if self.stopped {
            Err(DysError::InvalidInput(format!(
                "session {} has already stopped",
                self.test_id
            )))
        } else {
            Ok(())
        }
    }

    pub fn module_stats(&self, module_id: &str) -> DysResult<&ModuleStats> {
        self.modules
            .get(module_id)
            .ok_or_else(|| DysError::InvalidInput(format!("unknown module: {module_id}")))
    }

    pub fn module_stats_mut(&mut self, module_id: &str) -> DysResult<&mut ModuleStats> {
        self.modules
            .get_mut(module_id)
            .ok_or_else(|| DysError::InvalidInput(format!("unknown module: {module_id}")))
    }
}

/// JSON-compatible wire representation of [`ModuleStats`] for snapshot
/// round-tripping. Field names and types are part of the external
/// contract (§6) and must not be renamed independently of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleStatsSnapshot {
    pub theta_posterior: Vec<f64>,
    pub p_weak: f64,
    pub p_strong: f64,
    pub entropy: f64,
    pub num_items: u32,
    pub items_remaining: Vec<String>,
    pub sum_rt: f64,
    pub slow_correct: u32,
    pub correct: u32,
    pub rapid_guess: u32,
    pub last_started_at: Option<String>,
}

/// JSON-compatible wire representation of [`SessionState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub test_id: String,
    pub started_at: String,
    pub last_update_at: String,
    pub total_time_seconds: f64,
    pub round_number: u32,
    pub current_module_index: usize,
    pub stopped: bool,
    pub modules: BTreeMap<String, ModuleStatsSnapshot>,
}

impl From<&ModuleStats> for ModuleStatsSnapshot {
    fn from(m: &ModuleStats) -> Self {
        ModuleStatsSnapshot {
            theta_posterior: m.theta_posterior.clone(),
            p_weak: m.p_weak,
            p_strong: m.p_strong,
            entropy: m.entropy,
            num_items: m.num_items,
            items_remaining: m.items_remaining.clone(),
            sum_rt: m.sum_rt,
            slow_correct: m.slow_correct,
            correct: m.correct,
            rapid_guess: m.rapid_guess,
            last_started_at: m.last_started_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl TryFrom<ModuleStatsSnapshot> for ModuleStats {
    type Error = DysError;

    fn try_from(s: ModuleStatsSnapshot) -> DysResult<Self> {
        let last_started_at = match s.last_started_at {
            None => None,
            Some(ts) => Some(
                DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| {
                        DysError::SnapshotMalformed(format!("bad last_started_at: {e}"))
                    })?
                    .with_timezone(&Utc),
            ),
        };
        Ok(ModuleStats {
            theta_posterior: s.theta_posterior,
            p_weak: s.p_weak,
            p_strong: s.p_strong,
            entropy: s.entropy,
            num_items: s.num_items,
            items_remaining: s.items_remaining,
            sum_rt: s.sum_rt,
            slow_correct: s.slow_correct,
            correct: s.correct,
            rapid_guess: s.rapid_guess,
            last_started_at,
        })
    }
}

impl SessionState {
    /// Serialize to the exact JSON-compatible snapshot contract in §6.
    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            test_id: self.test_id.to_string(),
            started_at: self.started_at.to_rfc3339(),
            last_update_at: self.last_update_at.to_rfc3339(),
            total_time_seconds: self.total_time_seconds,
            round_number: self.round_number,
            current_module_index: self.current_module_index,
            stopped: self.stopped,
            modules: self
                .modules
                .iter()
                .map(|(k, v)| (k.clone(), ModuleStatsSnapshot::from(v)))
                .collect(),
        }
    }

    /// Reconstruct from a snapshot, failing loudly with
    /// [`DysError::SnapshotMalformed`] on any missing or ill-typed field
    /// rather than silently defaulting it.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> DysResult<Self> {
        let test_id = Uuid::parse_str(&snapshot.test_id)
            .map_err(|e| DysError::SnapshotMalformed(format!("bad test_id: {e}")))?;
        let started_at = DateTime::parse_from_rfc3339(&snapshot.started_at)
            .map_err(|e| DysError::SnapshotMalformed(format!("bad started_at: {e}")))?
            .with_timezone(&Utc);
        let last_update_at = DateTime::parse_from_rfc3339(&snapshot.last_update_at)
            .map_err(|e| DysError::SnapshotMalformed(format!("bad last_update_at: {e}")))?
            .with_timezone(&Utc);

        let mut modules = BTreeMap::new();
        for (module_id, stats) in snapshot.modules {
            modules.insert(module_id, ModuleStats::try_from(stats)?);
        }

        Ok(SessionState {
            test_id,
            started_at,
            last_update_at,
            total_time_seconds: snapshot.total_time_seconds,
            round_number: snapshot.round_number,
            current_module_index: snapshot.current_module_index,
            stopped: snapshot.stopped,
            modules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::default()
    }

    #[test]
    fn initialise_has_uniform_posterior() {
        let cfg = test_config();
        let pool = BTreeMap::new();
        let session = SessionState::initialise(&cfg, &pool);
        for stats in session.modules.values() {
            let sum: f64 = stats.theta_posterior.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert_eq!(stats.p_weak, 0.5);
            assert_eq!(stats.entropy, 1.0);
        }
        assert!(!session.stopped);
    }

    #[test]
    fn ensure_running_rejects_stopped_session() {
        let cfg = test_config();
        let mut session = SessionState::initialise(&cfg, &BTreeMap::new());
        session.stopped = true;
        assert!(matches!(
            session.ensure_running(),
            Err(DysError::InvalidInput(_))
        ));
    }

    #[test]
    fn snapshot_round_trip_preserves_state() {
        let cfg = test_config();
        let mut pool = BTreeMap::new();
        pool.insert("phonemic_awareness".to_string(), vec!["item-1".to_string()]);
        let mut session = SessionState::initialise(&cfg, &pool);
        session.total_time_seconds = 42.5;
        session.round_number = 3;

        let snapshot = session.to_snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let parsed: SessionSnapshot = serde_json::from_str(&json).expect("deserialize");
        let restored = SessionState::from_snapshot(parsed).expect("restore");

        assert_eq!(restored.test_id, session.test_id);
        assert_eq!(restored.total_time_seconds, session.total_time_seconds);
        assert_eq!(restored.round_number, session.round_number);
        assert_eq!(restored.modules, session.modules);
    }

    #[test]
    fn malformed_snapshot_fails_loudly() {
        let snapshot = SessionSnapshot {
            test_id: "not-a-uuid".to_string(),
            started_at: Utc::now().to_rfc3339(),
            last_update_at: Utc::now().to_rfc3339(),
            total_time_seconds: 0.0,
            round_number: 0,
            current_module_index: 0,
            stopped: false,
            modules: BTreeMap::new(),
        };
        assert!(matches!(
            SessionState::from_snapshot(snapshot),
            Err(DysError::SnapshotMalformed(_))
        ));
    }
}
