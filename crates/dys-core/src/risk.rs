//! Per-module classification, global risk aggregation, and the structured
//! explanation object returned alongside it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{DysError, DysResult};
use crate::state::{ModuleStats, SessionState};

/// A module's settled-or-leaning classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleLabel {
    Weak,
    Strong,
    Uncertain,
}

/// Per-module classification: the settled-or-leaning label plus the
/// derived RT statistics the global aggregator draws on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleClassification {
    pub label: ModuleLabel,
    pub p_weak: f64,
    pub p_strong: f64,
    pub avg_rt: f64,
    pub slow_correct_ratio: f64,
    pub rapid_guess_ratio: f64,
}

/// Classify one module from its current posterior and RT bookkeeping.
///
/// A module only commits to `weak`/`strong` once its posterior is both
/// tight (`entropy <= entropy_threshold`) and confident
/// (`max(p_weak, p_strong) >= p_confident`); otherwise it stays
/// `uncertain`, even if one side of the posterior already leans heavily.
pub fn classify_module(config: &Config, stats: &ModuleStats) -> ModuleClassification {
    let confident = stats.entropy <= config.entropy_threshold
        && stats.p_weak.max(stats.p_strong) >= config.p_confident;
    let label = if !confident {
        ModuleLabel::Uncertain
    } else if stats.p_weak > stats.p_strong {
        ModuleLabel::Weak
    } else {
        ModuleLabel::Strong
    };
    ModuleClassification {
        label,
        p_weak: stats.p_weak,
        p_strong: stats.p_strong,
        avg_rt: stats.avg_rt(),
        slow_correct_ratio: stats.slow_correct_ratio(),
        rapid_guess_ratio: stats.rapid_guess_ratio(),
    }
}

/// Overall risk category derived from `risk_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    High,
    Moderate,
    Low,
}

/// Explanation detail for a single module: its classification plus the
/// deterministic notes generated from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleExplanation {
    pub label: ModuleLabel,
    pub p_weak: f64,
    pub p_strong: f64,
    pub entropy: f64,
    pub num_items: u32,
    pub avg_rt: f64,
    pub slow_correct_ratio: f64,
    pub rapid_guess_ratio: f64,
    pub notes: Vec<String>,
}

/// Explanation detail for the overall (global) result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalExplanation {
    pub category: RiskCategory,
    pub risk_score: f64,
    pub confidence: f64,
}

/// The structured (non-free-text) explanation accompanying a risk result:
/// a deterministic record, not a generated paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationObject {
    pub global: GlobalExplanation,
    pub modules: BTreeMap<String, ModuleExplanation>,
}

/// The outcome of global risk aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRiskResult {
    pub risk_category: RiskCategory,
    pub risk_score: f64,
    pub confidence: f64,
    pub modules: BTreeMap<String, ModuleClassification>,
    pub explanation: ExplanationObject,
}

fn category_for(config: &Config, risk_score: f64) -> RiskCategory {
    if risk_score >= config.risk_score_high {
        RiskCategory::High
    } else if risk_score >= config.risk_score_moderate {
        RiskCategory::Moderate
    } else {
        RiskCategory::Low
    }
}

fn notes_for_module(
    config: &Config,
    module_id: &str,
    classification: &ModuleClassification,
) -> Vec<String> {
    let label = config.label_for(module_id);
    let mut notes = vec![match classification.label {
        ModuleLabel::Weak => format!(
            "Performance in {label} suggests a likely weakness (P(weak)={:.2}).",
            classification.p_weak
        ),
        ModuleLabel::Strong => format!(
            "Performance in {label} appears strong (P(strong)={:.2}).",
            classification.p_strong
        ),
        ModuleLabel::Uncertain => {
            format!("Results in {label} are still uncertain; more data would improve confidence.")
        }
    }];
    if classification.slow_correct_ratio > 0.5 {
        notes.push(format!(
            "Correct responses in {label} were often unusually slow, which can indicate effortful compensation."
        ));
    }
    if classification.rapid_guess_ratio > 0.2 {
        notes.push(format!(
            "A notable share of incorrect responses in {label} were unusually fast, consistent with guessing."
        ));
    }
    notes
}

/// Aggregate per-module classifications into a single risk score,
/// category, confidence, and explanation object.
///
/// Permits zero administered items (§7 `EmptyState`): the result is still
/// computed, just with maximal per-module entropy and therefore minimal
/// confidence, rather than refused outright. Only a session with no
/// configured modules at all is a structural error.
///
/// The RT adjustment is the single exception this contract allows to the
/// otherwise purely posterior-driven `risk_score`: `+0.05` exactly when a
/// `ran` module exists, its `slow_correct_ratio` exceeds `0.5`, and it did
/// not already classify as weak. No other adjustment (in particular, no
/// combined-evidence override across modules) is part of this contract.
pub fn compute_global_risk(config: &Config, session: &SessionState) -> DysResult<GlobalRiskResult> {
    if session.modules.is_empty() {
        return Err(DysError::EmptyState(
            "session has no configured modules".to_string(),
        ));
    }

    let classifications: BTreeMap<String, ModuleClassification> = session
        .modules
        .iter()
        .map(|(module_id, stats)| (module_id.clone(), classify_module(config, stats)))
        .collect();

    let base_score: f64 = classifications
        .iter()
        .map(|(module_id, c)| config.weight_for(module_id) * c.p_weak)
        .sum();

    let ran_adjustment = classifications
        .get("ran")
        .filter(|c| c.slow_correct_ratio > 0.5 && c.label != ModuleLabel::Weak)
        .map(|_| 0.05)
        .unwrap_or(0.0);

    let risk_score = (base_score + ran_adjustment).clamp(0.0, 1.0);
    let category = category_for(config, risk_score);

    let mean_entropy: f64 = session.modules.values().map(|m| m.entropy).sum::<f64>()
        / session.modules.len() as f64;
    let confidence = (1.0 - mean_entropy).clamp(0.0, 1.0);

    let modules_explanation: BTreeMap<String, ModuleExplanation> = classifications
        .iter()
        .map(|(module_id, classification)| {
            let stats = &session.modules[module_id];
            let notes = notes_for_module(config, module_id, classification);
            (
                module_id.clone(),
                ModuleExplanation {
                    label: classification.label,
                    p_weak: classification.p_weak,
                    p_strong: classification.p_strong,
                    entropy: stats.entropy,
                    num_items: stats.num_items,
                    avg_rt: classification.avg_rt,
                    slow_correct_ratio: classification.slow_correct_ratio,
                    rapid_guess_ratio: classification.rapid_guess_ratio,
                    notes,
                },
            )
        })
        .collect();

    let explanation = ExplanationObject {
        global: GlobalExplanation {
            category,
            risk_score,
            confidence,
        },
        modules: modules_explanation,
    };

    Ok(GlobalRiskResult {
        risk_category: category,
        risk_score,
        confidence,
        modules: classifications,
        explanation,
    })
}
