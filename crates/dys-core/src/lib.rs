//! Adaptive dyslexia-screening decision core.
//!
//! A synchronous, in-memory Bayesian engine: given a session's current
//! posterior over each module's latent ability, it selects the next item
//! to administer, updates on the observed response, and decides when each
//! module (and the session as a whole) has gathered enough evidence to
//! stop and report a risk assessment. Persistence, transport, item
//! content, and authentication are all the host application's concern.

pub mod bayes;
pub mod config;
pub mod engine;
pub mod error;
pub mod risk;
pub mod rt_fatigue;
pub mod selection;
pub mod state;
pub mod stopping;

pub use config::Config;
pub use engine::{process_response, start_new_test, ProcessResponseOutcome, StartTestOutcome};
pub use error::{DysError, DysResult};
pub use risk::{compute_global_risk, GlobalRiskResult, ModuleLabel, RiskCategory};
pub use selection::CandidateItem;
pub use state::{ModuleStats, SessionState};
