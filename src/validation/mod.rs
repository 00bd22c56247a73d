//! Post-fix validation, regression analysis and rollback

pub mod regression;
pub mod rollback;
pub mod validator;

pub use regression::analyze_regressions;
pub use rollback::{RollbackAttempt, RollbackManager, RollbackRecord};
pub use validator::{
    component_key, decide_status, regression_probes, select_probes, FixValidator, DEFAULT_ROLLBACK_THRESHOLD,
    INTEGRATION_BASELINE_KEY,
};
