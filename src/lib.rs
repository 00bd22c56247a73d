//! Issue Resolver - automated triage, remediation and validation of failing
//! cloud application tests.
//!
//! Test reports go through the [`analyzer`], which classifies and orders
//! issues; [`fixes`] applies remediations; [`validation`] re-tests, detects
//! regressions and rolls back; the [`orchestrator`] ties one cycle together.

pub mod analyzer;
pub mod cloud;
pub mod config;
pub mod error;
pub mod fixes;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod testers;
pub mod validation;

// Re-export commonly used types
pub use analyzer::{IssueAnalysis, IssueAnalyzer};
pub use config::{FixConfiguration, ResolverConfig, ResourceTargets};
pub use error::{CloudError, ResolverError, Result};
pub use fixes::{BatchFixApplicator, FixApplicator};
pub use models::{
    ComponentTestReport, IntegrationTestReport, Issue, IssueType, ResolutionResult, ResolutionSummary, Severity,
    TestResult, TestStatus, ValidationResult, ValidationStatus,
};
pub use orchestrator::ResolutionOrchestrator;
pub use report::generate_report;
pub use validation::{FixValidator, RollbackManager};
