//! Data model shared by the analyzer, the fix applicator and the validator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single probe as reported by the test harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl TestStatus {
    /// FAIL and ERROR both count as failing outcomes.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Individual test outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub status: TestStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Seconds
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TestResult {
    pub fn new<N: Into<String>, M: Into<String>>(test_name: N, status: TestStatus, message: M) -> Self {
        Self {
            test_name: test_name.into(),
            status,
            message: message.into(),
            details: None,
            execution_time: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = seconds;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

/// Per-function report produced by the component test harness
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentTestReport {
    pub lambda_function: String,
    #[serde(default)]
    pub dependency_tests: Vec<TestResult>,
    #[serde(default)]
    pub client_tests: Vec<TestResult>,
    #[serde(default)]
    pub database_tests: Vec<TestResult>,
    #[serde(default)]
    pub overall_status: Option<TestStatus>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Report produced by the integration test harness
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationTestReport {
    #[serde(default)]
    pub state_machine_tests: Vec<TestResult>,
    #[serde(default)]
    pub api_endpoint_tests: Vec<TestResult>,
    #[serde(default)]
    pub workflow_tests: Vec<TestResult>,
    #[serde(default)]
    pub permission_tests: Vec<TestResult>,
    #[serde(default)]
    pub overall_status: Option<TestStatus>,
    #[serde(default)]
    pub identified_issues: Vec<Issue>,
}

impl IntegrationTestReport {
    pub fn all_tests(&self) -> impl Iterator<Item = &TestResult> {
        self.state_machine_tests
            .iter()
            .chain(self.api_endpoint_tests.iter())
            .chain(self.workflow_tests.iter())
            .chain(self.permission_tests.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueType {
    Dependency,
    Configuration,
    Integration,
    Permission,
    Network,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueType::Dependency => write!(f, "DEPENDENCY"),
            IssueType::Configuration => write!(f, "CONFIGURATION"),
            IssueType::Integration => write!(f, "INTEGRATION"),
            IssueType::Permission => write!(f, "PERMISSION"),
            IssueType::Network => write!(f, "NETWORK"),
        }
    }
}

/// Issue severity, ordered from least to most severe so that `max()` and
/// descending sorts work directly on the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by impact scoring.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.7,
            Severity::Medium => 0.4,
            Severity::Low => 0.1,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
        }
    }
}

/// A classified unit of remediation.
///
/// Fields are private: an issue is immutable once built and always carries at
/// least one resolution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IssueRecord")]
pub struct Issue {
    issue_type: IssueType,
    severity: Severity,
    component: String,
    description: String,
    suggested_fix: String,
    resolution_steps: Vec<String>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct IssueRecord {
    issue_type: IssueType,
    severity: Severity,
    component: String,
    description: String,
    #[serde(default)]
    suggested_fix: String,
    #[serde(default)]
    resolution_steps: Vec<String>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl TryFrom<IssueRecord> for Issue {
    type Error = String;

    fn try_from(record: IssueRecord) -> Result<Self, Self::Error> {
        if record.component.trim().is_empty() {
            return Err("issue component must not be empty".to_string());
        }
        let mut issue = Issue::new(
            record.issue_type,
            record.severity,
            record.component,
            record.description,
            record.suggested_fix,
            record.resolution_steps,
        );
        issue.timestamp = record.timestamp;
        Ok(issue)
    }
}

impl Issue {
    /// Builds an issue. An empty step list is replaced by a single step
    /// derived from the suggested fix.
    pub fn new<C, D, F>(
        issue_type: IssueType,
        severity: Severity,
        component: C,
        description: D,
        suggested_fix: F,
        resolution_steps: Vec<String>,
    ) -> Self
    where
        C: Into<String>,
        D: Into<String>,
        F: Into<String>,
    {
        let suggested_fix = suggested_fix.into();
        let mut resolution_steps: Vec<String> = resolution_steps
            .into_iter()
            .filter(|step| !step.trim().is_empty())
            .collect();
        if resolution_steps.is_empty() {
            resolution_steps.push(if suggested_fix.is_empty() {
                format!("Investigate {} failure manually", issue_type)
            } else {
                suggested_fix.clone()
            });
        }

        Self {
            issue_type,
            severity,
            component: component.into(),
            description: description.into(),
            suggested_fix,
            resolution_steps,
            timestamp: Utc::now(),
        }
    }

    pub fn issue_type(&self) -> IssueType {
        self.issue_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn suggested_fix(&self) -> &str {
        &self.suggested_fix
    }

    pub fn resolution_steps(&self) -> &[String] {
        &self.resolution_steps
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Copy of this issue with a different severity; used when merging
    /// duplicates.
    pub(crate) fn escalated(&self, severity: Severity) -> Self {
        Self {
            severity,
            ..self.clone()
        }
    }
}

/// Outcome of applying a fix for one issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub issue: Issue,
    pub resolution_applied: bool,
    pub resolution_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<TestResult>,
    /// Snapshot keys taken while applying this fix
    #[serde(default)]
    pub backup_keys: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ResolutionResult {
    pub fn applied<S: Into<String>>(issue: &Issue, details: S) -> Self {
        Self::build(issue, true, details.into())
    }

    pub fn failed<S: Into<String>>(issue: &Issue, details: S) -> Self {
        Self::build(issue, false, details.into())
    }

    fn build(issue: &Issue, resolution_applied: bool, details: String) -> Self {
        let resolution_details = if details.trim().is_empty() {
            format!("No details reported for {} issue on {}", issue.issue_type(), issue.component())
        } else {
            details
        };

        Self {
            issue: issue.clone(),
            resolution_applied,
            resolution_details,
            verification_result: None,
            backup_keys: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_backups(mut self, backup_keys: Vec<String>) -> Self {
        self.backup_keys = backup_keys;
        self
    }

    pub fn with_verification(mut self, result: TestResult) -> Self {
        self.verification_result = Some(result);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Resolved,
    PartiallyResolved,
    NotResolved,
    RegressionDetected,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Resolved => write!(f, "RESOLVED"),
            ValidationStatus::PartiallyResolved => write!(f, "PARTIALLY_RESOLVED"),
            ValidationStatus::NotResolved => write!(f, "NOT_RESOLVED"),
            ValidationStatus::RegressionDetected => write!(f, "REGRESSION_DETECTED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub resolution_result: ResolutionResult,
    pub validation_status: ValidationStatus,
    pub pre_fix_tests: Vec<TestResult>,
    pub post_fix_tests: Vec<TestResult>,
    pub regression_tests: Vec<TestResult>,
    pub validation_details: String,
}

impl ValidationResult {
    pub fn issue(&self) -> &Issue {
        &self.resolution_result.issue
    }

    /// Results that the rollback manager should try to revert.
    pub fn needs_rollback(&self) -> bool {
        matches!(
            self.validation_status,
            ValidationStatus::RegressionDetected | ValidationStatus::NotResolved
        )
    }
}

/// Comparison of two test runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegressionAnalysis {
    pub new_failures: Vec<TestResult>,
    pub degraded_performance: Vec<TestResult>,
    pub changed_behavior: Vec<TestResult>,
    pub overall_regression_detected: bool,
}

/// Phases of a resolution cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CyclePhase {
    Analyze,
    SetBaseline,
    ApplyFixes,
    Validate,
    DecideRollback,
    Rollback,
    Summarize,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::Analyze => write!(f, "ANALYZE"),
            CyclePhase::SetBaseline => write!(f, "SET_BASELINE"),
            CyclePhase::ApplyFixes => write!(f, "APPLY_FIXES"),
            CyclePhase::Validate => write!(f, "VALIDATE"),
            CyclePhase::DecideRollback => write!(f, "DECIDE_ROLLBACK"),
            CyclePhase::Rollback => write!(f, "ROLLBACK"),
            CyclePhase::Summarize => write!(f, "SUMMARIZE"),
        }
    }
}

/// Terminal artifact of one orchestration cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub total_issues: usize,
    pub resolved: usize,
    pub partially_resolved: usize,
    pub not_resolved: usize,
    pub regressions: usize,
    pub rollback_performed: bool,
    pub rollback_successful: Option<bool>,
    pub details: String,
    pub error: Option<String>,
    pub phases: Vec<CyclePhase>,
    pub validation_results: Vec<ValidationResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ResolutionSummary {
    /// Tallies each validation status and stamps the completion time.
    pub fn from_results(
        validation_results: Vec<ValidationResult>,
        rollback_performed: bool,
        rollback_successful: Option<bool>,
        details: String,
        phases: Vec<CyclePhase>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let count = |status: ValidationStatus| {
            validation_results
                .iter()
                .filter(|r| r.validation_status == status)
                .count()
        };

        Self {
            total_issues: validation_results.len(),
            resolved: count(ValidationStatus::Resolved),
            partially_resolved: count(ValidationStatus::PartiallyResolved),
            not_resolved: count(ValidationStatus::NotResolved),
            regressions: count(ValidationStatus::RegressionDetected),
            rollback_performed,
            rollback_successful,
            details,
            error: None,
            phases,
            validation_results,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// All-zero summary carrying the error that aborted the cycle.
    pub fn failed<S: Into<String>>(error: S, phases: Vec<CyclePhase>, started_at: DateTime<Utc>) -> Self {
        let error = error.into();
        Self {
            total_issues: 0,
            resolved: 0,
            partially_resolved: 0,
            not_resolved: 0,
            regressions: 0,
            rollback_performed: false,
            rollback_successful: None,
            details: format!("Resolution cycle failed: {}", error),
            error: Some(error),
            phases,
            validation_results: Vec::new(),
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Share of issues fully resolved, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_issues == 0 {
            return 0.0;
        }
        (self.resolved as f64 / self.total_issues as f64) * 100.0
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_always_has_resolution_steps() {
        let issue = Issue::new(
            IssueType::Network,
            Severity::Low,
            "api_gateway",
            "Connection reset",
            "Retry the request",
            vec!["  ".to_string()],
        );
        assert_eq!(issue.resolution_steps(), &["Retry the request".to_string()]);
    }

    #[test]
    fn test_severity_ordering_matches_weights() {
        let mut severities = vec![Severity::Medium, Severity::Critical, Severity::Low, Severity::High];
        severities.sort();
        let weights: Vec<f64> = severities.iter().map(Severity::weight).collect();
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(severities.last(), Some(&Severity::Critical));
    }

    #[test]
    fn test_issue_deserialization_fills_missing_steps() {
        let json = serde_json::json!({
            "issue_type": "PERMISSION",
            "severity": "HIGH",
            "component": "iam_roles",
            "description": "AccessDenied on states:StartExecution",
            "suggested_fix": "Grant states:StartExecution to the gateway role"
        });
        let issue: Issue = serde_json::from_value(json).unwrap();
        assert_eq!(issue.issue_type(), IssueType::Permission);
        assert_eq!(issue.resolution_steps().len(), 1);
    }

    #[test]
    fn test_issue_deserialization_rejects_blank_component() {
        let json = serde_json::json!({
            "issue_type": "NETWORK",
            "severity": "LOW",
            "component": " ",
            "description": "timeout"
        });
        assert!(serde_json::from_value::<Issue>(json).is_err());
    }

    #[test]
    fn test_resolution_details_never_empty() {
        let issue = Issue::new(IssueType::Dependency, Severity::High, "lambda_layers", "x", "y", vec![]);
        let result = ResolutionResult::failed(&issue, "");
        assert!(!result.resolution_details.is_empty());
        assert!(!result.resolution_applied);
    }

    #[test]
    fn test_failed_summary_is_all_zero() {
        let summary = ResolutionSummary::failed("boom", vec![CyclePhase::Analyze], Utc::now());
        assert_eq!(summary.total_issues, 0);
        assert_eq!(summary.resolved + summary.regressions, 0);
        assert_eq!(summary.error.as_deref(), Some("boom"));
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn test_test_status_wire_names() {
        let result: TestResult = serde_json::from_value(serde_json::json!({
            "test_name": "t1",
            "status": "ERROR",
            "message": "boom"
        }))
        .unwrap();
        assert_eq!(result.status, TestStatus::Error);
        assert!(result.is_failure());
    }
}
