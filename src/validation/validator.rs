use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::regression::analyze_regressions;
use crate::analyzer::TestSuite;
use crate::error::{ResolverError, Result};
use crate::models::{
    ComponentTestReport, IntegrationTestReport, Issue, IssueType, ResolutionResult, Severity, TestResult,
    TestStatus, ValidationResult, ValidationStatus,
};
use crate::testers::{ComponentTester, IntegrationTester, Probe};

pub const INTEGRATION_BASELINE_KEY: &str = "integration";

/// Default share of regressions above which rollback is recommended
pub const DEFAULT_ROLLBACK_THRESHOLD: f64 = 0.3;

const PROBE_KEYWORDS: &[(&[&str], Probe)] = &[
    (&["dependency", "package", "module", "import", "layer"], Probe::Dependencies),
    (&["openai", "api key", "api_key"], Probe::OpenAiClient),
    (&["dynamodb", "table"], Probe::DynamoDbOperations),
    (&["state machine", "statemachine", "step function", "step_function"], Probe::StateMachineExists),
    (&["permission", "access", "iam", "unauthorized"], Probe::ExecutionPermissions),
    (&["endpoint", "gateway"], Probe::ApiEndpoints),
    (&["workflow", "execution"], Probe::ManualExecution),
];

pub fn component_key(component: &str) -> String {
    format!("component_{}", component)
}

/// Probes to re-run for `issue`: keyword matches in table order, else the
/// issue type's default set.
pub fn select_probes(issue: &Issue) -> Vec<Probe> {
    let haystack = format!("{} {}", issue.component(), issue.description()).to_lowercase();
    let matched: Vec<Probe> = PROBE_KEYWORDS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(_, probe)| *probe)
        .collect();

    if !matched.is_empty() {
        return matched;
    }

    match issue.issue_type() {
        IssueType::Dependency => vec![Probe::Dependencies],
        IssueType::Configuration => vec![Probe::OpenAiClient, Probe::DynamoDbOperations],
        IssueType::Integration => vec![Probe::StateMachineExists, Probe::ApiEndpoints],
        IssueType::Permission => vec![Probe::ExecutionPermissions],
        IssueType::Network => vec![Probe::ApiEndpoints],
    }
}

/// Probes orthogonal to the fix, watched for collateral damage.
pub fn regression_probes(issue_type: IssueType) -> Vec<Probe> {
    let mut probes = Vec::new();
    if issue_type != IssueType::Dependency {
        probes.push(Probe::Dependencies);
    }
    if issue_type != IssueType::Integration {
        probes.push(Probe::ApiEndpoints);
    }
    probes
}

/// Decision order: regression, then clean post-fix run, then improvement.
pub fn decide_status(pre: &[TestResult], post: &[TestResult], regression: &[TestResult]) -> ValidationStatus {
    let failures = |tests: &[TestResult]| tests.iter().filter(|t| t.is_failure()).count();

    if failures(regression) > 0 {
        ValidationStatus::RegressionDetected
    } else if failures(post) == 0 {
        ValidationStatus::Resolved
    } else if failures(post) < failures(pre) {
        ValidationStatus::PartiallyResolved
    } else {
        ValidationStatus::NotResolved
    }
}

/// Re-tests after fixes and compares against the cycle's baseline
pub struct FixValidator {
    component_tester: Arc<dyn ComponentTester>,
    integration_tester: Arc<dyn IntegrationTester>,
    baseline: Option<HashMap<String, Vec<TestResult>>>,
    rollback_threshold: f64,
}

impl FixValidator {
    pub fn new(component_tester: Arc<dyn ComponentTester>, integration_tester: Arc<dyn IntegrationTester>) -> Self {
        Self {
            component_tester,
            integration_tester,
            baseline: None,
            rollback_threshold: DEFAULT_ROLLBACK_THRESHOLD,
        }
    }

    pub fn with_rollback_threshold(mut self, threshold: f64) -> Self {
        self.rollback_threshold = threshold;
        self
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self, key: &str) -> Option<&[TestResult]> {
        self.baseline.as_ref()?.get(key).map(Vec::as_slice)
    }

    /// Indexes pre-fix outcomes: each suite under `component_<name>` of the
    /// component it exercises, and every integration test again under
    /// `integration`. Replaces any earlier baseline.
    pub fn set_baseline_results(
        &mut self,
        component_reports: &[ComponentTestReport],
        integration_reports: &[IntegrationTestReport],
    ) {
        let mut baseline: HashMap<String, Vec<TestResult>> = HashMap::new();

        for report in component_reports {
            let suites = [
                (TestSuite::Dependency, &report.dependency_tests),
                (TestSuite::Client, &report.client_tests),
                (TestSuite::Database, &report.database_tests),
            ];
            for (suite, tests) in suites {
                baseline
                    .entry(component_key(suite.component()))
                    .or_default()
                    .extend(tests.iter().cloned());
            }
        }

        for report in integration_reports {
            let suites = [
                (TestSuite::StateMachine, &report.state_machine_tests),
                (TestSuite::ApiEndpoint, &report.api_endpoint_tests),
                (TestSuite::Workflow, &report.workflow_tests),
                (TestSuite::Permission, &report.permission_tests),
            ];
            for (suite, tests) in suites {
                baseline
                    .entry(component_key(suite.component()))
                    .or_default()
                    .extend(tests.iter().cloned());
            }
        }

        let integration: Vec<TestResult> = integration_reports.iter().flat_map(|r| r.all_tests().cloned()).collect();
        baseline.insert(INTEGRATION_BASELINE_KEY.to_string(), integration);

        info!(keys = baseline.len(), "Baseline test results recorded");
        self.baseline = Some(baseline);
    }

    pub async fn validate_resolution(&self, resolution: &ResolutionResult) -> Result<ValidationResult> {
        let baseline = self.baseline.as_ref().ok_or(ResolverError::BaselineNotSet)?;
        let issue = &resolution.issue;

        let mut pre_fix_tests = baseline
            .get(&component_key(issue.component()))
            .cloned()
            .unwrap_or_default();
        if issue.issue_type() == IssueType::Integration {
            if let Some(integration) = baseline.get(INTEGRATION_BASELINE_KEY) {
                let extra: Vec<TestResult> = integration
                    .iter()
                    .filter(|t| !pre_fix_tests.iter().any(|p| p.test_name == t.test_name))
                    .cloned()
                    .collect();
                pre_fix_tests.extend(extra);
            }
        }

        let post_fix_tests = self.run_probes(&select_probes(issue)).await;
        let regression_tests = self.run_probes(&regression_probes(issue.issue_type())).await;

        let validation_status = decide_status(&pre_fix_tests, &post_fix_tests, &regression_tests);
        let comparison = analyze_regressions(&pre_fix_tests, &post_fix_tests);
        let failing = |tests: &[TestResult]| tests.iter().filter(|t| t.is_failure()).count();

        let validation_details = format!(
            "{}: {}/{} post-fix tests failing (baseline {}/{}), {} regression failures, {} new failures",
            validation_status,
            failing(&post_fix_tests),
            post_fix_tests.len(),
            failing(&pre_fix_tests),
            pre_fix_tests.len(),
            failing(&regression_tests),
            comparison.new_failures.len()
        );

        info!(
            component = issue.component(),
            status = %validation_status,
            resolution_applied = resolution.resolution_applied,
            "Validated resolution"
        );

        // first remaining failure, else the first post-fix result
        let verification = post_fix_tests
            .iter()
            .find(|t| t.is_failure())
            .or_else(|| post_fix_tests.first())
            .cloned();
        let resolution_result = match verification {
            Some(test) => resolution.clone().with_verification(test),
            None => resolution.clone(),
        };

        Ok(ValidationResult {
            resolution_result,
            validation_status,
            pre_fix_tests,
            post_fix_tests,
            regression_tests,
            validation_details,
        })
    }

    pub async fn validate_resolutions(&self, resolutions: &[ResolutionResult]) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::with_capacity(resolutions.len());
        for resolution in resolutions {
            results.push(self.validate_resolution(resolution).await?);
        }
        Ok(results)
    }

    async fn run_probes(&self, probes: &[Probe]) -> Vec<TestResult> {
        let mut results = Vec::new();
        for probe in probes {
            results.extend(self.run_probe(*probe).await);
        }
        results
    }

    async fn run_probe(&self, probe: Probe) -> Vec<TestResult> {
        debug!(probe = probe.name(), "Re-running probe");
        let outcome = match probe {
            Probe::Dependencies => self.component_tester.test_dependencies().await,
            Probe::OpenAiClient => self.component_tester.test_openai_client().await,
            Probe::DynamoDbOperations => self.component_tester.test_dynamodb_operations().await,
            Probe::StateMachineExists => self.integration_tester.test_state_machine_exists().await,
            Probe::ExecutionPermissions => self.integration_tester.test_execution_permissions().await,
            Probe::ApiEndpoints => self.integration_tester.test_api_endpoints().await,
            Probe::ManualExecution => self.integration_tester.run_manual_execution().await,
        };

        match outcome {
            Ok(results) => results,
            Err(err) => {
                warn!(probe = probe.name(), error = %err, "Tester failed during validation");
                vec![TestResult::new(
                    probe.name(),
                    TestStatus::Error,
                    format!("Tester raised during validation: {:#}", err),
                )]
            }
        }
    }

    /// Returns whether to roll back and why.
    pub fn recommend_rollback(&self, results: &[ValidationResult]) -> (bool, String) {
        if results.is_empty() {
            return (false, "No validation results to evaluate".to_string());
        }

        let regressions: Vec<&ValidationResult> = results
            .iter()
            .filter(|r| r.validation_status == ValidationStatus::RegressionDetected)
            .collect();

        let critical_regressions = regressions
            .iter()
            .filter(|r| r.issue().severity() == Severity::Critical)
            .count();
        if critical_regressions > 0 {
            return (
                true,
                format!(
                    "Rollback recommended: {} critical issue fix(es) introduced regressions",
                    critical_regressions
                ),
            );
        }

        let ratio = regressions.len() as f64 / results.len() as f64;
        if ratio > self.rollback_threshold {
            return (
                true,
                format!(
                    "Rollback recommended: {:.0}% of fixes caused regressions (threshold {:.0}%)",
                    ratio * 100.0,
                    self.rollback_threshold * 100.0
                ),
            );
        }

        let critical_resolved = results
            .iter()
            .filter(|r| {
                r.validation_status == ValidationStatus::Resolved && r.issue().severity() == Severity::Critical
            })
            .count();
        if critical_resolved > regressions.len() {
            return (
                false,
                format!(
                    "Continue: {} critical issues resolved outweigh {} regressions",
                    critical_resolved,
                    regressions.len()
                ),
            );
        }

        (false, format!("Continue: {} regressions within tolerance", regressions.len()))
    }
}
