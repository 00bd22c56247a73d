mod common;

use std::sync::Arc;

use common::*;
use issue_resolver::testers::Probe;
use issue_resolver::validation::{analyze_regressions, FixValidator};
use issue_resolver::{
    ComponentTestReport, IntegrationTestReport, IssueType, ResolutionResult, Severity, TestStatus, ValidationStatus,
};

fn validator(testers: &ScriptedTesters) -> FixValidator {
    FixValidator::new(Arc::new(testers.clone()), Arc::new(testers.clone()))
}

fn baseline_reports() -> (Vec<ComponentTestReport>, Vec<IntegrationTestReport>) {
    let component = ComponentTestReport {
        lambda_function: FUNCTION.to_string(),
        dependency_tests: vec![pass("t1"), fail("t2", "No module named 'x'")],
        ..Default::default()
    };
    let integration = IntegrationTestReport {
        state_machine_tests: vec![fail("describe_workflow", "State machine does not exist")],
        api_endpoint_tests: vec![pass("post_document")],
        ..Default::default()
    };
    (vec![component], vec![integration])
}

#[tokio::test]
async fn test_improved_post_fix_run_is_resolved() {
    let testers = ScriptedTesters::new();
    testers.set(Probe::Dependencies, vec![pass("t1"), pass("t2")]).await;
    let mut validator = validator(&testers);
    let (components, integrations) = baseline_reports();
    validator.set_baseline_results(&components, &integrations);

    let dependency = issue(IssueType::Dependency, Severity::High, "lambda_layers", "t2: No module named 'x'");
    let result = validator
        .validate_resolution(&ResolutionResult::applied(&dependency, "attached layer"))
        .await
        .unwrap();

    assert_eq!(result.pre_fix_tests.len(), 2);
    assert_eq!(result.validation_status, ValidationStatus::Resolved);
    assert_eq!(testers.get_call_count(Probe::ApiEndpoints).await, 1);
    let verification = result.resolution_result.verification_result.as_ref().unwrap();
    assert_eq!(verification.test_name, "t1");
    assert_eq!(verification.status, TestStatus::Pass);
}

#[tokio::test]
async fn test_regression_probe_failure_wins() {
    let testers = ScriptedTesters::new();
    testers.set(Probe::Dependencies, vec![pass("t1"), pass("t2")]).await;
    testers.set(Probe::ApiEndpoints, vec![fail("post_document", "502 Bad Gateway")]).await;
    let mut validator = validator(&testers);
    let (components, integrations) = baseline_reports();
    validator.set_baseline_results(&components, &integrations);

    let dependency = issue(IssueType::Dependency, Severity::High, "lambda_layers", "t2: No module named 'x'");
    let result = validator
        .validate_resolution(&ResolutionResult::applied(&dependency, "attached layer"))
        .await
        .unwrap();

    assert_eq!(result.validation_status, ValidationStatus::RegressionDetected);
    assert_eq!(result.regression_tests.len(), 1);
}

#[tokio::test]
async fn test_status_ignores_resolution_flag() {
    let testers = ScriptedTesters::new();
    testers.set(Probe::Dependencies, vec![pass("t1"), pass("t2")]).await;
    let mut validator = validator(&testers);
    let (components, integrations) = baseline_reports();
    validator.set_baseline_results(&components, &integrations);

    let dependency = issue(IssueType::Dependency, Severity::High, "lambda_layers", "t2: No module named 'x'");
    let result = validator
        .validate_resolution(&ResolutionResult::failed(&dependency, "layer not configured"))
        .await
        .unwrap();

    assert_eq!(result.validation_status, ValidationStatus::Resolved);
}

#[tokio::test]
async fn test_integration_issue_includes_integration_baseline() {
    let testers = ScriptedTesters::new();
    testers
        .set(Probe::StateMachineExists, vec![fail("describe_workflow", "State machine does not exist")])
        .await;
    let mut validator = validator(&testers);
    let (components, integrations) = baseline_reports();
    validator.set_baseline_results(&components, &integrations);

    let integration = issue(
        IssueType::Integration,
        Severity::High,
        "step_functions",
        "describe_workflow: State machine does not exist",
    );
    let result = validator
        .validate_resolution(&ResolutionResult::applied(&integration, "verified"))
        .await
        .unwrap();

    // step_functions baseline plus the rest of the integration run, without duplicates
    let names: Vec<&str> = result.pre_fix_tests.iter().map(|t| t.test_name.as_str()).collect();
    assert_eq!(names, vec!["describe_workflow", "post_document"]);
    assert_eq!(result.validation_status, ValidationStatus::NotResolved);
}

#[tokio::test]
async fn test_tester_failure_counts_against_resolution() {
    let testers = ScriptedTesters::new();
    testers.fail(Probe::OpenAiClient, "connection refused").await;
    let mut validator = validator(&testers);
    validator.set_baseline_results(&[], &[]);

    let configuration = issue(IssueType::Configuration, Severity::Medium, "openai_client", "Invalid API key");
    let result = validator
        .validate_resolution(&ResolutionResult::applied(&configuration, "set key"))
        .await
        .unwrap();

    assert_eq!(result.post_fix_tests.len(), 1);
    assert_eq!(result.post_fix_tests[0].status, TestStatus::Error);
    assert!(result.post_fix_tests[0].message.contains("connection refused"));
    assert_eq!(result.validation_status, ValidationStatus::NotResolved);
    assert_eq!(
        result.resolution_result.verification_result.as_ref().map(|t| t.status),
        Some(TestStatus::Error)
    );
}

#[tokio::test]
async fn test_critical_regression_reason_mentions_critical() {
    let testers = ScriptedTesters::new();
    testers.set(Probe::ApiEndpoints, vec![fail("post_document", "502")]).await;
    let mut validator = validator(&testers);
    validator.set_baseline_results(&[], &[]);

    let critical = issue(IssueType::Dependency, Severity::Critical, "lambda_layers", "No module named 'x'");
    let resolutions = vec![ResolutionResult::applied(&critical, "attached layer")];
    let results = validator.validate_resolutions(&resolutions).await.unwrap();

    let (rollback, reason) = validator.recommend_rollback(&results);
    assert!(rollback);
    assert!(reason.contains("critical"));
}

#[test]
fn test_new_failures_only_from_post_run() {
    let pre = vec![pass("t1"), fail("t2", "broken")];
    let post = vec![fail("t1", "now broken"), pass("t2"), fail("t3", "new")];

    let analysis = analyze_regressions(&pre, &post);
    let post_names: Vec<&str> = post.iter().map(|t| t.test_name.as_str()).collect();
    assert_eq!(analysis.new_failures.len(), 2);
    for failure in &analysis.new_failures {
        assert!(matches!(failure.status, TestStatus::Fail | TestStatus::Error));
        assert!(post_names.contains(&failure.test_name.as_str()));
    }
}
