//! Keyword classification of failing test outcomes
//!
//! Rules are data: the first rule whose keywords match the failure message
//! decides the issue type. When nothing matches, the suite the test came
//! from decides.

use crate::models::{Issue, IssueType, Severity, TestResult, TestStatus};

/// Harness suite a test result was reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestSuite {
    Dependency,
    Client,
    Database,
    StateMachine,
    ApiEndpoint,
    Workflow,
    Permission,
}

impl TestSuite {
    /// Component the suite exercises.
    pub fn component(&self) -> &'static str {
        match self {
            TestSuite::Dependency => "lambda_layers",
            TestSuite::Client => "openai_client",
            TestSuite::Database => "dynamodb",
            TestSuite::StateMachine | TestSuite::Workflow => "step_functions",
            TestSuite::ApiEndpoint => "api_gateway",
            TestSuite::Permission => "iam_roles",
        }
    }

    pub fn default_issue_type(&self) -> IssueType {
        match self {
            TestSuite::Dependency => IssueType::Dependency,
            TestSuite::Client | TestSuite::Database => IssueType::Configuration,
            TestSuite::StateMachine | TestSuite::ApiEndpoint | TestSuite::Workflow => IssueType::Integration,
            TestSuite::Permission => IssueType::Permission,
        }
    }
}

/// One row of the classification table
#[derive(Debug)]
pub struct ClassificationRule {
    pub issue_type: IssueType,
    pub keywords: &'static [&'static str],
    /// Overrides the suite's component when set
    pub component: Option<&'static str>,
    pub suggested_fix: &'static str,
    pub resolution_steps: &'static [&'static str],
}

impl ClassificationRule {
    fn matches(&self, haystack: &str) -> bool {
        self.keywords.iter().any(|k| haystack.contains(k))
    }
}

pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        issue_type: IssueType::Dependency,
        keywords: &["modulenotfound", "no module named", "importerror", "import", "module", "package"],
        component: Some("lambda_layers"),
        suggested_fix: "Bundle the missing package in the function's dependency layer",
        resolution_steps: &[
            "Identify the missing package from the import error",
            "Add the package to the dependency layer build",
            "Publish the layer and attach it to the function",
        ],
    },
    ClassificationRule {
        issue_type: IssueType::Configuration,
        keywords: &[
            "reserved keyword",
            "reserved key",
            "api key",
            "api_key",
            "environment variable",
            "configuration",
        ],
        component: None,
        suggested_fix: "Correct the function configuration",
        resolution_steps: &[
            "Inspect the function environment variables",
            "Remove reserved keys and set missing values",
            "Update the function configuration",
        ],
    },
    ClassificationRule {
        issue_type: IssueType::Integration,
        keywords: &["state machine", "statemachine", "step function", "endpoint", "execution failed"],
        component: None,
        suggested_fix: "Reconnect the workflow and gateway integrations",
        resolution_steps: &[
            "Describe the state machine and verify its definition",
            "Check that the gateway integration targets the state machine",
            "Re-run a manual execution",
        ],
    },
    ClassificationRule {
        issue_type: IssueType::Permission,
        keywords: &["permission", "access", "not authorized", "unauthorized", "forbidden"],
        component: Some("iam_roles"),
        suggested_fix: "Grant the missing permission to the execution role",
        resolution_steps: &[
            "Identify the denied action from the error",
            "Attach a policy allowing the action to the role",
            "Retry the failing call",
        ],
    },
    ClassificationRule {
        issue_type: IssueType::Network,
        keywords: &["timeout", "timed out", "connection", "network", "unreachable"],
        component: None,
        suggested_fix: "Check connectivity and timeouts between services",
        resolution_steps: &[
            "Check the endpoint is reachable",
            "Increase the client or function timeout",
        ],
    },
];

/// First rule matching `text`, case-insensitively.
pub fn classify(text: &str) -> Option<&'static ClassificationRule> {
    let haystack = text.to_lowercase();
    CLASSIFICATION_RULES.iter().find(|rule| rule.matches(&haystack))
}

fn fallback_fix(issue_type: IssueType) -> (&'static str, &'static [&'static str]) {
    match issue_type {
        IssueType::Dependency => (
            "Review the function's packaged dependencies",
            &["Rebuild the deployment package", "Redeploy the function"],
        ),
        IssueType::Configuration => (
            "Review the function configuration",
            &["Compare the configuration with the expected settings"],
        ),
        IssueType::Integration => (
            "Review the service integration",
            &["Trace the failing call across services"],
        ),
        IssueType::Permission => (
            "Review the role policies",
            &["Compare attached policies with the required actions"],
        ),
        IssueType::Network => (
            "Review network reachability",
            &["Check endpoint reachability and timeouts"],
        ),
    }
}

/// ERROR status or a critical/fatal message is CRITICAL, permission or
/// access trouble is HIGH, warnings are LOW, the rest MEDIUM.
pub fn infer_severity(status: TestStatus, message: &str) -> Severity {
    let message = message.to_lowercase();
    if status == TestStatus::Error || message.contains("critical") || message.contains("fatal") {
        Severity::Critical
    } else if message.contains("permission") || message.contains("access") {
        Severity::High
    } else if message.contains("warning") {
        Severity::Low
    } else {
        Severity::Medium
    }
}

/// Turns one failing result into an issue; passing and skipped results yield `None`.
pub fn classify_failure(suite: TestSuite, result: &TestResult) -> Option<Issue> {
    if !result.is_failure() {
        return None;
    }

    let rule = classify(&result.message).or_else(|| classify(&result.test_name));
    let issue_type = rule.map(|r| r.issue_type).unwrap_or_else(|| suite.default_issue_type());
    let component = rule.and_then(|r| r.component).unwrap_or_else(|| suite.component());
    let (suggested_fix, steps) = match rule {
        Some(rule) => (rule.suggested_fix, rule.resolution_steps),
        None => fallback_fix(issue_type),
    };

    let message = result.message.trim();
    let description = if message.is_empty() {
        format!("{}: failed with status {}", result.test_name, result.status)
    } else {
        format!("{}: {}", result.test_name, message)
    };

    Some(Issue::new(
        issue_type,
        infer_severity(result.status, &result.message),
        component,
        description,
        suggested_fix,
        steps.iter().map(|s| s.to_string()).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_classification() {
        assert_eq!(classify("ModuleNotFoundError: No module named 'x'").unwrap().issue_type, IssueType::Dependency);
        assert_eq!(
            classify("AWS_REGION is a reserved keyword").unwrap().issue_type,
            IssueType::Configuration
        );
        assert_eq!(classify("Invalid API key provided").unwrap().issue_type, IssueType::Configuration);
        assert_eq!(classify("State machine does not exist").unwrap().issue_type, IssueType::Integration);
        assert_eq!(classify("Endpoint returned 502").unwrap().issue_type, IssueType::Integration);
        assert_eq!(classify("User is not authorized to perform").unwrap().issue_type, IssueType::Permission);
        assert_eq!(classify("Read timed out").unwrap().issue_type, IssueType::Network);
        assert!(classify("assertion mismatch").is_none());
    }

    #[test]
    fn test_severity_inference() {
        assert_eq!(infer_severity(TestStatus::Error, "anything"), Severity::Critical);
        assert_eq!(infer_severity(TestStatus::Fail, "FATAL: layer missing"), Severity::Critical);
        assert_eq!(infer_severity(TestStatus::Fail, "Access denied"), Severity::High);
        assert_eq!(infer_severity(TestStatus::Fail, "warning: deprecated runtime"), Severity::Low);
        assert_eq!(infer_severity(TestStatus::Fail, "unexpected output"), Severity::Medium);
    }

    #[test]
    fn test_passing_results_yield_nothing() {
        let result = TestResult::new("t", TestStatus::Pass, "module ok");
        assert!(classify_failure(TestSuite::Dependency, &result).is_none());
        let skipped = TestResult::new("t", TestStatus::Skip, "");
        assert!(classify_failure(TestSuite::Dependency, &skipped).is_none());
    }

    #[test]
    fn test_unmatched_failure_uses_suite() {
        let result = TestResult::new("put_item", TestStatus::Fail, "unexpected item count");
        let issue = classify_failure(TestSuite::Database, &result).unwrap();
        assert_eq!(issue.issue_type(), IssueType::Configuration);
        assert_eq!(issue.component(), "dynamodb");
        assert!(issue.description().contains("put_item"));
        assert!(!issue.resolution_steps().is_empty());
    }

    #[test]
    fn test_permission_rule_overrides_component() {
        let result = TestResult::new("invoke", TestStatus::Fail, "AccessDeniedException: not authorized");
        let issue = classify_failure(TestSuite::Client, &result).unwrap();
        assert_eq!(issue.issue_type(), IssueType::Permission);
        assert_eq!(issue.component(), "iam_roles");
        assert_eq!(issue.severity(), Severity::High);
    }
}
