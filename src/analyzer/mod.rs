//! Issue analysis: classification, impact scoring and dependency-aware ordering

pub mod classifier;
pub mod dependency_graph;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use crate::models::{ComponentTestReport, Issue, IssueType, IntegrationTestReport};

pub use classifier::{classify, classify_failure, infer_severity, ClassificationRule, TestSuite, CLASSIFICATION_RULES};
pub use dependency_graph::{DependencyGraph, DependencyTier};

/// Output of [`IssueAnalyzer::analyze`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueAnalysis {
    pub issues: Vec<Issue>,
    pub dependency_graph: BTreeMap<String, Vec<String>>,
    pub priority_order: Vec<Issue>,
    pub impact_assessment: BTreeMap<String, f64>,
}

/// Converts failing test outcomes into prioritized issues
#[derive(Debug, Clone, Default)]
pub struct IssueAnalyzer {
    graph: DependencyGraph,
}

impl IssueAnalyzer {
    pub fn new() -> Self {
        Self {
            graph: DependencyGraph::standard(),
        }
    }

    pub fn with_graph(graph: DependencyGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn analyze(
        &self,
        component_reports: &[ComponentTestReport],
        integration_reports: &[IntegrationTestReport],
    ) -> IssueAnalysis {
        let issues = self.extract_issues(component_reports, integration_reports);
        let impact_assessment = self.assess_impact(&issues);
        let priority_order = self.prioritize(&issues, &impact_assessment);

        info!(
            issues = issues.len(),
            components = impact_assessment.len(),
            "Issue analysis completed"
        );

        IssueAnalysis {
            issues,
            dependency_graph: self.graph.as_map().clone(),
            priority_order,
            impact_assessment,
        }
    }

    /// Classifies every FAIL/ERROR result. Issues already identified on
    /// integration reports are appended untouched.
    pub fn extract_issues(
        &self,
        component_reports: &[ComponentTestReport],
        integration_reports: &[IntegrationTestReport],
    ) -> Vec<Issue> {
        let mut derived: Vec<Issue> = Vec::new();
        let mut index: HashMap<(IssueType, String, String), usize> = HashMap::new();

        let mut absorb = |issue: Issue| {
            let key = (
                issue.issue_type(),
                issue.component().to_string(),
                issue.description().to_string(),
            );
            match index.get(&key) {
                Some(&position) => {
                    if issue.severity() > derived[position].severity() {
                        derived[position] = derived[position].escalated(issue.severity());
                    }
                }
                None => {
                    index.insert(key, derived.len());
                    derived.push(issue);
                }
            }
        };

        for report in component_reports {
            let suites = [
                (TestSuite::Dependency, &report.dependency_tests),
                (TestSuite::Client, &report.client_tests),
                (TestSuite::Database, &report.database_tests),
            ];
            for (suite, tests) in suites {
                tests
                    .iter()
                    .filter_map(|result| classify_failure(suite, result))
                    .for_each(&mut absorb);
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
                tests
                    .iter()
                    .filter_map(|result| classify_failure(suite, result))
                    .for_each(&mut absorb);
            }
        }

        let mut issues = derived;
        for report in integration_reports {
            issues.extend(report.identified_issues.iter().cloned());
        }

        debug!(issues = issues.len(), "Extracted issues from test reports");
        issues
    }

    /// `impact[c] += weight(severity) * (1 + fan_in(c) / |graph|)` over every issue on `c`.
    pub fn assess_impact(&self, issues: &[Issue]) -> BTreeMap<String, f64> {
        let graph_size = self.graph.len().max(1) as f64;
        let mut impact: BTreeMap<String, f64> = BTreeMap::new();

        for issue in issues {
            let fan_in = self.graph.fan_in(issue.component()) as f64;
            let score = issue.severity().weight() * (1.0 + fan_in / graph_size);
            *impact.entry(issue.component().to_string()).or_insert(0.0) += score;
        }

        impact
    }

    /// Foundation tier first, then integration, then application; within a
    /// tier by descending impact, then descending severity.
    pub fn prioritize(&self, issues: &[Issue], impact: &BTreeMap<String, f64>) -> Vec<Issue> {
        let score = |issue: &Issue| impact.get(issue.component()).copied().unwrap_or(0.0);

        let mut ordered: Vec<Issue> = issues.to_vec();
        ordered.sort_by(|a, b| {
            self.graph
                .tier(a.component())
                .cmp(&self.graph.tier(b.component()))
                .then_with(|| score(b).total_cmp(&score(a)))
                .then_with(|| b.severity().cmp(&a.severity()))
        });
        ordered
    }

    /// Splits the priority order into groups whose issues have disjoint
    /// dependency sets. Groups run in order; a group could run in parallel.
    pub fn get_resolution_order(&self, analysis: &IssueAnalysis) -> Vec<Vec<Issue>> {
        self.group_issues(&analysis.priority_order)
    }

    pub fn group_issues(&self, ordered: &[Issue]) -> Vec<Vec<Issue>> {
        let mut groups: Vec<Vec<Issue>> = Vec::new();
        let mut current: Vec<Issue> = Vec::new();
        let mut touched: BTreeSet<&str> = BTreeSet::new();

        for issue in ordered {
            let deps: BTreeSet<&str> = self
                .graph
                .dependencies(issue.component())
                .iter()
                .map(String::as_str)
                .collect();

            if !current.is_empty() && !deps.is_disjoint(&touched) {
                groups.push(std::mem::take(&mut current));
                touched.clear();
            }

            touched.extend(deps);
            current.push(issue.clone());
        }

        if !current.is_empty() {
            groups.push(current);
        }

        debug!(groups = groups.len(), issues = ordered.len(), "Built resolution groups");
        groups
    }

    /// An issue blocks others when its component is a dependency of another component.
    pub fn is_blocking(&self, issue: &Issue) -> bool {
        self.graph.fan_in(issue.component()) > 0
    }

    pub fn blocking_issues(&self, issues: &[Issue]) -> Vec<Issue> {
        issues.iter().filter(|i| self.is_blocking(i)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Severity, TestResult, TestStatus};

    fn issue(issue_type: IssueType, severity: Severity, component: &str, description: &str) -> Issue {
        Issue::new(issue_type, severity, component, description, "fix it", vec![])
    }

    #[test]
    fn test_foundation_precedes_higher_severity() {
        let analyzer = IssueAnalyzer::new();
        let issues = vec![
            issue(IssueType::Integration, Severity::Critical, "api_gateway", "endpoint 502"),
            issue(IssueType::Configuration, Severity::Critical, "openai_client", "api key"),
            issue(IssueType::Dependency, Severity::Low, "lambda_layers", "module missing"),
        ];
        let impact = analyzer.assess_impact(&issues);
        let ordered = analyzer.prioritize(&issues, &impact);

        let components: Vec<&str> = ordered.iter().map(|i| i.component()).collect();
        assert_eq!(components, vec!["lambda_layers", "openai_client", "api_gateway"]);
    }

    #[test]
    fn test_impact_accumulates_per_component() {
        let analyzer = IssueAnalyzer::new();
        let issues = vec![
            issue(IssueType::Permission, Severity::Critical, "iam_roles", "a"),
            issue(IssueType::Permission, Severity::Low, "iam_roles", "b"),
        ];
        let impact = analyzer.assess_impact(&issues);
        let factor = 1.0 + 4.0 / 7.0;
        let expected = (1.0 + 0.1) * factor;
        assert!((impact["iam_roles"] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_within_tier_impact_then_severity() {
        let analyzer = IssueAnalyzer::new();
        let issues = vec![
            issue(IssueType::Dependency, Severity::Medium, "lambda_layers", "a"),
            issue(IssueType::Permission, Severity::Medium, "iam_roles", "b"),
            issue(IssueType::Permission, Severity::High, "iam_roles", "c"),
        ];
        let impact = analyzer.assess_impact(&issues);
        let ordered = analyzer.prioritize(&issues, &impact);

        assert_eq!(ordered[0].description(), "c");
        assert_eq!(ordered[1].description(), "b");
        assert_eq!(ordered[2].description(), "a");
    }

    #[test]
    fn test_grouping_splits_on_shared_dependencies() {
        let analyzer = IssueAnalyzer::new();
        let ordered = vec![
            issue(IssueType::Dependency, Severity::High, "lambda_layers", "a"),
            issue(IssueType::Configuration, Severity::High, "openai_client", "b"),
            issue(IssueType::Configuration, Severity::High, "dynamodb", "c"),
            issue(IssueType::Integration, Severity::High, "step_functions", "d"),
        ];
        let groups = analyzer.group_issues(&ordered);

        // openai_client -> {lambda_layers}, dynamodb -> {iam_roles}: disjoint
        // step_functions -> {lambda_functions, iam_roles}: overlaps dynamodb
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(groups[1][0].description(), "d");
        assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), ordered.len());
    }

    #[test]
    fn test_duplicate_failures_are_merged_with_highest_severity() {
        let analyzer = IssueAnalyzer::new();
        let failing = |status| TestResult::new("import_openai", status, "No module named 'openai'");
        let reports = vec![
            ComponentTestReport {
                lambda_function: "a".to_string(),
                dependency_tests: vec![failing(TestStatus::Fail)],
                ..Default::default()
            },
            ComponentTestReport {
                lambda_function: "b".to_string(),
                dependency_tests: vec![failing(TestStatus::Error)],
                ..Default::default()
            },
        ];

        let issues = analyzer.extract_issues(&reports, &[]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity(), Severity::Critical);
    }

    #[test]
    fn test_identified_issues_carried_through() {
        let analyzer = IssueAnalyzer::new();
        let carried = issue(IssueType::Permission, Severity::High, "iam_roles", "pre-identified");
        let report = IntegrationTestReport {
            identified_issues: vec![carried.clone()],
            ..Default::default()
        };

        let analysis = analyzer.analyze(&[], &[report]);
        assert_eq!(analysis.issues, vec![carried]);
    }

    #[test]
    fn test_blocking_issues() {
        let analyzer = IssueAnalyzer::new();
        let issues = vec![
            issue(IssueType::Integration, Severity::High, "api_gateway", "a"),
            issue(IssueType::Permission, Severity::High, "iam_roles", "b"),
        ];
        let blocking = analyzer.blocking_issues(&issues);
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].component(), "iam_roles");
    }
}
