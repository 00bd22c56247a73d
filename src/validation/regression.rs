use std::collections::HashMap;

use crate::models::{RegressionAnalysis, TestResult, TestStatus};

/// Compares two runs of the same probes by test name.
///
/// - new failures: FAIL/ERROR after, and PASS or absent before
/// - degraded performance: present in both, execution time more than doubled
/// - changed behavior: same failing status both times, different message
pub fn analyze_regressions(pre: &[TestResult], post: &[TestResult]) -> RegressionAnalysis {
    let before: HashMap<&str, &TestResult> = pre.iter().map(|t| (t.test_name.as_str(), t)).collect();
    let mut analysis = RegressionAnalysis::default();

    for test in post {
        let previous = before.get(test.test_name.as_str()).copied();

        if test.is_failure() && previous.map_or(true, |p| p.status == TestStatus::Pass) {
            analysis.new_failures.push(test.clone());
        }

        if let Some(previous) = previous {
            if previous.execution_time > 0.0 && test.execution_time > previous.execution_time * 2.0 {
                analysis.degraded_performance.push(test.clone());
            }

            if test.is_failure() && previous.status == test.status && previous.message != test.message {
                analysis.changed_behavior.push(test.clone());
            }
        }
    }

    analysis.overall_regression_detected = !analysis.new_failures.is_empty()
        || !analysis.degraded_performance.is_empty()
        || !analysis.changed_behavior.is_empty();
    analysis
}
