use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::applicator::FixApplicator;
use crate::models::{Issue, ResolutionResult};

/// Applies analyzer groups in order, pausing between groups so remote
/// configuration changes can propagate.
pub struct BatchFixApplicator {
    applicator: FixApplicator,
    group_delay: Duration,
}

impl BatchFixApplicator {
    pub fn new(applicator: FixApplicator, group_delay: Duration) -> Self {
        Self {
            applicator,
            group_delay,
        }
    }

    pub fn applicator(&self) -> &FixApplicator {
        &self.applicator
    }

    /// One result list per group, in group order.
    pub async fn apply_fixes_in_batches(&mut self, groups: &[Vec<Issue>]) -> Vec<Vec<ResolutionResult>> {
        let mut all_results = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            info!(group = index + 1, total = groups.len(), issues = group.len(), "Applying fix group");
            all_results.push(self.apply_group(group).await);

            if index + 1 < groups.len() && !self.group_delay.is_zero() {
                info!(delay_ms = self.group_delay.as_millis() as u64, "Waiting for changes to stabilize");
                sleep(self.group_delay).await;
            }
        }

        all_results
    }

    /// Applies one group sequentially, one result per issue.
    pub async fn apply_group(&mut self, group: &[Issue]) -> Vec<ResolutionResult> {
        let mut results = Vec::with_capacity(group.len());
        for issue in group {
            results.push(self.applicator.resolve_issue(issue).await);
        }

        let failed = results.iter().filter(|r| !r.resolution_applied).count();
        if failed > 0 && self.applicator.config().rollback_on_failure {
            // rollback is decided after validation, not here
            warn!(failed, issues = group.len(), "Fixes failed in group; deferring rollback to validation");
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InMemoryCloud;
    use crate::config::{FixConfiguration, ResourceTargets};
    use crate::models::{IssueType, Severity};
    use std::sync::Arc;

    fn batch(cloud: &InMemoryCloud) -> BatchFixApplicator {
        let applicator = FixApplicator::new(
            FixConfiguration::default(),
            ResourceTargets::default(),
            Arc::new(cloud.clone()),
        );
        BatchFixApplicator::new(applicator, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_results_follow_group_shape() {
        let cloud = InMemoryCloud::default();
        let mut batch = batch(&cloud);
        let groups = vec![
            vec![
                Issue::new(IssueType::Dependency, Severity::High, "lambda_layers", "No module named 'x'", "", vec![]),
                Issue::new(IssueType::Permission, Severity::High, "iam_roles", "AccessDenied", "", vec![]),
            ],
            vec![Issue::new(IssueType::Integration, Severity::Medium, "step_functions", "state machine missing", "", vec![])],
        ];

        let results = batch.apply_fixes_in_batches(&groups).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].len(), 2);
        assert_eq!(results[1].len(), 1);
        assert!(results[0][0].resolution_details.starts_with("DRY RUN:"));
        assert!(!results[0][1].resolution_applied);
        assert_eq!(cloud.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_groups() {
        let cloud = InMemoryCloud::default();
        let mut batch = batch(&cloud);
        assert!(batch.apply_fixes_in_batches(&[]).await.is_empty());
    }
}
