use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::backup::{BackupStore, ResourceSnapshot, ResourceType};
use super::handlers::{select_handler, FixHandler, FixOutcome};
use crate::cloud::{ClientFactory, CloudResult, FunctionConfiguration, ResourceClient, Service};
use crate::config::{FixConfiguration, ResourceTargets};
use crate::models::{Issue, IssueType, ResolutionResult};

/// Applies remediation strategies per issue category.
///
/// Every `resolve_*` call returns exactly one result per input issue. Remote
/// failures are folded into `resolution_applied = false` results.
pub struct FixApplicator {
    pub(super) config: FixConfiguration,
    pub(super) targets: ResourceTargets,
    pub(super) clients: Arc<dyn ClientFactory>,
    backups: BackupStore,
    /// Keys taken by the fix currently being applied
    pending_backups: Vec<String>,
}

impl FixApplicator {
    pub fn new(config: FixConfiguration, targets: ResourceTargets, clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            config,
            targets,
            clients,
            backups: BackupStore::new(),
            pending_backups: Vec::new(),
        }
    }

    pub fn config(&self) -> &FixConfiguration {
        &self.config
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub async fn resolve_dependency_issues(&mut self, issues: &[Issue]) -> Vec<ResolutionResult> {
        self.resolve_category(IssueType::Dependency, issues).await
    }

    pub async fn resolve_configuration_issues(&mut self, issues: &[Issue]) -> Vec<ResolutionResult> {
        self.resolve_category(IssueType::Configuration, issues).await
    }

    pub async fn resolve_integration_issues(&mut self, issues: &[Issue]) -> Vec<ResolutionResult> {
        self.resolve_category(IssueType::Integration, issues).await
    }

    /// Dispatches on the issue's own type.
    pub async fn resolve_issue(&mut self, issue: &Issue) -> ResolutionResult {
        match issue.issue_type() {
            IssueType::Dependency | IssueType::Configuration | IssueType::Integration => {
                let handler = select_handler(issue.issue_type(), issue);
                self.apply(handler, issue).await
            }
            IssueType::Permission | IssueType::Network => {
                warn!(
                    component = issue.component(),
                    issue_type = %issue.issue_type(),
                    "No fix handler for issue type"
                );
                ResolutionResult::failed(issue, format!("No handler for issue type {}", issue.issue_type()))
            }
        }
    }

    async fn resolve_category(&mut self, category: IssueType, issues: &[Issue]) -> Vec<ResolutionResult> {
        let mut results = Vec::with_capacity(issues.len());
        for issue in issues {
            let handler = select_handler(category, issue);
            results.push(self.apply(handler, issue).await);
        }
        results
    }

    async fn apply(&mut self, handler: FixHandler, issue: &Issue) -> ResolutionResult {
        info!(
            component = issue.component(),
            handler = %handler,
            dry_run = self.config.dry_run,
            "Applying fix"
        );

        self.pending_backups.clear();
        let outcome = self.run_handler(handler, issue).await;
        let backup_keys = std::mem::take(&mut self.pending_backups);

        let result = match outcome {
            Ok(FixOutcome { applied: true, details }) => ResolutionResult::applied(issue, details),
            Ok(FixOutcome { applied: false, details }) => ResolutionResult::failed(issue, details),
            Err(err) => {
                error!(component = issue.component(), handler = %handler, error = %err, "Fix failed");
                ResolutionResult::failed(
                    issue,
                    format!(
                        "Failed to apply {} fix for {}: {}",
                        handler,
                        issue.component(),
                        err.diagnostic()
                    ),
                )
            }
        };

        result.with_backups(backup_keys)
    }

    pub(super) fn client(&self, service: Service) -> CloudResult<Arc<dyn ResourceClient>> {
        self.clients.client(service)
    }

    /// Snapshots a resource when `backup_resources` is on; returns the key.
    pub fn create_backup(
        &mut self,
        resource_type: ResourceType,
        resource_id: &str,
        data: ResourceSnapshot,
    ) -> Option<String> {
        if !self.config.backup_resources {
            return None;
        }
        let key = self.backups.insert(resource_type, resource_id, data);
        info!(backup_key = %key, "Created resource backup");
        self.pending_backups.push(key.clone());
        Some(key)
    }

    /// Reverts the change recorded under `backup_key` and confirms it with a
    /// follow-up read. Unknown keys and failed restores return `false`.
    pub async fn rollback_changes(&self, backup_key: &str) -> bool {
        let backup = match self.backups.get(backup_key) {
            Some(backup) => backup,
            None => {
                warn!(backup_key, "No backup found for rollback");
                return false;
            }
        };

        let restored = match &backup.data {
            ResourceSnapshot::Function {
                function_name,
                environment,
                added_layers,
            } => self.restore_function(function_name, environment, added_layers).await,
            ResourceSnapshot::RolePolicy { role_name, policy_arn } => {
                self.restore_role_policy(role_name, policy_arn).await
            }
        };

        match restored {
            Ok(true) => {
                info!(backup_key, "Rollback restored snapshot");
                true
            }
            Ok(false) => {
                warn!(backup_key, "Rollback verification found drift from snapshot");
                false
            }
            Err(err) => {
                error!(backup_key, error = %err, "Rollback failed");
                false
            }
        }
    }

    async fn restore_function(
        &self,
        function_name: &str,
        environment: &BTreeMap<String, Option<String>>,
        added_layers: &[String],
    ) -> CloudResult<bool> {
        let lambda = self.client(Service::Lambda)?;
        let current = lambda.get_function_configuration(function_name).await?;

        let mut restored = current.clone();
        for (key, prior) in environment {
            match prior {
                Some(value) => {
                    restored.environment.insert(key.clone(), value.clone());
                }
                None => {
                    restored.environment.remove(key);
                }
            }
        }
        restored.layers.retain(|layer| !added_layers.contains(layer));

        if restored != current {
            lambda.update_function_configuration(&restored).await?;
        }

        let after = lambda.get_function_configuration(function_name).await?;
        Ok(change_reverted(&after, environment, added_layers))
    }

    async fn restore_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<bool> {
        let iam = self.client(Service::Iam)?;
        let current = iam.list_attached_role_policies(role_name).await?;
        if current.iter().any(|p| p == policy_arn) {
            iam.detach_role_policy(role_name, policy_arn).await?;
        }

        let after = iam.list_attached_role_policies(role_name).await?;
        Ok(!after.iter().any(|p| p == policy_arn))
    }
}

fn change_reverted(
    configuration: &FunctionConfiguration,
    environment: &BTreeMap<String, Option<String>>,
    added_layers: &[String],
) -> bool {
    environment
        .iter()
        .all(|(key, prior)| configuration.environment.get(key) == prior.as_ref())
        && !configuration.layers.iter().any(|layer| added_layers.contains(layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InMemoryCloud;
    use crate::models::Severity;
    use async_trait::async_trait;

    fn applicator(cloud: &InMemoryCloud, config: FixConfiguration) -> FixApplicator {
        FixApplicator::new(config, ResourceTargets::default(), Arc::new(cloud.clone()))
    }

    fn function(environment: &[(&str, &str)], layers: &[&str]) -> FunctionConfiguration {
        FunctionConfiguration {
            function_name: "document-processor".to_string(),
            runtime: "python3.12".to_string(),
            role: "role".to_string(),
            environment: environment
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            layers: layers.iter().map(|l| l.to_string()).collect(),
            timeout_seconds: 30,
            memory_mb: 512,
        }
    }

    /// Accepts updates but keeps serving the configuration it was built with
    struct StaleLambda {
        configuration: FunctionConfiguration,
    }

    #[async_trait]
    impl ResourceClient for StaleLambda {
        fn service(&self) -> Service {
            Service::Lambda
        }

        async fn get_function_configuration(&self, _function_name: &str) -> CloudResult<FunctionConfiguration> {
            Ok(self.configuration.clone())
        }

        async fn update_function_configuration(
            &self,
            configuration: &FunctionConfiguration,
        ) -> CloudResult<FunctionConfiguration> {
            Ok(configuration.clone())
        }
    }

    struct StaleCloud {
        configuration: FunctionConfiguration,
    }

    impl ClientFactory for StaleCloud {
        fn client(&self, _service: Service) -> CloudResult<Arc<dyn ResourceClient>> {
            Ok(Arc::new(StaleLambda {
                configuration: self.configuration.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_rollback_unknown_key_returns_false() {
        let cloud = InMemoryCloud::default();
        let applicator = applicator(&cloud, FixConfiguration::live());
        assert!(!applicator.rollback_changes("lambda_function_missing_0").await);
    }

    #[tokio::test]
    async fn test_backups_disabled() {
        let cloud = InMemoryCloud::default();
        let config = FixConfiguration {
            backup_resources: false,
            ..FixConfiguration::live()
        };
        let mut applicator = applicator(&cloud, config);
        let key = applicator.create_backup(
            ResourceType::IamRole,
            "r",
            ResourceSnapshot::RolePolicy {
                role_name: "r".to_string(),
                policy_arn: "p".to_string(),
            },
        );
        assert!(key.is_none());
        assert!(applicator.backups().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_reverts_only_recorded_changes() {
        let cloud = InMemoryCloud::default();
        cloud.put_function(function(&[("MODE", "prod")], &[])).await;

        let mut applicator = applicator(&cloud, FixConfiguration::live());
        let key = applicator
            .create_backup(
                ResourceType::LambdaFunction,
                "document-processor",
                ResourceSnapshot::environment_change(
                    "document-processor",
                    [("MODE".to_string(), Some("prod".to_string())), ("DEBUG".to_string(), None)],
                ),
            )
            .unwrap();

        // the recorded fix plus an unrelated later change
        cloud
            .put_function(function(&[("MODE", "dev"), ("DEBUG", "1"), ("OTHER", "kept")], &["arn:layer:1"]))
            .await;

        assert!(applicator.rollback_changes(&key).await);
        assert_eq!(
            cloud.snapshot().await.functions["document-processor"],
            function(&[("MODE", "prod"), ("OTHER", "kept")], &["arn:layer:1"])
        );
    }

    #[tokio::test]
    async fn test_rollback_detaches_only_attached_policy() {
        let cloud = InMemoryCloud::default();
        cloud.put_role("r", vec!["a".to_string(), "b".to_string()]).await;

        let mut applicator = applicator(&cloud, FixConfiguration::live());
        let key = applicator
            .create_backup(
                ResourceType::IamRole,
                "r",
                ResourceSnapshot::RolePolicy {
                    role_name: "r".to_string(),
                    policy_arn: "b".to_string(),
                },
            )
            .unwrap();

        assert!(applicator.rollback_changes(&key).await);
        assert_eq!(cloud.snapshot().await.role_policies["r"], vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_rollback_reports_drift_after_restore() {
        let cloud = StaleCloud {
            configuration: function(&[("OPENAI_API_KEY", "secret")], &[]),
        };
        let mut applicator = FixApplicator::new(FixConfiguration::live(), ResourceTargets::default(), Arc::new(cloud));
        let key = applicator
            .create_backup(
                ResourceType::LambdaFunction,
                "document-processor",
                ResourceSnapshot::environment_change("document-processor", [("OPENAI_API_KEY".to_string(), None)]),
            )
            .unwrap();

        assert!(!applicator.rollback_changes(&key).await);
    }

    #[tokio::test]
    async fn test_unhandled_issue_types() {
        let cloud = InMemoryCloud::default();
        let mut applicator = applicator(&cloud, FixConfiguration::default());
        let issue = Issue::new(IssueType::Network, Severity::Low, "api_gateway", "timeout", "", vec![]);

        let result = applicator.resolve_issue(&issue).await;
        assert!(!result.resolution_applied);
        assert_eq!(result.resolution_details, "No handler for issue type NETWORK");
    }
}
