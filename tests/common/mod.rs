#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use issue_resolver::cloud::{FunctionConfiguration, InMemoryCloud, StateMachineDescription, TableDescription};
use issue_resolver::config::{FixConfiguration, ResolverConfig, ResourceTargets};
use issue_resolver::testers::{ComponentTester, IntegrationTester, Probe};
use issue_resolver::{ComponentTestReport, IntegrationTestReport, Issue, IssueType, Severity, TestResult, TestStatus};

pub const FUNCTION: &str = "document-processor";
pub const LAYER_ARN: &str = "arn:aws:lambda:us-east-1:000000000000:layer:document-deps:4";
pub const SECRET_REF: &str = "{{resolve:secretsmanager:openai-api-key}}";

#[derive(Debug, Clone)]
enum Scripted {
    Results(Vec<TestResult>),
    Fail(String),
}

/// Tester double answering both capability sets from per-probe scripts.
/// Unscripted probes return no results.
#[derive(Clone, Default)]
pub struct ScriptedTesters {
    scripts: Arc<RwLock<HashMap<Probe, Scripted>>>,
    call_count: Arc<RwLock<HashMap<Probe, usize>>>,
}

impl ScriptedTesters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, probe: Probe, results: Vec<TestResult>) {
        self.scripts.write().await.insert(probe, Scripted::Results(results));
    }

    pub async fn fail(&self, probe: Probe, message: &str) {
        self.scripts
            .write()
            .await
            .insert(probe, Scripted::Fail(message.to_string()));
    }

    pub async fn get_call_count(&self, probe: Probe) -> usize {
        self.call_count.read().await.get(&probe).copied().unwrap_or(0)
    }

    async fn answer(&self, probe: Probe) -> anyhow::Result<Vec<TestResult>> {
        *self.call_count.write().await.entry(probe).or_insert(0) += 1;
        match self.scripts.read().await.get(&probe) {
            Some(Scripted::Results(results)) => Ok(results.clone()),
            Some(Scripted::Fail(message)) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ComponentTester for ScriptedTesters {
    async fn test_dependencies(&self) -> anyhow::Result<Vec<TestResult>> {
        self.answer(Probe::Dependencies).await
    }

    async fn test_openai_client(&self) -> anyhow::Result<Vec<TestResult>> {
        self.answer(Probe::OpenAiClient).await
    }

    async fn test_dynamodb_operations(&self) -> anyhow::Result<Vec<TestResult>> {
        self.answer(Probe::DynamoDbOperations).await
    }

    async fn generate_test_report(&self) -> anyhow::Result<ComponentTestReport> {
        Ok(ComponentTestReport {
            lambda_function: FUNCTION.to_string(),
            dependency_tests: self.answer(Probe::Dependencies).await?,
            client_tests: self.answer(Probe::OpenAiClient).await?,
            database_tests: self.answer(Probe::DynamoDbOperations).await?,
            ..Default::default()
        })
    }
}

#[async_trait]
impl IntegrationTester for ScriptedTesters {
    async fn test_state_machine_exists(&self) -> anyhow::Result<Vec<TestResult>> {
        self.answer(Probe::StateMachineExists).await
    }

    async fn test_execution_permissions(&self) -> anyhow::Result<Vec<TestResult>> {
        self.answer(Probe::ExecutionPermissions).await
    }

    async fn test_api_endpoints(&self) -> anyhow::Result<Vec<TestResult>> {
        self.answer(Probe::ApiEndpoints).await
    }

    async fn run_manual_execution(&self) -> anyhow::Result<Vec<TestResult>> {
        self.answer(Probe::ManualExecution).await
    }

    async fn generate_test_report(&self) -> anyhow::Result<IntegrationTestReport> {
        Ok(IntegrationTestReport {
            state_machine_tests: self.answer(Probe::StateMachineExists).await?,
            api_endpoint_tests: self.answer(Probe::ApiEndpoints).await?,
            workflow_tests: self.answer(Probe::ManualExecution).await?,
            permission_tests: self.answer(Probe::ExecutionPermissions).await?,
            ..Default::default()
        })
    }
}

pub fn pass(name: &str) -> TestResult {
    TestResult::new(name, TestStatus::Pass, "ok")
}

pub fn fail(name: &str, message: &str) -> TestResult {
    TestResult::new(name, TestStatus::Fail, message)
}

pub fn issue(issue_type: IssueType, severity: Severity, component: &str, description: &str) -> Issue {
    Issue::new(issue_type, severity, component, description, "", vec![])
}

pub fn targets() -> ResourceTargets {
    ResourceTargets {
        dependency_layer_arn: Some(LAYER_ARN.to_string()),
        openai_secret_ref: Some(SECRET_REF.to_string()),
        ..ResourceTargets::default()
    }
}

/// Live configuration with no waiting between retries or groups.
pub fn live_config() -> ResolverConfig {
    ResolverConfig {
        fix: FixConfiguration {
            retry_delay: 0.0,
            ..FixConfiguration::live()
        },
        targets: targets(),
        group_delay_ms: 0,
        ..ResolverConfig::default()
    }
}

pub fn dry_run_config() -> ResolverConfig {
    ResolverConfig {
        fix: FixConfiguration {
            retry_delay: 0.0,
            ..FixConfiguration::default()
        },
        ..live_config()
    }
}

pub fn function() -> FunctionConfiguration {
    FunctionConfiguration {
        function_name: FUNCTION.to_string(),
        runtime: "python3.12".to_string(),
        role: "document-processor-role".to_string(),
        environment: BTreeMap::from([
            ("AWS_REGION".to_string(), "us-east-1".to_string()),
            ("LOG_LEVEL".to_string(), "INFO".to_string()),
        ]),
        layers: Vec::new(),
        timeout_seconds: 300,
        memory_mb: 1024,
    }
}

/// Cloud holding the function, workflow, roles and table named by [`targets`].
pub async fn seeded_cloud() -> InMemoryCloud {
    let targets = targets();
    let cloud = InMemoryCloud::default();
    cloud.put_function(function()).await;
    cloud
        .put_state_machine(StateMachineDescription {
            arn: targets.state_machine_arn.clone(),
            name: "document-workflow".to_string(),
            definition: serde_json::json!({
                "StartAt": "Process",
                "States": {
                    "Process": {
                        "Type": "Task",
                        "Resource": "arn:aws:states:::lambda:invoke",
                        "Parameters": { "FunctionName": FUNCTION },
                        "End": true
                    }
                }
            })
            .to_string(),
            role_arn: format!("arn:aws:iam::000000000000:role/{}", targets.state_machine_role),
            status: "ACTIVE".to_string(),
        })
        .await;
    cloud.put_role(&targets.state_machine_role, Vec::new()).await;
    cloud.put_role(&targets.gateway_role, Vec::new()).await;
    cloud
        .put_table(TableDescription {
            table_name: targets.table_name.clone(),
            status: "ACTIVE".to_string(),
            item_count: 12,
        })
        .await;
    cloud
}
