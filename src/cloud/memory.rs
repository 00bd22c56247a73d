//! In-memory resource client for offline runs and tests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ClientFactory, CloudResult, FunctionConfiguration, ResourceClient, Service, StateMachineDescription,
    TableDescription,
};
use crate::error::CloudError;

/// Resource state held by [`InMemoryCloud`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryCloudState {
    pub functions: BTreeMap<String, FunctionConfiguration>,
    pub state_machines: BTreeMap<String, StateMachineDescription>,
    pub role_policies: BTreeMap<String, Vec<String>>,
    pub tables: BTreeMap<String, TableDescription>,
}

#[derive(Debug, Default)]
struct FailurePlan {
    persistent: HashMap<String, CloudError>,
    one_shot: HashMap<String, VecDeque<CloudError>>,
}

/// Shared handle; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryCloud {
    state: Arc<RwLock<InMemoryCloudState>>,
    failures: Arc<RwLock<FailurePlan>>,
    calls: Arc<RwLock<Vec<String>>>,
}

const MUTATING_OPERATIONS: &[&str] = &[
    "update_function_configuration",
    "attach_role_policy",
    "detach_role_policy",
];

impl InMemoryCloud {
    pub fn new(state: InMemoryCloudState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            ..Self::default()
        }
    }

    pub async fn snapshot(&self) -> InMemoryCloudState {
        self.state.read().await.clone()
    }

    pub async fn put_function(&self, configuration: FunctionConfiguration) {
        self.state
            .write()
            .await
            .functions
            .insert(configuration.function_name.clone(), configuration);
    }

    pub async fn put_state_machine(&self, description: StateMachineDescription) {
        self.state
            .write()
            .await
            .state_machines
            .insert(description.arn.clone(), description);
    }

    pub async fn put_role(&self, role_name: &str, policies: Vec<String>) {
        self.state
            .write()
            .await
            .role_policies
            .insert(role_name.to_string(), policies);
    }

    pub async fn put_table(&self, description: TableDescription) {
        self.state
            .write()
            .await
            .tables
            .insert(description.table_name.clone(), description);
    }

    /// Every call to `operation` fails with `error` until cleared.
    pub async fn fail_operation(&self, operation: &str, error: CloudError) {
        self.failures
            .write()
            .await
            .persistent
            .insert(operation.to_string(), error);
    }

    /// The next call to `operation` fails with `error`.
    pub async fn fail_next(&self, operation: &str, error: CloudError) {
        self.failures
            .write()
            .await
            .one_shot
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    pub async fn clear_failures(&self) {
        let mut failures = self.failures.write().await;
        failures.persistent.clear();
        failures.one_shot.clear();
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls.read().await.iter().filter(|c| c.as_str() == operation).count()
    }

    pub async fn mutation_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| MUTATING_OPERATIONS.contains(&c.as_str()))
            .count()
    }

    async fn record(&self, operation: &str) -> CloudResult<()> {
        debug!(operation, "in-memory cloud call");
        self.calls.write().await.push(operation.to_string());

        let mut failures = self.failures.write().await;
        if let Some(queue) = failures.one_shot.get_mut(operation) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        match failures.persistent.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl ClientFactory for InMemoryCloud {
    fn client(&self, service: Service) -> CloudResult<Arc<dyn ResourceClient>> {
        Ok(Arc::new(InMemoryServiceClient {
            service,
            cloud: self.clone(),
        }))
    }
}

/// View of [`InMemoryCloud`] restricted to one service's operations
struct InMemoryServiceClient {
    service: Service,
    cloud: InMemoryCloud,
}

impl InMemoryServiceClient {
    fn require(&self, expected: Service, operation: &str) -> CloudResult<()> {
        if self.service == expected {
            Ok(())
        } else {
            Err(CloudError::unsupported(self.service, operation))
        }
    }
}

#[async_trait]
impl ResourceClient for InMemoryServiceClient {
    fn service(&self) -> Service {
        self.service
    }

    async fn get_function_configuration(&self, function_name: &str) -> CloudResult<FunctionConfiguration> {
        self.require(Service::Lambda, "get_function_configuration")?;
        self.cloud.record("get_function_configuration").await?;
        self.cloud
            .state
            .read()
            .await
            .functions
            .get(function_name)
            .cloned()
            .ok_or_else(|| CloudError::not_found(Service::Lambda, format!("Function not found: {}", function_name)))
    }

    async fn update_function_configuration(
        &self,
        configuration: &FunctionConfiguration,
    ) -> CloudResult<FunctionConfiguration> {
        self.require(Service::Lambda, "update_function_configuration")?;
        self.cloud.record("update_function_configuration").await?;
        let mut state = self.cloud.state.write().await;
        match state.functions.get_mut(&configuration.function_name) {
            Some(existing) => {
                *existing = configuration.clone();
                Ok(existing.clone())
            }
            None => Err(CloudError::not_found(
                Service::Lambda,
                format!("Function not found: {}", configuration.function_name),
            )),
        }
    }

    async fn describe_state_machine(&self, arn: &str) -> CloudResult<StateMachineDescription> {
        self.require(Service::StepFunctions, "describe_state_machine")?;
        self.cloud.record("describe_state_machine").await?;
        self.cloud
            .state
            .read()
            .await
            .state_machines
            .get(arn)
            .cloned()
            .ok_or_else(|| {
                CloudError::not_found(Service::StepFunctions, format!("State Machine Does Not Exist: {}", arn))
            })
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> CloudResult<Vec<String>> {
        self.require(Service::Iam, "list_attached_role_policies")?;
        self.cloud.record("list_attached_role_policies").await?;
        self.cloud
            .state
            .read()
            .await
            .role_policies
            .get(role_name)
            .cloned()
            .ok_or_else(|| CloudError::not_found(Service::Iam, format!("Role not found: {}", role_name)))
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()> {
        self.require(Service::Iam, "attach_role_policy")?;
        self.cloud.record("attach_role_policy").await?;
        let mut state = self.cloud.state.write().await;
        let policies = state
            .role_policies
            .get_mut(role_name)
            .ok_or_else(|| CloudError::not_found(Service::Iam, format!("Role not found: {}", role_name)))?;
        if !policies.iter().any(|p| p == policy_arn) {
            policies.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()> {
        self.require(Service::Iam, "detach_role_policy")?;
        self.cloud.record("detach_role_policy").await?;
        let mut state = self.cloud.state.write().await;
        let policies = state
            .role_policies
            .get_mut(role_name)
            .ok_or_else(|| CloudError::not_found(Service::Iam, format!("Role not found: {}", role_name)))?;
        policies.retain(|p| p != policy_arn);
        Ok(())
    }

    async fn describe_table(&self, table_name: &str) -> CloudResult<TableDescription> {
        self.require(Service::DynamoDb, "describe_table")?;
        self.cloud.record("describe_table").await?;
        self.cloud
            .state
            .read()
            .await
            .tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| {
                CloudError::not_found(Service::DynamoDb, format!("Requested resource not found: {}", table_name))
            })
    }
}
