//! Remote resource surface used by the fix handlers
//!
//! Only the operations the engine needs are modelled. Each service hands out a
//! [`ResourceClient`]; operations a service does not provide fall through to
//! the default implementations, which report `Unsupported`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CloudError;

pub use memory::{InMemoryCloud, InMemoryCloudState};

pub type CloudResult<T> = Result<T, CloudError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    Lambda,
    StepFunctions,
    Iam,
    DynamoDb,
    ApiGateway,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Lambda => write!(f, "lambda"),
            Service::StepFunctions => write!(f, "stepfunctions"),
            Service::Iam => write!(f, "iam"),
            Service::DynamoDb => write!(f, "dynamodb"),
            Service::ApiGateway => write!(f, "apigateway"),
        }
    }
}

/// Mutable parts of a function's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfiguration {
    pub function_name: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub timeout_seconds: u32,
    #[serde(default)]
    pub memory_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineDescription {
    pub arn: String,
    pub name: String,
    /// Amazon States Language document
    pub definition: String,
    pub role_arn: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub table_name: String,
    pub status: String,
    #[serde(default)]
    pub item_count: u64,
}

/// Operations a fix handler may invoke. Every method defaults to
/// `Unsupported` so a per-service client only implements what it serves.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    fn service(&self) -> Service;

    async fn get_function_configuration(&self, function_name: &str) -> CloudResult<FunctionConfiguration> {
        let _ = function_name;
        Err(CloudError::unsupported(self.service(), "get_function_configuration"))
    }

    async fn update_function_configuration(
        &self,
        configuration: &FunctionConfiguration,
    ) -> CloudResult<FunctionConfiguration> {
        let _ = configuration;
        Err(CloudError::unsupported(self.service(), "update_function_configuration"))
    }

    async fn describe_state_machine(&self, arn: &str) -> CloudResult<StateMachineDescription> {
        let _ = arn;
        Err(CloudError::unsupported(self.service(), "describe_state_machine"))
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> CloudResult<Vec<String>> {
        let _ = role_name;
        Err(CloudError::unsupported(self.service(), "list_attached_role_policies"))
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()> {
        let _ = (role_name, policy_arn);
        Err(CloudError::unsupported(self.service(), "attach_role_policy"))
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()> {
        let _ = (role_name, policy_arn);
        Err(CloudError::unsupported(self.service(), "detach_role_policy"))
    }

    async fn describe_table(&self, table_name: &str) -> CloudResult<TableDescription> {
        let _ = table_name;
        Err(CloudError::unsupported(self.service(), "describe_table"))
    }
}

/// Hands out a client per service
pub trait ClientFactory: Send + Sync {
    fn client(&self, service: Service) -> CloudResult<Arc<dyn ResourceClient>>;
}
