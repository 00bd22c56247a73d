//! Fix handlers and the table that picks one for an issue

use std::fmt;
use tracing::{debug, info};

use super::applicator::FixApplicator;
use super::backup::{ResourceSnapshot, ResourceType};
use super::retry::with_retry;
use crate::cloud::{CloudResult, Service};
use crate::models::{Issue, IssueType};

/// Variables the function runtime reserves for itself
pub const RESERVED_ENV_KEYS: &[&str] = &[
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AWS_EXECUTION_ENV",
    "AWS_LAMBDA_FUNCTION_NAME",
    "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
    "AWS_LAMBDA_FUNCTION_VERSION",
    "AWS_LAMBDA_LOG_GROUP_NAME",
    "AWS_LAMBDA_LOG_STREAM_NAME",
    "AWS_LAMBDA_RUNTIME_API",
    "LAMBDA_TASK_ROOT",
    "LAMBDA_RUNTIME_DIR",
    "_HANDLER",
];

const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixHandler {
    PackageImport,
    OpenAiCredentials,
    DynamoDbTable,
    EnvironmentVariables,
    StateMachine,
    ApiGateway,
    Generic(IssueType),
}

impl fmt::Display for FixHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixHandler::PackageImport => write!(f, "package import"),
            FixHandler::OpenAiCredentials => write!(f, "OpenAI credentials"),
            FixHandler::DynamoDbTable => write!(f, "DynamoDB table"),
            FixHandler::EnvironmentVariables => write!(f, "environment variables"),
            FixHandler::StateMachine => write!(f, "state machine"),
            FixHandler::ApiGateway => write!(f, "API gateway"),
            FixHandler::Generic(issue_type) => write!(f, "generic {}", issue_type.to_string().to_lowercase()),
        }
    }
}

struct HandlerRule {
    keywords: &'static [&'static str],
    handler: FixHandler,
}

const DEPENDENCY_HANDLERS: &[HandlerRule] = &[HandlerRule {
    keywords: &["module", "import", "package", "layer"],
    handler: FixHandler::PackageImport,
}];

const CONFIGURATION_HANDLERS: &[HandlerRule] = &[
    HandlerRule {
        keywords: &["openai", "api key", "api_key"],
        handler: FixHandler::OpenAiCredentials,
    },
    HandlerRule {
        keywords: &["dynamodb"],
        handler: FixHandler::DynamoDbTable,
    },
    HandlerRule {
        keywords: &["environment", "reserved"],
        handler: FixHandler::EnvironmentVariables,
    },
];

const INTEGRATION_HANDLERS: &[HandlerRule] = &[
    HandlerRule {
        keywords: &["state machine", "statemachine", "step function", "step_function", "stepfunctions"],
        handler: FixHandler::StateMachine,
    },
    HandlerRule {
        keywords: &["endpoint", "gateway"],
        handler: FixHandler::ApiGateway,
    },
];

/// Picks the handler for `issue` within `category`, matching the component
/// and description against the category's table.
pub fn select_handler(category: IssueType, issue: &Issue) -> FixHandler {
    let table: &[HandlerRule] = match category {
        IssueType::Dependency => DEPENDENCY_HANDLERS,
        IssueType::Configuration => CONFIGURATION_HANDLERS,
        IssueType::Integration => INTEGRATION_HANDLERS,
        IssueType::Permission | IssueType::Network => &[],
    };

    let haystack = format!("{} {}", issue.component(), issue.description()).to_lowercase();
    table
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| haystack.contains(k)))
        .map(|rule| rule.handler)
        .unwrap_or(FixHandler::Generic(category))
}

/// What a handler reports back
#[derive(Debug, Clone)]
pub(super) struct FixOutcome {
    pub applied: bool,
    pub details: String,
}

impl FixOutcome {
    fn applied<S: Into<String>>(details: S) -> Self {
        Self {
            applied: true,
            details: details.into(),
        }
    }

    fn not_applied<S: Into<String>>(details: S) -> Self {
        Self {
            applied: false,
            details: details.into(),
        }
    }

    fn dry_run<S: AsRef<str>>(details: S) -> Self {
        Self::applied(format!("DRY RUN: {}", details.as_ref()))
    }
}

/// Pulls the module name out of `No module named 'x'` style messages.
pub fn extract_module_name(description: &str) -> Option<String> {
    let markers = ["No module named", "cannot import name"];
    for marker in markers {
        if let Some(start) = description.find(marker) {
            let rest = description[start + marker.len()..].trim_start();
            let name: String = rest
                .trim_start_matches(|c: char| c == '\'' || c == '"')
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
                .collect();
            if !name.is_empty() {
                return Some(name.split('.').next().unwrap_or(&name).to_string());
            }
        }
    }
    None
}

impl FixApplicator {
    pub(super) async fn run_handler(&mut self, handler: FixHandler, issue: &Issue) -> CloudResult<FixOutcome> {
        match handler {
            FixHandler::PackageImport => self.fix_package_import(issue).await,
            FixHandler::OpenAiCredentials => self.fix_openai_credentials().await,
            FixHandler::DynamoDbTable => self.fix_dynamodb_table().await,
            FixHandler::EnvironmentVariables => self.fix_environment_variables().await,
            FixHandler::StateMachine => self.fix_state_machine().await,
            FixHandler::ApiGateway => self.fix_api_gateway().await,
            FixHandler::Generic(category) => Ok(Self::generic_fix(category, issue)),
        }
    }

    fn generic_fix(category: IssueType, issue: &Issue) -> FixOutcome {
        let fix = if issue.suggested_fix().is_empty() {
            issue.resolution_steps().join("; ")
        } else {
            issue.suggested_fix().to_string()
        };
        FixOutcome::applied(format!(
            "Applied generic {} remediation for {}: {}",
            category.to_string().to_lowercase(),
            issue.component(),
            fix
        ))
    }

    async fn fix_package_import(&mut self, issue: &Issue) -> CloudResult<FixOutcome> {
        let package = extract_module_name(issue.description()).unwrap_or_else(|| "required package".to_string());
        let function_name = self.targets.function_name.clone();

        if self.config.dry_run {
            return Ok(FixOutcome::dry_run(format!(
                "Would bundle package '{}' into the dependency layer of function {}",
                package, function_name
            )));
        }

        let lambda = self.client(Service::Lambda)?;
        let current = {
            let lambda = lambda.as_ref();
            let name = function_name.as_str();
            with_retry(&self.config, "get_function_configuration", move || {
                lambda.get_function_configuration(name)
            })
            .await?
        };

        let layer_arn = match self.targets.dependency_layer_arn.clone() {
            Some(arn) => arn,
            None => {
                return Ok(FixOutcome::not_applied(format!(
                    "No dependency layer configured to provide package '{}' for function {}",
                    package, function_name
                )))
            }
        };

        if current.layers.iter().any(|l| l == &layer_arn) {
            return Ok(FixOutcome::not_applied(format!(
                "Layer {} is already attached to {}; package '{}' must be added to the layer build",
                layer_arn, function_name, package
            )));
        }

        self.create_backup(
            ResourceType::LambdaFunction,
            &function_name,
            ResourceSnapshot::layer_attachment(&function_name, &layer_arn),
        );
        let mut updated = current;
        updated.layers.push(layer_arn.clone());
        lambda.update_function_configuration(&updated).await?;

        info!(function = %function_name, layer = %layer_arn, package = %package, "Attached dependency layer");
        Ok(FixOutcome::applied(format!(
            "Attached dependency layer {} to function {} to provide package '{}'",
            layer_arn, function_name, package
        )))
    }

    async fn fix_openai_credentials(&mut self) -> CloudResult<FixOutcome> {
        let function_name = self.targets.function_name.clone();

        if self.config.dry_run {
            return Ok(FixOutcome::dry_run(format!(
                "Would set {} on function {} from the configured secret",
                OPENAI_KEY_VAR, function_name
            )));
        }

        let lambda = self.client(Service::Lambda)?;
        let current = {
            let lambda = lambda.as_ref();
            let name = function_name.as_str();
            with_retry(&self.config, "get_function_configuration", move || {
                lambda.get_function_configuration(name)
            })
            .await?
        };

        let has_key = current
            .environment
            .get(OPENAI_KEY_VAR)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if has_key {
            return Ok(FixOutcome::not_applied(format!(
                "{} is already set on function {}; the key itself must be rotated",
                OPENAI_KEY_VAR, function_name
            )));
        }

        let secret = match self.targets.openai_secret_ref.clone() {
            Some(secret) => secret,
            None => {
                return Ok(FixOutcome::not_applied(format!(
                    "No OpenAI key source configured for function {}",
                    function_name
                )))
            }
        };

        let prior = current.environment.get(OPENAI_KEY_VAR).cloned();
        self.create_backup(
            ResourceType::LambdaFunction,
            &function_name,
            ResourceSnapshot::environment_change(&function_name, [(OPENAI_KEY_VAR.to_string(), prior)]),
        );
        let mut updated = current;
        updated.environment.insert(OPENAI_KEY_VAR.to_string(), secret);
        lambda.update_function_configuration(&updated).await?;

        Ok(FixOutcome::applied(format!(
            "Set {} on function {} from the configured secret",
            OPENAI_KEY_VAR, function_name
        )))
    }

    async fn fix_dynamodb_table(&mut self) -> CloudResult<FixOutcome> {
        let function_name = self.targets.function_name.clone();
        let table_name = self.targets.table_name.clone();
        let env_var = self.targets.table_env_var.clone();

        if self.config.dry_run {
            return Ok(FixOutcome::dry_run(format!(
                "Would verify table {} and point {} on function {} at it",
                table_name, env_var, function_name
            )));
        }

        let dynamodb = self.client(Service::DynamoDb)?;
        let table = {
            let dynamodb = dynamodb.as_ref();
            let name = table_name.as_str();
            with_retry(&self.config, "describe_table", move || dynamodb.describe_table(name)).await?
        };
        if table.status != "ACTIVE" {
            return Ok(FixOutcome::not_applied(format!(
                "Table {} is {}; it must be ACTIVE before the function can use it",
                table_name, table.status
            )));
        }

        let lambda = self.client(Service::Lambda)?;
        let current = {
            let lambda = lambda.as_ref();
            let name = function_name.as_str();
            with_retry(&self.config, "get_function_configuration", move || {
                lambda.get_function_configuration(name)
            })
            .await?
        };

        if current.environment.get(&env_var) == Some(&table_name) {
            return Ok(FixOutcome::applied(format!(
                "Table {} is ACTIVE and {} on function {} already references it",
                table_name, env_var, function_name
            )));
        }

        let prior = current.environment.get(&env_var).cloned();
        self.create_backup(
            ResourceType::LambdaFunction,
            &function_name,
            ResourceSnapshot::environment_change(&function_name, [(env_var.clone(), prior)]),
        );
        let mut updated = current;
        updated.environment.insert(env_var.clone(), table_name.clone());
        lambda.update_function_configuration(&updated).await?;

        Ok(FixOutcome::applied(format!(
            "Set {}={} on function {}",
            env_var, table_name, function_name
        )))
    }

    async fn fix_environment_variables(&mut self) -> CloudResult<FixOutcome> {
        let function_name = self.targets.function_name.clone();

        if self.config.dry_run {
            return Ok(FixOutcome::dry_run(format!(
                "Would remove reserved environment variables from function {}",
                function_name
            )));
        }

        let lambda = self.client(Service::Lambda)?;
        let current = {
            let lambda = lambda.as_ref();
            let name = function_name.as_str();
            with_retry(&self.config, "get_function_configuration", move || {
                lambda.get_function_configuration(name)
            })
            .await?
        };

        let reserved: Vec<String> = current
            .environment
            .keys()
            .filter(|k| RESERVED_ENV_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        if reserved.is_empty() {
            return Ok(FixOutcome::applied(format!(
                "No reserved environment variables found on function {}",
                function_name
            )));
        }

        let removed: Vec<(String, Option<String>)> = reserved
            .iter()
            .map(|key| (key.clone(), current.environment.get(key).cloned()))
            .collect();
        self.create_backup(
            ResourceType::LambdaFunction,
            &function_name,
            ResourceSnapshot::environment_change(&function_name, removed),
        );
        let mut updated = current;
        updated.environment.retain(|k, _| !reserved.contains(k));
        lambda.update_function_configuration(&updated).await?;

        Ok(FixOutcome::applied(format!(
            "Removed reserved environment variables [{}] from function {}",
            reserved.join(", "),
            function_name
        )))
    }

    async fn fix_state_machine(&mut self) -> CloudResult<FixOutcome> {
        let arn = self.targets.state_machine_arn.clone();
        let role = self.targets.state_machine_role.clone();
        let policy = self.targets.invoke_policy_arn.clone();
        let function_name = self.targets.function_name.clone();

        if self.config.dry_run {
            return Ok(FixOutcome::dry_run(format!(
                "Would verify state machine {} and grant role {} permission to invoke {}",
                arn, role, function_name
            )));
        }

        let sfn = self.client(Service::StepFunctions)?;
        let description = {
            let sfn = sfn.as_ref();
            let arn = arn.as_str();
            with_retry(&self.config, "describe_state_machine", move || sfn.describe_state_machine(arn)).await?
        };

        let references_function = match serde_json::from_str::<serde_json::Value>(&description.definition) {
            Ok(definition) => task_resources(&definition)
                .iter()
                .any(|resource| resource.contains(&function_name)),
            Err(err) => {
                return Ok(FixOutcome::not_applied(format!(
                    "State machine {} has an unreadable definition: {}",
                    description.name, err
                )))
            }
        };

        if !references_function {
            return Ok(FixOutcome::not_applied(format!(
                "State machine {} does not invoke function {}; the definition must be updated",
                description.name, function_name
            )));
        }

        let grant_note = if self.ensure_role_policy(&role, &policy).await? {
            format!("attached {} to role {}", policy, role)
        } else {
            format!("role {} already has {}", role, policy)
        };

        Ok(FixOutcome::applied(format!(
            "State machine {} is {} and invokes {}; {}",
            description.name, description.status, function_name, grant_note
        )))
    }

    async fn fix_api_gateway(&mut self) -> CloudResult<FixOutcome> {
        let arn = self.targets.state_machine_arn.clone();
        let role = self.targets.gateway_role.clone();
        let policy = self.targets.start_execution_policy_arn.clone();

        if self.config.dry_run {
            return Ok(FixOutcome::dry_run(format!(
                "Would verify state machine {} and grant gateway role {} permission to start executions",
                arn, role
            )));
        }

        let sfn = self.client(Service::StepFunctions)?;
        let description = {
            let sfn = sfn.as_ref();
            let arn = arn.as_str();
            with_retry(&self.config, "describe_state_machine", move || sfn.describe_state_machine(arn)).await?
        };

        if self.ensure_role_policy(&role, &policy).await? {
            Ok(FixOutcome::applied(format!(
                "Attached {} to gateway role {} for state machine {}",
                policy, role, description.name
            )))
        } else {
            Ok(FixOutcome::applied(format!(
                "Gateway role {} already allowed to start executions of {}",
                role, description.name
            )))
        }
    }

    /// Attaches `policy` to `role` unless present. Returns whether it attached.
    async fn ensure_role_policy(&mut self, role: &str, policy: &str) -> CloudResult<bool> {
        let iam = self.client(Service::Iam)?;
        let attached = {
            let iam = iam.as_ref();
            with_retry(&self.config, "list_attached_role_policies", move || {
                iam.list_attached_role_policies(role)
            })
            .await?
        };

        if attached.iter().any(|p| p == policy) {
            debug!(role, policy, "Policy already attached");
            return Ok(false);
        }

        self.create_backup(
            ResourceType::IamRole,
            role,
            ResourceSnapshot::RolePolicy {
                role_name: role.to_string(),
                policy_arn: policy.to_string(),
            },
        );
        iam.attach_role_policy(role, policy).await?;
        info!(role, policy, "Attached role policy");
        Ok(true)
    }
}

/// Every `Resource` string in a States Language document, nested states included.
fn task_resources(definition: &serde_json::Value) -> Vec<String> {
    let mut resources = Vec::new();
    collect_resources(definition, &mut resources);
    resources
}

fn collect_resources(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("Resource", serde_json::Value::String(resource)) => out.push(resource.clone()),
                    ("Parameters", serde_json::Value::Object(params)) => {
                        if let Some(serde_json::Value::String(name)) = params.get("FunctionName") {
                            out.push(name.clone());
                        }
                        collect_resources(child, out);
                    }
                    _ => collect_resources(child, out),
                }
            }
        }
        serde_json::Value::Array(items) => items.iter().for_each(|item| collect_resources(item, out)),
        _ => {}
    }
}
