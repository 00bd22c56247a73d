use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ResolverError, Result};

/// Upper bound for `retry_delay`, in seconds
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

/// How fixes are applied
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixConfiguration {
    pub dry_run: bool,
    pub backup_resources: bool,
    pub max_retry_attempts: u32,
    /// Seconds before the first retry of a transient read failure
    pub retry_delay: f64,
    pub rollback_on_failure: bool,
}

impl Default for FixConfiguration {
    fn default() -> Self {
        Self {
            dry_run: true,
            backup_resources: true,
            max_retry_attempts: 3,
            retry_delay: 2.0,
            rollback_on_failure: true,
        }
    }
}

impl FixConfiguration {
    pub fn live() -> Self {
        Self {
            dry_run: false,
            ..Self::default()
        }
    }

    /// Clamped to `0..=MAX_RETRY_DELAY_SECS`; NaN reads as zero.
    pub fn retry_delay(&self) -> Duration {
        let seconds = if self.retry_delay.is_nan() {
            0.0
        } else {
            self.retry_delay.clamp(0.0, MAX_RETRY_DELAY_SECS)
        };
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

/// Names of the remote resources the fix handlers act on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTargets {
    pub function_name: String,
    pub state_machine_arn: String,
    pub state_machine_role: String,
    pub gateway_role: String,
    pub table_name: String,
    pub table_env_var: String,
    pub dependency_layer_arn: Option<String>,
    pub openai_secret_ref: Option<String>,
    pub invoke_policy_arn: String,
    pub start_execution_policy_arn: String,
}

impl Default for ResourceTargets {
    fn default() -> Self {
        Self {
            function_name: "document-processor".to_string(),
            state_machine_arn: "arn:aws:states:us-east-1:000000000000:stateMachine:document-workflow"
                .to_string(),
            state_machine_role: "document-workflow-role".to_string(),
            gateway_role: "document-api-role".to_string(),
            table_name: "documents".to_string(),
            table_env_var: "DYNAMODB_TABLE".to_string(),
            dependency_layer_arn: None,
            openai_secret_ref: None,
            invoke_policy_arn: "arn:aws:iam::aws:policy/service-role/AWSLambdaRole".to_string(),
            start_execution_policy_arn: "arn:aws:iam::aws:policy/AWSStepFunctionsFullAccess".to_string(),
        }
    }
}

/// Top-level resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub fix: FixConfiguration,
    pub targets: ResourceTargets,
    /// Pause between fix groups so remote state can settle
    pub group_delay_ms: u64,
    /// Fraction of regressed results above which rollback is recommended
    pub rollback_regression_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fix: FixConfiguration::default(),
            targets: ResourceTargets::default(),
            group_delay_ms: 5_000,
            rollback_regression_threshold: 0.3,
        }
    }
}

impl ResolverConfig {
    /// Reads `RESOLVER_*` variables, after loading a `.env` file if present.
    /// Unset variables keep their defaults.
    pub fn init() -> Result<ResolverConfig> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads a YAML document; missing sections fall back to defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<ResolverConfig> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: ResolverConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> Result<ResolverConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ResolverConfig::default();

        if let Some(value) = lookup("RESOLVER_DRY_RUN") {
            config.fix.dry_run = parse_bool("RESOLVER_DRY_RUN", &value)?;
        }
        if let Some(value) = lookup("RESOLVER_BACKUP_RESOURCES") {
            config.fix.backup_resources = parse_bool("RESOLVER_BACKUP_RESOURCES", &value)?;
        }
        if let Some(value) = lookup("RESOLVER_ROLLBACK_ON_FAILURE") {
            config.fix.rollback_on_failure = parse_bool("RESOLVER_ROLLBACK_ON_FAILURE", &value)?;
        }
        if let Some(value) = lookup("RESOLVER_MAX_RETRY_ATTEMPTS") {
            config.fix.max_retry_attempts = value.parse::<u32>().map_err(|_| {
                ResolverError::configuration("RESOLVER_MAX_RETRY_ATTEMPTS must be a number")
            })?;
        }
        if let Some(value) = lookup("RESOLVER_RETRY_DELAY") {
            config.fix.retry_delay = value
                .parse::<f64>()
                .map_err(|_| ResolverError::configuration("RESOLVER_RETRY_DELAY must be a number"))?;
        }
        if let Some(value) = lookup("RESOLVER_GROUP_DELAY_MS") {
            config.group_delay_ms = value
                .parse::<u64>()
                .map_err(|_| ResolverError::configuration("RESOLVER_GROUP_DELAY_MS must be a number"))?;
        }

        let targets = &mut config.targets;
        if let Some(value) = lookup("RESOLVER_FUNCTION_NAME") {
            targets.function_name = value;
        }
        if let Some(value) = lookup("RESOLVER_STATE_MACHINE_ARN") {
            targets.state_machine_arn = value;
        }
        if let Some(value) = lookup("RESOLVER_STATE_MACHINE_ROLE") {
            targets.state_machine_role = value;
        }
        if let Some(value) = lookup("RESOLVER_GATEWAY_ROLE") {
            targets.gateway_role = value;
        }
        if let Some(value) = lookup("RESOLVER_TABLE_NAME") {
            targets.table_name = value;
        }
        if let Some(value) = lookup("RESOLVER_DEPENDENCY_LAYER_ARN") {
            targets.dependency_layer_arn = Some(value);
        }
        if let Some(value) = lookup("RESOLVER_TABLE_ENV_VAR") {
            targets.table_env_var = value;
        }
        if let Some(value) = lookup("RESOLVER_OPENAI_SECRET_REF") {
            targets.openai_secret_ref = Some(value);
        }
        if let Some(value) = lookup("RESOLVER_INVOKE_POLICY_ARN") {
            targets.invoke_policy_arn = value;
        }
        if let Some(value) = lookup("RESOLVER_START_EXECUTION_POLICY_ARN") {
            targets.start_execution_policy_arn = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_RETRY_DELAY_SECS).contains(&self.fix.retry_delay) {
            return Err(ResolverError::configuration(format!(
                "retry_delay must be between 0 and {} seconds",
                MAX_RETRY_DELAY_SECS
            )));
        }
        if !(0.0..=1.0).contains(&self.rollback_regression_threshold) {
            return Err(ResolverError::configuration(
                "rollback_regression_threshold must be between 0 and 1",
            ));
        }
        if self.targets.function_name.trim().is_empty() {
            return Err(ResolverError::configuration("function_name must be set"));
        }
        Ok(())
    }

    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ResolverError::configuration(format!("{} must be a boolean", key))),
    }
}
