use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    LambdaFunction,
    IamRole,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::LambdaFunction => write!(f, "lambda_function"),
            ResourceType::IamRole => write!(f, "iam_role"),
        }
    }
}

/// The part of a resource one fix changed, in its pre-fix state.
///
/// Restoring a record only touches what that fix touched, so reverting one
/// fix leaves later fixes on the same resource in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSnapshot {
    Function {
        function_name: String,
        /// Prior value of every variable the fix wrote or removed; `None` if it was unset
        #[serde(default)]
        environment: BTreeMap<String, Option<String>>,
        /// Layers the fix attached
        #[serde(default)]
        added_layers: Vec<String>,
    },
    RolePolicy {
        role_name: String,
        /// Policy the fix attached
        policy_arn: String,
    },
}

impl ResourceSnapshot {
    pub fn environment_change<I>(function_name: &str, prior: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        ResourceSnapshot::Function {
            function_name: function_name.to_string(),
            environment: prior.into_iter().collect(),
            added_layers: Vec::new(),
        }
    }

    pub fn layer_attachment(function_name: &str, layer_arn: &str) -> Self {
        ResourceSnapshot::Function {
            function_name: function_name.to_string(),
            environment: BTreeMap::new(),
            added_layers: vec![layer_arn.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBackup {
    pub key: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub data: ResourceSnapshot,
    pub created_at: DateTime<Utc>,
}

/// In-memory snapshot map keyed by `"{type}_{id}_{timestamp}"`.
/// Lives as long as the process; nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct BackupStore {
    backups: HashMap<String, ResourceBackup>,
}

impl BackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot and returns its key.
    pub fn insert(&mut self, resource_type: ResourceType, resource_id: &str, data: ResourceSnapshot) -> String {
        let created_at = Utc::now();
        let base = format!(
            "{}_{}_{}",
            resource_type,
            resource_id,
            created_at.format("%Y%m%d%H%M%S%6f")
        );

        // two snapshots of one resource inside the same microsecond
        let mut key = base.clone();
        let mut suffix = 1;
        while self.backups.contains_key(&key) {
            key = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        self.backups.insert(
            key.clone(),
            ResourceBackup {
                key: key.clone(),
                resource_type,
                resource_id: resource_id.to_string(),
                data,
                created_at,
            },
        );
        key
    }

    pub fn get(&self, key: &str) -> Option<&ResourceBackup> {
        self.backups.get(key)
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}
