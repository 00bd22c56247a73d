use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::fixes::FixApplicator;
use crate::models::{IssueType, ValidationResult, ValidationStatus};

/// One attempt to revert one fix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackAttempt {
    pub component: String,
    pub issue_type: IssueType,
    pub validation_status: ValidationStatus,
    pub backup_keys: Vec<String>,
    pub success: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub validation_results: Vec<ValidationResult>,
    pub attempts: Vec<RollbackAttempt>,
    pub rollback_successful: bool,
    pub details: String,
}

/// Reverts fixes that validation rejected and keeps a history of runs
#[derive(Debug, Default)]
pub struct RollbackManager {
    history: Vec<RollbackRecord>,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[RollbackRecord] {
        &self.history
    }

    /// Reverts the recorded changes of every REGRESSION_DETECTED or
    /// NOT_RESOLVED fix, newest first. Fixes that validated keep their
    /// changes. True only if every attempt succeeded.
    pub async fn execute_rollback(&mut self, applicator: &FixApplicator, validation_results: &[ValidationResult]) -> bool {
        let mut attempts = Vec::new();

        for result in validation_results.iter().rev().filter(|r| r.needs_rollback()) {
            let resolution = &result.resolution_result;
            let component = resolution.issue.component().to_string();

            let (success, details) = if resolution.backup_keys.is_empty() {
                (true, format!("No changes recorded for {}", component))
            } else {
                let mut failed = Vec::new();
                for key in resolution.backup_keys.iter().rev() {
                    if !applicator.rollback_changes(key).await {
                        failed.push(key.as_str());
                    }
                }
                if failed.is_empty() {
                    (
                        true,
                        format!("Restored {} snapshot(s) for {}", resolution.backup_keys.len(), component),
                    )
                } else {
                    (false, format!("Failed to restore {} for {}", failed.join(", "), component))
                }
            };

            if success {
                info!(component = %component, status = %result.validation_status, "Rolled back fix");
            } else {
                warn!(component = %component, details = %details, "Rollback attempt failed");
            }

            attempts.push(RollbackAttempt {
                component,
                issue_type: resolution.issue.issue_type(),
                validation_status: result.validation_status,
                backup_keys: resolution.backup_keys.clone(),
                success,
                details,
            });
        }

        let rollback_successful = attempts.iter().all(|a| a.success);
        let failed = attempts.iter().filter(|a| !a.success).count();
        let details = if attempts.is_empty() {
            "No fixes required rollback".to_string()
        } else {
            format!("{} rollback attempts, {} failed", attempts.len(), failed)
        };

        info!(attempts = attempts.len(), failed, rollback_successful, "Rollback finished");

        self.history.push(RollbackRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            validation_results: validation_results.to_vec(),
            attempts,
            rollback_successful,
            details,
        });

        rollback_successful
    }
}
