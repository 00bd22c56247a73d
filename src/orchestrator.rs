//! End-to-end resolution cycle
//!
//! `ANALYZE -> SET_BASELINE -> APPLY_FIXES -> VALIDATE -> DECIDE_ROLLBACK ->
//! [ROLLBACK] -> SUMMARIZE`. A cycle always ends in a [`ResolutionSummary`];
//! errors become a failed summary carrying the error text.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::analyzer::IssueAnalyzer;
use crate::cloud::ClientFactory;
use crate::config::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::fixes::{BatchFixApplicator, FixApplicator};
use crate::models::{
    ComponentTestReport, CyclePhase, IntegrationTestReport, Issue, ResolutionResult, ResolutionSummary,
    ValidationResult,
};
use crate::testers::{ComponentTester, IntegrationTester};
use crate::validation::{FixValidator, RollbackManager};

pub struct ResolutionOrchestrator {
    analyzer: IssueAnalyzer,
    batch: BatchFixApplicator,
    validator: FixValidator,
    rollback: RollbackManager,
    component_tester: Arc<dyn ComponentTester>,
    integration_tester: Arc<dyn IntegrationTester>,
    phases: Vec<CyclePhase>,
}

impl ResolutionOrchestrator {
    pub fn new(
        config: &ResolverConfig,
        component_tester: Arc<dyn ComponentTester>,
        integration_tester: Arc<dyn IntegrationTester>,
        clients: Arc<dyn ClientFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let applicator = FixApplicator::new(config.fix.clone(), config.targets.clone(), clients);
        let validator = FixValidator::new(component_tester.clone(), integration_tester.clone())
            .with_rollback_threshold(config.rollback_regression_threshold);

        Ok(Self {
            analyzer: IssueAnalyzer::new(),
            batch: BatchFixApplicator::new(applicator, config.group_delay()),
            validator,
            rollback: RollbackManager::new(),
            component_tester,
            integration_tester,
            phases: Vec::new(),
        })
    }

    pub fn analyzer(&self) -> &IssueAnalyzer {
        &self.analyzer
    }

    pub fn applicator(&self) -> &FixApplicator {
        self.batch.applicator()
    }

    pub fn validator(&self) -> &FixValidator {
        &self.validator
    }

    pub fn rollback_manager(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Pulls fresh reports from both testers.
    pub async fn collect_reports(&self) -> Result<(Vec<ComponentTestReport>, Vec<IntegrationTestReport>)> {
        let component = self
            .component_tester
            .generate_test_report()
            .await
            .map_err(|e| ResolverError::Tester(format!("{:#}", e)))?;
        let integration = self
            .integration_tester
            .generate_test_report()
            .await
            .map_err(|e| ResolverError::Tester(format!("{:#}", e)))?;
        Ok((vec![component], vec![integration]))
    }

    /// Collects reports from the testers, then runs a full cycle on them.
    pub async fn run_from_testers(&mut self) -> ResolutionSummary {
        match self.collect_reports().await {
            Ok((component_reports, integration_reports)) => {
                self.run_resolution_cycle(&component_reports, &integration_reports).await
            }
            Err(err) => {
                error!(error = %err, "Could not collect test reports");
                ResolutionSummary::failed(err.to_string(), Vec::new(), Utc::now())
            }
        }
    }

    pub async fn run_resolution_cycle(
        &mut self,
        component_reports: &[ComponentTestReport],
        integration_reports: &[IntegrationTestReport],
    ) -> ResolutionSummary {
        let started_at = Utc::now();
        self.phases.clear();
        info!(
            component_reports = component_reports.len(),
            integration_reports = integration_reports.len(),
            "Starting resolution cycle"
        );

        match self.execute_cycle(component_reports, integration_reports, started_at).await {
            Ok(summary) => summary,
            Err(err) => {
                error!(error = %err, phase = ?self.phases.last(), "Resolution cycle failed");
                ResolutionSummary::failed(err.to_string(), self.phases.clone(), started_at)
            }
        }
    }

    /// Applies and validates `issues` as one group, skipping analysis.
    /// Reuses the current baseline, or an empty one when none was recorded.
    pub async fn resolve_specific_issues(&mut self, issues: &[Issue]) -> ResolutionSummary {
        let started_at = Utc::now();
        self.phases.clear();
        info!(issues = issues.len(), "Starting targeted resolution");

        match self.execute_targeted(issues, started_at).await {
            Ok(summary) => summary,
            Err(err) => {
                error!(error = %err, "Targeted resolution failed");
                ResolutionSummary::failed(err.to_string(), self.phases.clone(), started_at)
            }
        }
    }

    async fn execute_cycle(
        &mut self,
        component_reports: &[ComponentTestReport],
        integration_reports: &[IntegrationTestReport],
        started_at: DateTime<Utc>,
    ) -> Result<ResolutionSummary> {
        self.enter(CyclePhase::Analyze);
        let analysis = self.analyzer.analyze(component_reports, integration_reports);
        let groups = self.analyzer.get_resolution_order(&analysis);

        self.enter(CyclePhase::SetBaseline);
        self.validator.set_baseline_results(component_reports, integration_reports);

        self.enter(CyclePhase::ApplyFixes);
        let resolutions: Vec<ResolutionResult> = self
            .batch
            .apply_fixes_in_batches(&groups)
            .await
            .into_iter()
            .flatten()
            .collect();

        self.enter(CyclePhase::Validate);
        let validation_results = self.validator.validate_resolutions(&resolutions).await?;

        let scope = format!("{} issues in {} groups", analysis.issues.len(), groups.len());
        Ok(self.finish(validation_results, scope, started_at).await)
    }

    async fn execute_targeted(&mut self, issues: &[Issue], started_at: DateTime<Utc>) -> Result<ResolutionSummary> {
        if !self.validator.has_baseline() {
            self.enter(CyclePhase::SetBaseline);
            warn!("No baseline recorded; validating targeted fixes against an empty baseline");
            self.validator.set_baseline_results(&[], &[]);
        }

        self.enter(CyclePhase::ApplyFixes);
        let resolutions = self.batch.apply_group(issues).await;

        self.enter(CyclePhase::Validate);
        let validation_results = self.validator.validate_resolutions(&resolutions).await?;

        let scope = format!("{} targeted issues", issues.len());
        Ok(self.finish(validation_results, scope, started_at).await)
    }

    async fn finish(
        &mut self,
        validation_results: Vec<ValidationResult>,
        scope: String,
        started_at: DateTime<Utc>,
    ) -> ResolutionSummary {
        self.enter(CyclePhase::DecideRollback);
        let (recommended, reason) = self.validator.recommend_rollback(&validation_results);
        info!(recommended, reason = %reason, "Rollback decision");

        let rollback_enabled = self.batch.applicator().config().rollback_on_failure;
        let (rollback_performed, rollback_successful) = if recommended && rollback_enabled {
            self.enter(CyclePhase::Rollback);
            let ok = self
                .rollback
                .execute_rollback(self.batch.applicator(), &validation_results)
                .await;
            (true, Some(ok))
        } else {
            if recommended {
                warn!("Rollback recommended but rollback_on_failure is disabled");
            }
            (false, None)
        };

        self.enter(CyclePhase::Summarize);
        let details = match rollback_successful {
            Some(true) => format!("{}; {}; rollback completed", scope, reason),
            Some(false) => format!("{}; {}; rollback incomplete", scope, reason),
            None => format!("{}; {}", scope, reason),
        };

        let summary = ResolutionSummary::from_results(
            validation_results,
            rollback_performed,
            rollback_successful,
            details,
            self.phases.clone(),
            started_at,
        );

        info!(
            total = summary.total_issues,
            resolved = summary.resolved,
            partially_resolved = summary.partially_resolved,
            not_resolved = summary.not_resolved,
            regressions = summary.regressions,
            rollback_performed,
            "Resolution cycle completed"
        );
        summary
    }

    fn enter(&mut self, phase: CyclePhase) {
        info!(phase = %phase, "Entering phase");
        self.phases.push(phase);
    }
}
