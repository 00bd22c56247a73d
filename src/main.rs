use anyhow::{bail, Context};
use dotenv::dotenv;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use issue_resolver::cloud::{InMemoryCloud, InMemoryCloudState};
use issue_resolver::testers::{ReplayComponentTester, ReplayIntegrationTester};
use issue_resolver::{
    generate_report, ComponentTestReport, IntegrationTestReport, ResolutionOrchestrator, ResolverConfig,
};

/// Input document: recorded test reports plus optional resource state for
/// the in-memory client.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReportBundle {
    component_reports: Vec<ComponentTestReport>,
    integration_reports: Vec<IntegrationTestReport>,
    resources: Option<InMemoryCloudState>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("RESOLVER_CONFIG") {
        Ok(path) => ResolverConfig::from_yaml_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        Err(_) => ResolverConfig::init().context("failed to load configuration from environment")?,
    };

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => bail!("usage: issue-resolver <reports.json>"),
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path))?;
    let bundle: ReportBundle =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse reports in {}", path))?;

    info!(
        path = %path,
        component_reports = bundle.component_reports.len(),
        integration_reports = bundle.integration_reports.len(),
        dry_run = config.fix.dry_run,
        "Loaded test reports"
    );

    let component_tester = ReplayComponentTester::new(bundle.component_reports.first().cloned().unwrap_or_default());
    let integration_tester = ReplayIntegrationTester::new(bundle.integration_reports.first().cloned());
    let cloud = InMemoryCloud::new(bundle.resources.unwrap_or_default());

    let mut orchestrator = ResolutionOrchestrator::new(
        &config,
        Arc::new(component_tester),
        Arc::new(integration_tester),
        Arc::new(cloud),
    )?;

    let summary = orchestrator
        .run_resolution_cycle(&bundle.component_reports, &bundle.integration_reports)
        .await;

    println!("{}", generate_report(&summary));

    if let Ok(summary_path) = std::env::var("RESOLVER_SUMMARY_PATH") {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&summary_path, json).with_context(|| format!("failed to write {}", summary_path))?;
        info!(path = %summary_path, "Wrote resolution summary");
    }

    if summary.is_failure() {
        std::process::exit(1);
    }
    Ok(())
}
