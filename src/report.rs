//! Plain-text rendering of a resolution summary

use crate::models::ResolutionSummary;

const RULE: &str = "------------------------------------------------------------";

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(String::new());
    lines.push(title.to_string());
    lines.push(RULE.to_string());
}

pub fn generate_report(summary: &ResolutionSummary) -> String {
    let mut lines = vec![
        "AUTOMATED ISSUE RESOLUTION REPORT".to_string(),
        format!("Started:   {}", summary.started_at.to_rfc3339()),
        format!("Completed: {}", summary.completed_at.to_rfc3339()),
    ];

    section(&mut lines, "SUMMARY");
    lines.push(format!("Total issues:        {}", summary.total_issues));
    lines.push(format!("Resolved:            {}", summary.resolved));
    lines.push(format!("Partially resolved:  {}", summary.partially_resolved));
    lines.push(format!("Not resolved:        {}", summary.not_resolved));
    lines.push(format!("Regressions:         {}", summary.regressions));
    let rollback = match (summary.rollback_performed, summary.rollback_successful) {
        (false, _) => "not performed".to_string(),
        (true, Some(true)) => "performed, successful".to_string(),
        (true, Some(false)) => "performed, incomplete".to_string(),
        (true, None) => "performed".to_string(),
    };
    lines.push(format!("Rollback:            {}", rollback));
    if let Some(error) = &summary.error {
        lines.push(format!("Error:               {}", error));
    }

    section(&mut lines, "SUCCESS RATE");
    lines.push(format!(
        "{:.1}% ({} of {} issues fully resolved)",
        summary.success_rate(),
        summary.resolved,
        summary.total_issues
    ));

    section(&mut lines, "DETAILS");
    lines.push(summary.details.clone());
    if !summary.phases.is_empty() {
        let phases: Vec<String> = summary.phases.iter().map(ToString::to_string).collect();
        lines.push(format!("Phases: {}", phases.join(" -> ")));
    }
    for result in &summary.validation_results {
        let issue = result.issue();
        lines.push(format!(
            "- [{}] {} ({}, {}): {}",
            result.validation_status,
            issue.component(),
            issue.issue_type(),
            issue.severity(),
            result.resolution_result.resolution_details
        ));
        lines.push(format!("    {}", result.validation_details));
    }

    lines.push(String::new());
    lines.join("\n")
}
