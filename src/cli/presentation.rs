//! CLI presentation: text formatters per command family.

use crate::deps::DependencyReport;
use crate::pipeline::{ChartResult, Classification, CodeOrigin, Stage, StageEvent};
use crate::safety::SafetyVerdict;
use crate::sandbox::ArtifactInfo;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;

fn section_title(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn mark(ok: bool) -> String {
    if ok {
        format!("{}", "✓".green())
    } else {
        format!("{}", "✗".red())
    }
}

pub fn format_chart_result_text(result: &ChartResult) -> String {
    let origin = match result.origin {
        CodeOrigin::Collaborator => "collaborator",
        CodeOrigin::Fallback => "fallback generator",
    };
    let mut lines = vec![
        format!("{} {}", mark(true), result.artifact_path.display().bold()),
        format!("Type: {}", result.chart_kind.label()),
        format!("Description: {}", result.description),
        format!("Source: {}", origin),
    ];
    if result.cached {
        lines.push(format!("{}", "(served from cache)".dimmed()));
    }
    lines.join("\n")
}

/// One progress line per stage event
pub fn format_stage_event_line(event: &StageEvent) -> String {
    let progress = event
        .progress
        .map(|p| format!("{:>3}%", p))
        .unwrap_or_else(|| "  --".to_string());
    match event.stage {
        Stage::Error => format!(
            "{} {} {}",
            progress,
            "error".red().bold(),
            event.message
        ),
        Stage::Complete => format!("{} {} {}", progress, "complete".green(), event.message),
        stage => format!("{} {} {}", progress, stage.as_str().cyan(), event.message),
    }
}

pub fn format_classification_text(classification: &Classification) -> String {
    let verdict = if classification.visualizable {
        format!("{} Chartable", mark(true))
    } else {
        format!("{} Not chartable", mark(false))
    };
    let mut lines = vec![verdict];
    if let Some(suggested) = &classification.suggested_type {
        lines.push(format!("Suggested type: {}", suggested));
    }
    lines.push(format!("Reason: {}", classification.reason));
    lines.join("\n")
}

pub fn format_verdict_text(verdict: &SafetyVerdict) -> String {
    if verdict.safe {
        format!("{} Code passed the safety check", mark(true))
    } else {
        format!("{} Rejected: {}", mark(false), verdict.reason)
    }
}

pub fn format_dependency_report_text(report: &DependencyReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Library", "Kind", "Installed", "Version", "Minimum"]);
    for status in &report.dependencies {
        let kind = if status.optional { "optional" } else { "required" };
        let installed = if status.installed { "yes" } else { "no" };
        let version = match (&status.version, status.meets_minimum) {
            (Some(v), Some(false)) => format!("{} (below minimum)", v),
            (Some(v), _) => v.clone(),
            (None, _) => "-".to_string(),
        };
        table.add_row(vec![
            status.name.as_str(),
            kind,
            installed,
            version.as_str(),
            status.minimum_version.as_str(),
        ]);
    }

    let readiness = if report.ready {
        format!("{} Ready", mark(true))
    } else {
        format!(
            "{} Missing required: {}",
            mark(false),
            report.missing_required.join(", ")
        )
    };
    let display = if report.display_available {
        "available"
    } else {
        "headless"
    };
    format!(
        "{}\n\n{}\n\n{}\nBackend: {} (display {})",
        section_title("Dependencies"),
        table,
        readiness,
        report.backend,
        display
    )
}

pub fn format_artifacts_table(artifacts: &[ArtifactInfo]) -> String {
    if artifacts.is_empty() {
        return "No charts found.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "Size", "Modified"]);
    for artifact in artifacts {
        table.add_row(vec![
            artifact.name.clone(),
            format!("{:.1} KiB", artifact.size as f64 / 1024.0),
            artifact.modified_human.clone(),
        ]);
    }
    format!("{}\n\n{}", section_title("Charts"), table)
}
