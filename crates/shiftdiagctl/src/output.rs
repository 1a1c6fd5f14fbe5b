//! Output formatting - ASCII-only summaries for the terminal

use owo_colors::OwoColorize;
use shiftdiag_common::fetch::{FetchReport, HostStatus};
use shiftdiag_common::{RunSummary, StepStatus};

fn tag(status: StepStatus, color: bool) -> String {
    let text = format!("[{}]", status.as_str().to_uppercase());
    if !color {
        return text;
    }
    match status {
        StepStatus::Succeeded => text.bright_green().to_string(),
        StepStatus::Skipped => text.cyan().to_string(),
        StepStatus::Partial => text.yellow().to_string(),
        StepStatus::Failed => text.bright_red().to_string(),
    }
}

fn host_tag(status: HostStatus, color: bool) -> String {
    let text = format!("[{}]", status.as_str().to_uppercase());
    if !color {
        return text;
    }
    match status {
        HostStatus::Fetched => text.bright_green().to_string(),
        HostStatus::Partial => text.yellow().to_string(),
        HostStatus::Failed => text.bright_red().to_string(),
    }
}

/// Human-readable collection summary
pub fn render_summary(summary: &RunSummary, color: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("[WORKSPACE] {}\n", summary.workspace.display()));
    out.push('\n');

    out.push_str("[STEPS]\n");
    for step in &summary.steps {
        out.push_str(&format!(
            "  {:<12} {:<11} {}\n",
            step.step.as_str(),
            tag(step.status, color),
            step.detail
        ));
    }

    if !summary.namespaces.is_empty() {
        out.push('\n');
        out.push_str("[NAMESPACES]\n");
        for ns in &summary.namespaces {
            out.push_str(&format!("  {:<11} {}\n", tag(ns.status, color), ns.name));
        }
    }

    let artifacts = &summary.artifacts;
    out.push('\n');
    out.push_str("[ARTIFACTS]\n");
    match &artifacts.bundle {
        Some(path) => out.push_str(&format!("  bundle:  {}\n", path.display())),
        None => out.push_str("  bundle:  (none)\n"),
    }
    match &artifacts.archive {
        Some(path) => out.push_str(&format!("  archive: {}\n", path.display())),
        None => out.push_str("  archive: (none)\n"),
    }

    let warnings: Vec<_> = summary.warnings().collect();
    if !warnings.is_empty() {
        out.push('\n');
        out.push_str("[WARNINGS]\n");
        for (step, warning) in warnings {
            out.push_str(&format!("  {}: {}\n", step.as_str(), warning));
        }
    }
    out
}

/// Human-readable fetch summary
pub fn render_fetch(report: &FetchReport, color: bool) -> String {
    let mut out = format!("[GROUP] {}\n\n", report.group);
    for host in &report.hosts {
        out.push_str(&format!("  {:<10} {}\n", host_tag(host.status, color), host.host));
        for path in &host.fetched {
            out.push_str(&format!("      fetched {}\n", path.display()));
        }
        if let Some(ws) = &host.remote_workspace {
            let state = if host.cleaned { "removed" } else { "kept" };
            out.push_str(&format!("      remote workspace {} {}\n", ws.display(), state));
        }
        for warning in &host.warnings {
            out.push_str(&format!("      warning: {}\n", warning));
        }
    }
    out
}
