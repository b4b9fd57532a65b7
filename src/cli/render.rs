use console::style;

use crate::models::{LogEntry, LogKind, Severity, Vulnerability};
use crate::service::RunRecord;
use crate::agent::Phase;
use crate::utils::formatting::plural;

/// Styled terminal line for one log entry.
pub fn render_entry(entry: &LogEntry) -> String {
    let time = style(entry.timestamp.format("%H:%M:%S").to_string()).dim();
    let tag = entry.kind.tag();
    let tag = match entry.kind {
        LogKind::Error => style(tag).red().bold(),
        LogKind::Finding => style(tag).magenta().bold(),
        LogKind::Phase => style(tag).cyan().bold(),
        LogKind::Tool => style(tag).blue(),
        LogKind::Human => style(tag).yellow().bold(),
        LogKind::Agent => style(tag).green(),
        LogKind::System => style(tag).white().bold(),
        LogKind::Info => style(tag).dim(),
    };
    match &entry.source {
        Some(source) => format!("{} {} {} {}", time, tag, style(format!("[{}]", source)).cyan(), entry.message),
        None => format!("{} {} {}", time, tag, entry.message),
    }
}

pub fn render_banner(scan_id: &str, target: &str, agents: u32) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("dev");
    let mode = if agents > 1 {
        format!("pool of {}", plural(agents as usize, "agent"))
    } else {
        "single agent".to_string()
    };
    format!(
        "{} {}\n{} Starting scan {} against {} ({})",
        style(format!("pentest-pilot v{}", version)).bold(),
        style(format!("({})", git_hash)).dim(),
        style("▶").green().bold(),
        style(scan_id).cyan(),
        style(target).white().bold(),
        mode,
    )
}

pub fn render_severity_badge(severity: &Severity) -> String {
    match severity {
        Severity::Critical => style(" CRITICAL ").on_red().white().bold().to_string(),
        Severity::High => style(" HIGH ").red().bold().to_string(),
        Severity::Medium => style(" MEDIUM ").yellow().bold().to_string(),
        Severity::Low => style(" LOW ").blue().to_string(),
        Severity::Info => style(" INFO ").dim().to_string(),
    }
}

fn render_finding(finding: &Vulnerability) -> String {
    let cwe = finding.cwe.as_deref().map(|c| format!(" {}", style(c).dim())).unwrap_or_default();
    format!("  {} {}{}", render_severity_badge(&finding.severity), finding.name, cwe)
}

/// Closing summary after the run has left its loop.
pub fn render_summary(record: &RunRecord, elapsed: &str) -> String {
    let status = match record.status {
        Phase::Completed => style(record.status.display_name()).green().bold(),
        Phase::Failed => style(record.status.display_name()).red().bold(),
        _ => style(record.status.display_name()).yellow().bold(),
    };
    let mut out = format!(
        "\n{} Scan {} {} after {} in {}",
        style("■").bold(),
        style(&record.scan_id).cyan(),
        status,
        plural(record.iterations as usize, "iteration"),
        elapsed,
    );
    if let Some(error) = &record.error {
        out.push_str(&format!("\n  {} {}", style("✗").red(), style(error).red().dim()));
    }

    let mut findings: Vec<&Vulnerability> = record.findings.iter().collect();
    findings.sort_by_key(|f| f.severity.rank());
    out.push_str(&format!("\n  {}", plural(findings.len(), "finding")));
    for finding in findings {
        out.push('\n');
        out.push_str(&render_finding(finding));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_entry_keeps_tag_and_source() {
        console::set_colors_enabled(false);
        let entry = LogEntry {
            index: 3,
            timestamp: Utc::now(),
            kind: LogKind::Error,
            message: "Tool run_ffuf failed: timeout".into(),
            source: Some("fuzzer-1".into()),
        };
        let line = render_entry(&entry);
        assert!(line.contains("[ERROR] [fuzzer-1] Tool run_ffuf failed: timeout"));
    }

    #[test]
    fn test_summary_orders_findings_by_severity() {
        console::set_colors_enabled(false);
        let finding = |name: &str, severity| Vulnerability {
            name: name.into(),
            description: String::new(),
            severity,
            cvss_score: None,
            cwe: None,
            remediation: String::new(),
            request_evidence: String::new(),
            response_evidence: String::new(),
        };
        let record = RunRecord {
            scan_id: "s1".into(),
            target: "https://shop.test".into(),
            status: Phase::Completed,
            error: None,
            error_type: None,
            iterations: 7,
            findings: vec![finding("Verbose errors", Severity::Low), finding("SQL injection", Severity::Critical)],
            endpoints: Vec::new(),
            logs: Vec::new(),
            finished_at: Utc::now(),
        };
        let summary = render_summary(&record, "2.0s");
        assert!(summary.contains("after 7 iterations in 2.0s"));
        let sqli = summary.find("SQL injection").unwrap();
        let verbose = summary.find("Verbose errors").unwrap();
        assert!(sqli < verbose);
    }
}
