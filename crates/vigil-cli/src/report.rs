//! Human-readable report formatting.

use vigil_core::{HealthReport, Overall, SubjectReport};

use crate::Format;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Cloud,
    Local,
}

/// Print the report to stdout in the requested format.
pub fn emit(report: &HealthReport, format: Format, kind: CheckKind) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Text => print!(
            "{}",
            match kind {
                CheckKind::Cloud => format_cloud(report),
                CheckKind::Local => format_local(report),
            }
        ),
    }
    Ok(())
}

const RULE: &str = "--------------------------------------------------";

pub fn format_cloud(report: &HealthReport) -> String {
    let mut out = String::new();
    out.push_str("\n----- Cloud Health Check -----\n\n");

    if report.subjects.is_empty() {
        out.push_str("No instances found.\n");
    }

    // Skipped instances first, one line each.
    for subject in report.subjects.iter().filter(|s| s.is_skipped()) {
        out.push_str(&skipped_line(subject));
    }

    for subject in report.subjects.iter().filter(|s| !s.is_skipped()) {
        out.push_str(&format!("\nInstance: {}\n", subject.subject));
        for verdict in &subject.verdicts {
            out.push_str(&format!("  - {verdict}\n"));
        }
        out.push_str(RULE);
        out.push('\n');
    }

    out.push_str("\n----- Overall Status -----\n");
    out.push_str(match report.overall {
        Overall::Healthy => "✅ Fleet is HEALTHY\n",
        Overall::Attention => "❌ Fleet needs ATTENTION\n",
    });
    out
}

fn skipped_line(subject: &SubjectReport) -> String {
    format!(
        "{} | STATE: {} | N/A | SKIPPED\n",
        subject.subject,
        subject.state.label()
    )
}

pub fn format_local(report: &HealthReport) -> String {
    let mut out = String::new();

    out.push_str("\n----- System Health Report -----\n");
    for subject in &report.subjects {
        out.push_str(&format!("Host: {}\n", subject.subject));
        for verdict in &subject.verdicts {
            out.push_str(&format!("  - {verdict}\n"));
        }
    }

    if !report.services.is_empty() {
        out.push_str("\n----- Service Status -----\n");
        for service in &report.services {
            out.push_str(&format!("{}: {}", service.service, service.status.label()));
            if let Some(detail) = &service.detail {
                out.push_str(&format!(" ({detail})"));
            }
            out.push('\n');
        }
    }

    out.push_str("\n----- Overall Status -----\n");
    out.push_str(match report.overall {
        Overall::Healthy => "✅ System is HEALTHY\n",
        Overall::Attention => "❌ System needs ATTENTION\n",
    });
    out
}
