//! Report rendering

use colored::{ColoredString, Colorize};

use arrsync_core::{Operation, Outcome, SyncReport};

fn outcome_label(outcome: &Outcome) -> ColoredString {
    let label = outcome.label();
    match outcome {
        Outcome::Applied => label.green().bold(),
        Outcome::Unchanged => label.dimmed(),
        Outcome::Planned => label.cyan(),
        Outcome::Failed { .. } => label.red().bold(),
        Outcome::Blocked { .. } => label.yellow().bold(),
        Outcome::Cancelled => label.yellow(),
    }
}

fn operation_symbol(operation: Operation) -> ColoredString {
    match operation {
        Operation::Create => "+".green(),
        Operation::Update => "~".yellow(),
        Operation::Delete => "-".red(),
        Operation::Noop => "=".dimmed(),
    }
}

/// Human-readable report. Unchanged resources are listed only when
/// `show_unchanged` is set.
pub fn render_human(report: &SyncReport, show_unchanged: bool) -> String {
    let mut out = String::new();
    let title = if report.dry_run { "Plan" } else { "Sync" };
    out.push_str(&format!(
        "{} {} {}\n",
        "=>".blue().bold(),
        title.bold(),
        report.run_id.to_string().dimmed()
    ));

    for failure in &report.skipped {
        let scope = match failure.kind {
            Some(kind) => format!("{} ({})", failure.service, kind),
            None => failure.service.clone(),
        };
        out.push_str(&format!(
            "   {} {} skipped: {}\n",
            "!".red().bold(),
            scope.cyan(),
            failure.error
        ));
    }

    for (service, kinds) in report.by_service() {
        let shown: Vec<_> = kinds
            .iter()
            .flat_map(|(kind, keys)| keys.iter().map(move |(key, entry)| (kind, key, entry)))
            .filter(|(_, _, entry)| show_unchanged || entry.outcome != Outcome::Unchanged)
            .collect();
        if shown.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{}\n", service.bold()));
        for (kind, key, entry) in shown {
            out.push_str(&format!(
                "   {} {}/{} {}",
                operation_symbol(entry.operation),
                kind.to_string().dimmed(),
                key,
                outcome_label(&entry.outcome)
            ));
            match &entry.outcome {
                Outcome::Failed { error } => out.push_str(&format!(": {error}")),
                Outcome::Blocked { by } => out.push_str(&format!(" by {by}")),
                _ => {}
            }
            out.push('\n');
        }
    }

    let summary = report.summary();
    let verb = if report.dry_run { "planned" } else { "applied" };
    let done = if report.dry_run {
        summary.planned
    } else {
        summary.applied
    };
    out.push_str(&format!(
        "\n{} {} {}, {} unchanged, {} failed, {} blocked, {} cancelled, {} skipped service(s)\n",
        if report.is_success() {
            "OK".green().bold()
        } else {
            "INCOMPLETE".red().bold()
        },
        done,
        verb,
        summary.unchanged,
        summary.failed,
        summary.blocked,
        summary.cancelled,
        summary.skipped_services
    ));
    if report.cancelled {
        out.push_str(&format!("{} run was cancelled\n", "!".yellow().bold()));
    }
    out
}
