//! Terminal rendering of sync progress and results.

use std::io::Write;

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use resim_sync::{ApplyReport, Phase, PlanSummary, ProgressSink};

/// Prints the plan table and a "completed / total" counter per phase.
#[derive(Debug, Default)]
pub struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn plan_ready(&self, summary: &PlanSummary) {
        print_plan(summary);
    }

    fn phase_started(&self, phase: Phase, total: usize) {
        if total > 0 {
            eprint!("  {phase}: 0/{total}");
        }
    }

    fn item_completed(&self, phase: Phase, completed: usize, total: usize) {
        eprint!("\r  {phase}: {completed}/{total}");
        let _ = std::io::stderr().flush();
    }

    fn phase_finished(&self, phase: Phase, completed: usize, failed: usize) {
        if completed == 0 && failed == 0 {
            return;
        }
        let status = if failed == 0 {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        eprintln!("\r{status} {phase}: {completed} done, {failed} failed");
    }
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "operation")]
    operation: &'static str,
    #[tabled(rename = "count")]
    count: usize,
}

pub fn print_plan(summary: &PlanSummary) {
    let rows = vec![
        PlanRow { operation: "create", count: summary.creates },
        PlanRow { operation: "update", count: summary.updates },
        PlanRow { operation: "restore", count: summary.restores },
        PlanRow { operation: "archive", count: summary.archives },
        PlanRow { operation: "unchanged", count: summary.unchanged },
        PlanRow { operation: "tag add", count: summary.tag_additions },
        PlanRow { operation: "tag remove", count: summary.tag_removals },
        PlanRow { operation: "system add", count: summary.system_additions },
        PlanRow { operation: "suite revise", count: summary.test_suite_revisions },
    ];
    println!("{}", "PLAN".bold());
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

#[derive(Tabled)]
struct PhaseRow {
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "total")]
    total: usize,
    #[tabled(rename = "ok")]
    succeeded: usize,
    #[tabled(rename = "failed")]
    failed: usize,
}

pub fn print_report(project: &str, summary: &PlanSummary, report: &ApplyReport, verbose: bool) {
    let changed = summary.creates + summary.updates + summary.restores + summary.archives;
    if changed == 0 && summary.tag_additions + summary.tag_removals + summary.system_additions == 0 {
        println!("✓ '{project}': experiences already in sync");
    } else {
        println!(
            "✓ '{project}' synced ({} created, {} updated, {} restored, {} archived)",
            summary.creates, summary.updates, summary.restores, summary.archives
        );
    }
    if !verbose {
        return;
    }

    let rows: Vec<PhaseRow> = report
        .phases
        .iter()
        .map(|p| PhaseRow {
            phase: p.phase.to_string(),
            total: p.total,
            succeeded: p.succeeded(),
            failed: p.errors.len(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "  started {}, took {:.1}s",
        report
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S"),
        report.duration.as_secs_f64()
    );
}
