//! Terminal output for landing results.

use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tarmac_core::{BranchReport, MergeOutcome, ProposalReport, RunReport};

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

/// Set quiet mode globally. Call once at startup.
pub fn set_quiet(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

/// Print a success message (suppressed in quiet mode).
pub fn success(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Print an error message (always prints to stderr).
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message (always prints to stderr).
pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print an info message (suppressed in quiet mode).
pub fn info(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "→".blue(), msg);
    }
}

/// Print essential machine-readable output (always prints).
pub fn essential(msg: &str) {
    println!("{msg}");
}

/// One-line summary of what happened to a proposal.
#[must_use]
pub fn outcome_line(report: &ProposalReport) -> String {
    let link = &report.web_link;
    match &report.outcome {
        MergeOutcome::Landed {
            revision: Some(revision),
        } => format!("Landed {link} as {}", revision.dimmed()),
        MergeOutcome::Landed { revision: None } => format!("Would land {link}"),
        MergeOutcome::Skipped { reason } => format!("Skipped {link}: {reason}"),
        MergeOutcome::NothingToMerge => format!("Nothing to merge from {link}"),
        MergeOutcome::Failed { reason } => format!("Rejected {link}: {reason}"),
    }
}

fn print_branch(branch: &BranchReport) {
    // List mode output is meant for piping.
    for link in &branch.approved {
        essential(link);
    }
    for proposal in &branch.outcomes {
        let line = outcome_line(proposal);
        match proposal.outcome {
            MergeOutcome::Landed { .. } => success(&line),
            MergeOutcome::NothingToMerge => info(&line),
            MergeOutcome::Skipped { .. } | MergeOutcome::Failed { .. } => warn(&line),
        }
    }
}

/// Print everything a run did.
pub fn run_report(report: &RunReport) {
    for branch in &report.branches {
        print_branch(branch);
    }
    for url in &report.locked {
        warn(&format!("Skipped {url}: working tree is locked by another run"));
    }

    let attempted = report.branches.iter().any(|branch| !branch.outcomes.is_empty());
    if attempted {
        let landed = report.landed();
        let noun = if landed == 1 { "proposal" } else { "proposals" };
        info(&format!("Landed {landed} {noun}"));
    }
}
