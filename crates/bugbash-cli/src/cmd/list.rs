//! `bb list`: the session's bugs, optionally filtered.

use std::io::Write;
use std::path::PathBuf;

use bugbash_core::model::{Bug, Severity, Status};
use bugbash_core::query::BugFilter;
use clap::Args;
use serde::Serialize;

use crate::cmd::{Context, load_bugs};
use crate::output::{pretty_section, render_mode};

#[derive(Args, Debug, Default)]
#[command(after_help = "EXAMPLES:\n    # Everything in the live session\n    bb list\n\n\
                  # Open critical bugs mentioning login\n    bb list --severity critical --status new --search login\n\n\
                  # What bob fixed, from an export\n    bb list --file bugs.json --status resolved --solver bob")]
pub struct ListArgs {
    /// Read bugs from a JSON snapshot file instead of the remote store.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Text to find in the title or description (case-insensitive).
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// low, medium, high or critical.
    #[arg(long)]
    pub severity: Option<Severity>,

    /// new, in_progress or resolved.
    #[arg(long)]
    pub status: Option<Status>,

    /// Part of the reporter's name.
    #[arg(long, value_name = "NAME")]
    pub reporter: Option<String>,

    /// Part of the solver's name. Unsolved bugs never match.
    #[arg(long, value_name = "NAME")]
    pub solver: Option<String>,

    /// Show at most this many bugs.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

impl ListArgs {
    fn filter(&self) -> BugFilter {
        BugFilter {
            text: self.search.clone(),
            severity: self.severity,
            status: self.status,
            reporter: self.reporter.clone(),
            solver: self.solver.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    session: String,
    /// Bugs in the session before filtering.
    total: usize,
    count: usize,
    bugs: Vec<&'a Bug>,
}

pub fn run_list(args: &ListArgs, ctx: &Context) -> anyhow::Result<()> {
    let bugs = load_bugs(ctx, args.file.as_deref())?;
    let matched = args.filter().apply(&bugs);
    let output = ListOutput {
        session: ctx.session.clone(),
        total: bugs.len(),
        count: matched.len(),
        bugs: matched,
    };
    render_mode(ctx.output, &output, render_list_text, render_list_pretty)
}

fn id_label(bug: &Bug) -> String {
    bug.id.map_or_else(|| "?".to_string(), |id| id.to_string())
}

fn render_list_text(output: &ListOutput<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    for bug in &output.bugs {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            id_label(bug),
            bug.status,
            bug.severity,
            bug.reporter_name,
            bug.title
        )?;
    }
    Ok(())
}

fn render_list_pretty(output: &ListOutput<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(
        w,
        &format!(
            "Session {} ({} of {})",
            output.session, output.count, output.total
        ),
    )?;
    if output.bugs.is_empty() {
        return writeln!(w, "  (no matching bugs)");
    }
    for bug in &output.bugs {
        writeln!(
            w,
            "{:>5}  {:<11} {:<8} {}",
            format!("#{}", id_label(bug)),
            bug.status.to_string(),
            bug.severity.to_string(),
            bug.title
        )?;
        match &bug.solver_name {
            Some(solver) => writeln!(w, "       by {}, fixed by {solver}", bug.reporter_name)?,
            None => writeln!(w, "       by {}", bug.reporter_name)?,
        }
    }
    Ok(())
}
