//! `bb diff`: domain events between two snapshot files.

use std::io::Write;
use std::path::PathBuf;

use bugbash_core::diff::{Delta, classify, derive_events};
use bugbash_core::{DomainEvent, Snapshot};
use clap::Args;
use serde::Serialize;

use crate::cmd::{Context, read_snapshot_file};
use crate::output::render_mode;

#[derive(Args, Debug)]
#[command(after_help = "EXAMPLES:\n    # What happened between two exports\n    bb diff --previous before.json --next after.json\n\n\
                  # Milestone every 3 resolutions, as JSON\n    bb diff --previous a.json --next b.json --milestone-every 3 --json")]
pub struct DiffArgs {
    /// Earlier snapshot (JSON array of bug rows).
    #[arg(long, value_name = "PATH")]
    pub previous: PathBuf,

    /// Later snapshot.
    #[arg(long, value_name = "PATH")]
    pub next: PathBuf,

    /// Resolutions per milestone; 0 disables milestones.
    #[arg(long)]
    pub milestone_every: Option<usize>,
}

#[derive(Debug, Serialize)]
struct DiffOutput {
    added: Vec<i64>,
    resolved: Vec<i64>,
    reopened: Vec<i64>,
    removed: Vec<i64>,
    events: Vec<DomainEvent>,
}

impl DiffOutput {
    fn new(delta: Delta, events: Vec<DomainEvent>) -> Self {
        Self {
            added: delta.added,
            resolved: delta.resolved,
            reopened: delta.reopened,
            removed: delta.removed,
            events,
        }
    }
}

pub fn run_diff(args: &DiffArgs, ctx: &Context) -> anyhow::Result<()> {
    let previous = Snapshot::new(read_snapshot_file(&args.previous, ctx.output)?);
    let next = Snapshot::new(read_snapshot_file(&args.next, ctx.output)?);
    let every = args
        .milestone_every
        .unwrap_or(ctx.config.project.gamification.milestone_every);

    // Both files exist, so an empty previous file is a real empty baseline.
    let delta = classify(&previous, &next);
    let events = derive_events(&delta, &next, every);
    let output = DiffOutput::new(delta, events);
    render_mode(ctx.output, &output, render_diff_text, render_diff_pretty)
}

fn render_diff_text(output: &DiffOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for event in &output.events {
        writeln!(w, "{}  {}", event.kind(), event.summary())?;
    }
    Ok(())
}

fn render_diff_pretty(output: &DiffOutput, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "{} added, {} resolved, {} reopened, {} removed",
        output.added.len(),
        output.resolved.len(),
        output.reopened.len(),
        output.removed.len()
    )?;
    if output.events.is_empty() {
        return writeln!(w, "No events.");
    }
    writeln!(w)?;
    for event in &output.events {
        writeln!(w, "  • {}", event.summary())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugbash_core::model::{Bug, BugUpdate, NewBug, Severity};
    use chrono::Utc;

    fn bug(id: i64, title: &str) -> Bug {
        let mut bug = NewBug::new("s", title, "d", Severity::Medium, "Ann")
            .expect("valid")
            .into_bug(Utc::now());
        bug.id = Some(id);
        bug
    }

    fn output(previous: Vec<Bug>, next: Vec<Bug>) -> DiffOutput {
        let previous = Snapshot::new(previous);
        let next = Snapshot::new(next);
        let delta = classify(&previous, &next);
        let events = derive_events(&delta, &next, 5);
        DiffOutput::new(delta, events)
    }

    #[test]
    fn text_lists_one_event_per_line() {
        let mut fixed = bug(1, "Crash");
        BugUpdate::resolve("Bob", Utc::now()).apply_to(&mut fixed);
        let out = output(vec![bug(1, "Crash")], vec![fixed, bug(2, "Typo")]);

        let mut buf = Vec::new();
        render_diff_text(&out, &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("new_bug_reported  "));
        assert!(lines[1].starts_with("bug_resolved  "));
    }

    #[test]
    fn empty_previous_file_announces_everything() {
        let out = output(Vec::new(), vec![bug(1, "Crash")]);
        assert_eq!(out.added, vec![1]);
        assert_eq!(out.events.len(), 1);
    }

    #[test]
    fn pretty_reports_no_events() {
        let out = output(vec![bug(1, "Crash")], vec![bug(1, "Crash")]);
        let mut buf = Vec::new();
        render_diff_pretty(&out, &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("0 added, 0 resolved, 0 reopened, 0 removed"));
        assert!(text.contains("No events."));
    }
}
