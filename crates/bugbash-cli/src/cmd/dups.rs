//! `bb dups`: duplicate clusters among a session's open bugs.
//!
//! Bugs are linked when their titles or their combined title and
//! description overlap enough; linked bugs form groups transitively. With
//! `--delete` a moderator removes every non-primary member. Deletion is
//! best-effort: failures are reported per bug and do not stop the sweep.

use std::io::Write;
use std::path::PathBuf;

use bugbash_core::actions::{ActionError, BugActions};
use bugbash_core::model::{Bug, BugId};
use bugbash_search::{
    DuplicateGroup, DuplicatePolicy, SimilarityEdge, compute_duplicate_groups, similarity_edges,
};
use clap::Args;
use serde::Serialize;
use tracing::warn;

use crate::cmd::{Context, fail, load_bugs};
use crate::output::{CliError, render};

#[derive(Args, Debug, Default)]
#[command(after_help = "EXAMPLES:\n    # Scan the live session\n    bb dups\n\n\
                  # Scan an exported snapshot and show why bugs were linked\n    bb dups --file bugs.json --explain\n\n\
                  # Ignore severity when linking\n    bb dups --any-severity\n\n\
                  # Remove duplicates, keeping each group's first report (moderators only)\n    bb dups --delete --as admin --credential \"$SECRET\"")]
pub struct DupsArgs {
    /// Read bugs from a JSON snapshot file instead of the remote store.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Title similarity at or above which two bugs are linked.
    #[arg(long)]
    pub title_threshold: Option<f64>,

    /// Combined title+description similarity at or above which two bugs are linked.
    #[arg(long)]
    pub combined_threshold: Option<f64>,

    /// Link bugs of different severities.
    #[arg(long)]
    pub any_severity: bool,

    /// Include the scored links behind each group.
    #[arg(long)]
    pub explain: bool,

    /// Delete every duplicate, keeping each group's primary.
    #[arg(long, conflicts_with = "file")]
    pub delete: bool,
}

impl DupsArgs {
    fn policy(&self, base: DuplicatePolicy) -> DuplicatePolicy {
        DuplicatePolicy {
            title_threshold: self
                .title_threshold
                .map_or(base.title_threshold, |t| t.clamp(0.0, 1.0)),
            combined_threshold: self
                .combined_threshold
                .map_or(base.combined_threshold, |t| t.clamp(0.0, 1.0)),
            require_same_severity: base.require_same_severity && !self.any_severity,
        }
    }
}

#[derive(Debug, Serialize)]
struct DupsOutput {
    session: String,
    count: usize,
    groups: Vec<DuplicateGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    edges: Option<Vec<SimilarityEdge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletion: Option<DeletionReport>,
}

#[derive(Debug, Default, Serialize)]
struct DeletionReport {
    deleted: Vec<BugId>,
    failed: Vec<DeletionFailure>,
}

#[derive(Debug, Serialize)]
struct DeletionFailure {
    id: BugId,
    error: String,
}

pub fn run_dups(args: &DupsArgs, ctx: &Context) -> anyhow::Result<()> {
    let policy = args.policy(DuplicatePolicy::from(&ctx.config.project.duplicates));
    let bugs = load_bugs(ctx, args.file.as_deref())?;
    let groups = compute_duplicate_groups(&bugs, &policy);

    let deletion = if args.delete {
        Some(delete_duplicates(ctx, &groups)?)
    } else {
        None
    };

    let output = DupsOutput {
        session: ctx.session.clone(),
        count: groups.len(),
        edges: args.explain.then(|| similarity_edges(&bugs, &policy)),
        groups,
        deletion,
    };
    render(ctx.output, &output, render_dups_human)
}

fn delete_duplicates(ctx: &Context, groups: &[DuplicateGroup]) -> anyhow::Result<DeletionReport> {
    let actor = ctx.actor()?;
    let store = ctx.remote_store()?;
    let actions = BugActions::new(store, ctx.policy(), &ctx.session);

    let mut report = DeletionReport::default();
    for id in groups
        .iter()
        .flat_map(|g| &g.duplicates)
        .filter_map(|b| b.id)
    {
        match actions.delete(&actor, id) {
            Ok(()) => report.deleted.push(id),
            Err(err @ ActionError::Auth(_)) => return fail(ctx.output, &CliError::from(&err)),
            Err(err) => {
                warn!(id, error = %err, "duplicate delete failed");
                report.failed.push(DeletionFailure {
                    id,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn bug_line(bug: &Bug) -> String {
    let id = bug.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    format!("#{id}  [{}] {}  ({})", bug.severity, bug.title, bug.reporter_name)
}

fn render_dups_human(output: &DupsOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if output.groups.is_empty() {
        writeln!(w, "No duplicate groups found.")?;
    } else {
        writeln!(w, "{} duplicate group(s):", output.count)?;
        for (i, group) in output.groups.iter().enumerate() {
            writeln!(w, "\n{}. {}", i + 1, bug_line(&group.primary))?;
            for dup in &group.duplicates {
                writeln!(w, "  - {}", bug_line(dup))?;
            }
        }
    }

    if let Some(edges) = &output.edges {
        writeln!(w, "\nLinks:")?;
        for edge in edges {
            writeln!(
                w,
                "  #{} ~ #{}  title {:.2}  combined {:.2}",
                edge.a, edge.b, edge.title_score, edge.combined_score
            )?;
        }
    }

    if let Some(deletion) = &output.deletion {
        writeln!(w, "\nDeleted {} duplicate(s).", deletion.deleted.len())?;
        for failure in &deletion.failed {
            writeln!(w, "  failed #{}: {}", failure.id, failure.error)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugbash_core::model::{NewBug, Severity};
    use chrono::{TimeZone, Utc};

    fn bug(id: BugId, title: &str) -> Bug {
        let created = Utc.timestamp_opt(1_700_000_000 + id, 0).single().expect("ts");
        let mut bug = NewBug::new("s", title, "same words", Severity::High, "Ann")
            .expect("valid")
            .into_bug(created);
        bug.id = Some(id);
        bug
    }

    #[test]
    fn flags_override_configured_policy() {
        let args = DupsArgs {
            title_threshold: Some(1.5),
            any_severity: true,
            ..DupsArgs::default()
        };
        let policy = args.policy(DuplicatePolicy::default());
        assert!((policy.title_threshold - 1.0).abs() < f64::EPSILON);
        assert!((policy.combined_threshold - 0.5).abs() < f64::EPSILON);
        assert!(!policy.require_same_severity);
    }

    #[test]
    fn human_rendering_lists_primary_then_duplicates() {
        let bugs = [bug(1, "Crash on save"), bug(2, "Crash on save")];
        let groups = compute_duplicate_groups(&bugs, &DuplicatePolicy::default());
        let output = DupsOutput {
            session: "s".into(),
            count: groups.len(),
            groups,
            edges: Some(similarity_edges(&bugs, &DuplicatePolicy::default())),
            deletion: None,
        };
        let mut buf = Vec::new();
        render_dups_human(&output, &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("1 duplicate group(s):\n\n1. #1  [HIGH] Crash on save  (Ann)\n"));
        assert!(text.contains("  - #2  [HIGH] Crash on save  (Ann)"));
        assert!(text.contains("#1 ~ #2  title 1.00"));
    }

    #[test]
    fn empty_result_message() {
        let output = DupsOutput {
            session: "s".into(),
            count: 0,
            groups: Vec::new(),
            edges: None,
            deletion: None,
        };
        let mut buf = Vec::new();
        render_dups_human(&output, &mut buf).expect("render");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "No duplicate groups found.\n");
    }
}
