//! `bb report`: file a new bug in the current session.

use bugbash_core::actions::BugActions;
use bugbash_core::model::{Bug, Severity};
use chrono::Utc;
use clap::Args;
use std::io::Write;

use crate::cmd::{Context, fail};
use crate::output::{CliError, render};

#[derive(Args, Debug)]
#[command(after_help = "EXAMPLES:\n    # Report a bug\n    bb --as ann report \"Login button broken\" -d \"Nothing happens on click\"\n\n\
                  # Critical bug\n    bb report \"Data loss on save\" -d \"Draft vanishes\" --severity critical")]
pub struct ReportArgs {
    /// Short summary.
    pub title: String,

    /// What happens and how to reproduce it.
    #[arg(short, long)]
    pub description: String,

    /// low, medium, high or critical.
    #[arg(short, long, default_value = "medium")]
    pub severity: Severity,
}

pub fn run_report(args: &ReportArgs, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.actor()?;
    let store = ctx.remote_store()?;
    let actions = BugActions::new(store, ctx.policy(), &ctx.session);

    match actions.report(&actor, &args.title, &args.description, args.severity, Utc::now()) {
        Ok(bug) => render(ctx.output, &bug, render_report_human),
        Err(err) => fail(ctx.output, &CliError::from(&err)),
    }
}

fn render_report_human(bug: &Bug, w: &mut dyn Write) -> std::io::Result<()> {
    let id = bug.id.map_or_else(|| "?".to_string(), |id| id.to_string());
    writeln!(w, "✓ reported #{id} [{}] {}", bug.severity, bug.title)
}
