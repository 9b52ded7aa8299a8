//! `bb delete`: remove bugs from the session (moderators only).

use bugbash_core::actions::BugActions;
use bugbash_core::model::BugId;
use clap::Args;
use serde::Serialize;

use crate::cmd::{Context, fail};
use crate::output::{CliError, render};

#[derive(Args, Debug)]
#[command(after_help = "EXAMPLES:\n    # Delete two bugs\n    bb --as admin --credential \"$SECRET\" delete 12 14")]
pub struct DeleteArgs {
    /// Bug ids to delete. Ids that no longer exist are not an error.
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<BugId>,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    deleted: Vec<BugId>,
}

pub fn run_delete(args: &DeleteArgs, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.actor()?;
    let store = ctx.remote_store()?;
    let actions = BugActions::new(store, ctx.policy(), &ctx.session);

    let mut deleted = Vec::with_capacity(args.ids.len());
    for &id in &args.ids {
        if let Err(err) = actions.delete(&actor, id) {
            return fail(ctx.output, &CliError::from(&err));
        }
        deleted.push(id);
    }

    render(ctx.output, &DeleteOutput { deleted }, |o, w| {
        for id in &o.deleted {
            writeln!(w, "✓ deleted #{id}")?;
        }
        Ok(())
    })
}
