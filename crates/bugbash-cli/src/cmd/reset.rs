//! `bb reset`: clear every bug of the session (moderators only).

use bugbash_core::actions::BugActions;
use clap::Args;

use crate::cmd::{Context, fail};
use crate::output::{CliError, render_success};

#[derive(Args, Debug)]
#[command(after_help = "EXAMPLES:\n    # Start the next bash from a clean slate\n    bb --as admin --credential \"$SECRET\" reset --yes")]
pub struct ResetArgs {
    /// Confirm the reset; nothing is deleted without it.
    #[arg(long)]
    pub yes: bool,
}

pub fn run_reset(args: &ResetArgs, ctx: &Context) -> anyhow::Result<()> {
    if !args.yes {
        return fail(
            ctx.output,
            &CliError {
                message: format!("refusing to clear session {} without --yes", ctx.session),
                suggestion: Some("re-run with --yes to delete every bug of the session".into()),
                error_code: None,
            },
        );
    }

    let actor = ctx.actor()?;
    let store = ctx.remote_store()?;
    let actions = BugActions::new(store, ctx.policy(), &ctx.session);
    if let Err(err) = actions.reset_session(&actor) {
        return fail(ctx.output, &CliError::from(&err));
    }
    render_success(ctx.output, &format!("session {} cleared", ctx.session))
}
