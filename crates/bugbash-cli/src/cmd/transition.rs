//! `bb claim`, `bb resolve` and `bb reopen`: lifecycle moves on one bug.

use bugbash_core::actions::{ActionError, BugActions};
use bugbash_core::model::{BugId, Status};
use chrono::Utc;
use clap::Args;
use serde::Serialize;

use crate::cmd::{Context, fail, find_bug};
use crate::output::{CliError, render};

#[derive(Args, Debug)]
pub struct TransitionArgs {
    /// Bug id, as shown by `bb dups` or `bb watch`.
    pub id: BugId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Claim,
    Resolve,
    Reopen,
}

impl Transition {
    const fn verb(self) -> &'static str {
        match self {
            Self::Claim => "claimed",
            Self::Resolve => "resolved",
            Self::Reopen => "reopened",
        }
    }

    const fn target(self) -> Status {
        match self {
            Self::Claim | Self::Reopen => Status::InProgress,
            Self::Resolve => Status::Resolved,
        }
    }
}

#[derive(Debug, Serialize)]
struct TransitionOutput {
    id: BugId,
    title: String,
    previous_status: Status,
    new_status: Status,
    by: String,
}

pub fn run_transition(
    transition: Transition,
    args: &TransitionArgs,
    ctx: &Context,
) -> anyhow::Result<()> {
    let actor = ctx.actor()?;
    let store = ctx.remote_store()?;
    let bug = find_bug(ctx, &store, args.id)?;
    let actions = BugActions::new(&store, ctx.policy(), &ctx.session);

    let now = Utc::now();
    let result: Result<(), ActionError> = match transition {
        Transition::Claim => actions.claim(&actor, &bug, now),
        Transition::Resolve => actions.resolve(&actor, &bug, now),
        Transition::Reopen => actions.reopen(&actor, &bug, now),
    };
    if let Err(err) = result {
        return fail(ctx.output, &CliError::from(&err));
    }

    let output = TransitionOutput {
        id: args.id,
        title: bug.title,
        previous_status: bug.status,
        new_status: transition.target(),
        by: actor.name,
    };
    render(ctx.output, &output, |o, w| {
        writeln!(
            w,
            "✓ {} #{} {} ({} -> {})",
            transition.verb(),
            o.id,
            o.title,
            o.previous_status,
            o.new_status
        )
    })
}
