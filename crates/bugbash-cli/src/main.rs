#![forbid(unsafe_code)]

mod cmd;
mod identity;
mod output;
mod rest;

use bugbash_core::ErrorCode;
use bugbash_core::config::{self, EffectiveConfig};
use clap::{CommandFactory, Parser, Subcommand};
use cmd::transition::Transition;
use output::{CliError, OutputMode};
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "bb: live bug-bash tracker",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output (shorthand for `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Participant name for write commands (overrides BUGBASH_NAME).
    #[arg(long = "as", global = true, value_name = "NAME")]
    name: Option<String>,

    /// Moderator credential for delete and reset (overrides BUGBASH_CREDENTIAL).
    #[arg(long, global = true, value_name = "SECRET")]
    credential: Option<String>,

    /// Session id (overrides store.session and BUGBASH_SESSION).
    #[arg(long, global = true)]
    session: Option<String>,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self, config_default: Option<&str>) -> OutputMode {
        output::resolve_output_mode(self.format, self.json, config_default)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Read",
        about = "List bugs, optionally filtered",
        long_about = "List the session's bugs, narrowed by text, severity, status, reporter or solver."
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Find duplicate bugs",
        long_about = "Group the session's open bugs into clusters of likely duplicates."
    )]
    Dups(cmd::dups::DupsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show events between two snapshots",
        long_about = "Compare two snapshot files and list the feed events the change produces."
    )]
    Diff(cmd::diff::DiffArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show counts, leaderboards and the boss counter",
        after_help = "EXAMPLES:\n    # Live session\n    bb stats\n\n    # From an export, top 3 only\n    bb stats --file bugs.json --top 3"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Follow a session and print events",
        long_about = "Keep a live view of the session and print every feed event as it happens."
    )]
    Watch(cmd::watch::WatchArgs),

    #[command(next_help_heading = "Write", about = "Report a new bug")]
    Report(cmd::report::ReportArgs),

    #[command(
        next_help_heading = "Write",
        about = "Start working on a new bug",
        after_help = "EXAMPLES:\n    bb --as bob claim 12"
    )]
    Claim(cmd::transition::TransitionArgs),

    #[command(
        next_help_heading = "Write",
        about = "Mark a bug as fixed",
        after_help = "EXAMPLES:\n    bb --as bob resolve 12"
    )]
    Resolve(cmd::transition::TransitionArgs),

    #[command(
        next_help_heading = "Write",
        about = "Send a resolved bug back to in progress",
        after_help = "EXAMPLES:\n    bb --as ann reopen 12"
    )]
    Reopen(cmd::transition::TransitionArgs),

    #[command(next_help_heading = "Moderation", about = "Delete bugs")]
    Delete(cmd::delete::DeleteArgs),

    #[command(next_help_heading = "Moderation", about = "Clear every bug of the session")]
    Reset(cmd::reset::ResetArgs),

    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    bb completions bash > ~/.local/share/bash-completion/completions/bb"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BUGBASH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "bugbash=debug,info"
        } else {
            "bugbash=info,warn"
        })
    });

    let format = env::var("BUGBASH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<EffectiveConfig> {
    let project_root = env::current_dir()?;
    match config::resolve_config(&project_root) {
        Ok(config) => Ok(config),
        Err(err) => {
            // The config may be what selects the format, so fall back to flags.
            let output = cli.output_mode(None);
            cmd::fail(output, &CliError::coded(ErrorCode::ConfigParseError, format!("{err:#}")))
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let config = load_config(&cli)?;
    let output = cli.output_mode(config.user.output.as_deref());
    let session = cli
        .session
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| config.project.store.session.clone());

    let ctx = cmd::Context {
        config,
        output,
        session,
        name_flag: cli.name.clone(),
        credential_flag: cli.credential.clone(),
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::List(args) => cmd::list::run_list(args, &ctx),
        Commands::Dups(args) => cmd::dups::run_dups(args, &ctx),
        Commands::Diff(args) => cmd::diff::run_diff(args, &ctx),
        Commands::Stats(args) => cmd::stats::run_stats(args, &ctx),
        Commands::Watch(args) => cmd::watch::run_watch(args, &ctx),
        Commands::Report(args) => cmd::report::run_report(args, &ctx),
        Commands::Claim(args) => cmd::transition::run_transition(Transition::Claim, args, &ctx),
        Commands::Resolve(args) => {
            cmd::transition::run_transition(Transition::Resolve, args, &ctx)
        }
        Commands::Reopen(args) => cmd::transition::run_transition(Transition::Reopen, args, &ctx),
        Commands::Delete(args) => cmd::delete::run_delete(args, &ctx),
        Commands::Reset(args) => cmd::reset::run_reset(args, &ctx),
        Commands::Completions(args) => {
            cmd::completions::run_completions(args.shell, &mut Cli::command())
        }
    }
}
