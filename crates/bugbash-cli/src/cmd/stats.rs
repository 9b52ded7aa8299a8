//! `bb stats`: headline counts, leaderboards and the boss counter.

use std::io::Write;
use std::path::PathBuf;

use bugbash_core::model::Bug;
use bugbash_core::stats::{BossStatus, LeaderboardEntry, Leaderboards, SessionStats};
use clap::Args;
use serde::Serialize;

use crate::cmd::{Context, load_bugs};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// Read bugs from a JSON snapshot file instead of the remote store.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Leaderboard rows to show (defaults to `gamification.leaderboard_size`).
    #[arg(long)]
    pub top: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub session: String,
    #[serde(flatten)]
    pub counts: SessionStats,
    pub leaderboards: Leaderboards,
    pub boss: BossStatus,
}

impl StatsReport {
    pub fn build(session: &str, bugs: &[Bug], top: usize, boss_threshold: usize) -> Self {
        Self {
            session: session.to_string(),
            counts: SessionStats::compute(bugs),
            leaderboards: Leaderboards::compute(bugs, top),
            boss: BossStatus::compute(bugs, boss_threshold),
        }
    }
}

pub fn run_stats(args: &StatsArgs, ctx: &Context) -> anyhow::Result<()> {
    let bugs = load_bugs(ctx, args.file.as_deref())?;
    let gamification = &ctx.config.project.gamification;
    let report = StatsReport::build(
        &ctx.session,
        &bugs,
        args.top.unwrap_or(gamification.leaderboard_size),
        gamification.boss_fight_threshold,
    );
    render_mode(ctx.output, &report, render_stats_text, render_stats_pretty)
}

fn render_stats_text(report: &StatsReport, w: &mut dyn Write) -> std::io::Result<()> {
    let c = report.counts;
    writeln!(
        w,
        "total={} open={} resolved={} critical_open={} high_open={} boss_fight={}",
        c.total, c.open, c.resolved, report.boss.open_critical, report.boss.open_high,
        report.boss.boss_fight
    )?;
    for entry in &report.leaderboards.reporters {
        writeln!(w, "reporter  {}  {}", entry.count, entry.name)?;
    }
    for entry in &report.leaderboards.solvers {
        writeln!(w, "solver  {}  {}", entry.count, entry.name)?;
    }
    Ok(())
}

fn render_stats_pretty(report: &StatsReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Session {}", report.session))?;
    pretty_kv(w, "total", report.counts.total.to_string())?;
    pretty_kv(w, "open", report.counts.open.to_string())?;
    pretty_kv(w, "resolved", report.counts.resolved.to_string())?;

    writeln!(w)?;
    pretty_section(w, "Boss counter")?;
    pretty_kv(w, "critical", report.boss.open_critical.to_string())?;
    pretty_kv(w, "high", report.boss.open_high.to_string())?;
    if report.boss.boss_fight {
        writeln!(w, "BOSS FIGHT: only {} critical left", report.boss.open_critical)?;
    } else if report.boss.all_critical_cleared {
        writeln!(w, "All critical bugs cleared")?;
    }

    writeln!(w)?;
    render_board(w, "Top reporters", &report.leaderboards.reporters)?;
    writeln!(w)?;
    render_board(w, "Top solvers", &report.leaderboards.solvers)
}

fn render_board(w: &mut dyn Write, heading: &str, rows: &[LeaderboardEntry]) -> std::io::Result<()> {
    pretty_section(w, heading)?;
    if rows.is_empty() {
        return writeln!(w, "  (nobody yet)");
    }
    for (rank, entry) in rows.iter().enumerate() {
        writeln!(w, "{:>3}. {:<24} {}", rank + 1, entry.name, entry.count)?;
    }
    Ok(())
}
