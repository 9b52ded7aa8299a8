//! `bb watch`: follow a session and print events as they happen.
//!
//! The command drives a [`SyncController`] and forwards every derived event
//! over a local notification bus; the printer is just another subscriber on
//! that bus. The CLI has no realtime socket, so the controller always falls
//! back to polling the store at the configured interval.
//!
//! `--replay` runs the same pipeline offline over a series of snapshot files.
//! The first file is the baseline and each later file is one refresh.

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use bugbash_core::bus::{CHANNEL_NAME, LocalBroadcast, NotificationBus};
use bugbash_core::memory::{MemoryStore, NullRealtime};
use bugbash_core::store::{Realtime, RemoteStore};
use bugbash_core::sync::{SyncController, SyncSettings, SyncState};
use bugbash_core::DomainEvent;
use clap::Args;
use tracing::debug;

use crate::cmd::{Context, read_snapshot_file};
use crate::output::OutputMode;

#[derive(Args, Debug)]
#[command(after_help = "EXAMPLES:\n    # Follow the configured session until interrupted\n    bb watch\n\n\
                  # Ten polls, one per second, as JSON lines\n    bb watch --ticks 10 --interval-ms 1000 --json\n\n\
                  # Replay exported snapshots offline\n    bb watch --replay t0.json t1.json t2.json")]
pub struct WatchArgs {
    /// Stop after this many ticks; runs until interrupted when omitted.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Milliseconds between ticks.
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,

    /// Snapshot files to replay in order instead of following the store.
    #[arg(long, value_name = "PATH", num_args = 1..)]
    pub replay: Vec<PathBuf>,
}

type Feed = Rc<RefCell<Vec<DomainEvent>>>;

/// Controller events go out on one bus endpoint and come back in on another.
struct Pipeline {
    printer: NotificationBus,
    received: Feed,
}

impl Pipeline {
    fn attach<S: RemoteStore, R: Realtime>(controller: &mut SyncController<S, R>) -> Self {
        let hub = LocalBroadcast::new();
        let publisher = NotificationBus::new(Some(hub.open(CHANNEL_NAME)));
        let printer = NotificationBus::new(Some(hub.open(CHANNEL_NAME)));

        let received: Feed = Rc::default();
        let sink = Rc::clone(&received);
        printer.subscribe(move |event| sink.borrow_mut().push(event));
        controller.attach_bus(publisher);

        Self { printer, received }
    }

    /// Deliver pending bus messages and take what arrived.
    fn drain(&self) -> Vec<DomainEvent> {
        self.printer.pump();
        self.received.borrow_mut().drain(..).collect()
    }
}

pub fn run_watch(args: &WatchArgs, ctx: &Context) -> anyhow::Result<()> {
    let settings = SyncSettings::from_config(
        &ctx.config.project.sync,
        &ctx.config.project.gamification,
    );
    if args.replay.is_empty() {
        let store = ctx.remote_store()?;
        follow(args, ctx, store, settings)
    } else {
        replay(args, ctx, settings)
    }
}

fn follow<S: RemoteStore>(
    args: &WatchArgs,
    ctx: &Context,
    store: S,
    settings: SyncSettings,
) -> anyhow::Result<()> {
    let mut controller = SyncController::new(store, NullRealtime::new(), &ctx.session, settings);
    let pipeline = Pipeline::attach(&mut controller);
    let clock = Instant::now();
    let now = || u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

    controller.start(now());
    let mut out = std::io::stdout().lock();
    let mut last_state = SyncState::Uninitialized;
    let mut printed = 0_usize;
    let mut tick = 0_u64;

    loop {
        controller.tick(now());
        if controller.state() != last_state {
            last_state = controller.state();
            if !ctx.quiet && ctx.output.is_pretty() {
                writeln!(out, "[{}] session {}", last_state, ctx.session)?;
            }
        }
        for event in pipeline.drain() {
            print_event(&mut out, ctx.output, &event)?;
            printed += 1;
        }
        out.flush()?;

        tick += 1;
        if args.ticks.is_some_and(|limit| tick >= limit) {
            break;
        }
        std::thread::sleep(Duration::from_millis(args.interval_ms));
    }

    controller.teardown();
    debug!(ticks = tick, events = printed, "watch finished");
    if let Some(err) = controller.error() {
        tracing::warn!(error = %err, "last fetch failed");
    }
    Ok(())
}

fn replay(args: &WatchArgs, ctx: &Context, settings: SyncSettings) -> anyhow::Result<()> {
    let store = Rc::new(MemoryStore::new());
    let mut controller =
        SyncController::new(Rc::clone(&store), NullRealtime::new(), &ctx.session, settings);
    let pipeline = Pipeline::attach(&mut controller);
    let mut out = std::io::stdout().lock();

    for (i, path) in args.replay.iter().enumerate() {
        let bugs = read_snapshot_file(path, ctx.output)?;
        // Keeps the session row, so an empty frame is not a reset.
        store.replace_bugs(&ctx.session, bugs);
        if i == 0 {
            controller.start(0);
        } else {
            controller.refresh();
        }
        for event in pipeline.drain() {
            print_event(&mut out, ctx.output, &event)?;
        }
    }

    controller.teardown();
    out.flush()?;
    Ok(())
}

fn print_event(w: &mut dyn Write, mode: OutputMode, event: &DomainEvent) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut *w, event)?;
            writeln!(w)?;
        }
        OutputMode::Text => writeln!(w, "{}  {}", event.kind(), event.summary())?,
        OutputMode::Pretty => writeln!(w, "  • {}", event.summary())?,
    }
    Ok(())
}
