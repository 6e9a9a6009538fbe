//! Main event loop driving all node subsystems.
//!
//! [`run_event_loop`] is spawned as a tokio task by [`Node::start`](crate::node::Node::start).
//! It is the single writer of [`PanelState`] and uses `tokio::select!`
//! to multiplex:
//!
//! 1. **Host events**: path traces and new contacts.
//! 2. **Commands**: `ExportNow`, `CleanupNow`, `GetStatus`,
//!    `RecordActivity`, `Shutdown`.
//! 3. **Export tick**: prune, snapshot, export, save. Fires once
//!    immediately at startup.
//! 4. **Cleanup tick**: stale-contact sweep, after one full period.
//! 5. **Export completion**: the in-flight export cycle finished.
//! 6. **Job completion**: a greeting or cleanup job finished.
//! 7. **Shutdown signal** via `watch` channel.
//!
//! Host I/O never runs on the loop itself. Greetings and cleanup
//! sweeps run in a `JoinSet`; export cycles run in their own task so
//! a tick can be skipped while one is still in flight.

use std::collections::BTreeSet;
use std::time::Duration;

use meshpanel_storage::PanelState;
use meshpanel_types::{MeshEvent, MeshPanelError, NodeIdentity, RawEvent, Result, Timestamp};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::cleanup::{self, CleanupReport};
use crate::command::{NodeCommand, NodeStatus};
use crate::export::{self, ExportReport};
use crate::greeting::{self, GreetingJob};
use crate::ingest;
use crate::node::{NodeRuntime, NodeState};

// ---------------------------------------------------------------------------
// Loop-local state
// ---------------------------------------------------------------------------

/// Result of a background job, handed back to the loop.
enum JobOutcome {
    Greeting {
        job: GreetingJob,
        outcome: Result<()>,
    },
    Cleanup {
        report: Result<CleanupReport>,
        reply: Option<oneshot::Sender<Result<CleanupReport>>>,
    },
}

/// Bookkeeping that lives only as long as the loop.
#[derive(Default)]
struct LoopState {
    /// Export cycle currently running, if any.
    export_task: Option<JoinHandle<ExportReport>>,
    /// Callers waiting for the running export cycle.
    export_waiters: Vec<oneshot::Sender<ExportReport>>,
    /// Callers waiting for a cycle that starts after the running one.
    queued_waiters: Vec<oneshot::Sender<ExportReport>>,
    /// Greetings reserved but not yet settled.
    greetings_in_flight: BTreeSet<NodeIdentity>,
    /// Scheduled cleanup sweeps currently running.
    cleanups_in_flight: usize,
    last_export: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Event loop entry point
// ---------------------------------------------------------------------------

/// Runs the node event loop until shutdown is signalled.
///
/// Takes ownership of the [`NodeRuntime`]. On exit the interval timers
/// are dropped, queued events and commands are drained, outstanding
/// jobs are aborted, and a final export and save run before the task
/// completes.
pub(crate) async fn run_event_loop(mut rt: NodeRuntime) {
    tracing::info!(
        link_sources = rt.state.links.source_count(),
        greeted = rt.state.greeted.len(),
        snapshots = %rt.persistence.root().display(),
        artifacts = %rt.artifact_root.display(),
        "node event loop started"
    );

    let mut export_tick =
        tokio::time::interval(Duration::from_secs(rt.config.export_interval_secs));
    export_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cleanup_tick = rt.config.cleanup_enabled.then(|| {
        let period = Duration::from_secs(rt.config.cleanup_interval_secs);
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick
    });

    let mut jobs: JoinSet<JobOutcome> = JoinSet::new();
    let mut ls = LoopState::default();

    loop {
        tokio::select! {
            // ---------------------------------------------------------------
            // 1. Host events.
            // ---------------------------------------------------------------
            Some(raw) = rt.event_rx.recv() => {
                handle_raw_event(&raw, &mut rt, &mut jobs, &mut ls);
            }

            // ---------------------------------------------------------------
            // 2. Commands.
            // ---------------------------------------------------------------
            Some(cmd) = rt.command_rx.recv() => {
                let should_shutdown = handle_command(cmd, &mut rt, &mut jobs, &mut ls);
                if should_shutdown {
                    tracing::info!("shutdown command received -- exiting event loop");
                    break;
                }
            }

            // ---------------------------------------------------------------
            // 3. Export tick.
            // ---------------------------------------------------------------
            _ = export_tick.tick() => {
                if ls.export_task.is_some() {
                    tracing::debug!("export still running, skipping tick");
                } else {
                    start_export(&mut rt, &mut ls);
                }
            }

            // ---------------------------------------------------------------
            // 4. Cleanup tick.
            // ---------------------------------------------------------------
            _ = next_tick(&mut cleanup_tick), if cleanup_tick.is_some() => {
                if ls.cleanups_in_flight > 0 {
                    tracing::debug!("cleanup still running, skipping tick");
                } else {
                    ls.cleanups_in_flight += 1;
                    spawn_cleanup(&rt, &mut jobs, None);
                }
            }

            // ---------------------------------------------------------------
            // 5. Export cycle finished.
            // ---------------------------------------------------------------
            joined = join_export(&mut ls.export_task), if ls.export_task.is_some() => {
                ls.export_task = None;
                finish_export(joined, &mut ls);
                if !ls.queued_waiters.is_empty() {
                    start_export(&mut rt, &mut ls);
                }
            }

            // ---------------------------------------------------------------
            // 6. Greeting / cleanup job finished.
            // ---------------------------------------------------------------
            Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                match joined {
                    Ok(outcome) => handle_job_outcome(outcome, &mut rt.state, &mut ls),
                    Err(e) => tracing::error!(%e, "background job failed"),
                }
            }

            // ---------------------------------------------------------------
            // 7. Shutdown signal via watch channel.
            // ---------------------------------------------------------------
            changed = rt.shutdown_rx.changed() => {
                if changed.is_err() || *rt.shutdown_rx.borrow() {
                    tracing::info!("shutdown signal received -- exiting event loop");
                    break;
                }
            }
        }
    }

    drop(export_tick);
    drop(cleanup_tick);

    shutdown_sequence(&mut rt, jobs, ls).await;

    tracing::info!("node event loop exited");
}

/// Waits for the next tick of an optional interval.
async fn next_tick(tick: &mut Option<Interval>) -> Instant {
    match tick {
        Some(tick) => tick.tick().await,
        None => std::future::pending().await,
    }
}

/// Waits for the in-flight export task.
async fn join_export(
    task: &mut Option<JoinHandle<ExportReport>>,
) -> std::result::Result<ExportReport, tokio::task::JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Event handler
// ---------------------------------------------------------------------------

/// Decodes and ingests one raw host event.
fn handle_raw_event(
    raw: &RawEvent,
    rt: &mut NodeRuntime,
    jobs: &mut JoinSet<JobOutcome>,
    ls: &mut LoopState,
) {
    let event = match MeshEvent::from_raw(raw, rt.clock.now()) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(%e, event_type = %raw.event_type, "dropping malformed event");
            return;
        }
    };

    if let Some(job) = ingest::handle_mesh_event(event, &mut rt.state, &rt.config) {
        spawn_greeting(job, rt, jobs, ls);
    }
}

fn spawn_greeting(
    job: GreetingJob,
    rt: &NodeRuntime,
    jobs: &mut JoinSet<JobOutcome>,
    ls: &mut LoopState,
) {
    tracing::debug!(identity = %job.identity, name = %job.name, "dispatching greeting");
    ls.greetings_in_flight.insert(job.identity.clone());

    let host = rt.host.clone();
    let timeout = rt.config.command_timeout();
    jobs.spawn(async move {
        let outcome = greeting::deliver(&job, &host, timeout).await;
        JobOutcome::Greeting { job, outcome }
    });
}

// ---------------------------------------------------------------------------
// Command handler
// ---------------------------------------------------------------------------

/// Processes a single node command.
///
/// Returns `true` if the event loop should exit.
fn handle_command(
    cmd: NodeCommand,
    rt: &mut NodeRuntime,
    jobs: &mut JoinSet<JobOutcome>,
    ls: &mut LoopState,
) -> bool {
    match cmd {
        NodeCommand::ExportNow { reply } => {
            // A running cycle may have snapshotted state before this
            // command arrived, so the caller waits for the next one.
            ls.queued_waiters.push(reply);
            if ls.export_task.is_none() {
                start_export(rt, ls);
            }
            false
        }

        NodeCommand::CleanupNow { reply } => {
            spawn_cleanup(rt, jobs, Some(reply));
            false
        }

        NodeCommand::GetStatus { reply } => {
            let _ = reply.send(build_status(NodeState::Running, &rt.state, jobs, ls));
            false
        }

        NodeCommand::RecordActivity { identity, at } => {
            record_activity(rt, identity, at);
            false
        }

        NodeCommand::Shutdown => true,
    }
}

/// Stores message activity, stamping it with the node clock when the
/// sender gave no time.
fn record_activity(rt: &mut NodeRuntime, identity: NodeIdentity, at: Option<Timestamp>) {
    let at = at.unwrap_or_else(|| rt.clock.now());
    rt.state.last_activity.record(identity, at);
}

fn build_status(
    node_state: NodeState,
    state: &PanelState,
    jobs: &JoinSet<JobOutcome>,
    ls: &LoopState,
) -> NodeStatus {
    NodeStatus {
        state: node_state,
        link_sources: state.links.source_count(),
        half_edges: state.links.half_edge_count(),
        greeted: state.greeted.len(),
        tracked_activity: state.last_activity.len(),
        jobs_in_flight: jobs.len(),
        last_export: ls.last_export,
    }
}

// ---------------------------------------------------------------------------
// Job outcomes
// ---------------------------------------------------------------------------

fn handle_job_outcome(outcome: JobOutcome, state: &mut PanelState, ls: &mut LoopState) {
    match outcome {
        JobOutcome::Greeting { job, outcome } => {
            ls.greetings_in_flight.remove(&job.identity);
            greeting::settle(&mut state.greeted, &job, &outcome);
        }

        JobOutcome::Cleanup { report, reply } => match reply {
            Some(reply) => {
                let _ = reply.send(report);
            }
            None => {
                ls.cleanups_in_flight = ls.cleanups_in_flight.saturating_sub(1);
                if let Err(e) = report {
                    tracing::warn!(%e, "scheduled cleanup failed");
                }
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Spawns a cleanup sweep against a copy of the activity map.
fn spawn_cleanup(
    rt: &NodeRuntime,
    jobs: &mut JoinSet<JobOutcome>,
    reply: Option<oneshot::Sender<Result<CleanupReport>>>,
) {
    let host = rt.host.clone();
    let activity = rt.state.last_activity.clone();
    let now = rt.clock.now();
    let threshold = rt.config.cleanup_threshold_secs();
    let timeout = rt.config.command_timeout();

    jobs.spawn(async move {
        let report = cleanup::run_cleanup(&host, &activity, now, threshold, timeout).await;
        JobOutcome::Cleanup { report, reply }
    });
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Prunes the state and spawns an export cycle over a snapshot of it.
///
/// Callers queued for the next cycle become waiters of this one.
fn start_export(rt: &mut NodeRuntime, ls: &mut LoopState) {
    let now = rt.clock.now();
    let bundle = prune_and_snapshot(&mut rt.state, now, rt.config.retention_secs());

    let host = rt.host.clone();
    let config = rt.config.clone();
    let persistence = rt.persistence.clone();
    let artifact_root = rt.artifact_root.clone();

    ls.export_waiters = std::mem::take(&mut ls.queued_waiters);
    ls.export_task = Some(tokio::spawn(async move {
        export::run_export_cycle(&host, &config, &persistence, &artifact_root, bundle, now).await
    }));
}

fn prune_and_snapshot(
    state: &mut PanelState,
    now: Timestamp,
    retention_secs: f64,
) -> meshpanel_storage::SnapshotBundle {
    let pruned = state.prune(now, retention_secs);
    if pruned.half_edges > 0 || pruned.activity > 0 {
        tracing::debug!(
            half_edges = pruned.half_edges,
            activity = pruned.activity,
            "pruned entries past retention"
        );
    }
    state.snapshot(now)
}

fn finish_export(
    joined: std::result::Result<ExportReport, tokio::task::JoinError>,
    ls: &mut LoopState,
) {
    match joined {
        Ok(report) => {
            ls.last_export = Some(report.at);
            for waiter in ls.export_waiters.drain(..) {
                let _ = waiter.send(report);
            }
        }
        Err(e) => {
            tracing::error!(%e, "export task failed");
            // Dropping the senders tells the waiters no report is coming.
            ls.export_waiters.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Shutdown sequence
// ---------------------------------------------------------------------------

/// Closes both input channels and processes everything already queued.
///
/// Returns the number of events and commands handled.
fn drain_channels(rt: &mut NodeRuntime, jobs: &mut JoinSet<JobOutcome>, ls: &mut LoopState) -> usize {
    rt.event_rx.close();
    rt.command_rx.close();

    let mut drained = 0;
    while let Ok(raw) = rt.event_rx.try_recv() {
        handle_raw_event(&raw, rt, jobs, ls);
        drained += 1;
    }

    while let Ok(cmd) = rt.command_rx.try_recv() {
        match cmd {
            NodeCommand::RecordActivity { identity, at } => record_activity(rt, identity, at),
            // Answered by the final export.
            NodeCommand::ExportNow { reply } => ls.queued_waiters.push(reply),
            NodeCommand::CleanupNow { reply } => {
                let _ = reply.send(Err(MeshPanelError::ConfigError {
                    reason: "node is shutting down".into(),
                }));
            }
            NodeCommand::GetStatus { reply } => {
                let _ = reply.send(build_status(NodeState::ShuttingDown, &rt.state, jobs, ls));
            }
            NodeCommand::Shutdown => {}
        }
        drained += 1;
    }

    drained
}

/// Drains accepted input, aborts outstanding jobs, then runs a final
/// export and save.
///
/// Jobs that finished before the abort are settled normally. Greetings
/// cancelled mid-flight are rolled back so they are retried after
/// restart.
async fn shutdown_sequence(rt: &mut NodeRuntime, mut jobs: JoinSet<JobOutcome>, mut ls: LoopState) {
    tracing::info!(jobs = jobs.len(), "running shutdown sequence");

    let drained = drain_channels(rt, &mut jobs, &mut ls);
    if drained > 0 {
        tracing::debug!(drained, "ingested queued input before final save");
    }

    jobs.abort_all();
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok(outcome) => handle_job_outcome(outcome, &mut rt.state, &mut ls),
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!(%e, "background job failed"),
        }
    }

    for identity in std::mem::take(&mut ls.greetings_in_flight) {
        rt.state.greeted.remove(&identity);
        tracing::debug!(%identity, "rolled back unfinished greeting");
    }

    if let Some(task) = ls.export_task.take() {
        let joined = task.await;
        finish_export(joined, &mut ls);
    }

    let now = rt.clock.now();
    let bundle = prune_and_snapshot(&mut rt.state, now, rt.config.retention_secs());
    let report = export::run_export_cycle(
        &rt.host,
        &rt.config,
        &rt.persistence,
        &rt.artifact_root,
        bundle,
        now,
    )
    .await;

    for waiter in ls.queued_waiters.drain(..) {
        let _ = waiter.send(report);
    }

    if !report.saved.all_saved() {
        tracing::error!("final save incomplete");
    }

    tracing::info!(
        half_edges = rt.state.links.half_edge_count(),
        greeted = rt.state.greeted.len(),
        "shutdown complete"
    );
}
