//! Node lifecycle and state machine.
//!
//! The [`Node`] is the public entry point for the meshpanel runtime.
//! It owns the panel state and the host handles, and exposes a
//! channel-based API for the host adapter and tests.
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown ──▶ (dropped)
//! ```
//!
//! - `Initializing`: persisted state loaded, event loop not started.
//! - `Running`: event loop active, processing events and commands.
//! - `ShuttingDown`: jobs cancelled, final export and save running.
//!
//! Double-start and shutdown-from-initializing are rejected with
//! `MeshPanelError::ConfigError`.

use std::path::PathBuf;
use std::sync::Arc;

use meshpanel_storage::{PanelState, Persistence};
use meshpanel_types::config::PanelConfig;
use meshpanel_types::{MeshPanelError, RawEvent, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::command::NodeCommand;
use crate::event_loop;
use crate::export::OutputPaths;
use crate::host::{Clock, HostHandles, SystemClock};

// ---------------------------------------------------------------------------
// Channel buffer sizes
// ---------------------------------------------------------------------------

/// Bounded command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Bounded raw event channel capacity.
///
/// Larger than the command channel to absorb bursts of received
/// packets without blocking the host.
const EVENT_CHANNEL_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of the node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// State loaded, event loop not started.
    Initializing,
    /// Event loop is active.
    Running,
    /// Graceful shutdown in progress.
    ShuttingDown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeRuntime (internal)
// ---------------------------------------------------------------------------

/// Owned runtime state moved into the event loop task.
pub(crate) struct NodeRuntime {
    pub config: Arc<PanelConfig>,
    pub host: HostHandles,
    pub clock: Arc<dyn Clock>,
    pub persistence: Persistence,
    pub artifact_root: PathBuf,
    pub state: PanelState,
    pub event_rx: mpsc::Receiver<RawEvent>,
    pub command_rx: mpsc::Receiver<NodeCommand>,
    pub shutdown_rx: watch::Receiver<bool>,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Meshpanel node: owns the panel state and drives the event loop.
///
/// After construction via [`Node::new`], call [`Node::start`] to spawn
/// the event loop. Interact through the channels:
///
/// - Push host events via [`Node::event_sender`].
/// - Send [`NodeCommand`]s via [`Node::command_sender`].
/// - Shut down via [`NodeCommand::Shutdown`] or [`Node::shutdown`].
pub struct Node {
    /// Current lifecycle state.
    state: NodeState,

    /// Moved into the event loop by `start()`.
    runtime: Option<NodeRuntime>,

    command_tx: mpsc::Sender<NodeCommand>,
    event_tx: mpsc::Sender<RawEvent>,

    /// Signals the event loop to shut down.
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Creates a node and loads its persisted state.
    ///
    /// Snapshots are read from `paths.snapshots` on a blocking thread.
    /// Missing or malformed snapshots start the node empty.
    ///
    /// # Errors
    ///
    /// - `MeshPanelError::ConfigError` if `config` fails validation.
    /// - `MeshPanelError::StorageError` if the load task itself fails.
    pub async fn new(config: PanelConfig, host: HostHandles, paths: OutputPaths) -> Result<Self> {
        config.validate()?;

        let persistence = Persistence::new(paths.snapshots);
        let loader = persistence.clone();
        let state = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| MeshPanelError::StorageError {
                reason: format!("snapshot load task failed: {e}"),
            })?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runtime = NodeRuntime {
            config: Arc::new(config),
            host,
            clock: Arc::new(SystemClock),
            persistence,
            artifact_root: paths.artifacts,
            state,
            event_rx,
            command_rx,
            shutdown_rx,
        };

        Ok(Self {
            state: NodeState::Initializing,
            runtime: Some(runtime),
            command_tx,
            event_tx,
            shutdown_tx,
        })
    }

    /// Replaces the wall clock. Has no effect once started.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.clock = clock;
        }
        self
    }

    /// Starts the event loop in a new tokio task.
    ///
    /// Transitions `Initializing → Running`. The returned handle
    /// resolves once the event loop has exited and the final save has
    /// run.
    ///
    /// # Errors
    ///
    /// `MeshPanelError::ConfigError` if the node is not in
    /// `Initializing` state.
    pub fn start(&mut self) -> Result<JoinHandle<()>> {
        if self.state != NodeState::Initializing {
            return Err(MeshPanelError::ConfigError {
                reason: format!(
                    "cannot start node in state '{}'; expected 'initializing'",
                    self.state,
                ),
            });
        }

        let runtime = self.runtime.take().ok_or_else(|| MeshPanelError::ConfigError {
            reason: "runtime already consumed (double start?)".into(),
        })?;

        let handle = tokio::spawn(event_loop::run_event_loop(runtime));
        self.state = NodeState::Running;

        Ok(handle)
    }

    /// Initiates graceful shutdown.
    ///
    /// Await the handle returned by [`start`](Self::start) to wait for
    /// the final save.
    ///
    /// # Errors
    ///
    /// `MeshPanelError::ConfigError` if the node was never started.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            NodeState::Initializing => Err(MeshPanelError::ConfigError {
                reason: "cannot shutdown a node that has not been started".into(),
            }),
            NodeState::ShuttingDown => Ok(()),
            NodeState::Running => {
                self.state = NodeState::ShuttingDown;
                let _ = self.shutdown_tx.send(true);
                Ok(())
            }
        }
    }

    /// Returns a sender for submitting commands to the node.
    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    /// Returns a sender for pushing raw host events to the node.
    pub fn event_sender(&self) -> mpsc::Sender<RawEvent> {
        self.event_tx.clone()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }
}
