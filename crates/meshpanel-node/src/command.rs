//! Commands and status types for host → node communication.
//!
//! [`NodeCommand`] is the bounded-channel message type the host
//! adapter and tests use to drive the node. Each command that produces
//! a result carries a `tokio::sync::oneshot::Sender` for the reply.
//!
//! All commands are processed sequentially inside the event loop, so
//! they never race with event ingestion.

use meshpanel_types::{NodeIdentity, Result, Timestamp};
use tokio::sync::oneshot;

use crate::cleanup::CleanupReport;
use crate::export::ExportReport;
use crate::node::NodeState;

// ---------------------------------------------------------------------------
// NodeCommand
// ---------------------------------------------------------------------------

/// Commands accepted by the node event loop.
pub enum NodeCommand {
    /// Run an export + save cycle now.
    ///
    /// If a cycle is already running, the reply is sent when a fresh
    /// cycle started after it has finished.
    ExportNow {
        reply: oneshot::Sender<ExportReport>,
    },

    /// Run a cleanup sweep now.
    ///
    /// Replies with an error if the contact list could not be fetched.
    CleanupNow {
        reply: oneshot::Sender<Result<CleanupReport>>,
    },

    /// Query the current node status.
    GetStatus {
        reply: oneshot::Sender<NodeStatus>,
    },

    /// Report message activity from a contact.
    ///
    /// `at: None` stamps the activity with the node clock on receipt.
    RecordActivity {
        identity: NodeIdentity,
        at: Option<Timestamp>,
    },

    /// Initiate graceful shutdown.
    ///
    /// No reply channel; await the `JoinHandle` returned by
    /// [`Node::start`](crate::node::Node::start) to confirm completion.
    Shutdown,
}

// Manual Debug because oneshot::Sender does not implement Debug.
impl std::fmt::Debug for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExportNow { .. } => f.write_str("ExportNow"),
            Self::CleanupNow { .. } => f.write_str("CleanupNow"),
            Self::GetStatus { .. } => f.write_str("GetStatus"),
            Self::RecordActivity { identity, at } => f
                .debug_struct("RecordActivity")
                .field("identity", identity)
                .field("at", at)
                .finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Snapshot of the node's current state.
///
/// Returned by [`NodeCommand::GetStatus`].
#[derive(Clone, Debug, PartialEq)]
pub struct NodeStatus {
    /// Current state machine state.
    pub state: NodeState,
    /// Identities with at least one recorded link.
    pub link_sources: usize,
    /// Total half-edges in the link store.
    pub half_edges: usize,
    /// Contacts greeted (including greetings in flight).
    pub greeted: usize,
    /// Contacts with recorded message activity.
    pub tracked_activity: usize,
    /// Greeting or cleanup jobs still running.
    pub jobs_in_flight: usize,
    /// When the last export cycle finished, if any has.
    pub last_export: Option<Timestamp>,
}
