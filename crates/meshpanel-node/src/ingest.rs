//! Event ingestion.
//!
//! Applies one decoded [`MeshEvent`] to the panel state. Runs on the
//! event loop, is synchronous, and performs no I/O: anything that must
//! talk to the host is returned as a job for the caller to spawn.

use meshpanel_storage::PanelState;
use meshpanel_types::config::PanelConfig;
use meshpanel_types::{MeshEvent, NodeIdentity, Timestamp};

use crate::greeting::{self, GreetingJob};

/// Applies `event` to `state`.
///
/// Returns a [`GreetingJob`] when the event reserved a new greeting.
pub fn handle_mesh_event(
    event: MeshEvent,
    state: &mut PanelState,
    config: &PanelConfig,
) -> Option<GreetingJob> {
    match event {
        MeshEvent::PathTrace {
            path_nodes,
            received_at,
        } => {
            record_path(&path_nodes, received_at, state);
            None
        }

        MeshEvent::NewContact {
            public_key,
            name,
            kind,
        } => {
            if !config.greet_enabled {
                return None;
            }

            if !kind.is_greetable() {
                tracing::debug!(%kind, %name, "not greeting non-client contact");
                return None;
            }

            let identity = match NodeIdentity::from_pubkey(&public_key) {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::debug!(%e, %name, "new contact without usable pubkey");
                    return None;
                }
            };

            greeting::begin(&mut state.greeted, identity, &name, config)
        }

        MeshEvent::Unrecognized { event_type } => {
            tracing::trace!(%event_type, "ignoring unrecognized event");
            None
        }
    }
}

/// Records every consecutive pair of `path_nodes` as a direct link.
///
/// Paths shorter than two nodes carry no link. Entries that are not
/// valid identities are dropped before pairing, so their neighbours
/// are paired with each other.
fn record_path(path_nodes: &[String], at: Timestamp, state: &mut PanelState) {
    let path: Vec<NodeIdentity> = path_nodes
        .iter()
        .filter_map(|node| NodeIdentity::new(node).ok())
        .collect();

    if path.len() < 2 {
        return;
    }

    for pair in path.windows(2) {
        state.links.record_pair(&pair[0], &pair[1], at);
    }

    tracing::trace!(hops = path.len(), "path trace recorded");
}
