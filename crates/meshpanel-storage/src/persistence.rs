//! Durable snapshots of the engine's in-memory state.
//!
//! Three files live under the output root:
//!
//! ```text
//! meshcore_directlinks_persist.json  {"direct_links": {a: {b: {last_seen, count}}}, "saved_at": ts}
//! meshcore_last_messages.json        {"last_messages": {id: ts}, "saved_at": ts}
//! meshcore_greeted.json              {"greeted": [id, ...], "count": n}
//! ```
//!
//! Loading never fails: a missing or malformed file is logged and
//! treated as empty. Saving writes each file independently, so one
//! failed write does not prevent the others.

use std::path::{Path, PathBuf};

use meshpanel_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::contacts::{GreetedSet, LastActivityMap};
use crate::links::LinkStore;
use crate::snapshot_file::SnapshotFile;

/// Persisted direct-link table.
pub const DIRECTLINKS_PERSIST_FILE: &str = "meshcore_directlinks_persist.json";

/// Persisted last-activity map.
pub const LAST_MESSAGES_FILE: &str = "meshcore_last_messages.json";

/// Persisted greeted set.
pub const GREETED_FILE: &str = "meshcore_greeted.json";

// ---------------------------------------------------------------------------
// On-disk formats
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DirectLinksSnapshot {
    direct_links: LinkStore,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LastMessagesSnapshot {
    last_messages: LastActivityMap,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GreetedSnapshot {
    greeted: GreetedSet,
}

#[derive(Serialize)]
struct DirectLinksOut<'a> {
    direct_links: &'a LinkStore,
    saved_at: Timestamp,
}

#[derive(Serialize)]
struct LastMessagesOut<'a> {
    last_messages: &'a LastActivityMap,
    saved_at: Timestamp,
}

#[derive(Serialize)]
struct GreetedOut<'a> {
    greeted: &'a GreetedSet,
    count: usize,
}

// ---------------------------------------------------------------------------
// PanelState
// ---------------------------------------------------------------------------

/// Everything the engine owns and mutates.
///
/// Held by a single owner (the node event loop); every component
/// receives it by reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PanelState {
    /// Observed direct links.
    pub links: LinkStore,
    /// Contacts already greeted.
    pub greeted: GreetedSet,
    /// Last message activity per contact.
    pub last_activity: LastActivityMap,
}

impl PanelState {
    /// Drops links and activity entries older than the retention window.
    ///
    /// The greeted set is never pruned.
    pub fn prune(&mut self, now: Timestamp, retention_secs: f64) -> PruneReport {
        PruneReport {
            half_edges: self.links.prune_older_than(retention_secs, now),
            activity: self.last_activity.prune_older_than(retention_secs, now),
        }
    }

    /// Owned copy of the state for writing off the event loop.
    pub fn snapshot(&self, saved_at: Timestamp) -> SnapshotBundle {
        SnapshotBundle {
            links: self.links.clone(),
            greeted: self.greeted.clone(),
            last_activity: self.last_activity.clone(),
            saved_at,
        }
    }
}

/// Counts of entries removed by [`PanelState::prune`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PruneReport {
    pub half_edges: usize,
    pub activity: usize,
}

/// Point-in-time copy of [`PanelState`] ready to be written.
#[derive(Clone, Debug)]
pub struct SnapshotBundle {
    pub links: LinkStore,
    pub greeted: GreetedSet,
    pub last_activity: LastActivityMap,
    pub saved_at: Timestamp,
}

/// Outcome of a save: which files were written.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SaveReport {
    pub links_saved: bool,
    pub activity_saved: bool,
    pub greeted_saved: bool,
}

impl SaveReport {
    /// Returns `true` if every file was written.
    pub fn all_saved(&self) -> bool {
        self.links_saved && self.activity_saved && self.greeted_saved
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Loads and saves [`PanelState`] under a root directory.
///
/// All methods perform blocking file I/O; async callers run them on a
/// blocking thread.
#[derive(Clone, Debug)]
pub struct Persistence {
    root: PathBuf,
}

impl Persistence {
    /// Creates a persistence layer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the snapshot files live in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads all three snapshots. Missing or malformed files yield
    /// empty structures.
    pub fn load(&self) -> PanelState {
        let links = self
            .load_one::<DirectLinksSnapshot>(DIRECTLINKS_PERSIST_FILE)
            .map(|s| s.direct_links)
            .unwrap_or_default();

        let last_activity = self
            .load_one::<LastMessagesSnapshot>(LAST_MESSAGES_FILE)
            .map(|s| s.last_messages)
            .unwrap_or_default();

        let greeted = self
            .load_one::<GreetedSnapshot>(GREETED_FILE)
            .map(|s| s.greeted)
            .unwrap_or_default();

        tracing::info!(
            link_sources = links.source_count(),
            half_edges = links.half_edge_count(),
            activity = last_activity.len(),
            greeted = greeted.len(),
            "persisted state loaded"
        );

        PanelState {
            links,
            greeted,
            last_activity,
        }
    }

    /// Writes all three snapshots from `bundle`.
    ///
    /// Each file is written independently; failures are logged and
    /// reported in the returned [`SaveReport`].
    pub fn save(&self, bundle: &SnapshotBundle) -> SaveReport {
        let links_saved = self.save_one(
            DIRECTLINKS_PERSIST_FILE,
            &DirectLinksOut {
                direct_links: &bundle.links,
                saved_at: bundle.saved_at,
            },
        );

        let activity_saved = self.save_one(
            LAST_MESSAGES_FILE,
            &LastMessagesOut {
                last_messages: &bundle.last_activity,
                saved_at: bundle.saved_at,
            },
        );

        let greeted_saved = self.save_one(
            GREETED_FILE,
            &GreetedOut {
                greeted: &bundle.greeted,
                count: bundle.greeted.len(),
            },
        );

        SaveReport {
            links_saved,
            activity_saved,
            greeted_saved,
        }
    }

    fn load_one<T: serde::de::DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.root.join(file);
        match SnapshotFile::load(&path) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(%e, file, "ignoring unreadable snapshot");
                None
            }
        }
    }

    fn save_one<T: Serialize>(&self, file: &str, value: &T) -> bool {
        let path = self.root.join(file);
        match SnapshotFile::save(&path, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(%e, file, "failed to save snapshot");
                false
            }
        }
    }
}
