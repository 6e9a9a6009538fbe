//! In-memory topology state and its durable JSON snapshots.
//!
//! Subsystems: the symmetric link store, the greeted set and
//! last-activity map, atomic JSON file I/O, and the persistence layer
//! that ties them to files with retention pruning.

pub mod contacts;
pub mod links;
pub mod persistence;
pub mod snapshot_file;

pub use contacts::{GreetedSet, LastActivityMap};
pub use links::{LinkEdge, LinkStore};
pub use persistence::{PanelState, Persistence, SaveReport, SnapshotBundle};
pub use snapshot_file::SnapshotFile;
