//! Meshpanel runtime: ingestion, greeting, cleanup, and export around
//! a single-writer event loop.

pub mod cleanup;
pub mod command;
mod event_loop;
pub mod export;
pub mod greeting;
pub mod host;
pub mod ingest;
pub mod node;
pub mod resolver;

pub use cleanup::CleanupReport;
pub use command::{NodeCommand, NodeStatus};
pub use export::{ExportReport, OutputPaths};
pub use host::{Clock, CommandSink, ContactSource, HostHandles, SettingsSource, SystemClock};
pub use node::{Node, NodeState};
pub use resolver::{ResolveNode, SnapshotResolver};
