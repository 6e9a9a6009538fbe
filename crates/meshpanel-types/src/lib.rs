//! Core shared types for the meshpanel aggregation engine.
//!
//! This crate defines the identity, time, record, event, and error
//! types used across the workspace. Storage and runtime crates depend
//! on it; it depends on nothing else in the workspace.

pub mod config;
pub mod contact;
pub mod event;
pub mod outbound;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use contact::{ContactRecord, HopRecord, NodeKind, ResolvedNode};
pub use event::{MeshEvent, RawEvent};
pub use outbound::{HostCall, OutboundCommand};

// ---------------------------------------------------------------------------
// NodeIdentity
// ---------------------------------------------------------------------------

/// Length of the pubkey prefix used to identify contacts for greeting.
pub const GREETING_PREFIX_LEN: usize = 12;

/// Lower-cased pubkey prefix identifying a mesh node for matching.
///
/// Prefixes are not globally unique: two nodes may share a short
/// prefix. Resolution to a full contact record is done by the node
/// resolver, which applies a deterministic tie-break.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Builds an identity from any prefix string.
    ///
    /// Surrounding whitespace is trimmed and the result lower-cased.
    ///
    /// # Errors
    ///
    /// [`MeshPanelError::InvalidIdentity`] if the prefix is empty after
    /// trimming.
    pub fn new(prefix: &str) -> Result<Self> {
        let normalized = prefix.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(MeshPanelError::InvalidIdentity {
                reason: "identity prefix must not be empty".into(),
            });
        }
        Ok(Self(normalized))
    }

    /// Builds the greeting identity: the first 12 characters of a pubkey.
    pub fn from_pubkey(pubkey: &str) -> Result<Self> {
        let truncated: String = pubkey.trim().chars().take(GREETING_PREFIX_LEN).collect();
        Self::new(&truncated)
    }

    /// Returns the normalized prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `full` starts with this prefix (case-insensitive).
    pub fn is_prefix_of(&self, full: &str) -> bool {
        full.to_lowercase().starts_with(&self.0)
    }
}

impl TryFrom<String> for NodeIdentity {
    type Error = MeshPanelError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<NodeIdentity> for String {
    fn from(id: NodeIdentity) -> Self {
        id.0
    }
}

impl FromStr for NodeIdentity {
    type Err = MeshPanelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Seconds since the Unix epoch, with sub-second precision.
///
/// Serialized as a bare JSON number so snapshot and artifact files
/// stay readable by consumers that expect float epoch seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// The epoch itself. Used as the stand-in for "never".
    pub const EPOCH: Self = Self(0.0);

    /// Current UTC time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Creates a timestamp from epoch seconds.
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Creates a timestamp from a `DateTime<Utc>`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis() as f64 / 1000.0)
    }

    /// Returns epoch seconds.
    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// Converts to a `DateTime<Utc>`, if the value is representable.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.0.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt((self.0 * 1000.0).round() as i64).single()
    }

    /// Seconds elapsed between `self` and `now`. Negative if `self` is
    /// in the future.
    pub fn age_secs(&self, now: Timestamp) -> f64 {
        now.0 - self.0
    }

    /// Returns `true` if `self` is no older than `max_age_secs` at `now`.
    pub fn is_within(&self, now: Timestamp, max_age_secs: f64) -> bool {
        self.age_secs(now) <= max_age_secs
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// MeshPanelError
// ---------------------------------------------------------------------------

/// Central error type for the meshpanel workspace.
///
/// Every crate converts its failures into one of these variants. None
/// of them is fatal to the process: the event loop logs them and keeps
/// running.
#[derive(Debug, Error)]
pub enum MeshPanelError {
    /// A node identity prefix is empty or malformed.
    #[error("invalid identity: {reason}")]
    InvalidIdentity {
        /// Why the identity was rejected.
        reason: String,
    },

    /// A raw host event could not be decoded.
    #[error("invalid event: {reason}")]
    InvalidEvent {
        /// Why the event was rejected.
        reason: String,
    },

    /// Reading or writing a persisted snapshot failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// Writing an exported artifact failed.
    #[error("export error: {reason}")]
    ExportError {
        /// Human-readable description of the export failure.
        reason: String,
    },

    /// The host rejected, failed, or timed out an outbound command.
    #[error("command failed: {reason}")]
    CommandFailed {
        /// Human-readable description of the command failure.
        reason: String,
    },

    /// A host query (contacts, hops, settings) failed.
    #[error("host error: {reason}")]
    HostError {
        /// Human-readable description of the host failure.
        reason: String,
    },

    /// A configuration value is invalid, or a lifecycle call was made
    /// in the wrong state.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

/// Convenience result type using [`MeshPanelError`].
pub type Result<T> = std::result::Result<T, MeshPanelError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
