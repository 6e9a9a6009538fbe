//! Host-provided contact and hop records, and the resolved node view.
//!
//! The host exposes contacts as records with many optional attributes.
//! [`ContactRecord`] keeps that shape explicit and puts every fallback
//! rule in one place so the resolver and exporters agree on them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{NodeIdentity, Timestamp};

/// Name used when a contact carries no advertised name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Node type used when a contact carries no type string.
pub const UNKNOWN_NODE_TYPE: &str = "unknown";

// ---------------------------------------------------------------------------
// ContactRecord
// ---------------------------------------------------------------------------

/// One contact as currently known to the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactRecord {
    /// Full identity prefix as published by the host.
    pub pubkey_prefix: Option<String>,
    /// Advertised display name.
    pub adv_name: Option<String>,
    /// Human-readable node type ("Repeater", "Client", ...).
    pub node_type_str: Option<String>,
    /// Latitude from the node's advertisement.
    pub adv_lat: Option<f64>,
    /// Longitude from the node's advertisement.
    pub adv_lon: Option<f64>,
    /// Fallback latitude (manually set location).
    pub latitude: Option<f64>,
    /// Fallback longitude (manually set location).
    pub longitude: Option<f64>,
    /// Time of the node's last advertisement.
    pub last_advert: Option<Timestamp>,
}

impl ContactRecord {
    /// The record's identity, if it carries a non-empty pubkey prefix.
    pub fn identity(&self) -> Option<NodeIdentity> {
        self.pubkey_prefix
            .as_deref()
            .and_then(|p| NodeIdentity::new(p).ok())
    }

    /// Coordinates after applying the fallback chain.
    ///
    /// `adv_lat`/`adv_lon` win over `latitude`/`longitude`. A value of
    /// `0.0` or a non-finite value counts as missing. Returns `None`
    /// unless both coordinates are usable.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = usable(self.adv_lat).or_else(|| usable(self.latitude))?;
        let lon = usable(self.adv_lon).or_else(|| usable(self.longitude))?;
        Some((lat, lon))
    }

    /// Advertised name, or `"Unknown"`.
    pub fn display_name(&self) -> &str {
        match self.adv_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_NAME,
        }
    }

    /// Lower-cased node type, or `"unknown"`.
    pub fn node_type(&self) -> String {
        match self.node_type_str.as_deref() {
            Some(t) if !t.is_empty() => t.to_lowercase(),
            _ => UNKNOWN_NODE_TYPE.into(),
        }
    }

    /// Returns `true` if the node type names a repeater.
    pub fn is_repeater(&self) -> bool {
        self.node_type().contains("repeater")
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

// ---------------------------------------------------------------------------
// HopRecord
// ---------------------------------------------------------------------------

/// A received transmission's relay path, as tracked by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HopRecord {
    /// Relay identity prefixes in path order.
    pub path_nodes: Vec<String>,
    /// When a message last arrived over this path.
    pub last_message_time: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// ResolvedNode
// ---------------------------------------------------------------------------

/// A contact record that matched an identity prefix.
///
/// Derived on demand from the host snapshot; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedNode {
    /// Full identity of the matched contact.
    pub identity: NodeIdentity,
    /// Display name (fallback applied).
    pub name: String,
    /// Latitude (fallback chain applied).
    pub lat: f64,
    /// Longitude (fallback chain applied).
    pub lon: f64,
    /// Lower-cased node type.
    pub node_type: String,
    /// Last advertisement, `None` if never seen.
    pub last_advert: Option<Timestamp>,
}

impl ResolvedNode {
    /// Builds a resolved view of `record`.
    ///
    /// Returns `None` if the record has no identity or no usable
    /// coordinates.
    pub fn from_record(record: &ContactRecord) -> Option<Self> {
        let identity = record.identity()?;
        let (lat, lon) = record.coordinates()?;
        Some(Self {
            identity,
            name: record.display_name().to_string(),
            lat,
            lon,
            node_type: record.node_type(),
            last_advert: record.last_advert,
        })
    }

    /// Returns `true` if the node type names a repeater.
    pub fn is_repeater(&self) -> bool {
        self.node_type.contains("repeater")
    }
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// Node type code carried by new-contact advertisements.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    /// Code 0: type not reported.
    Unknown,
    /// Code 1: chat client.
    Chat,
    /// Code 2: repeater.
    Repeater,
    /// Code 3: room server.
    RoomServer,
    /// Code 4: sensor.
    Sensor,
    /// Any other code.
    Other(u8),
}

impl NodeKind {
    /// Maps a wire type code to a kind.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Chat,
            2 => Self::Repeater,
            3 => Self::RoomServer,
            4 => Self::Sensor,
            other => Self::Other(other),
        }
    }

    /// Only client-like nodes receive a greeting.
    pub fn is_greetable(&self) -> bool {
        matches!(self, Self::Unknown | Self::Chat)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Chat => write!(f, "chat"),
            Self::Repeater => write!(f, "repeater"),
            Self::RoomServer => write!(f, "room_server"),
            Self::Sensor => write!(f, "sensor"),
            Self::Other(code) => write!(f, "other({code})"),
        }
    }
}
