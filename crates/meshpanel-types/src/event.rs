//! Host telemetry events.
//!
//! The host pushes [`RawEvent`]s: a type tag plus a loosely-typed JSON
//! payload. [`MeshEvent::from_raw`] decodes them into a closed set of
//! variants so ingestion matches on types, never on strings. Unknown
//! tags decode to [`MeshEvent::Unrecognized`] and are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contact::{NodeKind, UNKNOWN_NAME};
use crate::{MeshPanelError, Result, Timestamp};

/// Event tag for received-packet log entries carrying a path trace.
pub const EVENT_RX_LOG_DATA: &str = "EventType.RX_LOG_DATA";

/// Event tag for newly discovered contacts.
pub const EVENT_NEW_CONTACT: &str = "EventType.NEW_CONTACT";

/// Event as delivered by the host bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Type tag, e.g. `"EventType.RX_LOG_DATA"`.
    pub event_type: String,
    /// Event payload; shape depends on `event_type`.
    #[serde(default)]
    pub payload: Value,
}

/// Decoded telemetry event.
#[derive(Clone, Debug, PartialEq)]
pub enum MeshEvent {
    /// A received transmission and the relays it passed through.
    PathTrace {
        /// Relay identity prefixes in path order, as received.
        path_nodes: Vec<String>,
        /// When the transmission was received.
        received_at: Timestamp,
    },
    /// A contact advertised itself for the first time.
    NewContact {
        /// Full or partial pubkey, as received.
        public_key: String,
        /// Advertised display name.
        name: String,
        /// Decoded node type code.
        kind: NodeKind,
    },
    /// Any tag this engine does not handle.
    Unrecognized {
        /// The tag that was not recognized.
        event_type: String,
    },
}

impl MeshEvent {
    /// Decodes a raw host event.
    ///
    /// Path traces are stamped with `received_at`. Missing optional
    /// fields take their defaults (empty path, `"Unknown"` name, type
    /// code 0).
    ///
    /// # Errors
    ///
    /// [`MeshPanelError::InvalidEvent`] if a recognized event carries a
    /// field of the wrong JSON type.
    pub fn from_raw(raw: &RawEvent, received_at: Timestamp) -> Result<Self> {
        match raw.event_type.as_str() {
            EVENT_RX_LOG_DATA => {
                let path_nodes = match raw.payload.pointer("/parsed/path_nodes") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|item| {
                            item.as_str().map(str::to_string).ok_or_else(|| {
                                invalid("path_nodes entries must be strings")
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                    Some(_) => return Err(invalid("path_nodes must be an array")),
                };
                Ok(Self::PathTrace {
                    path_nodes,
                    received_at,
                })
            }

            EVENT_NEW_CONTACT => {
                let public_key = optional_str(&raw.payload, "public_key")?
                    .unwrap_or_default();
                let name = optional_str(&raw.payload, "adv_name")?
                    .unwrap_or_else(|| UNKNOWN_NAME.into());
                let code = match raw.payload.get("type") {
                    None | Some(Value::Null) => 0,
                    Some(v) => v
                        .as_u64()
                        .and_then(|c| u8::try_from(c).ok())
                        .ok_or_else(|| invalid("type must be a small unsigned integer"))?,
                };
                Ok(Self::NewContact {
                    public_key,
                    name,
                    kind: NodeKind::from_code(code),
                })
            }

            other => Ok(Self::Unrecognized {
                event_type: other.to_string(),
            }),
        }
    }
}

fn optional_str(payload: &Value, key: &str) -> Result<Option<String>> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(&format!("{key} must be a string"))),
    }
}

fn invalid(reason: &str) -> MeshPanelError {
    MeshPanelError::InvalidEvent {
        reason: reason.into(),
    }
}
