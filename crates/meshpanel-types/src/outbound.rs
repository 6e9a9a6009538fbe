//! Commands the engine asks the host to perform.
//!
//! The host's command API is untyped: a domain, a service name, and a
//! key/value argument map. [`OutboundCommand`] is the typed side;
//! [`OutboundCommand::to_host_call`] produces the untyped call.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::NodeIdentity;

/// Title of the notification raised after a greeting.
pub const GREETING_NOTIFICATION_TITLE: &str = "🆕 New MeshCore Contact";

/// A command for the host to execute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Post a text message on a mesh channel.
    SendChannelMessage { channel: u8, text: String },
    /// Raise an informational notification for the operator.
    CreateNotification { title: String, message: String },
    /// Remove a contact from the radio's contact table.
    RemoveContact { pubkey: String },
}

impl OutboundCommand {
    /// Welcome message posted for a newly observed contact.
    pub fn welcome(channel: u8, contact_name: &str, operator_name: &str) -> Self {
        Self::SendChannelMessage {
            channel,
            text: format!("Welcome to the mesh {contact_name}! 👋 from {operator_name}"),
        }
    }

    /// Operator notification following a greeting.
    pub fn greeted_notification(contact_name: &str, identity: &NodeIdentity) -> Self {
        Self::CreateNotification {
            title: GREETING_NOTIFICATION_TITLE.into(),
            message: format!(
                "**{contact_name}**\nPubkey: {identity}\n\nGreeted on Public channel"
            ),
        }
    }

    /// Projects the command onto the host's untyped call shape.
    pub fn to_host_call(&self) -> HostCall {
        let (domain, service, args) = match self {
            Self::SendChannelMessage { channel, text } => (
                "meshcore",
                "send_channel_message",
                json!({ "channel": channel, "text": text }),
            ),
            Self::CreateNotification { title, message } => (
                "persistent_notification",
                "create",
                json!({ "title": title, "message": message }),
            ),
            Self::RemoveContact { pubkey } => (
                "meshcore",
                "execute_command",
                json!({ "command": format!("remove_contact {pubkey}") }),
            ),
        };

        HostCall {
            domain: domain.into(),
            service: service.into(),
            args: match args {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendChannelMessage { channel, .. } => {
                write!(f, "send_channel_message(channel={channel})")
            }
            Self::CreateNotification { .. } => write!(f, "create_notification"),
            Self::RemoveContact { pubkey } => write!(f, "remove_contact({pubkey})"),
        }
    }
}

/// Untyped host service call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostCall {
    /// Service domain, e.g. `"meshcore"`.
    pub domain: String,
    /// Service name within the domain.
    pub service: String,
    /// Keyword arguments.
    pub args: Map<String, Value>,
}
