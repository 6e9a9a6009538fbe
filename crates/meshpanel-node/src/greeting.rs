//! One-shot greeting workflow for newly observed contacts.
//!
//! # State machine
//!
//! ```text
//! unknown ──begin()──▶ pending ──deliver() ok──▶ greeted
//!                         │
//!                         └──deliver() err──▶ unknown (rolled back)
//! ```
//!
//! [`begin`] runs on the event loop and inserts the identity into the
//! greeted set before anything is sent, so a second new-contact event
//! for the same identity arriving while delivery is in flight is
//! dropped. [`deliver`] runs off the event loop. Its result is handed
//! back to [`settle`], which removes the identity again on failure so
//! a later observation retries.

use std::time::Duration;

use meshpanel_storage::GreetedSet;
use meshpanel_types::config::PanelConfig;
use meshpanel_types::{NodeIdentity, OutboundCommand, Result};

use crate::host::HostHandles;

// ---------------------------------------------------------------------------
// GreetingJob
// ---------------------------------------------------------------------------

/// A greeting that has been reserved in the greeted set and is ready
/// to be delivered.
#[derive(Clone, Debug, PartialEq)]
pub struct GreetingJob {
    /// Greeting identity (first 12 pubkey characters).
    pub identity: NodeIdentity,
    /// Contact display name.
    pub name: String,
    /// Channel message posted first.
    pub message: OutboundCommand,
    /// Operator notification posted after the message.
    pub notification: OutboundCommand,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Reserves a greeting for `identity`.
///
/// Returns `None` if the identity was already greeted (or a greeting
/// for it is in flight). Otherwise the identity is now in `greeted`
/// and the returned job must eventually be passed to [`settle`].
pub fn begin(
    greeted: &mut GreetedSet,
    identity: NodeIdentity,
    name: &str,
    config: &PanelConfig,
) -> Option<GreetingJob> {
    if !greeted.insert(identity.clone()) {
        tracing::debug!(%identity, "contact already greeted");
        return None;
    }

    Some(GreetingJob {
        message: OutboundCommand::welcome(config.greet_channel, name, &config.my_name),
        notification: OutboundCommand::greeted_notification(name, &identity),
        identity,
        name: name.to_string(),
    })
}

/// Sends the welcome message, then the notification.
///
/// Stops at the first failure. Each command is bounded by `timeout`.
pub async fn deliver(job: &GreetingJob, host: &HostHandles, timeout: Duration) -> Result<()> {
    host.dispatch(&job.message, timeout).await?;
    host.dispatch(&job.notification, timeout).await?;
    Ok(())
}

/// Applies the outcome of [`deliver`].
///
/// On failure the identity is removed from `greeted`. Returns `true`
/// if the greeting completed.
pub fn settle(greeted: &mut GreetedSet, job: &GreetingJob, outcome: &Result<()>) -> bool {
    match outcome {
        Ok(()) => {
            tracing::info!(identity = %job.identity, name = %job.name, "greeted new contact");
            true
        }
        Err(e) => {
            greeted.remove(&job.identity);
            tracing::warn!(
                %e,
                identity = %job.identity,
                name = %job.name,
                "greeting failed, will retry on next observation"
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
