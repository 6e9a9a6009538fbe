//! Host collaborator boundary.
//!
//! The engine never talks to the host directly. Contact state, numeric
//! settings, and command execution are reached through the traits
//! below, bundled in [`HostHandles`]. Production hosts and test doubles
//! implement the same traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshpanel_types::{
    ContactRecord, HopRecord, MeshPanelError, OutboundCommand, Result, Timestamp,
};

/// Read access to the host's live contact state.
#[async_trait]
pub trait ContactSource: Send + Sync + 'static {
    /// Every contact currently known to the host, in the host's
    /// natural enumeration order.
    async fn contacts(&self) -> Result<Vec<ContactRecord>>;

    /// Every tracked relay path.
    async fn hop_records(&self) -> Result<Vec<HopRecord>>;
}

/// Read access to host-side numeric settings.
#[async_trait]
pub trait SettingsSource: Send + Sync + 'static {
    /// Raw value of the setting named `name`, if it exists.
    async fn setting(&self, name: &str) -> Option<String>;
}

/// Executes commands on the host.
#[async_trait]
pub trait CommandSink: Send + Sync + 'static {
    /// Runs `command`. An `Err` means the host did not carry it out.
    async fn dispatch(&self, command: &OutboundCommand) -> Result<()>;
}

/// Source of the current time.
///
/// Path traces, pruning, and export timestamps all read the clock
/// through this trait so tests can pin it.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Shared handles to every host collaborator.
#[derive(Clone)]
pub struct HostHandles {
    pub contacts: Arc<dyn ContactSource>,
    pub settings: Arc<dyn SettingsSource>,
    pub commands: Arc<dyn CommandSink>,
}

impl HostHandles {
    /// Bundles three collaborators.
    pub fn new(
        contacts: Arc<dyn ContactSource>,
        settings: Arc<dyn SettingsSource>,
        commands: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            contacts,
            settings,
            commands,
        }
    }

    /// Dispatches `command` with an upper bound on how long the host
    /// may take. A timeout is reported as [`MeshPanelError::CommandFailed`].
    pub async fn dispatch(&self, command: &OutboundCommand, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.commands.dispatch(command)).await {
            Ok(result) => result,
            Err(_) => Err(MeshPanelError::CommandFailed {
                reason: format!("{command} timed out after {}s", timeout.as_secs_f64()),
            }),
        }
    }

    /// Fetches contacts, bounded by `timeout`.
    pub async fn contacts(&self, timeout: Duration) -> Result<Vec<ContactRecord>> {
        bounded(timeout, "contact query", self.contacts.contacts()).await
    }

    /// Fetches hop records, bounded by `timeout`.
    pub async fn hop_records(&self, timeout: Duration) -> Result<Vec<HopRecord>> {
        bounded(timeout, "hop query", self.contacts.hop_records()).await
    }

    /// Looks up a setting. A lookup that outlives `timeout` counts as
    /// absent.
    pub async fn setting(&self, name: &str, timeout: Duration) -> Option<String> {
        match tokio::time::timeout(timeout, self.settings.setting(name)).await {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(name, "setting lookup timed out");
                None
            }
        }
    }
}

async fn bounded<T>(
    timeout: Duration,
    what: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MeshPanelError::HostError {
            reason: format!("{what} timed out after {}s", timeout.as_secs_f64()),
        }),
    }
}
