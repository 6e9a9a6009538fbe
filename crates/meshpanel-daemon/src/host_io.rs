//! File and stdio host adapter.
//!
//! Contact state, hop records, and settings are read from JSON files
//! in a host directory on every query, so an external process can
//! refresh them at any time. Outbound commands are written to stdout
//! as one [`HostCall`] JSON object per line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use meshpanel_node::{CommandSink, ContactSource, SettingsSource};
use meshpanel_types::{ContactRecord, HopRecord, HostCall, MeshPanelError, OutboundCommand, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

const CONTACTS_FILE: &str = "contacts.json";
const HOPS_FILE: &str = "hops.json";
const SETTINGS_FILE: &str = "settings.json";

// ---------------------------------------------------------------------------
// FileHost
// ---------------------------------------------------------------------------

/// Host state backed by JSON files in one directory.
///
/// - `contacts.json`: array of contact records
/// - `hops.json`: array of hop records
/// - `settings.json`: object mapping setting names to numbers or strings
///
/// A missing file reads as empty.
#[derive(Clone, Debug)]
pub struct FileHost {
    dir: PathBuf,
}

impl FileHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_json<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T> {
        read_json_file(&self.dir.join(file)).await
    }
}

async fn read_json_file<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(MeshPanelError::HostError {
                reason: format!("failed to read {}: {e}", path.display()),
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| MeshPanelError::HostError {
        reason: format!("malformed {}: {e}", path.display()),
    })
}

#[async_trait]
impl ContactSource for FileHost {
    async fn contacts(&self) -> Result<Vec<ContactRecord>> {
        self.read_json(CONTACTS_FILE).await
    }

    async fn hop_records(&self) -> Result<Vec<HopRecord>> {
        self.read_json(HOPS_FILE).await
    }
}

#[async_trait]
impl SettingsSource for FileHost {
    async fn setting(&self, name: &str) -> Option<String> {
        let settings: BTreeMap<String, Value> = match self.read_json(SETTINGS_FILE).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(%e, "settings unavailable");
                return None;
            }
        };
        match settings.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// LineSink
// ---------------------------------------------------------------------------

/// Writes each outbound command as one JSON line.
pub struct LineSink<W> {
    out: Mutex<W>,
}

/// Line sink on the process's stdout.
pub type StdoutSink = LineSink<tokio::io::Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        LineSink::new(tokio::io::stdout())
    }
}

impl<W> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl<W> CommandSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn dispatch(&self, command: &OutboundCommand) -> Result<()> {
        let call: HostCall = command.to_host_call();
        let mut line = serde_json::to_vec(&call).map_err(|e| MeshPanelError::CommandFailed {
            reason: format!("failed to encode {command}: {e}"),
        })?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|e| MeshPanelError::CommandFailed {
                reason: format!("failed to write {command}: {e}"),
            })?;
        out.flush().await.map_err(|e| MeshPanelError::CommandFailed {
            reason: format!("failed to flush {command}: {e}"),
        })?;

        tracing::debug!(%command, "host call written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
