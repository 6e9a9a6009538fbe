//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file).

use std::path::{Path, PathBuf};

use clap::Parser;
use meshpanel_types::config::PanelConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Meshpanel daemon: mesh topology panel fed from stdin.
///
/// Raw host events are read as JSON lines from stdin. Outbound host
/// calls are written as JSON lines to stdout. Logs go to stderr and
/// are filtered with `RUST_LOG` (default: info).
#[derive(Parser, Debug, Default)]
#[command(name = "meshpanel-daemon", version, about)]
pub struct Cli {
    /// Directory holding persisted snapshots (default: platform-specific).
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Directory the panel artifacts are written to (default: data dir).
    #[arg(long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Directory with contacts.json, hops.json and settings.json
    /// (default: data dir).
    #[arg(long, value_name = "PATH")]
    pub host_dir: Option<PathBuf>,

    /// Load settings from a JSON config file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Operator name embedded in greeting messages.
    #[arg(long, value_name = "NAME")]
    pub my_name: Option<String>,

    /// Disable greeting of new contacts.
    #[arg(long)]
    pub no_greet: bool,

    /// Disable the scheduled stale-contact sweep.
    #[arg(long)]
    pub no_cleanup: bool,
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format.
///
/// Example `meshpanel.json`:
/// ```json
/// {
///   "data_dir": "/var/lib/meshpanel",
///   "output_dir": "/var/www/meshpanel",
///   "host_dir": "/run/meshpanel",
///   "panel": {
///     "my_name": "Hilltop",
///     "cleanup_days": 45,
///     "export_interval_secs": 120
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonConfigFile {
    pub data_dir: Option<String>,
    pub output_dir: Option<String>,
    pub host_dir: Option<String>,
    /// Engine settings; absent fields take `PanelConfig` defaults.
    pub panel: Option<PanelConfig>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults applied)
// ---------------------------------------------------------------------------

/// Fully resolved daemon configuration with all defaults applied.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub host_dir: PathBuf,
    pub panel: PanelConfig,
}

impl DaemonConfig {
    /// Build config purely from CLI args with defaults.
    pub fn from_cli(cli: &Cli) -> Self {
        Self::from_file(DaemonConfigFile::default()).merge_cli(cli)
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;

        let file: DaemonConfigFile =
            serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))?;

        Ok(Self::from_file(file))
    }

    /// Merge CLI overrides onto a config-file base.
    ///
    /// An explicit `--data-dir` also moves the output and host
    /// directories unless those are given too.
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(ref dir) = cli.data_dir {
            if self.output_dir == self.data_dir {
                self.output_dir = dir.clone();
            }
            if self.host_dir == self.data_dir {
                self.host_dir = dir.clone();
            }
            self.data_dir = dir.clone();
        }
        if let Some(ref dir) = cli.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(ref dir) = cli.host_dir {
            self.host_dir = dir.clone();
        }
        if let Some(ref name) = cli.my_name {
            self.panel.my_name = name.clone();
        }
        if cli.no_greet {
            self.panel.greet_enabled = false;
        }
        if cli.no_cleanup {
            self.panel.cleanup_enabled = false;
        }
        self
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        Self {
            output_dir: file
                .output_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.clone()),
            host_dir: file
                .host_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.clone()),
            data_dir,
            panel: file.panel.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".meshpanel");
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("Meshpanel");
    }
    PathBuf::from("meshpanel-data")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::try_parse_from([
            "meshpanel-daemon",
            "--data-dir",
            "/tmp/mp",
            "--my-name",
            "Hilltop",
            "--no-greet",
        ])
        .expect("parse");
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/mp")));
        assert_eq!(cli.my_name.as_deref(), Some("Hilltop"));
        assert!(cli.no_greet);
        assert!(!cli.no_cleanup);
    }

    #[test]
    fn data_dir_flag_moves_dependent_dirs() {
        let cli = Cli {
            data_dir: Some(PathBuf::from("/srv/mp")),
            ..Cli::default()
        };
        let cfg = DaemonConfig::from_cli(&cli);
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/mp"));
        assert_eq!(cfg.output_dir, PathBuf::from("/srv/mp"));
        assert_eq!(cfg.host_dir, PathBuf::from("/srv/mp"));
        assert!(cfg.panel.greet_enabled);
    }

    #[test]
    fn file_values_fill_gaps_and_cli_wins() {
        let file: DaemonConfigFile = serde_json::from_str(
            r#"{
                "data_dir": "/var/lib/mp",
                "output_dir": "/var/www/mp",
                "panel": { "my_name": "FromFile", "cleanup_days": 45 }
            }"#,
        )
        .expect("json");
        let cli = Cli {
            my_name: Some("FromCli".into()),
            no_cleanup: true,
            ..Cli::default()
        };

        let cfg = DaemonConfig::from_file(file).merge_cli(&cli);
        assert_eq!(cfg.output_dir, PathBuf::from("/var/www/mp"));
        assert_eq!(cfg.host_dir, PathBuf::from("/var/lib/mp"));
        assert_eq!(cfg.panel.my_name, "FromCli");
        assert_eq!(cfg.panel.cleanup_days, 45);
        assert!(!cfg.panel.cleanup_enabled);
        assert_eq!(cfg.panel.export_interval_secs, 300);
    }

    #[test]
    fn explicit_output_dir_survives_data_dir_override() {
        let file = DaemonConfigFile {
            data_dir: Some("/a".into()),
            output_dir: Some("/b".into()),
            ..DaemonConfigFile::default()
        };
        let cli = Cli {
            data_dir: Some(PathBuf::from("/c")),
            ..Cli::default()
        };
        let cfg = DaemonConfig::from_file(file).merge_cli(&cli);
        assert_eq!(cfg.output_dir, PathBuf::from("/b"));
        assert_eq!(cfg.host_dir, PathBuf::from("/c"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = DaemonConfig::load(Path::new("/definitely/not/here.json"))
            .expect_err("must fail");
        assert!(err.contains("failed to read config file"));
    }
}
