//! Panel configuration with sensible defaults.
//!
//! All operational parameters of the engine are centralized here.
//! Every value has a documented default; missing fields in a config
//! file fall back to them.

use serde::{Deserialize, Serialize};

use crate::{MeshPanelError, Result};

/// Setting consulted for the heatmap threshold override.
pub const HEATMAP_THRESHOLD_SETTING: &str = "input_number.meshcore_heatmap_threshold_hours";

/// Setting consulted for the nodemap threshold override.
pub const NODEMAP_THRESHOLD_SETTING: &str = "input_number.meshcore_advert_threshold_hours";

/// Setting consulted for the direct-links threshold override.
pub const DIRECTLINKS_THRESHOLD_SETTING: &str =
    "input_number.meshcore_directlinks_threshold_hours";

/// Global engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Operator name embedded in greeting messages.
    pub my_name: String,

    /// Pubkey of the operator's own repeater. Informational only.
    pub my_repeater_pubkey: String,

    /// Whether newly observed client contacts are greeted.
    pub greet_enabled: bool,

    /// Channel index the greeting is posted on.
    pub greet_channel: u8,

    /// Whether the scheduled stale-contact sweep runs.
    pub cleanup_enabled: bool,

    /// Age in days after which a contact with no advert and no message
    /// activity is removed.
    pub cleanup_days: u64,

    /// Seconds between cleanup sweeps.
    pub cleanup_interval_secs: u64,

    /// Seconds between export + save cycles.
    pub export_interval_secs: u64,

    /// Days a link or activity entry is retained without being refreshed.
    pub retention_days: u64,

    /// Upper bound, in seconds, on any single host call.
    pub command_timeout_secs: u64,

    /// Heatmap threshold used when the host setting is absent.
    pub default_heatmap_hours: f64,

    /// Nodemap threshold used when the host setting is absent.
    pub default_nodemap_hours: f64,

    /// Direct-links threshold used when the host setting is absent.
    pub default_directlinks_hours: f64,

    /// Host setting names for the three threshold overrides.
    pub heatmap_threshold_setting: String,
    pub nodemap_threshold_setting: String,
    pub directlinks_threshold_setting: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            my_name: "MyRepeater".into(),
            my_repeater_pubkey: String::new(),
            greet_enabled: true,
            greet_channel: 0,
            cleanup_enabled: true,
            cleanup_days: 30,
            cleanup_interval_secs: 24 * 3600,
            export_interval_secs: 300,
            retention_days: 7,
            command_timeout_secs: 10,
            default_heatmap_hours: 168.0,
            default_nodemap_hours: 12.0,
            default_directlinks_hours: 168.0,
            heatmap_threshold_setting: HEATMAP_THRESHOLD_SETTING.into(),
            nodemap_threshold_setting: NODEMAP_THRESHOLD_SETTING.into(),
            directlinks_threshold_setting: DIRECTLINKS_THRESHOLD_SETTING.into(),
        }
    }
}

impl PanelConfig {
    /// Retention window in seconds.
    pub fn retention_secs(&self) -> f64 {
        (self.retention_days * 24 * 3600) as f64
    }

    /// Cleanup staleness threshold in seconds.
    pub fn cleanup_threshold_secs(&self) -> f64 {
        (self.cleanup_days * 24 * 3600) as f64
    }

    /// Command timeout as a `Duration`.
    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.command_timeout_secs)
    }

    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.export_interval_secs == 0 {
            return Err(config_error("export_interval_secs must be greater than 0"));
        }

        if self.cleanup_enabled && self.cleanup_interval_secs == 0 {
            return Err(config_error("cleanup_interval_secs must be greater than 0"));
        }

        if self.cleanup_days == 0 {
            return Err(config_error("cleanup_days must be greater than 0"));
        }

        if self.retention_days == 0 {
            return Err(config_error("retention_days must be greater than 0"));
        }

        if self.command_timeout_secs == 0 {
            return Err(config_error("command_timeout_secs must be greater than 0"));
        }

        for (name, hours) in [
            ("default_heatmap_hours", self.default_heatmap_hours),
            ("default_nodemap_hours", self.default_nodemap_hours),
            ("default_directlinks_hours", self.default_directlinks_hours),
        ] {
            if !hours.is_finite() || hours <= 0.0 {
                return Err(config_error(&format!("{name} must be a positive number")));
            }
        }

        if self.greet_enabled && self.my_name.trim().is_empty() {
            return Err(config_error("my_name must be set when greeting is enabled"));
        }

        Ok(())
    }
}

fn config_error(reason: &str) -> MeshPanelError {
    MeshPanelError::ConfigError {
        reason: reason.into(),
    }
}
