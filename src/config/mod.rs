//! Configuration for the rig remote
//!
//! Handles loading, parsing, validation and hot-reloading of the YAML
//! configuration file. Every section is optional; missing values fall back to
//! the defaults the firmware ships with.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::input::default_keypad;
use crate::protocol::{Casing, CommandEncoder, LogicalCommand};
use crate::transport::{
    GattProfile, ScanFilter, NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID,
};

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub protocol: ProtocolConfig,
    pub keyboard: KeyboardConfig,
    pub gamepad: GamepadConfig,
    pub journal: JournalConfig,
}

/// Which device to look for and how to talk to it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub service_uuid: Uuid,
    pub write_characteristic_uuid: Uuid,
    pub notify_characteristic_uuid: Uuid,
    /// Offer every advertising device instead of filtering on the service
    pub accept_all_devices: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    pub scan_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID,
            write_characteristic_uuid: WRITE_CHARACTERISTIC_UUID,
            notify_characteristic_uuid: NOTIFY_CHARACTERISTIC_UUID,
            accept_all_devices: true,
            name_prefix: None,
            scan_timeout_ms: default_scan_timeout(),
        }
    }
}

/// Wire rendering options
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub casing: Casing,
    pub null_terminated: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            casing: Casing::Lower,
            null_terminated: true,
        }
    }
}

/// Key name → command
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub bindings: BTreeMap<String, LogicalCommand>,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            bindings: default_keypad(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GamepadConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// Absolute axis value beyond which a direction counts as pressed
    pub axis_threshold: f32,
    pub buttons: BTreeMap<String, LogicalCommand>,
    pub axes: Vec<AxisBindingConfig>,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval(),
            axis_threshold: default_axis_threshold(),
            buttons: BTreeMap::from([
                ("dpad.up".to_string(), LogicalCommand::Ascend),
                ("dpad.down".to_string(), LogicalCommand::Descend),
                ("dpad.right".to_string(), LogicalCommand::Forward),
                ("dpad.left".to_string(), LogicalCommand::Back),
                ("a".to_string(), LogicalCommand::FullStop),
                ("x".to_string(), LogicalCommand::EmergencyStop),
            ]),
            axes: vec![AxisBindingConfig {
                axis: "ly".to_string(),
                positive: Some(LogicalCommand::Ascend),
                negative: Some(LogicalCommand::Descend),
            }],
        }
    }
}

impl GamepadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Commands for the two directions of one analog axis
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AxisBindingConfig {
    pub axis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive: Option<LogicalCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<LogicalCommand>,
}

/// Persistent event log
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    /// Where `export` writes log files (defaults to the current directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            export_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load the file if it exists, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.device.scan_timeout_ms == 0 {
            anyhow::bail!("device.scan_timeout_ms must be greater than zero");
        }
        if let Some(prefix) = &self.device.name_prefix {
            if prefix.trim().is_empty() {
                anyhow::bail!("device.name_prefix cannot be empty");
            }
        }

        for key in self.keyboard.bindings.keys() {
            if key.trim().is_empty() {
                anyhow::bail!("keyboard binding with an empty key name");
            }
        }

        let gamepad = &self.gamepad;
        if gamepad.poll_interval_ms == 0 {
            anyhow::bail!("gamepad.poll_interval_ms must be greater than zero");
        }
        if !(gamepad.axis_threshold > 0.0 && gamepad.axis_threshold < 1.0) {
            anyhow::bail!(
                "gamepad.axis_threshold {} is invalid (must be between 0 and 1)",
                gamepad.axis_threshold
            );
        }
        for axis in &gamepad.axes {
            if axis.axis.trim().is_empty() {
                anyhow::bail!("gamepad axis binding with an empty axis name");
            }
            if axis.positive.is_none() && axis.negative.is_none() {
                anyhow::bail!("gamepad axis '{}' binds neither direction", axis.axis);
            }
        }

        Ok(())
    }

    pub fn gatt_profile(&self) -> GattProfile {
        GattProfile {
            service: self.device.service_uuid,
            write_characteristic: self.device.write_characteristic_uuid,
            notify_characteristic: self.device.notify_characteristic_uuid,
        }
    }

    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            accept_all: self.device.accept_all_devices,
            service: self.device.service_uuid,
            name_prefix: self.device.name_prefix.clone(),
            timeout: Duration::from_millis(self.device.scan_timeout_ms),
        }
    }

    pub fn encoder(&self) -> CommandEncoder {
        CommandEncoder::new(self.protocol.casing, self.protocol.null_terminated)
    }
}

fn default_scan_timeout() -> u64 { 5000 }
fn default_poll_interval() -> u64 { 100 }
fn default_axis_threshold() -> f32 { 0.5 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Seconds;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = AppConfig::parse("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.gatt_profile(), GattProfile::default());
        assert_eq!(config.scan_filter(), ScanFilter::default());
        assert_eq!(config.encoder(), CommandEncoder::default());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
device:
  accept_all_devices: false
  name_prefix: "RIG"
protocol:
  casing: upper
keyboard:
  bindings:
    w: "11"
    s: descend
    t: dows1.5s
gamepad:
  enabled: false
"#;
        let config = AppConfig::parse(yaml).unwrap();

        assert!(!config.device.accept_all_devices);
        assert_eq!(config.scan_filter().name_prefix.as_deref(), Some("RIG"));
        assert_eq!(config.protocol.casing, Casing::Upper);
        assert!(config.protocol.null_terminated);
        assert_eq!(config.keyboard.bindings["w"], LogicalCommand::Ascend);
        assert_eq!(config.keyboard.bindings["s"], LogicalCommand::Descend);
        assert_eq!(
            config.keyboard.bindings["t"],
            LogicalCommand::TimedDescent { seconds: Seconds::from_millis(1500) }
        );
        assert!(!config.gamepad.enabled);
        assert_eq!(config.gamepad.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AppConfig::parse("gamepad:\n  axis_threshold: 1.5\n").is_err());
        assert!(AppConfig::parse("gamepad:\n  poll_interval_ms: 0\n").is_err());
        assert!(AppConfig::parse("device:\n  scan_timeout_ms: 0\n").is_err());
        assert!(AppConfig::parse("gamepad:\n  axes:\n    - axis: rx\n").is_err());
        assert!(AppConfig::parse("keyboard:\n  bindings:\n    k: \"\"\n").is_err());
    }

    #[tokio::test]
    async fn test_save_then_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.device.name_prefix = Some("RigBox".to_string());
        config.journal.export_dir = Some(PathBuf::from("/tmp/exports"));
        config.save(&path).await?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_default_without_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = AppConfig::load_or_default(temp_dir.path().join("missing.yaml")).await?;
        assert_eq!(config, AppConfig::default());
        Ok(())
    }
}
