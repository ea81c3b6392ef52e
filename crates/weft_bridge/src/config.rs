//! Instance configuration
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! ```toml
//! [instance]
//! dev_mode = true
//! max_batch_size = 64
//!
//! [queues]
//! prefix = "main"
//! script_runtime = "weft-js"
//! native_modules = "weft-native-modules"
//! ui = "weft-ui"
//!
//! [mounting]
//! clamp_invalid_indices = false
//! emit_layout_events = true
//!
//! [timing]
//! frame_interval_ms = 16.67
//! idle_callback_threshold_ms = 1.0
//! drive_frames = true
//! ```
//!
//! `WEFT_DEV_MODE` (`1`/`true`/`0`/`false`) overrides `instance.dev_mode`.

use crate::error::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::Path;
use weft_mount::MountConfig;
use weft_queue::QueueConfigurationSpec;

/// Environment variable overriding `instance.dev_mode`
pub const DEV_MODE_ENV: &str = "WEFT_DEV_MODE";

/// Typed configuration of one instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    /// Verbose exception reports and the bundle reload hook
    pub dev_mode: bool,
    /// Most calls handed to the runtime at once; 0 means unbounded
    pub max_batch_size: usize,
    pub queues: QueueConfigurationSpec,
    pub mounting: MountConfig,
    pub frame_interval_ms: f64,
    /// Minimum frame time left over before idle callbacks are sent
    pub idle_callback_threshold_ms: f64,
    /// Tick the frame clock from a background thread. When off, the
    /// embedder steps it with `FrameClock::do_frame`.
    pub drive_frames: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            max_batch_size: 0,
            queues: QueueConfigurationSpec::default(),
            mounting: MountConfig::default(),
            frame_interval_ms: 1000.0 / 60.0,
            idle_callback_threshold_ms: 1.0,
            drive_frames: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct InstanceToml {
    dev_mode: Option<bool>,
    max_batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct QueuesToml {
    prefix: Option<String>,
    script_runtime: Option<String>,
    native_modules: Option<String>,
    ui: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingToml {
    frame_interval_ms: Option<f64>,
    idle_callback_threshold_ms: Option<f64>,
    drive_frames: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigToml {
    #[serde(default)]
    instance: InstanceToml,
    #[serde(default)]
    queues: QueuesToml,
    #[serde(default)]
    mounting: Option<MountConfig>,
    #[serde(default)]
    timing: TimingToml,
}

impl InstanceConfig {
    /// Parse TOML; absent keys keep their defaults
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let raw: ConfigToml = toml::from_str(content)?;
        let defaults = Self::default();

        let mut queues = QueueConfigurationSpec {
            script_runtime_name: raw
                .queues
                .script_runtime
                .unwrap_or(defaults.queues.script_runtime_name),
            native_modules_name: raw
                .queues
                .native_modules
                .unwrap_or(defaults.queues.native_modules_name),
            ui_name: raw.queues.ui.unwrap_or(defaults.queues.ui_name),
        };
        if let Some(prefix) = raw.queues.prefix.as_deref() {
            queues = queues.with_prefix(prefix);
        }

        let config = Self {
            dev_mode: raw.instance.dev_mode.unwrap_or(defaults.dev_mode),
            max_batch_size: raw.instance.max_batch_size.unwrap_or(defaults.max_batch_size),
            queues,
            mounting: raw.mounting.unwrap_or_default(),
            frame_interval_ms: raw
                .timing
                .frame_interval_ms
                .unwrap_or(defaults.frame_interval_ms),
            idle_callback_threshold_ms: raw
                .timing
                .idle_callback_threshold_ms
                .unwrap_or(defaults.idle_callback_threshold_ms),
            drive_frames: raw.timing.drive_frames.unwrap_or(defaults.drive_frames),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        let value = std::env::var(DEV_MODE_ENV).ok();
        self.apply_dev_mode_override(value.as_deref())
    }

    /// Apply a `WEFT_DEV_MODE` value, if one is set
    pub fn apply_dev_mode_override(&mut self, value: Option<&str>) -> ConfigResult<()> {
        let Some(value) = value else {
            return Ok(());
        };
        self.dev_mode = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "{DEV_MODE_ENV} must be a boolean, got '{other}'"
                )))
            }
        };
        log::debug!("{} overrides dev mode to {}", DEV_MODE_ENV, self.dev_mode);
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        if !(self.frame_interval_ms.is_finite() && self.frame_interval_ms > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "frame_interval_ms must be positive, got {}",
                self.frame_interval_ms
            )));
        }
        if self.idle_callback_threshold_ms < 0.0 {
            return Err(ConfigError::Invalid(
                "idle_callback_threshold_ms must not be negative".to_string(),
            ));
        }
        let names = [
            &self.queues.script_runtime_name,
            &self.queues.native_modules_name,
            &self.queues.ui_name,
        ];
        if names.iter().any(|n| n.is_empty()) {
            return Err(ConfigError::Invalid("queue names must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = InstanceConfig::from_toml_str("").unwrap();
        assert_eq!(config, InstanceConfig::default());
    }

    #[test]
    fn test_full_document() {
        let config = InstanceConfig::from_toml_str(
            r#"
            [instance]
            dev_mode = true
            max_batch_size = 8

            [queues]
            prefix = "app"
            ui = "main"

            [mounting]
            clamp_invalid_indices = true

            [timing]
            frame_interval_ms = 8.0
            drive_frames = false
            "#,
        )
        .unwrap();

        assert!(config.dev_mode);
        assert_eq!(config.max_batch_size, 8);
        assert_eq!(config.queues.ui_name, "app-main");
        assert_eq!(config.queues.script_runtime_name, "app-weft-js");
        assert!(config.mounting.clamp_invalid_indices);
        assert!(config.mounting.emit_layout_events);
        assert_eq!(config.frame_interval_ms, 8.0);
        assert!(!config.drive_frames);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            InstanceConfig::from_toml_str("[timing]\nframe_interval_ms = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            InstanceConfig::from_toml_str("[instance]\ndev_mode = \"maybe\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_dev_mode_override() {
        let mut config = InstanceConfig::default();
        config.apply_dev_mode_override(Some("1")).unwrap();
        assert!(config.dev_mode);
        config.apply_dev_mode_override(None).unwrap();
        assert!(config.dev_mode);
        config.apply_dev_mode_override(Some(" False ")).unwrap();
        assert!(!config.dev_mode);
        assert!(config.apply_dev_mode_override(Some("sometimes")).is_err());
    }
}
