//! Firmware configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional config
//! file, then `VIGIL_*` environment variables (`VIGIL_ARENA_BYTES`,
//! `VIGIL_ALERTS__HR_LOW`, `VIGIL_INPUT=1.0,1.1,0.9`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::alert::{DeviceInfo, HeartRateMonitor};
use crate::channel::DEFAULT_BAUD_RATE;
use crate::error::ConfigError;
use crate::init::{InitOptions, ResolverProfile, DEFAULT_ARENA_BYTES};
use crate::input::{Frame, DEFAULT_FRAME, FRAME_LEN};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Scratch arena size in bytes.
    pub arena_bytes: usize,
    /// Cycle period, start to start.
    pub interval_ms: u64,
    pub baud_rate: u32,
    /// Fixed input frame used when no live feed is attached.
    pub input: Vec<f32>,
    /// Model blob on disk. The built-in helmet model is used when unset.
    pub model_path: Option<PathBuf>,
    /// Stop after this many cycles. Runs forever when unset.
    pub max_cycles: Option<u64>,
    pub resolver: ResolverProfile,
    pub device: DeviceInfo,
    pub alerts: AlertSettings,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            arena_bytes: DEFAULT_ARENA_BYTES,
            interval_ms: 1000,
            baud_rate: DEFAULT_BAUD_RATE,
            input: DEFAULT_FRAME.to_vec(),
            model_path: None,
            max_cycles: None,
            resolver: ResolverProfile::Minimal,
            device: DeviceInfo::default(),
            alerts: AlertSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub hr_low: f32,
    pub hr_high: f32,
    /// Consecutive failed invocations before a module-failure alert.
    /// Zero disables the alert.
    pub failure_alert_after: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            hr_low: 40.0,
            hr_high: 150.0,
            failure_alert_after: 3,
        }
    }
}

impl FirmwareConfig {
    /// Load from defaults, `file` (if given) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(file, Environment::with_prefix("VIGIL"))
    }

    fn load_with_env(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            env.prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("input"),
        );

        let config: FirmwareConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_bytes == 0 {
            return Err(invalid("arena_bytes", "must be positive"));
        }
        if self.interval_ms == 0 {
            return Err(invalid("interval_ms", "must be positive"));
        }
        if self.alerts.hr_low >= self.alerts.hr_high {
            return Err(invalid("alerts.hr_low", "must be below alerts.hr_high"));
        }
        self.frame()?;
        Ok(())
    }

    /// The configured input as a sensor frame.
    pub fn frame(&self) -> Result<Frame, ConfigError> {
        let frame: Frame = self.input.as_slice().try_into().map_err(|_| ConfigError::Invalid {
            field: "input",
            reason: format!("expected {} values, found {}", FRAME_LEN, self.input.len()),
        })?;
        if frame.iter().any(|v| !v.is_finite()) {
            return Err(invalid("input", "values must be finite"));
        }
        Ok(frame)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            arena_bytes: self.arena_bytes,
            resolver: self.resolver,
        }
    }

    pub fn heart_rate_monitor(&self) -> HeartRateMonitor {
        HeartRateMonitor::new(self.alerts.hr_low, self.alerts.hr_high)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Environment::with_prefix("VIGIL").source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = FirmwareConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, FirmwareConfig::default());
        assert_eq!(config.arena_bytes, 2048);
        assert_eq!(config.interval(), Duration::from_millis(1000));
        assert_eq!(config.frame().unwrap(), [1.0, 1.1, 0.9]);
        assert_eq!(config.alerts.failure_alert_after, 3);
    }

    #[test]
    fn test_env_overrides() {
        let config = FirmwareConfig::load_with_env(
            None,
            env(&[
                ("VIGIL_ARENA_BYTES", "4096"),
                ("VIGIL_RESOLVER", "all"),
                ("VIGIL_ALERTS__HR_HIGH", "170"),
                ("VIGIL_DEVICE__USER_ID", "rider-1"),
                ("VIGIL_INPUT", "0.5,0.25,2"),
            ]),
        )
        .unwrap();
        assert_eq!(config.arena_bytes, 4096);
        assert_eq!(config.resolver, ResolverProfile::All);
        assert_eq!(config.alerts.hr_high, 170.0);
        assert_eq!(config.alerts.hr_low, 40.0);
        assert_eq!(config.device.user_id, "rider-1");
        assert_eq!(config.frame().unwrap(), [0.5, 0.25, 2.0]);
    }

    #[test]
    fn test_file_then_env() {
        let path = std::env::temp_dir().join(format!("vigil-config-{}.toml", std::process::id()));
        std::fs::write(&path, "interval_ms = 250\nbaud_rate = 9600\n[alerts]\nfailure_alert_after = 5\n").unwrap();

        let config =
            FirmwareConfig::load_with_env(Some(&path), env(&[("VIGIL_BAUD_RATE", "57600")])).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.alerts.failure_alert_after, 5);
    }

    #[test]
    fn test_validation() {
        let mut config = FirmwareConfig::default();
        config.input = vec![1.0, 2.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "input", .. })));

        let mut config = FirmwareConfig::default();
        config.alerts.hr_low = 200.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "alerts.hr_low", .. })
        ));

        let mut config = FirmwareConfig::default();
        config.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = FirmwareConfig::load_with_env(Some(Path::new("/nonexistent/vigil.toml")), env(&[]));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
