//! Chamber configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/chamber.toml` (or any file passed to [`ChamberConfig::load_from`])
//! 2. Environment variables prefixed with `CHAMBER_`, with `__` between
//!    nesting levels
//!
//! Every key is optional except the chamber address; missing keys take the
//! protocol defaults.
//!
//! ```toml
//! [connection]
//! ip_address = "192.168.1.10"
//! timeout = "5s"
//! monitor_delay = "200ms"
//! setting_delay = "500ms"
//!
//! [stability]
//! temperature_accuracy = 0.2
//! humidity_accuracy = 1.0
//! stable_time = "1m"
//! poll_interval = "1s"
//! max_wait = "2h"
//! ```
//!
//! # Environment Variable Overrides
//!
//! ```text
//! CHAMBER_CONNECTION__IP_ADDRESS=10.0.0.7
//! CHAMBER_STABILITY__STABLE_TIME=5m
//! ```

use crate::adapters::ChamberIdentity;
use crate::error::{ChamberError, ChamberResult};
use crate::instrument::{ChamberSettings, WaitOptions};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/chamber.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "CHAMBER_";

/// Top-level chamber configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChamberConfig {
    /// How to reach the chamber
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Stability wait parameters
    #[serde(default)]
    pub stability: StabilityConfig,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Chamber host; the fixed chamber port is implied
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Pre-formed resource string, exclusive with `ip_address`
    #[serde(default)]
    pub resource: Option<String>,
    /// Connection and reply timeout
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Delay between a monitor command and its reply
    #[serde(with = "humantime_serde", default = "default_monitor_delay")]
    pub monitor_delay: Duration,
    /// Delay between a setting command and its acknowledgement
    #[serde(with = "humantime_serde", default = "default_setting_delay")]
    pub setting_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ip_address: None,
            resource: None,
            timeout: default_timeout(),
            monitor_delay: default_monitor_delay(),
            setting_delay: default_setting_delay(),
        }
    }
}

/// Stability wait configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Temperature band half-width, °C
    #[serde(default = "default_temperature_accuracy")]
    pub temperature_accuracy: f64,
    /// Humidity band half-width, %RH
    #[serde(default = "default_humidity_accuracy")]
    pub humidity_accuracy: f64,
    /// Uninterrupted in-band time required
    #[serde(with = "humantime_serde", default = "default_stable_time")]
    pub stable_time: Duration,
    /// Sleep between polls
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Upper bound on the whole wait; unbounded when absent
    #[serde(with = "humantime_serde", default)]
    pub max_wait: Option<Duration>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            temperature_accuracy: default_temperature_accuracy(),
            humidity_accuracy: default_humidity_accuracy(),
            stable_time: default_stable_time(),
            poll_interval: default_poll_interval(),
            max_wait: None,
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_monitor_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_setting_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_temperature_accuracy() -> f64 {
    0.2
}

fn default_humidity_accuracy() -> f64 {
    1.0
}

fn default_stable_time() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

impl ChamberConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> ChamberResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` and the environment, then validate.
    ///
    /// Environment variables take precedence over the file. A missing file is
    /// not an error; the defaults and the environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ChamberResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot be used.
    ///
    /// Checks:
    /// - Exactly one of `ip_address` and `resource` is set
    /// - Accuracies are finite and not negative
    /// - Timeout and poll interval are not zero
    pub fn validate(&self) -> ChamberResult<()> {
        self.identity()?;

        for (name, value) in [
            ("temperature_accuracy", self.stability.temperature_accuracy),
            ("humidity_accuracy", self.stability.humidity_accuracy),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ChamberError::ConfigValidation(format!(
                    "Invalid {} {}. Must be a finite, non-negative number",
                    name, value
                )));
            }
        }

        if self.connection.timeout.is_zero() {
            return Err(ChamberError::ConfigValidation(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.stability.poll_interval.is_zero() {
            return Err(ChamberError::ConfigValidation(
                "poll_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Addressing mode selected by the connection section.
    pub fn identity(&self) -> ChamberResult<ChamberIdentity> {
        ChamberIdentity::from_parts(
            self.connection.ip_address.as_deref(),
            self.connection.resource.as_deref(),
        )
    }

    /// Controller settings derived from this configuration.
    pub fn settings(&self) -> ChamberSettings {
        ChamberSettings {
            timeout: self.connection.timeout,
            monitor_delay: self.connection.monitor_delay,
            setting_delay: self.connection.setting_delay,
            temperature_accuracy: self.stability.temperature_accuracy,
            humidity_accuracy: self.stability.humidity_accuracy,
        }
    }

    /// Wait options derived from this configuration, with no stop signal.
    pub fn wait_options(&self) -> WaitOptions {
        let options = WaitOptions::default()
            .with_stable_time(self.stability.stable_time)
            .with_poll_interval(self.stability.poll_interval);
        match self.stability.max_wait {
            Some(max_wait) => options.with_max_wait(max_wait),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_load_with_defaults() {
        let file = write_config(
            r#"
            [connection]
            ip_address = "192.168.1.10"
            "#,
        );

        let config = ChamberConfig::load_from(file.path()).unwrap();
        assert_eq!(config.settings(), ChamberSettings::default());
        assert_eq!(
            config.identity().unwrap(),
            ChamberIdentity::IpAddress("192.168.1.10".to_string())
        );

        let options = config.wait_options();
        assert_eq!(options.stable_time, Duration::from_secs(60));
        assert_eq!(options.poll_interval, Duration::from_secs(1));
        assert_eq!(options.max_wait, None);
    }

    #[test]
    #[serial]
    fn test_load_humantime_values() {
        let file = write_config(
            r#"
            [connection]
            resource = "tcp::chamber.lab:4001"
            timeout = "2s"
            monitor_delay = "50ms"

            [stability]
            humidity_accuracy = 2.5
            stable_time = "5m"
            max_wait = "1h 30m"
            "#,
        );

        let config = ChamberConfig::load_from(file.path()).unwrap();
        assert_eq!(config.connection.timeout, Duration::from_secs(2));
        assert_eq!(config.connection.monitor_delay, Duration::from_millis(50));
        assert_eq!(config.connection.setting_delay, Duration::from_millis(500));
        assert_eq!(config.stability.humidity_accuracy, 2.5);
        assert_eq!(config.wait_options().stable_time, Duration::from_secs(300));
        assert_eq!(config.wait_options().max_wait, Some(Duration::from_secs(5400)));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config(
            r#"
            [connection]
            ip_address = "192.168.1.10"

            [stability]
            stable_time = "1m"
            "#,
        );

        std::env::set_var("CHAMBER_CONNECTION__IP_ADDRESS", "10.0.0.7");
        std::env::set_var("CHAMBER_STABILITY__STABLE_TIME", "10s");
        let result = ChamberConfig::load_from(file.path());
        std::env::remove_var("CHAMBER_CONNECTION__IP_ADDRESS");
        std::env::remove_var("CHAMBER_STABILITY__STABLE_TIME");

        let config = result.unwrap();
        assert_eq!(config.connection.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(config.stability.stable_time, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_rejects_addressing_conflict() {
        let file = write_config(
            r#"
            [connection]
            ip_address = "192.168.1.10"
            resource = "TCPIP0::192.168.1.10::57732::SOCKET"
            "#,
        );

        assert!(matches!(
            ChamberConfig::load_from(file.path()),
            Err(ChamberError::AddressingConflict)
        ));
    }

    #[test]
    fn test_rejects_invalid_accuracy() {
        let mut config = ChamberConfig::default();
        config.connection.ip_address = Some("10.0.0.1".to_string());
        assert!(config.validate().is_ok());

        config.stability.temperature_accuracy = -0.1;
        assert!(matches!(config.validate(), Err(ChamberError::ConfigValidation(_))));

        config.stability.temperature_accuracy = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let mut config = ChamberConfig::default();
        config.connection.ip_address = Some("10.0.0.1".to_string());
        config.stability.poll_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ChamberError::ConfigValidation(_))));
    }

    #[test]
    fn test_missing_address() {
        assert!(matches!(
            ChamberConfig::default().validate(),
            Err(ChamberError::MissingAddress)
        ));
    }

    #[test]
    #[serial]
    fn test_malformed_duration_is_config_error() {
        let file = write_config(
            r#"
            [connection]
            ip_address = "192.168.1.10"
            timeout = "soon"
            "#,
        );

        assert!(matches!(
            ChamberConfig::load_from(file.path()),
            Err(ChamberError::Config(_))
        ));
    }
}
