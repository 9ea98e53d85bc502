//! Climate chamber controller.
//!
//! [`ClimateChamber`] owns one [`Adapter`] and exposes the chamber's status
//! queries, setters and the constant-condition wait. Every operation borrows
//! the chamber mutably, so one command is outstanding at a time.
//!
//! ```no_run
//! use climate_chamber::{ChamberIdentity, ChamberSettings, ClimateChamber, WaitOptions};
//!
//! # async fn run() -> climate_chamber::ChamberResult<()> {
//! let identity = ChamberIdentity::from_parts(Some("192.168.1.10"), None)?;
//! let mut chamber = ClimateChamber::open(identity, ChamberSettings::default()).await?;
//! chamber.set_temperature_limits(25.0, 20.0).await?;
//! let report = chamber
//!     .set_constant_condition(23.2, 50.0, WaitOptions::default())
//!     .await?;
//! println!("stable after {:?}", report.elapsed);
//! chamber.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::adapters::{self, Adapter, ChamberIdentity};
use crate::config::ChamberConfig;
use crate::error::{ChamberError, ChamberResult};
use crate::instrument::protocol::{self, Axis, SetPoint, SettingField};
use crate::instrument::stability::{StabilityReport, StabilityState, StabilityTracker, WaitOptions};
use crate::instrument::status::{
    HeatersStatus, HumidityStatus, OperationMode, TemperatureStatus, TestAreaState,
};
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Link and stability parameters of a chamber connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChamberSettings {
    /// Bound on connection setup and on every reply
    pub timeout: Duration,
    /// Settling time between a monitor command and its reply
    pub monitor_delay: Duration,
    /// Settling time between a setting command and its acknowledgement
    pub setting_delay: Duration,
    /// Half-width of the temperature stability band, in °C
    pub temperature_accuracy: f64,
    /// Half-width of the humidity stability band, in %RH
    pub humidity_accuracy: f64,
}

impl Default for ChamberSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            monitor_delay: Duration::from_millis(200),
            setting_delay: Duration::from_millis(500),
            temperature_accuracy: 0.2,
            humidity_accuracy: 1.0,
        }
    }
}

/// Driver for a temperature/humidity test chamber.
pub struct ClimateChamber<A: Adapter = Box<dyn Adapter>> {
    adapter: A,
    settings: ChamberSettings,
    resource: String,
    closed: bool,
}

impl ClimateChamber {
    /// Resolve `identity`, open the matching link and return the controller.
    pub async fn open(identity: ChamberIdentity, settings: ChamberSettings) -> ChamberResult<Self> {
        let resource = identity.resource_string();
        let address = identity.address()?;
        let adapter = adapters::open(&address, settings.timeout).await?;
        info!("Opened climate chamber at {}", resource);
        Ok(Self {
            adapter,
            settings,
            resource,
            closed: false,
        })
    }

    /// Open the chamber described by a loaded configuration.
    pub async fn connect(config: &ChamberConfig) -> ChamberResult<Self> {
        config.validate()?;
        Self::open(config.identity()?, config.settings()).await
    }
}

impl<A: Adapter> ClimateChamber<A> {
    /// Drive the chamber over an already open adapter.
    pub fn with_adapter(adapter: A, settings: ChamberSettings) -> Self {
        let resource = adapter.name().to_string();
        Self {
            adapter,
            settings,
            resource,
            closed: false,
        }
    }

    /// Connection settings in use.
    pub fn settings(&self) -> &ChamberSettings {
        &self.settings
    }

    /// Resource this chamber was opened on.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Whether `close` has not been called yet and the link is up.
    pub fn is_open(&self) -> bool {
        !self.closed && self.adapter.is_open()
    }

    async fn query(&mut self, command: &str, delay: Duration) -> ChamberResult<String> {
        if self.closed {
            return Err(ChamberError::NotConnected);
        }
        let reply = self.adapter.query(command, delay).await?;
        debug!(command, reply = reply.as_str(), "chamber exchange");
        Ok(reply)
    }

    async fn monitor(&mut self, command: &str) -> ChamberResult<String> {
        let delay = self.settings.monitor_delay;
        self.query(command, delay).await
    }

    async fn write_setting(&mut self, field: SettingField, command: &str) -> ChamberResult<String> {
        let delay = self.settings.setting_delay;
        let reply = self.query(command, delay).await?;
        if !protocol::is_acknowledged(field, &reply) {
            error!("Failed to set the {} with '{}': reply '{}'", field, command, reply);
            return Err(ChamberError::Setting { field, reply });
        }
        Ok(reply)
    }

    async fn set_point(&mut self, axis: Axis, set_point: SetPoint, value: f64) -> ChamberResult<()> {
        let command = protocol::setting_command(axis, set_point, value);
        self.write_setting(SettingField::Axis(axis, set_point), &command)
            .await
            .map(|_| ())
    }

    /// Read current, target and limits of the temperature (`TEMP?`).
    pub async fn get_temperature_status(&mut self) -> ChamberResult<TemperatureStatus> {
        let reply = self.monitor(protocol::TEMPERATURE_QUERY).await?;
        protocol::parse_temperature_status(&reply)
    }

    /// Read current, target and limits of the humidity (`HUMI?`).
    pub async fn get_humidity_status(&mut self) -> ChamberResult<HumidityStatus> {
        let reply = self.monitor(protocol::HUMIDITY_QUERY).await?;
        protocol::parse_humidity_status(&reply)
    }

    /// Read the test area snapshot (`MON?`).
    pub async fn get_test_area_state(&mut self) -> ChamberResult<TestAreaState> {
        let reply = self.monitor(protocol::MONITOR_QUERY).await?;
        protocol::parse_test_area_state(&reply)
    }

    /// Read the heater outputs (`%?`).
    pub async fn get_heater_percentage(&mut self) -> ChamberResult<HeatersStatus> {
        let reply = self.monitor(protocol::HEATER_QUERY).await?;
        protocol::parse_heaters_status(&reply)
    }

    /// Read the operation mode (`MODE?`).
    pub async fn get_mode(&mut self) -> ChamberResult<OperationMode> {
        let reply = self.monitor(protocol::MODE_QUERY).await?;
        protocol::parse_mode(&reply)
    }

    /// Set the target temperature, in °C.
    pub async fn set_target_temperature(&mut self, temperature: f64) -> ChamberResult<()> {
        self.set_point(Axis::Temperature, SetPoint::Target, temperature).await
    }

    /// Set the target humidity, in %RH.
    pub async fn set_target_humidity(&mut self, humidity: f64) -> ChamberResult<()> {
        self.set_point(Axis::Humidity, SetPoint::Target, humidity).await
    }

    /// Set the temperature limits. The upper limit is written and acknowledged
    /// before the lower limit is sent.
    pub async fn set_temperature_limits(&mut self, upper: f64, lower: f64) -> ChamberResult<()> {
        self.set_point(Axis::Temperature, SetPoint::Upper, upper).await?;
        self.set_point(Axis::Temperature, SetPoint::Lower, lower).await
    }

    /// Set the humidity limits, upper first.
    pub async fn set_humidity_limits(&mut self, upper: f64, lower: f64) -> ChamberResult<()> {
        self.set_point(Axis::Humidity, SetPoint::Upper, upper).await?;
        self.set_point(Axis::Humidity, SetPoint::Lower, lower).await
    }

    /// Switch the operation mode. Returns the acknowledgement.
    pub async fn set_mode(&mut self, mode: OperationMode) -> ChamberResult<String> {
        let reply = self
            .write_setting(SettingField::Mode, &protocol::mode_command(mode))
            .await?;
        info!("Chamber mode set to {}", mode);
        Ok(reply)
    }

    /// Set both targets, switch to CONSTANT and wait until the readings have
    /// stayed in band for `options.stable_time`.
    ///
    /// Any setting failure aborts before the wait starts.
    pub async fn set_constant_condition(
        &mut self,
        temperature: f64,
        humidity: f64,
        options: WaitOptions,
    ) -> ChamberResult<StabilityReport> {
        self.set_target_temperature(temperature).await?;
        self.set_target_humidity(humidity).await?;
        self.set_mode(OperationMode::Constant).await?;
        self.wait_until_stable(options).await
    }

    /// Poll both axes until they have been in band for `options.stable_time`.
    ///
    /// Each tick checks the stop signal, reads `TEMP?` then `HUMI?`, and
    /// sleeps `poll_interval` unless stability was reached. Any excursion
    /// restarts the timer. Read failures abort the wait.
    pub async fn wait_until_stable(&mut self, options: WaitOptions) -> ChamberResult<StabilityReport> {
        let WaitOptions {
            stable_time,
            poll_interval,
            max_wait,
            mut stop,
        } = options;
        let temperature_accuracy = self.settings.temperature_accuracy;
        let humidity_accuracy = self.settings.humidity_accuracy;

        let mut tracker = StabilityTracker::new(stable_time);
        let started = Instant::now();
        let mut polls: u32 = 0;
        let mut in_band_before = false;

        info!(
            "Waiting for stability: {:?} within ±{} °C / ±{} %",
            stable_time, temperature_accuracy, humidity_accuracy
        );

        loop {
            if stop.is_stopped() {
                info!("Stability wait cancelled after {} polls", polls);
                return Err(ChamberError::Cancelled);
            }

            let temperature = self.get_temperature_status().await?;
            let humidity = self.get_humidity_status().await?;
            polls += 1;

            let now = Instant::now();
            let in_band = temperature.within(temperature_accuracy) && humidity.within(humidity_accuracy);
            debug!(
                temperature = temperature.current_temperature,
                target_temperature = temperature.target_temperature,
                humidity = humidity.current_humidity,
                target_humidity = humidity.target_humidity,
                in_band,
                "stability poll"
            );

            match tracker.observe(in_band, now) {
                StabilityState::Stable => {
                    let elapsed = now.saturating_duration_since(started);
                    info!("Chamber stable after {:?} ({} polls)", elapsed, polls);
                    return Ok(StabilityReport {
                        polls,
                        elapsed,
                        temperature,
                        humidity,
                        completed_at: Utc::now(),
                    });
                }
                StabilityState::Stabilizing { remaining } if !in_band_before => {
                    info!("Set points reached, holding for {:?}", remaining);
                }
                StabilityState::Unstable if in_band_before => {
                    info!(
                        "Left stability band (temperature {} °C, humidity {} %), timer reset",
                        temperature.current_temperature, humidity.current_humidity
                    );
                }
                _ => {}
            }
            in_band_before = in_band;

            if let Some(max_wait) = max_wait {
                let waited = now.saturating_duration_since(started);
                if waited >= max_wait {
                    warn!("Chamber not stable after {:?}", waited);
                    return Err(ChamberError::StabilityTimeout {
                        waited,
                        temperature,
                        humidity,
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = stop.stopped() => {
                    info!("Stability wait cancelled after {} polls", polls);
                    return Err(ChamberError::Cancelled);
                }
            }
        }
    }

    /// Release the link. Further calls do nothing.
    pub async fn close(&mut self) -> ChamberResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.adapter.close().await?;
        info!("Closed climate chamber at {}", self.resource);
        Ok(())
    }
}

impl<A: Adapter> Drop for ClimateChamber<A> {
    fn drop(&mut self) {
        if !self.closed && self.adapter.is_open() {
            warn!("Climate chamber at {} dropped without close()", self.resource);
        }
    }
}
