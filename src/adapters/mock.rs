//! Simulated climate chamber for testing
//!
//! [`SimulatedChamber`] speaks the chamber's line protocol in-process, so the
//! controller can be exercised without hardware. It provides:
//! - Linear ramps towards a new target, advancing one step per reading while
//!   the chamber is in CONSTANT mode
//! - Injected readings and oscillation around the target
//! - Failure injection (`respond_next`, `reject`)
//! - Command and reading logs for test verification
//!
//! Handles are cheap clones over shared state: a test keeps one while the
//! controller owns another.
//!
//! # Example
//!
//! ```
//! use climate_chamber::adapters::{Adapter, SimulatedChamber};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut sim = SimulatedChamber::new();
//! let reply = sim.query("MODE?", Duration::ZERO).await.unwrap();
//! assert_eq!(reply, "STANDBY");
//! # }
//! ```

use super::Adapter;
use crate::error::{ChamberError, ChamberResult};
use crate::instrument::protocol::{
    Axis, SetPoint, SettingField, HEATER_QUERY, HUMIDITY_QUERY, MODE_QUERY, MONITOR_QUERY,
    TEMPERATURE_QUERY,
};
use crate::instrument::status::OperationMode;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Reply to a command the chamber cannot or will not execute.
pub const NOT_READY_REPLY: &str = "NA:DATA NOT READY";

const DEFAULT_RAMP_STEPS: usize = 10;

/// One current value handed out by a `TEMP?` or `HUMI?` reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// When the reply was produced
    pub at: Instant,
    /// Which axis was read
    pub axis: Axis,
    /// Current value, as rendered in the reply
    pub current: f64,
    /// Target value, exactly as it was set
    pub target: f64,
}

/// Measured value at the sensor's 0.1 resolution, as the reply renders it.
fn as_reported(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

#[derive(Debug, Clone, Copy)]
struct Oscillation {
    amplitude: f64,
    above: bool,
}

#[derive(Debug)]
struct AxisModel {
    target: f64,
    upper: f64,
    lower: f64,
    /// Front is the current value; never empty.
    ramp: VecDeque<f64>,
    oscillation: Option<Oscillation>,
}

impl AxisModel {
    fn new(ambient: f64, upper: f64, lower: f64) -> Self {
        Self {
            target: ambient,
            upper,
            lower,
            ramp: VecDeque::from([ambient]),
            oscillation: None,
        }
    }

    fn peek(&self) -> f64 {
        self.ramp.front().copied().unwrap_or(self.target)
    }

    fn hold(&mut self, value: f64) {
        self.ramp = VecDeque::from([value]);
        self.oscillation = None;
    }

    fn ramp_to(&mut self, target: f64, steps: usize) {
        let start = self.peek();
        let step = (target - start) / steps as f64;
        let mut ramp: VecDeque<f64> = (0..steps).map(|i| start + step * i as f64).collect();
        ramp.push_back(target);
        self.target = target;
        self.ramp = ramp;
    }

    /// Current value as seen by one reading.
    fn read(&mut self, advancing: bool) -> f64 {
        if let Some(oscillation) = self.oscillation.as_mut() {
            let value = if oscillation.above {
                self.target + oscillation.amplitude
            } else {
                self.target - oscillation.amplitude
            };
            oscillation.above = !oscillation.above;
            return value;
        }

        if advancing && self.ramp.len() > 1 {
            if let Some(value) = self.ramp.pop_front() {
                return value;
            }
        }
        self.peek()
    }
}

#[derive(Debug)]
struct SimState {
    open: bool,
    mode: OperationMode,
    temperature: AxisModel,
    humidity: AxisModel,
    ramp_steps: usize,
    heaters: (f64, f64),
    alarms: u32,
    rejected: HashSet<SettingField>,
    scripted: VecDeque<String>,
    commands: Vec<String>,
    readings: Vec<Reading>,
}

impl SimState {
    fn axis(&mut self, axis: Axis) -> &mut AxisModel {
        match axis {
            Axis::Temperature => &mut self.temperature,
            Axis::Humidity => &mut self.humidity,
        }
    }

    fn read_axis(&mut self, axis: Axis) -> f64 {
        let advancing = self.mode == OperationMode::Constant;
        self.axis(axis).read(advancing)
    }

    fn status_reply(&mut self, axis: Axis) -> String {
        let current = self.read_axis(axis);
        let model = self.axis(axis);
        // Set points are echoed exactly as written; measurements are rounded.
        let reply = format!(
            "{:.1}, {:?}, {:?}, {:?}",
            current, model.target, model.upper, model.lower
        );
        let target = model.target;
        self.readings.push(Reading {
            at: Instant::now(),
            axis,
            current: as_reported(current),
            target,
        });
        reply
    }

    fn respond(&mut self, command: &str) -> String {
        match command {
            TEMPERATURE_QUERY => self.status_reply(Axis::Temperature),
            HUMIDITY_QUERY => self.status_reply(Axis::Humidity),
            MONITOR_QUERY => {
                let temperature = self.read_axis(Axis::Temperature);
                let humidity = self.read_axis(Axis::Humidity);
                format!("{:.1}, {:.1}, {}, {}", temperature, humidity, self.mode, self.alarms)
            }
            HEATER_QUERY => format!("0, {:.1}, {:.1}", self.heaters.0, self.heaters.1),
            MODE_QUERY => self.mode.to_string(),
            _ => self.apply_setting(command),
        }
    }

    fn apply_setting(&mut self, command: &str) -> String {
        let Some((keyword, argument)) = command.split_once(", ") else {
            return NOT_READY_REPLY.to_string();
        };

        if keyword == "MODE" {
            let mode = OperationMode::ALL.into_iter().find(|m| m.as_str() == argument);
            return match mode {
                Some(mode) if !self.rejected.contains(&SettingField::Mode) => {
                    self.mode = mode;
                    format!("OK: MODE, {}", mode)
                }
                _ => NOT_READY_REPLY.to_string(),
            };
        }

        let axis = match keyword {
            "TEMP" => Axis::Temperature,
            "HUMI" => Axis::Humidity,
            _ => return NOT_READY_REPLY.to_string(),
        };
        let mut chars = argument.chars();
        let Some(set_point) = chars.next().and_then(SetPoint::from_code) else {
            return NOT_READY_REPLY.to_string();
        };
        let raw = chars.as_str();
        let Ok(value) = raw.parse::<f64>() else {
            return NOT_READY_REPLY.to_string();
        };
        if self.rejected.contains(&SettingField::Axis(axis, set_point)) {
            return NOT_READY_REPLY.to_string();
        }

        let steps = self.ramp_steps;
        let model = self.axis(axis);
        match set_point {
            SetPoint::Target => model.ramp_to(value, steps),
            SetPoint::Upper => model.upper = value,
            SetPoint::Lower => model.lower = value,
        }
        format!("OK: {}, {}{}", keyword, set_point.code(), raw)
    }
}

/// In-process chamber speaking the line protocol.
#[derive(Clone)]
pub struct SimulatedChamber {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedChamber {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChamber {
    /// Create a chamber at 23.0 °C and 45.0 %, in STANDBY.
    pub fn new() -> Self {
        let state = SimState {
            open: true,
            mode: OperationMode::Standby,
            temperature: AxisModel::new(23.0, 100.0, -40.0),
            humidity: AxisModel::new(45.0, 98.0, 10.0),
            ramp_steps: DEFAULT_RAMP_STEPS,
            heaters: (0.0, 0.0),
            alarms: 0,
            rejected: HashSet::new(),
            scripted: VecDeque::new(),
            commands: Vec::new(),
            readings: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Number of readings a ramp to a new target takes.
    pub fn with_ramp_steps(self, steps: usize) -> Self {
        self.lock().ramp_steps = steps.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the measured temperature at `value`, cancelling any ramp.
    pub fn set_current_temperature(&self, value: f64) {
        self.lock().temperature.hold(value);
    }

    /// Hold the measured humidity at `value`, cancelling any ramp.
    pub fn set_current_humidity(&self, value: f64) {
        self.lock().humidity.hold(value);
    }

    /// Alternate the measured value of `axis` between target + amplitude and
    /// target - amplitude on every reading, until [`release`](Self::release).
    pub fn hold_oscillating(&self, axis: Axis, amplitude: f64) {
        self.lock().axis(axis).oscillation = Some(Oscillation {
            amplitude,
            above: true,
        });
    }

    /// Stop oscillating and settle `axis` on its target.
    pub fn release(&self, axis: Axis) {
        let mut state = self.lock();
        let model = state.axis(axis);
        let target = model.target;
        model.hold(target);
    }

    /// Answer the next command with `reply` instead of simulating it.
    pub fn respond_next(&self, reply: impl Into<String>) {
        self.lock().scripted.push_back(reply.into());
    }

    /// Refuse every write to `field` with [`NOT_READY_REPLY`].
    pub fn reject(&self, field: SettingField) {
        self.lock().rejected.insert(field);
    }

    /// Accept writes to `field` again.
    pub fn accept(&self, field: SettingField) {
        self.lock().rejected.remove(&field);
    }

    /// Set the heater outputs reported by `%?`.
    pub fn set_heaters(&self, temperature_heater: f64, humidity_heater: f64) {
        self.lock().heaters = (temperature_heater, humidity_heater);
    }

    /// Set the alarm count reported by `MON?`.
    pub fn set_alarms(&self, alarms: u32) {
        self.lock().alarms = alarms;
    }

    /// Current operation mode.
    pub fn mode(&self) -> OperationMode {
        self.lock().mode
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Clear the command and reading logs.
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.commands.clear();
        state.readings.clear();
    }

    /// Every temperature/humidity reading handed out so far, in order.
    pub fn readings(&self) -> Vec<Reading> {
        self.lock().readings.clone()
    }
}

#[async_trait]
impl Adapter for SimulatedChamber {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    async fn query(&mut self, command: &str, delay: Duration) -> ChamberResult<String> {
        let reply = {
            let mut state = self.lock();
            if !state.open {
                return Err(ChamberError::NotConnected);
            }
            let command = command.trim();
            state.commands.push(command.to_string());
            match state.scripted.pop_front() {
                Some(reply) => reply,
                None => state.respond(command),
            }
        };
        trace!("Simulated '{}' -> '{}'", command, reply);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(reply)
    }

    async fn close(&mut self) -> ChamberResult<()> {
        self.lock().open = false;
        Ok(())
    }
}
