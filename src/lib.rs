//! Driver for temperature/humidity test chambers.
//!
//! The chamber speaks a line-oriented, SCPI-like protocol over TCP (port
//! 57732) or a serial link. [`ClimateChamber`] wraps one connection and
//! offers:
//!
//! - status queries (`TEMP?`, `HUMI?`, `MON?`, `%?`, `MODE?`) parsed into
//!   typed records
//! - setters for targets, limits and the operation mode, each validated
//!   against the instrument's acknowledgement
//! - [`set_constant_condition`](ClimateChamber::set_constant_condition), which
//!   drives the chamber to a temperature/humidity pair and waits until both
//!   have stayed in band for a required time
//!
//! The link is abstracted by the [`Adapter`](adapters::Adapter) trait;
//! [`SimulatedChamber`](adapters::SimulatedChamber) implements it in-process
//! for tests.

pub mod adapters;
pub mod config;
pub mod error;
pub mod instrument;
pub mod telemetry;

pub use adapters::{Adapter, ChamberIdentity, ResourceAddress, SimulatedChamber};
pub use config::ChamberConfig;
pub use error::{ChamberError, ChamberResult};
pub use instrument::{
    stop_channel, Axis, ChamberSettings, ClimateChamber, HeatersStatus, HumidityStatus, OperationMode,
    SetPoint, SettingField, StabilityReport, StopHandle, StopSignal, TemperatureStatus, TestAreaState,
    WaitOptions,
};
