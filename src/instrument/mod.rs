//! Chamber controller, protocol and stability wait.

pub mod climate_chamber;
pub mod protocol;
pub mod stability;
pub mod status;

pub use climate_chamber::{ChamberSettings, ClimateChamber};
pub use protocol::{Axis, SetPoint, SettingField};
pub use stability::{
    stop_channel, StabilityReport, StabilityState, StabilityTracker, StopHandle, StopSignal, WaitOptions,
};
pub use status::{HeatersStatus, HumidityStatus, OperationMode, TemperatureStatus, TestAreaState};
