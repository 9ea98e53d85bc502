//! Status records read from the chamber.
//!
//! Every record is a value snapshot produced by a single query. Nothing is
//! cached: reading again issues a new command.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Temperature status of the chamber. All values are in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureStatus {
    /// Measured temperature
    pub current_temperature: f64,
    /// Set point the chamber is driving towards
    pub target_temperature: f64,
    /// Upper temperature limit
    pub upper_limit: f64,
    /// Lower temperature limit
    pub lower_limit: f64,
}

impl TemperatureStatus {
    /// True when the measured temperature lies in `[target - accuracy, target + accuracy]`.
    pub fn within(&self, accuracy: f64) -> bool {
        in_band(self.current_temperature, self.target_temperature, accuracy)
    }
}

/// Humidity status of the chamber. All values are in %RH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumidityStatus {
    /// Measured humidity
    pub current_humidity: f64,
    /// Set point the chamber is driving towards
    pub target_humidity: f64,
    /// Upper humidity limit
    pub upper_limit: f64,
    /// Lower humidity limit
    pub lower_limit: f64,
}

impl HumidityStatus {
    /// True when the measured humidity lies in `[target - accuracy, target + accuracy]`.
    pub fn within(&self, accuracy: f64) -> bool {
        in_band(self.current_humidity, self.target_humidity, accuracy)
    }
}

fn in_band(current: f64, target: f64, accuracy: f64) -> bool {
    (target - accuracy) <= current && current <= (target + accuracy)
}

/// Output level of the heaters, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatersStatus {
    /// Output of the temperature heater
    pub temperature_heater: f64,
    /// Output of the humidity heater
    pub humidity_heater: f64,
}

/// Aggregate snapshot of the test area (`MON?`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestAreaState {
    /// Current temperature of the test area, in °C
    pub current_temperature: f64,
    /// Current humidity of the test area, in %RH
    pub current_humidity: f64,
    /// Operation mode the chamber reports
    pub operation_state: OperationMode,
    /// Number of alarms currently active
    pub number_of_alarms: u32,
}

/// Top-level run state of the chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationMode {
    /// The panel is powered off
    Off,
    /// Constant operation at the current set points
    Constant,
    /// All operations are stopped
    Standby,
    /// A program is running
    Run,
}

/// Wire names, in the order they are tried when parsing.
const MODE_NAMES: [(&str, OperationMode); 4] = [
    ("OFF", OperationMode::Off),
    ("CONSTANT", OperationMode::Constant),
    ("STANDBY", OperationMode::Standby),
    ("RUN", OperationMode::Run),
];

impl OperationMode {
    /// All modes, in wire-table order.
    pub const ALL: [OperationMode; 4] = [
        OperationMode::Off,
        OperationMode::Constant,
        OperationMode::Standby,
        OperationMode::Run,
    ];

    /// Canonical uppercase name sent to the instrument.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::Off => "OFF",
            OperationMode::Constant => "CONSTANT",
            OperationMode::Standby => "STANDBY",
            OperationMode::Run => "RUN",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a reply does not name a known operation mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModeError(pub String);

impl fmt::Display for UnknownModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation mode '{}'", self.0)
    }
}

impl std::error::Error for UnknownModeError {}

impl FromStr for OperationMode {
    type Err = UnknownModeError;

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        MODE_NAMES
            .iter()
            .find(|(wire, _)| wire.eq_ignore_ascii_case(name))
            .map(|(_, mode)| *mode)
            .ok_or_else(|| UnknownModeError(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_is_case_insensitive() {
        assert_eq!("constant".parse::<OperationMode>(), Ok(OperationMode::Constant));
        assert_eq!("Standby".parse::<OperationMode>(), Ok(OperationMode::Standby));
        assert_eq!(" RUN ".parse::<OperationMode>(), Ok(OperationMode::Run));
        assert_eq!("oFf".parse::<OperationMode>(), Ok(OperationMode::Off));
    }

    #[test]
    fn test_mode_parse_rejects_unknown() {
        let err = "PROGRAM".parse::<OperationMode>().unwrap_err();
        assert_eq!(err.to_string(), "unknown operation mode 'PROGRAM'");
        assert!("".parse::<OperationMode>().is_err());
    }

    #[test]
    fn test_mode_display_matches_wire_name() {
        for mode in OperationMode::ALL {
            assert_eq!(mode.to_string(), mode.as_str());
            assert_eq!(mode.to_string().parse::<OperationMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_band_is_inclusive() {
        let status = TemperatureStatus {
            current_temperature: 23.0,
            target_temperature: 23.5,
            upper_limit: 30.0,
            lower_limit: 10.0,
        };
        assert!(status.within(0.5));
        assert!(!status.within(0.4));

        let below = HumidityStatus {
            current_humidity: 49.0,
            target_humidity: 50.0,
            upper_limit: 60.0,
            lower_limit: 40.0,
        };
        assert!(below.within(1.0));
        let above = HumidityStatus {
            current_humidity: 51.5,
            ..below
        };
        assert!(!above.within(1.0));
    }

    #[test]
    fn test_mode_serializes_uppercase() {
        let json = serde_json::to_string(&OperationMode::Constant).unwrap();
        assert_eq!(json, "\"CONSTANT\"");
    }
}
