//! Command strings, acknowledgement table and reply parsers for the chamber
//! protocol.
//!
//! The protocol is line oriented. Monitor commands end with `?` and return a
//! comma separated data line; setting commands have the form
//! `<AXIS>, <SUBCOMMAND><value>` and are answered with `OK: <echo>` or an
//! `NA:` refusal.
//!
//! | Command          | Reply                                |
//! |------------------|--------------------------------------|
//! | `TEMP?`          | `cur, target, upper, lower`          |
//! | `HUMI?`          | `cur, target, upper, lower`          |
//! | `MON?`           | `temp, humidity, mode, alarm_count`  |
//! | `%?`             | `_, temp_heater, humidity_heater`    |
//! | `MODE?`          | mode name                            |
//! | `TEMP, S23.2`    | `OK: TEMP, S23.2`                    |
//! | `MODE, CONSTANT` | `OK: MODE, CONSTANT`                 |

use crate::error::{ChamberError, ChamberResult};
use crate::instrument::status::{
    HeatersStatus, HumidityStatus, OperationMode, TemperatureStatus, TestAreaState,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Temperature status query
pub const TEMPERATURE_QUERY: &str = "TEMP?";
/// Humidity status query
pub const HUMIDITY_QUERY: &str = "HUMI?";
/// Test area monitor query
pub const MONITOR_QUERY: &str = "MON?";
/// Heater output query
pub const HEATER_QUERY: &str = "%?";
/// Operation mode query
pub const MODE_QUERY: &str = "MODE?";

/// Controlled quantity of the chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Dry-bulb temperature
    Temperature,
    /// Relative humidity
    Humidity,
}

impl Axis {
    /// Command keyword for this axis.
    pub fn keyword(&self) -> &'static str {
        match self {
            Axis::Temperature => "TEMP",
            Axis::Humidity => "HUMI",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            Axis::Temperature => "temperature",
            Axis::Humidity => "humidity",
        }
    }
}

/// Which set point of an axis a setting command writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetPoint {
    /// Target value (`S`)
    Target,
    /// Upper limit (`H`)
    Upper,
    /// Lower limit (`L`)
    Lower,
}

impl SetPoint {
    /// Subcommand letter.
    pub fn code(&self) -> char {
        match self {
            SetPoint::Target => 'S',
            SetPoint::Upper => 'H',
            SetPoint::Lower => 'L',
        }
    }

    /// Parse a subcommand letter.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'S' => Some(SetPoint::Target),
            'H' => Some(SetPoint::Upper),
            'L' => Some(SetPoint::Lower),
            _ => None,
        }
    }
}

/// A single writable field of the chamber.
///
/// Setting failures are reported per field so that, for example, a refused
/// upper limit can be told apart from a refused lower limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingField {
    /// One set point of one axis
    Axis(Axis, SetPoint),
    /// The operation mode
    Mode,
}

impl SettingField {
    /// Every writable field, in acknowledgement-table order.
    pub const ALL: [SettingField; 7] = [
        SettingField::Axis(Axis::Temperature, SetPoint::Target),
        SettingField::Axis(Axis::Temperature, SetPoint::Upper),
        SettingField::Axis(Axis::Temperature, SetPoint::Lower),
        SettingField::Axis(Axis::Humidity, SetPoint::Target),
        SettingField::Axis(Axis::Humidity, SetPoint::Upper),
        SettingField::Axis(Axis::Humidity, SetPoint::Lower),
        SettingField::Mode,
    ];

    fn ack_pattern(&self) -> String {
        match self {
            SettingField::Axis(axis, set_point) => {
                format!(r"^OK: {}, {}-?\d+", axis.keyword(), set_point.code())
            }
            SettingField::Mode => r"^OK: MODE, \w+".to_string(),
        }
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingField::Axis(axis, SetPoint::Target) => write!(f, "target {}", axis.noun()),
            SettingField::Axis(axis, SetPoint::Upper) => write!(f, "upper {} limit", axis.noun()),
            SettingField::Axis(axis, SetPoint::Lower) => write!(f, "lower {} limit", axis.noun()),
            SettingField::Mode => f.write_str("operation mode"),
        }
    }
}

#[allow(clippy::expect_used)]
static ACK_TABLE: Lazy<Vec<(SettingField, Regex)>> = Lazy::new(|| {
    SettingField::ALL
        .iter()
        .map(|field| {
            let pattern = Regex::new(&field.ack_pattern())
                .expect("acknowledgement patterns are valid regular expressions");
            (*field, pattern)
        })
        .collect()
});

/// Check a reply against the acknowledgement expected for `field`.
pub fn is_acknowledged(field: SettingField, reply: &str) -> bool {
    ACK_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == field)
        .is_some_and(|(_, pattern)| pattern.is_match(reply.trim()))
}

/// Build `<AXIS>, <SUBCOMMAND><value>`.
///
/// The value is written in its shortest exact form (`25.0`, `23.25`), so the
/// chamber stores precisely what the caller asked for.
pub fn setting_command(axis: Axis, set_point: SetPoint, value: f64) -> String {
    format!("{}, {}{:?}", axis.keyword(), set_point.code(), value)
}

/// Build `MODE, <NAME>`.
pub fn mode_command(mode: OperationMode) -> String {
    format!("MODE, {}", mode)
}

fn split_fields<'a>(command: &str, reply: &'a str, expected: usize) -> ChamberResult<Vec<&'a str>> {
    let fields: Vec<&str> = reply.split(',').map(str::trim).collect();
    if fields.len() != expected {
        return Err(ChamberError::parse(
            command,
            reply,
            format!("expected {} fields, got {}", expected, fields.len()),
        ));
    }
    Ok(fields)
}

fn parse_decimal(command: &str, reply: &str, field: &str, name: &str) -> ChamberResult<f64> {
    let value: f64 = field
        .parse()
        .map_err(|_| ChamberError::parse(command, reply, format!("{} '{}' is not a number", name, field)))?;
    if !value.is_finite() {
        return Err(ChamberError::parse(
            command,
            reply,
            format!("{} '{}' is not a finite number", name, field),
        ));
    }
    Ok(value)
}

fn parse_field<T: FromStr>(command: &str, reply: &str, field: &str, name: &str) -> ChamberResult<T> {
    field
        .parse()
        .map_err(|_| ChamberError::parse(command, reply, format!("invalid {} '{}'", name, field)))
}

/// Parse the four positional fields of a `TEMP?`/`HUMI?` reply.
fn parse_axis_fields(command: &str, reply: &str) -> ChamberResult<[f64; 4]> {
    let fields = split_fields(command, reply, 4)?;
    Ok([
        parse_decimal(command, reply, fields[0], "current value")?,
        parse_decimal(command, reply, fields[1], "target")?,
        parse_decimal(command, reply, fields[2], "upper limit")?,
        parse_decimal(command, reply, fields[3], "lower limit")?,
    ])
}

/// Parse a `TEMP?` reply.
pub fn parse_temperature_status(reply: &str) -> ChamberResult<TemperatureStatus> {
    let [current, target, upper, lower] = parse_axis_fields(TEMPERATURE_QUERY, reply)?;
    Ok(TemperatureStatus {
        current_temperature: current,
        target_temperature: target,
        upper_limit: upper,
        lower_limit: lower,
    })
}

/// Parse a `HUMI?` reply.
pub fn parse_humidity_status(reply: &str) -> ChamberResult<HumidityStatus> {
    let [current, target, upper, lower] = parse_axis_fields(HUMIDITY_QUERY, reply)?;
    Ok(HumidityStatus {
        current_humidity: current,
        target_humidity: target,
        upper_limit: upper,
        lower_limit: lower,
    })
}

/// Parse a `MON?` reply.
pub fn parse_test_area_state(reply: &str) -> ChamberResult<TestAreaState> {
    let fields = split_fields(MONITOR_QUERY, reply, 4)?;
    Ok(TestAreaState {
        current_temperature: parse_decimal(MONITOR_QUERY, reply, fields[0], "temperature")?,
        current_humidity: parse_decimal(MONITOR_QUERY, reply, fields[1], "humidity")?,
        operation_state: parse_field(MONITOR_QUERY, reply, fields[2], "operation mode")?,
        number_of_alarms: parse_field(MONITOR_QUERY, reply, fields[3], "alarm count")?,
    })
}

/// Parse a `%?` reply. The first field is not used.
pub fn parse_heaters_status(reply: &str) -> ChamberResult<HeatersStatus> {
    let fields = split_fields(HEATER_QUERY, reply, 3)?;
    Ok(HeatersStatus {
        temperature_heater: parse_decimal(HEATER_QUERY, reply, fields[1], "temperature heater")?,
        humidity_heater: parse_decimal(HEATER_QUERY, reply, fields[2], "humidity heater")?,
    })
}

/// Parse a `MODE?` reply.
pub fn parse_mode(reply: &str) -> ChamberResult<OperationMode> {
    parse_field(MODE_QUERY, reply, reply.trim(), "operation mode")
}
