//! Error types for the chamber driver.
//!
//! `ChamberError` is the single error type returned by every fallible
//! operation in the crate. The variants fall into a few groups:
//!
//! - **Transport**: `Io`, `Timeout`, `ConnectionClosed` and `NotConnected`. The
//!   link to the instrument failed or did not answer in time. These are fatal to
//!   the in-flight call and are never retried internally.
//! - **Addressing**: `InvalidAddress`, `AddressingConflict` and `MissingAddress`.
//!   Raised while resolving how to reach the chamber, before any I/O happens.
//! - **Parse**: a status reply did not have the expected shape.
//! - **Setting**: the instrument did not acknowledge a setting command. The
//!   variant names the exact field, so a failed upper limit is never confused
//!   with a failed lower limit.
//! - **Stability wait**: `Cancelled` and `StabilityTimeout`.
//! - **Configuration**: `Config` wraps figment loading errors, `ConfigValidation`
//!   covers values that parse but make no sense.
//!
//! Nothing in the crate recovers from an error locally; callers decide whether
//! to retry, abort or escalate.

use crate::instrument::protocol::SettingField;
use crate::instrument::status::{HumidityStatus, TemperatureStatus};
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the chamber error type.
pub type ChamberResult<T> = std::result::Result<T, ChamberError>;

#[derive(Error, Debug)]
pub enum ChamberError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No reply to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Connection closed by the instrument")]
    ConnectionClosed,

    #[error("Chamber connection is not open")]
    NotConnected,

    #[error("Invalid resource address: {0}")]
    InvalidAddress(String),

    #[error("Both an IP address and a resource path were given; supply exactly one")]
    AddressingConflict,

    #[error("Neither an IP address nor a resource path was given; supply exactly one")]
    MissingAddress,

    #[error("Failed to parse reply to '{command}' ({reason}): '{reply}'")]
    Parse {
        command: String,
        reply: String,
        reason: String,
    },

    #[error("Failed to set the {field} (reply: '{reply}')")]
    Setting { field: SettingField, reply: String },

    #[error("Stability wait cancelled")]
    Cancelled,

    #[error(
        "Set points not stable after {waited:?} (temperature {} °C, humidity {} %)",
        .temperature.current_temperature,
        .humidity.current_humidity
    )]
    StabilityTimeout {
        waited: Duration,
        temperature: TemperatureStatus,
        humidity: HumidityStatus,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl ChamberError {
    /// Build a parse error for the reply to `command`.
    pub fn parse(command: &str, reply: &str, reason: impl Into<String>) -> Self {
        ChamberError::Parse {
            command: command.to_string(),
            reply: reply.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures of the link itself rather than of the protocol.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChamberError::Io(_)
                | ChamberError::Timeout { .. }
                | ChamberError::ConnectionClosed
                | ChamberError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::protocol::{Axis, SetPoint};

    #[test]
    fn test_setting_error_names_field() {
        let err = ChamberError::Setting {
            field: SettingField::Axis(Axis::Temperature, SetPoint::Upper),
            reply: "NA:DATA NOT READY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to set the upper temperature limit (reply: 'NA:DATA NOT READY')"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = ChamberError::parse("TEMP?", "23.0, 24.0", "expected 4 fields, got 2");
        assert_eq!(
            err.to_string(),
            "Failed to parse reply to 'TEMP?' (expected 4 fields, got 2): '23.0, 24.0'"
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(ChamberError::ConnectionClosed.is_transport());
        assert!(ChamberError::Timeout {
            command: "MON?".into(),
            timeout: Duration::from_secs(5),
        }
        .is_transport());
        assert!(!ChamberError::Cancelled.is_transport());
        assert!(!ChamberError::MissingAddress.is_transport());
    }
}
