//! Instrument link adapters
//!
//! An [`Adapter`] turns one command line into one reply line. The chamber
//! controller only talks to this trait, so the same driver runs over TCP,
//! a serial port, or the in-process [`SimulatedChamber`].

pub mod address;
pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial_adapter;
pub mod tcp_adapter;

pub use address::{ChamberIdentity, ResourceAddress, CHAMBER_TCP_PORT};
pub use mock::SimulatedChamber;
#[cfg(feature = "instrument_serial")]
pub use serial_adapter::SerialAdapter;
pub use tcp_adapter::TcpAdapter;

use crate::error::ChamberResult;
use async_trait::async_trait;
use std::time::Duration;

/// Line terminator used on both directions of the link.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Request/response link to an instrument.
///
/// One command is outstanding at a time; `&mut self` on every call enforces
/// that for a single owner.
#[async_trait]
pub trait Adapter: Send {
    /// Short adapter kind, used in logs.
    fn name(&self) -> &str;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Write `command`, wait `delay`, then read one terminated reply line.
    ///
    /// The returned reply is trimmed of whitespace and the terminator.
    async fn query(&mut self, command: &str, delay: Duration) -> ChamberResult<String>;

    /// Release the link. Calling this on a closed adapter does nothing.
    async fn close(&mut self) -> ChamberResult<()>;
}

#[async_trait]
impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn query(&mut self, command: &str, delay: Duration) -> ChamberResult<String> {
        (**self).query(command, delay).await
    }

    async fn close(&mut self) -> ChamberResult<()> {
        (**self).close().await
    }
}

/// Open the adapter matching a parsed resource address.
pub async fn open(address: &ResourceAddress, timeout: Duration) -> ChamberResult<Box<dyn Adapter>> {
    match address {
        ResourceAddress::Tcp { host, port } => {
            let adapter = TcpAdapter::open(host, *port, timeout).await?;
            Ok(Box::new(adapter))
        }
        ResourceAddress::Serial { path, baud_rate } => open_serial(path, *baud_rate, timeout).await,
    }
}

#[cfg(feature = "instrument_serial")]
async fn open_serial(path: &str, baud_rate: u32, timeout: Duration) -> ChamberResult<Box<dyn Adapter>> {
    let adapter = SerialAdapter::open(path, baud_rate, timeout).await?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "instrument_serial"))]
async fn open_serial(_path: &str, _baud_rate: u32, _timeout: Duration) -> ChamberResult<Box<dyn Adapter>> {
    Err(crate::error::ChamberError::FeatureNotEnabled("instrument_serial".to_string()))
}
