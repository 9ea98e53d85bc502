//! Serial port adapter.
//!
//! Wraps the `serialport` crate. All port I/O is blocking, so each exchange
//! runs on Tokio's blocking pool with the port behind an `Arc<Mutex>`.

use super::{Adapter, LINE_TERMINATOR};
use crate::error::{ChamberError, ChamberResult};
use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Poll period of the underlying port; the overall reply timeout is enforced
/// on top of it.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial adapter for RS-232 communication
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Reply timeout
    timeout: Duration,

    /// The open port, `None` once closed
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

fn to_io(err: serialport::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl SerialAdapter {
    /// Open `port_name` at `baud_rate`.
    pub async fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> ChamberResult<Self> {
        let name = port_name.to_string();
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&name, baud_rate)
                .timeout(PORT_READ_TIMEOUT)
                .open()
                .map_err(to_io)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);
        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            timeout,
            port: Some(Arc::new(Mutex::new(port))),
        })
    }

    /// Port name.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

/// Clear the input buffer, then write one terminated command.
fn write_command(port: &mut Box<dyn SerialPort>, command: &str) -> ChamberResult<()> {
    port.clear(serialport::ClearBuffer::Input).map_err(to_io)?;
    port.write_all(format!("{}{}", command, LINE_TERMINATOR).as_bytes())?;
    port.flush()?;
    Ok(())
}

/// Read byte by byte until '\n' or until `timeout` has elapsed.
///
/// A reply that is not valid UTF-8 fails with `InvalidData`, as on TCP.
fn read_line<R: Read + ?Sized>(port: &mut R, command: &str, timeout: Duration) -> ChamberResult<String> {
    let mut response = Vec::new();
    let mut buffer = [0u8; 1];
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(ChamberError::Timeout {
                command: command.to_string(),
                timeout,
            });
        }

        match port.read(&mut buffer) {
            Ok(0) => return Err(ChamberError::ConnectionClosed),
            Ok(_) => {
                response.push(buffer[0]);
                if buffer[0] == b'\n' {
                    break;
                }
            }
            // Port timeout is shorter than the overall timeout
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let reply = String::from_utf8(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(reply.trim().to_string())
}

#[async_trait]
impl Adapter for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn query(&mut self, command: &str, delay: Duration) -> ChamberResult<String> {
        let port = self.port.clone().ok_or(ChamberError::NotConnected)?;
        let timeout = self.timeout;

        let writer = port.clone();
        let line = command.to_string();
        tokio::task::spawn_blocking(move || write_command(&mut writer.blocking_lock(), &line))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        debug!("Sent serial command: {}", command);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let line = command.to_string();
        let reply = tokio::task::spawn_blocking(move || {
            let mut guard = port.blocking_lock();
            read_line(&mut **guard, &line, timeout)
        })
        .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        debug!("Received serial reply: {}", reply);
        Ok(reply)
    }

    async fn close(&mut self) -> ChamberResult<()> {
        if self.port.take().is_some() {
            debug!("Serial port '{}' closed", self.port_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Port that never delivers a byte within its own read timeout.
    struct SilentPort;

    impl Read for SilentPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
        }
    }

    #[test]
    fn test_read_line_stops_at_newline() {
        let mut port = Cursor::new(b" OK: MODE, RUN\r\n23.0".to_vec());
        let reply = read_line(&mut port, "MODE, RUN", Duration::from_secs(1)).unwrap();
        assert_eq!(reply, "OK: MODE, RUN");
        assert_eq!(port.position(), 16);
    }

    #[test]
    fn test_read_line_rejects_invalid_utf8() {
        let mut port = Cursor::new(vec![b'2', 0xff, 0xfe, b'\r', b'\n']);
        let err = read_line(&mut port, "TEMP?", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ChamberError::Io(ref e) if e.kind() == io::ErrorKind::InvalidData));
    }

    #[test]
    fn test_read_line_partial_reply_is_connection_closed() {
        let mut port = Cursor::new(b"23.0, 2".to_vec());
        let err = read_line(&mut port, "TEMP?", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ChamberError::ConnectionClosed));
    }

    #[test]
    fn test_read_line_times_out_on_silent_port() {
        let timeout = Duration::from_millis(30);
        let start = std::time::Instant::now();
        let err = read_line(&mut SilentPort, "HUMI?", timeout).unwrap_err();
        assert!(matches!(err, ChamberError::Timeout { ref command, .. } if command == "HUMI?"));
        assert!(start.elapsed() >= timeout);
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let result = SerialAdapter::open("/dev/does-not-exist-chamber", 9600, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ChamberError::Io(_))));
    }
}
