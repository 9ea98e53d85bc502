//! Raw TCP socket adapter.
//!
//! The chamber exposes its command interface on a plain TCP port. Each
//! command is written with a CRLF terminator and answered with one line.

use super::{Adapter, LINE_TERMINATOR};
use crate::error::{ChamberError, ChamberResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Line-oriented request/response adapter over TCP.
pub struct TcpAdapter {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<BufReader<TcpStream>>,
}

impl TcpAdapter {
    /// Connect to `host:port`, failing if the connection is not established
    /// within `timeout`. The same timeout bounds every later reply.
    pub async fn open(host: &str, port: u16, timeout: Duration) -> ChamberResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ChamberError::Timeout {
                command: format!("connect {}:{}", host, port),
                timeout,
            })??;
        stream.set_nodelay(true)?;

        debug!("Connected to chamber at {}:{}", host, port);
        Ok(Self {
            host: host.to_string(),
            port,
            timeout,
            stream: Some(BufReader::new(stream)),
        })
    }

    /// Peer this adapter talks to.
    pub fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Drop anything the instrument sent that nobody asked for, e.g. the tail of
/// a reply whose read timed out.
fn discard_stale_input(reader: &mut BufReader<TcpStream>) -> ChamberResult<()> {
    let buffered = reader.buffer().len();
    if buffered > 0 {
        debug!("Discarding {} buffered bytes", buffered);
        reader.consume(buffered);
    }

    let mut scratch = [0u8; 256];
    loop {
        match reader.get_ref().try_read(&mut scratch) {
            Ok(0) => return Err(ChamberError::ConnectionClosed),
            Ok(n) => debug!("Discarding {} stale bytes", n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

#[async_trait]
impl Adapter for TcpAdapter {
    fn name(&self) -> &str {
        "tcp"
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn query(&mut self, command: &str, delay: Duration) -> ChamberResult<String> {
        let timeout = self.timeout;
        let reader = self.stream.as_mut().ok_or(ChamberError::NotConnected)?;
        let timed_out = || ChamberError::Timeout {
            command: command.to_string(),
            timeout,
        };

        discard_stale_input(reader)?;

        let line = format!("{}{}", command, LINE_TERMINATOR);
        tokio::time::timeout(timeout, reader.get_mut().write_all(line.as_bytes()))
            .await
            .map_err(|_| timed_out())??;
        debug!("Sent: {}", command);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut reply = String::new();
        let read = tokio::time::timeout(timeout, reader.read_line(&mut reply))
            .await
            .map_err(|_| timed_out())??;
        if read == 0 || !reply.ends_with('\n') {
            return Err(ChamberError::ConnectionClosed);
        }

        let reply = reply.trim().to_string();
        debug!("Received: {}", reply);
        Ok(reply)
    }

    async fn close(&mut self) -> ChamberResult<()> {
        if let Some(mut reader) = self.stream.take() {
            reader.get_mut().shutdown().await?;
            debug!("Closed connection to {}", self.peer());
        }
        Ok(())
    }
}
