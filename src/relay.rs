//! Device command relay.
//!
//! Each call is one fresh exchange with an ESP32 board: connect, write the
//! command followed by a newline, perform exactly one bounded read, close.
//! There is no retry and no connection reuse.

use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Message returned for a device id other than 1 or 2.
pub const INVALID_DEVICE_MESSAGE: &str = "Invalid ESP32 ID.";

/// Upper bound on the single response read.
pub const RESPONSE_BUFFER_BYTES: usize = 1024;

/// Fixed `(host, port)` of one device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host` or `host:port`, falling back to `default_port`.
    pub fn parse(value: &str, default_port: u16) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("device endpoint must not be empty"));
        }
        match value.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                if host.is_empty() {
                    return Err(anyhow!("device endpoint '{}' is missing a host", value));
                }
                let port = port
                    .parse()
                    .map_err(|_| anyhow!("invalid port in device endpoint '{}'", value))?;
                Ok(Self::new(host, port))
            }
            _ => Ok(Self::new(value, default_port)),
        }
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for RelayTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(3),
            read: Duration::from_secs(3),
        }
    }
}

/// Why a relay exchange failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayError {
    /// Resolving, connecting, writing or reading failed.
    Connection(String),
    /// Anything else, e.g. a reply that is not valid UTF-8.
    Unexpected(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Connection(message) => write!(f, "connection error: {}", message),
            RelayError::Unexpected(message) => write!(f, "unexpected error: {}", message),
        }
    }
}

impl std::error::Error for RelayError {}

fn connection_error(err: std::io::Error) -> RelayError {
    RelayError::Connection(err.to_string())
}

/// Commands travel trimmed and upper-cased.
pub fn normalize_command(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Send `command` to `endpoint` and return the raw reply text.
pub fn send(
    endpoint: &DeviceEndpoint,
    command: &str,
    timeouts: RelayTimeouts,
) -> Result<String, RelayError> {
    let addr: SocketAddr = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(connection_error)?
        .next()
        .ok_or_else(|| RelayError::Unexpected(format!("{} resolved to no addresses", endpoint)))?;

    let mut stream = TcpStream::connect_timeout(&addr, timeouts.connect).map_err(connection_error)?;
    stream
        .set_read_timeout(Some(timeouts.read))
        .map_err(connection_error)?;
    stream
        .set_write_timeout(Some(timeouts.read))
        .map_err(connection_error)?;

    stream
        .write_all(format!("{command}\n").as_bytes())
        .map_err(connection_error)?;

    let mut buf = [0u8; RESPONSE_BUFFER_BYTES];
    let read = stream.read(&mut buf).map_err(connection_error)?;
    let _ = stream.shutdown(Shutdown::Both);

    String::from_utf8(buf[..read].to_vec())
        .map_err(|err| RelayError::Unexpected(format!("reply is not valid UTF-8: {}", err)))
}

/// Relay `command` and render the outcome as the text shown to the user.
///
/// Never fails: errors are folded into the message.
pub fn relay_message(endpoint: &DeviceEndpoint, command: &str, timeouts: RelayTimeouts) -> String {
    match send(endpoint, command, timeouts) {
        Ok(response) => {
            log::info!("device {} answered {:?} to {:?}", endpoint, response, command);
            format!("Response from {}: {}", endpoint.host, response)
        }
        Err(RelayError::Connection(err)) => {
            log::warn!("device {} unreachable for {:?}: {}", endpoint, command, err);
            format!(
                "Socket error while sending command to {}: {}",
                endpoint.host, err
            )
        }
        Err(RelayError::Unexpected(err)) => {
            log::warn!("device {} exchange failed for {:?}: {}", endpoint, command, err);
            format!(
                "Unexpected error while sending command to {}: {}",
                endpoint.host, err
            )
        }
    }
}
