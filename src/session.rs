//! Instrument sessions and the connectors that open them.
//!
//! A session is a stateful handle to one bus-connected instrument supporting
//! `write` (fire-and-forget command) and `query` (command followed by a single
//! line reply). Sessions are opened on demand through a [`Connector`], one per
//! device operation; nothing is pooled.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

pub const DEFAULT_IO_TIMEOUT_MS: u64 = 2000;
const LINE_TERMINATOR: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    PowerSupply,
    Multimeter,
}

impl core::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InstrumentKind::PowerSupply => write!(f, "power supply"),
            InstrumentKind::Multimeter => write!(f, "multimeter"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {kind} at {address}: {source}")]
    Connect {
        kind: InstrumentKind,
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{kind} not available")]
    Unavailable { kind: InstrumentKind },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("instrument closed the connection")]
    Closed,
    #[error("instrument rejected command '{0}'")]
    Rejected(String),
}

/// Open communication handle to one instrument.
pub trait InstrumentSession {
    fn write(&mut self, command: &str) -> Result<(), SessionError>;

    /// Sends `command` and returns the reply with its line terminator removed.
    fn query(&mut self, command: &str) -> Result<String, SessionError>;
}

impl<S: InstrumentSession + ?Sized> InstrumentSession for Box<S> {
    fn write(&mut self, command: &str) -> Result<(), SessionError> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String, SessionError> {
        (**self).query(command)
    }
}

/// Opens sessions to the instruments on the bench.
///
/// Every device operation asks for a fresh session. A pooled or persistent
/// implementation only has to hand out sessions that share one connection.
pub trait Connector {
    fn open(&self, kind: InstrumentKind) -> Result<Box<dyn InstrumentSession>, SessionError>;
}

impl<C: Connector + ?Sized> Connector for &C {
    fn open(&self, kind: InstrumentKind) -> Result<Box<dyn InstrumentSession>, SessionError> {
        (**self).open(kind)
    }
}

impl<C: Connector + ?Sized> Connector for Box<C> {
    fn open(&self, kind: InstrumentKind) -> Result<Box<dyn InstrumentSession>, SessionError> {
        (**self).open(kind)
    }
}

impl<C: Connector + ?Sized> Connector for std::sync::Arc<C> {
    fn open(&self, kind: InstrumentKind) -> Result<Box<dyn InstrumentSession>, SessionError> {
        (**self).open(kind)
    }
}

/// SCPI over a raw TCP socket (the LAN port of bench instruments).
#[derive(Debug)]
pub struct TcpSession {
    kind: InstrumentKind,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpSession {
    pub fn connect(kind: InstrumentKind, address: &str, timeout: Duration) -> Result<Self, SessionError> {
        let connect_error = |source| SessionError::Connect {
            kind,
            address: address.to_string(),
            source,
        };

        let socket_addr = address
            .to_socket_addrs()
            .map_err(connect_error)?
            .next()
            .ok_or_else(|| connect_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "address did not resolve",
            )))?;

        let stream = TcpStream::connect_timeout(&socket_addr, timeout).map_err(connect_error)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        debug!("Opened {} session at {}", kind, address);

        let writer = stream.try_clone()?;
        Ok(Self {
            kind,
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl InstrumentSession for TcpSession {
    fn write(&mut self, command: &str) -> Result<(), SessionError> {
        trace!("{} <- {}", self.kind, command);
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(LINE_TERMINATOR.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, SessionError> {
        self.write(command)?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(SessionError::Closed);
        }
        let reply = reply.trim_end_matches(['\r', '\n']).to_string();
        trace!("{} -> {}", self.kind, reply);
        Ok(reply)
    }
}

/// Connects to instruments exposing SCPI on raw TCP sockets.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub power_supply: String,
    pub multimeter: String,
    pub timeout: Duration,
}

impl TcpConnector {
    pub fn new(power_supply: impl Into<String>, multimeter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            power_supply: power_supply.into(),
            multimeter: multimeter.into(),
            timeout,
        }
    }

    pub fn address(&self, kind: InstrumentKind) -> &str {
        match kind {
            InstrumentKind::PowerSupply => &self.power_supply,
            InstrumentKind::Multimeter => &self.multimeter,
        }
    }
}

impl Connector for TcpConnector {
    fn open(&self, kind: InstrumentKind) -> Result<Box<dyn InstrumentSession>, SessionError> {
        let session = TcpSession::connect(kind, self.address(kind), self.timeout)?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_session_write_and_query() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let instrument = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut received = Vec::new();
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                let command = line.trim_end().to_string();
                if command.ends_with('?') || command.contains("? ") {
                    writer.write_all(b"3.300\r\n").unwrap();
                }
                received.push(command);
                line.clear();
            }
            received
        });

        let connector = TcpConnector::new(address.clone(), address, Duration::from_millis(500));
        {
            let mut session = connector.open(InstrumentKind::PowerSupply).unwrap();
            session.write("INST CH1").unwrap();
            assert_eq!(session.query("MEAS:VOLT? CH1").unwrap(), "3.300");
        }

        let received = instrument.join().unwrap();
        assert_eq!(received, vec!["INST CH1".to_string(), "MEAS:VOLT? CH1".to_string()]);
    }

    #[test]
    fn test_tcp_connect_failure_names_instrument() {
        // Bind then drop to get a port nobody listens on
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let connector = TcpConnector::new(address.clone(), address, Duration::from_millis(200));
        let error = connector.open(InstrumentKind::Multimeter).err().unwrap();
        assert!(matches!(error, SessionError::Connect { kind: InstrumentKind::Multimeter, .. }));
        assert!(error.to_string().contains("multimeter"));
    }
}
