//! Serial transport session: owns the open/closed state of the channel and
//! moves raw frames across it with timeout semantics.

use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

use log::{debug, error, info};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use snafu::ResultExt;

use crate::error::{CommFault, ConnectionSnafu, Error};
use crate::frame::FRAME_LEN;

/// Baud rate used by this device family.
pub const BAUD_RATE: u32 = 9600;

/// Default read and write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial line parameters for one session.
///
/// Byte framing is fixed at 8 data bits, no parity, 1 stop bit, no flow
/// control; the device knows nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port identifier, e.g. `COM3` or `/dev/ttyUSB0`.
    pub port: String,
    /// Baud rate, 9600 unless the device is jumpered otherwise.
    pub baud_rate: u32,
    /// Device bus address placed in every frame.
    pub address: u8,
    /// Read and write timeout.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Configuration with the defaults for this device family.
    pub fn new(port: impl Into<String>) -> SerialConfig {
        SerialConfig {
            port: port.into(),
            baud_rate: BAUD_RATE,
            address: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the baud rate.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Override the device bus address.
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Override the read/write timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Acquires the underlying serial channel for a [`Session`].
///
/// The production implementation is [`SerialConnector`]; tests substitute
/// a scripted in-memory port.
pub trait Connect {
    /// The byte-oriented duplex channel produced on success.
    type Port: Read + Write;

    /// Acquire the channel described by `config`.
    /// # Errors
    /// Any I/O error if the channel can't be acquired (device absent,
    /// port busy, permission denied).
    fn connect(&mut self, config: &SerialConfig) -> io::Result<Self::Port>;
}

/// Opens a real serial port through the `serialport` crate.
#[derive(Debug, Default, Copy, Clone)]
pub struct SerialConnector;

impl Connect for SerialConnector {
    type Port = Box<dyn serialport::SerialPort>;

    fn connect(&mut self, config: &SerialConfig) -> io::Result<Self::Port> {
        serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(Into::into)
    }
}

/// One serial connection, created closed.
///
/// `open` and `close` are both idempotent. Frame I/O requires the open
/// state and fails with [`Error::NotOpen`] otherwise, without touching
/// the transport.
pub struct Session<C: Connect> {
    config: SerialConfig,
    connector: C,
    port: Option<C::Port>,
}

impl<C: Connect> Session<C> {
    /// Create a session in the closed state.
    pub fn new(config: SerialConfig, connector: C) -> Session<C> {
        Session {
            config,
            connector,
            port: None,
        }
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Whether the channel is currently acquired.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Acquire the serial channel. A no-op if already open.
    /// # Errors
    /// Returns [`Error::Connection`] if the channel can't be acquired.
    pub fn open(&mut self) -> Result<(), Error> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = self
            .connector
            .connect(&self.config)
            .context(ConnectionSnafu {
                port: self.config.port.as_str(),
            })?;
        info!("Connected to {}", self.config.port);
        self.port = Some(port);
        Ok(())
    }

    /// Release the serial channel. A no-op if already closed.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Disconnected from {}", self.config.port);
        }
    }

    /// Transmit one frame.
    pub(crate) fn write_frame(&mut self, bytes: &[u8; FRAME_LEN]) -> Result<(), Error> {
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;
        debug!("TX {:02X?}", bytes);
        port.write_all(bytes)
            .and_then(|_| port.flush())
            .map_err(|source| CommFault::WriteTimeout { source }.into())
    }

    /// Receive exactly one frame.
    ///
    /// A short or absent read within the timeout is always a fault; the
    /// remainder is never awaited by a later call.
    pub(crate) fn read_frame(&mut self) -> Result<[u8; FRAME_LEN], Error> {
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;
        let mut buf = [0u8; FRAME_LEN];
        let mut received = 0;
        while received < FRAME_LEN {
            match port.read(&mut buf[received..]) {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Read failed after {} octets: {}", received, e);
                    break;
                }
            }
        }
        if received < FRAME_LEN {
            error!("Timeout or incomplete read, received {} octets", received);
            return Err(CommFault::ReadTimeout {
                received,
                expected: FRAME_LEN,
            }
            .into());
        }
        debug!("RX {:02X?}", &buf);
        Ok(buf)
    }
}
