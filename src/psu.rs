//! Command protocol engine: turns a logical operation into exactly one
//! request/response transaction and yields a typed result.

use log::{error, info, warn};
use snafu::OptionExt;

use crate::error::{CommFault, Error, UnsupportedSnafu};
use crate::frame::{Frame, Op, Revision};
use crate::transport::{Connect, SerialConfig, SerialConnector, Session};
use crate::types::{ControlMode, IntoPermille, Status};

/// Data value for the operation opcode enabling RF output.
const RF_ON: u16 = 1;
/// Data value for the operation opcode disabling RF output.
const RF_OFF: u16 = 0;
/// Sentinel data value acknowledged by the reset-error opcode.
const RESET_SENTINEL: u16 = 0x5A5A;

/// The decoded fields of a response frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Response {
    /// Echoed device bus address.
    pub address: u8,
    /// Echoed command opcode.
    pub command: u8,
    /// 16-bit response payload.
    pub data: u16,
}

/// Driver for one RF power supply on one serial port.
///
/// Every command performs exactly one blocking write followed by one
/// blocking read of a 5-octet frame, bounded by the configured timeout.
/// There is no pipelining and no automatic retry; a transaction that
/// fails on the wire surfaces as a [`CommFault`] and disposition is the
/// caller's decision.
///
/// Two drivers on different ports are fully independent; the session is
/// the only mutable state and it is owned by this struct.
///
/// # Example
///
/// ```no_run
/// use rfpsu_proto::Psu;
///
/// # fn main() -> Result<(), rfpsu_proto::Error> {
/// let mut psu = Psu::new("/dev/ttyUSB0");
/// psu.run_session(|psu| {
///     psu.write_setpoint(500u16)?; // 50.0 %
///     psu.rf_on()?;
///     let status = psu.status()?;
///     println!("contactor engaged: {}", status.contactor_engaged);
///     Ok(())
/// })?;
/// // RF was switched off and the port closed on the way out.
/// # Ok(()) }
/// ```
pub struct Psu<C: Connect> {
    session: Session<C>,
    revision: Revision,
}

impl Psu<SerialConnector> {
    /// Driver on a real serial port with default configuration and
    /// protocol revision [`Revision::V1`].
    pub fn new(port: impl Into<String>) -> Psu<SerialConnector> {
        Psu::with_config(SerialConfig::new(port), Revision::V1)
    }

    /// Driver on a real serial port with explicit configuration and
    /// protocol revision.
    pub fn with_config(config: SerialConfig, revision: Revision) -> Psu<SerialConnector> {
        Psu::with_connector(config, revision, SerialConnector)
    }
}

impl<C: Connect> Psu<C> {
    /// Driver over a caller-supplied channel acquisition strategy.
    /// This is the seam the test suite uses to substitute a scripted port.
    pub fn with_connector(config: SerialConfig, revision: Revision, connector: C) -> Psu<C> {
        Psu {
            session: Session::new(config, connector),
            revision,
        }
    }

    /// The protocol revision this driver speaks.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Open the serial session. Idempotent.
    /// # Errors
    /// Returns [`Error::Connection`] if the channel can't be acquired.
    pub fn open(&mut self) -> Result<(), Error> {
        self.session.open()
    }

    /// Close the serial session. Idempotent.
    pub fn close(&mut self) {
        self.session.close()
    }

    /// Whether the serial session is open.
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    /// Perform one raw transaction: encode, write, read 5 octets, decode.
    ///
    /// # Errors
    /// Fails with [`Error::NotOpen`] before any I/O if the session is
    /// closed, or with a [`CommFault`] on timeout or checksum mismatch.
    /// The transaction is never retried here.
    pub fn send_command(&mut self, command: u8, data: u16) -> Result<Response, Error> {
        let address = self.session.config().address;
        let request = Frame::new(self.revision, address, command, data);
        self.session.write_frame(&request.to_bytes())?;

        let reply = Frame::from_bytes(self.session.read_frame()?);
        if !reply.checksum_valid(self.revision) {
            let expected = reply.expected_checksum(self.revision);
            error!(
                "Checksum mismatch, received {:#04X}, expected {:#04X}",
                reply.checksum, expected
            );
            return Err(CommFault::ChecksumMismatch {
                received: reply.checksum,
                expected,
            }
            .into());
        }
        Ok(Response {
            address: reply.address,
            command: reply.command,
            data: reply.data,
        })
    }

    fn transact(&mut self, op: Op, data: u16) -> Result<Response, Error> {
        let opcode = self.revision.opcode(op).context(UnsupportedSnafu {
            op,
            revision: self.revision,
        })?;
        self.send_command(opcode, data)
    }

    fn write_permille(&mut self, op: Op, value: impl IntoPermille) -> Result<(), Error> {
        let value = value.into_permille()?;
        self.transact(op, value.to_data())?;
        Ok(())
    }

    fn read_word(&mut self, op: Op) -> Result<u16, Error> {
        Ok(self.transact(op, 0)?.data)
    }

    /// Write the setpoint, in permille of full scale.
    /// # Errors
    /// Out-of-range values are rejected before any I/O.
    pub fn write_setpoint(&mut self, value: impl IntoPermille) -> Result<(), Error> {
        self.write_permille(Op::WriteSetpoint, value)
    }

    /// Read back the setpoint, in permille of full scale.
    pub fn read_setpoint(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadSetpoint)
    }

    /// Write the DC voltage limit, in permille of full scale.
    /// # Errors
    /// Out-of-range values are rejected before any I/O.
    pub fn write_udc_limit(&mut self, value: impl IntoPermille) -> Result<(), Error> {
        self.write_permille(Op::WriteUdcLimit, value)
    }

    /// Read back the DC voltage limit.
    pub fn read_udc_limit(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadUdcLimit)
    }

    /// Write the DC current limit, in permille of full scale.
    /// # Errors
    /// Out-of-range values are rejected before any I/O.
    pub fn write_idc_limit(&mut self, value: impl IntoPermille) -> Result<(), Error> {
        self.write_permille(Op::WriteIdcLimit, value)
    }

    /// Read back the DC current limit.
    pub fn read_idc_limit(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadIdcLimit)
    }

    /// Write the DC power limit, in permille of full scale.
    /// # Errors
    /// Out-of-range values are rejected before any I/O.
    pub fn write_pdc_limit(&mut self, value: impl IntoPermille) -> Result<(), Error> {
        self.write_permille(Op::WritePdcLimit, value)
    }

    /// Read back the DC power limit.
    pub fn read_pdc_limit(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadPdcLimit)
    }

    /// Select the regulation mode.
    pub fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), Error> {
        self.transact(Op::WriteMode, mode.to_data())?;
        Ok(())
    }

    /// Read back the selected regulation mode.
    /// # Errors
    /// Returns a validation error if the device reports a mode outside
    /// the commandable set.
    pub fn control_mode(&mut self) -> Result<ControlMode, Error> {
        let data = self.read_word(Op::ReadMode)?;
        Ok(ControlMode::new(data)?)
    }

    /// Enable RF output.
    pub fn rf_on(&mut self) -> Result<(), Error> {
        info!("Turning RF on");
        self.transact(Op::WriteOperation, RF_ON)?;
        Ok(())
    }

    /// Disable RF output.
    pub fn rf_off(&mut self) -> Result<(), Error> {
        info!("Turning RF off");
        self.transact(Op::WriteOperation, RF_OFF)?;
        Ok(())
    }

    /// Read back whether RF output is commanded on.
    pub fn rf_enabled(&mut self) -> Result<bool, Error> {
        Ok(self.read_word(Op::ReadOperation)? != 0)
    }

    /// Acknowledge and clear a latched device error.
    pub fn reset_error(&mut self) -> Result<(), Error> {
        info!("Resetting device error");
        self.transact(Op::ResetError, RESET_SENTINEL)?;
        Ok(())
    }

    /// Query the device status word and decode it.
    pub fn status(&mut self) -> Result<Status, Error> {
        Ok(Status::from_word(self.read_word(Op::ReadStatus)?))
    }

    /// Measured output power. Only answered by V2 firmware.
    /// # Errors
    /// Returns [`Error::Unsupported`] on V1, before any I/O.
    pub fn actual_power(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadActualPower)
    }

    /// Measured output voltage. Only answered by V2 firmware.
    /// # Errors
    /// Returns [`Error::Unsupported`] on V1, before any I/O.
    pub fn actual_voltage(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadActualVoltage)
    }

    /// Measured output current. Only answered by V2 firmware.
    /// # Errors
    /// Returns [`Error::Unsupported`] on V1, before any I/O.
    pub fn actual_current(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadActualCurrent)
    }

    /// Measured output frequency. Only answered by V2 firmware.
    /// # Errors
    /// Returns [`Error::Unsupported`] on V1, before any I/O.
    pub fn actual_frequency(&mut self) -> Result<u16, Error> {
        self.read_word(Op::ReadActualFrequency)
    }

    /// Run `f` within an open session, then clean up.
    ///
    /// Opens the session first, propagating any connection error. After
    /// `f` returns, a best-effort RF-off is sent and the session closed.
    /// The RF-off is skipped when `f` failed with a communication fault:
    /// the device is already not responding, and another command would
    /// only block until its own timeout. A failure of the cleanup RF-off
    /// itself is logged and swallowed so that the close always runs.
    ///
    /// # Errors
    /// Returns whatever `f` returned, or the error from opening the
    /// session.
    pub fn run_session<T, F>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Error>,
    {
        self.session.open()?;
        let result = f(self);
        match &result {
            Err(e) if e.is_comm_fault() => {
                warn!("Skipping RF off during cleanup, communication already failing");
            }
            _ => {
                if let Err(e) = self.rf_off() {
                    error!("Best-effort RF off during cleanup failed: {}", e);
                }
            }
        }
        self.session.close();
        result
    }
}
