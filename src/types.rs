//! Range-checked value types and the decoded status word, meant to keep
//! out-of-range data from ever reaching the wire.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::TryInto;
use core::ops::Deref;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid permille setpoint or limit.
    #[snafu(display("Value out of range, permille values are 0..=1000"))]
    InvalidPermille,
    /// The value isn't one of the three control modes.
    #[snafu(display("Invalid control mode, expected 0 (UDC), 1 (IDC) or 2 (PDC)"))]
    InvalidMode,
}

const fn invalid_permille() -> InvalidPermilleSnafu {
    InvalidPermilleSnafu
}

/// `Permille` is a range-checked \[0, 1000\] integer: a setpoint or limit
/// in tenths of a percent of the device's full scale.
///
/// ## Example
/// ```
/// use rfpsu_proto::Permille;
/// let sp = Permille::new(500).unwrap();
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Permille(u16);

/// Create a new [`Permille`], panics if it is out of range.
pub const fn permille(value: u16) -> Permille {
    if value <= 1000 {
        return Permille(value);
    }
    panic!("Permille value out of range.")
}

impl Permille {
    /// Create a new `Permille`, checking that the value is in \[0, 1000\].
    /// # Errors
    /// Returns [`Error::InvalidPermille`] if `value` is out of range.
    pub fn new(value: impl TryInto<u16>) -> Result<Self, Error> {
        let value = value.try_into().ok().with_context(invalid_permille)?;
        ensure!(value <= 1000, invalid_permille());
        Ok(Self(value))
    }

    /// The raw data word transmitted on the wire.
    pub(crate) const fn to_data(self) -> u16 {
        self.0
    }
}

impl Deref for Permille {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u16> for Permille {
    fn eq(&self, other: &u16) -> bool {
        self.0 == *other
    }
}

/// Trait to convert `T: TryInto<u16>` into a [`Permille`].
pub trait IntoPermille {
    /// Convert self to a `Permille`.
    /// # Errors
    /// Returns [`Error::InvalidPermille`] if self isn't a valid permille value.
    fn into_permille(self) -> Result<Permille, Error>;
}

impl IntoPermille for Permille {
    fn into_permille(self) -> Result<Permille, Error> {
        Ok(self)
    }
}

impl<T> IntoPermille for T
where
    T: TryInto<u16>,
{
    fn into_permille(self) -> Result<Permille, Error> {
        Permille::new(self)
    }
}

/// The regulation quantity the device holds at the setpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ControlMode {
    /// DC voltage regulation.
    Udc = 0,
    /// DC current regulation.
    Idc = 1,
    /// DC power regulation.
    Pdc = 2,
}

impl ControlMode {
    /// Decode a mode from its wire value.
    /// # Errors
    /// Returns [`Error::InvalidMode`] for anything outside `{0, 1, 2}`.
    pub fn new(value: impl TryInto<u16>) -> Result<Self, Error> {
        match value.try_into().ok().context(InvalidModeSnafu)? {
            0u16 => Ok(ControlMode::Udc),
            1 => Ok(ControlMode::Idc),
            2 => Ok(ControlMode::Pdc),
            _ => InvalidModeSnafu.fail(),
        }
    }

    pub(crate) const fn to_data(self) -> u16 {
        self as u16
    }
}

/// Where the setpoint is sourced from, status word high byte bit 7.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetpointSource {
    Internal,
    External,
}

/// The interface currently in control of the device, status word
/// high byte bits 0..=2.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RemoteSource {
    /// No interface has claimed control.
    Free,
    /// Front-panel / internal control.
    Internal,
    /// Analog-digital interface.
    AdInterface,
    Rs232,
    Rs485,
    Profibus,
    /// A bit pattern this driver doesn't recognize.
    Unknown(u8),
}

/// The regulation mode the device reports as active, status word
/// low byte bits 5..=7. Distinct from [`ControlMode`] in that the
/// device may report a pattern outside the commandable set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActiveMode {
    Udc,
    Idc,
    Pdc,
    Unknown(u8),
}

/// Decoded view of the 16-bit status word.
///
/// Derived data: recomputed on every status query, never cached.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Status {
    /// Setpoint source selection.
    pub setpoint_source: SetpointSource,
    /// Output circuit interlock closed and ready.
    pub circuit_ready: bool,
    /// Frequency limit currently active.
    pub frequency_limit: bool,
    /// Power/energy limit currently active.
    pub power_limit: bool,
    /// Interface in control of the device.
    pub remote_source: RemoteSource,
    /// Regulation mode the device reports as active.
    pub active_mode: ActiveMode,
    /// Output sampling is disabled.
    pub sampling_disabled: bool,
    /// Output contactor engaged (RF/HV path closed).
    pub contactor_engaged: bool,
}

impl Status {
    /// Decode a status word. Unrecognized enumerated bit patterns map to
    /// the `Unknown` members instead of failing.
    pub fn from_word(word: u16) -> Status {
        let high = (word >> 8) as u8;
        let low = (word & 0xFF) as u8;

        let setpoint_source = if high & 0x80 != 0 {
            SetpointSource::External
        } else {
            SetpointSource::Internal
        };

        let remote_source = match high & 0x07 {
            0 => RemoteSource::Free,
            1 => RemoteSource::Internal,
            2 => RemoteSource::AdInterface,
            3 => RemoteSource::Rs232,
            4 => RemoteSource::Rs485,
            5 => RemoteSource::Profibus,
            other => RemoteSource::Unknown(other),
        };

        let active_mode = match (low >> 5) & 0x07 {
            0 => ActiveMode::Udc,
            1 => ActiveMode::Idc,
            2 => ActiveMode::Pdc,
            other => ActiveMode::Unknown(other),
        };

        Status {
            setpoint_source,
            circuit_ready: high & 0x40 != 0,
            frequency_limit: high & 0x10 != 0,
            power_limit: high & 0x08 != 0,
            remote_source,
            active_mode,
            sampling_disabled: low & 0x02 != 0,
            contactor_engaged: low & 0x01 != 0,
        }
    }
}


#[cfg(test)]
mod mode_tests {
    use super::*;

    #[test]
    fn test_mode_values() {
        assert_eq!(ControlMode::new(0u16), Ok(ControlMode::Udc));
        assert_eq!(ControlMode::new(1u16), Ok(ControlMode::Idc));
        assert_eq!(ControlMode::new(2u16), Ok(ControlMode::Pdc));
        assert_eq!(ControlMode::new(3u16), Err(Error::InvalidMode));
        assert_eq!(ControlMode::Pdc.to_data(), 2);
    }
}
