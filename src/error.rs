//! Crate-level error taxonomy.
//!
//! Communication faults (anything originating from the wire) are kept in
//! their own enum so the session lifecycle guard can branch on them: after
//! a timeout or checksum mismatch the cleanup RF-off is pointless and is
//! skipped.

use snafu::Snafu;

use crate::frame::{Op, Revision};
use crate::types;

/// A failure originating from the wire, as opposed to a local precondition
/// or validation failure. None of these are retried inside the driver:
/// the protocol has no sequence numbers, so blindly retransmitting after a
/// fault could re-issue a write whose effect isn't idempotent.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum CommFault {
    /// The frame could not be transmitted within the configured timeout.
    #[snafu(display("Write timed out: {source}"))]
    WriteTimeout { source: std::io::Error },

    /// Fewer than the expected octets arrived before the timeout.
    /// A short read is always a fault, never a partial success.
    #[snafu(display("Read timed out, received {received} of {expected} octets"))]
    ReadTimeout { received: usize, expected: usize },

    /// The response checksum doesn't match the recomputed value.
    #[snafu(display(
        "Checksum mismatch, received {received:#04X}, expected {expected:#04X}"
    ))]
    ChecksumMismatch { received: u8, expected: u8 },
}

/// Error type for every fallible operation in this crate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The serial channel could not be acquired.
    #[snafu(display("Failed to open serial port {port}: {source}"))]
    Connection { port: String, source: std::io::Error },

    /// A transaction was attempted while the session was closed.
    /// This is a usage error, never triggered by the wire.
    #[snafu(display("Serial session is not open"))]
    NotOpen,

    /// A caller-supplied value was rejected before any I/O took place.
    #[snafu(transparent)]
    Validation { source: types::Error },

    /// The operation has no opcode in the selected protocol revision.
    /// Rejected before any I/O.
    #[snafu(display("Operation {op:?} is not available in protocol revision {revision:?}"))]
    Unsupported { op: Op, revision: Revision },

    /// The transaction failed on the wire.
    #[snafu(transparent)]
    Comm { source: CommFault },
}

impl Error {
    /// True for wire-originated failures. The lifecycle guard uses this to
    /// decide whether a cleanup RF-off still stands a chance of succeeding.
    pub fn is_comm_fault(&self) -> bool {
        matches!(self, Error::Comm { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comm_fault_classification() {
        let err = Error::from(CommFault::ChecksumMismatch {
            received: 0x99,
            expected: 0x33,
        });
        assert!(err.is_comm_fault());

        assert!(!Error::NotOpen.is_comm_fault());
        assert!(!Error::from(types::Error::InvalidPermille).is_comm_fault());
    }

    #[test]
    fn display_carries_both_checksums() {
        let err = Error::from(CommFault::ChecksumMismatch {
            received: 0x99,
            expected: 0x33,
        });
        let text = err.to_string();
        assert!(text.contains("0x99"));
        assert!(text.contains("0x33"));
    }
}
