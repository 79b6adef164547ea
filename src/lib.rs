//! Driver for RF power supplies speaking a fixed-frame master/slave
//! request-response protocol over an asynchronous serial link.
//!
//! Every transaction is one 5-octet request frame answered by one 5-octet
//! response frame, both carrying a checksum over the leading four octets.
//! The checksum algorithm and the opcode numbering differ between the two
//! firmware revisions in the field; both are supported through the
//! [`Revision`] parameter.
//!
//! The serial line runs at 9600 baud, 8 data bits, no parity, 1 stop bit,
//! with a 1 second read/write timeout by default.
//!
//! The entry point is [`Psu`]: construct it with a port identifier, then
//! either drive `open`/`close` yourself or use
//! [`run_session`](Psu::run_session), which switches RF off and closes the
//! port on the way out unless the session died of a communication fault.

pub mod frame;
pub mod psu;
pub mod transport;
pub mod types;

mod error;

pub use error::{CommFault, Error};
pub use frame::{Frame, Op, Revision, FRAME_LEN};
pub use psu::{Psu, Response};
pub use transport::{Connect, SerialConfig, SerialConnector, Session};
pub use types::{
    permille, ActiveMode, ControlMode, IntoPermille, Permille, RemoteSource, SetpointSource,
    Status,
};
