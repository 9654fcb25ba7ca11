//! Serial-port link and device discovery for rp2daq instruments.
//!
//! [`probe`] walks a candidate port list, runs the identify handshake on
//! each, and hands back the first [`SerialLink`] that answers with a valid
//! identity block, ready to be passed to the runtime.

mod error;
mod link_serial;

pub use error::SerialError;
pub use link_serial::{probe, SerialLink, SerialOption, BAUD_RATE};
