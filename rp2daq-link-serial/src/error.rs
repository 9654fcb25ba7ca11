use std::time::Duration;

use rp2daq_core::link::LinkError;
use rp2daq_driver::error::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SerialError {
    #[error("No rp2daq device was found")]
    NoDeviceFound,
    #[error("No identity block arrived within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("{0}")]
    Port(#[from] serialport::Error),
    #[error("{0}")]
    Link(#[from] LinkError),
    #[error("{0}")]
    Driver(#[from] DriverError),
}

impl From<SerialError> for LinkError {
    fn from(value: SerialError) -> LinkError {
        LinkError::new(value.to_string())
    }
}
