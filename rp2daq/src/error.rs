use rp2daq_core::link::LinkError;
use rp2daq_driver::error::DriverError;
use thiserror::Error;

/// Top-level error of the rp2daq runtime.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum Rp2Error {
    /// Error in the driver.
    #[error("{0}")]
    Driver(#[from] DriverError),
}

impl From<LinkError> for Rp2Error {
    fn from(e: LinkError) -> Self {
        Rp2Error::Driver(DriverError::Link(e))
    }
}
