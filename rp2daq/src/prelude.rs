//! Commonly used items.

pub use crate::{
    device::{
        Approach, ApproachStatus, Device, DeviceOption, InitPwm, InitStepper, LineScan, ScanLine,
        StepperMove, StepperStatus,
    },
    error::Rp2Error,
    link::emulator::{Emulator, EmulatorOption},
};
pub use rp2daq_core::{
    link::{Link, LinkError},
    sleep::{SpinSleeper, SpinWaitSleeper, StdSleeper},
};
pub use rp2daq_driver::{error::DriverError, firmware::FirmwareInfo, protocol::Report};
