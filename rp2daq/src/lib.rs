//! Host-side runtime for rp2daq instruments.
//!
//! An rp2daq instrument (stepper motors, PWM outputs, a scanning-probe
//! line-scan head) talks to the host over a raw byte stream. This crate
//! runs the receive side in background threads — framing, payload decoding
//! and report dispatch — and exposes a [`Device`] handle whose commands
//! either block for their reply report or deliver it to a registered
//! callback.

pub mod device;
pub mod engine;
pub mod error;
pub mod link;
pub mod prelude;

pub use device::Device;
pub use rp2daq_driver as driver;
