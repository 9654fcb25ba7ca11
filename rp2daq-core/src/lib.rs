#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

//! Core traits and types for the rp2daq host runtime.

/// A byte-stream interface to the instrument.
pub mod link;
/// Sleep abstractions used for idle-waiting.
pub mod sleep;
