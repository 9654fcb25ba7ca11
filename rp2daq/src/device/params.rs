use std::time::Duration;

use rp2daq_driver::protocol::Report;

/// Nanosteps per microstep of the stepper driver.
pub const NANOSTEP_PER_MICROSTEP: i64 = 256;

/// Lowest addressable microstep position; move targets below it are
/// clamped.
pub const MINIMUM_POS: i64 = -(1 << 22);

/// Parameters of [`Device::init_stepper`](crate::Device::init_stepper).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStepper {
    /// Stepper channel to configure.
    pub motor_id: u8,
    /// Direction output pin.
    pub dir_pin: u8,
    /// Step pulse output pin.
    pub step_pin: u8,
    /// End-switch input pin.
    pub endswitch_pin: u8,
    /// Driver-disable output pin.
    pub disable_pin: u8,
    /// Acceleration limit; larger is more sluggish.
    pub motor_inertia: i32,
}

impl Default for InitStepper {
    fn default() -> Self {
        Self {
            motor_id: 0,
            dir_pin: 0,
            step_pin: 0,
            endswitch_pin: 0,
            disable_pin: 0,
            motor_inertia: 128,
        }
    }
}

/// Parameters of [`Device::stepper_move`](crate::Device::stepper_move).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperMove {
    /// Stepper channel to move.
    pub motor_id: u8,
    /// Target position in microsteps.
    pub target_micropos: i64,
    /// Speed limit in nanosteps per control tick.
    pub nanospeed: i32,
    /// Keep moving even when the end switch is asserted.
    pub endstop_override: bool,
    /// Poll the stepper until the move settles before returning.
    pub wait: bool,
}

impl Default for StepperMove {
    fn default() -> Self {
        Self {
            motor_id: 0,
            target_micropos: 0,
            nanospeed: 256,
            endstop_override: false,
            wait: false,
        }
    }
}

/// Parameters of [`Device::init_pwm`](crate::Device::init_pwm).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitPwm {
    /// PWM channel to configure.
    pub channel: u8,
    /// Output pin.
    pub pin: u8,
    /// Counter resolution in bits.
    pub bit_resolution: u8,
    /// Base frequency in Hz.
    pub freq_hz: i32,
    /// Initial duty value.
    pub init_value: i32,
}

impl Default for InitPwm {
    fn default() -> Self {
        Self {
            channel: 1,
            pin: 19,
            bit_resolution: 16,
            freq_hz: 100,
            init_value: 6654,
        }
    }
}

/// Parameters of [`Device::approach`](crate::Device::approach).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Approach {
    /// Coarse-approach speed in nanosteps per control tick.
    pub nanospeed: i32,
    /// Tip-current setpoint terminating the approach.
    pub setpoint: u16,
    /// Rendezvous timeout; the approach routine can run for minutes.
    pub timeout: Duration,
}

impl Default for Approach {
    fn default() -> Self {
        Self {
            nanospeed: 256,
            setpoint: 0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Parameters of [`Device::linescan`](crate::Device::linescan).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineScan {
    /// Index of the scan line.
    pub line: u16,
    /// Number of samples to acquire along the line.
    pub points: u16,
    /// Scan speed in nanosteps per control tick.
    pub nanospeed: i32,
    /// Rendezvous timeout of the blocking variant.
    pub timeout: Duration,
}

impl Default for LineScan {
    fn default() -> Self {
        Self {
            line: 0,
            points: 256,
            nanospeed: 256,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Stepper state decoded from a `stepper_status` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperStatus {
    /// The motor has not reached its target yet.
    pub active: bool,
    /// The end switch is asserted.
    pub endswitch: bool,
    /// Current position in nanosteps.
    pub nanopos: i32,
}

impl StepperStatus {
    pub(crate) fn from_report(report: &Report) -> Self {
        Self {
            active: report.field("active").unwrap_or(0) != 0,
            endswitch: report.field("endswitch").unwrap_or(0) != 0,
            nanopos: report.field("nanopos").unwrap_or(0) as i32,
        }
    }
}

/// Result of a tip approach, decoded from an `approach_done` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproachStatus {
    /// The setpoint was reached.
    pub converged: bool,
    /// Final z position in nanosteps.
    pub zpos: i32,
}

impl ApproachStatus {
    pub(crate) fn from_report(report: &Report) -> Self {
        Self {
            converged: report.field("converged").unwrap_or(0) != 0,
            zpos: report.field("zpos").unwrap_or(0) as i32,
        }
    }
}

/// One line of scan samples, decoded from a `linescan_data` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLine {
    /// Index of the scanned line.
    pub line: u16,
    /// Acquired samples.
    pub samples: Vec<u16>,
}

impl ScanLine {
    pub(crate) fn from_report(report: Report) -> Self {
        Self {
            line: report.field("line").unwrap_or(0) as u16,
            samples: report.into_samples(),
        }
    }
}
