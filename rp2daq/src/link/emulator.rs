//! An in-process instrument emulator.
//!
//! [`Emulator`] stands in for a connected instrument: written command
//! frames are decoded against the same schema tables the host encodes with,
//! a small amount of stepper/PWM/piezo state is kept, and reply reports are
//! queued as wire bytes for the host to read back. Tests use it to drive
//! the whole engine without hardware.

use std::collections::{HashMap, VecDeque};

use rp2daq_core::link::{Link, LinkError};
use rp2daq_driver::{
    firmware::FirmwareInfo,
    protocol::{
        decode_next_command, encode_report,
        schema::{cmd, report},
        SampleWidth,
    },
};

/// Options of the emulated instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorOption {
    /// Identity returned for the identify command.
    pub firmware: FirmwareInfo,
    /// Status polls a move stays `active` before settling.
    pub move_settle_polls: u8,
    /// Sample count of an STM status block.
    pub stm_points: u16,
    /// Swallow commands that would queue a reply.
    pub mute: bool,
}

impl Default for EmulatorOption {
    fn default() -> Self {
        Self {
            firmware: FirmwareInfo::new(0x0103, 0x00C0_FFEE_0000_2A2A),
            move_settle_polls: 2,
            stm_points: 64,
            mute: false,
        }
    }
}

#[derive(Default)]
struct StepperState {
    nanopos: i64,
    endswitch: bool,
    active_polls: u8,
}

/// An emulated rp2daq instrument behind the [`Link`] trait.
pub struct Emulator {
    option: EmulatorOption,
    is_open: bool,
    broken: bool,
    rx: VecDeque<u8>,
    pending: VecDeque<u8>,
    steppers: HashMap<u8, StepperState>,
    pwm: HashMap<u8, i32>,
    piezo: HashMap<u8, i32>,
}

impl Emulator {
    /// Creates an emulated instrument.
    #[must_use]
    pub fn new(option: EmulatorOption) -> Self {
        Self {
            option,
            is_open: false,
            broken: false,
            rx: VecDeque::new(),
            pending: VecDeque::new(),
            steppers: HashMap::new(),
            pwm: HashMap::new(),
            piezo: HashMap::new(),
        }
    }

    /// Makes every subsequent link operation fail, as a torn-out cable
    /// would.
    pub fn break_down(&mut self) {
        self.broken = true;
    }

    /// Undoes [`Emulator::break_down`].
    pub fn repair(&mut self) {
        self.broken = false;
    }

    /// Queues raw bytes as if the instrument had sent them.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Last value written to a PWM channel.
    #[must_use]
    pub fn pwm_value(&self, channel: u8) -> Option<i32> {
        self.pwm.get(&channel).copied()
    }

    /// Last value written to a piezo channel.
    #[must_use]
    pub fn piezo_value(&self, channel: u8) -> Option<i32> {
        self.piezo.get(&channel).copied()
    }

    /// Current nanostep position of a stepper channel.
    #[must_use]
    pub fn stepper_nanopos(&self, motor_id: u8) -> Option<i64> {
        self.steppers.get(&motor_id).map(|s| s.nanopos)
    }

    /// The deterministic sample ramp of one scan line.
    #[must_use]
    pub fn scan_samples(line: u16, points: u16) -> Vec<u16> {
        (0..points)
            .map(|i| ((u32::from(line) * 131 + u32::from(i) * 7) & 0x0FFF) as u16)
            .collect()
    }

    /// The deterministic tip-voltage ramp of an STM status block.
    #[must_use]
    pub fn stm_samples(points: u16) -> Vec<u16> {
        (0..points).map(|i| i.wrapping_mul(37)).collect()
    }

    fn process_pending(&mut self) -> Result<(), LinkError> {
        loop {
            match decode_next_command(&mut self.pending) {
                Ok(Some((code, operands))) => self.exec(code, &operands),
                Ok(None) => return Ok(()),
                Err(e) => return Err(LinkError::new(format!("emulated firmware: {e}"))),
            }
        }
    }

    fn exec(&mut self, code: u8, operands: &[i64]) {
        match code {
            cmd::IDENTIFY => {
                if !self.option.mute {
                    self.rx.extend(self.option.firmware.to_block());
                }
            }
            cmd::INIT_STEPPER => {
                self.steppers
                    .insert(operands[0] as u8, StepperState::default());
            }
            cmd::MOVE_STEPPER => {
                let motor = self.steppers.entry(operands[0] as u8).or_default();
                motor.nanopos = operands[1];
                motor.active_polls = self.option.move_settle_polls;
            }
            cmd::GET_STEPPER_STATUS => {
                let motor = self.steppers.entry(operands[0] as u8).or_default();
                let active = motor.active_polls > 0;
                motor.active_polls = motor.active_polls.saturating_sub(1);
                let reply = encode_report(
                    report::STEPPER_STATUS,
                    &[i64::from(active), i64::from(motor.endswitch), motor.nanopos],
                    None,
                );
                self.queue_reply(reply);
            }
            cmd::GET_STM_STATUS => {
                let samples = Self::stm_samples(self.option.stm_points);
                let reply = encode_report(
                    report::STM_STATUS,
                    &[],
                    Some((SampleWidth::W16, &samples)),
                );
                self.queue_reply(reply);
            }
            cmd::LINESCAN => {
                let (line, points) = (operands[0] as u16, operands[1] as u16);
                let samples = Self::scan_samples(line, points);
                let reply = encode_report(
                    report::LINESCAN_DATA,
                    &[i64::from(line)],
                    Some((SampleWidth::W12, &samples)),
                );
                self.queue_reply(reply);
            }
            cmd::APPROACH => {
                let reply = encode_report(report::APPROACH_DONE, &[1, operands[1]], None);
                self.queue_reply(reply);
            }
            cmd::INIT_PWM => {
                self.pwm.insert(operands[0] as u8, operands[4] as i32);
            }
            cmd::SET_PWM => {
                self.pwm.insert(operands[0] as u8, operands[1] as i32);
            }
            cmd::SET_PIEZO => {
                self.piezo.insert(operands[0] as u8, operands[1] as i32);
            }
            other => tracing::debug!("emulator ignores command {other:#04X}"),
        }
    }

    fn queue_reply(&mut self, reply: Result<Vec<u8>, rp2daq_driver::error::DriverError>) {
        if self.option.mute {
            return;
        }
        match reply {
            Ok(frame) => self.rx.extend(frame),
            Err(e) => tracing::error!("emulator failed to encode a reply: {e}"),
        }
    }

    fn check(&self) -> Result<(), LinkError> {
        if self.broken {
            return Err(LinkError::new("broken"));
        }
        if !self.is_open {
            return Err(LinkError::closed());
        }
        Ok(())
    }
}

impl Link for Emulator {
    fn open(&mut self) -> Result<(), LinkError> {
        if self.broken {
            return Err(LinkError::new("broken"));
        }
        self.is_open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.is_open = false;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkError> {
        self.check()?;
        Ok(self.rx.len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.check()?;
        if self.rx.len() < buf.len() {
            return Err(LinkError::new("read past the end of the emulated stream"));
        }
        for slot in buf.iter_mut() {
            *slot = self.rx.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.check()?;
        self.pending.extend(bytes);
        self.process_pending()
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
