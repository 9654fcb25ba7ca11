//! The [`Device`] handle and its typed command surface.

mod params;

use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Mutex},
    time::Duration,
};

use rp2daq_core::{
    link::Link,
    sleep::{Sleep, StdSleeper},
};
use rp2daq_driver::{
    error::DriverError,
    protocol::{
        encode_command,
        schema::{cmd, report},
        Report,
    },
};

use crate::engine::Engine;
use crate::error::Rp2Error;

pub use params::{
    Approach, ApproachStatus, InitPwm, InitStepper, LineScan, ScanLine, StepperMove, StepperStatus,
    MINIMUM_POS, NANOSTEP_PER_MICROSTEP,
};

/// Runtime knobs of an open [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOption {
    /// Receiver idle-poll interval.
    pub poll_interval: Duration,
    /// Default rendezvous timeout of blocking commands.
    pub response_timeout: Duration,
    /// Poll cadence of [`Device::stepper_move`] in `wait` mode.
    pub move_poll_interval: Duration,
}

impl Default for DeviceOption {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            response_timeout: Duration::from_secs(1),
            move_poll_interval: Duration::from_millis(100),
        }
    }
}

/// A connected rp2daq instrument.
///
/// Commands that solicit a report either block on a per-report-type
/// rendezvous (with a mandatory timeout) or, when a persistent handler is
/// registered via [`Device::on_report`], return immediately and let the
/// worker thread deliver the report.
pub struct Device<L: Link> {
    link: Arc<Mutex<L>>,
    engine: Engine,
    option: DeviceOption,
}

impl<L: Link + 'static> Device<L> {
    /// Opens `link` and starts the background engine with default options.
    pub fn open(link: L) -> Result<Self, Rp2Error> {
        Self::open_with_option(link, DeviceOption::default())
    }

    /// Opens `link` and starts the background engine.
    pub fn open_with_option(link: L, option: DeviceOption) -> Result<Self, Rp2Error> {
        Self::open_with_sleeper(link, option, StdSleeper)
    }

    /// Opens `link` with a caller-chosen idle-wait sleeper.
    pub fn open_with_sleeper(
        mut link: L,
        option: DeviceOption,
        sleeper: impl Sleep + 'static,
    ) -> Result<Self, Rp2Error> {
        link.open().map_err(DriverError::from)?;
        let link = Arc::new(Mutex::new(link));
        let engine = Engine::start(link.clone(), sleeper, option.poll_interval);
        Ok(Self {
            link,
            engine,
            option,
        })
    }

    /// The shared link handle.
    #[must_use]
    pub fn link(&self) -> Arc<Mutex<L>> {
        self.link.clone()
    }

    /// Whether the background engine is still alive.
    ///
    /// After a fatal transport or protocol failure this turns false and
    /// every subsequent command fails with [`DriverError::EngineStopped`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Registers a persistent asynchronous handler for `ty` reports,
    /// replacing any previous binding.
    pub fn on_report(&self, ty: u8, handler: impl Fn(Report) + Send + Sync + 'static) {
        self.engine.dispatcher().register_handler(ty, Arc::new(handler));
    }

    /// Removes the handler (or stale binding) registered for `ty`.
    pub fn remove_handler(&self, ty: u8) {
        self.engine.dispatcher().unregister(ty);
    }

    /// Assigns pins and inertia to a stepper channel.
    pub fn init_stepper(&self, p: InitStepper) -> Result<(), Rp2Error> {
        self.write_command(
            cmd::INIT_STEPPER,
            &[
                p.motor_id.into(),
                p.dir_pin.into(),
                p.step_pin.into(),
                p.endswitch_pin.into(),
                p.disable_pin.into(),
                p.motor_inertia.into(),
            ],
        )?;
        Ok(())
    }

    /// Requests a state snapshot of one stepper channel.
    pub fn stepper_status(&self, motor_id: u8) -> Result<StepperStatus, Rp2Error> {
        let report = self.request(
            cmd::GET_STEPPER_STATUS,
            &[motor_id.into()],
            report::STEPPER_STATUS,
            self.option.response_timeout,
        )?;
        Ok(StepperStatus::from_report(&report))
    }

    /// Sets a new target position and speed for one stepper channel.
    ///
    /// The target is given in microsteps, clamped at [`MINIMUM_POS`] and
    /// scaled by [`NANOSTEP_PER_MICROSTEP`] on the wire. With `wait` set,
    /// polls [`Device::stepper_status`] until the move settles.
    pub fn stepper_move(&self, p: StepperMove) -> Result<(), Rp2Error> {
        let target = p.target_micropos.max(MINIMUM_POS);
        self.write_command(
            cmd::MOVE_STEPPER,
            &[
                p.motor_id.into(),
                target.saturating_mul(NANOSTEP_PER_MICROSTEP),
                p.nanospeed.into(),
                i64::from(p.endstop_override),
            ],
        )?;
        if p.wait {
            while self.stepper_status(p.motor_id)?.active {
                std::thread::sleep(self.option.move_poll_interval);
            }
        }
        Ok(())
    }

    /// Assigns a pin and base settings to a PWM channel.
    pub fn init_pwm(&self, p: InitPwm) -> Result<(), Rp2Error> {
        self.write_command(
            cmd::INIT_PWM,
            &[
                p.channel.into(),
                p.pin.into(),
                p.bit_resolution.into(),
                p.freq_hz.into(),
                p.init_value.into(),
            ],
        )?;
        Ok(())
    }

    /// Sets a PWM duty value.
    pub fn set_pwm(&self, channel: u8, value: i32) -> Result<(), Rp2Error> {
        self.write_command(cmd::SET_PWM, &[channel.into(), value.into()])?;
        Ok(())
    }

    /// Sets a piezo output.
    pub fn set_piezo(&self, channel: u8, value: i32) -> Result<(), Rp2Error> {
        self.write_command(cmd::SET_PIEZO, &[channel.into(), value.into()])?;
        Ok(())
    }

    /// Runs the tip approach routine and blocks until it finishes.
    pub fn approach(&self, p: Approach) -> Result<ApproachStatus, Rp2Error> {
        let report = self.request(
            cmd::APPROACH,
            &[p.nanospeed.into(), p.setpoint.into()],
            report::APPROACH_DONE,
            p.timeout,
        )?;
        Ok(ApproachStatus::from_report(&report))
    }

    /// Acquires one scan line and blocks for its samples.
    pub fn linescan(&self, p: LineScan) -> Result<ScanLine, Rp2Error> {
        let report = self.request(
            cmd::LINESCAN,
            &[p.line.into(), p.points.into(), p.nanospeed.into()],
            report::LINESCAN_DATA,
            p.timeout,
        )?;
        Ok(ScanLine::from_report(report))
    }

    /// Starts a scan line whose samples are delivered to `handler` by the
    /// worker thread, leaving the calling thread free.
    ///
    /// The handler stays registered for subsequent lines until
    /// [`Device::remove_handler`] is called for
    /// [`report::LINESCAN_DATA`].
    pub fn linescan_with_handler(
        &self,
        p: LineScan,
        handler: impl Fn(ScanLine) + Send + Sync + 'static,
    ) -> Result<(), Rp2Error> {
        self.on_report(report::LINESCAN_DATA, move |r| {
            handler(ScanLine::from_report(r));
        });
        self.write_command(
            cmd::LINESCAN,
            &[p.line.into(), p.points.into(), p.nanospeed.into()],
        )?;
        Ok(())
    }

    /// Requests the tip-voltage sample block of the scanning head.
    pub fn stm_status(&self) -> Result<Vec<u16>, Rp2Error> {
        let report = self.request(
            cmd::GET_STM_STATUS,
            &[],
            report::STM_STATUS,
            self.option.response_timeout,
        )?;
        Ok(report.into_samples())
    }

    /// Stops the engine, joins the background threads and closes the link.
    /// Idempotent.
    pub fn close(&mut self) -> Result<(), Rp2Error> {
        self.engine.stop();
        let mut link = self.link.lock().map_err(|_| DriverError::LinkClosed)?;
        if link.is_open() {
            link.close().map_err(DriverError::from)?;
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), DriverError> {
        if self.engine.is_running() {
            Ok(())
        } else {
            Err(DriverError::EngineStopped)
        }
    }

    fn write_command(&self, code: u8, operands: &[i64]) -> Result<(), DriverError> {
        self.ensure_running()?;
        let frame = encode_command(code, operands)?;
        let mut link = self.link.lock().map_err(|_| DriverError::LinkClosed)?;
        if !link.is_open() {
            return Err(DriverError::LinkClosed);
        }
        link.write_all(&frame)?;
        Ok(())
    }

    /// Issues a command and blocks on the rendezvous slot of `report_type`.
    fn request(
        &self,
        code: u8,
        operands: &[i64],
        report_type: u8,
        timeout: Duration,
    ) -> Result<Report, DriverError> {
        self.ensure_running()?;
        let (wait_id, slot) = self.engine.dispatcher().begin_sync_wait(report_type)?;
        if let Err(e) = self.write_command(code, operands) {
            self.engine.dispatcher().cancel_sync_wait(report_type, wait_id);
            return Err(e);
        }
        match slot.recv_timeout(timeout) {
            Ok(report) => Ok(report),
            Err(RecvTimeoutError::Timeout) => {
                // clear the stale binding: a late report is then unsolicited
                self.engine.dispatcher().cancel_sync_wait(report_type, wait_id);
                Err(DriverError::ResponseTimeout(report_type, timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::EngineStopped),
        }
    }
}

impl<L: Link> Drop for Device<L> {
    fn drop(&mut self) {
        self.engine.stop();
        if let Ok(mut link) = self.link.lock() {
            if link.is_open() {
                let _ = link.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        time::{Duration, Instant},
    };

    use rp2daq_driver::protocol::encode_report;

    use crate::link::emulator::{Emulator, EmulatorOption};

    use super::*;

    fn test_option() -> DeviceOption {
        DeviceOption {
            poll_interval: Duration::from_micros(200),
            response_timeout: Duration::from_millis(500),
            move_poll_interval: Duration::from_millis(2),
        }
    }

    fn create_device(option: EmulatorOption) -> Device<Emulator> {
        Device::open_with_option(Emulator::new(option), test_option()).unwrap()
    }

    fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn stepper_status_roundtrip() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        device.init_stepper(InitStepper {
            motor_id: 1,
            dir_pin: 4,
            step_pin: 5,
            endswitch_pin: 6,
            disable_pin: 7,
            ..Default::default()
        })?;

        let status = device.stepper_status(1)?;
        assert_eq!(
            StepperStatus {
                active: false,
                endswitch: false,
                nanopos: 0,
            },
            status
        );
        Ok(())
    }

    #[test]
    fn stepper_move_scales_and_waits_until_settled() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption {
            move_settle_polls: 3,
            ..Default::default()
        });
        device.stepper_move(StepperMove {
            motor_id: 2,
            target_micropos: 1000,
            wait: true,
            ..Default::default()
        })?;

        let status = device.stepper_status(2)?;
        assert!(!status.active);
        assert_eq!(1000 * NANOSTEP_PER_MICROSTEP as i32, status.nanopos);
        Ok(())
    }

    #[test]
    fn stepper_move_clamps_the_target() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        device.stepper_move(StepperMove {
            motor_id: 0,
            target_micropos: MINIMUM_POS - 12345,
            ..Default::default()
        })?;

        wait_until("the move command to land", || {
            device
                .link()
                .lock()
                .unwrap()
                .stepper_nanopos(0)
                .is_some()
        });
        assert_eq!(
            Some(MINIMUM_POS * NANOSTEP_PER_MICROSTEP),
            device.link().lock().unwrap().stepper_nanopos(0)
        );
        Ok(())
    }

    #[test]
    fn pwm_and_piezo_land_in_the_instrument() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        device.init_pwm(InitPwm::default())?;
        device.set_pwm(1, 32000)?;
        device.set_piezo(3, -1500)?;

        let link = device.link();
        let link = link.lock().unwrap();
        assert_eq!(Some(32000), link.pwm_value(1));
        assert_eq!(Some(-1500), link.piezo_value(3));
        Ok(())
    }

    #[test]
    fn linescan_blocks_for_its_samples() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        let scan = device.linescan(LineScan {
            line: 3,
            points: 128,
            ..Default::default()
        })?;
        assert_eq!(3, scan.line);
        assert_eq!(Emulator::scan_samples(3, 128), scan.samples);
        Ok(())
    }

    #[test]
    fn linescan_odd_point_count_repeats_the_last_pair_head() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        let scan = device.linescan(LineScan {
            line: 0,
            points: 5,
            ..Default::default()
        })?;

        // the 12-bit wire format carries odd counts as two complete groups
        // plus a truncated one; the decoder fills the last slot with the
        // preceding first-of-pair sample
        let mut expect = Emulator::scan_samples(0, 5);
        expect[4] = expect[2];
        assert_eq!(expect, scan.samples);
        Ok(())
    }

    #[test]
    fn stm_status_returns_the_sample_block() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption {
            stm_points: 2000,
            ..Default::default()
        });
        assert_eq!(Emulator::stm_samples(2000), device.stm_status()?);
        Ok(())
    }

    #[test]
    fn approach_reports_convergence() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        let status = device.approach(Approach {
            setpoint: 800,
            ..Default::default()
        })?;
        assert_eq!(
            ApproachStatus {
                converged: true,
                zpos: 800,
            },
            status
        );
        Ok(())
    }

    #[test]
    fn handler_sees_lines_in_arrival_order() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            device.on_report(report::LINESCAN_DATA, move |r| {
                seen.lock().unwrap().push(r.field("line").unwrap_or(-1));
            });
        }

        for line in 0..5 {
            device.write_command(cmd::LINESCAN, &[line, 8, 256])?;
        }

        wait_until("all five lines to arrive", || seen.lock().unwrap().len() == 5);
        assert_eq!(vec![0, 1, 2, 3, 4], *seen.lock().unwrap());
        Ok(())
    }

    #[test]
    fn unsolicited_reports_are_dropped_without_stopping_the_engine() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        let stray = encode_report(report::STEPPER_STATUS, &[0, 0, 77], None)?;
        device.link().lock().unwrap().inject(&stray);

        // let the stray drain through the receiver and the dispatcher
        // before arming any rendezvous
        wait_until("the stray report to be read", || {
            device.link().lock().unwrap().bytes_to_read() == Ok(0)
        });
        std::thread::sleep(Duration::from_millis(20));

        // a later solicited request still works, so the stray bytes were
        // consumed, not left to shift the framing
        let status = device.stepper_status(9)?;
        assert_eq!(0, status.nanopos);
        assert!(device.is_running());
        Ok(())
    }

    #[test]
    fn transport_failure_mid_header_stops_the_engine() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        {
            let link = device.link();
            let mut link = link.lock().unwrap();
            link.inject(&[0x03, 0x01]); // first bytes of a stepper_status header
            link.break_down();
        }

        wait_until("the engine to stop", || !device.is_running());
        assert_eq!(
            Err(Rp2Error::Driver(DriverError::EngineStopped)),
            device.stepper_status(0)
        );
        Ok(())
    }

    #[test]
    fn unknown_report_type_stops_the_engine() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        device.link().lock().unwrap().inject(&[0xEE]);

        wait_until("the engine to stop", || !device.is_running());
        assert_eq!(
            Err(Rp2Error::Driver(DriverError::EngineStopped)),
            device.set_pwm(1, 0)
        );
        Ok(())
    }

    #[test]
    fn missing_reply_times_out_instead_of_hanging() {
        let device = create_device(EmulatorOption {
            mute: true,
            ..Default::default()
        });
        let started = Instant::now();
        assert_eq!(
            Err(Rp2Error::Driver(DriverError::ResponseTimeout(
                report::STEPPER_STATUS,
                test_option().response_timeout,
            ))),
            device.stepper_status(0)
        );
        assert!(started.elapsed() >= test_option().response_timeout);
        // the stale binding was cleared: the next request arms cleanly
        assert!(device.stepper_status(0).is_err());
    }

    #[test]
    fn sync_wait_is_rejected_while_a_handler_is_bound() -> anyhow::Result<()> {
        let device = create_device(EmulatorOption::default());
        device.on_report(report::STEPPER_STATUS, |_| {});
        assert_eq!(
            Err(Rp2Error::Driver(DriverError::SyncWaitInProgress(
                report::STEPPER_STATUS
            ))),
            device.stepper_status(0).map(|_| ())
        );

        device.remove_handler(report::STEPPER_STATUS);
        assert!(device.stepper_status(0).is_ok());
        Ok(())
    }

    #[test]
    fn shutdown_unparks_a_blocked_caller() -> anyhow::Result<()> {
        let device = Arc::new(create_device(EmulatorOption {
            mute: true,
            ..Default::default()
        }));

        let waiter = {
            let device = device.clone();
            std::thread::spawn(move || {
                device.approach(Approach {
                    timeout: Duration::from_secs(30),
                    ..Default::default()
                })
            })
        };

        // let the waiter park, then kill the transport
        std::thread::sleep(Duration::from_millis(20));
        device.link().lock().unwrap().break_down();

        let result = waiter.join().expect("waiter thread must not panic");
        assert_eq!(Err(Rp2Error::Driver(DriverError::EngineStopped)), result);
        Ok(())
    }

    #[test]
    fn close_is_idempotent_and_kills_later_commands() -> anyhow::Result<()> {
        let mut device = create_device(EmulatorOption::default());
        device.close()?;
        device.close()?;
        assert_eq!(
            Err(Rp2Error::Driver(DriverError::EngineStopped)),
            device.set_pwm(1, 1)
        );
        Ok(())
    }
}
