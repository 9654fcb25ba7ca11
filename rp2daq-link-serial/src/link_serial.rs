use std::{
    io::{Read, Write},
    time::{Duration, Instant},
};

use serialport::{DataBits, Parity, SerialPort, StopBits};

use rp2daq_core::link::{Link, LinkError};
use rp2daq_driver::{
    firmware::{FirmwareInfo, IDENTITY_LEN},
    protocol::{encode_command, schema::cmd},
};

use crate::error::SerialError;

/// Line speed hard-coded in the firmware's USB CDC port.
pub const BAUD_RATE: u32 = 460_800;

/// Serial transport options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialOption {
    /// Candidate port names tried in order by [`probe`].
    pub candidates: Vec<String>,
    /// Only accept the device with this serial; others are skipped.
    pub required_serial: Option<u64>,
    /// Per-candidate identify-handshake timeout.
    pub handshake_timeout: Duration,
    /// Read timeout of the opened port.
    pub read_timeout: Duration,
}

impl Default for SerialOption {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            required_serial: None,
            handshake_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(100),
        }
    }
}

#[cfg(unix)]
fn default_candidates() -> Vec<String> {
    (0..3).map(|i| format!("/dev/ttyACM{i}")).collect()
}

#[cfg(windows)]
fn default_candidates() -> Vec<String> {
    (0..6).map(|i| format!("COM{i}")).collect()
}

/// A [`Link`] over a local serial port.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    read_timeout: Duration,
}

impl SerialLink {
    /// Opens `name` with the instrument's fixed 8N1 framing.
    pub fn connect(name: &str, read_timeout: Duration) -> Result<Self, SerialError> {
        let port = serialport::new(name, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(read_timeout)
            .open()?;
        Ok(Self {
            port: Some(port),
            name: name.to_owned(),
            read_timeout,
        })
    }

    /// The port name this link talks through.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or_else(LinkError::closed)
    }
}

impl Link for SerialLink {
    fn open(&mut self) -> Result<(), LinkError> {
        if self.port.is_none() {
            let reopened = SerialLink::connect(&self.name, self.read_timeout)
                .map_err(LinkError::from)?;
            self.port = reopened.port;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        let _ = self.port.take();
        Ok(())
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkError> {
        let n = self
            .port()?
            .bytes_to_read()
            .map_err(|e| LinkError::new(e.to_string()))?;
        Ok(n as usize)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.port()?.read_exact(buf).map_err(|e| LinkError::io(&e))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port()?;
        port.write_all(bytes).map_err(|e| LinkError::io(&e))?;
        port.flush().map_err(|e| LinkError::io(&e))
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

/// Walks the candidate ports and returns the first that answers the
/// identify handshake.
///
/// A candidate that cannot be opened, times out, or answers with a bad tag
/// is skipped; running out of candidates yields
/// [`SerialError::NoDeviceFound`].
pub fn probe(option: SerialOption) -> Result<(SerialLink, FirmwareInfo), SerialError> {
    for name in &option.candidates {
        match try_candidate(name, &option) {
            Ok((link, info)) => {
                if option
                    .required_serial
                    .is_some_and(|required| required != info.serial())
                {
                    tracing::debug!(
                        "{}: serial {:016X} does not match, skipping.",
                        name,
                        info.serial()
                    );
                    continue;
                }
                tracing::info!("Found {} on {}.", info, name);
                return Ok((link, info));
            }
            Err(e) => {
                tracing::debug!("{}: {}", name, e);
            }
        }
    }
    Err(SerialError::NoDeviceFound)
}

fn try_candidate(name: &str, option: &SerialOption) -> Result<(SerialLink, FirmwareInfo), SerialError> {
    let mut link = SerialLink::connect(name, option.read_timeout)?;
    link.write_all(&encode_command(cmd::IDENTIFY, &[])?)
        .map_err(SerialError::Link)?;
    let block = read_identity(&mut link, option.handshake_timeout)?;
    let info = FirmwareInfo::parse(&block)?;
    Ok((link, info))
}

fn read_identity(
    link: &mut SerialLink,
    timeout: Duration,
) -> Result<[u8; IDENTITY_LEN], SerialError> {
    let deadline = Instant::now() + timeout;
    let mut block = [0u8; IDENTITY_LEN];
    let mut have = 0;
    while have < IDENTITY_LEN {
        let available = link.bytes_to_read().map_err(SerialError::Link)?;
        if available == 0 {
            if Instant::now() > deadline {
                return Err(SerialError::HandshakeTimeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        let n = available.min(IDENTITY_LEN - have);
        link.read_exact(&mut block[have..have + n])
            .map_err(SerialError::Link)?;
        have += n;
    }
    Ok(block)
}
