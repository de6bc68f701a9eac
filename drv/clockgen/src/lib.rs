// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drivers for loading and identifying clock generator designs
//!
//! Two families of clock generator are handled:
//!
//! - *Streaming* devices ([`si5518`]) take their design as a stream of host
//!   load commands through a single command/reply register, with explicit
//!   flow control.  They can tell us what they are running.
//! - *Image-store* devices keep their boot design in an EEPROM ([`eeprom`])
//!   and take runtime changes as a register script ([`script`]).  They
//!   cannot tell us what they are running, so we work it out by comparing
//!   the EEPROM against known images ([`discovery`]).
//!
//! [`ops`] ties these together into the operations a user asks for.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clock_files::{FileError, FormatError};
use drv_i2c_api::ResponseCode;

pub mod discovery;
pub mod eeprom;
pub mod ops;
pub mod script;
pub mod si5518;

#[cfg(test)]
mod sim;

/// Delays and retry bounds used when talking to a device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    /// How many times to read the status byte before giving up
    pub poll_attempts: u32,
    /// Delay before each status byte read
    pub poll_interval: Duration,
    /// Delay after each EEPROM window write
    pub settle: Duration,
    /// Delay for a script's delay marker.  `None` leaves delay markers inert.
    pub script_delay: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_attempts: 50,
            poll_interval: Duration::from_millis(10),
            settle: Duration::from_millis(10),
            script_delay: None,
        }
    }
}

pub(crate) fn sleep(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}

#[derive(Debug)]
pub enum ClockError {
    /// A bus operation failed
    Transport(ResponseCode),
    /// The device never reported itself ready for the next command
    ProtocolTimeout { attempts: u32 },
    /// The device reported a command buffer too small to carry a load
    BadBufferSize(u16),
    /// The files for a design could not be found
    CandidateNotFound { design: String, missing: Vec<String> },
    /// A design file could not be used
    MalformedImage { path: PathBuf, error: FormatError },
    /// An image does not fit in the device's address space
    ImageTooLarge { len: usize },
    /// No known design matches what is on the device
    UnidentifiedConfiguration { clock: String },
    /// Read-back of a programmed image did not match
    VerifyMismatch { offset: usize, expected: u8, found: u8 },
    /// The operation makes no sense for this kind of device
    Unsupported { chip: String, command: &'static str },
    /// The filesystem refused us
    Io { path: PathBuf, error: io::Error },
}

impl From<ResponseCode> for ClockError {
    fn from(code: ResponseCode) -> Self {
        ClockError::Transport(code)
    }
}

impl From<FileError> for ClockError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound { design, missing } => {
                ClockError::CandidateNotFound { design, missing }
            }
            FileError::Malformed { path, error } => {
                ClockError::MalformedImage { path, error }
            }
            FileError::Io { path, error } => ClockError::Io { path, error },
        }
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::Transport(code) => write!(f, "I2C failure: {code}"),
            ClockError::ProtocolTimeout { attempts } => write!(
                f,
                "clock not ready within {attempts} polling attempts"
            ),
            ClockError::BadBufferSize(size) => {
                write!(f, "device reported unusable command buffer size {size}")
            }
            ClockError::CandidateNotFound { design, missing } => {
                write!(f, "failed to find design clock file '{design}'")?;
                if !missing.is_empty() {
                    write!(f, " (missing {})", missing.join(", "))?;
                }
                Ok(())
            }
            ClockError::MalformedImage { path, error } => {
                write!(f, "{}: {error}", path.display())
            }
            ClockError::ImageTooLarge { len } => {
                write!(f, "image of {len} bytes exceeds device address space")
            }
            ClockError::UnidentifiedConfiguration { clock } => {
                write!(f, "could not identify the design for clock '{clock}'")
            }
            ClockError::VerifyMismatch {
                offset,
                expected,
                found,
            } => write!(
                f,
                "data mismatch at {offset:#07x}, got {found:#04x} \
                expected {expected:#04x}"
            ),
            ClockError::Unsupported { chip, command } => {
                write!(f, "command not supported for {chip}: {command}")
            }
            ClockError::Io { path, error } => {
                write!(f, "{}: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for ClockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClockError::Transport(code) => Some(code),
            ClockError::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}
