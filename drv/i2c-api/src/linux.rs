// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Linux `i2c-dev` backend
//!
//! Every transaction is issued as a single `I2C_RDWR` ioctl, which carries
//! the target address in each message.  This means we never need to bind the
//! file descriptor to an address with `I2C_SLAVE`, and can talk to devices
//! that already have a kernel driver bound to them.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use log::trace;

use crate::{I2cBus, ResponseCode};

/// From `<linux/i2c-dev.h>`
const I2C_RDWR: libc::c_ulong = 0x0707;

/// From `<linux/i2c.h>`: this message is a read
const I2C_M_RD: u16 = 0x0001;

#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

/// An I2C bus exposed as `/dev/i2c-N`.
pub struct LinuxI2c {
    file: File,
    path: PathBuf,
}

impl LinuxI2c {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self { file, path })
    }

    /// Opens the character device for numbered bus `bus`.
    pub fn open_bus(bus: u8) -> io::Result<Self> {
        Self::open(format!("/dev/i2c-{bus}"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn transfer(&mut self, msgs: &mut [I2cMsg]) -> Result<(), ResponseCode> {
        let mut data = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        // SAFETY: `data` points at `msgs`, each of which points at a live
        // buffer of exactly `len` bytes; all of them outlive the call.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_RDWR as _,
                &mut data as *mut I2cRdwrIoctlData,
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            trace!("{}: I2C_RDWR failed: {err}", self.path.display());
            return Err(errno_to_code(err.raw_os_error()));
        }

        Ok(())
    }
}

fn msg(
    address: u8,
    flags: u16,
    buf: *mut u8,
    len: usize,
) -> Result<I2cMsg, ResponseCode> {
    let len = u16::try_from(len).map_err(|_| ResponseCode::BadArg)?;
    Ok(I2cMsg {
        addr: address as u16,
        flags,
        len,
        buf,
    })
}

fn errno_to_code(errno: Option<i32>) -> ResponseCode {
    match errno {
        Some(libc::ENXIO) | Some(libc::EREMOTEIO) => ResponseCode::NoDevice,
        Some(libc::ETIMEDOUT) => ResponseCode::BusLocked,
        Some(libc::EAGAIN) | Some(libc::EBUSY) => ResponseCode::ControllerBusy,
        Some(libc::EINVAL) => ResponseCode::BadArg,
        Some(libc::EOPNOTSUPP) => ResponseCode::OperationNotSupported,
        Some(libc::EIO) | Some(libc::EPROTO) => ResponseCode::BusError,
        _ => ResponseCode::BadResponse,
    }
}

impl I2cBus for LinuxI2c {
    fn write(&mut self, address: u8, buf: &[u8]) -> Result<(), ResponseCode> {
        // The kernel does not write through a write message's buffer, so
        // casting away const here is sound.
        let mut msgs = [msg(address, 0, buf.as_ptr() as *mut u8, buf.len())?];
        self.transfer(&mut msgs)
    }

    fn read(
        &mut self,
        address: u8,
        buf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        let mut msgs = [msg(address, I2C_M_RD, buf.as_mut_ptr(), buf.len())?];
        self.transfer(&mut msgs)
    }

    fn write_read(
        &mut self,
        address: u8,
        wbuf: &[u8],
        rbuf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        let mut msgs = [
            msg(address, 0, wbuf.as_ptr() as *mut u8, wbuf.len())?,
            msg(address, I2C_M_RD, rbuf.as_mut_ptr(), rbuf.len())?,
        ];
        self.transfer(&mut msgs)
    }
}
