// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client API for I2C devices on a host bus
//!
//! This API allows for access to I2C devices from a host process.  The bus
//! itself is abstracted behind the [`I2cBus`] trait: every operation is a
//! blocking call that either completes or fails with a [`ResponseCode`].
//! Device drivers talk to a bus through an [`I2cDevice`], which binds a bus
//! to a single 7-bit address.
//!
//! # Transactions
//!
//! Three kinds of transaction are supported:
//!
//! - A plain write of a buffer.
//! - A plain read into a buffer, *without* a preceding write.  Devices that
//!   speak a command/reply protocol on a single register (rather than
//!   exposing addressable registers) are read this way.
//! - A write followed by a read, performed as a single transaction with a
//!   repeated start.  This is the usual way to read an addressed register or
//!   memory offset.
//!

use std::fmt;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::LinuxI2c;

/// The response code returned from a failed bus operation.  These response
/// codes are fairly specific, not because the caller is expected to
/// necessarily handle them differently, but to give upstack software some
/// modicum of context surrounding the error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResponseCode {
    /// Bad response from the bus driver
    BadResponse,
    /// Bad argument sent to the bus driver
    BadArg,
    /// The device address was NACKed, implying that it is missing,
    /// unreachable, or not responding.
    NoDevice,
    /// The device address is reserved per the I2C standard.
    ReservedAddress,
    /// A byte written to the device was NACKed, which may indicate an
    /// invalid parameter, end of received data, etc.
    NoRegister,
    /// I2C bus locked up (or timed out) during the transaction
    BusLocked,
    /// I2C controller appeared to be busy
    ControllerBusy,
    /// I2C bus error
    BusError,
    /// Requested operation is not supported by the bus driver
    OperationNotSupported,
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseCode::BadResponse => "bad response from bus driver",
            ResponseCode::BadArg => "bad argument",
            ResponseCode::NoDevice => "device did not respond",
            ResponseCode::ReservedAddress => "reserved address",
            ResponseCode::NoRegister => "byte NACKed by device",
            ResponseCode::BusLocked => "bus locked up",
            ResponseCode::ControllerBusy => "controller busy",
            ResponseCode::BusError => "bus error",
            ResponseCode::OperationNotSupported => "operation not supported",
        };
        f.write_str(s)
    }
}

impl std::error::Error for ResponseCode {}

/// Addresses set aside by the I2C specification.  None of these may be
/// assigned to a device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::unusual_byte_groupings)]
pub enum ReservedAddress {
    GeneralCall = 0b0000_000,
    CBUSAddress = 0b0000_001,
    FutureBus = 0b0000_010,
    FuturePurposes = 0b0000_011,
    HighSpeedReserved00 = 0b0000_100,
    HighSpeedReserved01 = 0b0000_101,
    HighSpeedReserved10 = 0b0000_110,
    HighSpeedReserved11 = 0b0000_111,
    TenBit00 = 0b1111_100,
    TenBit01 = 0b1111_101,
    TenBit10 = 0b1111_110,
    TenBit11 = 0b1111_111,
}

impl ReservedAddress {
    pub fn from_u8(address: u8) -> Option<Self> {
        use ReservedAddress::*;

        Some(match address {
            0b0000_000 => GeneralCall,
            0b0000_001 => CBUSAddress,
            0b0000_010 => FutureBus,
            0b0000_011 => FuturePurposes,
            0b0000_100 => HighSpeedReserved00,
            0b0000_101 => HighSpeedReserved01,
            0b0000_110 => HighSpeedReserved10,
            0b0000_111 => HighSpeedReserved11,
            0b1111_100 => TenBit00,
            0b1111_101 => TenBit01,
            0b1111_110 => TenBit10,
            0b1111_111 => TenBit11,
            _ => return None,
        })
    }
}

///
/// Checks that `address` is a 7-bit address that may be assigned to a
/// device.
///
pub fn validate_address(address: u8) -> Result<(), ResponseCode> {
    if address > 0x7f {
        return Err(ResponseCode::BadArg);
    }

    match ReservedAddress::from_u8(address) {
        Some(_) => Err(ResponseCode::ReservedAddress),
        None => Ok(()),
    }
}

/// A blocking, byte-level I2C bus.
///
/// Implementations perform each call as a complete transaction and do not
/// retry on failure; retry policy (where there is any) belongs to the
/// protocol layered on top.
pub trait I2cBus {
    /// Writes `buf` to the device at `address`.
    fn write(&mut self, address: u8, buf: &[u8]) -> Result<(), ResponseCode>;

    /// Reads `buf.len()` bytes from the device at `address` without first
    /// doing a write.
    fn read(&mut self, address: u8, buf: &mut [u8])
        -> Result<(), ResponseCode>;

    /// Writes `wbuf` and then reads `rbuf.len()` bytes, with a repeated
    /// start between the two.
    fn write_read(
        &mut self,
        address: u8,
        wbuf: &[u8],
        rbuf: &mut [u8],
    ) -> Result<(), ResponseCode>;
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn write(&mut self, address: u8, buf: &[u8]) -> Result<(), ResponseCode> {
        (**self).write(address, buf)
    }

    fn read(
        &mut self,
        address: u8,
        buf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        (**self).read(address, buf)
    }

    fn write_read(
        &mut self,
        address: u8,
        wbuf: &[u8],
        rbuf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        (**self).write_read(address, wbuf, rbuf)
    }
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn write(&mut self, address: u8, buf: &[u8]) -> Result<(), ResponseCode> {
        (**self).write(address, buf)
    }

    fn read(
        &mut self,
        address: u8,
        buf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        (**self).read(address, buf)
    }

    fn write_read(
        &mut self,
        address: u8,
        wbuf: &[u8],
        rbuf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        (**self).write_read(address, wbuf, rbuf)
    }
}

///
/// A single device on an I2C bus.  The device borrows the bus for as long
/// as it lives; two devices on the same bus are used one after the other.
///
pub struct I2cDevice<'a, B: I2cBus + ?Sized> {
    bus: &'a mut B,
    address: u8,
}

impl<B: I2cBus + ?Sized> fmt::Display for I2cDevice<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.address)
    }
}

impl<'a, B: I2cBus + ?Sized> I2cDevice<'a, B> {
    ///
    /// Return a new [`I2cDevice`] for `address` on `bus`.  This will not
    /// perform any bus operations.
    ///
    pub fn new(bus: &'a mut B, address: u8) -> Self {
        Self { bus, address }
    }

    ///
    /// Writes a buffer to a device. Unlike a register read, this will not
    /// perform any follow-up reads.
    ///
    pub fn write(&mut self, buffer: &[u8]) -> Result<(), ResponseCode> {
        self.bus.write(self.address, buffer)
    }

    ///
    /// Reads from a device *without* first doing a write, filling the
    /// specified slice.
    ///
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<(), ResponseCode> {
        self.bus.read(self.address, buf)
    }

    ///
    /// Reads a register (or memory offset), writing `reg` and then filling
    /// `buf` from the device's reply.
    ///
    pub fn read_reg_into(
        &mut self,
        reg: &[u8],
        buf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        self.bus.write_read(self.address, reg, buf)
    }
}
