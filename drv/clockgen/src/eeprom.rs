// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot EEPROM of an image-store clock generator
//!
//! The EEPROM is addressed with a 16-bit big-endian offset and is read and
//! written in 32-byte windows.  Writes need a settling delay before the part
//! will respond again.

use drv_i2c_api::{I2cBus, I2cDevice};
use log::{debug, info, trace};

use crate::{sleep, ClockError, Timing};

/// Bytes per read or write transaction.
pub const WINDOW: usize = 32;

/// Bytes addressable with a 16-bit offset.
pub const CAPACITY: usize = 0x1_0000;

/// Bytes of a never-programmed EEPROM that must read back as 0xff.
pub const BLANK_LEN: usize = 256;

/// `(offset, len)` of the regions overwritten with 0xff by an erase: the
/// head of the boot image, and the block the part keeps at 0xf000.
pub const ERASED: [(usize, usize); 2] = [(0, BLANK_LEN), (0xf000, 128)];

/// Which windows of an image take part in a comparison.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Coverage {
    ///
    /// Only windows that end strictly before the end of the image.  The
    /// final window (whole or partial) is never compared, and an image of
    /// one window or less matches anything.  Deployed boards rely on this.
    ///
    #[default]
    Legacy,
    /// Every byte of the image, the last window possibly partial.
    Full,
}

impl Coverage {
    /// Yields `(offset, len)` for each window compared over an image of
    /// `len` bytes.
    pub fn windows(self, len: usize) -> impl Iterator<Item = (usize, usize)> {
        let end = match self {
            Coverage::Legacy => len.saturating_sub(WINDOW),
            Coverage::Full => len,
        };
        (0..end)
            .step_by(WINDOW)
            .map(move |offset| (offset, WINDOW.min(len - offset)))
    }
}

fn offset_bytes(offset: usize) -> [u8; 2] {
    [(offset >> 8) as u8, offset as u8]
}

pub struct Eeprom<'a, B: I2cBus + ?Sized> {
    device: I2cDevice<'a, B>,
    timing: &'a Timing,
}

impl<'a, B: I2cBus + ?Sized> Eeprom<'a, B> {
    pub fn new(device: I2cDevice<'a, B>, timing: &'a Timing) -> Self {
        Self { device, timing }
    }

    /// Reads `buf.len()` bytes starting at `offset`.
    pub fn read_window(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), ClockError> {
        self.device.read_reg_into(&offset_bytes(offset), buf)?;
        Ok(())
    }

    fn first_difference(
        &mut self,
        image: &[u8],
        coverage: Coverage,
    ) -> Result<Option<(usize, u8)>, ClockError> {
        if image.len() > CAPACITY {
            return Err(ClockError::ImageTooLarge { len: image.len() });
        }

        let mut buf = [0u8; WINDOW];

        for (offset, len) in coverage.windows(image.len()) {
            let found = &mut buf[..len];
            self.read_window(offset, found)?;

            let expected = &image[offset..offset + len];
            if let Some(i) = (0..len).find(|&i| found[i] != expected[i]) {
                trace!("{}: differs at {:#06x}", self.device, offset + i);
                return Ok(Some((offset + i, found[i])));
            }
        }

        Ok(None)
    }

    ///
    /// Compares `image` against the EEPROM contents over the windows chosen
    /// by `coverage`, stopping at the first difference.  An image larger
    /// than the EEPROM is refused without reading anything.
    ///
    pub fn matches(
        &mut self,
        image: &[u8],
        coverage: Coverage,
    ) -> Result<bool, ClockError> {
        Ok(self.first_difference(image, coverage)?.is_none())
    }

    /// Whether the EEPROM looks never programmed.
    pub fn is_blank(&mut self, coverage: Coverage) -> Result<bool, ClockError> {
        self.matches(&[0xff; BLANK_LEN], coverage)
    }

    ///
    /// Writes `image` from offset 0, one window at a time, waiting for the
    /// part to settle after each.  An image that does not fit is refused
    /// before anything is written.
    ///
    pub fn program(&mut self, image: &[u8]) -> Result<(), ClockError> {
        if image.len() > CAPACITY {
            return Err(ClockError::ImageTooLarge { len: image.len() });
        }

        debug!("{}: programming {} bytes", self.device, image.len());
        self.write_at(0, image)?;

        info!("{}: programmed {} bytes", self.device, image.len());
        Ok(())
    }

    ///
    /// Overwrites the [`ERASED`] regions with 0xff, leaving the part to
    /// boot its factory default.  Uses the same windowed writes as
    /// [`Eeprom::program`].
    ///
    pub fn erase(&mut self) -> Result<(), ClockError> {
        for (offset, len) in ERASED {
            debug!("{}: erasing {len} bytes at {offset:#06x}", self.device);
            self.write_at(offset, &vec![0xff; len])?;
        }

        info!("{}: erased", self.device);
        Ok(())
    }

    fn write_at(&mut self, base: usize, data: &[u8]) -> Result<(), ClockError> {
        let mut frame = Vec::with_capacity(2 + WINDOW);

        for (offset, len) in Coverage::Full.windows(data.len()) {
            frame.clear();
            frame.extend_from_slice(&offset_bytes(base + offset));
            frame.extend_from_slice(&data[offset..offset + len]);

            self.device.write(&frame)?;
            sleep(self.timing.settle);
        }

        Ok(())
    }

    /// Reads back every byte of `image` and fails on the first mismatch.
    pub fn verify(&mut self, image: &[u8]) -> Result<(), ClockError> {
        match self.first_difference(image, Coverage::Full)? {
            None => Ok(()),
            Some((offset, found)) => Err(ClockError::VerifyMismatch {
                offset,
                expected: image[offset],
                found,
            }),
        }
    }
}
