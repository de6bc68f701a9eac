// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register scripts applied to a running image-store clock generator

use clock_files::ScriptLine;
use drv_i2c_api::{I2cBus, I2cDevice};
use log::{debug, trace};

use crate::{sleep, ClockError, Timing};

pub struct ScriptApplier<'a, B: I2cBus + ?Sized> {
    device: I2cDevice<'a, B>,
    timing: &'a Timing,
}

impl<'a, B: I2cBus + ?Sized> ScriptApplier<'a, B> {
    pub fn new(device: I2cDevice<'a, B>, timing: &'a Timing) -> Self {
        Self { device, timing }
    }

    ///
    /// Writes each `offset,value` pair as a two byte transaction, in order.
    /// Delay markers wait for [`Timing::script_delay`] if one is set, and
    /// are otherwise skipped.  The first failed write stops the script;
    /// writes already made stay in effect.  Returns the number of writes.
    ///
    pub fn apply(
        &mut self,
        script: &[ScriptLine],
    ) -> Result<usize, ClockError> {
        let mut writes = 0;

        for line in script {
            match *line {
                ScriptLine::Write { offset, value } => {
                    trace!("{}: [{offset:#04x}] <- {value:#04x}", self.device);
                    self.device.write(&[offset, value])?;
                    writes += 1;
                }
                ScriptLine::Delay => {
                    if let Some(d) = self.timing.script_delay {
                        trace!("{}: delay {d:?}", self.device);
                        sleep(d);
                    }
                }
            }
        }

        debug!("{}: applied {writes} register writes", self.device);
        Ok(writes)
    }
}
