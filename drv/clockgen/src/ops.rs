// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User-facing clock operations
//!
//! Every operation that changes a device resolves and reads all of the files
//! it needs before its first bus transaction, so a missing or malformed file
//! leaves the device untouched.

use clock_files::{
    CandidateStore, FileKind, ImageFormat, MarkerStore, ScriptLine,
};
use drv_i2c_api::{I2cBus, I2cDevice};
use log::{debug, info};

use crate::discovery::{Discovery, Identified};
use crate::eeprom::{Coverage, Eeprom};
use crate::script::ScriptApplier;
use crate::si5518::{Commands, RestartMode, Si5518};
use crate::{ClockError, Timing};

/// State shared by every clock on a board.
#[derive(Clone, Debug)]
pub struct Context {
    /// Board name, as it appears in identifiers of the board's default
    /// streaming designs
    pub board: String,
    pub store: CandidateStore,
    pub markers: MarkerStore,
    pub timing: Timing,
}

#[derive(Clone, Debug)]
pub struct StreamingClock {
    pub name: String,
    pub chip: String,
    pub address: u8,
    pub default_design: String,
    pub commands: Commands,
}

#[derive(Clone, Debug)]
pub struct ImageStoreClock {
    pub name: String,
    pub chip: String,
    /// Runtime register address
    pub address: u8,
    pub eeprom_address: u8,
    pub default_design: String,
    pub format: ImageFormat,
    pub coverage: Coverage,
}

#[derive(Clone, Debug)]
pub enum Clock {
    Streaming(StreamingClock),
    ImageStore(ImageStoreClock),
}

impl StreamingClock {
    fn driver<'a, B: I2cBus + ?Sized>(
        &'a self,
        cx: &'a Context,
        bus: &'a mut B,
    ) -> Si5518<'a, B> {
        let device = I2cDevice::new(bus, self.address);
        Si5518::new(device, &self.commands, &cx.timing)
    }

    ///
    /// Reads the running design's identifier.  Default designs carry the
    /// board name in their identifier; those are reported by the configured
    /// default design name instead.
    ///
    pub fn get<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<String, ClockError> {
        let mut dev = self.driver(cx, bus);
        let session = dev.negotiate_buffers()?;

        if log::log_enabled!(log::Level::Debug) {
            let info = dev.device_info(&session)?;
            debug!("{}: device info {info:02x?}", self.name);
        }

        let id = dev.query_identity()?;
        if !cx.board.is_empty() && id.contains(&cx.board) {
            Ok(self.default_design.clone())
        } else {
            Ok(id)
        }
    }

    pub fn set<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
    ) -> Result<(), ClockError> {
        let files = cx.store.resolve_boot_files(&self.chip, design)?;
        let payload = files.load()?;

        let mut dev = self.driver(cx, bus);
        let session = dev.negotiate_buffers()?;
        dev.stream_load(&session, &payload)?;

        info!("{}: running {design}", self.name);
        Ok(())
    }

    /// Drops any host-loaded design and boots the one held in NVM.
    pub fn restore<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<(), ClockError> {
        let mut dev = self.driver(cx, bus);
        dev.negotiate_buffers()?;
        dev.restart(RestartMode::BootFromNvm)?;

        info!("{}: restored NVM design", self.name);
        Ok(())
    }
}

impl ImageStoreClock {
    fn discovery(&self) -> Discovery<'_> {
        Discovery {
            clock: &self.name,
            chip: &self.chip,
            default_design: &self.default_design,
            format: &self.format,
            coverage: self.coverage,
        }
    }

    pub fn get<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<Identified, ClockError> {
        let mut eeprom =
            Eeprom::new(I2cDevice::new(bus, self.eeprom_address), &cx.timing);
        let found = self.discovery().run(&cx.markers, &cx.store, &mut eeprom)?;

        debug!("{}: {} ({})", self.name, found.design, found.evidence);
        Ok(found)
    }

    fn load_script(
        &self,
        cx: &Context,
        design: &str,
    ) -> Result<Vec<ScriptLine>, ClockError> {
        let file =
            cx.store.resolve(&self.chip, design, FileKind::RuntimeScript)?;
        Ok(file.load_script()?)
    }

    fn load_image(
        &self,
        cx: &Context,
        design: &str,
    ) -> Result<Vec<u8>, ClockError> {
        let file = cx.store.resolve(&self.chip, design, self.format.kind())?;
        Ok(file.load_image(&self.format)?.bytes)
    }

    ///
    /// Replays a runtime script and records `design` as the one running.
    /// The marker is only written once every register write has landed.
    ///
    pub fn apply_runtime<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
        script: &[ScriptLine],
    ) -> Result<(), ClockError> {
        ScriptApplier::new(I2cDevice::new(bus, self.address), &cx.timing)
            .apply(script)?;
        cx.markers.record(&self.name, design)?;

        info!("{}: running {design}", self.name);
        Ok(())
    }

    pub fn set<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
    ) -> Result<(), ClockError> {
        let script = self.load_script(cx, design)?;
        self.apply_runtime(cx, bus, design, &script)
    }

    /// Programs `design` into the boot EEPROM, then applies it at runtime.
    pub fn set_boot<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
    ) -> Result<(), ClockError> {
        let script = self.load_script(cx, design)?;
        let image = self.load_image(cx, design)?;

        Eeprom::new(I2cDevice::new(bus, self.eeprom_address), &cx.timing)
            .program(&image)?;
        info!("{}: {design} programmed for boot", self.name);

        self.apply_runtime(cx, bus, design, &script)
    }

    pub fn restore<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<(), ClockError> {
        self.set_boot(cx, bus, &self.default_design)
    }

    /// Reads back the boot EEPROM and compares every byte with `design`.
    pub fn verify<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
    ) -> Result<(), ClockError> {
        let image = self.load_image(cx, design)?;

        Eeprom::new(I2cDevice::new(bus, self.eeprom_address), &cx.timing)
            .verify(&image)?;
        info!("{}: EEPROM holds {design}", self.name);
        Ok(())
    }

    ///
    /// Blanks the boot EEPROM so the part comes up in its factory default,
    /// and forgets the recorded design.  The running design is not changed
    /// until the next power cycle.
    ///
    pub fn erase<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<(), ClockError> {
        Eeprom::new(I2cDevice::new(bus, self.eeprom_address), &cx.timing)
            .erase()?;
        cx.markers.clear(&self.name)?;

        info!("{}: EEPROM erased", self.name);
        Ok(())
    }
}

impl Clock {
    pub fn name(&self) -> &str {
        match self {
            Clock::Streaming(c) => &c.name,
            Clock::ImageStore(c) => &c.name,
        }
    }

    pub fn chip(&self) -> &str {
        match self {
            Clock::Streaming(c) => &c.chip,
            Clock::ImageStore(c) => &c.chip,
        }
    }

    pub fn default_design(&self) -> &str {
        match self {
            Clock::Streaming(c) => &c.default_design,
            Clock::ImageStore(c) => &c.default_design,
        }
    }

    fn unsupported(&self, command: &'static str) -> ClockError {
        ClockError::Unsupported {
            chip: self.chip().to_string(),
            command,
        }
    }

    /// The design the clock is running.
    pub fn get<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<String, ClockError> {
        match self {
            Clock::Streaming(c) => c.get(cx, bus),
            Clock::ImageStore(c) => Ok(c.get(cx, bus)?.design),
        }
    }

    /// Switches the running design, leaving the boot design alone.
    pub fn set<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
    ) -> Result<(), ClockError> {
        match self {
            Clock::Streaming(c) => c.set(cx, bus, design),
            Clock::ImageStore(c) => c.set(cx, bus, design),
        }
    }

    /// Makes `design` the boot design, and switches to it.
    pub fn set_boot<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
    ) -> Result<(), ClockError> {
        match self {
            Clock::Streaming(_) => Err(self.unsupported("setbootclock")),
            Clock::ImageStore(c) => c.set_boot(cx, bus, design),
        }
    }

    /// Returns the clock to its default design.
    pub fn restore<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<(), ClockError> {
        match self {
            Clock::Streaming(c) => c.restore(cx, bus),
            Clock::ImageStore(c) => c.restore(cx, bus),
        }
    }

    pub fn verify<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
        design: &str,
    ) -> Result<(), ClockError> {
        match self {
            Clock::Streaming(_) => Err(self.unsupported("verifyclock")),
            Clock::ImageStore(c) => c.verify(cx, bus, design),
        }
    }

    /// Returns the boot EEPROM to its never-programmed state.
    pub fn erase<B: I2cBus + ?Sized>(
        &self,
        cx: &Context,
        bus: &mut B,
    ) -> Result<(), ClockError> {
        match self {
            Clock::Streaming(_) => Err(self.unsupported("eraseclock")),
            Clock::ImageStore(c) => c.erase(cx, bus),
        }
    }

    /// Names of the designs that could be applied to this clock.
    pub fn designs(&self, cx: &Context) -> Result<Vec<String>, ClockError> {
        let (chip, kind) = match self {
            Clock::Streaming(c) => (&c.chip, FileKind::FirmwareHex),
            Clock::ImageStore(c) => (&c.chip, c.format.kind()),
        };
        Ok(cx.store.designs(chip, kind)?)
    }
}
