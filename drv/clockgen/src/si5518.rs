// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for streaming clock generators (Si5518 and friends)
//!
//! These parts expose a single command register.  Every command is written
//! to it as `[register, opcode, args...]`; the host then reads status bytes
//! until the device sets CTS (bit 7 of the first byte), and only then reads
//! any reply or issues the next command.  Nothing may be written while CTS is
//! clear.
//!
//! Loading a new design goes:
//!
//! ```text
//!   Running --RESTART(wait)--> Waiting --HOST_LOAD x N--> Loading
//!   Loading --BOOT--> Running
//!   Running --RESTART(nvm)--> Running
//! ```
//!
//! A load that fails part way cannot be resumed; start again from the
//! restart.

use std::ops::Range;

use drv_i2c_api::{I2cBus, I2cDevice};
use log::{debug, info, trace};

use crate::{sleep, ClockError, Timing};

/// Protocol constants for a streaming clock generator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commands {
    /// Command register address, as written on the wire
    pub register: [u8; 2],
    pub sio_info: u8,
    pub host_load: u8,
    pub boot: u8,
    pub device_info: u8,
    pub app_info: u8,
    pub restart: u8,
    /// CTS bit in the first byte of every read
    pub ready: u8,
    /// Length of the SIO_INFO reply
    pub sio_info_len: usize,
    /// Length of the APP_INFO reply
    pub app_info_len: usize,
    /// Where the design identifier sits in the APP_INFO reply
    pub identity: Range<usize>,
    /// Bytes of the command buffer left unused by each load
    pub load_margin: usize,
}

impl Commands {
    pub const SI5518: Commands = Commands {
        register: [0xf0, 0x0f],
        sio_info: 0x02,
        host_load: 0x05,
        boot: 0x07,
        device_info: 0x08,
        app_info: 0x10,
        restart: 0xf0,
        ready: 0x80,
        sio_info_len: 5,
        app_info_len: 25,
        identity: 11..19,
        load_margin: 4,
    };
}

/// Buffer sizes the device reported for this session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub cmd_buf_size: u16,
    pub reply_buf_size: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RestartMode {
    /// Clear the running design and wait for a host load
    WaitForLoad = 0,
    /// Clear the running design and boot the one in NVM
    BootFromNvm = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Running,
    Waiting,
    Loading,
    Booting,
}

pub struct Si5518<'a, B: I2cBus + ?Sized> {
    device: I2cDevice<'a, B>,
    commands: &'a Commands,
    timing: &'a Timing,
    state: DeviceState,
}

impl<'a, B: I2cBus + ?Sized> Si5518<'a, B> {
    pub fn new(
        device: I2cDevice<'a, B>,
        commands: &'a Commands,
        timing: &'a Timing,
    ) -> Self {
        Self {
            device,
            commands,
            timing,
            state: DeviceState::Running,
        }
    }

    /// Our belief about where the device is in a load.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    ///
    /// Reads status bytes until CTS is set, sleeping before each read.
    /// Returns the number of reads it took.  A bus failure ends polling
    /// immediately.
    ///
    pub fn poll_ready(&mut self) -> Result<u32, ClockError> {
        let attempts = self.timing.poll_attempts;

        for attempt in 1..=attempts {
            sleep(self.timing.poll_interval);

            let mut status = [0u8; 1];
            self.device.read_into(&mut status)?;

            if status[0] & self.commands.ready != 0 {
                trace!("{}: ready after {attempt} polls", self.device);
                return Ok(attempt);
            }
        }

        Err(ClockError::ProtocolTimeout { attempts })
    }

    fn command(&mut self, opcode: u8, args: &[u8]) -> Result<(), ClockError> {
        let mut frame = Vec::with_capacity(3 + args.len());
        frame.extend_from_slice(&self.commands.register);
        frame.push(opcode);
        frame.extend_from_slice(args);

        self.device.write(&frame)?;
        self.poll_ready()?;
        Ok(())
    }

    fn reply(&mut self, len: usize) -> Result<Vec<u8>, ClockError> {
        let mut buf = vec![0u8; len];
        self.device.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Asks the device how much it will accept and send per transaction.
    pub fn negotiate_buffers(&mut self) -> Result<Session, ClockError> {
        self.command(self.commands.sio_info, &[])?;
        let reply = self.reply(self.commands.sio_info_len)?;

        let session = Session {
            cmd_buf_size: u16::from_le_bytes([reply[1], reply[2]]),
            reply_buf_size: u16::from_le_bytes([reply[3], reply[4]]),
        };

        debug!(
            "{}: command buffer {} bytes, reply buffer {} bytes",
            self.device, session.cmd_buf_size, session.reply_buf_size
        );
        Ok(session)
    }

    /// Clears the running design.
    pub fn restart(&mut self, mode: RestartMode) -> Result<(), ClockError> {
        debug!("{}: restart ({mode:?})", self.device);
        self.command(self.commands.restart, &[mode as u8])?;

        self.state = match mode {
            RestartMode::WaitForLoad => DeviceState::Waiting,
            RestartMode::BootFromNvm => DeviceState::Running,
        };
        Ok(())
    }

    fn boot(&mut self) -> Result<(), ClockError> {
        debug_assert_eq!(self.state, DeviceState::Loading);
        self.state = DeviceState::Booting;

        debug!("{}: boot", self.device);
        self.command(self.commands.boot, &[])?;

        self.state = DeviceState::Running;
        Ok(())
    }

    /// How many payload bytes fit in one load command for `session`.
    pub fn chunk_size(&self, session: &Session) -> Result<usize, ClockError> {
        let size = session.cmd_buf_size as usize;
        if size <= self.commands.load_margin {
            return Err(ClockError::BadBufferSize(session.cmd_buf_size));
        }
        Ok(size - self.commands.load_margin)
    }

    ///
    /// Replaces the running design with `payload` (the concatenated boot
    /// images): restarts the device to wait for a load, sends the payload in
    /// chunks that fit the negotiated command buffer, waiting for CTS after
    /// each, and boots it.  Returns the number of load commands sent.
    ///
    pub fn stream_load(
        &mut self,
        session: &Session,
        payload: &[u8],
    ) -> Result<usize, ClockError> {
        let chunk_size = self.chunk_size(session)?;

        self.restart(RestartMode::WaitForLoad)?;
        self.state = DeviceState::Loading;

        let mut chunks = 0;
        for chunk in payload.chunks(chunk_size) {
            self.command(self.commands.host_load, chunk)?;
            chunks += 1;
        }

        info!(
            "{}: loaded {} bytes in {chunks} chunks of up to {chunk_size}",
            self.device,
            payload.len()
        );

        self.boot()?;
        Ok(chunks)
    }

    ///
    /// Reads the identifier of the design the device is running.  The
    /// identifier is at most 8 ASCII characters; trailing padding is
    /// dropped.
    ///
    pub fn query_identity(&mut self) -> Result<String, ClockError> {
        self.command(self.commands.app_info, &[])?;
        let reply = self.reply(self.commands.app_info_len)?;

        let raw = &reply[self.commands.identity.clone()];
        let id: String = raw.iter().map(|&b| b as char).collect();
        let id = id.trim_end_matches(['\0', ' ']).to_string();

        debug!("{}: running design {id:?}", self.device);
        Ok(id)
    }

    /// Reads the raw DEVICE_INFO reply, sized to the reply buffer.
    pub fn device_info(
        &mut self,
        session: &Session,
    ) -> Result<Vec<u8>, ClockError> {
        self.command(self.commands.device_info, &[])?;
        self.reply(session.reply_buf_size as usize)
    }
}
