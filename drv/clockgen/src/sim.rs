// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated clock generators for tests

use std::collections::BTreeMap;

use drv_i2c_api::{I2cBus, ResponseCode};

use crate::si5518::Commands;

/// A bus transaction, as seen by the simulated bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Write(u8, Vec<u8>),
    Read(u8, usize),
    WriteRead(u8, Vec<u8>, usize),
}

/// A streaming clock generator: one command register, CTS in bit 7 of the
/// first byte of every read.
pub struct SimSi5518 {
    pub cmd_buf_size: u16,
    pub reply_buf_size: u16,
    pub identity: [u8; 8],
    /// Status reads that report busy after each command
    pub busy_polls: u32,
    /// Never report ready
    pub never_ready: bool,
    /// NACK the load command with this index (0-based)
    pub fail_load: Option<usize>,
    pending_busy: u32,
    reply: Vec<u8>,
    pub polls: usize,
    pub restarts: Vec<u8>,
    pub loads: Vec<Vec<u8>>,
    pub boots: usize,
    pub commands: Vec<u8>,
}

impl SimSi5518 {
    pub fn new(cmd_buf_size: u16, reply_buf_size: u16) -> Self {
        Self {
            cmd_buf_size,
            reply_buf_size,
            identity: *b"DESIGN01",
            busy_polls: 0,
            never_ready: false,
            fail_load: None,
            pending_busy: 0,
            reply: vec![],
            polls: 0,
            restarts: vec![],
            loads: vec![],
            boots: 0,
            commands: vec![],
        }
    }

    /// Everything host-loaded since the last restart, in order.
    pub fn loaded(&self) -> Vec<u8> {
        self.loads.concat()
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), ResponseCode> {
        let c = Commands::SI5518;

        if frame.len() < 3 || frame[..2] != c.register {
            return Err(ResponseCode::NoRegister);
        }
        assert!(
            frame.len() <= self.cmd_buf_size as usize,
            "{} byte frame overflows {} byte command buffer",
            frame.len(),
            self.cmd_buf_size
        );

        let opcode = frame[2];
        self.commands.push(opcode);
        self.pending_busy = self.busy_polls;
        self.reply = vec![0x80];

        match opcode {
            op if op == c.sio_info => {
                self.reply.extend(self.cmd_buf_size.to_le_bytes());
                self.reply.extend(self.reply_buf_size.to_le_bytes());
            }
            op if op == c.app_info => {
                let mut reply = vec![0u8; c.app_info_len];
                reply[0] = 0x80;
                reply[c.identity.clone()].copy_from_slice(&self.identity);
                self.reply = reply;
            }
            op if op == c.device_info => {
                self.reply.extend([0x55, 0x18, 0x00, 0x41]);
            }
            op if op == c.restart => {
                self.restarts.push(frame[3]);
                self.loads.clear();
            }
            op if op == c.host_load => {
                if self.fail_load == Some(self.loads.len()) {
                    return Err(ResponseCode::NoRegister);
                }
                self.loads.push(frame[3..].to_vec());
            }
            op if op == c.boot => self.boots += 1,
            _ => return Err(ResponseCode::NoRegister),
        }

        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ResponseCode> {
        if buf.len() == 1 {
            self.polls += 1;
            buf[0] = if self.never_ready {
                0
            } else if self.pending_busy > 0 {
                self.pending_busy -= 1;
                0
            } else {
                0x80
            };
            return Ok(());
        }

        buf.fill(0);
        for (dst, src) in buf.iter_mut().zip(self.reply.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}

/// A 64 KiB EEPROM with 16-bit big-endian offsets.
pub struct SimEeprom {
    pub memory: Vec<u8>,
    pub reads: usize,
    pub writes: usize,
}

impl SimEeprom {
    pub fn blank() -> Self {
        Self {
            memory: vec![0xff; 0x1_0000],
            reads: 0,
            writes: 0,
        }
    }

    pub fn with_contents(contents: &[u8]) -> Self {
        let mut eeprom = Self::blank();
        eeprom.memory[..contents.len()].copy_from_slice(contents);
        eeprom
    }

    fn offset(reg: &[u8]) -> Result<usize, ResponseCode> {
        match reg {
            [hi, lo, ..] => Ok(((*hi as usize) << 8) | *lo as usize),
            _ => Err(ResponseCode::BadArg),
        }
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), ResponseCode> {
        let offset = Self::offset(frame)?;
        let data = &frame[2..];
        self.memory[offset..offset + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }

    fn write_read(
        &mut self,
        reg: &[u8],
        buf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        let offset = Self::offset(reg)?;
        buf.copy_from_slice(&self.memory[offset..offset + buf.len()]);
        self.reads += 1;
        Ok(())
    }
}

/// A device with plain byte registers, recording every write.
#[derive(Default)]
pub struct SimRegisters {
    pub writes: Vec<(u8, u8)>,
}

pub enum SimDevice {
    Si5518(SimSi5518),
    Eeprom(SimEeprom),
    Registers(SimRegisters),
}

#[derive(Default)]
pub struct SimBus {
    pub devices: BTreeMap<u8, SimDevice>,
    pub ops: Vec<Op>,
    /// Fail every transaction
    pub dead: bool,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: u8, device: SimDevice) -> Self {
        self.devices.insert(address, device);
        self
    }

    pub fn si5518(&self, address: u8) -> &SimSi5518 {
        match self.devices.get(&address) {
            Some(SimDevice::Si5518(d)) => d,
            _ => panic!("no Si5518 at {address:#x}"),
        }
    }

    pub fn si5518_mut(&mut self, address: u8) -> &mut SimSi5518 {
        match self.devices.get_mut(&address) {
            Some(SimDevice::Si5518(d)) => d,
            _ => panic!("no Si5518 at {address:#x}"),
        }
    }

    pub fn eeprom(&self, address: u8) -> &SimEeprom {
        match self.devices.get(&address) {
            Some(SimDevice::Eeprom(d)) => d,
            _ => panic!("no EEPROM at {address:#x}"),
        }
    }

    pub fn registers(&self, address: u8) -> &SimRegisters {
        match self.devices.get(&address) {
            Some(SimDevice::Registers(d)) => d,
            _ => panic!("no register device at {address:#x}"),
        }
    }

    fn device(&mut self, address: u8) -> Result<&mut SimDevice, ResponseCode> {
        if self.dead {
            return Err(ResponseCode::BusError);
        }
        self.devices.get_mut(&address).ok_or(ResponseCode::NoDevice)
    }
}

impl I2cBus for SimBus {
    fn write(&mut self, address: u8, buf: &[u8]) -> Result<(), ResponseCode> {
        self.ops.push(Op::Write(address, buf.to_vec()));
        match self.device(address)? {
            SimDevice::Si5518(d) => d.write(buf),
            SimDevice::Eeprom(d) => d.write(buf),
            SimDevice::Registers(d) => match buf {
                [offset, value] => {
                    d.writes.push((*offset, *value));
                    Ok(())
                }
                _ => Err(ResponseCode::BadArg),
            },
        }
    }

    fn read(
        &mut self,
        address: u8,
        buf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        self.ops.push(Op::Read(address, buf.len()));
        match self.device(address)? {
            SimDevice::Si5518(d) => d.read(buf),
            _ => Err(ResponseCode::OperationNotSupported),
        }
    }

    fn write_read(
        &mut self,
        address: u8,
        wbuf: &[u8],
        rbuf: &mut [u8],
    ) -> Result<(), ResponseCode> {
        self.ops.push(Op::WriteRead(address, wbuf.to_vec(), rbuf.len()));
        match self.device(address)? {
            SimDevice::Eeprom(d) => d.write_read(wbuf, rbuf),
            _ => Err(ResponseCode::OperationNotSupported),
        }
    }
}
