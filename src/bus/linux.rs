//! Linux userspace implementation of [`Smbus`] over `/dev/i2c-N`.

use i2cdev::core::{I2CMessage, I2CTransfer};
use i2cdev::linux::{LinuxI2CBus, LinuxI2CMessage};

use super::{BusError, Result, Smbus};

/// An open handle to `/dev/i2c-N`.
///
/// The file descriptor is released when the handle drops, so scoped
/// ownership guarantees release on every exit path.
pub struct LinuxSmbus {
    bus: LinuxI2CBus,
    number: u8,
}

impl LinuxSmbus {
    /// Open the numbered I2C bus device.
    pub fn open(number: u8) -> Result<Self> {
        let path = format!("/dev/i2c-{}", number);
        let bus = LinuxI2CBus::new(&path).map_err(|e| BusError::Open {
            bus: number,
            message: e.to_string(),
        })?;
        Ok(Self { bus, number })
    }

    /// Bus number this handle was opened with.
    pub fn number(&self) -> u8 {
        self.number
    }

    fn transfer(&mut self, addr: u8, msgs: &mut [LinuxI2CMessage]) -> Result<()> {
        let expected = msgs.len();
        let done = self.bus.transfer(msgs).map_err(|e| BusError::Transfer {
            address: addr,
            message: e.to_string(),
        })? as usize;
        if done != expected {
            return Err(BusError::Incomplete {
                expected,
                actual: done,
            });
        }
        Ok(())
    }
}

impl Smbus for LinuxSmbus {
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_block(addr, reg, &mut buf)?;
        Ok(buf[0])
    }

    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<()> {
        self.write_block(addr, reg, &[value])
    }

    fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        let command = [reg];
        let mut msgs = [
            LinuxI2CMessage::write(&command).with_address(addr as u16),
            LinuxI2CMessage::read(buf).with_address(addr as u16),
        ];
        self.transfer(addr, &mut msgs)
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push(reg);
        payload.extend_from_slice(data);
        let mut msgs = [LinuxI2CMessage::write(&payload).with_address(addr as u16)];
        self.transfer(addr, &mut msgs)
    }
}
