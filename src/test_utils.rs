//! Test doubles shared by the driver unit tests.

use std::collections::{HashMap, HashSet};

use crate::bus::{BusError, Result, Smbus};

/// In-memory register map standing in for a physical I2C bus.
///
/// Registers read back whatever was last written (or seeded); block
/// operations cover consecutive register addresses, matching the
/// auto-increment behavior of the chips under test. Writes are journaled so
/// tests can assert on bus traffic, and individual registers can be poisoned
/// to fail reads.
#[derive(Debug, Default)]
pub struct FakeSmbus {
    registers: HashMap<(u8, u8), u8>,
    failing: HashSet<(u8, u8)>,
    /// Journal of every write as (addr, reg, value).
    pub writes: Vec<(u8, u8, u8)>,
}

impl FakeSmbus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a register value without journaling a write.
    pub fn seed(&mut self, addr: u8, reg: u8, value: u8) {
        self.registers.insert((addr, reg), value);
    }

    /// Current value of a register; unwritten registers read as zero.
    pub fn register(&self, addr: u8, reg: u8) -> u8 {
        self.registers.get(&(addr, reg)).copied().unwrap_or(0)
    }

    /// Make every read of `reg` fail with a transfer error.
    pub fn fail_reads_of(&mut self, addr: u8, reg: u8) {
        self.failing.insert((addr, reg));
    }

    /// Number of writes issued to `reg` so far.
    pub fn write_count(&self, addr: u8, reg: u8) -> usize {
        self.writes
            .iter()
            .filter(|(a, r, _)| *a == addr && *r == reg)
            .count()
    }
}

impl Smbus for FakeSmbus {
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8> {
        if self.failing.contains(&(addr, reg)) {
            return Err(BusError::Transfer {
                address: addr,
                message: "no acknowledge".into(),
            });
        }
        Ok(self.register(addr, reg))
    }

    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<()> {
        self.registers.insert((addr, reg), value);
        self.writes.push((addr, reg, value));
        Ok(())
    }

    fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.read_byte(addr, reg + i as u8)?;
        }
        Ok(())
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        for (i, value) in data.iter().enumerate() {
            self.write_byte(addr, reg + i as u8, *value)?;
        }
        Ok(())
    }
}
