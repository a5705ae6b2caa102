//! Byte-level access to a numbered I2C bus.
//!
//! Every driver in this crate talks SMBus-style register transactions
//! through the [`Smbus`] trait: a register write is `[reg, data...]`, a
//! register read is a write of `[reg]` followed by a read in one combined
//! transfer. No retries happen at this layer; callers own recovery policy.
//! Each bus number has exactly one logical owner at a time, so the drivers
//! do no locking of their own.

pub mod linux;

pub use linux::LinuxSmbus;

use thiserror::Error;

/// Transport-level errors.
#[derive(Error, Debug)]
pub enum BusError {
    /// The bus device node could not be opened.
    #[error("failed to open I2C bus {bus}: {message}")]
    Open { bus: u8, message: String },

    /// The device did not acknowledge or the transfer failed outright.
    #[error("I2C transfer with device 0x{address:02x} failed: {message}")]
    Transfer { address: u8, message: String },

    /// Fewer transfer segments completed than were issued, so a block
    /// operation moved fewer bytes than requested.
    #[error("incomplete I2C transfer: {actual} of {expected} segments completed")]
    Incomplete { expected: usize, actual: usize },
}

/// Convenient Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Register-oriented access to devices on one I2C bus.
///
/// Addresses are 7-bit. Implementations are synchronous; every call is a
/// blocking bus round-trip.
pub trait Smbus {
    /// Read one byte from register `reg` of the device at `addr`.
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8>;

    /// Write one byte to register `reg` of the device at `addr`.
    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<()>;

    /// Fill `buf` starting at register `reg` of the device at `addr`.
    fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at register `reg` of the device at `addr`.
    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()>;
}
