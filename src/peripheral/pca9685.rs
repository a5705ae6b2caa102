//! PCA9685 16-channel, 12-bit PWM driver.
//!
//! Each channel is a pair of 12-bit on/off times inside the 4096-tick PWM
//! frame. A value of 4096 in either field is a sentinel: on-time 4096 means
//! fully on, off-time 4096 means fully off. Several chips can share a bus
//! at consecutive addresses, selected by `unit`.
//!
//! Datasheet: <https://cdn-shop.adafruit.com/datasheets/PCA9685.pdf>

use crate::bus::Smbus;

use super::{DriverError, Result};

/// Base I2C address; a chip answers at base + unit.
pub const BASE_ADDRESS: u8 = 0x40;

/// Internal oscillator frequency, Hz.
const CLOCK_FREQ: u32 = 25_000_000;

/// Ticks per PWM frame, doubling as the fully-on/fully-off sentinel.
const FULL: u16 = 4096;

/// PCA9685 register addresses. Channel registers occupy 4 bytes each from
/// the LED base: on-time low/high, off-time low/high.
mod regs {
    pub const MODE1: u8 = 0x00;
    pub const MODE2: u8 = 0x01;
    pub const LED_BASE: u8 = 0x06;
    pub const ALL_LED_BASE: u8 = 0xFA;
    pub const PRE_SCALE: u8 = 0xFE;
}

/// Capability token for one PWM channel.
#[derive(Debug)]
pub struct Channel {
    reg: u8,
}

/// PCA9685 driver bound to an open bus transport.
pub struct Pca9685<B: Smbus> {
    bus: B,
    address: u8,
}

impl<B: Smbus> Pca9685<B> {
    /// Bind to the chip at base address + `unit`. The PCA9685 carries no
    /// identity register, so presence is only established by the first
    /// transaction.
    pub fn new(bus: B, unit: u8) -> Self {
        Self {
            bus,
            address: BASE_ADDRESS + unit,
        }
    }

    /// Program the PWM frequency and force every channel off.
    ///
    /// The chip's soft-reset broadcast resets every chip on the bus, so the
    /// registers are set up individually instead.
    pub fn reset(&mut self, pwm_freq: u32) -> Result<()> {
        let prescale = prescale_for(pwm_freq)?;

        // Auto-increment register addressing, broadcast addresses ignored.
        self.bus.write_byte(self.address, regs::MODE1, 0x20)?;

        // Outputs change on I2C STOP/ACK, push-pull drive, high impedance
        // while the output enable is deasserted.
        self.bus.write_byte(self.address, regs::MODE2, 0x07)?;

        // All channels off. Must follow the MODE2 write so the ACK-mode bit
        // is already in effect.
        self.bus
            .write_block(self.address, regs::ALL_LED_BASE, &[0x00, 0x00, 0x00, 0x10])?;

        Ok(self.bus.write_byte(self.address, regs::PRE_SCALE, prescale)?)
    }

    /// Capability token for PWM channel `channel`.
    pub fn channel(&self, channel: u8) -> Result<Channel> {
        if channel > 15 {
            return Err(DriverError::InvalidPin(channel));
        }
        Ok(Channel {
            reg: regs::LED_BASE + channel * 4,
        })
    }

    /// Raw on/off times of a channel, each 0-4096.
    pub fn timings(&mut self, channel: &Channel) -> Result<(u16, u16)> {
        let mut data = [0u8; 4];
        self.bus.read_block(self.address, channel.reg, &mut data)?;
        let on_time = u16::from_le_bytes([data[0], data[1]]);
        let off_time = u16::from_le_bytes([data[2], data[3]]);
        Ok((on_time, off_time))
    }

    /// Write raw on/off times, each 0-4096. An on-time of 4096 means fully
    /// on; an off-time of 4096 means fully off.
    pub fn set_timings(&mut self, channel: &Channel, on_time: u16, off_time: u16) -> Result<()> {
        for value in [on_time, off_time] {
            if value > FULL {
                return Err(DriverError::InvalidValue {
                    value: value as u32,
                    max: FULL as u32,
                });
            }
        }
        let data = [
            (on_time & 0xFF) as u8,
            (on_time >> 8) as u8,
            (off_time & 0xFF) as u8,
            (off_time >> 8) as u8,
        ];
        Ok(self.bus.write_block(self.address, channel.reg, &data)?)
    }

    /// Boolean view of a channel: `Some(true)` when fully on, `Some(false)`
    /// when fully off, `None` for any other timing pair.
    pub fn state(&mut self, channel: &Channel) -> Result<Option<bool>> {
        Ok(match self.timings(channel)? {
            (FULL, 0) => Some(true),
            (0, FULL) => Some(false),
            _ => None,
        })
    }

    /// Drive a channel to one of the two sentinel timing pairs.
    pub fn set_state(&mut self, channel: &Channel, on: bool) -> Result<()> {
        if on {
            self.set_timings(channel, FULL, 0)
        } else {
            self.set_timings(channel, 0, FULL)
        }
    }

    /// Duty view of a channel, 0 (fully off) to 4096 (fully on). `None`
    /// when the timings don't express a plain duty, i.e. the on-time is
    /// neither 0 nor the fully-on sentinel.
    pub fn duty_cycle(&mut self, channel: &Channel) -> Result<Option<u16>> {
        Ok(match self.timings(channel)? {
            (FULL, 0) => Some(FULL),
            (0, FULL) => Some(0),
            (0, off_time) => Some(off_time),
            _ => None,
        })
    }

    /// Set a channel's duty, 0-4096, using the canonical timing pair for
    /// the sentinels.
    pub fn set_duty_cycle(&mut self, channel: &Channel, duty: u16) -> Result<()> {
        match duty {
            0 => self.set_timings(channel, 0, FULL),
            FULL => self.set_timings(channel, FULL, 0),
            d if d < FULL => self.set_timings(channel, 0, d),
            d => Err(DriverError::InvalidValue {
                value: d as u32,
                max: FULL as u32,
            }),
        }
    }
}

/// 12-bit prescaler for a PWM frequency: round(clock / 4096 / freq) - 1,
/// valid between 3 and 255.
fn prescale_for(pwm_freq: u32) -> Result<u8> {
    let prescale = (CLOCK_FREQ as f64 / 4096.0 / pwm_freq as f64).round() as i64 - 1;
    if prescale < 3 {
        return Err(DriverError::FrequencyTooHigh);
    }
    if prescale > 255 {
        return Err(DriverError::FrequencyTooLow);
    }
    Ok(prescale as u8)
}
