//! EMC2101 PWM fan controller and temperature sensor driver.
//!
//! The EMC2101 monitors the enclosure's internal (die) and external (remote
//! diode) temperatures and drives the exhaust fan. Regulation runs from an
//! on-chip temperature to duty-cycle look-up table, so the fan keeps
//! tracking the target between polls without host involvement.
//!
//! Datasheet: <https://ww1.microchip.com/downloads/en/DeviceDoc/2101.pdf>

use tracing::trace;

use crate::{
    bus::Smbus,
    types::{Percent, Temperature},
};

use super::{DriverError, Result};

/// I2C address of the EMC2101.
pub const ADDRESS: u8 = 0x4C;

/// Expected product ID.
const PRODUCT_ID: u8 = 0x16;

/// Expected manufacturer ID (SMSC/Microchip).
const MANUFACTURER_ID: u8 = 0x5D;

/// EMC2101 register addresses.
mod regs {
    pub const TEMP_INTERNAL: u8 = 0x00;
    pub const TEMP_EXTERNAL_MSB: u8 = 0x01;
    pub const STATUS: u8 = 0x02;
    pub const CONFIG: u8 = 0x03;
    pub const CONVERSION_RATE: u8 = 0x04;
    pub const LIMIT_INTERNAL_HIGH: u8 = 0x05;
    pub const LIMIT_EXTERNAL_HIGH_MSB: u8 = 0x07;
    pub const LIMIT_EXTERNAL_LOW_MSB: u8 = 0x08;
    pub const TEMP_EXTERNAL_LSB: u8 = 0x10;
    pub const LIMIT_EXTERNAL_HIGH_LSB: u8 = 0x13;
    pub const LIMIT_EXTERNAL_LOW_LSB: u8 = 0x14;
    pub const ALERT_MASK: u8 = 0x16;
    pub const IDEALITY_FACTOR: u8 = 0x17;
    pub const BETA_COMPENSATION: u8 = 0x18;
    pub const LIMIT_TCRIT: u8 = 0x19;
    pub const LIMIT_TCRIT_HYSTERESIS: u8 = 0x21;
    pub const TACH_READING_LSB: u8 = 0x46;
    pub const TACH_READING_MSB: u8 = 0x47;
    pub const TACH_LIMIT_LSB: u8 = 0x48;
    pub const TACH_LIMIT_MSB: u8 = 0x49;
    pub const FAN_CONFIG: u8 = 0x4A;
    pub const FAN_SPIN_UP: u8 = 0x4B;
    pub const FAN_SETTING: u8 = 0x4C;
    pub const PWM_FREQ: u8 = 0x4D;
    pub const PWM_FREQ_DIVIDE: u8 = 0x4E;
    pub const LUT_HYSTERESIS: u8 = 0x4F;
    pub const LUT_T1: u8 = 0x50;
    pub const LUT_S1: u8 = 0x51;
    pub const AVERAGING_FILTER: u8 = 0xBF;
    pub const PRODUCT_ID: u8 = 0xFD;
    pub const MANUFACTURER_ID: u8 = 0xFE;
}

/// STATUS register bits (Table 6-13 in the datasheet).
mod status {
    pub const INTERNAL_HIGH: u8 = 0x40; // Bit 6: internal temp above limit
    pub const EXTERNAL_HIGH: u8 = 0x10; // Bit 4: external temp above limit
    pub const EXTERNAL_LOW: u8 = 0x08; // Bit 3: external temp below limit
    pub const EXTERNAL_FAULT: u8 = 0x04; // Bit 2: diode open or short
    pub const EXTERNAL_CRIT: u8 = 0x02; // Bit 1: external temp at critical
    pub const TACH_FAULT: u8 = 0x01; // Bit 0: tach count above limit
}

/// PWM carrier setting: 25.7 kHz from the 360 kHz base clock, inside the
/// 21-28 kHz band 4-pin fans accept.
const PWM_FREQ: u8 = 7;

/// Full-scale fan drive in PWM ticks at this carrier setting.
const PWM_FULL_DUTY: u8 = 2 * PWM_FREQ;

/// Tach conversion constant: RPM = 5,400,000 / count.
const TACH_NUMERATOR: u32 = 5_400_000;

/// Static configuration applied when the controller is opened.
#[derive(Debug, Clone)]
pub struct Emc2101Config {
    /// Alert limit for the internal (die) temperature, degC.
    pub internal_temperature_high: u8,
    /// Alert limit under which the external channel reports low, degC.
    pub external_temperature_low: u8,
    /// Alert limit over which the external channel reports high, degC.
    pub external_temperature_high: u8,
    /// Critical external temperature, degC. The critical hysteresis is
    /// critical minus high.
    pub external_temperature_critical: u8,
    /// Slowest fan speed the tach should still count as spinning. Must be
    /// nonzero.
    pub minimum_fan_rpm: u32,
}

impl Default for Emc2101Config {
    fn default() -> Self {
        Self {
            internal_temperature_high: 40,
            external_temperature_low: 18,
            external_temperature_high: 50,
            external_temperature_critical: 60,
            // The Noctua NF-A8's minimum rotational speed is 450 RPM +/- 20%.
            minimum_fan_rpm: 400,
        }
    }
}

/// Alert flags decoded from one STATUS read. All six are coincident with
/// the readings of the same poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    pub internal_temperature_high: bool,
    pub external_temperature_low: bool,
    pub external_temperature_high: bool,
    pub external_temperature_critical: bool,
    pub external_temperature_fault: bool,
    pub tach_fault: bool,
}

impl Status {
    fn from_byte(s: u8) -> Self {
        Self {
            internal_temperature_high: s & status::INTERNAL_HIGH != 0,
            external_temperature_low: s & status::EXTERNAL_LOW != 0,
            external_temperature_high: s & status::EXTERNAL_HIGH != 0,
            external_temperature_critical: s & status::EXTERNAL_CRIT != 0,
            external_temperature_fault: s & status::EXTERNAL_FAULT != 0,
            tach_fault: s & status::TACH_FAULT != 0,
        }
    }
}

/// Readings from one poll cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sample {
    /// Internal (die) temperature, whole degC.
    pub internal_temperature: i8,
    /// External (remote diode) temperature, 1/256 degC resolution.
    pub external_temperature: Temperature,
    /// Fan speed derived from the tach count; 0 when there is no signal.
    pub fan_speed_rpm: u32,
    /// Alert flags read in the same cycle.
    pub status: Status,
}

/// EMC2101 driver bound to an open bus transport.
#[derive(Debug)]
pub struct Emc2101<B: Smbus> {
    pub(crate) bus: B,
    config: Emc2101Config,
    target_temperature: i32,
    sample: Sample,
}

impl<B: Smbus> Emc2101<B> {
    /// Open the controller: verify chip identity, then bring it to a known
    /// state with the LUT disabled and the fan off.
    ///
    /// Returns [`DriverError::DeviceNotFound`] when the identity registers
    /// don't match; no handle exists in that case, so no operation can reach
    /// an unverified chip.
    pub fn open(bus: B, config: Emc2101Config) -> Result<Self> {
        let mut dev = Self {
            bus,
            config,
            target_temperature: 0,
            sample: Sample::default(),
        };
        dev.check_chip_id()?;
        dev.configure_static()?;
        dev.configure_temperature_limits()?;
        dev.configure_temperature_target()?;
        Ok(dev)
    }

    fn check_chip_id(&mut self) -> Result<()> {
        let pid = self.bus.read_byte(ADDRESS, regs::PRODUCT_ID)?;
        let mid = self.bus.read_byte(ADDRESS, regs::MANUFACTURER_ID)?;
        if pid != PRODUCT_ID || mid != MANUFACTURER_ID {
            return Err(DriverError::DeviceNotFound { chip: "EMC2101" });
        }
        Ok(())
    }

    fn configure_static(&mut self) -> Result<()> {
        // Enable the tach input, disable standby, enable the PWM output and
        // bus timeouts, enable TCRIT override and queuing.
        self.write(regs::CONFIG, 0x87)?;

        // 16 conversions per second leaves headroom for the averaging filter.
        self.write(regs::CONVERSION_RATE, 0x08)?;

        // No interrupt pin is wired up; mask everything.
        self.write(regs::ALERT_MASK, 0xFF)?;

        // Ideality 1.0040 for a typical 2N3904 NPN transistor.
        self.write(regs::IDEALITY_FACTOR, 0x0F)?;

        // Diode-connected transistor: beta compensation off, per the data
        // sheet's recommendation.
        self.write(regs::BETA_COMPENSATION, 0x07)?;

        // Counts above this limit read as a stalled fan.
        let rpm = self.config.minimum_fan_rpm.max(1);
        let limit = (TACH_NUMERATOR / rpm).min(u16::MAX as u32) as u16;
        self.write(regs::TACH_LIMIT_LSB, (limit & 0xFF) as u8)?;
        self.write(regs::TACH_LIMIT_MSB, (limit >> 8) as u8)?;

        // 25.7 kHz PWM carrier from the 360 kHz base clock.
        self.write(regs::PWM_FREQ, PWM_FREQ)?;
        self.write(regs::PWM_FREQ_DIVIDE, 1)?;

        // Spin up at 50% drive for at most 3.2 s, keeping startup quiet.
        self.write(regs::FAN_SPIN_UP, 0x2F)?;

        // Fan off while the LUT is disabled.
        self.write(regs::FAN_SETTING, 0)?;

        // Averaging level 2 guards against electrical noise on the diode.
        self.write(regs::AVERAGING_FILTER, 0x06)
    }

    fn configure_temperature_limits(&mut self) -> Result<()> {
        let internal_high = self.config.internal_temperature_high;
        let external_low = self.config.external_temperature_low;
        let external_high = self.config.external_temperature_high;
        let critical = self.config.external_temperature_critical;

        self.write(regs::LIMIT_INTERNAL_HIGH, internal_high)?;
        self.write(regs::LIMIT_EXTERNAL_LOW_MSB, external_low)?;
        self.write(regs::LIMIT_EXTERNAL_LOW_LSB, 0)?;
        self.write(regs::LIMIT_EXTERNAL_HIGH_MSB, external_high)?;
        self.write(regs::LIMIT_EXTERNAL_HIGH_LSB, 0)?;
        self.write(regs::LIMIT_TCRIT, critical)?;
        self.write(
            regs::LIMIT_TCRIT_HYSTERESIS,
            critical.saturating_sub(external_high),
        )
    }

    /// Retarget the regulation loop. Writing the current target is a no-op;
    /// any other value reprograms the whole LUT, so the cost and the failure
    /// mode are visible at the call site.
    ///
    /// A target of 0 disables the LUT and forces the fan off.
    pub fn set_target_temperature(&mut self, target: i32) -> Result<()> {
        if target != self.target_temperature {
            self.target_temperature = target;
            self.configure_temperature_target()?;
        }
        Ok(())
    }

    /// Target the LUT currently regulates toward; 0 means disabled.
    pub fn target_temperature(&self) -> i32 {
        self.target_temperature
    }

    fn configure_temperature_target(&mut self) -> Result<()> {
        // The first fan-config write makes the LUT registers writable. The
        // fan-setting register was initialized to zero, so the fan turns off
        // if the LUT stays disabled.
        self.write(regs::FAN_CONFIG, 0x27)?;
        if self.target_temperature > 0 {
            // Low hysteresis for fine-grained control around the target; the
            // averaging filter keeps the duty from surging.
            self.write(regs::LUT_HYSTERESIS, 1)?;

            for (index, (temperature, ticks)) in
                lut_entries(self.target_temperature).into_iter().enumerate()
            {
                self.write_lut_entry(index, temperature, ticks)?;
            }
            self.write_lut_padding(6)?;
            self.write_lut_padding(7)?;

            // Lock the LUT and let the chip run it.
            self.write(regs::FAN_CONFIG, 0x07)?;
        }
        Ok(())
    }

    fn write_lut_entry(&mut self, index: usize, temperature: u8, ticks: u8) -> Result<()> {
        let offset = (index * 2) as u8;
        self.write(regs::LUT_T1 + offset, temperature)?;
        self.write(regs::LUT_S1 + offset, ticks)
    }

    fn write_lut_padding(&mut self, index: usize) -> Result<()> {
        // Sentinels beyond any realistic reading keep the spare slots inert.
        let offset = (index * 2) as u8;
        self.write(regs::LUT_T1 + offset, 0x7F)?;
        self.write(regs::LUT_S1 + offset, 0x3F)
    }

    /// Sample both temperature channels, the fan tach, and the status flags.
    ///
    /// The whole cycle commits together: on any read failure the previous
    /// sample is kept, since callers poll periodically and stale-but-valid
    /// beats an error-visible gap.
    pub fn poll(&mut self) -> Result<()> {
        let internal = self.bus.read_byte(ADDRESS, regs::TEMP_INTERNAL)? as i8;

        // MSB first: the MSB read latches the LSB.
        let msb = self.bus.read_byte(ADDRESS, regs::TEMP_EXTERNAL_MSB)?;
        let lsb = self.bus.read_byte(ADDRESS, regs::TEMP_EXTERNAL_LSB)?;
        let external = Temperature::from_registers(msb, lsb);

        // LSB first: the tach latches in the opposite order.
        let lsb = self.bus.read_byte(ADDRESS, regs::TACH_READING_LSB)?;
        let msb = self.bus.read_byte(ADDRESS, regs::TACH_READING_MSB)?;
        let count = u16::from_le_bytes([lsb, msb]);

        let status = Status::from_byte(self.bus.read_byte(ADDRESS, regs::STATUS)?);

        self.sample = Sample {
            internal_temperature: internal,
            external_temperature: external,
            fan_speed_rpm: rpm_from_tach(count),
            status,
        };
        trace!(
            "sample: int {} degC, ext {} degC, {} RPM",
            internal, external, self.sample.fan_speed_rpm
        );
        Ok(())
    }

    /// Readings from the most recent successful poll.
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    fn write(&mut self, reg: u8, value: u8) -> Result<()> {
        Ok(self.bus.write_byte(ADDRESS, reg, value)?)
    }
}

/// The six (temperature, duty ticks) LUT entries for a positive target:
/// 20% more drive every 2 degC above the target, saturating at 100%.
/// Temperatures are clamped to the chip's 0-127 degC range.
fn lut_entries(target: i32) -> [(u8, u8); 6] {
    let mut entries = [(0u8, 0u8); 6];
    for (i, entry) in entries.iter_mut().enumerate() {
        let temperature = (target + 2 * i as i32).clamp(0, 127) as u8;
        let duty = Percent::new_clamped(20 * i as u8);
        *entry = (temperature, duty_ticks(duty));
    }
    entries
}

/// Convert a LUT duty percentage to PWM ticks. Rounds up: each step drives
/// at least as hard as the percentage asks.
fn duty_ticks(duty: Percent) -> u8 {
    (u8::from(duty) as u16 * PWM_FULL_DUTY as u16).div_ceil(100) as u8
}

/// Fan speed from a raw tach count. Zero and saturated counts both mean no
/// valid tach signal.
fn rpm_from_tach(count: u16) -> u32 {
    if count == 0 || count == u16::MAX {
        return 0;
    }
    (TACH_NUMERATOR as f64 / count as f64).round() as u32
}
