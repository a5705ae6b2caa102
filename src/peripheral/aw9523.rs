//! AW9523 16-pin GPIO and constant-current LED expander driver.
//!
//! Pins come in three mutually exclusive capabilities: digital input,
//! digital output (the enclosure's power relay), and constant-current LED
//! sink (the chamber light). Acquiring a pin configures its direction and
//! mode bits and returns a token; operations take the token together with
//! the owning driver, so a pin cannot be driven without its open device.
//!
//! Datasheet: <https://cdn-shop.adafruit.com/product-files/4886/AW9523+English+Datasheet.pdf>

use crate::bus::Smbus;

use super::{DriverError, Result};

/// I2C address of the AW9523.
pub const ADDRESS: u8 = 0x58;

/// Expected value of the ID register.
const CHIP_ID: u8 = 0x23;

/// AW9523 register addresses. Port registers come in pairs: pins 0-7 at the
/// base address, pins 8-15 at base+1.
mod regs {
    pub const PORT_INPUT_BASE: u8 = 0x00;
    pub const PORT_OUTPUT_BASE: u8 = 0x02;
    pub const PORT_DIRECTION_BASE: u8 = 0x04;
    pub const CONTROL: u8 = 0x07;
    pub const ID: u8 = 0x10;
    pub const PORT_MODE_BASE: u8 = 0x12;
    pub const PORT_CURRENT_BASE: u8 = 0x20;
    pub const RESET: u8 = 0x7F;
}

/// Digital input capability for one pin.
#[derive(Debug)]
pub struct InputPin {
    pin: u8,
}

/// Digital output capability for one pin.
#[derive(Debug)]
pub struct OutputPin {
    pin: u8,
}

/// Constant-current LED capability for one pin. Write-only: the chip
/// provides no current-level readback.
#[derive(Debug)]
pub struct LedPin {
    reg: u8,
}

/// AW9523 driver bound to an open bus transport.
#[derive(Debug)]
pub struct Aw9523<B: Smbus> {
    pub(crate) bus: B,
}

impl<B: Smbus> Aw9523<B> {
    /// Open the expander, verifying chip identity.
    pub fn open(bus: B) -> Result<Self> {
        let mut dev = Self { bus };
        let id = dev.bus.read_byte(ADDRESS, regs::ID)?;
        if id != CHIP_ID {
            return Err(DriverError::DeviceNotFound { chip: "AW9523" });
        }
        Ok(dev)
    }

    /// Restore factory defaults, then select push-pull output drive and the
    /// quarter-scale (~9.25 mA) LED current limit.
    pub fn reset(&mut self) -> Result<()> {
        self.bus.write_byte(ADDRESS, regs::RESET, 0x00)?;
        Ok(self.bus.write_byte(ADDRESS, regs::CONTROL, 0x13)?)
    }

    /// Configure `pin` as a digital input.
    pub fn input_pin(&mut self, pin: u8) -> Result<InputPin> {
        check_pin(pin)?;
        self.write_port_bit(pin, regs::PORT_DIRECTION_BASE, true)?;
        self.write_port_bit(pin, regs::PORT_MODE_BASE, true)?;
        Ok(InputPin { pin })
    }

    /// Configure `pin` as a digital output.
    pub fn output_pin(&mut self, pin: u8) -> Result<OutputPin> {
        check_pin(pin)?;
        self.write_port_bit(pin, regs::PORT_DIRECTION_BASE, false)?;
        self.write_port_bit(pin, regs::PORT_MODE_BASE, true)?;
        Ok(OutputPin { pin })
    }

    /// Configure `pin` as a constant-current LED sink. The direction
    /// register does not apply in LED mode and is left untouched.
    pub fn led_pin(&mut self, pin: u8) -> Result<LedPin> {
        check_pin(pin)?;
        self.write_port_bit(pin, regs::PORT_MODE_BASE, false)?;
        Ok(LedPin {
            reg: led_current_register(pin),
        })
    }

    /// Electrical state of an input pin.
    pub fn read_input(&mut self, pin: &InputPin) -> Result<bool> {
        self.read_port_bit(pin.pin, regs::PORT_INPUT_BASE)
    }

    /// Driven state of an output pin, read back from the output register
    /// rather than a cached value.
    pub fn output_state(&mut self, pin: &OutputPin) -> Result<bool> {
        self.read_port_bit(pin.pin, regs::PORT_OUTPUT_BASE)
    }

    /// Drive an output pin high or low.
    pub fn set_output(&mut self, pin: &OutputPin, state: bool) -> Result<()> {
        self.write_port_bit(pin.pin, regs::PORT_OUTPUT_BASE, state)
    }

    /// Set an LED pin's current level, 0 (off) to 255 (maximum).
    pub fn set_led_level(&mut self, pin: &LedPin, level: u8) -> Result<()> {
        Ok(self.bus.write_byte(ADDRESS, pin.reg, level)?)
    }

    fn read_port_bit(&mut self, pin: u8, base: u8) -> Result<bool> {
        let (reg, bit) = port_bit(pin, base);
        Ok(self.bus.read_byte(ADDRESS, reg)? & bit != 0)
    }

    /// Read-modify-write one port bit, skipping the write when the register
    /// value would not change.
    fn write_port_bit(&mut self, pin: u8, base: u8, state: bool) -> Result<()> {
        let (reg, bit) = port_bit(pin, base);
        let old = self.bus.read_byte(ADDRESS, reg)?;
        let new = if state { old | bit } else { old & !bit };
        if new != old {
            self.bus.write_byte(ADDRESS, reg, new)?;
        }
        Ok(())
    }
}

fn check_pin(pin: u8) -> Result<()> {
    if pin > 15 {
        return Err(DriverError::InvalidPin(pin));
    }
    Ok(())
}

fn port_bit(pin: u8, base: u8) -> (u8, u8) {
    let reg = if pin < 8 { base } else { base + 1 };
    (reg, 1 << (pin & 7))
}

/// Current-level register for an LED pin. The mapping follows the chip's
/// internal crossbar rather than pin order: pins 0-7 sit at base+4..=base+11,
/// pins 8-11 wrap down to base..=base+3, pins 12-15 sit at base+12..=base+15.
fn led_current_register(pin: u8) -> u8 {
    let base = regs::PORT_CURRENT_BASE;
    if pin < 8 {
        base + pin + 4
    } else if pin < 12 {
        base + pin - 8
    } else {
        base + pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeSmbus;

    fn open_expander() -> Aw9523<FakeSmbus> {
        let mut bus = FakeSmbus::new();
        bus.seed(ADDRESS, regs::ID, CHIP_ID);
        Aw9523::open(bus).unwrap()
    }

    fn port_reg(pin: u8, base: u8) -> u8 {
        if pin < 8 { base } else { base + 1 }
    }

    #[test]
    fn open_rejects_unknown_chip() {
        let mut bus = FakeSmbus::new();
        bus.seed(ADDRESS, regs::ID, 0x42);
        let err = Aw9523::open(bus).unwrap_err();
        assert!(matches!(err, DriverError::DeviceNotFound { chip: "AW9523" }));
    }

    #[test]
    fn reset_restores_defaults_and_control() {
        let mut io = open_expander();
        io.reset().unwrap();
        assert_eq!(io.bus.writes, vec![
            (ADDRESS, regs::RESET, 0x00),
            (ADDRESS, regs::CONTROL, 0x13),
        ]);
    }

    #[test]
    fn input_pin_sets_only_its_direction_and_mode_bits() {
        for pin in 0..16 {
            let mut io = open_expander();
            io.input_pin(pin).unwrap();

            let bit = 1u8 << (pin & 7);
            let dir_reg = port_reg(pin, regs::PORT_DIRECTION_BASE);
            let mode_reg = port_reg(pin, regs::PORT_MODE_BASE);
            assert_eq!(io.bus.register(ADDRESS, dir_reg), bit);
            assert_eq!(io.bus.register(ADDRESS, mode_reg), bit);
            // The sibling registers of the other port stay untouched
            let other_dir = port_reg(pin ^ 8, regs::PORT_DIRECTION_BASE);
            assert_eq!(io.bus.register(ADDRESS, other_dir), 0);
        }
    }

    #[test]
    fn output_pin_clears_direction_and_sets_mode() {
        for pin in 0..16 {
            let mut io = open_expander();
            // Start with every pin configured as input
            io.bus.seed(ADDRESS, regs::PORT_DIRECTION_BASE, 0xFF);
            io.bus.seed(ADDRESS, regs::PORT_DIRECTION_BASE + 1, 0xFF);
            io.output_pin(pin).unwrap();

            let bit = 1u8 << (pin & 7);
            let dir_reg = port_reg(pin, regs::PORT_DIRECTION_BASE);
            let mode_reg = port_reg(pin, regs::PORT_MODE_BASE);
            assert_eq!(io.bus.register(ADDRESS, dir_reg), !bit);
            assert_eq!(io.bus.register(ADDRESS, mode_reg), bit);
        }
    }

    #[test]
    fn led_pin_clears_mode_and_ignores_direction() {
        for pin in 0..16 {
            let mut io = open_expander();
            io.bus.seed(ADDRESS, regs::PORT_MODE_BASE, 0xFF);
            io.bus.seed(ADDRESS, regs::PORT_MODE_BASE + 1, 0xFF);
            io.led_pin(pin).unwrap();

            let bit = 1u8 << (pin & 7);
            let mode_reg = port_reg(pin, regs::PORT_MODE_BASE);
            assert_eq!(io.bus.register(ADDRESS, mode_reg), !bit);
            assert_eq!(io.bus.write_count(ADDRESS, port_reg(pin, regs::PORT_DIRECTION_BASE)), 0);
        }
    }

    #[test]
    fn pin_indices_above_fifteen_are_rejected() {
        let mut io = open_expander();
        assert!(matches!(io.input_pin(16), Err(DriverError::InvalidPin(16))));
        assert!(matches!(io.output_pin(255), Err(DriverError::InvalidPin(255))));
        assert!(matches!(io.led_pin(16), Err(DriverError::InvalidPin(16))));
    }

    #[test]
    fn repeated_output_writes_are_idempotent() {
        let mut io = open_expander();
        let relay = io.output_pin(8).unwrap();
        let reg = port_reg(8, regs::PORT_OUTPUT_BASE);

        io.set_output(&relay, true).unwrap();
        assert_eq!(io.bus.write_count(ADDRESS, reg), 1);
        // Second identical write is skipped
        io.set_output(&relay, true).unwrap();
        assert_eq!(io.bus.write_count(ADDRESS, reg), 1);

        io.set_output(&relay, false).unwrap();
        assert_eq!(io.bus.write_count(ADDRESS, reg), 2);
    }

    #[test]
    fn output_state_reads_back_the_output_register() {
        let mut io = open_expander();
        let relay = io.output_pin(8).unwrap();
        assert!(!io.output_state(&relay).unwrap());
        io.set_output(&relay, true).unwrap();
        assert!(io.output_state(&relay).unwrap());
    }

    #[test]
    fn input_pin_reads_the_input_register() {
        let mut io = open_expander();
        let button = io.input_pin(3).unwrap();
        assert!(!io.read_input(&button).unwrap());
        io.bus.seed(ADDRESS, regs::PORT_INPUT_BASE, 0x08);
        assert!(io.read_input(&button).unwrap());
    }

    #[test]
    fn led_current_registers_follow_the_crossbar() {
        let expected = [
            (0u8, 0x24u8),
            (7, 0x2B),
            (8, 0x20),
            (9, 0x21),
            (11, 0x23),
            (12, 0x2C),
            (15, 0x2F),
        ];
        for (pin, reg) in expected {
            assert_eq!(led_current_register(pin), reg, "pin {pin}");
        }
    }

    #[test]
    fn led_level_writes_to_the_mapped_register() {
        let mut io = open_expander();
        let light = io.led_pin(9).unwrap();
        io.set_led_level(&light, 128).unwrap();
        assert_eq!(io.bus.register(ADDRESS, 0x21), 128);
    }
}
