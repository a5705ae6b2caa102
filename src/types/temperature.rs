//! Fixed-point temperature, as reported by the fan controller's external
//! diode channel.
//!
//! The chip delivers a signed integer byte plus an 8-bit fraction in units
//! of 1/256 degC. The raw 1/256 degC count is stored as-is so readings
//! compare exactly; nothing is lost to floating-point until display.

use std::fmt;

/// Temperature in 1/256 degC steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Temperature {
    raw: i16,
}

impl Temperature {
    /// Build from the chip's register pair: signed integer MSB, then the
    /// 1/256 fraction LSB.
    pub fn from_registers(msb: u8, lsb: u8) -> Self {
        Self {
            raw: ((msb as i8 as i16) << 8) | lsb as i16,
        }
    }

    /// Build from a whole number of degrees.
    pub fn from_degrees(degrees: i8) -> Self {
        Self {
            raw: (degrees as i16) << 8,
        }
    }

    /// Raw reading in 1/256 degC units.
    pub fn raw(&self) -> i16 {
        self.raw
    }

    /// Temperature in degC. Exact: the fraction is a multiple of 1/256.
    pub fn degrees(&self) -> f32 {
        self.raw as f32 / 256.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_positive_fraction() {
        let t = Temperature::from_registers(25, 128);
        assert_eq!(t.degrees(), 25.5);
        assert_eq!(t.raw(), 25 * 256 + 128);
    }

    #[test]
    fn decodes_negative_whole() {
        // -10 degC arrives as the unsigned byte 246
        let t = Temperature::from_registers(246, 0);
        assert_eq!(t.degrees(), -10.0);
    }

    #[test]
    fn fraction_offsets_negative_integer_part() {
        // -1 + 128/256 = -0.5
        let t = Temperature::from_registers(255, 128);
        assert_eq!(t.degrees(), -0.5);
    }

    #[test]
    fn from_degrees_round_trips() {
        assert_eq!(Temperature::from_degrees(40).degrees(), 40.0);
        assert_eq!(Temperature::from_degrees(-40).degrees(), -40.0);
    }

    #[test]
    fn ordering_follows_raw_value() {
        let cold = Temperature::from_registers(246, 0);
        let warm = Temperature::from_registers(25, 128);
        assert!(cold < warm);
    }

    #[test]
    fn equality_is_exact() {
        assert_eq!(
            Temperature::from_registers(25, 128),
            Temperature::from_registers(25, 128)
        );
        assert_ne!(
            Temperature::from_registers(25, 128),
            Temperature::from_registers(25, 129)
        );
    }

    #[test]
    fn displays_in_degrees() {
        assert_eq!(Temperature::from_registers(25, 128).to_string(), "25.5");
        assert_eq!(Temperature::from_degrees(0).to_string(), "0");
    }
}
