//! Peripheral chip drivers.
//!
//! This module contains drivers for the enclosure's I2C management chips:
//! the EMC2101 fan controller and temperature sensor, the AW9523 GPIO/LED
//! expander, and the PCA9685 PWM driver. All drivers are generic over the
//! [`crate::bus::Smbus`] transport.

pub mod aw9523;
pub mod emc2101;
pub mod pca9685;

use thiserror::Error;

use crate::bus::BusError;

/// Errors produced by the peripheral drivers.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The underlying bus transaction failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The identity registers did not match the expected chip.
    #[error("{chip} not found on the I2C bus")]
    DeviceNotFound { chip: &'static str },

    /// Pin or channel index outside 0-15.
    #[error("invalid pin number {0}")]
    InvalidPin(u8),

    /// Caller-supplied value outside the register range. Raised before any
    /// bus write, so no partial device state is left behind.
    #[error("value {value} out of range 0-{max}")]
    InvalidValue { value: u32, max: u32 },

    /// The requested PWM frequency needs a prescaler below the chip minimum.
    #[error("PWM frequency too high")]
    FrequencyTooHigh,

    /// The requested PWM frequency needs a prescaler above the chip maximum.
    #[error("PWM frequency too low")]
    FrequencyTooLow,
}

/// Convenient Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
