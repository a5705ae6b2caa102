//! chamberd: 3D-printer enclosure controller.
//!
//! Drives the enclosure's I2C management chips: an EMC2101 fan controller
//! and temperature sensor, an AW9523 GPIO/LED expander for the power relay
//! and chamber light, and a PCA9685 PWM driver. The `chamber` module ties
//! the drivers together; `daemon` hosts the poll loop and shutdown handling.

pub mod bus;
pub mod chamber;
pub mod daemon;
pub mod error;
pub mod peripheral;
pub mod settings;
pub mod tracing;
pub mod types;

#[cfg(test)]
pub mod test_utils;
