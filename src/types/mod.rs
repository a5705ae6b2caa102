//! Shared value types for the enclosure drivers.
//!
//! Small unit-aware newtypes following the pattern of `std::time::Duration`:
//! store the raw chip representation, convert on access.

mod percent;
mod temperature;

pub use percent::Percent;
pub use temperature::Temperature;
