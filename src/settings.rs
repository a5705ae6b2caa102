//! On-demand settings store for the enclosure controller.
//!
//! Holds the host-facing knobs: chamber target temperatures for the heating
//! and cooling regimes and the three chamber-light brightness levels. The
//! file is re-read whenever a consumer wants fresh values; nothing here is
//! cached by the driver layer, so out-of-band edits take effect on the next
//! use.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Integer settings consumed by the chamber controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chamber target while the printer bed is heating, degC.
    pub chamber_target_temperature_when_heating: i32,
    /// Chamber target while the print cools down, degC.
    pub chamber_target_temperature_when_cooling: i32,
    /// Chamber light brightness in low mode, percent.
    pub chamber_light_brightness_low: u8,
    /// Chamber light brightness in medium mode, percent.
    pub chamber_light_brightness_medium: u8,
    /// Chamber light brightness in high mode, percent.
    pub chamber_light_brightness_high: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chamber_target_temperature_when_heating: 40,
            chamber_target_temperature_when_cooling: 30,
            chamber_light_brightness_low: 10,
            chamber_light_brightness_medium: 50,
            chamber_light_brightness_high: 100,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults; a
    /// present but malformed file is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
