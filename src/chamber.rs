//! Enclosure controller glue.
//!
//! Ties the fan controller and the I/O expander together the way the
//! enclosure wires them: the power-supply relay on expander pin 8, the
//! chamber light on pin 9, and the fan regulated toward a target that
//! depends on whether the printer bed is heating. A device that failed to
//! open is tolerated: its operations become no-ops so the rest of the
//! enclosure keeps working, and construction can be retried later.

use tracing::{debug, error, info};

use crate::{
    bus::Smbus,
    peripheral::{
        self,
        aw9523::{Aw9523, LedPin, OutputPin},
        emc2101::Emc2101,
    },
    settings::Settings,
    types::{Percent, Temperature},
};

/// Expander pin wired to the power-supply relay.
const RELAY_PIN: u8 = 8;

/// Expander pin sinking the chamber light LEDs.
const LIGHT_PIN: u8 = 9;

/// Chamber light modes. The toggle cycles one step dimmer per press,
/// wrapping from off back to high.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LightMode {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl LightMode {
    /// Brightness for this mode, read from the settings store.
    fn brightness(self, settings: &Settings) -> Percent {
        match self {
            LightMode::Off => Percent::ZERO,
            LightMode::Low => Percent::new_clamped(settings.chamber_light_brightness_low),
            LightMode::Medium => Percent::new_clamped(settings.chamber_light_brightness_medium),
            LightMode::High => Percent::new_clamped(settings.chamber_light_brightness_high),
        }
    }

    fn next_dimmer(self) -> Self {
        match self {
            LightMode::High => LightMode::Medium,
            LightMode::Medium => LightMode::Low,
            LightMode::Low => LightMode::Off,
            LightMode::Off => LightMode::High,
        }
    }
}

/// Snapshot published to the notifier after a poll that changed something.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChamberState {
    /// Last known chamber (external diode) temperature.
    pub chamber_temperature: Option<Temperature>,
    /// Current light mode.
    pub light_mode: LightMode,
}

/// The enclosure controller.
///
/// Owns one fan controller and one I/O expander, each with its own handle
/// to the shared bus number; all access happens from a single task, so the
/// handles never race.
pub struct Chamber<B: Smbus> {
    fan: Option<Emc2101<B>>,
    io: Option<Aw9523<B>>,
    relay: Option<OutputPin>,
    light: Option<LedPin>,
    light_mode: LightMode,
    heating: bool,
    heating_changed: bool,
    chamber_temperature: Option<Temperature>,
}

impl<B: Smbus> Chamber<B> {
    /// Assemble the controller from whichever devices opened.
    ///
    /// The expander is reset and its relay and light pins claimed here; if
    /// that fails the expander is dropped and logged, matching the
    /// fan-absent behavior.
    pub fn new(fan: Option<Emc2101<B>>, io: Option<Aw9523<B>>) -> Self {
        let mut chamber = Self {
            fan,
            io,
            relay: None,
            light: None,
            light_mode: LightMode::default(),
            heating: false,
            heating_changed: false,
            chamber_temperature: None,
        };
        if let Some(io) = chamber.io.as_mut() {
            match claim_pins(io) {
                Ok((relay, light)) => {
                    chamber.relay = Some(relay);
                    chamber.light = Some(light);
                }
                Err(e) => {
                    error!("Failed to configure the I/O expander: {}", e);
                    chamber.io = None;
                }
            }
        }
        chamber
    }

    /// One poll cycle: apply a pending target change, then sample the fan
    /// controller. Returns the new state when the chamber temperature
    /// moved, so the caller can notify.
    ///
    /// Poll failures are logged and swallowed; the previous sample stays
    /// valid and the next cycle retries.
    pub fn poll(&mut self, settings: &Settings) -> Option<ChamberState> {
        if self.heating_changed {
            self.heating_changed = false;
            self.update_target_temperature(settings);
        }

        let fan = self.fan.as_mut()?;
        if let Err(e) = fan.poll() {
            error!("Failed to poll the fan controller: {}", e);
            return None;
        }
        let sample = *fan.sample();
        debug!(
            "fan: int {} degC, ext {} degC, tgt {} degC, spd {} RPM, status {:?}",
            sample.internal_temperature,
            sample.external_temperature,
            fan.target_temperature(),
            sample.fan_speed_rpm,
            sample.status,
        );

        if self.chamber_temperature != Some(sample.external_temperature) {
            self.chamber_temperature = Some(sample.external_temperature);
            return Some(self.state());
        }
        None
    }

    /// Current published state.
    pub fn state(&self) -> ChamberState {
        ChamberState {
            chamber_temperature: self.chamber_temperature,
            light_mode: self.light_mode,
        }
    }

    /// Last known chamber temperature.
    pub fn chamber_temperature(&self) -> Option<Temperature> {
        self.chamber_temperature
    }

    /// Record whether the printer bed is heating. The matching target takes
    /// effect on the next poll.
    pub fn set_heating(&mut self, heating: bool) {
        if self.heating != heating {
            self.heating = heating;
            self.heating_changed = true;
        }
    }

    /// Re-read the target for the current regime and reprogram the fan
    /// controller's LUT. Called from the poll cycle and after settings
    /// changes.
    pub fn update_target_temperature(&mut self, settings: &Settings) {
        let Some(fan) = self.fan.as_mut() else { return };
        let target = if self.heating {
            settings.chamber_target_temperature_when_heating
        } else {
            settings.chamber_target_temperature_when_cooling
        };
        match fan.set_target_temperature(target) {
            Ok(()) => info!(
                "new target temperature {} degC, heating {}",
                target, self.heating
            ),
            Err(e) => error!("Failed to update fan controller target temperature: {}", e),
        }
    }

    /// Select a light mode and drive the LED current to match.
    pub fn set_light_mode(&mut self, mode: LightMode, settings: &Settings) {
        if mode == self.light_mode {
            return;
        }
        info!("Setting chamber light mode to {:?}", mode);
        self.light_mode = mode;
        self.update_light(settings);
    }

    /// Cycle the light one step dimmer, wrapping to high after off.
    pub fn toggle_light_mode(&mut self, settings: &Settings) {
        self.set_light_mode(self.light_mode.next_dimmer(), settings);
    }

    /// Current light mode.
    pub fn light_mode(&self) -> LightMode {
        self.light_mode
    }

    /// Re-apply the current mode's brightness, e.g. after a settings change.
    pub fn update_light(&mut self, settings: &Settings) {
        let level = self.light_mode.brightness(settings).of(255);
        let (Some(io), Some(light)) = (self.io.as_mut(), self.light.as_ref()) else {
            return;
        };
        if let Err(e) = io.set_led_level(light, level) {
            error!("Failed to set the chamber light level: {}", e);
        }
    }

    /// Switch the power-supply relay.
    pub fn set_power(&mut self, on: bool) {
        info!("Switching power supply {}", if on { "on" } else { "off" });
        let (Some(io), Some(relay)) = (self.io.as_mut(), self.relay.as_ref()) else {
            return;
        };
        if let Err(e) = io.set_output(relay, on) {
            error!("Failed to switch the power relay: {}", e);
        }
    }

    /// Relay state read back from the expander; false when the expander is
    /// absent.
    pub fn power_state(&mut self) -> bool {
        let (Some(io), Some(relay)) = (self.io.as_mut(), self.relay.as_ref()) else {
            return false;
        };
        io.output_state(relay).unwrap_or_else(|e| {
            error!("Failed to read the power relay state: {}", e);
            false
        })
    }
}

fn claim_pins<B: Smbus>(io: &mut Aw9523<B>) -> peripheral::Result<(OutputPin, LedPin)> {
    io.reset()?;
    let relay = io.output_pin(RELAY_PIN)?;
    let light = io.led_pin(LIGHT_PIN)?;
    Ok((relay, light))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::{aw9523, emc2101, emc2101::Emc2101Config};
    use crate::test_utils::FakeSmbus;

    fn fan() -> Emc2101<FakeSmbus> {
        let mut bus = FakeSmbus::new();
        bus.seed(emc2101::ADDRESS, 0xFD, 0x16);
        bus.seed(emc2101::ADDRESS, 0xFE, 0x5D);
        Emc2101::open(bus, Emc2101Config::default()).unwrap()
    }

    fn io() -> Aw9523<FakeSmbus> {
        let mut bus = FakeSmbus::new();
        bus.seed(aw9523::ADDRESS, 0x10, 0x23);
        Aw9523::open(bus).unwrap()
    }

    fn chamber() -> Chamber<FakeSmbus> {
        Chamber::new(Some(fan()), Some(io()))
    }

    #[test]
    fn construction_claims_relay_and_light_pins() {
        let chamber = chamber();
        assert!(chamber.relay.is_some());
        assert!(chamber.light.is_some());
        let io = chamber.io.as_ref().unwrap();
        // Relay (pin 8): direction bit clear, mode bit set in the upper port
        assert_eq!(io.bus.register(aw9523::ADDRESS, 0x05) & 0x01, 0);
        assert_eq!(io.bus.register(aw9523::ADDRESS, 0x13) & 0x01, 0x01);
        // Light (pin 9): LED mode, so its mode bit is clear
        assert_eq!(io.bus.register(aw9523::ADDRESS, 0x13) & 0x02, 0);
    }

    #[test]
    fn heating_change_retargets_on_next_poll() {
        let mut chamber = chamber();
        let settings = Settings::default();

        chamber.set_heating(true);
        chamber.poll(&settings);
        assert_eq!(
            chamber.fan.as_ref().unwrap().target_temperature(),
            settings.chamber_target_temperature_when_heating
        );

        chamber.set_heating(false);
        chamber.poll(&settings);
        assert_eq!(
            chamber.fan.as_ref().unwrap().target_temperature(),
            settings.chamber_target_temperature_when_cooling
        );
    }

    #[test]
    fn poll_reports_only_temperature_changes() {
        let mut chamber = chamber();
        let settings = Settings::default();

        chamber
            .fan
            .as_mut()
            .unwrap()
            .bus
            .seed(emc2101::ADDRESS, 0x01, 25);
        let state = chamber.poll(&settings).expect("first poll reports");
        assert_eq!(
            state.chamber_temperature,
            Some(Temperature::from_degrees(25))
        );
        // Unchanged reading: nothing to report
        assert!(chamber.poll(&settings).is_none());
    }

    #[test]
    fn toggle_cycles_downward_from_high() {
        let mut chamber = chamber();
        let settings = Settings::default();

        let expected = [
            LightMode::High,
            LightMode::Medium,
            LightMode::Low,
            LightMode::Off,
            LightMode::High,
        ];
        for mode in expected {
            chamber.toggle_light_mode(&settings);
            assert_eq!(chamber.light_mode(), mode);
        }
    }

    #[test]
    fn light_mode_drives_scaled_led_level() {
        let mut chamber = chamber();
        let settings = Settings::default();

        chamber.set_light_mode(LightMode::Low, &settings);
        // 10% brightness -> 25/255, written to pin 9's current register
        let io = chamber.io.as_ref().unwrap();
        assert_eq!(io.bus.register(aw9523::ADDRESS, 0x21), 25);

        chamber.set_light_mode(LightMode::High, &settings);
        let io = chamber.io.as_ref().unwrap();
        assert_eq!(io.bus.register(aw9523::ADDRESS, 0x21), 255);
    }

    #[test]
    fn relay_switches_and_reads_back() {
        let mut chamber = chamber();
        assert!(!chamber.power_state());
        chamber.set_power(true);
        assert!(chamber.power_state());
        chamber.set_power(false);
        assert!(!chamber.power_state());
    }

    #[test]
    fn absent_devices_degrade_to_no_ops() {
        let mut chamber: Chamber<FakeSmbus> = Chamber::new(None, None);
        let settings = Settings::default();

        assert!(chamber.poll(&settings).is_none());
        chamber.set_power(true);
        assert!(!chamber.power_state());
        chamber.set_light_mode(LightMode::High, &settings);
        assert_eq!(chamber.light_mode(), LightMode::High);
    }
}
