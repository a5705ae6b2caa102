//! Daemon lifecycle management for chamberd.
//!
//! This module handles initialization of the enclosure hardware, the
//! periodic poll task, the notifier, signal handling, and graceful
//! shutdown.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    bus::LinuxSmbus,
    chamber::{Chamber, ChamberState},
    error::Error,
    peripheral::{
        DriverError,
        aw9523::Aw9523,
        emc2101::{Emc2101, Emc2101Config},
    },
    settings::Settings,
    tracing::prelude::*,
};

/// Interval between fan controller polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// I2C bus the enclosure chips hang off by default.
const DEFAULT_BUS: u8 = 11;

/// Default location of the settings file.
const DEFAULT_SETTINGS_PATH: &str = "/etc/chamberd/settings.json";

/// Runtime options for the daemon, read from the environment.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// I2C bus number the enclosure chips share.
    pub bus_number: u8,
    /// Path to the settings file.
    pub settings_path: PathBuf,
}

impl DaemonConfig {
    /// Read configuration from CHAMBERD_I2C_BUS and CHAMBERD_SETTINGS,
    /// falling back to the enclosure's standard wiring.
    pub fn from_env() -> crate::error::Result<Self> {
        let bus_number = match env::var("CHAMBERD_I2C_BUS") {
            Ok(value) => value
                .parse()
                .map_err(|_| Error::Config(format!("bad CHAMBERD_I2C_BUS value: {value}")))?,
            Err(_) => DEFAULT_BUS,
        };
        let settings_path = env::var_os("CHAMBERD_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
        Ok(Self {
            bus_number,
            settings_path,
        })
    }
}

/// The daemon that owns the enclosure hardware and its poll loop.
pub struct Daemon {
    config: DaemonConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = Settings::load(&self.config.settings_path)?;
        let mut chamber = open_chamber(self.config.bus_number);
        chamber.update_target_temperature(&settings);

        let (state_tx, state_rx) = watch::channel(chamber.state());

        self.tracker.spawn(poll_task(
            self.shutdown.clone(),
            chamber,
            settings,
            state_tx,
        ));
        self.tracker.spawn(notify_task(self.shutdown.clone(), state_rx));
        self.tracker.close();

        info!("Started.");

        // Install signal handlers
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        // Wait for shutdown signal
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            },
        }

        trace!("Shutting down.");
        self.shutdown.cancel();

        // Wait for all tasks to complete
        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }
}

/// Open both enclosure devices on the shared bus.
///
/// Each driver gets its own file handle; all access stays on one task, so
/// the bus still has a single logical owner. Devices that fail to open are
/// logged and skipped, leaving their operations as no-ops.
pub fn open_chamber(bus_number: u8) -> Chamber<LinuxSmbus> {
    let fan = match LinuxSmbus::open(bus_number)
        .map_err(DriverError::from)
        .and_then(|bus| Emc2101::open(bus, Emc2101Config::default()))
    {
        Ok(fan) => Some(fan),
        Err(e) => {
            error!("Failed to initialize the fan controller: {}", e);
            None
        }
    };
    let io = match LinuxSmbus::open(bus_number)
        .map_err(DriverError::from)
        .and_then(Aw9523::open)
    {
        Ok(io) => Some(io),
        Err(e) => {
            error!("Failed to initialize the I/O expander: {}", e);
            None
        }
    };
    Chamber::new(fan, io)
}

/// Poll the chamber on a fixed interval, publishing state changes.
async fn poll_task(
    shutdown: CancellationToken,
    mut chamber: Chamber<LinuxSmbus>,
    settings: Settings,
    state_tx: watch::Sender<ChamberState>,
) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(state) = chamber.poll(&settings) {
                    let _ = state_tx.send(state);
                }
            }
            _ = shutdown.cancelled() => {
                debug!("Poll task shutting down");
                return;
            }
        }
    }
}

/// Log chamber state changes as they are published.
async fn notify_task(shutdown: CancellationToken, mut state_rx: watch::Receiver<ChamberState>) {
    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let state = *state_rx.borrow_and_update();
                if let Some(temperature) = state.chamber_temperature {
                    info!(
                        "chamber temperature {} degC, light {:?}",
                        temperature, state.light_mode
                    );
                }
            }
            _ = shutdown.cancelled() => {
                return;
            }
        }
    }
}
