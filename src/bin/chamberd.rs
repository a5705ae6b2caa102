//! Main entry point for the chamberd daemon.

use chamberd::{
    daemon::{Daemon, DaemonConfig},
    tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let daemon = Daemon::new(DaemonConfig::from_env()?);
    daemon.run().await
}
