//! Session runner for `agora-logger`.
//!
//! This module is decoupled from process setup (logging, signals, exit codes)
//! so a whole session can be driven deterministically with an injected
//! transport and sink.

use crate::channel::ChannelRegistry;
use crate::duration::parse_nonzero_duration;
use crate::mac_address::{DeviceTarget, parse_device};
use crate::phase::{Phase, PhaseCell};
use crate::poller::{PollConfig, PollError, PollSummary, Poller};
use crate::shutdown::Shutdown;
use crate::sink::RecordSink;
use crate::transport::{Connection, PeripheralInfo, Transport, TransportError};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upper bound on releasing the connection at the end of a session.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Command-line options.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// BLE device address (hex, separated by colons or dashes) or name to connect to
    #[arg(short = 'd', long = "dev", value_parser = parse_device, value_name = "DEVICE")]
    pub device: DeviceTarget,

    /// File to append captured records to in CSV format. Defaults to stdout.
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// File to write diagnostic messages to. Defaults to stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Verbose output, enable debug diagnostics
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Delay between sampling rounds.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    #[arg(long, default_value = "3s", value_parser = parse_nonzero_duration)]
    pub interval: Duration,

    /// Give up on a single characteristic read after this long
    #[arg(long, default_value = "10s", value_parser = parse_nonzero_duration)]
    pub read_timeout: Duration,

    /// How long to scan for the device
    #[arg(long, default_value = "5s", value_parser = parse_nonzero_duration)]
    pub scan_timeout: Duration,
}

impl Options {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.interval,
            read_timeout: self.read_timeout,
        }
    }
}

/// Errors returned by a logging session.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device does not expose channels: {}", .0.join(", "))]
    MissingChannels(Vec<String>),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Pick the peripheral to connect to, listing every match.
async fn find_peripheral(
    transport: &dyn Transport,
    target: &DeviceTarget,
    window: Duration,
) -> Result<PeripheralInfo, RunError> {
    let found = transport.discover(target, window).await?;
    info!("Found {} nearby device(s) matching '{}'", found.len(), target);
    for (i, peripheral) in found.iter().enumerate() {
        info!(
            "[{}] - {} ({})",
            i,
            peripheral.address,
            peripheral.name.as_deref().unwrap_or("unnamed")
        );
    }

    // TODO: ask which device to use when several match
    found
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::NotFound(target.to_string()).into())
}

/// Fail unless every registered channel is available on the peripheral.
async fn check_channels(
    registry: &ChannelRegistry,
    connection: &dyn Connection,
) -> Result<(), RunError> {
    let available = connection.characteristics().await?;
    for id in available.iter().filter(|id| !registry.contains(id)) {
        debug!(characteristic = %id, "ignoring unregistered characteristic");
    }

    let missing: Vec<String> = registry
        .iter()
        .filter(|channel| !available.contains(&channel.id))
        .map(|channel| channel.name.clone())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RunError::MissingChannels(missing))
    }
}

/// Run one logging session: discover, connect, poll until shutdown, disconnect.
///
/// The phase label in `phase` follows the session lifecycle and ends as
/// [`Phase::Terminated`]. A shutdown while scanning returns an empty summary
/// without connecting; a shutdown while connecting waits for the link and
/// releases it.
///
/// # Errors
/// Returns [`RunError`] for discovery/connection failures, missing channels,
/// a lost link or a failing sink. The connection is released in every case
/// where it was opened.
pub async fn run_with_io(
    options: &Options,
    registry: &ChannelRegistry,
    transport: &dyn Transport,
    sink: &mut dyn RecordSink,
    phase: &PhaseCell,
    mut shutdown: Shutdown,
) -> Result<PollSummary, RunError> {
    let result = session(options, registry, transport, sink, phase, &mut shutdown).await;
    phase.set(Phase::Terminated);
    result
}

async fn session(
    options: &Options,
    registry: &ChannelRegistry,
    transport: &dyn Transport,
    sink: &mut dyn RecordSink,
    phase: &PhaseCell,
    shutdown: &mut Shutdown,
) -> Result<PollSummary, RunError> {
    phase.set(Phase::Scanning);
    let peripheral = tokio::select! {
        biased;
        _ = shutdown.triggered() => return Ok(PollSummary::default()),
        found = find_peripheral(transport, &options.device, options.scan_timeout) => found?,
    };

    info!("Attempting to connect to {}", peripheral.address);
    phase.set(Phase::Connecting);
    // Not raced against shutdown: an abandoned connect may still complete
    // in the Bluetooth stack and must be released below.
    let connection = transport.connect(&peripheral).await?;
    info!("Connected to {}", peripheral.address);

    let result = if shutdown.is_triggered() {
        info!("shutdown requested while connecting");
        Ok(PollSummary::default())
    } else {
        match check_channels(registry, connection.as_ref()).await {
            Ok(()) => {
                phase.set(Phase::Logging);
                let mut poller = Poller::new(registry, options.poll_config());
                poller
                    .run(connection.as_ref(), sink, shutdown)
                    .await
                    .map_err(RunError::from)
            }
            Err(err) => Err(err),
        }
    };

    phase.set(Phase::Disconnecting);
    info!("Disconnecting from {}", peripheral.address);
    let disconnected = tokio::time::timeout(DISCONNECT_TIMEOUT, connection.disconnect())
        .await
        .unwrap_or(Err(TransportError::Timeout(DISCONNECT_TIMEOUT)));
    match (disconnected, result) {
        (Ok(()), Ok(summary)) => {
            info!(
                rounds = summary.rounds,
                records = summary.records,
                "Disconnected from {}",
                peripheral.address
            );
            Ok(summary)
        }
        (Err(err), Ok(_)) => {
            error!(error = %err, "failed to disconnect");
            Err(err.into())
        }
        (disconnected, Err(err)) => {
            if let Err(disconnect_err) = disconnected {
                warn!(error = %disconnect_err, "failed to disconnect after error");
            }
            Err(err)
        }
    }
}
