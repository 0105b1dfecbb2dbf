//! Round-based polling of the registered channels.
//!
//! Each round reads every channel once, in registry order, feeding decoded
//! values into a reused [`Record`]. A record is emitted the moment it becomes
//! complete and is cleared straight after. Rounds are separated by a fixed
//! delay. Shutdown is honoured during every read and during the delay; a
//! partially filled record is never emitted.

use crate::channel::{ChannelRegistry, RegistryError};
use crate::decode::{DecodeError, decode_channel};
use crate::record::{Record, RecordError};
use crate::shutdown::Shutdown;
use crate::sink::RecordSink;
use crate::transport::{Connection, ReadError};
use std::io;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default delay between rounds.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Default time allowed for a single characteristic read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub read_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Reasons a single payload could not be stored in the record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Errors that end the polling loop.
#[derive(Error, Debug)]
pub enum PollError {
    /// The peripheral went away
    #[error(transparent)]
    Disconnected(ReadError),
    /// The output sink failed
    #[error("failed to write record: {0}")]
    Sink(#[from] io::Error),
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Rounds started, including the interrupted one
    pub rounds: u64,
    /// Records written to the sink
    pub records: u64,
}

/// Polling loop state: the registry, the reused record and counters.
#[derive(Debug)]
pub struct Poller<'a> {
    registry: &'a ChannelRegistry,
    config: PollConfig,
    record: Record,
    summary: PollSummary,
}

impl<'a> Poller<'a> {
    pub fn new(registry: &'a ChannelRegistry, config: PollConfig) -> Self {
        Self {
            registry,
            config,
            record: Record::new(registry),
            summary: PollSummary::default(),
        }
    }

    /// The record of the current (or last interrupted) round.
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn summary(&self) -> PollSummary {
        self.summary
    }

    /// Decode `bytes` read from characteristic `id` into the current record.
    ///
    /// # Errors
    /// Returns a [`SampleError`] if the characteristic is unregistered, the
    /// payload does not decode or the record rejects the channel name.
    pub fn ingest(&mut self, id: &Uuid, bytes: &[u8]) -> Result<f64, SampleError> {
        let channel = self.registry.lookup(id)?;
        let value = decode_channel(channel, bytes)?;
        self.record.set(&channel.name, value)?;
        Ok(value)
    }

    /// Emit the record if it is complete, then clear it.
    fn flush_if_complete(&mut self, sink: &mut dyn RecordSink) -> io::Result<bool> {
        if !self.record.is_complete() {
            return Ok(false);
        }

        let line = self.record.serialize();
        sink.emit(SystemTime::now(), &line)?;
        self.summary.records += 1;
        debug!(record = %line, "record emitted");
        self.record.clear();
        Ok(true)
    }

    async fn read(&self, connection: &dyn Connection, id: Uuid) -> Result<Vec<u8>, ReadError> {
        let timeout = self.config.read_timeout;
        match tokio::time::timeout(timeout, connection.read(id)).await {
            Ok(result) => result,
            Err(_) => Err(ReadError::Timeout(timeout)),
        }
    }

    /// Run rounds until `shutdown` fires or the peripheral disconnects.
    ///
    /// Transient read failures, timeouts and decode failures skip the channel
    /// for the current round, which then cannot complete.
    ///
    /// # Errors
    /// Returns [`PollError::Disconnected`] when a read reports a lost link and
    /// [`PollError::Sink`] when writing a record fails.
    pub async fn run(
        &mut self,
        connection: &dyn Connection,
        sink: &mut dyn RecordSink,
        shutdown: &mut Shutdown,
    ) -> Result<PollSummary, PollError> {
        let registry = self.registry;

        loop {
            self.record.clear();
            self.summary.rounds += 1;
            debug!(round = self.summary.rounds, "round started");
            let mut emitted = false;

            for channel in registry {
                let result = tokio::select! {
                    biased;
                    _ = shutdown.triggered() => {
                        info!(round = self.summary.rounds, "shutdown requested, discarding partial round");
                        return Ok(self.summary);
                    }
                    result = self.read(connection, channel.id) => result,
                };

                let bytes = match result {
                    Ok(bytes) => bytes,
                    Err(err) if err.is_fatal() => {
                        error!(channel = %channel.name, error = %err, "lost connection during read");
                        return Err(PollError::Disconnected(err));
                    }
                    Err(err) => {
                        warn!(channel = %channel.name, error = %err, "read failed, skipping channel this round");
                        continue;
                    }
                };

                match self.ingest(&channel.id, &bytes) {
                    Ok(value) => debug!(channel = %channel.name, value, "sample decoded"),
                    Err(err) => {
                        error!(channel = %channel.name, error = %err, "could not decode sample, skipping channel this round");
                        continue;
                    }
                }

                emitted |= self.flush_if_complete(sink)?;
            }

            if !emitted {
                let missing: Vec<&str> = self.record.missing().collect();
                debug!(round = self.summary.rounds, ?missing, "round incomplete, no record emitted");
            }

            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    info!(round = self.summary.rounds, "shutdown requested between rounds");
                    return Ok(self.summary);
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelDescriptor, HUMIDITY_UUID, Layout, SampleKind, TEMPERATURE_UUID};
    use crate::shutdown;
    use crate::test_utils::{FakeConnection, MemorySink, Reply};

    const TEMPERATURE: [u8; 2] = [0x64, 0x09];
    const HUMIDITY: [u8; 2] = [0x88, 0x13];

    fn two_channels() -> ChannelRegistry {
        ChannelRegistry::new(
            None,
            vec![
                ChannelDescriptor::new(
                    TEMPERATURE_UUID,
                    "Temperature",
                    Layout::le(SampleKind::I16),
                    0.01,
                ),
                ChannelDescriptor::new(
                    HUMIDITY_UUID,
                    "Humidity",
                    Layout::le(SampleKind::U16),
                    0.01,
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_ingest() {
        let registry = two_channels();
        let mut poller = Poller::new(&registry, PollConfig::default());
        assert_eq!(poller.ingest(&TEMPERATURE_UUID, &TEMPERATURE), Ok(24.04));
        assert_eq!(poller.record().get("Temperature"), Some(24.04));

        let unknown = Uuid::from_u128(42);
        assert_eq!(
            poller.ingest(&unknown, &TEMPERATURE),
            Err(SampleError::Registry(RegistryError::NotFound(unknown)))
        );
        assert!(matches!(
            poller.ingest(&HUMIDITY_UUID, &[0x01, 0x02, 0x03]),
            Err(SampleError::Decode(DecodeError::LengthMismatch { .. }))
        ));
        assert_eq!(poller.record().get("Humidity"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_round_emits_record() {
        let registry = two_channels();
        let connection = FakeConnection::new()
            .reply(TEMPERATURE_UUID, Reply::Value(TEMPERATURE.to_vec()))
            .reply(HUMIDITY_UUID, Reply::Value(HUMIDITY.to_vec()));
        let mut sink = MemorySink::default();
        let (trigger, mut listener) = shutdown::channel();

        let mut poller = Poller::new(&registry, PollConfig::default());
        let run = poller.run(&connection, &mut sink, &mut listener);
        let stop = async {
            // Two full rounds, stopped during the second delay
            tokio::time::sleep(Duration::from_secs(4)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);

        let summary = result.unwrap();
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.records, 2);
        assert_eq!(sink.records(), vec!["24.04,50.0,", "24.04,50.0,"]);
        assert_eq!(
            connection.reads(),
            vec![TEMPERATURE_UUID, HUMIDITY_UUID, TEMPERATURE_UUID, HUMIDITY_UUID]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_in_registry_order() {
        let registry = ChannelRegistry::agora();
        let connection = FakeConnection::new();
        let mut sink = MemorySink::default();
        let (trigger, mut listener) = shutdown::channel();

        let mut poller = Poller::new(&registry, PollConfig::default());
        let run = poller.run(&connection, &mut sink, &mut listener);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);
        result.unwrap();

        let expected: Vec<Uuid> = registry.iter().map(|c| c.id).collect();
        assert_eq!(connection.reads(), expected);
        // Every read failed, nothing to emit
        assert!(sink.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_round_discards_partial_record() {
        let registry = two_channels();
        let connection = FakeConnection::new()
            .reply(TEMPERATURE_UUID, Reply::Value(TEMPERATURE.to_vec()))
            .reply(HUMIDITY_UUID, Reply::Hang);
        let mut sink = MemorySink::default();
        let (trigger, mut listener) = shutdown::channel();

        let mut poller = Poller::new(&registry, PollConfig::default());
        let run = poller.run(&connection, &mut sink, &mut listener);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert_eq!(result.unwrap().records, 0);
        assert!(sink.records().is_empty());
        assert_eq!(poller.record().get("Temperature"), Some(24.04));
        assert_eq!(poller.record().get("Humidity"), None);

        // The next run starts from a cleared record
        let connection = FakeConnection::new()
            .reply(TEMPERATURE_UUID, Reply::Fail(ReadError::Transient("busy".into())))
            .reply(HUMIDITY_UUID, Reply::Value(HUMIDITY.to_vec()));
        let (trigger, mut listener) = shutdown::channel();
        let run = poller.run(&connection, &mut sink, &mut listener);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);
        result.unwrap();

        assert!(sink.records().is_empty());
        assert_eq!(poller.record().get("Temperature"), None);
        assert_eq!(poller.record().get("Humidity"), Some(50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay_stops_reading() {
        let registry = two_channels();
        let connection = FakeConnection::new()
            .reply(TEMPERATURE_UUID, Reply::Value(TEMPERATURE.to_vec()))
            .reply(HUMIDITY_UUID, Reply::Value(HUMIDITY.to_vec()));
        let mut sink = MemorySink::default();
        let (trigger, mut listener) = shutdown::channel();

        let mut poller = Poller::new(&registry, PollConfig::default());
        let run = poller.run(&connection, &mut sink, &mut listener);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert_eq!(result.unwrap(), PollSummary { rounds: 1, records: 1 });
        assert_eq!(connection.reads().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_channel_under_completes_round() {
        let registry = two_channels();
        let connection = FakeConnection::new()
            .reply(TEMPERATURE_UUID, Reply::Value(TEMPERATURE.to_vec()))
            .reply_once(HUMIDITY_UUID, Reply::Value(vec![0x88, 0x13, 0x00]))
            .reply(HUMIDITY_UUID, Reply::Value(HUMIDITY.to_vec()));
        let mut sink = MemorySink::default();
        let (trigger, mut listener) = shutdown::channel();

        let mut poller = Poller::new(&registry, PollConfig::default());
        let run = poller.run(&connection, &mut sink, &mut listener);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(4)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);

        // First round dropped because of the malformed humidity payload
        assert_eq!(result.unwrap(), PollSummary { rounds: 2, records: 1 });
        assert_eq!(sink.records(), vec!["24.04,50.0,"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_skips_channel() {
        let registry = two_channels();
        let connection = FakeConnection::new()
            .reply(TEMPERATURE_UUID, Reply::Value(TEMPERATURE.to_vec()))
            .reply_once(HUMIDITY_UUID, Reply::Hang)
            .reply(HUMIDITY_UUID, Reply::Value(HUMIDITY.to_vec()));
        let mut sink = MemorySink::default();
        let (trigger, mut listener) = shutdown::channel();
        let config = PollConfig {
            interval: Duration::from_secs(3),
            read_timeout: Duration::from_secs(2),
        };

        let mut poller = Poller::new(&registry, config);
        let run = poller.run(&connection, &mut sink, &mut listener);
        let stop = async {
            // round 1 ends at t=2 (timeout), delay until t=5, round 2 completes
            tokio::time::sleep(Duration::from_secs(6)).await;
            trigger.trigger();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert_eq!(result.unwrap(), PollSummary { rounds: 2, records: 1 });
        assert_eq!(sink.records(), vec!["24.04,50.0,"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_fatal() {
        let registry = two_channels();
        let connection = FakeConnection::new()
            .reply(TEMPERATURE_UUID, Reply::Value(TEMPERATURE.to_vec()))
            .reply(
                HUMIDITY_UUID,
                Reply::Fail(ReadError::Disconnected("link lost".into())),
            );
        let mut sink = MemorySink::default();
        let (_trigger, mut listener) = shutdown::channel();

        let mut poller = Poller::new(&registry, PollConfig::default());
        let result = poller.run(&connection, &mut sink, &mut listener).await;

        assert!(matches!(
            result,
            Err(PollError::Disconnected(ReadError::Disconnected(_)))
        ));
        assert!(sink.records().is_empty());
        assert_eq!(poller.summary().rounds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_triggered_reads_nothing() {
        let registry = two_channels();
        let connection = FakeConnection::new();
        let mut sink = MemorySink::default();
        let (trigger, mut listener) = shutdown::channel();
        trigger.trigger();

        let mut poller = Poller::new(&registry, PollConfig::default());
        let summary = poller.run(&connection, &mut sink, &mut listener).await.unwrap();

        assert_eq!(summary.records, 0);
        assert!(connection.reads().is_empty());
    }
}
