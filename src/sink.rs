//! Output sinks for completed records.
//!
//! Every emitted line has the form `<unix time>,<record>`, where the unix time
//! carries six fractional digits and the record keeps its trailing separator.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::time::SystemTime;

/// Line-oriented destination for serialized records.
pub trait RecordSink: Send {
    /// Append one record observed at `at`.
    ///
    /// # Errors
    /// Returns an `io::Error` if the underlying writer fails.
    fn emit(&mut self, at: SystemTime, record: &str) -> io::Result<()>;
}

/// CSV writer over any `Write` implementation.
#[derive(Debug)]
pub struct CsvSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl CsvSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl CsvSink<LineWriter<File>> {
    /// Open `path` for appending, creating it if missing.
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(LineWriter::new(file)))
    }
}

impl<W: Write + Send> RecordSink for CsvSink<W> {
    fn emit(&mut self, at: SystemTime, record: &str) -> io::Result<()> {
        writeln!(self.out, "{},{}", unix_time(at), record)?;
        self.out.flush()
    }
}

/// Seconds since the epoch with microsecond precision.
fn unix_time(at: SystemTime) -> String {
    let since_epoch = at
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "{}.{:06}",
        since_epoch.as_secs(),
        since_epoch.subsec_micros()
    )
}
