//! `agora-logger` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup,
//! signal handling and process exit codes. The polling core lives in
//! [`crate::poller`], built on the channel registry, the sample decoder and
//! the record assembler, and is driven by [`crate::app`] with an injected
//! transport and output sink so it can be tested deterministically.

pub mod app;
pub mod channel;
pub mod decode;
pub mod duration;
pub mod mac_address;
pub mod phase;
pub mod poller;
pub mod record;
pub mod shutdown;
pub mod sink;
pub mod spinner;
pub mod transport;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Options, RunError, run_with_io};
pub use channel::{ChannelDescriptor, ChannelRegistry, Layout, RegistryError, SampleKind};
pub use decode::{DecodeError, decode};
pub use mac_address::{DeviceTarget, MacAddress};
pub use phase::{Phase, PhaseCell};
pub use poller::{PollConfig, PollError, PollSummary, Poller};
pub use record::{Record, RecordError};
pub use sink::{CsvSink, RecordSink};
pub use transport::{Connection, ReadError, Transport, TransportError};
