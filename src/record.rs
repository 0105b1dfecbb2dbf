//! Record assembly for one sampling round.
//!
//! A [`Record`] holds one slot per registered channel, in registry order. Slots
//! start empty and are filled as characteristic reads complete; a record is
//! emitted only once every slot holds a value.

use crate::channel::ChannelRegistry;
use std::fmt;
use thiserror::Error;

/// Errors returned when updating a record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

/// Measurements collected during one round, keyed by channel name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    names: Vec<String>,
    values: Vec<Option<f64>>,
}

impl Record {
    /// Create an empty record shaped after the registry.
    pub fn new(registry: &ChannelRegistry) -> Self {
        let names: Vec<String> = registry.names().map(str::to_owned).collect();
        let values = vec![None; names.len()];
        Self { names, values }
    }

    /// Store `value` in the slot for `name`, replacing any previous value.
    ///
    /// # Errors
    /// Returns [`RecordError::UnknownChannel`] if `name` is not part of the registry.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), RecordError> {
        let index = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RecordError::UnknownChannel(name.to_string()))?;
        self.values[index] = Some(value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values[i])
    }

    /// True once every channel holds a value.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Reset every slot so the record can be reused for the next round.
    pub fn clear(&mut self) {
        self.values.fill(None);
    }

    /// Names of channels that have not been sampled yet.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| v.is_none())
            .map(|(n, _)| n.as_str())
    }

    /// Comma-separated values in registry order, each followed by a separator.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in &self.values {
            match value {
                Some(v) => write!(f, "{},", CsvFloat(*v))?,
                None => write!(f, "nan,")?,
            }
        }
        Ok(())
    }
}

/// Shortest round-trip decimal with a `.0` suffix on integral values and a
/// signed two-digit exponent (`1e+16`, `1e-05`).
struct CsvFloat(f64);

impl fmt::Display for CsvFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        if value.is_nan() {
            return write!(f, "nan");
        }
        if value.is_infinite() {
            return write!(f, "{}", if value > 0.0 { "inf" } else { "-inf" });
        }

        // Debug already yields "50.0" and "1e16"; only the exponent needs padding
        let repr = format!("{value:?}");
        match repr.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                write!(f, "{mantissa}e{sign}{digits:0>2}")
            }
            None => write!(f, "{repr}"),
        }
    }
}
