//! Connection phase shared between the polling loop and the status display.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Lifecycle phase of a logging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Connecting,
    Logging,
    Disconnecting,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Scanning => "Scanning",
            Phase::Connecting => "Connecting",
            Phase::Logging => "Logging",
            Phase::Disconnecting => "Disconnecting",
            Phase::Terminated => "Terminated",
        };
        f.write_str(label)
    }
}

/// Mutex-guarded phase label with a single writer and a single reader.
///
/// Cloning yields another handle to the same cell. The label starts unset.
#[derive(Debug, Clone, Default)]
pub struct PhaseCell {
    inner: Arc<Mutex<Option<Phase>>>,
}

impl PhaseCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, phase: Phase) {
        // A poisoned lock still holds a valid Copy value
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(phase);
    }

    pub fn get(&self) -> Option<Phase> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
