//! Terminal waiting indicator.
//!
//! Redraws the current [`Phase`] followed by zero to three dots on a single
//! line until the shutdown signal fires.

use crate::phase::{Phase, PhaseCell};
use crate::shutdown::Shutdown;
use std::io::Write;
use std::time::Duration;

/// Default redraw interval.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

const MAX_DOTS: usize = 3;

/// Render one frame, padded so a shorter frame erases the previous dots.
pub fn frame(phase: Phase, index: usize) -> String {
    let dots = ".".repeat(index % (MAX_DOTS + 1));
    format!("\r{phase}{dots:<width$}", width = MAX_DOTS)
}

/// Draw frames until `shutdown` fires.
///
/// Frames are skipped while the phase is unset. Write errors are ignored.
pub async fn run<W: Write + Send>(
    phase: PhaseCell,
    mut shutdown: Shutdown,
    mut out: W,
    refresh: Duration,
) {
    let mut index = 0;
    let mut drawn = false;

    loop {
        if let Some(current) = phase.get() {
            let _ = out.write_all(frame(current, index).as_bytes());
            let _ = out.flush();
            index += 1;
            drawn = true;
        }

        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            _ = tokio::time::sleep(refresh) => {}
        }
    }

    if drawn {
        let _ = writeln!(out);
        let _ = out.flush();
    }
}
