//! `SIGINT`/`SIGTERM`/`SIGUSR1` handling, installed once at startup. The main
//! loop polls these flags once per frame (spec §5); it never blocks on a
//! signal arriving mid-frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::TransportError;

/// `shutdown` is set by `SIGINT`/`SIGTERM`; `reset` by `SIGUSR1`.
pub struct SignalFlags {
    shutdown: Arc<AtomicBool>,
    reset: Arc<AtomicBool>,
}

impl SignalFlags {
    pub fn install() -> Result<Self, TransportError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let reset = Arc::new(AtomicBool::new(false));

        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
            .map_err(TransportError::Signal)?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
            .map_err(TransportError::Signal)?;
        signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&reset))
            .map_err(TransportError::Signal)?;

        Ok(Self { shutdown, reset })
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Consumes a pending reset request, if any.
    pub fn take_reset_request(&self) -> bool {
        self.reset.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_flags_report_no_pending_signals() {
        let flags = SignalFlags::install().expect("signal registration should succeed in tests");
        assert!(!flags.shutdown_requested());
        assert!(!flags.take_reset_request());
    }
}
