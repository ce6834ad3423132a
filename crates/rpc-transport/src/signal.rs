//! Signal handling for graceful shutdown (SIGINT/SIGTERM)
//!
//! On the first signal the cancellation [`Gate`] opens: in-flight waits
//! (subscription readiness, pending calls, the responder loop) observe it
//! and unwind. A second signal exits immediately with
//! [`EXIT_CODE_INTERRUPTED`]. Later signals are ignored.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::gate::Gate;

/// Exit code used when a process is interrupted.
pub const EXIT_CODE_INTERRUPTED: u8 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: open the cancellation gate
    InitiateShutdown,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Signal handler state
#[derive(Debug)]
pub struct SignalState {
    signal_count: AtomicU8,
    cancel: Gate,
}

impl SignalState {
    pub fn new(cancel: Gate) -> Self {
        Self {
            signal_count: AtomicU8::new(0),
            cancel,
        }
    }

    /// Record a signal and decide what to do about it.
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);
        match count {
            0 => {
                self.cancel.set();
                SignalAction::InitiateShutdown
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_set()
    }
}

/// Install the process-wide SIGINT/SIGTERM handler.
///
/// Can only be installed once per process.
pub fn install(cancel: Gate) -> Result<Arc<SignalState>, ctrlc::Error> {
    let state = Arc::new(SignalState::new(cancel));
    let handler_state = Arc::clone(&state);

    ctrlc::set_handler(move || match handler_state.handle_signal() {
        SignalAction::InitiateShutdown => info!("Signal received, shutting down"),
        SignalAction::ImmediateExit => {
            warn!("Second signal received, exiting immediately");
            std::process::exit(i32::from(EXIT_CODE_INTERRUPTED));
        }
        SignalAction::Ignore => {}
    })?;

    Ok(state)
}
