//! Process-wide lifecycle and interrupt handling.
//!
//! A run moves through `Init → PinAcquired → Running → Terminating →
//! Released`. Every way out of a run, including SIGINT, goes through
//! [`Lifecycle::terminate`], which releases the pin if it is still exported
//! and hands back the exit status.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use crate::error::{IndicatorError, EXIT_FAILURE, EXIT_SUCCESS};
use crate::gpio::ExportState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecycleState {
    Init = 0,
    PinAcquired = 1,
    Running = 2,
    Terminating = 3,
    Released = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::PinAcquired,
            2 => Self::Running,
            3 => Self::Terminating,
            _ => Self::Released,
        }
    }
}

/// Why a run is ending.
#[derive(Debug)]
pub enum Termination {
    /// The event source closed the connection.
    EndOfStream,
    /// SIGINT.
    Interrupted,
    Failed(IndicatorError),
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EndOfStream => EXIT_SUCCESS,
            Self::Interrupted => EXIT_FAILURE,
            Self::Failed(err) => err.exit_code(),
        }
    }
}

/// Shared state consulted by both the main flow and the interrupt handler.
///
/// The interrupt path only touches atomics: the lifecycle state, the exit
/// status and the pin's export state. No lock is ever taken on the way out.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: AtomicU8,
    exit_code: AtomicI32,
    pin: OnceLock<Arc<ExportState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_terminating(&self) -> bool {
        self.state() >= LifecycleState::Terminating
    }

    /// Remember the pin so termination can release it. Track it before
    /// exporting it; only the first pin tracked is kept.
    pub fn track(&self, pin: Arc<ExportState>) {
        if self.pin.set(pin).is_err() {
            tracing::warn!("A GPIO pin is already tracked; ignoring the second one");
        }
    }

    pub fn pin_acquired(&self) {
        self.advance(LifecycleState::Init, LifecycleState::PinAcquired);
    }

    pub fn running(&self) {
        self.advance(LifecycleState::PinAcquired, LifecycleState::Running);
    }

    fn advance(&self, from: LifecycleState, to: LifecycleState) {
        if self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::debug!("Lifecycle {:?} -> {:?}", from, to);
        }
    }

    /// Release the pin if it is still exported and return the exit status
    /// for the run.
    ///
    /// The first caller performs the cleanup and fixes the exit status from
    /// its `reason`. Any caller arriving while that is in progress, or
    /// afterwards, waits until the pin is released and returns the same
    /// status, so whichever thread exits the process does so only after the
    /// unexport has been written.
    pub fn terminate(&self, reason: &Termination) -> i32 {
        let previous = self
            .state
            .fetch_max(LifecycleState::Terminating as u8, Ordering::SeqCst);
        if previous >= LifecycleState::Terminating as u8 {
            tracing::debug!("Shutdown already in progress; {:?} not acted on", reason);
            while self.state() != LifecycleState::Released {
                thread::yield_now();
            }
            return self.exit_code.load(Ordering::SeqCst);
        }

        let code = reason.exit_code();
        self.exit_code.store(code, Ordering::SeqCst);

        match reason {
            Termination::EndOfStream => tracing::info!("LIRC socket closed, shutting down"),
            Termination::Interrupted => tracing::info!("Interrupted, shutting down"),
            Termination::Failed(err) => tracing::error!("{}", err),
        }

        if let Some(pin) = self.pin.get() {
            if let Err(err) = pin.release() {
                tracing::error!("{}", err);
            }
        }

        self.state
            .store(LifecycleState::Released as u8, Ordering::SeqCst);
        code
    }
}

/// Route SIGINT to [`Lifecycle::terminate`], then exit the process.
///
/// The handler runs on ctrlc's dedicated thread, not in signal context. A
/// pulse in progress on the main thread is not interrupted; its remaining
/// value write may fail against the unexported pin, which the main flow
/// ignores once termination has started.
pub fn install_interrupt_handler(lifecycle: Arc<Lifecycle>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        let code = lifecycle.terminate(&Termination::Interrupted);
        std::process::exit(code);
    })
}
