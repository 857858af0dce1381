//! Sysfs GPIO control.
//!
//! A pin is acquired by writing its number to `<root>/export`, configured
//! through `<root>/gpio<N>/direction`, driven through `<root>/gpio<N>/value`
//! and handed back by writing to `<root>/unexport`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GpioError, UsageError};

/// Default sysfs mount point of the GPIO class.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Default time the pin is held high during a pulse.
pub const DEFAULT_PULSE: Duration = Duration::from_millis(100);

/// BCM pin numbers accepted on the supported Raspberry Pi boards.
///
/// The list is the union of the revision 1 and revision 2 header maps; the
/// running revision is not detected. 0, 1 and 21 exist only on revision 1;
/// 2, 3, 27 and the P5 connector pins 28-31 exist only on revision 2.
pub const VALID_PINS: [u8; 24] = [
    0, 1, 2, 3, 4, 7, 8, 9, 10, 11, 14, 15, 17, 18, 21, 22, 23, 24, 25, 27, 28, 29, 30, 31,
];

/// A pin number that passed the allow-list check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Pin(u8);

impl Pin {
    pub fn new(number: i64) -> Result<Self, GpioError> {
        u8::try_from(number)
            .ok()
            .filter(|n| VALID_PINS.contains(n))
            .map(Self)
            .ok_or(GpioError::InvalidPin(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl Default for Pin {
    fn default() -> Self {
        Self(4)
    }
}

impl TryFrom<i64> for Pin {
    type Error = GpioError;

    fn try_from(number: i64) -> Result<Self, Self::Error> {
        Self::new(number)
    }
}

impl From<Pin> for u8 {
    fn from(pin: Pin) -> Self {
        pin.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pin {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = s
            .trim()
            .parse::<i64>()
            .map_err(|_| UsageError::NotANumber(s.to_string()))?;
        Ok(Self::new(number)?)
    }
}

/// Pin direction as last written to the direction file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Unset,
    Output,
}

/// Logic level written to the value file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    fn command(self) -> &'static [u8] {
        match self {
            Level::Low => b"0\n",
            Level::High => b"1\n",
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            other => Err(other),
        }
    }
}

/// Entry point to the sysfs GPIO interface.
#[derive(Debug, Clone)]
pub struct GpioController {
    root: PathBuf,
}

impl Default for GpioController {
    fn default() -> Self {
        Self::new(DEFAULT_GPIO_ROOT)
    }
}

impl GpioController {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Export `pin`, taking exclusive control of it.
    ///
    /// The kernel refuses the export if another process already holds the
    /// pin, so a successful return means this process owns it until
    /// [`PinHandle::release`].
    pub fn acquire(&self, pin: Pin) -> Result<PinHandle, GpioError> {
        self.export(self.prepare(pin))
    }

    /// Build the export bookkeeping for `pin` without touching sysfs.
    ///
    /// Hand the result to whoever must be able to release the pin (the
    /// lifecycle) before calling [`GpioController::export`], so there is no
    /// moment where the pin is exported but nobody can unexport it.
    pub fn prepare(&self, pin: Pin) -> Arc<ExportState> {
        Arc::new(ExportState {
            pin,
            export_path: self.root.join("export"),
            unexport_path: self.root.join("unexport"),
            command: format!("{pin}\n").into_bytes(),
            state: AtomicU8::new(IDLE),
            export_done: AtomicBool::new(false),
            export_ok: AtomicBool::new(false),
        })
    }

    /// Write the export command for a prepared pin.
    pub fn export(&self, state: Arc<ExportState>) -> Result<PinHandle, GpioError> {
        let pin = state.pin;
        if state
            .state
            .compare_exchange(IDLE, EXPORTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(GpioError::AlreadyReleased(pin.number()));
        }

        let written = write_command(&state.export_path, &state.command);
        state.export_ok.store(written.is_ok(), Ordering::SeqCst);
        state.export_done.store(true, Ordering::SeqCst);

        if let Err(source) = written {
            // A concurrent release may already have moved us to RELEASED;
            // either way there is nothing to unexport.
            let _ = state
                .state
                .compare_exchange(EXPORTING, IDLE, Ordering::SeqCst, Ordering::SeqCst);
            return Err(GpioError::Export {
                pin: pin.number(),
                path: state.export_path.clone(),
                source,
            });
        }

        if state
            .state
            .compare_exchange(EXPORTING, EXPORTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::info!("Exported GPIO pin {}", pin);
        } else {
            tracing::debug!("GPIO pin {} released while it was being exported", pin);
        }

        let pin_dir = self.root.join(format!("gpio{pin}"));
        Ok(PinHandle {
            state,
            direction_path: pin_dir.join("direction"),
            value_path: pin_dir.join("value"),
            direction: Direction::Unset,
        })
    }
}

const IDLE: u8 = 0;
const EXPORTING: u8 = 1;
const EXPORTED: u8 = 2;
const RELEASED: u8 = 3;

/// Export bookkeeping for one pin, shared between the owning [`PinHandle`]
/// and the interrupt path.
///
/// Everything `release` needs is prepared up front, so releasing does no
/// formatting and takes no locks. A release that lands while the export
/// write is in flight waits for that write and unexports if it succeeded.
#[derive(Debug)]
pub struct ExportState {
    pin: Pin,
    export_path: PathBuf,
    unexport_path: PathBuf,
    command: Vec<u8>,
    state: AtomicU8,
    export_done: AtomicBool,
    export_ok: AtomicBool,
}

impl ExportState {
    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn is_exported(&self) -> bool {
        self.state.load(Ordering::SeqCst) == EXPORTED
    }

    pub fn is_exporting(&self) -> bool {
        self.state.load(Ordering::SeqCst) == EXPORTING
    }

    /// Unexport the pin if it is, or is about to be, exported.
    ///
    /// Returns `Ok(true)` if this call performed the unexport and `Ok(false)`
    /// if there was nothing to do. The state moves to released before the
    /// write, so concurrent callers never unexport twice, and a pin released
    /// before its export is never exported afterwards.
    pub fn release(&self) -> Result<bool, GpioError> {
        match self.state.swap(RELEASED, Ordering::SeqCst) {
            EXPORTED => {}
            EXPORTING => {
                while !self.export_done.load(Ordering::SeqCst) {
                    thread::yield_now();
                }
                if !self.export_ok.load(Ordering::SeqCst) {
                    return Ok(false);
                }
            }
            _ => return Ok(false),
        }

        write_command(&self.unexport_path, &self.command).map_err(|source| {
            GpioError::Unexport {
                pin: self.pin.number(),
                path: self.unexport_path.clone(),
                source,
            }
        })?;
        tracing::info!("Unexported GPIO pin {}", self.pin);
        Ok(true)
    }
}

/// Ownership of one exported pin.
///
/// There is no `Clone`: the only other reference to the export state is the
/// one handed out by [`PinHandle::export_state`], which can release but not
/// drive the pin.
#[derive(Debug)]
pub struct PinHandle {
    state: Arc<ExportState>,
    direction_path: PathBuf,
    value_path: PathBuf,
    direction: Direction,
}

impl PinHandle {
    pub fn pin(&self) -> Pin {
        self.state.pin
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_exported(&self) -> bool {
        self.state.is_exported()
    }

    pub fn export_state(&self) -> Arc<ExportState> {
        Arc::clone(&self.state)
    }

    pub fn configure_output(&mut self) -> Result<(), GpioError> {
        write_command(&self.direction_path, b"out\n").map_err(|source| GpioError::Direction {
            pin: self.pin().number(),
            path: self.direction_path.clone(),
            source,
        })?;
        self.direction = Direction::Output;
        tracing::debug!("GPIO pin {} configured as output", self.pin());
        Ok(())
    }

    /// Write `value` to the pin. Only 0 and 1 are accepted.
    pub fn set_value(&self, value: u8) -> Result<(), GpioError> {
        let level = Level::try_from(value).map_err(|value| GpioError::InvalidValue {
            pin: self.pin().number(),
            value,
        })?;
        self.set_level(level)
    }

    pub fn set_level(&self, level: Level) -> Result<(), GpioError> {
        write_command(&self.value_path, level.command()).map_err(|source| GpioError::Value {
            pin: self.pin().number(),
            path: self.value_path.clone(),
            source,
        })
    }

    /// Drive the pin high for `duration`, then low again.
    pub fn pulse(&self, duration: Duration) -> Result<(), GpioError> {
        self.set_value(1)?;
        thread::sleep(duration);
        self.set_value(0)
    }

    pub fn release(&self) -> Result<bool, GpioError> {
        self.state.release()
    }
}

impl Drop for PinHandle {
    fn drop(&mut self) {
        if let Err(err) = self.state.release() {
            tracing::warn!("Failed to release GPIO pin on drop: {}", err);
        }
    }
}

// Sysfs attributes ignore the file offset, so append mode behaves like a
// plain write there and keeps every command visible when the root is a
// regular directory.
fn write_command(path: &Path, command: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(command)
}
