//! Error types for the indicator.
//!
//! Each component has its own error enum; every fatal path converts into
//! [`IndicatorError`], which knows the process exit status it maps to.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for usage errors and interrupts.
pub const EXIT_FAILURE: i32 = 1;

/// Exit status when the event source closes the connection.
pub const EXIT_SUCCESS: i32 = 0;

/// Errors raised by the sysfs GPIO interface.
#[derive(Debug, Error)]
pub enum GpioError {
    /// The pin is not on the allow-list for the supported boards.
    #[error("{0} is not a valid GPIO pin number")]
    InvalidPin(i64),

    /// Writing to the export interface failed.
    #[error("unable to export GPIO pin {pin} via {}: {source}", .path.display())]
    Export {
        pin: u8,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to the per-pin direction file failed.
    #[error("unable to set direction of GPIO pin {pin} via {}: {source}", .path.display())]
    Direction {
        pin: u8,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to the per-pin value file failed.
    #[error("unable to write value of GPIO pin {pin} via {}: {source}", .path.display())]
    Value {
        pin: u8,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value outside {0, 1} was requested.
    #[error("value can only be 0 or 1 (pin {pin}, value {value})")]
    InvalidValue { pin: u8, value: u8 },

    /// The pin was released before its export was attempted; it is never
    /// exported again within the same run.
    #[error("GPIO pin {0} was released before it could be exported")]
    AlreadyReleased(u8),

    /// Writing to the unexport interface failed.
    #[error("unable to unexport GPIO pin {pin} via {}: {source}", .path.display())]
    Unexport {
        pin: u8,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl GpioError {
    /// The underlying OS error, if there is one.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Export { source, .. }
            | Self::Direction { source, .. }
            | Self::Value { source, .. }
            | Self::Unexport { source, .. } => Some(source),
            Self::InvalidPin(_) | Self::InvalidValue { .. } | Self::AlreadyReleased(_) => None,
        }
    }
}

/// The event socket could not be connected.
#[derive(Debug, Error)]
#[error("unable to open LIRC socket {}: {source}", .path.display())]
pub struct ConnectError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A read on the event socket failed.
#[derive(Debug, Error)]
#[error("read from LIRC socket failed: {0}")]
pub struct ReadError(#[from] pub io::Error);

/// Bad command line.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("incorrect number of arguments")]
    ArgumentCount,

    #[error("{0:?} is not a GPIO pin number")]
    NotANumber(String),

    #[error(transparent)]
    InvalidPin(#[from] GpioError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Every fatal condition of a run.
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Gpio(#[from] GpioError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

impl IndicatorError {
    /// Process exit status for this error: the raw OS error code for I/O
    /// failures, [`EXIT_FAILURE`] otherwise.
    pub fn exit_code(&self) -> i32 {
        let io = match self {
            Self::Usage(_) => None,
            Self::Gpio(err) => err.io_error(),
            Self::Connect(err) => Some(&err.source),
            Self::Read(err) => Some(&err.0),
        };
        io.and_then(io::Error::raw_os_error)
            .filter(|code| *code != 0)
            .unwrap_or(EXIT_FAILURE)
    }
}
