//! Runtime configuration for the indicator
//!
//! Settings come from built-in defaults, a couple of environment overrides
//! and the command line. No configuration file is read.

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::gpio::{Pin, DEFAULT_GPIO_ROOT, DEFAULT_PULSE};
use crate::source::DEFAULT_SOCKET;

/// Environment variable overriding the sysfs GPIO root
pub const ENV_GPIO_ROOT: &str = "LIRC_INDICATOR_GPIO_ROOT";

/// Environment variable overriding the pulse length in milliseconds
pub const ENV_PULSE_MS: &str = "LIRC_INDICATOR_PULSE_MS";

/// Upper bound on the pulse length
pub const MAX_PULSE_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// GPIO pin driving the LED
    pub pin: Pin,
    /// Socket lircd publishes button events on
    pub socket_path: PathBuf,
    /// Where the GPIO class lives in sysfs
    pub gpio_root: PathBuf,
    /// How long the pin stays high per event
    pub pulse_ms: u64,
    /// Fork into the background before starting
    pub daemon: bool,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            pin: Pin::default(),
            socket_path: PathBuf::from(DEFAULT_SOCKET),
            gpio_root: PathBuf::from(DEFAULT_GPIO_ROOT),
            pulse_ms: DEFAULT_PULSE.as_millis() as u64,
            daemon: false,
        }
    }
}

impl IndicatorConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(ENV_GPIO_ROOT) {
            if !val.is_empty() {
                config.gpio_root = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var(ENV_PULSE_MS) {
            match val.parse::<u64>() {
                Ok(ms) => config.pulse_ms = ms,
                Err(_) => tracing::warn!("Ignoring {}={:?}: not a number", ENV_PULSE_MS, val),
            }
        }

        config
    }

    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pulse_ms == 0 {
            return Err("pulse length must be greater than 0".to_string());
        }

        if self.pulse_ms > MAX_PULSE_MS {
            return Err(format!("pulse length must be at most {MAX_PULSE_MS} ms"));
        }

        if self.socket_path.as_os_str().is_empty() {
            return Err("socket path must not be empty".to_string());
        }

        Ok(())
    }
}
