use std::path::PathBuf;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

use crate::config::IndicatorConfig;
use crate::error::{UsageError, EXIT_FAILURE, EXIT_SUCCESS};
use crate::gpio::Pin;

#[derive(Parser, Debug)]
#[command(name = "lirc-indicator")]
#[command(version)]
#[command(about = "Pulses the GPIO output pin (eg to flash an LED) whenever anything is received on the lirc socket")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// GPIO pin to pulse (BCM numbering)
    #[arg(value_name = "GPIO_PIN", help = "GPIO pin to pulse (defaults to 4)")]
    pub pin: Option<String>,

    /// LIRC socket to read button events from
    #[arg(value_name = "LIRC_SOCKET", help = "LIRC socket (defaults to /var/run/lirc/lircd)")]
    pub socket: Option<PathBuf>,

    /// Anything past the two positionals, reported as a usage error
    #[arg(hide = true)]
    pub extra: Vec<String>,

    /// Fork into the background
    #[arg(short, long, help = "Run as daemon in background")]
    pub daemon: bool,

    #[arg(short = 'v', long, action = ArgAction::Version, help = "Display version")]
    pub version: Option<bool>,

    /// Enable debug logging
    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Pulse length in milliseconds
    #[arg(long, value_name = "MS", help = "How long the pin stays high per event")]
    pub pulse_ms: Option<u64>,
}

/// Outcome of parsing the command line.
#[derive(Debug)]
pub enum Invocation {
    Run(Cli),
    /// Help or version text, or a usage error, has been prepared; print it
    /// and exit with the given status.
    Exit { message: String, code: i32 },
}

impl Cli {
    /// Parse `args`, mapping clap's outcomes onto this tool's exit codes:
    /// 0 for help and version, 1 for any usage error.
    pub fn from_args<I, T>(args: I) -> Invocation
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(cli) => Invocation::Run(cli),
            Err(err) => {
                let code = match err.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
                    _ => EXIT_FAILURE,
                };
                Invocation::Exit {
                    message: err.render().to_string(),
                    code,
                }
            }
        }
    }

    /// Overlay the command line on `base`.
    ///
    /// No positionals keeps the defaults, one replaces the pin, two replace
    /// the pin and the socket. The pin is checked against the allow-list here,
    /// before anything touches the hardware.
    pub fn into_config(self, base: IndicatorConfig) -> Result<IndicatorConfig, UsageError> {
        if !self.extra.is_empty() {
            return Err(UsageError::ArgumentCount);
        }

        let mut config = base;
        if let Some(pin) = &self.pin {
            config.pin = pin.parse::<Pin>()?;
        }
        if let Some(socket) = self.socket {
            config.socket_path = socket;
        }
        if let Some(ms) = self.pulse_ms {
            config.pulse_ms = ms;
        }
        config.daemon = self.daemon;

        config.validate().map_err(UsageError::Config)?;
        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}
