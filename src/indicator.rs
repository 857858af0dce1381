//! The event loop: read, classify, pulse, drain.

use std::sync::Arc;
use std::time::Duration;

use crate::config::IndicatorConfig;
use crate::error::{GpioError, IndicatorError};
use crate::filter::EventFilter;
use crate::gpio::{GpioController, PinHandle};
use crate::lifecycle::{Lifecycle, Termination};
use crate::source::{EventConnection, EventStream, ReadOutcome};

/// Something that can be flashed.
pub trait Indicator {
    fn pulse(&self, duration: Duration) -> Result<(), GpioError>;
}

impl Indicator for PinHandle {
    fn pulse(&self, duration: Duration) -> Result<(), GpioError> {
        PinHandle::pulse(self, duration)
    }
}

/// Counters for one run of the loop, logged when the source closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub events: u64,
    pub pulses: u64,
    pub ignored: u64,
    pub discarded_bytes: u64,
}

pub struct MainLoop<'a, S, I> {
    source: S,
    indicator: &'a I,
    filter: EventFilter,
    pulse: Duration,
    stats: LoopStats,
}

impl<'a, S: EventStream, I: Indicator> MainLoop<'a, S, I> {
    pub fn new(source: S, indicator: &'a I, pulse: Duration) -> Self {
        Self {
            source,
            indicator,
            filter: EventFilter::default(),
            pulse,
            stats: LoopStats::default(),
        }
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run until the source reaches EOF (`Ok`) or something fails.
    ///
    /// Whatever arrived while an event was being handled is thrown away
    /// afterwards, pulse or not, so a held button flashes once per read
    /// rather than queueing up flashes.
    pub fn run(&mut self) -> Result<LoopStats, IndicatorError> {
        loop {
            let event = match self.source.read_event()? {
                ReadOutcome::Data(event) => event,
                ReadOutcome::Eof => return Ok(self.stats),
            };
            self.stats.events += 1;
            tracing::debug!("Received {:?}", event);

            if self.filter.is_actionable(event.bytes()) {
                match self.indicator.pulse(self.pulse) {
                    Ok(()) => self.stats.pulses += 1,
                    Err(err @ GpioError::InvalidValue { .. }) => {
                        tracing::warn!("{}", err);
                    }
                    Err(err) => return Err(err.into()),
                }
            } else {
                self.stats.ignored += 1;
            }

            let discarded = self.source.discard_backlog()?;
            self.stats.discarded_bytes += discarded as u64;
        }
    }
}

/// Acquire the pin, serve events until the socket closes or fails, clean up
/// and return the process exit status.
///
/// `config.pin` has already passed the allow-list check by construction.
pub fn run(config: &IndicatorConfig, lifecycle: &Lifecycle) -> i32 {
    let gpio = GpioController::new(&config.gpio_root);
    // Tracked before the export write so an interrupt landing mid-export
    // still unexports the pin.
    let state = gpio.prepare(config.pin);
    lifecycle.track(Arc::clone(&state));
    let mut handle = match gpio.export(state) {
        Ok(handle) => handle,
        Err(_) if lifecycle.is_terminating() => {
            return lifecycle.terminate(&Termination::Interrupted)
        }
        Err(err) => return lifecycle.terminate(&Termination::Failed(err.into())),
    };

    let reason = match serve(config, lifecycle, &mut handle) {
        // The interrupt handler owns shutdown from here on; whatever the main
        // flow saw meanwhile, including a clean EOF, is fallout from it.
        _ if lifecycle.is_terminating() => Termination::Interrupted,
        Ok(stats) => {
            tracing::info!(
                "{} events, {} pulses, {} release events ignored",
                stats.events,
                stats.pulses,
                stats.ignored
            );
            Termination::EndOfStream
        }
        Err(err) => Termination::Failed(err),
    };

    lifecycle.terminate(&reason)
}

fn serve(
    config: &IndicatorConfig,
    lifecycle: &Lifecycle,
    handle: &mut PinHandle,
) -> Result<LoopStats, IndicatorError> {
    handle.configure_output()?;
    lifecycle.pin_acquired();

    let connection = EventConnection::connect(&config.socket_path)?;
    lifecycle.running();
    tracing::info!(
        "Flashing GPIO pin {} on events from {}",
        handle.pin(),
        connection.path().display()
    );

    MainLoop::new(connection, &*handle, config.pulse_duration()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadError;
    use crate::source::RawEvent;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;

    enum Step {
        Event(&'static [u8]),
        Backlog(usize),
        Fail(i32),
    }

    /// Replays a script; running out of steps is EOF.
    struct ScriptedSource {
        steps: VecDeque<Step>,
        log: Vec<String>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                log: Vec::new(),
            }
        }
    }

    impl EventStream for &mut ScriptedSource {
        fn read_event(&mut self) -> Result<ReadOutcome, ReadError> {
            self.log.push("read".to_string());
            match self.steps.pop_front() {
                Some(Step::Event(bytes)) => Ok(ReadOutcome::Data(RawEvent::from_bytes(bytes))),
                Some(Step::Fail(code)) => Err(ReadError(io::Error::from_raw_os_error(code))),
                Some(Step::Backlog(_)) => panic!("backlog step where a read was expected"),
                None => Ok(ReadOutcome::Eof),
            }
        }

        fn discard_backlog(&mut self) -> Result<usize, ReadError> {
            self.log.push("discard".to_string());
            match self.steps.front() {
                Some(Step::Backlog(n)) => {
                    let n = *n;
                    self.steps.pop_front();
                    Ok(n)
                }
                _ => Ok(0),
            }
        }
    }

    #[derive(Default)]
    struct RecordingIndicator {
        pulses: RefCell<Vec<Duration>>,
        fail_with: Option<fn() -> GpioError>,
    }

    impl Indicator for RecordingIndicator {
        fn pulse(&self, duration: Duration) -> Result<(), GpioError> {
            self.pulses.borrow_mut().push(duration);
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    const PRESS: &[u8] = b"000000037ff07bee 00 KEY_1 mceusb\n";
    const RELEASE: &[u8] = b"000000037ff07bee 00 KEY_1_UP mceusb\n";

    #[test]
    fn test_pulses_only_on_actionable_events() {
        let mut source = ScriptedSource::new(vec![
            Step::Event(PRESS),
            Step::Event(RELEASE),
            Step::Event(PRESS),
        ]);
        let indicator = RecordingIndicator::default();

        let stats = MainLoop::new(&mut source, &indicator, Duration::from_millis(100))
            .run()
            .unwrap();

        assert_eq!(stats.events, 3);
        assert_eq!(stats.pulses, 2);
        assert_eq!(stats.ignored, 1);
        assert_eq!(
            *indicator.pulses.borrow(),
            vec![Duration::from_millis(100); 2]
        );
    }

    #[test]
    fn test_backlog_discarded_after_every_event() {
        let mut source = ScriptedSource::new(vec![
            Step::Event(PRESS),
            Step::Backlog(64),
            Step::Event(RELEASE),
            Step::Backlog(10),
        ]);
        let indicator = RecordingIndicator::default();

        let stats = MainLoop::new(&mut source, &indicator, Duration::ZERO)
            .run()
            .unwrap();

        assert_eq!(stats.discarded_bytes, 74);
        assert_eq!(
            source.log,
            vec!["read", "discard", "read", "discard", "read"]
        );
    }

    #[test]
    fn test_immediate_eof_is_clean() {
        let mut source = ScriptedSource::new(vec![]);
        let indicator = RecordingIndicator::default();

        let stats = MainLoop::new(&mut source, &indicator, Duration::ZERO)
            .run()
            .unwrap();

        assert_eq!(stats, LoopStats::default());
        assert!(indicator.pulses.borrow().is_empty());
    }

    #[test]
    fn test_read_error_stops_the_loop() {
        let mut source = ScriptedSource::new(vec![
            Step::Event(PRESS),
            Step::Fail(libc::ECONNRESET),
            Step::Event(PRESS),
        ]);
        let indicator = RecordingIndicator::default();

        let err = MainLoop::new(&mut source, &indicator, Duration::ZERO)
            .run()
            .unwrap_err();

        assert!(matches!(err, IndicatorError::Read(_)));
        assert_eq!(err.exit_code(), libc::ECONNRESET);
        assert_eq!(indicator.pulses.borrow().len(), 1);
    }

    #[test]
    fn test_invalid_value_is_not_fatal() {
        let mut source = ScriptedSource::new(vec![Step::Event(PRESS), Step::Event(PRESS)]);
        let indicator = RecordingIndicator {
            fail_with: Some(|| GpioError::InvalidValue { pin: 4, value: 2 }),
            ..Default::default()
        };

        let stats = MainLoop::new(&mut source, &indicator, Duration::ZERO)
            .run()
            .unwrap();

        assert_eq!(stats.events, 2);
        assert_eq!(stats.pulses, 0);
        assert_eq!(source.log, vec!["read", "discard", "read", "discard", "read"]);
    }

    #[test]
    fn test_value_write_failure_is_fatal() {
        let mut source = ScriptedSource::new(vec![Step::Event(PRESS), Step::Event(PRESS)]);
        let indicator = RecordingIndicator {
            fail_with: Some(|| GpioError::Value {
                pin: 4,
                path: "/sys/class/gpio/gpio4/value".into(),
                source: io::Error::from_raw_os_error(libc::EACCES),
            }),
            ..Default::default()
        };

        let err = MainLoop::new(&mut source, &indicator, Duration::ZERO)
            .run()
            .unwrap_err();

        assert_eq!(err.exit_code(), libc::EACCES);
        assert_eq!(indicator.pulses.borrow().len(), 1);
    }

    #[test]
    fn test_custom_filter() {
        let mut source = ScriptedSource::new(vec![Step::Event(PRESS), Step::Event(RELEASE)]);
        let indicator = RecordingIndicator::default();

        let stats = MainLoop::new(&mut source, &indicator, Duration::ZERO)
            .with_filter(EventFilter::new(b"KEY_1 "))
            .run()
            .unwrap();

        assert_eq!(stats.pulses, 1);
        assert_eq!(stats.ignored, 1);
    }
}
