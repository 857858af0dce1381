//! Connection to the LIRC daemon's event socket.

use std::io::{self, Read};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::error::{ConnectError, ReadError};

/// Default socket lircd publishes decoded button events on.
pub const DEFAULT_SOCKET: &str = "/var/run/lirc/lircd";

/// Size of one read from the socket.
pub const EVENT_BUFFER_SIZE: usize = 128;

/// The bytes returned by a single read.
///
/// lircd does not terminate its lines for us and one read may hold a partial
/// line or several lines, so this is only ever treated as a bounded window.
#[derive(Clone, Copy)]
pub struct RawEvent {
    buf: [u8; EVENT_BUFFER_SIZE],
    len: usize,
}

impl RawEvent {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(EVENT_BUFFER_SIZE);
        let mut buf = [0u8; EVENT_BUFFER_SIZE];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { buf, len }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for RawEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RawEvent")
            .field(&String::from_utf8_lossy(self.bytes()))
            .finish()
    }
}

#[derive(Debug)]
pub enum ReadOutcome {
    Data(RawEvent),
    /// The peer closed the connection.
    Eof,
}

/// Anything the main loop can pull events from.
pub trait EventStream {
    /// Block until the next chunk of events, EOF or an error.
    fn read_event(&mut self) -> Result<ReadOutcome, ReadError>;

    /// Drop whatever is already buffered without blocking. Returns the number
    /// of bytes discarded.
    fn discard_backlog(&mut self) -> Result<usize, ReadError>;

    /// Lazily yield events until EOF.
    fn events(&mut self) -> Events<'_, Self>
    where
        Self: Sized,
    {
        Events {
            stream: self,
            done: false,
        }
    }
}

pub struct Events<'a, S: EventStream> {
    stream: &'a mut S,
    done: bool,
}

impl<S: EventStream> Iterator for Events<'_, S> {
    type Item = Result<RawEvent, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.read_event() {
            Ok(ReadOutcome::Data(event)) => Some(Ok(event)),
            Ok(ReadOutcome::Eof) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// An open connection to the event socket. It is never reopened; the OS
/// closes it when the process exits.
#[derive(Debug)]
pub struct EventConnection {
    stream: UnixStream,
    path: PathBuf,
}

impl EventConnection {
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self, ConnectError> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path).map_err(|source| ConnectError {
            path: path.clone(),
            source,
        })?;
        tracing::info!("Connected to LIRC socket {}", path.display());
        Ok(Self { stream, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn drain(&mut self) -> io::Result<usize> {
        let mut scratch = [0u8; EVENT_BUFFER_SIZE];
        let mut discarded = 0;
        loop {
            match self.stream.read(&mut scratch) {
                // EOF is left for the next blocking read to report.
                Ok(0) => return Ok(discarded),
                Ok(n) => discarded += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(discarded),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl EventStream for EventConnection {
    fn read_event(&mut self) -> Result<ReadOutcome, ReadError> {
        let mut buf = [0u8; EVENT_BUFFER_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(ReadOutcome::Eof),
                Ok(len) => return Ok(ReadOutcome::Data(RawEvent { buf, len })),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(ReadError(err)),
            }
        }
    }

    fn discard_backlog(&mut self) -> Result<usize, ReadError> {
        self.stream.set_nonblocking(true)?;
        let drained = self.drain();
        self.stream.set_nonblocking(false)?;
        let discarded = drained?;
        if discarded > 0 {
            tracing::debug!("Discarded {} bytes of backlog", discarded);
        }
        Ok(discarded)
    }
}
