//! Direct socket terminal stream.

use std::{
    future::Future,
    io,
    sync::{
        Mutex as StdMutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use terminal_hub_core::{StreamError, TerminalStream, TransportError};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::Instant,
};

/// Terminal stream over a plain TCP connection.
///
/// Reads and writes take separate locks, so the two directions run
/// concurrently.
pub struct TcpTerminalStream {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    read_deadline: StdMutex<Option<Instant>>,
    write_deadline: StdMutex<Option<Instant>>,
    closed: AtomicBool,
}

impl TcpTerminalStream {
    /// Dial an address.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, StreamError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StreamError::Transport(e.into()))?;
        Ok(Self::new(stream))
    }

    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            read_deadline: StdMutex::new(None),
            write_deadline: StdMutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StreamError::ClosedPipe)
        } else {
            Ok(())
        }
    }
}

fn io_error(e: io::Error) -> StreamError {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => StreamError::ClosedPipe,
        io::ErrorKind::UnexpectedEof => StreamError::UnexpectedEndOfStream,
        io::ErrorKind::TimedOut => StreamError::Timeout,
        _ => StreamError::Transport(TransportError::from(e)),
    }
}

async fn within<T, F>(deadline: Option<Instant>, op: F) -> Result<T, StreamError>
where
    F: Future<Output = io::Result<T>>,
{
    let res = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, op)
            .await
            .map_err(|_| StreamError::Timeout)?,
        None => op.await,
    };
    res.map_err(io_error)
}

fn current(slot: &StdMutex<Option<Instant>>) -> Option<Instant> {
    *slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TerminalStream for TcpTerminalStream {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut reader = self.reader.lock().await;
        match within(current(&self.read_deadline), reader.read(buf)).await? {
            0 => Err(StreamError::EndOfStream { read: 0 }),
            n => Ok(n),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
        self.ensure_open()?;
        let mut writer = self.writer.lock().await;
        within(current(&self.write_deadline), writer.write(data)).await
    }

    async fn close(&self) -> Result<(), StreamError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StreamError::AlreadyClosed);
        }
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(io_error)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        *self
            .read_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = deadline;
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) {
        *self
            .write_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = deadline;
    }
}
