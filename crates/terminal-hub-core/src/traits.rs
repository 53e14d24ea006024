//! Service and stream traits.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    error::{StreamError, TransportError},
    protocol::{
        CloseRequest, CloseResponse, ReadRequest, ReadResponse, RegisterRequest,
        RegisterResponse, TerminalRegisterRequest, TerminalRegisterResponse, WriteRequest,
        WriteResponse,
    },
};

/// Session-oriented hub service.
///
/// Implementations deliver one request and its response; they do not
/// interpret outcome codes. Callers bound each call with their own deadline
/// and may drop the returned future to cancel it.
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Allocate a session for an agent.
    async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, TransportError>;

    /// Fetch up to `req.size` bytes of session input.
    async fn read(&self, req: ReadRequest) -> Result<ReadResponse, TransportError>;

    /// Deliver session output.
    async fn write(&self, req: WriteRequest) -> Result<WriteResponse, TransportError>;

    /// Tear down a session.
    async fn close(&self, req: CloseRequest) -> Result<CloseResponse, TransportError>;
}

#[async_trait]
impl<T: HubClient + ?Sized> HubClient for Arc<T> {
    async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, TransportError> {
        (**self).register(req).await
    }

    async fn read(&self, req: ReadRequest) -> Result<ReadResponse, TransportError> {
        (**self).read(req).await
    }

    async fn write(&self, req: WriteRequest) -> Result<WriteResponse, TransportError> {
        (**self).write(req).await
    }

    async fn close(&self, req: CloseRequest) -> Result<CloseResponse, TransportError> {
        (**self).close(req).await
    }
}

/// Bootstrap service that tells an agent where to connect.
#[async_trait]
pub trait TerminalRegistry: Send + Sync {
    async fn register_terminal(
        &self,
        req: TerminalRegisterRequest,
    ) -> Result<TerminalRegisterResponse, TransportError>;
}

#[async_trait]
impl<T: TerminalRegistry + ?Sized> TerminalRegistry for Arc<T> {
    async fn register_terminal(
        &self,
        req: TerminalRegisterRequest,
    ) -> Result<TerminalRegisterResponse, TransportError> {
        (**self).register_terminal(req).await
    }
}

/// Bidirectional byte stream carrying a terminal session.
#[async_trait]
pub trait TerminalStream: Send + Sync {
    /// Read into `buf`, returning the number of bytes copied.
    ///
    /// End of stream is reported as `StreamError::EndOfStream`, which
    /// carries the count of bytes copied by this call.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, StreamError>;

    /// Write `data`, returning the number of bytes accepted.
    async fn write(&self, data: &[u8]) -> Result<usize, StreamError>;

    /// Close the stream.
    async fn close(&self) -> Result<(), StreamError>;

    /// Set or clear the deadline for future reads. Never fails.
    fn set_read_deadline(&self, deadline: Option<Instant>);

    /// Set or clear the deadline for future writes. Never fails.
    fn set_write_deadline(&self, deadline: Option<Instant>);

    /// Set both deadlines.
    fn set_deadline(&self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    /// Write all of `data`, resubmitting whatever the peer did not accept.
    ///
    /// # Errors
    /// Returns the first error that is not a partial write, or `ShortWrite`
    /// if the peer accepts nothing.
    async fn write_all(&self, mut data: &[u8]) -> Result<(), StreamError> {
        let requested = data.len();
        while !data.is_empty() {
            let accepted = match self.write(data).await {
                Ok(n) | Err(StreamError::ShortWrite { written: n, .. }) => n,
                Err(e) => return Err(e),
            };
            if accepted == 0 {
                return Err(StreamError::ShortWrite {
                    written: requested - data.len(),
                    requested,
                });
            }
            data = &data[accepted.min(data.len())..];
        }
        Ok(())
    }
}
