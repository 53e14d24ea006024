//! Stream adapter over hub session calls.

use std::{
    future::Future,
    sync::{Mutex as StdMutex, PoisonError},
};

use async_trait::async_trait;
use terminal_hub_core::{
    ConnConfig, HubClient, StreamError, TerminalStream, TransportError,
    protocol::{CloseRequest, ReadRequest, RegisterRequest, WriteRequest},
};
use tokio::{sync::Mutex, time::Instant};

use crate::{outcome, session::Session};

#[derive(Debug, Default, Clone, Copy)]
struct Deadlines {
    read: Option<Instant>,
    write: Option<Instant>,
}

/// Terminal byte stream whose every operation is one hub call.
///
/// A single lock is held for the whole of `register`, `read`, `write`,
/// `close` and `is_registered`, including the call itself, so at most one
/// call per instance is in flight and reads are serialized against writes.
/// Callers that need true full duplex should use a direct socket instead.
///
/// Deadline setters use a separate lock and never wait on an in-flight call.
pub struct HubConn<C> {
    client: C,
    config: ConnConfig,
    session: Mutex<Session>,
    deadlines: StdMutex<Deadlines>,
}

impl<C: HubClient> HubConn<C> {
    /// Create an unregistered stream.
    #[must_use]
    pub fn new(client: C, config: ConnConfig) -> Self {
        let session = Session::new(config.agent_id.clone());
        Self {
            client,
            config,
            session: Mutex::new(session),
            deadlines: StdMutex::new(Deadlines::default()),
        }
    }

    /// Create an unregistered stream with a generated agent identity.
    #[must_use]
    pub fn with_defaults(client: C) -> Self {
        Self::new(client, ConnConfig::default())
    }

    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    #[must_use]
    pub const fn config(&self) -> &ConnConfig {
        &self.config
    }

    /// The underlying hub client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Whether a hub session is currently held.
    pub async fn is_registered(&self) -> bool {
        self.session.lock().await.is_registered()
    }

    /// The current hub-assigned session id, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.id().ok().map(str::to_owned)
    }

    /// Allocate a hub session for this agent.
    ///
    /// An existing session is replaced without being closed.
    ///
    /// # Errors
    /// `AgentNotRegistered` if the hub refuses the agent, `Timeout`,
    /// `Transport` or `ProtocolViolation` otherwise.
    pub async fn register(&self) -> Result<(), StreamError> {
        let mut session = self.session.lock().await;
        let req = RegisterRequest {
            agent_id: session.agent_id().to_owned(),
        };
        let deadline = Instant::now() + self.config.timeout;
        let res = bounded(deadline, self.client.register(req)).await?;
        let id = outcome::register_result(res.code, res.session_id)?;

        tracing::debug!(agent_id = %session.agent_id(), session_id = %id, "Registered hub session");
        if let Some(previous) = session.attach(id) {
            tracing::warn!(previous = %previous, "Replaced an open hub session without closing it");
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes of session input.
    ///
    /// # Errors
    /// `ClosedPipe` without a call when unregistered. `EndOfStream` carries
    /// the bytes copied by this call.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
        // Held across the call.
        let session = self.session.lock().await;
        let session_id = session.id()?.to_owned();
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = self.io_deadline(self.deadlines().read)?;
        let size = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let req = ReadRequest {
            session_id: session_id.clone(),
            size,
        };
        let res = bounded(deadline, self.client.read(req)).await?;

        let copied = if outcome::read_delivers_data(res.code) {
            let reported = res.size as usize;
            if reported > res.data.len() {
                return Err(StreamError::violation(format!(
                    "read reported {reported} bytes but carried {}",
                    res.data.len()
                )));
            }
            let n = reported.min(buf.len());
            buf[..n].copy_from_slice(&res.data[..n]);
            n
        } else {
            0
        };

        tracing::trace!(%session_id, requested = buf.len(), copied, code = res.code, "Hub read");
        outcome::read_result(res.code, copied)
    }

    /// Send `data` to the session in one call.
    ///
    /// # Errors
    /// `ClosedPipe` without a call when unregistered. `ShortWrite` carries
    /// the accepted count.
    pub async fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
        let session = self.session.lock().await;
        let session_id = session.id()?.to_owned();

        let deadline = self.io_deadline(self.deadlines().write)?;
        let req = WriteRequest {
            session_id: session_id.clone(),
            data: data.to_vec(),
        };
        let res = bounded(deadline, self.client.write(req)).await?;

        tracing::trace!(%session_id, requested = data.len(), accepted = res.size, code = res.code, "Hub write");
        outcome::write_result(res.code, res.size as usize, data.len())
    }

    /// Close the hub session. A later `register` may open a new one.
    ///
    /// # Errors
    /// `AlreadyClosed` without a call when unregistered. Any code other
    /// than `OK` is a `ProtocolViolation` and keeps the session.
    pub async fn close(&self) -> Result<(), StreamError> {
        let mut session = self.session.lock().await;
        let session_id = session
            .id()
            .map_err(|_| StreamError::AlreadyClosed)?
            .to_owned();

        let deadline = Instant::now() + self.config.timeout;
        let req = CloseRequest {
            session_id: session_id.clone(),
        };
        let res = bounded(deadline, self.client.close(req)).await?;
        outcome::close_result(res.code)?;

        session.detach();
        tracing::debug!(%session_id, "Closed hub session");
        Ok(())
    }

    /// Set or clear the deadline for future reads.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.deadlines_mut(|d| d.read = deadline);
    }

    /// Set or clear the deadline for future writes.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.deadlines_mut(|d| d.write = deadline);
    }

    fn deadlines(&self) -> Deadlines {
        *self.deadlines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadlines_mut(&self, f: impl FnOnce(&mut Deadlines)) {
        f(&mut self.deadlines.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// The tighter of an explicit deadline and the configured I/O timeout.
    /// An explicit deadline already in the past fails before any call.
    fn io_deadline(&self, explicit: Option<Instant>) -> Result<Instant, StreamError> {
        let now = Instant::now();
        let bound = now + self.config.io_timeout;
        match explicit {
            Some(deadline) if deadline <= now => Err(StreamError::Timeout),
            Some(deadline) => Ok(deadline.min(bound)),
            None => Ok(bound),
        }
    }
}

async fn bounded<T, F>(deadline: Instant, call: F) -> Result<T, StreamError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(res) => res.map_err(StreamError::from),
        Err(_) => Err(StreamError::Timeout),
    }
}

#[async_trait]
impl<C: HubClient> TerminalStream for HubConn<C> {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, StreamError> {
        Self::read(self, buf).await
    }

    async fn write(&self, data: &[u8]) -> Result<usize, StreamError> {
        Self::write(self, data).await
    }

    async fn close(&self) -> Result<(), StreamError> {
        Self::close(self).await
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        Self::set_read_deadline(self, deadline);
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) {
        Self::set_write_deadline(self, deadline);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex as StdMutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use terminal_hub_core::{
        Outcome,
        protocol::{CloseResponse, ReadResponse, RegisterResponse, WriteResponse},
    };

    use super::*;

    /// Scriptable in-memory hub that records every call it receives.
    #[derive(Default)]
    struct MockHub {
        source: StdMutex<Vec<u8>>,
        sink: StdMutex<Vec<u8>>,
        calls: StdMutex<Vec<&'static str>>,
        session_ids: StdMutex<Vec<String>>,
        registrations: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
        /// Restricts `delay` to one kind of call.
        delay_only: Option<&'static str>,
        register_code: Option<i32>,
        close_code: Option<i32>,
        write_limit: Option<usize>,
        write_code: Option<i32>,
        read_reply: Option<ReadResponse>,
        failure: Option<TransportError>,
    }

    impl MockHub {
        fn with_source(source: &[u8]) -> Self {
            Self {
                source: StdMutex::new(source.to_vec()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        async fn enter(&self, op: &'static str, session_id: Option<&str>) -> Result<(), TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(op);
            if let Some(id) = session_id {
                self.session_ids.lock().unwrap().push(id.to_owned());
            }
            if let Some(delay) = self.delay {
                if self.delay_only.is_none_or(|only| only == op) {
                    tokio::time::sleep(delay).await;
                }
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.failure.clone().map_or(Ok(()), Err)
        }
    }

    #[async_trait]
    impl HubClient for MockHub {
        async fn register(&self, _req: RegisterRequest) -> Result<RegisterResponse, TransportError> {
            self.enter("register", None).await?;
            let n = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RegisterResponse {
                session_id: format!("session-{n}"),
                code: self.register_code.unwrap_or(Outcome::Ok.code()),
            })
        }

        async fn read(&self, req: ReadRequest) -> Result<ReadResponse, TransportError> {
            self.enter("read", Some(&req.session_id)).await?;
            if let Some(reply) = &self.read_reply {
                return Ok(reply.clone());
            }
            let mut source = self.source.lock().unwrap();
            let size = req.size as usize;
            let n = size.min(source.len());
            let data: Vec<u8> = source.drain(..n).collect();
            let code = if n < size { Outcome::Eof } else { Outcome::Ok };
            Ok(ReadResponse {
                data,
                size: u32::try_from(n).unwrap(),
                code: code.code(),
            })
        }

        async fn write(&self, req: WriteRequest) -> Result<WriteResponse, TransportError> {
            self.enter("write", Some(&req.session_id)).await?;
            let accepted = self.write_limit.map_or(req.data.len(), |l| l.min(req.data.len()));
            self.sink.lock().unwrap().extend_from_slice(&req.data[..accepted]);
            let code = self.write_code.unwrap_or(if accepted < req.data.len() {
                Outcome::ShortWrite.code()
            } else {
                Outcome::Ok.code()
            });
            Ok(WriteResponse {
                size: u32::try_from(accepted).unwrap(),
                code,
            })
        }

        async fn close(&self, req: CloseRequest) -> Result<CloseResponse, TransportError> {
            self.enter("close", Some(&req.session_id)).await?;
            Ok(CloseResponse {
                code: self.close_code.unwrap_or(Outcome::Ok.code()),
            })
        }
    }

    fn conn(hub: MockHub) -> HubConn<MockHub> {
        HubConn::new(hub, ConnConfig::new().with_agent_id("agentID-1"))
    }

    async fn registered(hub: MockHub) -> HubConn<MockHub> {
        let conn = conn(hub);
        conn.register().await.unwrap();
        conn
    }

    /// Registered stream whose `op` calls take `delay`.
    async fn stalled(op: &'static str, delay: Duration, config: ConnConfig) -> HubConn<MockHub> {
        let hub = MockHub {
            source: StdMutex::new(b"data".to_vec()),
            delay: Some(delay),
            delay_only: Some(op),
            ..MockHub::default()
        };
        let conn = HubConn::new(hub, config);
        conn.register().await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_unregistered_operations_issue_no_calls() {
        let conn = conn(MockHub::with_source(b"data"));
        let mut buf = [0u8; 4];

        assert_eq!(conn.read(&mut buf).await, Err(StreamError::ClosedPipe));
        assert_eq!(conn.write(b"data").await, Err(StreamError::ClosedPipe));
        assert_eq!(conn.close().await, Err(StreamError::AlreadyClosed));
        assert!(conn.client().calls().is_empty());
    }

    #[tokio::test]
    async fn test_register_and_close_toggle_registration() {
        let conn = conn(MockHub::default());
        assert!(!conn.is_registered().await);

        conn.register().await.unwrap();
        assert!(conn.is_registered().await);
        assert_eq!(conn.session_id().await.as_deref(), Some("session-1"));

        conn.close().await.unwrap();
        assert!(!conn.is_registered().await);
        assert_eq!(conn.close().await, Err(StreamError::AlreadyClosed));
        assert_eq!(conn.client().calls(), ["register", "close"]);
    }

    #[tokio::test]
    async fn test_register_rejected() {
        let conn = conn(MockHub {
            register_code: Some(Outcome::Error.code()),
            ..MockHub::default()
        });
        assert_eq!(conn.register().await, Err(StreamError::AgentNotRegistered));
        assert!(!conn.is_registered().await);
    }

    #[tokio::test]
    async fn test_register_unknown_code_is_a_violation() {
        let conn = conn(MockHub {
            register_code: Some(17),
            ..MockHub::default()
        });
        assert!(matches!(
            conn.register().await,
            Err(StreamError::ProtocolViolation(_))
        ));
        assert!(!conn.is_registered().await);
    }

    #[tokio::test]
    async fn test_register_twice_replaces_session() {
        let conn = registered(MockHub::default()).await;
        conn.register().await.unwrap();
        assert_eq!(conn.session_id().await.as_deref(), Some("session-2"));
    }

    #[tokio::test]
    async fn test_short_source_reads_to_end_of_stream() {
        let conn = registered(MockHub::with_source(b"abc")).await;
        let mut buf = [0u8; 8];

        let err = conn.read(&mut buf).await.unwrap_err();
        assert_eq!(err, StreamError::EndOfStream { read: 3 });
        assert_eq!(&buf[..3], b"abc");
    }

    #[tokio::test]
    async fn test_sequential_reads_have_no_gap_or_duplicate() {
        let conn = registered(MockHub::with_source(b"hello world")).await;

        let mut buf = [0u8; 3];
        assert_eq!(conn.read(&mut buf).await, Ok(3));
        assert_eq!(&buf, b"hel");

        let mut buf = [0u8; 8];
        assert_eq!(conn.read(&mut buf).await, Ok(8));
        assert_eq!(&buf, b"lo world");

        let mut buf = [0u8; 10];
        assert_eq!(
            conn.read(&mut buf).await,
            Err(StreamError::EndOfStream { read: 0 })
        );
    }

    #[tokio::test]
    async fn test_read_carries_session_id() {
        let conn = registered(MockHub::with_source(b"xy")).await;
        let mut buf = [0u8; 2];
        conn.read(&mut buf).await.unwrap();
        assert_eq!(*conn.client().session_ids.lock().unwrap(), ["session-1"]);
    }

    #[tokio::test]
    async fn test_read_with_empty_buffer_skips_the_call() {
        let conn = registered(MockHub::with_source(b"xy")).await;
        assert_eq!(conn.read(&mut []).await, Ok(0));
        assert_eq!(conn.client().calls(), ["register"]);
    }

    #[tokio::test]
    async fn test_read_error_codes_copy_nothing() {
        for (code, expected) in [
            (Outcome::UnexpectedEof, StreamError::UnexpectedEndOfStream),
            (Outcome::ClosedPipe, StreamError::ClosedPipe),
        ] {
            let conn = registered(MockHub {
                read_reply: Some(ReadResponse {
                    data: b"junk".to_vec(),
                    size: 4,
                    code: code.code(),
                }),
                ..MockHub::default()
            })
            .await;
            let mut buf = [0u8; 4];
            assert_eq!(conn.read(&mut buf).await, Err(expected));
            assert_eq!(buf, [0u8; 4]);
        }
    }

    #[tokio::test]
    async fn test_read_size_beyond_payload_is_a_violation() {
        let conn = registered(MockHub {
            read_reply: Some(ReadResponse {
                data: b"ab".to_vec(),
                size: 5,
                code: Outcome::Ok.code(),
            }),
            ..MockHub::default()
        })
        .await;
        let mut buf = [0u8; 8];
        assert!(matches!(
            conn.read(&mut buf).await,
            Err(StreamError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_read_copies_at_most_the_buffer() {
        let conn = registered(MockHub {
            read_reply: Some(ReadResponse {
                data: b"abcdef".to_vec(),
                size: 6,
                code: Outcome::Ok.code(),
            }),
            ..MockHub::default()
        })
        .await;
        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await, Ok(4));
        assert_eq!(&buf, b"abcd");
    }

    #[tokio::test]
    async fn test_write_delivers_bytes() {
        let conn = registered(MockHub::default()).await;
        assert_eq!(conn.write(b"ls -la\n").await, Ok(7));
        assert_eq!(conn.client().sink.lock().unwrap().as_slice(), b"ls -la\n");
    }

    #[tokio::test]
    async fn test_short_write_reports_accepted_count() {
        let conn = registered(MockHub {
            write_limit: Some(4),
            ..MockHub::default()
        })
        .await;
        assert_eq!(
            conn.write(b"hello world").await,
            Err(StreamError::ShortWrite {
                written: 4,
                requested: 11
            })
        );
    }

    #[tokio::test]
    async fn test_write_closed_pipe() {
        let conn = registered(MockHub {
            write_code: Some(Outcome::ClosedPipe.code()),
            ..MockHub::default()
        })
        .await;
        assert_eq!(conn.write(b"x").await, Err(StreamError::ClosedPipe));
    }

    #[tokio::test]
    async fn test_write_all_through_the_stream_trait() {
        let conn = registered(MockHub {
            write_limit: Some(3),
            ..MockHub::default()
        })
        .await;
        let stream: &dyn TerminalStream = &conn;
        stream.write_all(b"hello world").await.unwrap();
        assert_eq!(conn.client().sink.lock().unwrap().as_slice(), b"hello world");
    }

    #[tokio::test]
    async fn test_close_failure_keeps_session() {
        let conn = registered(MockHub {
            close_code: Some(Outcome::ClosedPipe.code()),
            ..MockHub::default()
        })
        .await;
        assert!(matches!(
            conn.close().await,
            Err(StreamError::ProtocolViolation(_))
        ));
        assert!(conn.is_registered().await);
    }

    #[tokio::test]
    async fn test_reregistration_after_close() {
        let conn = registered(MockHub::with_source(b"again")).await;
        conn.close().await.unwrap();

        conn.register().await.unwrap();
        assert_eq!(conn.session_id().await.as_deref(), Some("session-2"));

        let mut buf = [0u8; 5];
        assert_eq!(conn.read(&mut buf).await, Ok(5));
        assert_eq!(&buf, b"again");
        assert_eq!(
            *conn.client().session_ids.lock().unwrap(),
            ["session-1", "session-2"]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_returned() {
        let conn = conn(MockHub {
            failure: Some(TransportError::ConnectionLost("reset".into())),
            ..MockHub::default()
        });
        assert_eq!(
            conn.register().await,
            Err(StreamError::Transport(TransportError::ConnectionLost(
                "reset".into()
            )))
        );
    }

    #[tokio::test]
    async fn test_slow_hub_times_out() {
        let hub = MockHub {
            delay: Some(Duration::from_millis(500)),
            ..MockHub::default()
        };
        let conn = HubConn::new(
            hub,
            ConnConfig::new().with_timeout(Duration::from_millis(20)),
        );
        assert_eq!(conn.register().await, Err(StreamError::Timeout));
        assert!(!conn.is_registered().await);
    }

    #[tokio::test]
    async fn test_explicit_read_deadline() {
        let conn = registered(MockHub::with_source(b"data")).await;
        conn.set_read_deadline(Some(Instant::now() - Duration::from_millis(1)));

        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await, Err(StreamError::Timeout));
        assert_eq!(conn.client().calls(), ["register"]);

        // Writes are governed by their own deadline.
        assert_eq!(conn.write(b"ok").await, Ok(2));

        conn.set_read_deadline(None);
        assert_eq!(conn.read(&mut buf).await, Ok(4));
    }

    #[tokio::test]
    async fn test_read_past_io_timeout() {
        let config = ConnConfig::new().with_io_timeout(Duration::from_millis(30));
        let conn = stalled("read", Duration::from_secs(2), config).await;

        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await, Err(StreamError::Timeout));
        assert!(conn.is_registered().await);

        // Only the timed-out call fails.
        tokio_test::assert_ok!(conn.write(b"ls\n").await);
        tokio_test::assert_ok!(conn.close().await);
        assert_eq!(conn.client().calls(), ["register", "read", "write", "close"]);
    }

    #[tokio::test]
    async fn test_write_past_io_timeout() {
        let config = ConnConfig::new().with_io_timeout(Duration::from_millis(30));
        let conn = stalled("write", Duration::from_secs(2), config).await;

        assert_eq!(conn.write(b"ls\n").await, Err(StreamError::Timeout));
        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await, Ok(4));
    }

    #[tokio::test]
    async fn test_explicit_deadline_tighter_than_io_timeout() {
        let config = ConnConfig::new().with_io_timeout(Duration::from_secs(10));
        let conn = stalled("read", Duration::from_secs(2), config).await;
        conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(30)));

        let started = Instant::now();
        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await, Err(StreamError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(conn.client().calls(), ["register", "read"]);
    }

    #[tokio::test]
    async fn test_io_timeout_tighter_than_explicit_deadline() {
        let config = ConnConfig::new().with_io_timeout(Duration::from_millis(30));
        let conn = stalled("read", Duration::from_secs(2), config).await;
        conn.set_read_deadline(Some(Instant::now() + Duration::from_secs(60)));

        let started = Instant::now();
        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await, Err(StreamError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_write_deadline() {
        let config = ConnConfig::new().with_io_timeout(Duration::from_secs(10));
        let conn = stalled("write", Duration::from_millis(300), config).await;

        conn.set_write_deadline(Some(Instant::now() - Duration::from_millis(1)));
        assert_eq!(conn.write(b"x").await, Err(StreamError::Timeout));
        assert_eq!(conn.client().calls(), ["register"]);

        conn.set_write_deadline(Some(Instant::now() + Duration::from_millis(30)));
        assert_eq!(conn.write(b"x").await, Err(StreamError::Timeout));

        // Reads are governed by their own deadline.
        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await, Ok(4));

        conn.set_write_deadline(None);
        assert_eq!(conn.write(b"x").await, Ok(1));
        assert_eq!(conn.client().sink.lock().unwrap().as_slice(), b"x");
    }

    #[tokio::test]
    async fn test_set_deadline_covers_both_directions() {
        let conn = registered(MockHub::with_source(b"data")).await;
        let stream: &dyn TerminalStream = &conn;
        stream.set_deadline(Some(Instant::now() - Duration::from_millis(1)));

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await, Err(StreamError::Timeout));
        assert_eq!(stream.write(b"x").await, Err(StreamError::Timeout));
        assert_eq!(conn.client().calls(), ["register"]);
    }

    #[tokio::test]
    async fn test_close_timeout_keeps_session() {
        let config = ConnConfig::new().with_timeout(Duration::from_millis(30));
        let conn = stalled("close", Duration::from_secs(2), config).await;

        assert_eq!(conn.close().await, Err(StreamError::Timeout));
        assert!(conn.is_registered().await);
        assert_eq!(conn.session_id().await.as_deref(), Some("session-1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_read_and_write_never_overlap() {
        let hub = MockHub {
            source: StdMutex::new(vec![b'x'; 64]),
            delay: Some(Duration::from_millis(2)),
            ..MockHub::default()
        };
        let conn = Arc::new(conn(hub));
        conn.register().await.unwrap();

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                for _ in 0..16 {
                    conn.read(&mut buf).await.unwrap();
                }
            })
        };
        let writer = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                for _ in 0..16 {
                    conn.write(b"abcd").await.unwrap();
                }
            })
        };
        reader.await.unwrap();
        writer.await.unwrap();

        let hub = conn.client();
        assert_eq!(hub.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(hub.calls().len(), 33);
        assert_eq!(hub.sink.lock().unwrap().len(), 64);
    }
}
