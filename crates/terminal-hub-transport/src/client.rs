//! Hub client over a single line-delimited JSON connection.

use std::net::SocketAddr;

use async_trait::async_trait;
use terminal_hub_core::{
    HubClient, TerminalRegistry, TransportError,
    protocol::{
        CloseRequest, CloseResponse, ReadRequest, ReadResponse, RegisterRequest,
        RegisterResponse, TerminalRegisterRequest, TerminalRegisterResponse, WriteRequest,
        WriteResponse,
    },
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
};

use crate::wire::{HubReply, HubRequest, ReplyFrame, RequestFrame};

struct LineIo {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Bytes of a reply line read before its call was abandoned.
    partial: Vec<u8>,
    next_id: u64,
    /// Set while a request is being written.
    torn: bool,
}

/// Hub client carrying one call at a time over a TCP connection.
///
/// Each request carries a call id. A call whose future is dropped while
/// waiting for its reply leaves that reply on the wire; the next call skips
/// it by id. The result of the abandoned call is lost.
///
/// A call dropped part way through writing its request leaves a torn line
/// on the wire, after which the client refuses further calls with
/// `TransportError::Desynchronized`.
pub struct JsonLineClient {
    io: Mutex<LineIo>,
    peer: SocketAddr,
}

impl JsonLineClient {
    /// Connect to a hub.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    /// Wrap an already connected socket.
    ///
    /// # Errors
    /// Returns error if the socket has no peer.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        tracing::debug!(%peer, "Connected to hub");
        Ok(Self {
            io: Mutex::new(LineIo {
                reader: BufReader::new(reader),
                writer,
                partial: Vec::new(),
                next_id: 1,
                torn: false,
            }),
            peer,
        })
    }

    /// Address of the hub.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one request and wait for its reply.
    ///
    /// # Errors
    /// `Remote` for an error reply, `Desynchronized` after a torn request,
    /// `ConnectionLost` or `Io` for socket failures.
    pub async fn call(&self, req: HubRequest) -> Result<HubReply, TransportError> {
        let mut io = self.io.lock().await;
        if io.torn {
            tracing::warn!(peer = %self.peer, method = req.method(), "Refusing call on desynchronized hub connection");
            return Err(TransportError::Desynchronized);
        }

        let id = io.next_id;
        io.next_id += 1;
        let method = req.method();
        let line = RequestFrame::new(id, req).to_line()?;

        io.torn = true;
        io.writer.write_all(line.as_bytes()).await?;
        io.writer.flush().await?;
        io.torn = false;

        loop {
            let frame = io.next_reply().await?;
            if frame.answers(id) {
                return match frame.reply {
                    HubReply::Error { message } => Err(TransportError::Remote(message)),
                    reply => Ok(reply),
                };
            }
            tracing::debug!(peer = %self.peer, id, stale = ?frame.id, method, "Discarding reply to an abandoned call");
        }
    }
}

impl LineIo {
    async fn next_reply(&mut self) -> Result<ReplyFrame, TransportError> {
        // `read_until` keeps partial bytes in `partial` if this future is dropped.
        let n = self.reader.read_until(b'\n', &mut self.partial).await?;
        if n == 0 {
            return Err(TransportError::ConnectionLost(
                "hub closed the connection".into(),
            ));
        }
        let line = std::mem::take(&mut self.partial);
        let line =
            std::str::from_utf8(&line).map_err(|e| TransportError::Malformed(e.to_string()))?;
        ReplyFrame::from_line(line)
    }
}

fn unexpected(method: &str, reply: &HubReply) -> TransportError {
    TransportError::Malformed(format!("{} reply to {method} call", reply.kind()))
}

#[async_trait]
impl HubClient for JsonLineClient {
    async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, TransportError> {
        match self.call(HubRequest::Register(req)).await? {
            HubReply::Register(res) => Ok(res),
            other => Err(unexpected("register", &other)),
        }
    }

    async fn read(&self, req: ReadRequest) -> Result<ReadResponse, TransportError> {
        match self.call(HubRequest::Read(req)).await? {
            HubReply::Read(res) => Ok(res),
            other => Err(unexpected("read", &other)),
        }
    }

    async fn write(&self, req: WriteRequest) -> Result<WriteResponse, TransportError> {
        match self.call(HubRequest::Write(req)).await? {
            HubReply::Write(res) => Ok(res),
            other => Err(unexpected("write", &other)),
        }
    }

    async fn close(&self, req: CloseRequest) -> Result<CloseResponse, TransportError> {
        match self.call(HubRequest::Close(req)).await? {
            HubReply::Close(res) => Ok(res),
            other => Err(unexpected("close", &other)),
        }
    }
}

#[async_trait]
impl TerminalRegistry for JsonLineClient {
    async fn register_terminal(
        &self,
        req: TerminalRegisterRequest,
    ) -> Result<TerminalRegisterResponse, TransportError> {
        match self.call(HubRequest::RegisterTerminal(req)).await? {
            HubReply::RegisterTerminal(res) => Ok(res),
            other => Err(unexpected("register_terminal", &other)),
        }
    }
}
