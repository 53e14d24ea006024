//! Shell process in a PTY, bridged onto a terminal stream.

use std::{
    io::{self, Read, Write},
    path::Path,
    sync::Arc,
    time::Duration,
};

use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use terminal_hub_core::{StreamError, TerminalStream, protocol::WindowSize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::shell::ShellCommand;

const CHUNK_SIZE: usize = 4096;
const CHANNEL_DEPTH: usize = 64;

/// Pause after a read that returned no bytes, so an idle hub is not polled
/// in a tight loop.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// PTY error.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("Failed to open PTY: {0}")]
    Open(String),
    #[error("Failed to spawn shell: {0}")]
    Spawn(String),
    #[error("Invalid shell command: {0}")]
    InvalidCommand(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// How a bridge finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEnd {
    /// The shell closed its side of the PTY.
    ShellExited { code: u32 },
    /// The stream reached its end; the shell was killed.
    StreamEnded,
}

/// A shell running in a pseudo-terminal.
pub struct ShellProcess {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl ShellProcess {
    /// Spawn `cmd` in a new PTY of the given size.
    ///
    /// # Errors
    /// Returns error if the PTY cannot be opened or the command spawned.
    pub fn spawn(
        cmd: &ShellCommand,
        size: WindowSize,
        cwd: Option<&Path>,
    ) -> Result<Self, PtyError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut builder = CommandBuilder::new(&cmd.program);
        builder.args(&cmd.args);
        builder.env("TERM", "xterm-256color");
        if let Some(cwd) = cwd {
            builder.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        // The child holds its own handle; ours would keep the PTY open after it exits.
        drop(pair.slave);

        tracing::info!(program = %cmd.program.display(), pid = ?child.process_id(), "Spawned shell");
        Ok(Self {
            master: pair.master,
            child,
        })
    }

    /// Copy bytes both ways between the shell and `stream` until one side
    /// ends.
    ///
    /// Stream end of input kills the shell. The stream is not closed.
    ///
    /// # Errors
    /// Returns the first stream or PTY error; the shell is killed first.
    pub async fn bridge(self, stream: Arc<dyn TerminalStream>) -> Result<BridgeEnd, PtyError> {
        let Self { master, mut child } = self;
        let reader = master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let (out_tx, out_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_DEPTH);
        tokio::task::spawn_blocking(move || pump_from_pty(reader, &out_tx));
        tokio::task::spawn_blocking(move || pump_into_pty(writer, in_rx));

        let outcome = tokio::select! {
            res = shell_to_stream(out_rx, Arc::clone(&stream)) => res.map(|sent| {
                tracing::debug!(sent, "Shell output finished");
                true
            }),
            res = stream_to_shell(Arc::clone(&stream), in_tx) => res.map(|received| {
                tracing::debug!(received, "Stream input finished");
                false
            }),
        };

        let shell_exited = matches!(outcome, Ok(true));
        if !shell_exited {
            if let Err(e) = child.kill() {
                tracing::debug!(?e, "Shell already gone");
            }
        }
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(io::Error::other)??;
        drop(master);
        tracing::info!(code = status.exit_code(), "Shell exited");

        outcome?;
        Ok(if shell_exited {
            BridgeEnd::ShellExited {
                code: status.exit_code(),
            }
        } else {
            BridgeEnd::StreamEnded
        })
    }
}

async fn shell_to_stream(
    mut rx: mpsc::Receiver<Vec<u8>>,
    stream: Arc<dyn TerminalStream>,
) -> Result<u64, PtyError> {
    let mut sent = 0u64;
    while let Some(chunk) = rx.recv().await {
        stream.write_all(&chunk).await?;
        sent += chunk.len() as u64;
    }
    Ok(sent)
}

async fn stream_to_shell(
    stream: Arc<dyn TerminalStream>,
    tx: mpsc::Sender<Vec<u8>>,
) -> Result<u64, PtyError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;
    loop {
        let (n, done) = match stream.read(&mut buf).await {
            Ok(0) => {
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            }
            // A bounded read with nothing to deliver; the stream stays usable.
            Err(StreamError::Timeout) => {
                tracing::trace!("Stream read timed out, polling again");
                continue;
            }
            Ok(n) => (n, false),
            Err(StreamError::EndOfStream { read }) => (read, true),
            Err(e) => return Err(e.into()),
        };
        if n > 0 {
            received += n as u64;
            if tx.send(buf[..n].to_vec()).await.is_err() {
                return Ok(received);
            }
        }
        if done {
            return Ok(received);
        }
    }
}

fn pump_from_pty(mut reader: Box<dyn Read + Send>, tx: &mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                // Linux reports EIO once the last slave handle closes.
                tracing::debug!(?e, "PTY read ended");
                break;
            }
        }
    }
}

fn pump_into_pty(mut writer: Box<dyn Write + Send>, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(chunk) = rx.blocking_recv() {
        if let Err(e) = writer.write_all(&chunk).and_then(|()| writer.flush()) {
            tracing::debug!(?e, "PTY write failed");
            break;
        }
    }
}
