//! Test Manager connection lifecycle.
//!
//! The agent is the connecting side: it dials the Test Manager socket,
//! announces itself with the `initialize` handshake, then loops reading
//! command envelopes until the manager closes the connection. A dedicated
//! writer task drains the outbound queue so responses from transport
//! callbacks never interleave mid-envelope on the socket.

use crate::correlator::ResponseCorrelator;
use crate::session::Session;
use crate::transport::Transport;
use anyhow::Context;
use std::sync::Arc;
use tca_core::config::AgentConfig;
use tca_core::envelope::{CommandEnvelope, ResponseEnvelope};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Incremental decoder for the inbound byte stream.
///
/// The protocol is a sequence of JSON objects with no framing guarantee:
/// one read may carry half an object or several. Bytes are buffered and
/// complete JSON values are drained off the front as they become whole.
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Drain the next complete command, if one is buffered.
    ///
    /// Returns `None` when the buffer holds only an incomplete value (wait
    /// for more bytes). A syntactically broken stream discards the buffer;
    /// a well-formed JSON value of the wrong shape is reported as an error
    /// for that value alone and decoding continues behind it.
    pub fn next_frame(&mut self) -> Option<Result<CommandEnvelope, serde_json::Error>> {
        let mut iter =
            serde_json::Deserializer::from_slice(&self.buffer).into_iter::<serde_json::Value>();
        match iter.next()? {
            Ok(value) => {
                let consumed = iter.byte_offset();
                self.buffer.drain(..consumed);
                Some(serde_json::from_value(value))
            }
            Err(error) if error.is_eof() => None,
            Err(error) => {
                // Unrecoverable garbage; resynchronize on the next read.
                self.buffer.clear();
                Some(Err(error))
            }
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Connect to the Test Manager and run the command loop to completion.
///
/// Returns once the manager closes the connection or the socket fails.
pub async fn run(config: &AgentConfig, transport: Arc<dyn Transport>) -> anyhow::Result<()> {
    let address = format!("{}:{}", config.manager_host, config.manager_port);
    let stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("failed to connect to test manager at {address}"))?;
    info!("connected to test manager at {address}");

    let (mut reader, writer) = stream.into_split();
    let (correlator, rx) = ResponseCorrelator::channel();
    let shutdown = CancellationToken::new();
    let writer_task = tokio::spawn(write_loop(writer, rx, shutdown.clone()));

    correlator.send_envelope(ResponseEnvelope::initialize());

    let mut session = Session::new(transport, correlator);
    let mut frames = FrameReader::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                info!("test manager closed the connection");
                break;
            }
            Ok(n) => {
                frames.extend(&chunk[..n]);
                while let Some(frame) = frames.next_frame() {
                    match frame {
                        Ok(envelope) => session.process(envelope).await,
                        Err(error) => warn!("discarding malformed command: {error}"),
                    }
                }
            }
            Err(error) => {
                warn!("socket read failed: {error}");
                break;
            }
        }
    }

    shutdown.cancel();
    let _ = writer_task.await;
    Ok(())
}

/// Drain the outbound queue onto the socket, one envelope per line.
///
/// Cancellation is only observed when the queue is empty, and anything
/// that raced in before the cancel is still flushed on the way out, so
/// the session's final responses reach the manager.
async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<ResponseEnvelope>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let envelope = tokio::select! {
            biased;
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
            _ = shutdown.cancelled() => break,
        };
        if write_envelope(&mut writer, &envelope).await.is_err() {
            return;
        }
    }

    while let Ok(envelope) = rx.try_recv() {
        if write_envelope(&mut writer, &envelope).await.is_err() {
            return;
        }
    }
}

/// Serialize one envelope and write it, newline-terminated. An envelope
/// that fails to serialize is logged and skipped; only socket failures
/// are returned.
async fn write_envelope<W>(writer: &mut W, envelope: &ResponseEnvelope) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = match serde_json::to_vec(envelope) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!("failed to serialize response for {}: {error}", envelope.action);
            return Ok(());
        }
    };
    bytes.push(b'\n');

    if let Err(error) = writer.write_all(&bytes).await {
        warn!("socket write failed: {error}");
        return Err(error);
    }
    debug!(
        "sent {} (test_id {:?})",
        envelope.action, envelope.test_id
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
