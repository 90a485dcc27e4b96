//! Newline-delimited JSON batch server.
//!
//! Each client connection carries any number of request lines. Every line gets
//! exactly one reply line, and a line that cannot be decoded gets an
//! `{"error": ...}` reply without closing the connection. Batches from all
//! clients run one at a time behind a single lock.

use crate::batch::BatchProcessor;
use crate::protocol::{BatchResponse, ProtocolError, ProtocolHandler, MAX_REQUEST_SIZE};
use crate::session::Connector;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Longest line buffered from a client: a full request plus a `\r\n` terminator.
pub const MAX_LINE_LEN: usize = MAX_REQUEST_SIZE + 2;

pub type SharedProcessor = Arc<Mutex<BatchProcessor<Box<dyn Connector + Send + Sync>>>>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub fn shared(processor: BatchProcessor<Box<dyn Connector + Send + Sync>>) -> SharedProcessor {
    Arc::new(Mutex::new(processor))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Line,
    TooLong,
    Eof,
}

/// Reads one `\n`-terminated line into `buf`, keeping at most
/// [`MAX_LINE_LEN`] bytes. The rest of an oversized line is consumed and
/// dropped.
async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Frame> {
    buf.clear();
    let mut overflow = false;
    let mut seen_any = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (seen_any, overflow) {
                (false, _) => Frame::Eof,
                (true, true) => Frame::TooLong,
                (true, false) => Frame::Line,
            });
        }
        seen_any = true;

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };
        if !overflow {
            if buf.len() + used > MAX_LINE_LEN {
                overflow = true;
                buf.clear();
            } else {
                buf.extend_from_slice(&available[..used]);
            }
        }
        reader.consume(used);

        if done {
            return Ok(if overflow { Frame::TooLong } else { Frame::Line });
        }
    }
}

async fn run_batch(processor: &SharedProcessor, commands: Vec<String>) -> Vec<String> {
    // One batch at a time: the bench instruments are single-owner
    let mut guard = processor.lock().await;
    let responses = tokio::task::block_in_place(|| guard.process(commands.as_slice()));

    let stats = guard.stats();
    info!(
        "📊 {} batch(es), {} command(s), {} failed, last batch {}us",
        stats.batches_processed, stats.commands_processed, stats.commands_failed, stats.last_batch_time_us
    );
    responses
}

/// Serves one client until it disconnects.
///
/// Needs a multi-threaded runtime: instrument I/O runs under
/// `block_in_place`.
pub async fn handle_client<S>(stream: S, processor: SharedProcessor) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut protocol = Box::new(ProtocolHandler::new());
    let mut line = Vec::with_capacity(MAX_LINE_LEN);

    loop {
        let request = match read_frame(&mut reader, &mut line).await? {
            Frame::Eof => break,
            Frame::TooLong => Err(ProtocolError::MessageTooLarge),
            Frame::Line => {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                protocol.parse_request_bytes(&line)
            }
        };

        let reply = match request {
            Ok(request) => {
                info!("📨 Received batch: {:?}", request.commands);
                let responses = run_batch(&processor, request.commands).await;

                let encoded = protocol
                    .serialize_response(&BatchResponse { responses })
                    .map(str::to_string);
                match encoded {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode response: {}", e);
                        protocol.serialize_error(&e.to_string())?.to_string()
                    }
                }
            }
            Err(e) => {
                warn!("Rejected request: {}", e);
                protocol.serialize_error(&e.to_string())?.to_string()
            }
        };

        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        info!("📤 Sent response: {}", reply);
    }

    Ok(())
}

/// Accepts clients forever, one task per connection.
pub async fn serve(listener: TcpListener, processor: SharedProcessor) -> Result<(), ServerError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_processor = Arc::clone(&processor);

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_processor).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
