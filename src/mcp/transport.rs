//! MCP Transport Layer
//!
//! Newline-delimited JSON-RPC framing over any async byte stream. The server
//! uses it on stdin/stdout; tests drive it over in-memory duplex pipes.
//!
//! # Architecture
//!
//! The transport layer is responsible only for sending and receiving messages.
//! Protocol concerns (JSON-RPC semantics) are handled in the protocol layer.

use crate::mcp::protocol::McpResponse;
use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// One non-blank line from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Line text without its terminator
    Text(String),
    /// The line was not valid UTF-8; the error description
    Malformed(String),
}

/// Reads one JSON-RPC message per line
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next non-blank line, or `None` at EOF
    ///
    /// A line that is not UTF-8 comes back as [`Frame::Malformed`] and does
    /// not end the stream. Cancel-safe, so it can sit in a `select!` next to
    /// other work: bytes of a partially read line stay in the buffer.
    pub async fn next_message(&mut self) -> Result<Option<Frame>> {
        loop {
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .context("Failed to read from MCP client")?;
            if read == 0 && self.buf.is_empty() {
                return Ok(None);
            }

            let bytes = std::mem::take(&mut self.buf);
            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    tracing::debug!("Received non-UTF-8 line from MCP client: {}", e);
                    return Ok(Some(Frame::Malformed(e.to_string())));
                }
            };
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            tracing::trace!("Received from MCP client: {}", line.trim());
            return Ok(Some(Frame::Text(line.to_string())));
        }
    }
}

/// Writes one JSON-RPC message per line, flushing after each
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize and send a response
    pub async fn send(&mut self, response: &McpResponse) -> Result<()> {
        let mut json =
            serde_json::to_string(response).context("Failed to serialize MCP response to JSON")?;
        tracing::trace!("Sending to MCP client: {}", json);
        json.push('\n');

        self.writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write to MCP client")?;

        // Flush to ensure the message is sent immediately
        self.writer
            .flush()
            .await
            .context("Failed to flush MCP client stream")?;

        Ok(())
    }
}
