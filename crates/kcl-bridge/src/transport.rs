// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line framing over the daemon's input, output and diagnostic streams.

use kcl_protocol::{JsonlCodec, MalformedCause, MalformedMessage, Message};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::BridgeError;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The single handle through which a session talks to the daemon.
///
/// Every read and write of a session goes through one `LineTransport`. The
/// dispatcher owns it and lends it to the [`crate::Checkpointer`] while a
/// callback runs, so a checkpoint response is always the very next line read.
pub struct LineTransport {
    input: BufReader<BoxedReader>,
    output: BoxedWriter,
    diagnostics: BoxedWriter,
    buf: Vec<u8>,
}

impl LineTransport {
    /// Wrap arbitrary streams. Diagnostics go to the process's stderr.
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            input: BufReader::new(Box::new(input)),
            output: Box::new(output),
            diagnostics: Box::new(tokio::io::stderr()),
            buf: Vec::new(),
        }
    }

    /// Stdin for messages from the daemon, stdout for messages to it.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Send diagnostics somewhere other than stderr.
    #[must_use]
    pub fn with_diagnostics<D>(mut self, diagnostics: D) -> Self
    where
        D: AsyncWrite + Send + Unpin + 'static,
    {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    /// Read the next non-blank line, without its line terminator.
    ///
    /// Returns `Ok(None)` at end of stream. A line that is not UTF-8 is
    /// consumed and reported as [`BridgeError::Malformed`].
    pub async fn read_line(&mut self) -> Result<Option<String>, BridgeError> {
        loop {
            self.buf.clear();
            let n = self
                .input
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(BridgeError::Read)?;
            if n == 0 {
                return Ok(None);
            }
            let end = self
                .buf
                .iter()
                .rposition(|b| !matches!(b, b'\n' | b'\r'))
                .map_or(0, |i| i + 1);
            let bytes = &self.buf[..end];
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let line = std::str::from_utf8(bytes).map_err(|e| {
                MalformedMessage::new(
                    String::from_utf8_lossy(bytes),
                    MalformedCause::InvalidUtf8(e),
                )
            })?;
            trace!(target: "kcl.transport", line, "<- daemon");
            return Ok(Some(line.to_string()));
        }
    }

    /// Write one line followed by `\n`, then flush.
    ///
    /// The daemon may be blocked waiting for this line, so it is never left
    /// sitting in a buffer.
    pub async fn write_line(&mut self, line: &str) -> Result<(), BridgeError> {
        if line.contains(['\n', '\r']) {
            return Err(BridgeError::EmbeddedNewline);
        }
        trace!(target: "kcl.transport", line, "-> daemon");
        self.output
            .write_all(line.as_bytes())
            .await
            .map_err(BridgeError::Write)?;
        self.output
            .write_all(b"\n")
            .await
            .map_err(BridgeError::Write)?;
        self.output.flush().await.map_err(BridgeError::Write)?;
        Ok(())
    }

    /// Encode and write a message.
    pub async fn write_message(&mut self, msg: &Message) -> Result<(), BridgeError> {
        let line = JsonlCodec::encode(msg).map_err(|source| BridgeError::Encode {
            action: msg.action(),
            source,
        })?;
        self.write_line(&line).await
    }

    /// Write one line to the diagnostic stream.
    ///
    /// Embedded line breaks are flattened so one call is always one line.
    pub async fn write_diagnostic(&mut self, line: &str) -> std::io::Result<()> {
        let flat = line.replace(['\n', '\r'], " ");
        self.diagnostics.write_all(flat.as_bytes()).await?;
        self.diagnostics.write_all(b"\n").await?;
        self.diagnostics.flush().await
    }
}

impl std::fmt::Debug for LineTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTransport").finish_non_exhaustive()
    }
}
