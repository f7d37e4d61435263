// SPDX-License-Identifier: MIT OR Apache-2.0
//! The dispatch loop.

use kcl_protocol::{JsonlCodec, MalformedCause, MalformedMessage, Message, ShutdownReason};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::{
    BridgeError, Checkpointer, LegacyProcessorAdapter, LineTransport, ProcessorResult,
    RecordProcessor, ShardRecordProcessor, diagnostics,
};

/// Drives one [`ShardRecordProcessor`] for the lifetime of a daemon session.
///
/// Each line from the daemon is decoded, handed to the matching callback and
/// acknowledged with a `status` line once the callback returns. Checkpoints
/// taken inside the callback are written and answered before that
/// acknowledgement.
#[derive(Debug)]
pub struct Bridge<P> {
    processor: P,
}

impl<P: ShardRecordProcessor> Bridge<P> {
    /// Drive `processor`.
    pub fn new(processor: P) -> Self {
        Self { processor }
    }

    /// The processor being driven.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Give the processor back, typically after [`Bridge::run`] returned.
    pub fn into_processor(self) -> P {
        self.processor
    }

    /// Run over stdin and stdout until the daemon closes stdin.
    pub async fn run(&mut self) -> Result<(), BridgeError> {
        self.run_with_transport(&mut LineTransport::stdio()).await
    }

    /// Run over arbitrary streams; diagnostics still go to stderr.
    pub async fn run_with_io<R, W>(&mut self, input: R, output: W) -> Result<(), BridgeError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.run_with_transport(&mut LineTransport::new(input, output))
            .await
    }

    /// Run over an existing transport.
    ///
    /// Returns `Ok(())` once the input reaches end of stream or the daemon
    /// drops its end of the pipe. Any other outcome, including a line that is
    /// not UTF-8 or a failing read, is fatal: the error is reported on the transport's diagnostic
    /// stream and returned.
    pub async fn run_with_transport(
        &mut self,
        transport: &mut LineTransport,
    ) -> Result<(), BridgeError> {
        let result = self.dispatch_loop(transport).await;
        if let Err(err) = &result {
            error!(target: "kcl.bridge", error = %err, "bridge terminated");
            if let Err(io) = diagnostics::report(transport, err).await {
                warn!(target: "kcl.bridge", error = %io, "failed to write diagnostics");
            }
        }
        result
    }

    async fn dispatch_loop(&mut self, transport: &mut LineTransport) -> Result<(), BridgeError> {
        loop {
            let line = match transport.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!(target: "kcl.bridge", "input closed, stopping");
                    return Ok(());
                }
                Err(BridgeError::Read(err)) if input_closed(&err) => {
                    warn!(target: "kcl.bridge", error = %err, "input closed abruptly, stopping");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            let msg = JsonlCodec::decode(&line)?;
            let action = msg.action();
            debug!(target: "kcl.bridge", %action, "dispatching");

            let mut checkpointer = Checkpointer::new(transport);
            let outcome = match msg {
                Message::Initialize(input) => self.processor.initialize(input).await,
                Message::ProcessRecords(input) => {
                    self.processor
                        .process_records(input, &mut checkpointer)
                        .await
                }
                Message::LeaseLost => self.processor.lease_lost().await,
                Message::ShardEnded => self.processor.shard_ended(&mut checkpointer).await,
                Message::ShutdownRequested => {
                    self.processor.shutdown_requested(&mut checkpointer).await
                }
                Message::Shutdown(input) => {
                    self.legacy_shutdown(input.reason, &mut checkpointer)
                        .await
                }
                Message::Checkpoint(_) | Message::Status(_) => {
                    return Err(MalformedMessage::new(
                        line,
                        MalformedCause::UnexpectedAction(action),
                    )
                    .into());
                }
            };
            outcome.map_err(|source| BridgeError::from_processor(action, source))?;

            transport.write_message(&Message::status(action)).await?;
        }
    }

    async fn legacy_shutdown(
        &mut self,
        reason: ShutdownReason,
        checkpointer: &mut Checkpointer<'_>,
    ) -> ProcessorResult {
        debug!(target: "kcl.bridge", %reason, "legacy shutdown");
        match reason {
            ShutdownReason::Terminate => self.processor.shard_ended(checkpointer).await,
            ShutdownReason::Zombie => self.processor.lease_lost().await,
            ShutdownReason::Requested => self.processor.shutdown_requested(checkpointer).await,
        }
    }
}

/// Read failures that mean the daemon went away rather than sent bad data.
fn input_closed(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
    )
}

impl<L: RecordProcessor> Bridge<LegacyProcessorAdapter<L>> {
    /// Drive a processor written against the legacy callback surface.
    pub fn legacy(processor: L) -> Self {
        Bridge::new(LegacyProcessorAdapter::new(processor))
    }
}

