// SPDX-License-Identifier: MIT OR Apache-2.0
//! The synchronous checkpoint exchange and its error handlers.

use async_trait::async_trait;
use kcl_config::BridgeConfig;
use kcl_protocol::{JsonlCodec, Message, Record};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{BridgeError, LineTransport};

/// Prefix of the error text handed to handlers when the daemon answers a
/// checkpoint request with some other message.
pub const UNEXPECTED_RESPONSE: &str = "unexpected response to checkpoint";

// ---------------------------------------------------------------------------
// CheckpointTarget
// ---------------------------------------------------------------------------

/// Position a checkpoint request refers to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckpointTarget {
    /// The last record delivered to the processor.
    #[default]
    LastDelivered,
    /// An explicit position.
    Sequence {
        /// Sequence number to checkpoint at.
        sequence_number: String,
        /// Sub-sequence within an aggregated record.
        sub_sequence_number: Option<i64>,
    },
}

impl CheckpointTarget {
    /// An explicit sequence number with no sub-sequence.
    pub fn sequence(sequence_number: impl Into<String>) -> Self {
        CheckpointTarget::Sequence {
            sequence_number: sequence_number.into(),
            sub_sequence_number: None,
        }
    }

    /// The sequence number, or `None` for [`CheckpointTarget::LastDelivered`].
    #[must_use]
    pub fn sequence_number(&self) -> Option<&str> {
        match self {
            CheckpointTarget::LastDelivered => None,
            CheckpointTarget::Sequence {
                sequence_number, ..
            } => Some(sequence_number),
        }
    }

    fn to_request(&self) -> Message {
        match self {
            CheckpointTarget::LastDelivered => Message::checkpoint_request(None, None),
            CheckpointTarget::Sequence {
                sequence_number,
                sub_sequence_number,
            } => Message::checkpoint_request(Some(sequence_number.clone()), *sub_sequence_number),
        }
    }
}

impl From<&Record> for CheckpointTarget {
    fn from(record: &Record) -> Self {
        CheckpointTarget::Sequence {
            sequence_number: record.sequence_number().to_string(),
            sub_sequence_number: record.sub_sequence_number(),
        }
    }
}

impl From<&str> for CheckpointTarget {
    fn from(sequence_number: &str) -> Self {
        CheckpointTarget::sequence(sequence_number)
    }
}

impl From<String> for CheckpointTarget {
    fn from(sequence_number: String) -> Self {
        CheckpointTarget::sequence(sequence_number)
    }
}

impl fmt::Display for CheckpointTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointTarget::LastDelivered => f.write_str("last delivered record"),
            CheckpointTarget::Sequence {
                sequence_number,
                sub_sequence_number: None,
            } => f.write_str(sequence_number),
            CheckpointTarget::Sequence {
                sequence_number,
                sub_sequence_number: Some(sub),
            } => write!(f, "{sequence_number}.{sub}"),
        }
    }
}

// ---------------------------------------------------------------------------
// CheckpointErrorKind
// ---------------------------------------------------------------------------

/// Broad family of a checkpoint failure, derived from the daemon's error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointErrorKind {
    /// The lease table is being throttled.
    Throttling,
    /// The processor is shutting down; its lease is gone.
    Shutdown,
    /// The lease table is missing or inconsistent.
    InvalidState,
    /// A dependency of the daemon failed.
    Dependency,
    /// The daemon answered with something other than a checkpoint message.
    UnexpectedResponse,
    /// Anything else.
    Other,
}

impl CheckpointErrorKind {
    /// Classify an error string as reported by the daemon.
    #[must_use]
    pub fn classify(error: &str) -> Self {
        if error.starts_with(UNEXPECTED_RESPONSE) {
            CheckpointErrorKind::UnexpectedResponse
        } else if error.contains("ThrottlingException") {
            CheckpointErrorKind::Throttling
        } else if error.contains("ShutdownException") {
            CheckpointErrorKind::Shutdown
        } else if error.contains("InvalidStateException") {
            CheckpointErrorKind::InvalidState
        } else if error.contains("KinesisClientLibDependencyException") {
            CheckpointErrorKind::Dependency
        } else {
            CheckpointErrorKind::Other
        }
    }

    /// Whether the same checkpoint might succeed if tried again later.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            CheckpointErrorKind::Throttling | CheckpointErrorKind::Dependency
        )
    }
}

// ---------------------------------------------------------------------------
// CheckpointErrorHandler
// ---------------------------------------------------------------------------

/// Called when a checkpoint request fails.
///
/// The handler receives the checkpointer that issued the request and may use
/// it to try again. Returning `Err` is reserved for fatal transport failures
/// from such a retry.
#[async_trait]
pub trait CheckpointErrorHandler: Send + Sync {
    /// Handle a failed checkpoint at `target`.
    async fn on_checkpoint_error(
        &self,
        target: &CheckpointTarget,
        error: &str,
        checkpointer: &mut Checkpointer<'_>,
    ) -> Result<(), BridgeError>;
}

/// Retries a failed checkpoint a bounded number of times.
///
/// Each retry sleeps for `delay` and then repeats the request with a handler
/// whose budget is one lower. With a budget of `n`, a checkpoint that keeps
/// failing is sent `n + 1` times in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryingCheckpointErrorHandler {
    retries: u32,
    delay: Duration,
}

impl RetryingCheckpointErrorHandler {
    /// Allow `retries` further attempts, `delay` apart.
    #[must_use]
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Remaining retry budget.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Pause before each retry.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    fn next(self) -> Option<Self> {
        self.retries.checked_sub(1).map(|retries| Self { retries, ..self })
    }
}

impl From<&BridgeConfig> for RetryingCheckpointErrorHandler {
    fn from(config: &BridgeConfig) -> Self {
        Self::new(config.checkpoint_retries(), config.checkpoint_retry_delay())
    }
}

#[async_trait]
impl CheckpointErrorHandler for RetryingCheckpointErrorHandler {
    async fn on_checkpoint_error(
        &self,
        target: &CheckpointTarget,
        error: &str,
        checkpointer: &mut Checkpointer<'_>,
    ) -> Result<(), BridgeError> {
        let Some(next) = self.next() else {
            warn!(target: "kcl.checkpoint", position = %target, error = %error, "checkpoint retries exhausted");
            return Ok(());
        };
        debug!(
            target: "kcl.checkpoint",
            position = %target,
            remaining = next.retries,
            delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
            "retrying checkpoint"
        );
        tokio::time::sleep(self.delay).await;
        checkpointer
            .checkpoint_with(target.clone(), Some(&next as &dyn CheckpointErrorHandler))
            .await
    }
}

// ---------------------------------------------------------------------------
// Checkpointer
// ---------------------------------------------------------------------------

/// Lets a callback record its progress with the daemon.
///
/// Only handed to callbacks that may checkpoint; `lease_lost` never receives
/// one. Each call writes a `checkpoint` request and blocks until the daemon's
/// answer has been read. Failures reported by the daemon are passed to the
/// error handler, if any, and are otherwise ignored: the methods only fail
/// when the transport itself does.
pub struct Checkpointer<'a> {
    transport: &'a mut LineTransport,
}

impl<'a> Checkpointer<'a> {
    pub(crate) fn new(transport: &'a mut LineTransport) -> Self {
        Self { transport }
    }

    /// Checkpoint at the last record delivered to the processor.
    pub async fn checkpoint(&mut self) -> Result<(), BridgeError> {
        self.checkpoint_with(CheckpointTarget::LastDelivered, None)
            .await
    }

    /// Checkpoint at a record or an explicit sequence number.
    pub async fn checkpoint_at<T>(&mut self, target: T) -> Result<(), BridgeError>
    where
        T: Into<CheckpointTarget>,
    {
        self.checkpoint_with(target.into(), None).await
    }

    /// Checkpoint at `target`, sending any failure to `handler`.
    pub async fn checkpoint_with(
        &mut self,
        target: CheckpointTarget,
        handler: Option<&dyn CheckpointErrorHandler>,
    ) -> Result<(), BridgeError> {
        debug!(target: "kcl.checkpoint", position = %target, "requesting checkpoint");
        self.transport.write_message(&target.to_request()).await?;

        let line = self
            .transport
            .read_line()
            .await?
            .ok_or(BridgeError::ClosedDuringCheckpoint)?;
        let error = match JsonlCodec::decode(&line)? {
            Message::Checkpoint(response) => match response.error() {
                None => {
                    debug!(target: "kcl.checkpoint", position = %target, "checkpoint recorded");
                    return Ok(());
                }
                Some(error) => error.to_string(),
            },
            other => format!("{UNEXPECTED_RESPONSE}: {}", other.action()),
        };

        let kind = CheckpointErrorKind::classify(&error);
        warn!(target: "kcl.checkpoint", position = %target, error = %error, ?kind, "checkpoint failed");
        match handler {
            Some(handler) => handler.on_checkpoint_error(&target, &error, self).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Checkpointer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpointer").finish_non_exhaustive()
    }
}
