// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the bridge.

use kcl_protocol::{Action, MalformedMessage};
use thiserror::Error;

/// Error type returned by record processor callbacks.
///
/// A [`BridgeError`] raised inside a callback (for example by `?` on a
/// checkpoint call) keeps its identity when it leaves [`crate::Bridge::run`].
pub type ProcessorError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by record processor callbacks.
pub type ProcessorResult = Result<(), ProcessorError>;

/// Fatal conditions that end a bridge session.
///
/// Checkpoint failures reported by the daemon are not part of this type: they
/// are delivered to a [`crate::CheckpointErrorHandler`] instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A line could not be decoded, or arrived where it is not allowed.
    #[error(transparent)]
    Malformed(#[from] MalformedMessage),

    /// An outbound message could not be serialized.
    #[error("failed to encode {action} message: {source}")]
    Encode {
        /// Action of the message being written.
        action: Action,
        /// Serializer failure.
        #[source]
        source: serde_json::Error,
    },

    /// Reading from the daemon failed.
    #[error("failed to read from daemon: {0}")]
    Read(#[source] std::io::Error),

    /// Writing to the daemon failed.
    #[error("failed to write to daemon: {0}")]
    Write(#[source] std::io::Error),

    /// The daemon closed its end while a checkpoint response was pending.
    #[error("daemon closed the stream while a checkpoint response was pending")]
    ClosedDuringCheckpoint,

    /// An outbound line contained a newline and would break framing.
    #[error("refusing to write a line containing a newline")]
    EmbeddedNewline,

    /// The record processor returned an error.
    #[error("record processor failed during {action}: {source}")]
    Processor {
        /// Action whose callback failed.
        action: Action,
        /// The processor's error.
        #[source]
        source: ProcessorError,
    },
}

impl BridgeError {
    /// Wrap a callback failure, unwrapping bridge errors that passed through it.
    pub(crate) fn from_processor(action: Action, source: ProcessorError) -> Self {
        match source.downcast::<BridgeError>() {
            Ok(inner) => *inner,
            Err(source) => BridgeError::Processor { action, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn processor_error_keeps_source() {
        let err = BridgeError::from_processor(Action::ProcessRecords, "disk full".into());
        assert!(matches!(
            err,
            BridgeError::Processor {
                action: Action::ProcessRecords,
                ..
            }
        ));
        assert_eq!(err.source().unwrap().to_string(), "disk full");
        assert!(err.to_string().contains("processRecords"));
    }

    #[test]
    fn bridge_error_passes_through_callbacks() {
        let inner: ProcessorError = Box::new(BridgeError::ClosedDuringCheckpoint);
        let err = BridgeError::from_processor(Action::ShardEnded, inner);
        assert!(matches!(err, BridgeError::ClosedDuringCheckpoint));
    }

    #[test]
    fn io_errors_expose_source() {
        let err = BridgeError::Write(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe broke",
        ));
        assert!(err.source().unwrap().to_string().contains("pipe broke"));
    }
}
