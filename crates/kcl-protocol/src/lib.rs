// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! kcl-protocol
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Wire format spoken between a multilang daemon and the record processor it
//! launches as a child process. Every line is a single JSON object whose
//! `action` field selects the message kind.

pub mod codec;
mod error;
mod record;

pub use codec::JsonlCodec;
pub use error::{MalformedCause, MalformedMessage};
pub use record::Record;

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Value of the `action` discriminator carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// The daemon assigned a shard to this processor.
    Initialize,
    /// A batch of records is ready.
    ProcessRecords,
    /// Another worker took the lease for this shard.
    LeaseLost,
    /// The shard has been fully consumed.
    ShardEnded,
    /// The daemon is shutting down gracefully.
    ShutdownRequested,
    /// Combined shutdown notification sent by older daemons.
    Shutdown,
    /// Checkpoint request (processor) or response (daemon).
    Checkpoint,
    /// Completion acknowledgement sent by the processor.
    Status,
}

impl Action {
    /// Every action, in wire-table order.
    pub const ALL: [Action; 8] = [
        Action::Initialize,
        Action::ProcessRecords,
        Action::LeaseLost,
        Action::ShardEnded,
        Action::ShutdownRequested,
        Action::Shutdown,
        Action::Checkpoint,
        Action::Status,
    ];

    /// The exact string used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Initialize => "initialize",
            Action::ProcessRecords => "processRecords",
            Action::LeaseLost => "leaseLost",
            Action::ShardEnded => "shardEnded",
            Action::ShutdownRequested => "shutdownRequested",
            Action::Shutdown => "shutdown",
            Action::Checkpoint => "checkpoint",
            Action::Status => "status",
        }
    }

    /// Look up an action by its wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload of an `initialize` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeInput {
    /// Shard this processor now owns.
    pub shard_id: String,
    /// Position processing resumes from, when the shard was checkpointed before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    /// Sub-sequence of the resume position for aggregated records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sequence_number: Option<i64>,
}

impl InitializeInput {
    /// Input for a shard with no prior checkpoint.
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            sequence_number: None,
            sub_sequence_number: None,
        }
    }
}

/// Payload of a `processRecords` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecordsInput {
    /// Records in shard order.
    pub records: Vec<Record>,
    /// How far behind the tip of the stream this batch is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub millis_behind_latest: Option<i64>,
}

impl ProcessRecordsInput {
    /// Wrap a batch of records.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            millis_behind_latest: None,
        }
    }

    /// The last record of the batch, if any.
    #[must_use]
    pub fn last_record(&self) -> Option<&Record> {
        self.records.last()
    }
}

/// Why an older daemon is shutting a processor down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShutdownReason {
    /// The shard ended; checkpointing is still allowed.
    Terminate,
    /// The lease was lost; the processor must not checkpoint.
    Zombie,
    /// The daemon itself is stopping.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownReason::Terminate => "TERMINATE",
            ShutdownReason::Zombie => "ZOMBIE",
            ShutdownReason::Requested => "REQUESTED",
        })
    }
}

/// Payload of a legacy `shutdown` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownInput {
    /// Reason given by the daemon.
    pub reason: ShutdownReason,
}

/// Payload of a `checkpoint` message.
///
/// The processor sends it as a request; the daemon echoes it back as the
/// response, with `error` set when the checkpoint could not be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMessage {
    /// Position to checkpoint at; `null` means the last delivered record.
    #[serde(default)]
    pub sequence_number: Option<String>,
    /// Sub-sequence of the position for aggregated records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sequence_number: Option<i64>,
    /// Failure reported by the daemon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckpointMessage {
    /// Build a request for the given position.
    pub fn request(sequence_number: Option<String>, sub_sequence_number: Option<i64>) -> Self {
        Self {
            sequence_number,
            sub_sequence_number,
            error: None,
        }
    }

    /// The daemon's error text, ignoring an empty string.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Payload of a `status` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    /// Action of the message that has just been handled.
    pub response_for: Action,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One line of the multilang protocol.
///
/// Decoding is done by [`JsonlCodec::decode`], which reads the discriminator
/// first and then parses the line against the matching payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    /// See [`InitializeInput`].
    Initialize(InitializeInput),
    /// See [`ProcessRecordsInput`].
    ProcessRecords(ProcessRecordsInput),
    /// The lease on the shard is gone.
    LeaseLost,
    /// The shard reached its end.
    ShardEnded,
    /// The daemon asked for a graceful shutdown.
    ShutdownRequested,
    /// See [`ShutdownInput`].
    Shutdown(ShutdownInput),
    /// See [`CheckpointMessage`].
    Checkpoint(CheckpointMessage),
    /// See [`StatusMessage`].
    Status(StatusMessage),
}

impl Message {
    /// Discriminator of this message.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Message::Initialize(_) => Action::Initialize,
            Message::ProcessRecords(_) => Action::ProcessRecords,
            Message::LeaseLost => Action::LeaseLost,
            Message::ShardEnded => Action::ShardEnded,
            Message::ShutdownRequested => Action::ShutdownRequested,
            Message::Shutdown(_) => Action::Shutdown,
            Message::Checkpoint(_) => Action::Checkpoint,
            Message::Status(_) => Action::Status,
        }
    }

    /// Acknowledge that the message with `action` was handled.
    #[must_use]
    pub const fn status(action: Action) -> Self {
        Message::Status(StatusMessage {
            response_for: action,
        })
    }

    /// Ask the daemon to checkpoint at the given position.
    pub fn checkpoint_request(
        sequence_number: Option<String>,
        sub_sequence_number: Option<i64>,
    ) -> Self {
        Message::Checkpoint(CheckpointMessage::request(
            sequence_number,
            sub_sequence_number,
        ))
    }
}
