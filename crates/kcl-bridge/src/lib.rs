// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod bridge;
mod checkpoint;
pub mod diagnostics;
mod error;
mod processor;
pub mod telemetry;
mod transport;

pub use adapter::LegacyProcessorAdapter;
pub use bridge::Bridge;
pub use checkpoint::{
    CheckpointErrorHandler, CheckpointErrorKind, CheckpointTarget, Checkpointer,
    RetryingCheckpointErrorHandler, UNEXPECTED_RESPONSE,
};
pub use error::{BridgeError, ProcessorError, ProcessorResult};
pub use processor::{RecordProcessor, ShardRecordProcessor};
pub use transport::LineTransport;
