// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multilang protocol bridge for stream shard processors.
//!
//! A KCL multilang daemon runs each shard's processor as a child process and
//! talks to it over stdin/stdout. This crate gathers the pieces needed to
//! write such a processor:
//!
//! - [`protocol`]: the line-delimited JSON messages and their codec.
//! - [`bridge`]: the dispatch loop, the checkpointer and the callback traits.
//! - [`config`]: TOML and environment configuration for the bridge.

#![deny(unsafe_code)]

pub use kcl_bridge as bridge;
pub use kcl_config as config;
pub use kcl_protocol as protocol;

pub use kcl_bridge::{
    Bridge, BridgeError, CheckpointTarget, Checkpointer, ProcessorResult, RecordProcessor,
    RetryingCheckpointErrorHandler, ShardRecordProcessor,
};
pub use kcl_protocol::{InitializeInput, ProcessRecordsInput, Record, ShutdownReason};
