// SPDX-License-Identifier: MIT OR Apache-2.0
//! Callback surfaces implemented by record processors.

use async_trait::async_trait;
use kcl_protocol::{InitializeInput, ProcessRecordsInput, ShutdownReason};

use crate::{Checkpointer, ProcessorResult};

// ---------------------------------------------------------------------------
// ShardRecordProcessor
// ---------------------------------------------------------------------------

/// Trait implemented by processors that consume one shard.
///
/// The [`crate::Bridge`] calls exactly one method per message from the
/// daemon and acknowledges it once the method returns `Ok`. Returning `Err`
/// ends the session.
#[async_trait]
pub trait ShardRecordProcessor: Send {
    /// Called once before any records are delivered.
    async fn initialize(&mut self, input: InitializeInput) -> ProcessorResult;

    /// Called with each batch of records.
    async fn process_records(
        &mut self,
        input: ProcessRecordsInput,
        checkpointer: &mut Checkpointer<'_>,
    ) -> ProcessorResult;

    /// Called when another worker has taken the lease.
    ///
    /// No checkpointer is offered: progress can no longer be recorded.
    async fn lease_lost(&mut self) -> ProcessorResult;

    /// Called when the shard has been fully consumed.
    ///
    /// The processor must checkpoint here for the daemon to start on the
    /// shard's children.
    async fn shard_ended(&mut self, checkpointer: &mut Checkpointer<'_>) -> ProcessorResult;

    /// Called when the daemon is shutting down.
    ///
    /// The default implementation does nothing.
    async fn shutdown_requested(&mut self, _checkpointer: &mut Checkpointer<'_>) -> ProcessorResult {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordProcessor (legacy)
// ---------------------------------------------------------------------------

/// The older three-method callback surface.
///
/// Wrap an implementation in [`crate::LegacyProcessorAdapter`], or use
/// [`crate::Bridge::legacy`], to run it.
#[async_trait]
pub trait RecordProcessor: Send {
    /// Called once before any records are delivered.
    async fn initialize(&mut self, input: InitializeInput) -> ProcessorResult;

    /// Called with each batch of records.
    async fn process_records(
        &mut self,
        input: ProcessRecordsInput,
        checkpointer: &mut Checkpointer<'_>,
    ) -> ProcessorResult;

    /// Called when processing of the shard stops.
    ///
    /// `checkpointer` is `None` for [`ShutdownReason::Zombie`], where the
    /// lease is already gone.
    async fn shutdown(
        &mut self,
        reason: ShutdownReason,
        checkpointer: Option<&mut Checkpointer<'_>>,
    ) -> ProcessorResult;
}
