// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runs a legacy [`RecordProcessor`] as a [`ShardRecordProcessor`].

use async_trait::async_trait;
use kcl_protocol::{InitializeInput, ProcessRecordsInput, ShutdownReason};

use crate::{Checkpointer, ProcessorResult, RecordProcessor, ShardRecordProcessor};

/// Maps the five current callbacks onto the three legacy ones.
///
/// | current              | legacy                                |
/// |----------------------|---------------------------------------|
/// | `lease_lost`         | `shutdown(Zombie, None)`              |
/// | `shard_ended`        | `shutdown(Terminate, Some(checkpointer))` |
/// | `shutdown_requested` | nothing                               |
#[derive(Debug, Clone, Default)]
pub struct LegacyProcessorAdapter<P> {
    inner: P,
}

impl<P> LegacyProcessorAdapter<P> {
    /// Wrap a legacy processor.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// The wrapped processor.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Unwrap the legacy processor.
    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait]
impl<P: RecordProcessor> ShardRecordProcessor for LegacyProcessorAdapter<P> {
    async fn initialize(&mut self, input: InitializeInput) -> ProcessorResult {
        self.inner.initialize(input).await
    }

    async fn process_records(
        &mut self,
        input: ProcessRecordsInput,
        checkpointer: &mut Checkpointer<'_>,
    ) -> ProcessorResult {
        self.inner.process_records(input, checkpointer).await
    }

    async fn lease_lost(&mut self) -> ProcessorResult {
        self.inner.shutdown(ShutdownReason::Zombie, None).await
    }

    async fn shard_ended(&mut self, checkpointer: &mut Checkpointer<'_>) -> ProcessorResult {
        self.inner
            .shutdown(ShutdownReason::Terminate, Some(checkpointer))
            .await
    }

    async fn shutdown_requested(&mut self, _checkpointer: &mut Checkpointer<'_>) -> ProcessorResult {
        Ok(())
    }
}
