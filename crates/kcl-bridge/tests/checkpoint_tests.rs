// SPDX-License-Identifier: MIT OR Apache-2.0
//! Checkpoint handshakes nested inside callbacks.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use kcl_bridge::{
    Bridge, BridgeError, CheckpointErrorHandler, CheckpointErrorKind, CheckpointTarget,
    Checkpointer, ProcessorResult, RetryingCheckpointErrorHandler, ShardRecordProcessor,
};
use kcl_protocol::{InitializeInput, ProcessRecordsInput, Record};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Plan = Box<dyn Fn(&ProcessRecordsInput) -> Vec<CheckpointTarget> + Send>;

/// Checkpoints each planned target in order, then records that it got past them.
struct Planned {
    plan: Plan,
    handler: Option<Box<dyn CheckpointErrorHandler>>,
    finished: bool,
}

impl Planned {
    fn new(plan: impl Fn(&ProcessRecordsInput) -> Vec<CheckpointTarget> + Send + 'static) -> Self {
        Self {
            plan: Box::new(plan),
            handler: None,
            finished: false,
        }
    }

    fn with_handler(mut self, handler: impl CheckpointErrorHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }
}

#[async_trait]
impl ShardRecordProcessor for Planned {
    async fn initialize(&mut self, _input: InitializeInput) -> ProcessorResult {
        Ok(())
    }

    async fn process_records(
        &mut self,
        input: ProcessRecordsInput,
        checkpointer: &mut Checkpointer<'_>,
    ) -> ProcessorResult {
        for target in (self.plan)(&input) {
            checkpointer
                .checkpoint_with(target, self.handler.as_deref())
                .await?;
        }
        self.finished = true;
        Ok(())
    }

    async fn lease_lost(&mut self) -> ProcessorResult {
        Err("lease_lost must not be called".into())
    }

    async fn shard_ended(&mut self, _checkpointer: &mut Checkpointer<'_>) -> ProcessorResult {
        Ok(())
    }
}

/// Remembers every failure it is shown.
#[derive(Clone, Default)]
struct Collecting {
    seen: Arc<Mutex<Vec<(CheckpointTarget, String)>>>,
}

#[async_trait]
impl CheckpointErrorHandler for Collecting {
    async fn on_checkpoint_error(
        &self,
        target: &CheckpointTarget,
        error: &str,
        _checkpointer: &mut Checkpointer<'_>,
    ) -> Result<(), BridgeError> {
        self.seen
            .lock()
            .unwrap()
            .push((target.clone(), error.to_string()));
        Ok(())
    }
}

fn last_record(input: &ProcessRecordsInput) -> Vec<CheckpointTarget> {
    input.last_record().map(CheckpointTarget::from).into_iter().collect()
}

fn failed(error: &str) -> String {
    format!(r#"{{"action":"checkpoint","sequenceNumber":"456","error":"{error}"}}"#)
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_checkpoint_does_not_raise() {
    let mut bridge = Bridge::new(Planned::new(last_record));
    let records = process_records(&["456"]);
    let session = run_session(&mut bridge, &[&records, &failed("badstuff")]).await;

    session.result.unwrap();
    assert!(bridge.processor().finished);
    assert_eq!(
        session.output,
        [checkpoint(Some("456")), status("processRecords")]
    );
}

#[tokio::test]
async fn empty_error_counts_as_success() {
    let handler = Collecting::default();
    let mut bridge = Bridge::new(Planned::new(last_record).with_handler(handler.clone()));
    let records = process_records(&["456"]);
    let session = run_session(&mut bridge, &[&records, &failed("")]).await;

    session.result.unwrap();
    assert!(handler.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn handler_sees_target_and_error_text() {
    let handler = Collecting::default();
    let mut bridge = Bridge::new(Planned::new(last_record).with_handler(handler.clone()));
    let records = process_records(&["456"]);
    let session = run_session(&mut bridge, &[&records, CHECKPOINT_FAILED]).await;

    session.result.unwrap();
    let seen = handler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, CheckpointTarget::sequence("456"));
    assert_eq!(seen[0].1, "ThrottlingException");
    assert_eq!(
        CheckpointErrorKind::classify(&seen[0].1),
        CheckpointErrorKind::Throttling
    );
}

#[tokio::test]
async fn unexpected_response_goes_to_handler_and_is_consumed() {
    let handler = Collecting::default();
    let mut bridge = Bridge::new(Planned::new(last_record).with_handler(handler.clone()));
    let records = process_records(&["456"]);
    let session = run_session(&mut bridge, &[&records, LEASE_LOST]).await;

    session.result.unwrap();
    assert_eq!(
        session.output,
        [checkpoint(Some("456")), status("processRecords")]
    );
    let seen = handler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, "unexpected response to checkpoint: leaseLost");
    assert_eq!(
        CheckpointErrorKind::classify(&seen[0].1),
        CheckpointErrorKind::UnexpectedResponse
    );
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_budget_bounds_the_number_of_requests() {
    for budget in [0u32, 1, 3] {
        let retrying = RetryingCheckpointErrorHandler::new(budget, Duration::ZERO);
        let mut bridge = Bridge::new(Planned::new(last_record).with_handler(retrying));
        let records = process_records(&["456"]);
        let failure = failed("ThrottlingException");
        let mut lines = vec![records.as_str()];
        lines.extend(std::iter::repeat_n(failure.as_str(), budget as usize + 1));

        let session = run_session(&mut bridge, &lines).await;

        session.result.unwrap();
        assert!(bridge.processor().finished);
        let mut expected = vec![checkpoint(Some("456")); budget as usize + 1];
        expected.push(status("processRecords"));
        assert_eq!(session.output, expected, "budget {budget}");
    }
}

#[tokio::test]
async fn retry_stops_at_first_success() {
    let retrying = RetryingCheckpointErrorHandler::new(5, Duration::ZERO);
    let mut bridge = Bridge::new(Planned::new(last_record).with_handler(retrying));
    let records = process_records(&["456"]);
    let failure = failed("ThrottlingException");
    let session = run_session(&mut bridge, &[&records, &failure, CHECKPOINT_OK]).await;

    session.result.unwrap();
    assert_eq!(
        session.output,
        [
            checkpoint(Some("456")),
            checkpoint(Some("456")),
            status("processRecords"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn retry_waits_between_attempts() {
    let retrying = RetryingCheckpointErrorHandler::new(2, Duration::from_secs(5));
    let mut bridge = Bridge::new(Planned::new(last_record).with_handler(retrying));
    let records = process_records(&["456"]);
    let failure = failed("ThrottlingException");

    let started = tokio::time::Instant::now();
    let session = run_session(&mut bridge, &[&records, &failure, &failure, &failure]).await;

    session.result.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test]
async fn eof_during_retry_is_fatal() {
    let retrying = RetryingCheckpointErrorHandler::new(3, Duration::ZERO);
    let mut bridge = Bridge::new(Planned::new(last_record).with_handler(retrying));
    let records = process_records(&["456"]);
    let failure = failed("ThrottlingException");
    let session = run_session(&mut bridge, &[&records, &failure]).await;

    assert!(matches!(
        session.result,
        Err(BridgeError::ClosedDuringCheckpoint)
    ));
    assert!(!bridge.processor().finished);
    assert_eq!(
        session.output,
        [checkpoint(Some("456")), checkpoint(Some("456"))]
    );
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn several_checkpoints_in_one_callback_precede_its_status() {
    let mut bridge = Bridge::new(Planned::new(|_| {
        vec![
            CheckpointTarget::sequence("1"),
            CheckpointTarget::sequence("2"),
            CheckpointTarget::LastDelivered,
        ]
    }));
    let records = process_records(&["1", "2"]);
    let session = run_session(
        &mut bridge,
        &[
            &records,
            r#"{"action":"checkpoint","sequenceNumber":"1"}"#,
            r#"{"action":"checkpoint","sequenceNumber":"2"}"#,
            CHECKPOINT_LAST_OK,
        ],
    )
    .await;

    session.result.unwrap();
    assert_eq!(
        session.output,
        [
            checkpoint(Some("1")),
            checkpoint(Some("2")),
            checkpoint(None),
            status("processRecords"),
        ]
    );
}

#[tokio::test]
async fn sub_sequence_number_is_sent_with_the_request() {
    let mut bridge = Bridge::new(Planned::new(|_| {
        let record = Record::new("9", "pk", b"payload").with_sub_sequence_number(3);
        vec![CheckpointTarget::from(&record)]
    }));
    let records = process_records(&["9"]);
    let session = run_session(
        &mut bridge,
        &[
            &records,
            r#"{"action":"checkpoint","sequenceNumber":"9","subSequenceNumber":3}"#,
        ],
    )
    .await;

    session.result.unwrap();
    assert_eq!(
        session.output,
        [
            r#"{"action":"checkpoint","sequenceNumber":"9","subSequenceNumber":3}"#.to_string(),
            status("processRecords"),
        ]
    );
}
