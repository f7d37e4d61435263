// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory daemon sessions for the bridge tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use kcl_bridge::{Bridge, BridgeError, LineTransport, ShardRecordProcessor};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// What a finished session left behind.
pub struct Session {
    pub result: Result<(), BridgeError>,
    pub output: Vec<String>,
    pub diagnostics: Vec<String>,
}

/// Feed `lines` to `bridge` as the daemon would and collect everything it wrote.
pub async fn run_session<P>(bridge: &mut Bridge<P>, lines: &[&str]) -> Session
where
    P: ShardRecordProcessor,
{
    let input: String = lines.iter().map(|line| format!("{line}\n")).collect();
    run_session_with(bridge, Cursor::new(input.into_bytes())).await
}

/// Like [`run_session`], reading the daemon side from `input`.
pub async fn run_session_with<P, R>(bridge: &mut Bridge<P>, input: R) -> Session
where
    P: ShardRecordProcessor,
    R: AsyncRead + Send + Unpin + 'static,
{
    let (out_w, mut out_r) = tokio::io::duplex(1 << 20);
    let (diag_w, mut diag_r) = tokio::io::duplex(1 << 20);
    let mut transport = LineTransport::new(input, out_w).with_diagnostics(diag_w);

    let result = bridge.run_with_transport(&mut transport).await;
    drop(transport);

    let mut output = String::new();
    out_r.read_to_string(&mut output).await.unwrap();
    let mut diagnostics = String::new();
    diag_r.read_to_string(&mut diagnostics).await.unwrap();

    Session {
        result,
        output: output.lines().map(str::to_owned).collect(),
        diagnostics: diagnostics.lines().map(str::to_owned).collect(),
    }
}

/// Yields `data`, then fails every further read with `kind`.
pub struct FailingAfter {
    data: Cursor<Vec<u8>>,
    kind: std::io::ErrorKind,
}

impl FailingAfter {
    pub fn new(data: impl Into<Vec<u8>>, kind: std::io::ErrorKind) -> Self {
        Self {
            data: Cursor::new(data.into()),
            kind,
        }
    }
}

impl AsyncRead for FailingAfter {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.data).poll_read(cx, buf))?;
        if buf.filled().len() == before {
            return Poll::Ready(Err(std::io::Error::new(this.kind, "daemon stream failed")));
        }
        Poll::Ready(Ok(()))
    }
}

/// The acknowledgement line for `action`.
pub fn status(action: &str) -> String {
    format!(r#"{{"action":"status","responseFor":"{action}"}}"#)
}

/// The request line for a checkpoint at `seq`, or at the last record when `None`.
pub fn checkpoint(seq: Option<&str>) -> String {
    match seq {
        Some(seq) => format!(r#"{{"action":"checkpoint","sequenceNumber":"{seq}"}}"#),
        None => r#"{"action":"checkpoint","sequenceNumber":null}"#.to_string(),
    }
}

/// A `processRecords` line carrying one record per sequence number.
pub fn process_records(seqs: &[&str]) -> String {
    let records: Vec<String> = seqs
        .iter()
        .map(|seq| {
            format!(
                r#"{{"sequenceNumber":"{seq}","partitionKey":"cat","data":"bWVvdw==","approximateArrivalTimestamp":0}}"#
            )
        })
        .collect();
    format!(
        r#"{{"action":"processRecords","records":[{}]}}"#,
        records.join(",")
    )
}

pub const INITIALIZE: &str = r#"{"action":"initialize","shardId":"0"}"#;
pub const CHECKPOINT_OK: &str = r#"{"action":"checkpoint","sequenceNumber":"456"}"#;
pub const CHECKPOINT_LAST_OK: &str = r#"{"action":"checkpoint"}"#;
pub const CHECKPOINT_FAILED: &str = r#"{"action":"checkpoint","error":"ThrottlingException"}"#;
pub const LEASE_LOST: &str = r#"{"action":"leaseLost"}"#;
pub const SHARD_ENDED: &str = r#"{"action":"shardEnded"}"#;
pub const SHUTDOWN_REQUESTED: &str = r#"{"action":"shutdownRequested"}"#;
