// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data records delivered in `processRecords` batches.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A single record from the stream.
///
/// The payload travels base64-encoded. It is decoded the first time
/// [`Record::data`] is called and the result is cached for the lifetime of the
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    sequence_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_sequence_number: Option<i64>,
    #[serde(rename = "data")]
    encoded_data: String,
    partition_key: String,
    #[serde(default)]
    approximate_arrival_timestamp: i64,
    #[serde(skip)]
    decoded: OnceLock<Result<Vec<u8>, base64::DecodeError>>,
}

impl Record {
    /// Build a record from raw bytes.
    pub fn new(
        sequence_number: impl Into<String>,
        partition_key: impl Into<String>,
        data: &[u8],
    ) -> Self {
        Self {
            sequence_number: sequence_number.into(),
            sub_sequence_number: None,
            encoded_data: STANDARD.encode(data),
            partition_key: partition_key.into(),
            approximate_arrival_timestamp: 0,
            decoded: OnceLock::from(Ok(data.to_vec())),
        }
    }

    /// Mark the record as one de-aggregated from a larger record.
    #[must_use]
    pub fn with_sub_sequence_number(mut self, sub_sequence_number: i64) -> Self {
        self.sub_sequence_number = Some(sub_sequence_number);
        self
    }

    /// Set the arrival time in epoch milliseconds.
    #[must_use]
    pub fn with_approximate_arrival_timestamp(mut self, millis: i64) -> Self {
        self.approximate_arrival_timestamp = millis;
        self
    }

    /// Opaque, ordered position of the record in its shard.
    #[must_use]
    pub fn sequence_number(&self) -> &str {
        &self.sequence_number
    }

    /// Set only for records de-aggregated from a larger record.
    #[must_use]
    pub fn sub_sequence_number(&self) -> Option<i64> {
        self.sub_sequence_number
    }

    /// Key the producer used to route the record to its shard.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Arrival time in epoch milliseconds, as sent by the daemon.
    #[must_use]
    pub fn approximate_arrival_timestamp(&self) -> i64 {
        self.approximate_arrival_timestamp
    }

    /// Arrival time as a UTC timestamp, if it is in range.
    #[must_use]
    pub fn approximate_arrival_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.approximate_arrival_timestamp)
    }

    /// The payload as it appears on the wire.
    #[must_use]
    pub fn encoded_data(&self) -> &str {
        &self.encoded_data
    }

    /// The decoded payload.
    ///
    /// # Errors
    ///
    /// Returns the base64 error when the wire payload is not valid base64.
    /// The failure is cached just like a successful decode.
    pub fn data(&self) -> Result<&[u8], base64::DecodeError> {
        self.decoded
            .get_or_init(|| STANDARD.decode(&self.encoded_data))
            .as_deref()
            .map_err(|e| e.clone())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.sequence_number == other.sequence_number
            && self.sub_sequence_number == other.sub_sequence_number
            && self.encoded_data == other.encoded_data
            && self.partition_key == other.partition_key
            && self.approximate_arrival_timestamp == other.approximate_arrival_timestamp
    }
}

impl Eq for Record {}
