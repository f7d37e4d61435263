// SPDX-License-Identifier: MIT OR Apache-2.0
//! Decode failures.

use thiserror::Error;

use crate::Action;

const PREVIEW_LEN: usize = 200;

/// A line that could not be turned into a [`crate::Message`].
///
/// Always fatal for the bridge: once a line is misread, the daemon and the
/// processor no longer agree on where the stream is.
#[derive(Debug, Error)]
#[error("malformed message `{}`: {cause}", preview(.line))]
pub struct MalformedMessage {
    line: String,
    #[source]
    cause: MalformedCause,
}

impl MalformedMessage {
    /// Wrap `line` together with the reason it was rejected.
    pub fn new(line: impl Into<String>, cause: MalformedCause) -> Self {
        Self {
            line: line.into(),
            cause,
        }
    }

    /// The offending input line, verbatim.
    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Why the line was rejected.
    #[must_use]
    pub fn cause(&self) -> &MalformedCause {
        &self.cause
    }
}

/// Why a line was rejected.
#[derive(Debug, Error)]
pub enum MalformedCause {
    /// The line is not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[source] std::str::Utf8Error),

    /// The line is not JSON, or `action` is not a string.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The line is JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// The object has no `action` field.
    #[error("missing `action` discriminator")]
    MissingAction,

    /// `action` names no known message kind.
    #[error("unknown action `{0}`")]
    UnknownAction(String),

    /// The payload does not match the schema selected by `action`.
    #[error("invalid {action} payload: {source}")]
    InvalidPayload {
        /// Action the line declared.
        action: Action,
        /// Parse failure against that action's schema.
        #[source]
        source: serde_json::Error,
    },

    /// A well-formed message arrived where it is not allowed.
    #[error("`{0}` is not valid here")]
    UnexpectedAction(Action),
}

fn preview(line: &str) -> &str {
    match line.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
