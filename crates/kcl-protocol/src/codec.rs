// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line codec for [`Message`].

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Action, MalformedCause, MalformedMessage, Message};

/// Only the discriminator; every other field is skipped.
#[derive(Deserialize)]
struct ActionProbe {
    #[serde(default)]
    action: Option<String>,
}

/// Stateless codec between protocol lines and [`Message`] values.
#[derive(Debug, Clone, Copy)]
pub struct JsonlCodec;

impl JsonlCodec {
    /// Render a message as a single JSON line, without the trailing newline.
    ///
    /// JSON escapes control characters inside strings, so the result never
    /// contains a raw `\n`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use kcl_protocol::{Action, JsonlCodec, Message};
    /// let line = JsonlCodec::encode(&Message::status(Action::Initialize)).unwrap();
    /// assert_eq!(line, r#"{"action":"status","responseFor":"initialize"}"#);
    /// ```
    pub fn encode(msg: &Message) -> Result<String, serde_json::Error> {
        serde_json::to_string(msg)
    }

    /// Parse one line.
    ///
    /// The line must be a JSON object. Its `action` field is read first to
    /// pick the payload schema, then the whole line is parsed again against
    /// that schema. Unknown fields are ignored.
    pub fn decode(line: &str) -> Result<Message, MalformedMessage> {
        let invalid = |e| MalformedMessage::new(line, MalformedCause::InvalidJson(e));
        let value: Value = serde_json::from_str(line).map_err(invalid)?;
        if !value.is_object() {
            return Err(MalformedMessage::new(line, MalformedCause::NotAnObject));
        }
        let probe = ActionProbe::deserialize(&value).map_err(invalid)?;
        let name = probe
            .action
            .ok_or_else(|| MalformedMessage::new(line, MalformedCause::MissingAction))?;
        let Some(action) = Action::from_wire(&name) else {
            return Err(MalformedMessage::new(
                line,
                MalformedCause::UnknownAction(name),
            ));
        };

        let msg = match action {
            Action::Initialize => Message::Initialize(payload(line, action)?),
            Action::ProcessRecords => Message::ProcessRecords(payload(line, action)?),
            Action::LeaseLost => Message::LeaseLost,
            Action::ShardEnded => Message::ShardEnded,
            Action::ShutdownRequested => Message::ShutdownRequested,
            Action::Shutdown => Message::Shutdown(payload(line, action)?),
            Action::Checkpoint => Message::Checkpoint(payload(line, action)?),
            Action::Status => Message::Status(payload(line, action)?),
        };
        Ok(msg)
    }
}

fn payload<T: DeserializeOwned>(line: &str, action: Action) -> Result<T, MalformedMessage> {
    serde_json::from_str(line).map_err(|source| {
        MalformedMessage::new(line, MalformedCause::InvalidPayload { action, source })
    })
}
