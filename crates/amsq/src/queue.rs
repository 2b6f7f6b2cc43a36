//! 📨 Invocation messages — what the trigger hands us, and what we refuse to work with.
//!
//! A message is a JSON object with at least `invocation_id` (string) and `epoch_time` (integer
//! seconds, when it was enqueued). Everything else rides along untouched and ends up in the
//! telemetry `msg` field. Missing either field? The invocation is over before it began.

use serde_json::Value;

use crate::error::MessageError;

/// 📨 A validated invocation message.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub invocation_id: String,
    pub epoch_time: i64,
    /// 📦 The whole message as received, for the telemetry record.
    pub raw: Value,
}

impl QueueMessage {
    pub fn parse(bytes: &[u8]) -> Result<Self, MessageError> {
        let raw: Value = serde_json::from_slice(bytes).map_err(MessageError::NotJson)?;
        let invocation_id = raw
            .get("invocation_id")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingField("invocation_id"))?
            .to_string();
        let epoch_time = raw
            .get("epoch_time")
            .and_then(Value::as_i64)
            .ok_or(MessageError::MissingField("epoch_time"))?;
        Ok(Self {
            invocation_id,
            epoch_time,
            raw,
        })
    }
}
