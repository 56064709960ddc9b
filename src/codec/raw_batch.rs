// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw device replies.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ParseError;

/// A status or event reply as the device sends it.
///
/// The presence of an `Error` key marks the reply as failed, whatever its
/// value. `dps` maps point-id strings to raw values.
///
/// # Examples
///
/// ```
/// use moes_bridge::codec::RawBatch;
///
/// let batch = RawBatch::from_json(r#"{"devId":"abc","dps":{"1":true,"2":40}}"#).unwrap();
/// assert!(!batch.is_error());
/// assert_eq!(batch.dps().len(), 2);
///
/// let failed = RawBatch::from_json(r#"{"Error":"Network Error: Device Unreachable","Err":"905"}"#).unwrap();
/// assert!(failed.is_error());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawBatch {
    #[serde(rename = "Error", default, deserialize_with = "present")]
    error: Option<Value>,
    #[serde(default)]
    dps: Option<BTreeMap<String, Value>>,
}

/// Maps a present key to `Some`, even when its value is null.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl RawBatch {
    /// Creates a batch carrying an error marker.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(Value::String(message.into())),
            dps: None,
        }
    }

    /// Parses a decrypted device payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a JSON object of the expected shape.
    pub fn from_json(payload: &str) -> Result<Self, ParseError> {
        serde_json::from_str(payload).map_err(ParseError::from)
    }

    /// Returns `true` if the reply carries an error marker.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the error marker rendered as text.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    /// Returns the raw points, empty if the reply had none.
    #[must_use]
    pub fn dps(&self) -> &BTreeMap<String, Value> {
        static EMPTY: BTreeMap<String, Value> = BTreeMap::new();
        self.dps.as_ref().unwrap_or(&EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_reply() {
        let batch = RawBatch::from_json(
            r#"{"devId":"123","dps":{"1":true,"2":40,"3":41,"4":"0","5":false,"6":false,"102":0,"104":true}}"#,
        )
        .unwrap();

        assert!(!batch.is_error());
        assert_eq!(batch.dps().len(), 8);
        assert_eq!(batch.dps()["4"], Value::String("0".to_string()));
    }

    #[test]
    fn error_key_presence_marks_failure() {
        let batch = RawBatch::from_json(r#"{"Error":null}"#).unwrap();
        assert!(batch.is_error());
        assert_eq!(batch.error_message(), Some("null".to_string()));
    }

    #[test]
    fn reply_without_dps() {
        let batch = RawBatch::from_json(r#"{"devId":"123"}"#).unwrap();
        assert!(!batch.is_error());
        assert!(batch.dps().is_empty());

        let batch = RawBatch::from_json(r#"{"dps":null}"#).unwrap();
        assert!(batch.dps().is_empty());
    }

    #[test]
    fn error_constructor() {
        let batch = RawBatch::error("timeout");
        assert!(batch.is_error());
        assert_eq!(batch.error_message(), Some("timeout".to_string()));
        assert!(batch.dps().is_empty());
    }
}
