// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! The hierarchy mirrors the places things go wrong: translating device
//! points, talking to the device or the broker, parsing inbound payloads,
//! and device-reported failures. None of these are fatal to the bridge; the
//! polling loop logs them and carries on.

use thiserror::Error;

use crate::state::Field;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A point could not be translated to or from its wire form.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Communication with the device or the broker failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An inbound payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The device reported a failure.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// A registered callback failed.
    #[error("callback failed: {0}")]
    Callback(String),
}

/// Errors raised by the point codec.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// The point id is not part of the device's point table.
    #[error("unknown point id {0}")]
    UnknownPoint(String),

    /// The raw value does not have the shape the point expects.
    #[error("point {point} ({field}) cannot decode value {value}")]
    InvalidValue {
        /// The point id.
        point: u8,
        /// The field the point maps to.
        field: Field,
        /// The offending raw value, rendered as JSON.
        value: String,
    },

    /// The field is sensor-reported and cannot be written.
    #[error("field {0} is read-only")]
    ReadOnly(Field),

    /// The value handed to the encoder does not match the field's type.
    #[error("field {0} cannot encode the given value")]
    TypeMismatch(Field),
}

/// Errors related to protocol communication (Tuya, MQTT).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// I/O on the device socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection to the device or broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid host, port or file path.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A device frame was malformed.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// Payload encryption or decryption failed.
    #[error("cipher error: {0}")]
    Cipher(String),
}

/// Errors related to parsing inbound payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is valid JSON but not the expected shape.
    #[error("unexpected payload format: {0}")]
    UnexpectedFormat(String),
}

/// Errors related to device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device answered with an error marker.
    #[error("device reported error: {0}")]
    Reported(String),

    /// A write was rejected or not acknowledged.
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// Device configuration is invalid.
    #[error("invalid device configuration: {0}")]
    InvalidConfiguration(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_display() {
        let err = CodecError::InvalidValue {
            point: 2,
            field: Field::TargetTemperature,
            value: "\"warm\"".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "point 2 (target_temperature) cannot decode value \"warm\""
        );
    }

    #[test]
    fn error_from_codec_error() {
        let err: Error = CodecError::ReadOnly(Field::HomeTemperature).into();
        assert!(matches!(
            err,
            Error::Codec(CodecError::ReadOnly(Field::HomeTemperature))
        ));
    }

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::Timeout(5000);
        assert_eq!(err.to_string(), "request timed out after 5000 ms");
    }

    #[test]
    fn device_error_display() {
        let err = DeviceError::Reported("Network Error: Device Unreachable".to_string());
        assert_eq!(
            err.to_string(),
            "device reported error: Network Error: Device Unreachable"
        );
    }
}
