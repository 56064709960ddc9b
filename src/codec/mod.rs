// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point codec for the Moes BHT-002 thermostat family.
//!
//! The device reports its state as a sparse map of numeric point ids
//! ("DPS") to raw values. This module translates between that map and
//! named, typed [`Field`]s using a static point table.
//!
//! | Point | Field                   | Wire        | Decoding                 |
//! |-------|-------------------------|-------------|--------------------------|
//! | 1     | `is_on`                 | bool        | truthiness               |
//! | 2     | `target_temperature`    | int         | `raw / 2`, one decimal   |
//! | 3     | `home_temperature`      | int         | `raw / 2`, one decimal   |
//! | 4     | `manual_operating_mode` | `"0"`/`"1"` | `"1"` is manual          |
//! | 5     | `eco_mode`              | bool        | truthiness               |
//! | 6     | `lock_enabled`          | bool        | truthiness               |
//!
//! Points 102 and 104 are reported by the device but carry nothing the
//! bridge uses.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//! use moes_bridge::codec;
//! use moes_bridge::state::{Field, FieldValue};
//!
//! let dps: BTreeMap<String, serde_json::Value> =
//!     serde_json::from_str(r#"{"1": true, "2": 41, "4": "1", "99": 7}"#).unwrap();
//!
//! let fields = codec::decode_batch(&dps);
//! assert_eq!(fields.get(Field::TargetTemperature), Some(Some(FieldValue::Celsius(20.5))));
//! assert_eq!(fields.get(Field::ManualOperatingMode), Some(Some(FieldValue::Flag(true))));
//! assert_eq!(fields.len(), 3);
//!
//! let (point, wire) = codec::encode(Field::TargetTemperature, FieldValue::Celsius(20.5)).unwrap();
//! assert_eq!(point, 2);
//! assert_eq!(wire, serde_json::json!(41));
//! ```

mod raw_batch;

pub use raw_batch::RawBatch;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::CodecError;
use crate::state::{Field, FieldSet, FieldValue};

/// Raw temperature units per °C.
pub const TEMPERATURE_SCALE: u8 = 2;

/// Points the device reports that the bridge deliberately ignores.
pub const IGNORED_POINTS: [u8; 2] = [102, 104];

/// How a point's raw value maps to a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    /// Any JSON value, coerced through truthiness.
    Truthy,
    /// Integer (or numeric string) divided by the scale, one decimal kept.
    Scaled(u8),
    /// Textual `"1"` (manual) / anything else (scheduled).
    ModeString,
}

/// Static description of one device point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointDescriptor {
    /// Device point id.
    pub point: u8,
    /// Field the point maps to.
    pub field: Field,
    /// Decoding rule.
    pub decoding: Decoding,
}

impl PointDescriptor {
    /// Returns `true` if the point accepts writes.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !self.field.is_read_only()
    }
}

/// The point table, one entry per physical point.
pub static POINTS: [PointDescriptor; 6] = [
    PointDescriptor {
        point: 1,
        field: Field::IsOn,
        decoding: Decoding::Truthy,
    },
    PointDescriptor {
        point: 2,
        field: Field::TargetTemperature,
        decoding: Decoding::Scaled(TEMPERATURE_SCALE),
    },
    PointDescriptor {
        point: 3,
        field: Field::HomeTemperature,
        decoding: Decoding::Scaled(TEMPERATURE_SCALE),
    },
    PointDescriptor {
        point: 4,
        field: Field::ManualOperatingMode,
        decoding: Decoding::ModeString,
    },
    PointDescriptor {
        point: 5,
        field: Field::EcoMode,
        decoding: Decoding::Truthy,
    },
    PointDescriptor {
        point: 6,
        field: Field::LockEnabled,
        decoding: Decoding::Truthy,
    },
];

/// Looks up a point by id.
#[must_use]
pub fn descriptor_for_point(point: u8) -> Option<&'static PointDescriptor> {
    POINTS.iter().find(|d| d.point == point)
}

/// Looks up a point by its wire key.
///
/// # Errors
///
/// Returns [`CodecError::UnknownPoint`] if the key is not a point id in the
/// table.
pub fn lookup_point(key: &str) -> Result<&'static PointDescriptor, CodecError> {
    key.parse::<u8>()
        .ok()
        .and_then(descriptor_for_point)
        .ok_or_else(|| CodecError::UnknownPoint(key.to_string()))
}

/// Looks up the point a field is carried on.
#[must_use]
pub fn descriptor_for_field(field: Field) -> &'static PointDescriptor {
    // Every field has exactly one point; the table covers Field::ALL.
    POINTS
        .iter()
        .find(|d| d.field == field)
        .unwrap_or(&POINTS[0])
}

/// Rounds to one decimal place.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Decodes one raw value for a known point.
///
/// # Errors
///
/// Returns [`CodecError::InvalidValue`] if a scaled point carries a
/// non-numeric value.
pub fn decode_value(descriptor: &PointDescriptor, value: &Value) -> Result<FieldValue, CodecError> {
    match descriptor.decoding {
        Decoding::Truthy => Ok(FieldValue::Flag(truthy(value))),
        Decoding::ModeString => Ok(FieldValue::Flag(value.as_str() == Some("1"))),
        Decoding::Scaled(scale) => numeric(value)
            .map(|raw| FieldValue::Celsius(round1(raw / f64::from(scale))))
            .ok_or_else(|| CodecError::InvalidValue {
                point: descriptor.point,
                field: descriptor.field,
                value: value.to_string(),
            }),
    }
}

/// Decodes a raw point map into named fields.
///
/// Unknown point ids, null values and undecodable values drop only the
/// offending point; the rest of the batch is still decoded.
#[must_use]
pub fn decode_batch(dps: &BTreeMap<String, Value>) -> FieldSet {
    let mut fields = FieldSet::new();

    for (key, value) in dps {
        let descriptor = match lookup_point(key) {
            Ok(descriptor) => descriptor,
            Err(_) if key.parse::<u8>().is_ok_and(|p| IGNORED_POINTS.contains(&p)) => {
                tracing::debug!(point = %key, value = %value, "Ignoring unused point");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, value = %value, "Dropping point");
                continue;
            }
        };

        if value.is_null() {
            tracing::warn!(point = %key, field = %descriptor.field, "Dropping null point value");
            continue;
        }

        match decode_value(descriptor, value) {
            Ok(decoded) => {
                tracing::debug!(field = %descriptor.field, value = %decoded, "Decoded point");
                fields.insert(descriptor.field, decoded);
            }
            Err(e) => tracing::warn!(error = %e, "Dropping undecodable point"),
        }
    }

    fields
}

/// Encodes a field value into its point id and wire value.
///
/// # Errors
///
/// Returns [`CodecError::ReadOnly`] for sensor-reported fields and
/// [`CodecError::TypeMismatch`] if the value does not fit the field.
pub fn encode(field: Field, value: FieldValue) -> Result<(u8, Value), CodecError> {
    let descriptor = descriptor_for_field(field);
    if !descriptor.is_writable() {
        return Err(CodecError::ReadOnly(field));
    }

    let wire = match (descriptor.decoding, value) {
        (Decoding::Truthy, FieldValue::Flag(flag)) => Value::Bool(flag),
        (Decoding::ModeString, FieldValue::Flag(manual)) => {
            Value::String(if manual { "1" } else { "0" }.to_string())
        }
        (Decoding::Scaled(scale), FieldValue::Celsius(celsius)) => {
            // Setpoints are clamped to [5, 35] °C before they get here.
            #[allow(clippy::cast_possible_truncation)]
            let raw = (celsius * f64::from(scale)).round() as i64;
            Value::from(raw)
        }
        _ => return Err(CodecError::TypeMismatch(field)),
    };

    Ok((descriptor.point, wire))
}
