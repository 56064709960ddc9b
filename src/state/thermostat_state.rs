// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thermostat state snapshot.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CodecError, ParseError};

use super::{Field, FieldValue};

/// Snapshot of a thermostat's six attributes.
///
/// Every field is optional: `None` means the value is unknown, never a
/// default. No combination of fields is invalid.
///
/// Serializes to the state payload published on `{root}/STATE`, with `null`
/// for unknown fields.
///
/// # Examples
///
/// ```
/// use moes_bridge::state::ThermostatState;
///
/// let state = ThermostatState::new()
///     .with_is_on(true)
///     .with_target_temperature(21.0);
///
/// assert_eq!(state.is_on(), Some(true));
/// assert_eq!(state.eco_mode(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThermostatState {
    is_on: Option<bool>,
    target_temperature: Option<f64>,
    home_temperature: Option<f64>,
    manual_operating_mode: Option<bool>,
    eco_mode: Option<bool>,
    lock_enabled: Option<bool>,
}

impl ThermostatState {
    /// Creates a state with every field unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The state a freshly constructed device starts from.
    ///
    /// Boolean attributes are `false`; temperatures stay unknown until the
    /// device reports them.
    #[must_use]
    pub fn baseline() -> Self {
        Self {
            is_on: Some(false),
            target_temperature: None,
            home_temperature: None,
            manual_operating_mode: Some(false),
            eco_mode: Some(false),
            lock_enabled: Some(false),
        }
    }

    // ========== Accessors ==========

    /// Power state.
    #[must_use]
    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    /// Setpoint in °C.
    #[must_use]
    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature
    }

    /// Measured temperature in °C.
    #[must_use]
    pub fn home_temperature(&self) -> Option<f64> {
        self.home_temperature
    }

    /// Manual (`true`) or scheduled (`false`) operation.
    #[must_use]
    pub fn manual_operating_mode(&self) -> Option<bool> {
        self.manual_operating_mode
    }

    /// Eco mode.
    #[must_use]
    pub fn eco_mode(&self) -> Option<bool> {
        self.eco_mode
    }

    /// Child lock.
    #[must_use]
    pub fn lock_enabled(&self) -> Option<bool> {
        self.lock_enabled
    }

    // ========== Builders ==========

    /// Returns a copy with the power state set.
    #[must_use]
    pub fn with_is_on(mut self, value: bool) -> Self {
        self.is_on = Some(value);
        self
    }

    /// Returns a copy with the setpoint set.
    #[must_use]
    pub fn with_target_temperature(mut self, value: f64) -> Self {
        self.target_temperature = Some(value);
        self
    }

    /// Returns a copy with the measured temperature set.
    #[must_use]
    pub fn with_home_temperature(mut self, value: f64) -> Self {
        self.home_temperature = Some(value);
        self
    }

    /// Returns a copy with the operating mode set.
    #[must_use]
    pub fn with_manual_operating_mode(mut self, value: bool) -> Self {
        self.manual_operating_mode = Some(value);
        self
    }

    /// Returns a copy with eco mode set.
    #[must_use]
    pub fn with_eco_mode(mut self, value: bool) -> Self {
        self.eco_mode = Some(value);
        self
    }

    /// Returns a copy with the child lock set.
    #[must_use]
    pub fn with_lock_enabled(mut self, value: bool) -> Self {
        self.lock_enabled = Some(value);
        self
    }

    /// Returns a copy with every read-only field cleared.
    #[must_use]
    pub fn without_read_only(mut self) -> Self {
        self.home_temperature = None;
        self
    }

    // ========== Field access ==========

    /// Returns a field's value.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::IsOn => self.is_on.map(FieldValue::Flag),
            Field::TargetTemperature => self.target_temperature.map(FieldValue::Celsius),
            Field::HomeTemperature => self.home_temperature.map(FieldValue::Celsius),
            Field::ManualOperatingMode => self.manual_operating_mode.map(FieldValue::Flag),
            Field::EcoMode => self.eco_mode.map(FieldValue::Flag),
            Field::LockEnabled => self.lock_enabled.map(FieldValue::Flag),
        }
    }

    /// Sets a field's value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] if the value's type does not fit
    /// the field.
    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), CodecError> {
        match (field, value) {
            (Field::IsOn, FieldValue::Flag(v)) => self.is_on = Some(v),
            (Field::TargetTemperature, FieldValue::Celsius(v)) => {
                self.target_temperature = Some(v);
            }
            (Field::HomeTemperature, FieldValue::Celsius(v)) => self.home_temperature = Some(v),
            (Field::ManualOperatingMode, FieldValue::Flag(v)) => {
                self.manual_operating_mode = Some(v);
            }
            (Field::EcoMode, FieldValue::Flag(v)) => self.eco_mode = Some(v),
            (Field::LockEnabled, FieldValue::Flag(v)) => self.lock_enabled = Some(v),
            _ => return Err(CodecError::TypeMismatch(field)),
        }
        Ok(())
    }

    /// Returns the fields whose values differ between `self` and `other`.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| self.get(*field) != other.get(*field))
            .collect()
    }

    // ========== Payloads ==========

    /// Serializes the state payload.
    ///
    /// # Errors
    ///
    /// Returns error if JSON serialization fails.
    pub fn to_payload(&self) -> Result<String, ParseError> {
        serde_json::to_string(self).map_err(ParseError::from)
    }

    /// Parses a command payload.
    ///
    /// Unknown keys are ignored, nulls leave the field unset, and values of
    /// the wrong JSON type are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not JSON or not a JSON object.
    ///
    /// # Examples
    ///
    /// ```
    /// use moes_bridge::state::ThermostatState;
    ///
    /// let state = ThermostatState::from_command_payload(
    ///     r#"{"is_on": true, "eco_mode": "yes", "fan": 3}"#,
    /// ).unwrap();
    ///
    /// assert_eq!(state, ThermostatState::new().with_is_on(true));
    /// ```
    pub fn from_command_payload(payload: &str) -> Result<Self, ParseError> {
        let Value::Object(entries) = serde_json::from_str::<Value>(payload)? else {
            return Err(ParseError::UnexpectedFormat(format!(
                "command must be a JSON object, got {payload}"
            )));
        };

        let mut state = Self::new();
        for (key, raw) in &entries {
            let Some(field) = Field::from_name(key) else {
                tracing::debug!(key = %key, "Ignoring unknown command key");
                continue;
            };

            let value = match raw {
                Value::Null => continue,
                Value::Bool(flag) => Some(FieldValue::Flag(*flag)),
                Value::Number(number) => number.as_f64().map(FieldValue::Celsius),
                _ => None,
            };
            let Some(value) = value.filter(|value| value.fits(field)) else {
                tracing::warn!(
                    field = %field,
                    value = %raw,
                    "Dropping command field with unexpected type"
                );
                continue;
            };

            // `fits` guarantees `set` accepts the value.
            let _ = state.set(field, value);
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_unknown() {
        let state = ThermostatState::new();
        for field in Field::ALL {
            assert_eq!(state.get(field), None);
        }
    }

    #[test]
    fn baseline_has_false_flags() {
        let state = ThermostatState::baseline();
        assert_eq!(state.is_on(), Some(false));
        assert_eq!(state.manual_operating_mode(), Some(false));
        assert_eq!(state.eco_mode(), Some(false));
        assert_eq!(state.lock_enabled(), Some(false));
        assert_eq!(state.target_temperature(), None);
    }

    #[test]
    fn set_rejects_mismatched_type() {
        let mut state = ThermostatState::new();
        assert_eq!(
            state.set(Field::IsOn, FieldValue::Celsius(1.0)),
            Err(CodecError::TypeMismatch(Field::IsOn))
        );
        assert_eq!(state, ThermostatState::new());
    }

    #[test]
    fn diff_lists_changed_fields() {
        let before = ThermostatState::baseline().with_target_temperature(20.0);
        let after = before.clone().with_is_on(true).with_home_temperature(19.5);

        assert_eq!(
            before.diff(&after),
            vec![Field::IsOn, Field::HomeTemperature]
        );
        assert!(after.diff(&after).is_empty());
    }

    #[test]
    fn payload_uses_null_for_unknown() {
        let state = ThermostatState::new()
            .with_is_on(true)
            .with_target_temperature(20.5);

        assert_eq!(
            state.to_payload().unwrap(),
            r#"{"is_on":true,"target_temperature":20.5,"home_temperature":null,"manual_operating_mode":null,"eco_mode":null,"lock_enabled":null}"#
        );
    }

    #[test]
    fn command_payload_empty_and_unknown() {
        assert_eq!(
            ThermostatState::from_command_payload("{}").unwrap(),
            ThermostatState::new()
        );
        assert_eq!(
            ThermostatState::from_command_payload(r#"{"test": 0}"#).unwrap(),
            ThermostatState::new()
        );
    }

    #[test]
    fn command_payload_drops_mismatched_types() {
        let state =
            ThermostatState::from_command_payload(r#"{"is_on": "Some value", "target_temperature": true, "eco_mode": 1}"#)
                .unwrap();
        assert_eq!(state, ThermostatState::new());
    }

    #[test]
    fn command_payload_full() {
        let state = ThermostatState::from_command_payload(
            r#"{
                "is_on": true,
                "target_temperature": 20.5,
                "home_temperature": 19.5,
                "manual_operating_mode": false,
                "eco_mode": false,
                "lock_enabled": false
            }"#,
        )
        .unwrap();

        assert_eq!(
            state,
            ThermostatState::new()
                .with_is_on(true)
                .with_target_temperature(20.5)
                .with_home_temperature(19.5)
                .with_manual_operating_mode(false)
                .with_eco_mode(false)
                .with_lock_enabled(false)
        );
    }

    #[test]
    fn command_payload_accepts_integer_temperature() {
        let state = ThermostatState::from_command_payload(r#"{"target_temperature": 22}"#).unwrap();
        assert_eq!(state.target_temperature(), Some(22.0));
    }

    #[test]
    fn command_payload_rejects_non_object() {
        assert!(matches!(
            ThermostatState::from_command_payload("[1, 2]"),
            Err(ParseError::UnexpectedFormat(_))
        ));
        assert!(matches!(
            ThermostatState::from_command_payload("not json"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn without_read_only_strips_home_temperature() {
        let state = ThermostatState::new()
            .with_home_temperature(99.0)
            .with_is_on(true)
            .without_read_only();
        assert_eq!(state, ThermostatState::new().with_is_on(true));
    }
}
