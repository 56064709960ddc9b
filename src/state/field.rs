// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Named thermostat fields and sparse field sets.

use std::collections::BTreeMap;
use std::fmt;

/// One of the six thermostat attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    /// Power on/off.
    IsOn,
    /// Setpoint in °C.
    TargetTemperature,
    /// Measured room temperature in °C (sensor-reported).
    HomeTemperature,
    /// Manual (`true`) or scheduled (`false`) operation.
    ManualOperatingMode,
    /// Eco mode.
    EcoMode,
    /// Child lock.
    LockEnabled,
}

impl Field {
    /// All fields, in payload order.
    pub const ALL: [Field; 6] = [
        Field::IsOn,
        Field::TargetTemperature,
        Field::HomeTemperature,
        Field::ManualOperatingMode,
        Field::EcoMode,
        Field::LockEnabled,
    ];

    /// Returns the payload key for this field.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IsOn => "is_on",
            Self::TargetTemperature => "target_temperature",
            Self::HomeTemperature => "home_temperature",
            Self::ManualOperatingMode => "manual_operating_mode",
            Self::EcoMode => "eco_mode",
            Self::LockEnabled => "lock_enabled",
        }
    }

    /// Looks a field up by its payload key.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    /// Returns `true` for fields the device reports but never accepts.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::HomeTemperature)
    }

    /// Returns `true` for fields carrying a temperature in °C.
    #[must_use]
    pub const fn is_temperature(self) -> bool {
        matches!(self, Self::TargetTemperature | Self::HomeTemperature)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Boolean attributes (power, mode, eco, lock).
    Flag(bool),
    /// Temperatures in °C.
    Celsius(f64),
}

impl FieldValue {
    /// Returns `true` if the value's type fits the field.
    #[must_use]
    pub fn fits(self, field: Field) -> bool {
        match self {
            Self::Flag(_) => !field.is_temperature(),
            Self::Celsius(_) => field.is_temperature(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(value) => write!(f, "{value}"),
            Self::Celsius(value) => write!(f, "{value}°C"),
        }
    }
}

/// A sparse mapping from field to optional value.
///
/// `None` entries stand for a field that was present on the wire with a null
/// value. They are kept so callers can tell "reported as null" apart from
/// "not reported", and are pruned before anything is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet(BTreeMap<Field, Option<FieldValue>>);

impl FieldSet {
    /// Creates an empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field to a value.
    pub fn insert(&mut self, field: Field, value: FieldValue) {
        self.0.insert(field, Some(value));
    }

    /// Records a field that was present but null.
    pub fn insert_null(&mut self, field: Field) {
        self.0.insert(field, None);
    }

    /// Returns the entry for a field.
    ///
    /// The outer `Option` is presence, the inner one nullness.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<Option<FieldValue>> {
        self.0.get(&field).copied()
    }

    /// Drops every null entry.
    pub fn prune_nulls(&mut self) {
        self.0.retain(|_, value| value.is_some());
    }

    /// Returns the number of entries, nulls included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over non-null entries in field order.
    pub fn values(&self) -> impl Iterator<Item = (Field, FieldValue)> + '_ {
        self.0
            .iter()
            .filter_map(|(field, value)| value.map(|v| (*field, v)))
    }
}

impl FromIterator<(Field, FieldValue)> for FieldSet {
    fn from_iter<I: IntoIterator<Item = (Field, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(f, v)| (f, Some(v))).collect())
    }
}
