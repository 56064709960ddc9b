// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thermostat state types.
//!
//! [`ThermostatState`] is the snapshot value the bridge publishes and the
//! synchronization engine keeps two of (current and previous). A
//! [`FieldSet`] is the sparse, named form a device batch or a command payload
//! takes before it is applied to a snapshot.
//!
//! # Examples
//!
//! ```
//! use moes_bridge::state::{Field, FieldSet, FieldValue, ThermostatState};
//!
//! let mut state = ThermostatState::new();
//! assert_eq!(state.is_on(), None);
//!
//! let mut fields = FieldSet::new();
//! fields.insert(Field::IsOn, FieldValue::Flag(true));
//! fields.insert(Field::TargetTemperature, FieldValue::Celsius(21.5));
//!
//! for (field, value) in fields.values() {
//!     state.set(field, value).unwrap();
//! }
//!
//! assert_eq!(state.is_on(), Some(true));
//! assert_eq!(state.target_temperature(), Some(21.5));
//! ```

mod field;
mod thermostat_state;

pub use field::{Field, FieldSet, FieldValue};
pub use thermostat_state::ThermostatState;
