// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Notification system for thermostat state and commands.
//!
//! Each notification path holds a single subscriber:
//!
//! - [`CallbackSlot`] - One replaceable handler with serialized, panic-safe
//!   invocation
//! - [`Notifier`] - The state-changed and command slots of one thermostat
//!
//! # Usage
//!
//! ```
//! use moes_bridge::subscription::Notifier;
//! use moes_bridge::state::ThermostatState;
//!
//! let notifier = Notifier::new();
//! notifier.on_state_changed(|state| {
//!     println!("state is now {}", state.to_payload()?);
//!     Ok(())
//! });
//!
//! notifier.notify_state_changed(&ThermostatState::baseline());
//! ```
//!
//! Handler failures and panics are logged and swallowed; they never reach
//! the polling loop or the MQTT event loop.

mod callback;
mod notifier;

pub use callback::CallbackSlot;
pub use notifier::Notifier;
