// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State-change and command notifications.

use crate::error::{ParseError, Result};
use crate::state::ThermostatState;

use super::CallbackSlot;

/// The two notification paths of a thermostat.
///
/// - **State changed**: outbound, invoked with the full current state
///   whenever the engine decides to publish it.
/// - **Command**: inbound, invoked with a requested state parsed from a
///   command payload. Read-only fields are stripped before dispatch.
#[derive(Debug)]
pub struct Notifier {
    state_changed: CallbackSlot<ThermostatState>,
    command: CallbackSlot<ThermostatState>,
}

impl Notifier {
    /// Creates a notifier with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_changed: CallbackSlot::new("state_changed"),
            command: CallbackSlot::new("command"),
        }
    }

    /// Registers the state-changed handler.
    pub fn on_state_changed<F>(&self, handler: F)
    where
        F: Fn(&ThermostatState) -> Result<()> + Send + Sync + 'static,
    {
        self.state_changed.set(handler);
    }

    /// Registers the command handler.
    pub fn on_command<F>(&self, handler: F)
    where
        F: Fn(&ThermostatState) -> Result<()> + Send + Sync + 'static,
    {
        self.command.set(handler);
    }

    /// Removes both handlers.
    pub fn clear(&self) {
        self.state_changed.clear();
        self.command.clear();
    }

    /// Invokes the state-changed handler.
    pub fn notify_state_changed(&self, state: &ThermostatState) -> bool {
        tracing::debug!(state = ?state, "Notifying state change");
        self.state_changed.invoke(state)
    }

    /// Invokes the command handler with `requested`, read-only fields removed.
    pub fn dispatch_command(&self, requested: ThermostatState) -> bool {
        if requested.home_temperature().is_some() {
            tracing::debug!("Ignoring read-only home_temperature in command");
        }
        self.command.invoke(&requested.without_read_only())
    }

    /// Parses a command payload and dispatches it.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a JSON object. The handler is not
    /// invoked in that case.
    pub fn dispatch_command_payload(&self, payload: &str) -> std::result::Result<bool, ParseError> {
        let requested = ThermostatState::from_command_payload(payload)?;
        Ok(self.dispatch_command(requested))
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_command(notifier: &Notifier) -> Arc<Mutex<Vec<ThermostatState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        notifier.on_command(move |state| {
            seen_clone.lock().push(state.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn command_strips_home_temperature() {
        let notifier = Notifier::new();
        let seen = recording_command(&notifier);

        let dispatched = notifier
            .dispatch_command_payload(r#"{"home_temperature": 99, "is_on": true}"#)
            .unwrap();

        assert!(dispatched);
        assert_eq!(
            seen.lock().as_slice(),
            &[ThermostatState::new().with_is_on(true)]
        );
    }

    #[test]
    fn invalid_command_is_not_dispatched() {
        let notifier = Notifier::new();
        let seen = recording_command(&notifier);

        assert!(notifier.dispatch_command_payload("42").is_err());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn empty_command_is_dispatched() {
        let notifier = Notifier::new();
        let seen = recording_command(&notifier);

        assert!(notifier.dispatch_command_payload("{}").unwrap());
        assert_eq!(seen.lock().as_slice(), &[ThermostatState::new()]);
    }

    #[test]
    fn state_changed_without_handler() {
        let notifier = Notifier::new();
        assert!(!notifier.notify_state_changed(&ThermostatState::baseline()));
    }

    #[test]
    fn state_changed_passes_full_state() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        notifier.on_state_changed(move |state| {
            *seen_clone.lock() = Some(state.clone());
            Ok(())
        });

        let state = ThermostatState::baseline().with_home_temperature(20.5);
        assert!(notifier.notify_state_changed(&state));
        assert_eq!(*seen.lock(), Some(state));
    }

    #[test]
    fn clear_drops_both_handlers() {
        let notifier = Notifier::new();
        notifier.on_state_changed(|_| Ok(()));
        notifier.on_command(|_| Ok(()));
        notifier.clear();

        assert!(!notifier.notify_state_changed(&ThermostatState::new()));
        assert!(!notifier.dispatch_command(ThermostatState::new()));
    }
}
