// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wiring between the engine and the MQTT side.
//!
//! Commands arrive on the MQTT event loop, are forwarded through a channel,
//! and are applied by a dedicated task so the event loop never waits on the
//! device. The state resulting from each command is published as its
//! acknowledgement.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::device::ThermostatDevice;
use crate::engine::SyncEngine;
use crate::error::Error;
use crate::state::ThermostatState;

/// Routes commands from the engine's notifier into `engine`.
///
/// Registers the notifier's command handler and spawns the task applying
/// requested states. `on_applied` receives the state after each command.
/// The task ends when the command handler is replaced or cleared.
pub fn spawn_command_task<D, F>(engine: Arc<SyncEngine<D>>, on_applied: F) -> JoinHandle<()>
where
    D: ThermostatDevice + 'static,
    F: Fn(&ThermostatState) + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<ThermostatState>();

    engine.notifier().on_command(move |requested| {
        tx.send(requested.clone())
            .map_err(|_| Error::Callback("command task has stopped".to_string()))
    });

    tokio::spawn(async move {
        while let Some(requested) = rx.recv().await {
            tracing::debug!(device = %engine.name(), requested = ?requested, "Applying command");
            let state = engine.apply_requested_state(requested).await;
            on_applied(&state);
        }
        tracing::debug!(device = %engine.name(), "Command task stopped");
    })
}

#[cfg(feature = "mqtt")]
pub use self::mqtt_bridge::Bridge;

#[cfg(feature = "mqtt")]
mod mqtt_bridge {
    use std::sync::Arc;

    use tokio::task::JoinHandle;

    use super::spawn_command_task;
    use crate::device::ThermostatDevice;
    use crate::engine::SyncEngine;
    use crate::protocol::MqttBridgeClient;
    use crate::scheduler::PollingScheduler;

    /// A thermostat bridged to an MQTT broker.
    ///
    /// State changes from the engine are published on the state topic;
    /// commands from the command topic are applied to the device.
    #[derive(Debug)]
    pub struct Bridge<D> {
        engine: Arc<SyncEngine<D>>,
        mqtt: MqttBridgeClient,
        command_task: JoinHandle<()>,
    }

    impl<D: ThermostatDevice + 'static> Bridge<D> {
        /// Connects `engine` to `mqtt`.
        ///
        /// `mqtt` must have been built with the engine's notifier so that
        /// inbound commands reach it.
        pub fn new(engine: Arc<SyncEngine<D>>, mqtt: MqttBridgeClient) -> Self {
            let publisher = mqtt.clone();
            engine.notifier().on_state_changed(move |state| publisher.publish_state(state));

            let publisher = mqtt.clone();
            let command_task = spawn_command_task(Arc::clone(&engine), move |state| {
                if let Err(e) = publisher.publish_state(state) {
                    tracing::error!(error = %e, "Failed to publish command result");
                }
            });

            Self {
                engine,
                mqtt,
                command_task,
            }
        }

        /// The engine.
        #[must_use]
        pub fn engine(&self) -> &Arc<SyncEngine<D>> {
            &self.engine
        }

        /// The MQTT client.
        #[must_use]
        pub fn mqtt(&self) -> &MqttBridgeClient {
            &self.mqtt
        }

        /// Creates the polling loop for this bridge's device.
        #[must_use]
        pub fn scheduler(&self, max_iterations: u64) -> PollingScheduler<D> {
            PollingScheduler::new(Arc::clone(&self.engine)).with_max_iterations(max_iterations)
        }
    }

    impl<D> Drop for Bridge<D> {
        fn drop(&mut self) {
            self.command_task.abort();
        }
    }
}
