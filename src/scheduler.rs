// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device polling loop.
//!
//! [`PollingScheduler`] drives one [`SyncEngine`]: an initial full status,
//! then an endless loop of keep-alive pings, periodic full-status requests,
//! and incremental receives in between.

use std::sync::Arc;

use tokio::time::Instant;

use crate::codec::RawBatch;
use crate::device::ThermostatDevice;
use crate::engine::SyncEngine;

/// The display counter wraps back to 1 after this value.
pub const ITERATION_WRAP: u32 = 2000;

/// Scheduler lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started, or the last connection attempt failed.
    Disconnected,
    /// Waiting for a usable first status.
    Connecting,
    /// First status applied; the loop has not run yet.
    Syncing,
    /// Running the polling loop.
    Steady,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Syncing => "syncing",
            Self::Steady => "steady",
        };
        f.write_str(name)
    }
}

/// Polls a thermostat and feeds its updates into the engine.
#[derive(Debug)]
pub struct PollingScheduler<D> {
    engine: Arc<SyncEngine<D>>,
    phase: Phase,
    iteration: u32,
    passes: u64,
    max_iterations: u64,
}

impl<D: ThermostatDevice> PollingScheduler<D> {
    /// Creates an unbounded scheduler.
    #[must_use]
    pub fn new(engine: Arc<SyncEngine<D>>) -> Self {
        Self {
            engine,
            phase: Phase::Disconnected,
            iteration: 1,
            passes: 0,
            max_iterations: 0,
        }
    }

    /// Stops the loop after `max_iterations` passes. `0` never stops.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Display counter: advances on error-free passes, wraps at
    /// [`ITERATION_WRAP`].
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Number of loop passes so far.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// The engine being driven.
    #[must_use]
    pub fn engine(&self) -> &Arc<SyncEngine<D>> {
        &self.engine
    }

    /// Connects, then polls until the iteration bound is reached.
    pub async fn run(&mut self) {
        tracing::info!(
            device = %self.engine.name(),
            max_iterations = self.max_iterations,
            "Start monitoring"
        );

        self.connect().await;

        while self.max_iterations == 0 || self.passes < self.max_iterations {
            self.run_iteration().await;
        }

        tracing::info!(device = %self.engine.name(), passes = self.passes, "Monitoring stopped");
    }

    /// Requests a first full status.
    ///
    /// Returns `true` if at least one field was decoded and applied.
    pub async fn connect(&mut self) -> bool {
        let name = self.engine.name().to_string();
        self.phase = Phase::Connecting;
        tracing::info!(device = %name, "Connecting to device");

        let reply = match self.engine.device().status().await {
            Ok(reply) => reply,
            Err(e) => RawBatch::error(e.to_string()),
        };

        if let Some(message) = reply.error_message() {
            self.engine.set_synchronized(false).await;
            self.phase = Phase::Disconnected;
            tracing::error!(device = %name, error = %message, "Connection failed");
            return false;
        }

        log_raw_dps(&name, &reply);
        if self.engine.apply_raw_batch(&reply).await {
            self.engine.set_synchronized(true).await;
            self.phase = Phase::Syncing;
            tracing::info!(device = %name, "Connected");
            true
        } else {
            self.engine.set_synchronized(false).await;
            tracing::warn!(device = %name, "Maybe connected: status carried no usable points");
            false
        }
    }

    /// Runs one polling pass.
    pub async fn run_iteration(&mut self) {
        let name = self.engine.name().to_string();
        let device = self.engine.device();
        let now = Instant::now();
        self.phase = Phase::Steady;
        self.passes += 1;

        tracing::debug!(
            device = %name,
            iteration = self.iteration,
            pass = self.passes,
            "Polling"
        );

        if self.engine.take_ping_due(now).await {
            tracing::debug!(device = %name, "Sending keep-alive");
            if let Err(e) = device.send_ping().await {
                tracing::warn!(device = %name, error = %e, "Keep-alive failed");
            }
        }

        let reply = if self.engine.take_full_status_due(now).await {
            tracing::debug!(device = %name, "Requesting full status");
            device.status().await.map(Some)
        } else {
            device.receive().await
        };

        let reply = reply.unwrap_or_else(|e| Some(RawBatch::error(e.to_string())));

        match reply {
            Some(batch) if batch.is_error() => {
                self.engine.set_synchronized(false).await;
                if self.engine.set_connection_lost(true).await {
                    tracing::warn!(
                        device = %name,
                        error = %batch.error_message().unwrap_or_default(),
                        "Connection to device lost"
                    );
                }
                return;
            }
            Some(batch) => {
                self.mark_reachable(&name).await;
                log_raw_dps(&name, &batch);
                if self.engine.apply_raw_batch(&batch).await
                    && self.engine.set_synchronized(true).await
                {
                    tracing::info!(device = %name, "Synchronized with device");
                }
            }
            None => self.mark_reachable(&name).await,
        }

        self.iteration = if self.iteration >= ITERATION_WRAP {
            1
        } else {
            self.iteration + 1
        };
    }

    async fn mark_reachable(&self, name: &str) {
        if self.engine.set_connection_lost(false).await {
            tracing::info!(device = %name, "Connection to device restored");
        }
    }
}

fn log_raw_dps(name: &str, batch: &RawBatch) {
    if !batch.dps().is_empty() {
        tracing::info!(device = %name, dps = ?batch.dps(), "RAW DPS");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, MockThermostat};
    use crate::engine::SyncTiming;
    use crate::subscription::Notifier;
    use std::time::Duration;

    fn scheduler(device: MockThermostat) -> PollingScheduler<MockThermostat> {
        let engine = SyncEngine::new(
            "test-thermostat",
            device,
            Arc::new(Notifier::new()),
            SyncTiming::default(),
        );
        PollingScheduler::new(Arc::new(engine))
    }

    fn status(json: &str) -> RawBatch {
        RawBatch::from_json(json).unwrap()
    }

    #[tokio::test]
    async fn connect_success_synchronizes() {
        let device = MockThermostat::new();
        device.push_status(status(r#"{"dps":{"1":true,"2":40}}"#));
        let mut scheduler = scheduler(device);

        assert!(scheduler.connect().await);
        assert_eq!(scheduler.phase(), Phase::Syncing);
        assert!(scheduler.engine().is_synchronized().await);
        assert_eq!(scheduler.engine().current().await.target_temperature(), Some(20.0));
    }

    #[tokio::test]
    async fn connect_error_marker_stays_unsynchronized() {
        let device = MockThermostat::new();
        device.push_status(RawBatch::error("Network Error: Device Unreachable"));
        let mut scheduler = scheduler(device);

        assert!(!scheduler.connect().await);
        assert_eq!(scheduler.phase(), Phase::Disconnected);
        assert!(!scheduler.engine().is_synchronized().await);
    }

    #[tokio::test]
    async fn connect_empty_reply_is_ambiguous() {
        let mut scheduler = scheduler(MockThermostat::new());

        assert!(!scheduler.connect().await);
        assert_eq!(scheduler.phase(), Phase::Connecting);
    }

    #[tokio::test]
    async fn unsynchronized_loop_requests_full_status() {
        let device = MockThermostat::new();
        device.push_status(status(r#"{"dps":{"1":false}}"#));
        let mut scheduler = scheduler(device);

        scheduler.run_iteration().await;

        assert_eq!(scheduler.engine().device().calls(), vec![DeviceCall::Status]);
        assert!(scheduler.engine().is_synchronized().await);
        assert_eq!(scheduler.phase(), Phase::Steady);
    }

    #[tokio::test]
    async fn synchronized_loop_receives() {
        let device = MockThermostat::new();
        device.push_status(status(r#"{"dps":{"1":true}}"#));
        device.push_receive(Some(status(r#"{"dps":{"3":41}}"#)));
        let mut scheduler = scheduler(device);
        scheduler.connect().await;

        scheduler.run_iteration().await;

        assert_eq!(
            scheduler.engine().device().calls(),
            vec![DeviceCall::Status, DeviceCall::Receive]
        );
        assert_eq!(scheduler.engine().current().await.home_temperature(), Some(20.5));
    }

    #[tokio::test]
    async fn error_marks_connection_lost_then_restored() {
        let device = MockThermostat::new();
        device.push_status(status(r#"{"dps":{"1":true}}"#));
        device.push_receive(Some(RawBatch::error("timeout")));
        let mut scheduler = scheduler(device);
        scheduler.connect().await;

        scheduler.run_iteration().await;
        assert!(scheduler.engine().is_connection_lost().await);
        assert!(!scheduler.engine().is_synchronized().await);
        assert_eq!(scheduler.iteration(), 1);

        // Unsynchronized, so the next pass asks for a full status.
        scheduler
            .engine()
            .device()
            .push_status(status(r#"{"dps":{"1":true}}"#));
        scheduler.run_iteration().await;
        assert!(!scheduler.engine().is_connection_lost().await);
        assert!(scheduler.engine().is_synchronized().await);
        assert_eq!(scheduler.iteration(), 2);
    }

    #[tokio::test]
    async fn transport_failure_counts_as_error() {
        let device = MockThermostat::new();
        device.push_status_failure("connection refused");
        let mut scheduler = scheduler(device);

        scheduler.run_iteration().await;

        assert!(scheduler.engine().is_connection_lost().await);
        assert_eq!(scheduler.iteration(), 1);
        assert_eq!(scheduler.passes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_and_full_status_follow_timers() {
        let device = MockThermostat::new();
        device.push_status(status(r#"{"dps":{"1":true}}"#));
        let mut scheduler = scheduler(device);
        scheduler.connect().await;
        scheduler.engine().device().clear_calls();

        tokio::time::advance(Duration::from_secs(9)).await;
        scheduler.run_iteration().await;
        assert_eq!(
            scheduler.engine().device().calls(),
            vec![DeviceCall::Ping, DeviceCall::Receive]
        );

        scheduler.engine().device().clear_calls();
        tokio::time::advance(Duration::from_secs(291)).await;
        scheduler.run_iteration().await;
        assert_eq!(
            scheduler.engine().device().calls(),
            vec![DeviceCall::Ping, DeviceCall::Status]
        );
    }

    #[tokio::test]
    async fn iteration_counter_wraps() {
        let mut scheduler = scheduler(MockThermostat::new());
        scheduler.iteration = ITERATION_WRAP;

        scheduler.run_iteration().await;

        assert_eq!(scheduler.iteration(), 1);
    }

    #[tokio::test]
    async fn bounded_run_stops_even_when_device_fails() {
        let device = MockThermostat::new();
        for _ in 0..5 {
            device.push_status(RawBatch::error("unreachable"));
        }
        let mut scheduler = scheduler(device).with_max_iterations(3);

        scheduler.run().await;

        assert_eq!(scheduler.passes(), 3);
        assert!(scheduler.engine().is_connection_lost().await);
    }
}
