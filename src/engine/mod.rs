// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State synchronization engine.
//!
//! [`SyncEngine`] owns the authoritative snapshot of one thermostat. It
//! reconciles two directions of change:
//!
//! - **Device updates**: decoded point batches merged into the current
//!   state, with a state-changed notification when the snapshot differs or
//!   the republish deadline has passed.
//! - **Requested states**: commands turned into device writes, one per
//!   differing field.
//!
//! All mutable state sits behind one async mutex, so a device update and a
//! command never interleave.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use moes_bridge::device::MockThermostat;
//! use moes_bridge::engine::{SyncEngine, SyncTiming};
//! use moes_bridge::state::{Field, FieldSet, FieldValue, ThermostatState};
//! use moes_bridge::subscription::Notifier;
//!
//! # async fn example() {
//! let engine = SyncEngine::new(
//!     "BHT-002-GALW",
//!     MockThermostat::new(),
//!     Arc::new(Notifier::new()),
//!     SyncTiming::default(),
//! );
//!
//! let mut update = FieldSet::new();
//! update.insert(Field::IsOn, FieldValue::Flag(true));
//! assert!(engine.apply_device_update(update).await);
//!
//! let state = engine
//!     .apply_requested_state(ThermostatState::new().with_target_temperature(100.0))
//!     .await;
//! assert_eq!(state.target_temperature(), Some(35.0));
//! # }
//! ```

mod timing;

pub use timing::{
    DEFAULT_FULL_STATUS_INTERVAL, DEFAULT_PING_INTERVAL, DEFAULT_PUBLISH_INTERVAL, MAX_INTERVAL,
    SyncTiming,
};

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::codec::{self, RawBatch};
use crate::device::ThermostatDevice;
use crate::error::Result;
use crate::state::{Field, FieldSet, FieldValue, ThermostatState};
use crate::subscription::Notifier;

/// Lowest accepted setpoint in °C.
pub const MIN_TARGET_TEMPERATURE: f64 = 5.0;

/// Highest accepted setpoint in °C.
pub const MAX_TARGET_TEMPERATURE: f64 = 35.0;

/// Clamps a requested setpoint to the device range and snaps it to the
/// step the device stores (0.5 °C).
///
/// ```
/// use moes_bridge::engine::clamp_target_temperature;
///
/// assert_eq!(clamp_target_temperature(20.3), 20.5);
/// assert_eq!(clamp_target_temperature(40.0), 35.0);
/// ```
#[must_use]
pub fn clamp_target_temperature(celsius: f64) -> f64 {
    let scale = f64::from(codec::TEMPERATURE_SCALE);
    (celsius.clamp(MIN_TARGET_TEMPERATURE, MAX_TARGET_TEMPERATURE) * scale).round() / scale
}

/// Mutable engine state.
#[derive(Debug)]
struct EngineState {
    current: ThermostatState,
    previous: ThermostatState,
    is_synchronized: bool,
    is_connection_lost: bool,
    next_ping: Instant,
    next_full_status: Instant,
    next_publish: Instant,
}

/// Synchronization engine for one thermostat.
#[derive(Debug)]
pub struct SyncEngine<D> {
    name: String,
    device: D,
    notifier: Arc<Notifier>,
    timing: SyncTiming,
    inner: Mutex<EngineState>,
}

impl<D: ThermostatDevice> SyncEngine<D> {
    /// Creates an engine starting from [`ThermostatState::baseline`].
    pub fn new(
        name: impl Into<String>,
        device: D,
        notifier: Arc<Notifier>,
        timing: SyncTiming,
    ) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            device,
            notifier,
            timing,
            inner: Mutex::new(EngineState {
                current: ThermostatState::baseline(),
                previous: ThermostatState::baseline(),
                is_synchronized: false,
                is_connection_lost: false,
                next_ping: now + timing.ping_interval(),
                next_full_status: now + timing.full_status_interval(),
                next_publish: now + timing.publish_interval(),
            }),
        }
    }

    /// Device name used in logs and topics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The notifier state changes are sent to.
    #[must_use]
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Configured intervals.
    #[must_use]
    pub fn timing(&self) -> SyncTiming {
        self.timing
    }

    // ========== Snapshot access ==========

    /// Returns a copy of the current state.
    pub async fn current(&self) -> ThermostatState {
        self.inner.lock().await.current.clone()
    }

    /// Returns a copy of the state before the last mutation.
    pub async fn previous(&self) -> ThermostatState {
        self.inner.lock().await.previous.clone()
    }

    /// Whether the last full status decoded successfully.
    pub async fn is_synchronized(&self) -> bool {
        self.inner.lock().await.is_synchronized
    }

    /// Marks the engine (un)synchronized. Returns `true` if the flag changed.
    pub async fn set_synchronized(&self, synchronized: bool) -> bool {
        let mut inner = self.inner.lock().await;
        let changed = inner.is_synchronized != synchronized;
        inner.is_synchronized = synchronized;
        changed
    }

    /// Whether the device link is currently considered lost.
    pub async fn is_connection_lost(&self) -> bool {
        self.inner.lock().await.is_connection_lost
    }

    /// Sets the connection-lost flag. Returns `true` if the flag changed.
    pub async fn set_connection_lost(&self, lost: bool) -> bool {
        let mut inner = self.inner.lock().await;
        let changed = inner.is_connection_lost != lost;
        inner.is_connection_lost = lost;
        changed
    }

    // ========== Timers ==========

    /// Returns `true` and re-arms the ping timer if a ping is due at `now`.
    pub async fn take_ping_due(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().await;
        if now < inner.next_ping {
            return false;
        }
        inner.next_ping = now + self.timing.ping_interval();
        true
    }

    /// Returns `true` and re-arms the full-status timer if a full status is
    /// due at `now`. Always due while unsynchronized.
    pub async fn take_full_status_due(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.is_synchronized && now < inner.next_full_status {
            return false;
        }
        inner.next_full_status = now + self.timing.full_status_interval();
        true
    }

    // ========== Device → state ==========

    /// Decodes a raw batch and applies it.
    ///
    /// Error-marked batches are never applied.
    pub async fn apply_raw_batch(&self, batch: &RawBatch) -> bool {
        if batch.is_error() {
            return false;
        }
        self.apply_device_update(codec::decode_batch(batch.dps()))
            .await
    }

    /// Merges decoded fields into the current state.
    ///
    /// Null-valued fields are dropped first. Returns `false` if nothing was
    /// left to apply. Otherwise the state-changed notification fires when the
    /// merged snapshot differs from the previous one, or when it is unchanged
    /// but the republish deadline has passed.
    pub async fn apply_device_update(&self, mut fields: FieldSet) -> bool {
        fields.prune_nulls();
        if fields.is_empty() {
            return false;
        }

        let mut inner = self.inner.lock().await;
        let before = inner.current.clone();
        inner.previous = before.clone();
        for (field, value) in fields.values() {
            if let Err(e) = inner.current.set(field, value) {
                tracing::warn!(device = %self.name, error = %e, "Skipping device field");
            }
        }

        let now = Instant::now();
        if inner.current != before {
            tracing::info!(
                device = %self.name,
                changed = ?before.diff(&inner.current),
                "State changed"
            );
            self.notifier.notify_state_changed(&inner.current);
            inner.next_publish = now + self.timing.publish_interval();
        } else if now >= inner.next_publish {
            tracing::debug!(device = %self.name, "Republishing unchanged state");
            self.notifier.notify_state_changed(&inner.current);
            inner.next_publish = now + self.timing.publish_interval();
        }

        true
    }

    // ========== Requested state → device ==========

    /// Writes every field of `requested` that is set and differs from the
    /// current state, then returns the resulting current state.
    ///
    /// `home_temperature` is never written. The setpoint goes through
    /// [`clamp_target_temperature`], so the snapshot holds exactly what the
    /// device was sent. A failed
    /// write is logged and leaves its field unchanged; the other fields are
    /// still attempted. No state-changed notification fires from here.
    pub async fn apply_requested_state(&self, requested: ThermostatState) -> ThermostatState {
        let mut inner = self.inner.lock().await;

        for field in Field::ALL {
            if field.is_read_only() {
                continue;
            }
            let Some(wanted) = requested.get(field).map(normalize) else {
                continue;
            };
            if inner.current.get(field) == Some(wanted) {
                continue;
            }
            if let Err(e) = self.write(&mut inner, field, wanted).await {
                tracing::error!(
                    device = %self.name,
                    field = %field,
                    value = %wanted,
                    error = %e,
                    "Device write failed"
                );
            }
        }

        inner.current.clone()
    }

    /// Turns the thermostat on.
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails.
    pub async fn turn_on(&self) -> Result<ThermostatState> {
        self.write_one(Field::IsOn, FieldValue::Flag(true)).await
    }

    /// Turns the thermostat off.
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails.
    pub async fn turn_off(&self) -> Result<ThermostatState> {
        self.write_one(Field::IsOn, FieldValue::Flag(false)).await
    }

    /// Sets the setpoint, clamped to the device range and step.
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails.
    pub async fn set_target_temperature(&self, celsius: f64) -> Result<ThermostatState> {
        self.write_one(
            Field::TargetTemperature,
            FieldValue::Celsius(clamp_target_temperature(celsius)),
        )
        .await
    }

    /// Switches between manual and scheduled operation.
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails.
    pub async fn set_manual_operating_mode(&self, manual: bool) -> Result<ThermostatState> {
        self.write_one(Field::ManualOperatingMode, FieldValue::Flag(manual))
            .await
    }

    /// Enables or disables eco mode.
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails.
    pub async fn set_eco_mode(&self, enabled: bool) -> Result<ThermostatState> {
        self.write_one(Field::EcoMode, FieldValue::Flag(enabled)).await
    }

    /// Enables or disables the child lock.
    ///
    /// # Errors
    ///
    /// Returns error if the device write fails.
    pub async fn set_lock_enabled(&self, enabled: bool) -> Result<ThermostatState> {
        self.write_one(Field::LockEnabled, FieldValue::Flag(enabled))
            .await
    }

    async fn write_one(&self, field: Field, value: FieldValue) -> Result<ThermostatState> {
        let mut inner = self.inner.lock().await;
        self.write(&mut inner, field, value).await?;
        Ok(inner.current.clone())
    }

    /// Performs one device write and commits it to the snapshot.
    async fn write(&self, inner: &mut EngineState, field: Field, value: FieldValue) -> Result<()> {
        match (field, value) {
            (Field::IsOn, FieldValue::Flag(true)) => self.device.turn_on().await?,
            (Field::IsOn, FieldValue::Flag(false)) => self.device.turn_off().await?,
            _ => {
                let (point, wire) = codec::encode(field, value)?;
                // The mode switch is not acknowledged reliably by the device.
                let nowait = field == Field::ManualOperatingMode;
                self.device.set_value(point, wire, nowait).await?;
            }
        }

        tracing::debug!(device = %self.name, field = %field, value = %value, "Device write sent");
        inner.previous = inner.current.clone();
        inner.current.set(field, value)?;
        Ok(())
    }
}

fn normalize(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Celsius(celsius) => FieldValue::Celsius(clamp_target_temperature(celsius)),
        flag @ FieldValue::Flag(_) => flag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, MockThermostat};
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;
    use std::time::Duration;

    fn engine_with_recorder() -> (SyncEngine<MockThermostat>, Arc<SyncMutex<Vec<ThermostatState>>>) {
        let notifier = Arc::new(Notifier::new());
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        notifier.on_state_changed(move |state| {
            seen_clone.lock().push(state.clone());
            Ok(())
        });
        let engine = SyncEngine::new(
            "test-thermostat",
            MockThermostat::new(),
            notifier,
            SyncTiming::default(),
        );
        (engine, seen)
    }

    fn update(pairs: &[(Field, FieldValue)]) -> FieldSet {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn empty_update_is_ignored() {
        let (engine, seen) = engine_with_recorder();

        assert!(!engine.apply_device_update(FieldSet::new()).await);

        let mut nulls = FieldSet::new();
        nulls.insert_null(Field::IsOn);
        assert!(!engine.apply_device_update(nulls).await);

        assert_eq!(engine.current().await, ThermostatState::baseline());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn unmapped_point_batch_is_ignored() {
        let (engine, seen) = engine_with_recorder();
        let batch = RawBatch::from_json(r#"{"dps":{"104":true}}"#).unwrap();

        assert!(!engine.apply_raw_batch(&batch).await);
        assert_eq!(engine.current().await, ThermostatState::baseline());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn error_batch_is_never_applied() {
        let (engine, _) = engine_with_recorder();
        assert!(!engine.apply_raw_batch(&RawBatch::error("905")).await);
    }

    #[tokio::test]
    async fn change_fires_one_merged_notification() {
        let (engine, seen) = engine_with_recorder();
        engine
            .apply_device_update(update(&[(Field::TargetTemperature, FieldValue::Celsius(20.0))]))
            .await;
        seen.lock().clear();

        assert!(
            engine
                .apply_device_update(update(&[(Field::IsOn, FieldValue::Flag(true))]))
                .await
        );

        let expected = ThermostatState::baseline()
            .with_target_temperature(20.0)
            .with_is_on(true);
        assert_eq!(seen.lock().as_slice(), &[expected.clone()]);
        assert_eq!(engine.current().await, expected);
        assert_eq!(
            engine.previous().await,
            ThermostatState::baseline().with_target_temperature(20.0)
        );
    }

    #[tokio::test]
    async fn same_batch_twice_yields_same_state() {
        let (engine, _) = engine_with_recorder();
        let batch =
            RawBatch::from_json(r#"{"dps":{"1":true,"2":41,"3":39,"4":"1","5":false,"6":true}}"#)
                .unwrap();

        assert!(engine.apply_raw_batch(&batch).await);
        let first = engine.current().await;
        assert!(engine.apply_raw_batch(&batch).await);

        assert_eq!(engine.current().await, first);
        assert_eq!(first.home_temperature(), Some(19.5));
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_state_republishes_after_deadline() {
        let (engine, seen) = engine_with_recorder();
        let full = update(&[
            (Field::IsOn, FieldValue::Flag(true)),
            (Field::TargetTemperature, FieldValue::Celsius(21.0)),
        ]);

        engine.apply_device_update(full.clone()).await;
        assert_eq!(seen.lock().len(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        engine.apply_device_update(full.clone()).await;
        assert_eq!(seen.lock().len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        engine.apply_device_update(full.clone()).await;
        assert_eq!(seen.lock().len(), 2);

        engine.apply_device_update(full).await;
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn requested_temperature_is_clamped() {
        let (engine, _) = engine_with_recorder();

        let state = engine
            .apply_requested_state(ThermostatState::new().with_target_temperature(100.0))
            .await;
        assert_eq!(state.target_temperature(), Some(35.0));

        let state = engine
            .apply_requested_state(ThermostatState::new().with_target_temperature(-5.0))
            .await;
        assert_eq!(state.target_temperature(), Some(5.0));

        assert_eq!(
            engine.device().writes(),
            vec![
                DeviceCall::SetValue { point: 2, value: json!(70), nowait: false },
                DeviceCall::SetValue { point: 2, value: json!(10), nowait: false },
            ]
        );
    }

    #[tokio::test]
    async fn requested_temperature_snaps_to_device_step() {
        let (engine, seen) = engine_with_recorder();

        let state = engine
            .apply_requested_state(ThermostatState::new().with_target_temperature(20.3))
            .await;
        assert_eq!(state.target_temperature(), Some(20.5));
        assert_eq!(
            engine.device().writes(),
            vec![DeviceCall::SetValue { point: 2, value: json!(41), nowait: false }]
        );

        // The device echoes what it was sent; nothing changed.
        let echo = [(Field::TargetTemperature, FieldValue::Celsius(20.5))]
            .into_iter()
            .collect();
        engine.apply_device_update(echo).await;
        assert!(seen.lock().is_empty());

        // A request that snaps to the current setpoint writes nothing.
        engine.device().clear_calls();
        engine
            .apply_requested_state(ThermostatState::new().with_target_temperature(20.6))
            .await;
        assert!(engine.device().writes().is_empty());
    }

    #[tokio::test]
    async fn requested_state_writes_only_differences() {
        let (engine, seen) = engine_with_recorder();

        let state = engine
            .apply_requested_state(
                ThermostatState::new()
                    .with_is_on(true)
                    .with_eco_mode(false)
                    .with_manual_operating_mode(true)
                    .with_home_temperature(99.0),
            )
            .await;

        assert_eq!(
            engine.device().writes(),
            vec![
                DeviceCall::TurnOn,
                DeviceCall::SetValue { point: 4, value: json!("1"), nowait: true },
            ]
        );
        assert_eq!(state.is_on(), Some(true));
        assert_eq!(state.manual_operating_mode(), Some(true));
        assert_eq!(state.home_temperature(), None);
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_field_unchanged() {
        let (engine, _) = engine_with_recorder();
        engine.device().reject_writes(true);

        let state = engine
            .apply_requested_state(ThermostatState::new().with_is_on(true).with_lock_enabled(true))
            .await;

        assert_eq!(state, ThermostatState::baseline());
        assert_eq!(engine.device().writes().len(), 2);
    }

    #[tokio::test]
    async fn single_field_writes() {
        let (engine, _) = engine_with_recorder();

        engine.turn_on().await.unwrap();
        engine.set_eco_mode(true).await.unwrap();
        let state = engine.set_lock_enabled(true).await.unwrap();

        assert_eq!(state.is_on(), Some(true));
        assert_eq!(state.eco_mode(), Some(true));
        assert_eq!(state.lock_enabled(), Some(true));
        assert_eq!(engine.previous().await.lock_enabled(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn timers_rearm() {
        let (engine, _) = engine_with_recorder();
        let start = Instant::now();

        assert!(!engine.take_ping_due(start).await);
        assert!(engine.take_ping_due(start + Duration::from_secs(9)).await);
        assert!(!engine.take_ping_due(start + Duration::from_secs(10)).await);

        // Unsynchronized engines always want a full status.
        assert!(engine.take_full_status_due(start).await);
        engine.set_synchronized(true).await;
        assert!(!engine.take_full_status_due(start).await);
        assert!(engine.take_full_status_due(start + Duration::from_secs(300)).await);
    }

    #[tokio::test]
    async fn flags_report_transitions() {
        let (engine, _) = engine_with_recorder();

        assert!(engine.set_connection_lost(true).await);
        assert!(!engine.set_connection_lost(true).await);
        assert!(engine.is_connection_lost().await);
        assert!(engine.set_connection_lost(false).await);
    }
}
